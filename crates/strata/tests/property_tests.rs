//! Property-based invariants over generated trees: serialization and
//! projection round trips, merge associativity and resolve idempotence.

use indexmap::IndexMap;
use proptest::prelude::*;
use strata::{merge, Config, Key, ToContainerOptions, Value};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        (-100i64..100).prop_map(|i| Value::Float(i as f64 / 4.0)),
        "[a-z][a-z ]{0,8}[a-z]".prop_map(Value::from),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(entries_to_map),
        ]
    })
}

fn map_tree() -> impl Strategy<Value = Value> {
    prop::collection::vec(("[a-z]{1,6}", tree()), 0..5).prop_map(entries_to_map)
}

fn entries_to_map(entries: Vec<(String, Value)>) -> Value {
    let mut map = IndexMap::new();
    for (key, value) in entries {
        map.insert(Key::Str(key), value);
    }
    Value::Map(map)
}

/// Three configs over one fixed shape, so merging never replaces a
/// container with a scalar and right-associativity is guaranteed.
fn shaped() -> impl Strategy<Value = Value> {
    (scalar(), scalar(), scalar(), prop::collection::vec(scalar(), 0..3)).prop_map(
        |(a, c, d, items)| {
            entries_to_map(vec![
                ("a".to_string(), a),
                (
                    "b".to_string(),
                    entries_to_map(vec![("c".to_string(), c), ("d".to_string(), d)]),
                ),
                ("e".to_string(), Value::List(items)),
            ])
        },
    )
}

proptest! {
    #[test]
    fn projection_round_trips(value in map_tree()) {
        let cfg = Config::from_value(value).unwrap();
        let plain = cfg.to_container(&ToContainerOptions::default()).unwrap();
        let rebuilt = Config::from_value(plain).unwrap();
        prop_assert_eq!(&cfg, &rebuilt);
    }

    #[test]
    fn yaml_round_trips(value in map_tree()) {
        let cfg = Config::from_value(value).unwrap();
        let dumped = cfg.to_yaml(false).unwrap();
        let reloaded = Config::from_yaml(&dumped).unwrap();
        prop_assert_eq!(&cfg, &reloaded, "dump:\n{}", dumped);
    }

    #[test]
    fn merge_is_right_associative_on_fixed_shapes(
        a in shaped(),
        b in shaped(),
        c in shaped(),
    ) {
        let a = Config::from_value(a).unwrap();
        let b = Config::from_value(b).unwrap();
        let c = Config::from_value(c).unwrap();
        let left_first = merge([&merge([&a, &b]).unwrap(), &c]).unwrap();
        let right_first = merge([&a, &merge([&b, &c]).unwrap()]).unwrap();
        prop_assert_eq!(left_first, right_first);
    }

    #[test]
    fn resolve_is_idempotent(value in map_tree()) {
        let mut cfg = Config::from_value(value).unwrap();
        cfg.resolve().unwrap();
        let once = cfg.clone();
        cfg.resolve().unwrap();
        prop_assert_eq!(once, cfg);
    }

    #[test]
    fn parent_links_compose_to_full_keys(value in map_tree()) {
        // Every missing-key path (an arbitrary deep-path sample) leads
        // back to a real node when navigated from the root.
        let cfg = Config::from_value(value).unwrap();
        for path in cfg.missing_keys() {
            prop_assert!(cfg.contains(&path));
        }
    }
}
