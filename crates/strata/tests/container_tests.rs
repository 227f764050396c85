//! Container utilities and boundary behaviors: missing-key enumeration,
//! projection round trips, masked copies, dotlist creation and flag
//! defaults.

use strata::{Config, Key, ToContainerOptions, Value};

#[test]
fn missing_keys_enumerates_paths_with_indices() {
    let cfg = Config::from_yaml(
        "foo:\n  bar: ???\nmissing: ???\nlist:\n  - a\n  - null\n  - ???\n",
    )
    .unwrap();
    let missing: Vec<String> = cfg.missing_keys().into_iter().collect();
    assert_eq!(missing, vec!["foo.bar", "list[2]", "missing"]);
}

#[test]
fn to_container_then_create_is_identity() {
    let source = "a: 1\nb:\n  c: ${a}\n  d: ???\nlist:\n  - x\n  - 2.5\n";
    let cfg = Config::from_yaml(source).unwrap();
    let plain = cfg.to_container(&ToContainerOptions::default()).unwrap();
    let rebuilt = Config::from_value(plain).unwrap();
    // Identity up to interpolation-expression textual equality.
    assert_eq!(cfg, rebuilt);
    assert!(rebuilt.is_interpolation("b.c").unwrap());
    assert!(rebuilt.is_missing("b.d").unwrap());
}

#[test]
fn to_container_throw_on_missing() {
    let cfg = Config::from_yaml("a: ???\n").unwrap();
    assert!(cfg
        .to_container(&ToContainerOptions {
            throw_on_missing: true,
            ..Default::default()
        })
        .is_err());
    let lenient = cfg.to_container(&ToContainerOptions::default()).unwrap();
    assert_eq!(
        lenient,
        Value::map([(Key::from("a"), Value::from("???"))])
    );
}

#[test]
fn to_container_resolve_flag() {
    let cfg = Config::from_yaml("a: 5\nb: ${a}\n").unwrap();
    let raw = cfg.to_container(&ToContainerOptions::default()).unwrap();
    assert_eq!(
        raw,
        Value::map([
            (Key::from("a"), Value::Int(5)),
            (Key::from("b"), Value::from("${a}")),
        ])
    );
    let resolved = cfg
        .to_container(&ToContainerOptions {
            resolve: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        resolved,
        Value::map([
            (Key::from("a"), Value::Int(5)),
            (Key::from("b"), Value::Int(5)),
        ])
    );
}

#[test]
fn resolve_replaces_container_results_in_place() {
    let mut cfg = Config::from_yaml("src:\n  x: 1\nalias: ${src}\n").unwrap();
    cfg.resolve().unwrap();
    assert_eq!(cfg.get("alias.x").unwrap(), Value::Int(1));
    // The alias is now a real container, not an expression.
    assert!(!cfg.is_interpolation("alias").unwrap());
}

#[test]
fn masked_copy_restricts_to_named_keys() {
    let cfg = Config::from_yaml("a: 1\nb: 2\nc: ${a}\n").unwrap();
    let masked = cfg.masked_copy(&["a", "c"]).unwrap();
    assert!(masked.contains("a"));
    assert!(!masked.contains("b"));
    // Interpolation expressions are preserved, and resolve within the
    // copy when their target came along.
    assert!(masked.is_interpolation("c").unwrap());
    assert_eq!(masked.get("c").unwrap(), Value::Int(1));
}

#[test]
fn empty_tree_flag_defaults() {
    let cfg = Config::from_yaml("").unwrap();
    assert!(!cfg.is_readonly("").unwrap());
    assert!(!cfg.is_struct("").unwrap());
}

#[test]
fn struct_mode_on_empty_container_denies_writes_force_add_succeeds() {
    let mut cfg = Config::new();
    cfg.set_struct("", Some(true)).unwrap();
    assert!(cfg.set("anything", 1).is_err());
    cfg.update_with(
        "anything",
        1,
        &strata::UpdateOptions {
            merge: true,
            force_add: true,
        },
    )
    .unwrap();
    assert_eq!(cfg.get("anything").unwrap(), Value::Int(1));
}

#[test]
fn open_dict_guard_allows_temporary_additions() {
    let mut cfg = Config::from_yaml("a: 1\n").unwrap();
    cfg.set_struct("", Some(true)).unwrap();
    {
        let mut guard = cfg.open_dict("").unwrap();
        guard.set("b", 2).unwrap();
    }
    assert_eq!(cfg.get("b").unwrap(), Value::Int(2));
    assert!(cfg.set("c", 3).is_err());
}

#[test]
fn update_merges_containers_by_default() {
    let mut cfg = Config::from_yaml("server:\n  port: 80\n  host: localhost\n").unwrap();
    cfg.update(
        "server",
        Value::map([(Key::from("port"), Value::Int(8080))]),
    )
    .unwrap();
    assert_eq!(cfg.get("server.port").unwrap(), Value::Int(8080));
    // Untouched siblings survive the merge.
    assert_eq!(cfg.get("server.host").unwrap(), Value::from("localhost"));

    // Replacement semantics are opt-out.
    cfg.update_with(
        "server",
        Value::map([(Key::from("port"), Value::Int(9090))]),
        &strata::UpdateOptions {
            merge: false,
            force_add: false,
        },
    )
    .unwrap();
    assert_eq!(cfg.get("server.port").unwrap(), Value::Int(9090));
    assert!(!cfg.contains("server.host"));
}

#[test]
fn dotlist_round_trip_through_element_grammar() {
    let cfg = Config::from_dotlist(&[
        "model.name=resnet",
        "model.layers=50",
        "training.lr=1e-3",
        "training.devices=[0, 1]",
        "flags.verbose=true",
        "link=${model.name}",
    ])
    .unwrap();
    assert_eq!(cfg.get("model.layers").unwrap(), Value::Int(50));
    assert_eq!(cfg.get("training.lr").unwrap(), Value::Float(0.001));
    assert_eq!(
        cfg.get("training.devices").unwrap(),
        Value::list([Value::Int(0), Value::Int(1)])
    );
    assert_eq!(cfg.get("flags.verbose").unwrap(), Value::Bool(true));
    assert_eq!(cfg.get("link").unwrap(), Value::from("resnet"));
}

#[test]
fn get_raw_exposes_expression_text() {
    let cfg = Config::from_yaml("a: 1\nb: ${a}\n").unwrap();
    assert_eq!(cfg.get_raw("b").unwrap(), Value::from("${a}"));
    assert_eq!(cfg.get("b").unwrap(), Value::Int(1));
}
