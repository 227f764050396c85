//! Registry lifecycle: clearing, restoring built-ins, cache invalidation
//! on replacement and snapshot stability. The registry is process-wide,
//! so this lives in its own test binary as one sequential test.

use std::sync::atomic::{AtomicUsize, Ordering};
use strata::{
    clear_resolver, clear_resolvers, has_resolver, register_resolver, Config, RegisterOptions,
    Value,
};

#[test]
fn registry_lifecycle() {
    // --- clearing restores built-ins and drops custom entries ---
    register_resolver("rtest.custom", RegisterOptions::default(), |_| {
        Ok(Value::Int(1))
    })
    .unwrap();
    assert!(has_resolver("rtest.custom"));

    clear_resolvers();
    assert!(!has_resolver("rtest.custom"));
    for builtin in ["oc.env", "oc.decode", "oc.select", "oc.create", "oc.dict.values"] {
        assert!(has_resolver(builtin), "builtin {builtin} missing after clear");
    }

    // A builtin can be removed individually too, and comes back with the
    // next full clear.
    assert!(clear_resolver("oc.env"));
    assert!(!has_resolver("oc.env"));
    clear_resolvers();
    assert!(has_resolver("oc.env"));

    // --- replacement invalidates the cache ---
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    register_resolver(
        "rtest.cached",
        RegisterOptions {
            use_cache: true,
            ..Default::default()
        },
        |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(1))
        },
    )
    .unwrap();

    let cfg = Config::from_yaml("a: ${rtest.cached:x}\n").unwrap();
    assert_eq!(cfg.get("a").unwrap(), Value::Int(1));
    assert_eq!(cfg.get("a").unwrap(), Value::Int(1));
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);

    register_resolver(
        "rtest.cached",
        RegisterOptions {
            replace: true,
            use_cache: true,
        },
        |_| Ok(Value::Int(2)),
    )
    .unwrap();
    assert_eq!(cfg.get("a").unwrap(), Value::Int(2));

    // --- a snapshot is stable across one evaluation ---
    register_resolver("rtest.flip.target", RegisterOptions::default(), |_| {
        Ok(Value::Int(10))
    })
    .unwrap();
    register_resolver("rtest.flip", RegisterOptions::default(), |_| {
        register_resolver(
            "rtest.flip.target",
            RegisterOptions {
                replace: true,
                ..Default::default()
            },
            |_| Ok(Value::Int(20)),
        )
        .unwrap();
        Ok(Value::Int(0))
    })
    .unwrap();

    let cfg = Config::from_yaml("a: ${rtest.flip:}-${rtest.flip.target:}\n").unwrap();
    // The mid-resolve replacement lands after the snapshot was taken, so
    // the old target still runs within this evaluation.
    assert_eq!(cfg.get("a").unwrap(), Value::from("0-10"));
    // A later evaluation sees the new table.
    assert_eq!(
        Config::from_yaml("b: ${rtest.flip.target:}\n")
            .unwrap()
            .get("b")
            .unwrap(),
        Value::Int(20)
    );
}
