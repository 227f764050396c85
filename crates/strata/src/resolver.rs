//! The resolver registry.
//!
//! Resolvers are named callables invoked from `${name:args}`
//! interpolations. The registry is process-wide state with copy-on-write
//! semantics: every mutation swaps in a fresh table, and an evaluation
//! snapshots the current table once at entry, so a resolve in flight never
//! observes mid-flight registry changes. Built-in resolvers live under the
//! reserved `oc.` namespace and are restored by [`clear_resolvers`] for
//! test isolation.

use crate::error::{ConfigError, Result};
use crate::eval::ResolverContext;
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// A plain resolver: arguments in, value out.
pub type PlainResolver = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A context-aware resolver, additionally given access to the node under
/// evaluation (anchor, parent and root selection).
pub type ContextResolver =
    Arc<dyn Fn(&ResolverContext<'_>, &[Value]) -> Result<Value> + Send + Sync>;

/// The two callable shapes a resolver can take. Registration picks the
/// shape; the evaluator dispatches on the variant.
#[derive(Clone)]
pub enum ResolverFn {
    Plain(PlainResolver),
    WithContext(ContextResolver),
}

/// Registration knobs for [`register_resolver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// Replace an existing entry instead of failing.
    pub replace: bool,
    /// Memoize results keyed by the textual argument list, so `${r:0,1}`
    /// and `${r:0, 1}` share a cache entry.
    pub use_cache: bool,
}

#[derive(Clone)]
pub(crate) struct ResolverEntry {
    pub func: ResolverFn,
    pub use_cache: bool,
    cache: Arc<Mutex<HashMap<String, Value>>>,
}

impl ResolverEntry {
    pub(crate) fn new(func: ResolverFn, use_cache: bool) -> Self {
        Self {
            func,
            use_cache,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn cached(&self, key: &str) -> Option<Value> {
        self.cache.lock().expect("resolver cache poisoned").get(key).cloned()
    }

    pub(crate) fn store(&self, key: &str, value: Value) {
        self.cache
            .lock()
            .expect("resolver cache poisoned")
            .insert(key.to_string(), value);
    }
}

/// Immutable name → resolver table. Snapshots share entries (and their
/// caches) by reference counting.
#[derive(Clone, Default)]
pub(crate) struct ResolverTable {
    entries: IndexMap<String, ResolverEntry>,
}

impl ResolverTable {
    pub(crate) fn get(&self, name: &str) -> Option<&ResolverEntry> {
        self.entries.get(name)
    }

    pub(crate) fn insert(&mut self, name: &str, entry: ResolverEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

static REGISTRY: Lazy<RwLock<Arc<ResolverTable>>> =
    Lazy::new(|| RwLock::new(Arc::new(crate::builtins::builtin_table())));

/// Snapshot the registry for the duration of one evaluation.
pub(crate) fn snapshot() -> Arc<ResolverTable> {
    Arc::clone(&REGISTRY.read().expect("resolver registry poisoned"))
}

fn mutate(f: impl FnOnce(&mut ResolverTable) -> Result<()>) -> Result<()> {
    let mut guard = REGISTRY.write().expect("resolver registry poisoned");
    let mut table = (**guard).clone();
    f(&mut table)?;
    *guard = Arc::new(table);
    Ok(())
}

/// Register a plain resolver.
///
/// Fails with [`ConfigError::ResolverAlreadyRegistered`] when the name is
/// taken, unless `options.replace` is set. Replacing an entry starts it
/// with an empty cache.
pub fn register_resolver(
    name: &str,
    options: RegisterOptions,
    func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
) -> Result<()> {
    register(name, options, ResolverFn::Plain(Arc::new(func)))
}

/// Register a context-aware resolver.
pub fn register_resolver_with_context(
    name: &str,
    options: RegisterOptions,
    func: impl Fn(&ResolverContext<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
) -> Result<()> {
    register(name, options, ResolverFn::WithContext(Arc::new(func)))
}

fn register(name: &str, options: RegisterOptions, func: ResolverFn) -> Result<()> {
    mutate(|table| {
        if table.contains(name) && !options.replace {
            return Err(ConfigError::ResolverAlreadyRegistered {
                name: name.to_string(),
            });
        }
        table.insert(name, ResolverEntry::new(func, options.use_cache));
        Ok(())
    })
}

pub fn has_resolver(name: &str) -> bool {
    snapshot().contains(name)
}

/// Remove one resolver. Returns whether an entry was removed.
pub fn clear_resolver(name: &str) -> bool {
    let mut removed = false;
    let _ = mutate(|table| {
        removed = table.entries.shift_remove(name).is_some();
        Ok(())
    });
    removed
}

/// Drop every custom resolver and restore the built-ins.
pub fn clear_resolvers() {
    let mut guard = REGISTRY.write().expect("resolver registry poisoned");
    *guard = Arc::new(crate::builtins::builtin_table());
}
