//! Container utilities: projection to plain values, eager resolution,
//! missing-key enumeration and masked copies.

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::eval::{scalar_to_value, Evaluator};
use crate::node::{NodeId, NodeKind};
use crate::value::{Key, Scalar, Value};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// How schema-bound subtrees are projected by [`Config::to_container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructuredMode {
    /// Project to a plain map like any other container.
    #[default]
    Dict,
    /// Materialize the declared record: forces interpolation resolution
    /// under schema-bound subtrees (regardless of `resolve`) and fails on
    /// MISSING fields.
    Instantiate,
}

/// Options for [`Config::to_container`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ToContainerOptions {
    /// Resolve interpolations instead of emitting their expression text.
    pub resolve: bool,
    /// Fail on MISSING scalars instead of emitting the `???` marker.
    pub throw_on_missing: bool,
    pub structured_mode: StructuredMode,
}

impl Config {
    /// Raw, infallible projection: interpolation expressions come back
    /// verbatim, MISSING as `???`.
    pub(crate) fn project_raw(&self, id: NodeId) -> Value {
        match &self.node(id).kind {
            NodeKind::Scalar(s) => scalar_to_value(s),
            NodeKind::Map { entries, .. } => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    out.insert(key.clone(), self.project_raw(*child));
                }
                Value::Map(out)
            }
            NodeKind::List { items } => {
                Value::List(items.iter().map(|c| self.project_raw(*c)).collect())
            }
        }
    }

    /// Project the whole tree to a plain value.
    pub fn to_container(&self, options: &ToContainerOptions) -> Result<Value> {
        let evaluator = Evaluator::new(self);
        self.project_with(self.root, options, false, &evaluator)
    }

    fn project_with(
        &self,
        id: NodeId,
        options: &ToContainerOptions,
        in_schema: bool,
        evaluator: &Evaluator<'_>,
    ) -> Result<Value> {
        let node = self.node(id);
        let in_schema = in_schema || node.schema().is_some();
        let force = in_schema && options.structured_mode == StructuredMode::Instantiate;
        match &node.kind {
            NodeKind::Scalar(Scalar::Missing) => {
                if options.throw_on_missing || force {
                    Err(ConfigError::MissingMandatory {
                        full_key: self.full_key(id),
                    })
                } else {
                    Ok(Value::Str("???".to_string()))
                }
            }
            NodeKind::Scalar(Scalar::Interp(expr)) => {
                if options.resolve || force {
                    let out = evaluator.resolve_node(id)?;
                    self.adapt(out, id)
                } else {
                    Ok(Value::Str(expr.clone()))
                }
            }
            NodeKind::Scalar(s) => Ok(scalar_to_value(s)),
            NodeKind::Map { entries, .. } => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    out.insert(
                        key.clone(),
                        self.project_with(*child, options, in_schema, evaluator)?,
                    );
                }
                Ok(Value::Map(out))
            }
            NodeKind::List { items } => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.project_with(*child, options, in_schema, evaluator)?);
                }
                Ok(Value::List(out))
            }
        }
    }

    /// Eagerly evaluate every interpolation in place, replacing each
    /// expression node with its resolved value. Idempotent.
    pub fn resolve(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        self.collect_interpolations(self.root, &mut pending);

        // Resolve everything against the unmutated tree first, so results
        // do not depend on replacement order.
        let mut results = Vec::with_capacity(pending.len());
        {
            let evaluator = Evaluator::new(self);
            for id in &pending {
                let out = evaluator.resolve_node(*id)?;
                results.push(self.adapt(out, *id)?);
            }
        }

        for (id, value) in pending.into_iter().zip(results) {
            if value.is_container() {
                let node = self.node(id);
                let hint = node.hint.clone();
                let optional = node.optional;
                let parent = node.parent;
                let at = self.full_key(id);
                let built = self.build_node(value, &hint, optional, parent, &at)?;
                match parent {
                    Some(parent) => {
                        self.replace_child(parent, id, built);
                        self.free_subtree(id);
                    }
                    None => self.replace_root(built),
                }
            } else {
                self.node_mut(id).kind = NodeKind::Scalar(plain_scalar(value));
            }
        }
        Ok(())
    }

    fn collect_interpolations(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match &self.node(id).kind {
            NodeKind::Scalar(Scalar::Interp(_)) => out.push(id),
            NodeKind::Scalar(_) => {}
            _ => {
                for child in self.child_ids(id) {
                    self.collect_interpolations(child, out);
                }
            }
        }
    }

    /// Paths of every descendant scalar holding MISSING, list indices
    /// included (`foo.bar[2]`).
    pub fn missing_keys(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_missing(self.root, &mut out);
        out
    }

    fn collect_missing(&self, id: NodeId, out: &mut BTreeSet<String>) {
        match &self.node(id).kind {
            NodeKind::Scalar(Scalar::Missing) => {
                out.insert(self.full_key(id));
            }
            NodeKind::Scalar(_) => {}
            _ => {
                for child in self.child_ids(id) {
                    self.collect_missing(child, out);
                }
            }
        }
    }

    /// A new tree restricted to the named top-level keys, preserving
    /// declared types and flags. Absent keys are skipped.
    pub fn masked_copy(&self, keys: &[&str]) -> Result<Config> {
        let NodeKind::Map { entries, schema } = &self.node(self.root).kind else {
            return Err(ConfigError::TypeMismatch {
                message: "masked_copy requires a map at the root".to_string(),
                full_key: String::new(),
                object_type: self.node(self.root).kind.type_name().to_string(),
            });
        };

        let mut copy = Config::new();
        let root = copy.root;
        {
            let src_root = self.node(self.root);
            let data = copy.node_mut(root);
            data.hint = src_root.hint.clone();
            data.optional = src_root.optional;
            data.flags = src_root.flags;
        }
        let mut picked = IndexMap::new();
        for name in keys {
            let key = Key::Str((*name).to_string());
            if let Some(child) = entries.get(&key) {
                let copied = copy.copy_subtree_from(self, *child);
                copy.node_mut(copied).parent = Some(root);
                picked.insert(key, copied);
            }
        }
        match &mut copy.node_mut(root).kind {
            NodeKind::Map {
                entries: dst,
                schema: dst_schema,
            } => {
                *dst = picked;
                *dst_schema = schema.clone();
            }
            _ => unreachable!("fresh root is a map"),
        }
        Ok(copy)
    }
}

/// Store an already-resolved plain scalar without re-classification.
fn plain_scalar(value: Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(b),
        Value::Int(i) => Scalar::Int(i),
        Value::Float(f) => Scalar::Float(f),
        Value::Str(s) => Scalar::Str(s),
        Value::Bytes(b) => Scalar::Bytes(b),
        Value::Enum(e) => Scalar::Enum(e),
        Value::Path(p) => Scalar::Path(p),
        Value::List(_) | Value::Map(_) => unreachable!("containers handled by the caller"),
    }
}
