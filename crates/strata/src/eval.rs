//! Interpolation evaluation.
//!
//! The evaluator walks parsed expression trees fragment by fragment. A
//! standalone interpolation passes its referent through unchanged so the
//! referent's type survives; composite text stringifies each piece. Node
//! references resolve relative to the *anchor* (the node whose value is
//! being read); resolver calls evaluate their arguments left-to-right and
//! dispatch through a registry snapshot taken when the evaluator was
//! created, so mid-resolve registry mutation is never observable.

use crate::config::Config;
use crate::error::{ConfigError, InterpolationError, Result};
use crate::node::{NodeId, NodeKind};
use crate::path::PathPart;
use crate::resolver::{ResolverFn, ResolverTable};
use crate::value::{Key, Scalar, Value};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::sync::Arc;
use strata_grammar::{Element, Fragment, Interpolation, NamePart, NodeRef, ResolverCall, Text};

/// The result of evaluating an interpolation: either a typed scalar or a
/// plain container.
#[derive(Debug, Clone)]
pub(crate) enum EvalOut {
    Scalar(Scalar),
    Plain(Value),
}

impl EvalOut {
    pub(crate) fn into_value(self) -> Value {
        match self {
            EvalOut::Scalar(s) => scalar_to_value(&s),
            EvalOut::Plain(v) => v,
        }
    }

    fn stringify(&self) -> String {
        match self {
            EvalOut::Scalar(s) => s.to_display_string(),
            EvalOut::Plain(v) => v.to_string(),
        }
    }
}

/// Projection of a stored scalar to a plain value. MISSING projects to its
/// `???` marker and unresolved expressions to their text; strict accessors
/// guard both cases before calling this.
pub(crate) fn scalar_to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Missing => Value::Str("???".to_string()),
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(i) => Value::Int(*i),
        Scalar::Float(f) => Value::Float(*f),
        Scalar::Str(s) => Value::Str(s.clone()),
        Scalar::Bytes(b) => Value::Bytes(b.clone()),
        Scalar::Enum(e) => Value::Enum(e.clone()),
        Scalar::Path(p) => Value::Path(p.clone()),
        Scalar::Interp(expr) => Value::Str(expr.clone()),
    }
}

fn plain_to_out(value: Value) -> EvalOut {
    match value {
        Value::Null => EvalOut::Scalar(Scalar::Null),
        Value::Bool(b) => EvalOut::Scalar(Scalar::Bool(b)),
        Value::Int(i) => EvalOut::Scalar(Scalar::Int(i)),
        Value::Float(f) => EvalOut::Scalar(Scalar::Float(f)),
        Value::Str(s) => EvalOut::Scalar(Scalar::Str(s)),
        Value::Bytes(b) => EvalOut::Scalar(Scalar::Bytes(b)),
        Value::Enum(e) => EvalOut::Scalar(Scalar::Enum(e)),
        Value::Path(p) => EvalOut::Scalar(Scalar::Path(p)),
        container => EvalOut::Plain(container),
    }
}

/// One evaluation pass over a tree. Holds the registry snapshot and the
/// in-flight node set used for cycle detection.
pub(crate) struct Evaluator<'a> {
    cfg: &'a Config,
    registry: Arc<ResolverTable>,
    active: RefCell<Vec<NodeId>>,
}

/// Navigation cursor: a live node, or a plain value produced mid-path by
/// an interpolation or resolver.
enum Cursor {
    Node(NodeId),
    Plain(Value),
}

impl<'a> Evaluator<'a> {
    pub fn new(cfg: &'a Config) -> Self {
        Self {
            cfg,
            registry: crate::resolver::snapshot(),
            active: RefCell::new(Vec::new()),
        }
    }

    /// Resolve a scalar node holding an interpolation expression.
    pub fn resolve_node(&self, id: NodeId) -> Result<EvalOut> {
        let expr = match &self.cfg.node(id).kind {
            NodeKind::Scalar(Scalar::Interp(expr)) => expr.clone(),
            NodeKind::Scalar(s) => return Ok(EvalOut::Scalar(s.clone())),
            _ => return Ok(EvalOut::Plain(self.project_resolved(id)?)),
        };

        if self.active.borrow().contains(&id) {
            let mut chain: Vec<String> = self
                .active
                .borrow()
                .iter()
                .map(|n| self.cfg.full_key(*n))
                .collect();
            chain.push(self.cfg.full_key(id));
            return Err(InterpolationError::Cycle {
                chain: chain.join(" -> "),
            }
            .into());
        }

        self.active.borrow_mut().push(id);
        let result = strata_grammar::parse_text(&expr)
            .map_err(|e| ConfigError::Interpolation(InterpolationError::Grammar(e)))
            .and_then(|text| self.eval_text(&text, id));
        self.active.borrow_mut().pop();
        result
    }

    /// Project a subtree to a plain value, resolving interpolations.
    /// MISSING children project non-strictly to `???`.
    pub fn project_resolved(&self, id: NodeId) -> Result<Value> {
        match &self.cfg.node(id).kind {
            NodeKind::Scalar(Scalar::Interp(_)) => {
                let out = self.resolve_node(id)?;
                self.cfg.adapt(out, id)
            }
            NodeKind::Scalar(s) => Ok(scalar_to_value(s)),
            NodeKind::Map { entries, .. } => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    out.insert(key.clone(), self.project_resolved(*child)?);
                }
                Ok(Value::Map(out))
            }
            NodeKind::List { items } => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.project_resolved(*child)?);
                }
                Ok(Value::List(out))
            }
        }
    }

    pub fn eval_text(&self, text: &Text, anchor: NodeId) -> Result<EvalOut> {
        if let Some(interp) = text.standalone_interpolation() {
            return self.eval_interp(interp, anchor);
        }
        let mut out = String::new();
        for fragment in &text.fragments {
            match fragment {
                Fragment::Literal(s) => out.push_str(s),
                Fragment::Escape(c) => out.push(*c),
                Fragment::Interp(interp) => {
                    out.push_str(&self.eval_interp(interp, anchor)?.stringify());
                }
            }
        }
        Ok(EvalOut::Scalar(Scalar::Str(out)))
    }

    fn eval_interp(&self, interp: &Interpolation, anchor: NodeId) -> Result<EvalOut> {
        match interp {
            Interpolation::Ref(node_ref) => self.eval_node_ref(node_ref, anchor),
            Interpolation::Call(call) => self.eval_call(call, anchor),
        }
    }

    /// Resolve a node reference against the anchor.
    fn eval_node_ref(&self, node_ref: &NodeRef, anchor: NodeId) -> Result<EvalOut> {
        let target = describe_ref(node_ref);

        let mut cursor = if node_ref.rel_depth == 0 {
            Cursor::Node(self.cfg.root)
        } else {
            let mut current = anchor;
            for _ in 0..node_ref.rel_depth {
                current = self.cfg.node(current).parent.ok_or_else(|| {
                    ConfigError::from(InterpolationError::Key {
                        message: format!("relative interpolation `{target}` exceeds the root"),
                        full_key: self.cfg.full_key(anchor),
                    })
                })?;
            }
            Cursor::Node(current)
        };

        for segment in &node_ref.segments {
            let key = match segment {
                strata_grammar::Segment::Key(k) => k.clone(),
                strata_grammar::Segment::Interp(inner) => {
                    let out = self.eval_interp(inner, anchor)?;
                    match out {
                        EvalOut::Scalar(Scalar::Str(s)) => s,
                        EvalOut::Scalar(Scalar::Int(i)) => i.to_string(),
                        other => {
                            return Err(ConfigError::UnsupportedInterpolationType {
                                type_name: format!(
                                    "`{}` used as a config key",
                                    other.stringify()
                                ),
                                full_key: self.cfg.full_key(anchor),
                            })
                        }
                    }
                }
            };
            cursor = self.step(cursor, &key, &target, anchor)?;
        }

        match cursor {
            Cursor::Node(id) => self.finish_ref(id, &target, anchor),
            Cursor::Plain(value) => Ok(plain_to_out(value)),
        }
    }

    /// One navigation step, passing through interpolation nodes met along
    /// the way.
    fn step(&self, cursor: Cursor, key: &str, target: &str, anchor: NodeId) -> Result<Cursor> {
        let key_error = |full_key: String| {
            ConfigError::from(InterpolationError::Key {
                message: format!("interpolation key `{target}` not found"),
                full_key,
            })
        };

        match cursor {
            Cursor::Node(id) => {
                // Pass through an interpolation before descending.
                if matches!(&self.cfg.node(id).kind, NodeKind::Scalar(Scalar::Interp(_))) {
                    match self.resolve_node(id)? {
                        EvalOut::Plain(value) => {
                            return self.step(Cursor::Plain(value), key, target, anchor)
                        }
                        EvalOut::Scalar(_) => {
                            return Err(key_error(self.cfg.full_key(anchor)));
                        }
                    }
                }
                if let NodeKind::Scalar(s) = &self.cfg.node(id).kind {
                    if s.is_missing() {
                        return Err(InterpolationError::ToMissing {
                            target: target.to_string(),
                            full_key: self.cfg.full_key(anchor),
                        }
                        .into());
                    }
                    return Err(key_error(self.cfg.full_key(anchor)));
                }
                match self.cfg.descend(id, &PathPart::Key(key.to_string())) {
                    Ok(Some(next)) => Ok(Cursor::Node(next)),
                    Ok(None) => Err(key_error(self.cfg.full_key(anchor))),
                    Err(e) => Err(e),
                }
            }
            Cursor::Plain(value) => match value {
                Value::Map(entries) => {
                    let found = entries
                        .get(&Key::Str(key.to_string()))
                        .or_else(|| {
                            crate::value::parse_int_literal(key)
                                .and_then(|i| entries.get(&Key::Int(i)))
                        })
                        .cloned();
                    found
                        .map(Cursor::Plain)
                        .ok_or_else(|| key_error(self.cfg.full_key(anchor)))
                }
                Value::List(items) => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .map(Cursor::Plain)
                    .ok_or_else(|| key_error(self.cfg.full_key(anchor))),
                _ => Err(key_error(self.cfg.full_key(anchor))),
            },
        }
    }

    fn finish_ref(&self, id: NodeId, target: &str, anchor: NodeId) -> Result<EvalOut> {
        match &self.cfg.node(id).kind {
            NodeKind::Scalar(Scalar::Missing) => Err(InterpolationError::ToMissing {
                target: target.to_string(),
                full_key: self.cfg.full_key(anchor),
            }
            .into()),
            NodeKind::Scalar(Scalar::Interp(_)) => self.resolve_node(id),
            NodeKind::Scalar(s) => Ok(EvalOut::Scalar(s.clone())),
            _ => Ok(EvalOut::Plain(self.project_resolved(id)?)),
        }
    }

    /// Evaluate a resolver call: name parts, then arguments left-to-right,
    /// then dispatch.
    fn eval_call(&self, call: &ResolverCall, anchor: NodeId) -> Result<EvalOut> {
        let mut name_parts = Vec::with_capacity(call.name.len());
        for part in &call.name {
            match part {
                NamePart::Ident(s) => name_parts.push(s.clone()),
                NamePart::Interp(inner) => match self.eval_interp(inner, anchor)? {
                    EvalOut::Scalar(Scalar::Str(s)) => name_parts.push(s),
                    other => {
                        return Err(ConfigError::Interpolation(InterpolationError::Key {
                            message: format!(
                                "resolver name must be a string, got `{}`",
                                other.stringify()
                            ),
                            full_key: self.cfg.full_key(anchor),
                        }))
                    }
                },
            }
        }
        let name = name_parts.join(".");

        let Some(entry) = self.registry.get(&name) else {
            return Err(ConfigError::UnsupportedInterpolationType {
                type_name: name,
                full_key: self.cfg.full_key(anchor),
            });
        };

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.eval_element(&arg.value, anchor)?);
        }

        // The cache key is the textual argument list, so differently
        // spelled but identical calls share an entry.
        let cache_key = call
            .args
            .iter()
            .map(|a| a.raw.as_str())
            .collect::<Vec<_>>()
            .join(",");
        if entry.use_cache {
            if let Some(hit) = entry.cached(&cache_key) {
                return Ok(plain_to_out(hit));
            }
        }

        let result = match &entry.func {
            ResolverFn::Plain(f) => f(&args),
            ResolverFn::WithContext(f) => {
                let ctx = ResolverContext {
                    evaluator: self,
                    anchor,
                };
                f(&ctx, &args)
            }
        };
        let value = result.map_err(|e| match e {
            already @ ConfigError::Interpolation(_) => already,
            already @ ConfigError::UnsupportedInterpolationType { .. } => already,
            other => ConfigError::Interpolation(InterpolationError::Resolver {
                name: name.clone(),
                message: other.to_string(),
            }),
        })?;

        // Container results may carry interpolation-bearing strings (the
        // dynamic dict.values references, freshly decoded subconfigs);
        // resolve them against the same anchor.
        let value = if value.is_container() {
            self.resolve_plain(value, anchor)?
        } else {
            value
        };

        if entry.use_cache {
            entry.store(&cache_key, value.clone());
        }
        Ok(plain_to_out(value))
    }

    /// Evaluate one parsed element to a plain value.
    pub(crate) fn eval_element(&self, element: &Element, anchor: NodeId) -> Result<Value> {
        Ok(match element {
            Element::Null => Value::Null,
            Element::Bool(b) => Value::Bool(*b),
            Element::Int(i) => Value::Int(*i),
            Element::Float(f) => Value::Float(*f),
            Element::Str(s) => Value::Str(s.clone()),
            Element::Quoted(text) | Element::Composite(text) => {
                // Quoted and mixed runs always evaluate to strings.
                Value::Str(self.eval_text(text, anchor)?.stringify())
            }
            Element::Interp(interp) => self.eval_interp(interp, anchor)?.into_value(),
            Element::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_element(item, anchor)?);
                }
                Value::List(out)
            }
            Element::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match crate::config::element_to_plain(key)? {
                        Value::Str(s) => Key::Str(s),
                        Value::Int(i) => Key::Int(i),
                        Value::Bool(b) => Key::Bool(b),
                        Value::Float(f) => Key::Float(f),
                        other => {
                            return Err(ConfigError::Interpolation(
                                InterpolationError::Validation {
                                    message: format!("`{other}` is not a valid map key"),
                                    full_key: self.cfg.full_key(anchor),
                                },
                            ))
                        }
                    };
                    out.insert(key, self.eval_element(value, anchor)?);
                }
                Value::Map(out)
            }
        })
    }

    /// Resolve interpolation-bearing strings inside a plain container,
    /// relative to the anchor.
    fn resolve_plain(&self, value: Value, anchor: NodeId) -> Result<Value> {
        Ok(match value {
            Value::Str(s) if s.contains("${") => match strata_grammar::parse_text(&s) {
                Ok(text) if text.has_interpolation() => {
                    self.eval_text(&text, anchor)?.into_value()
                }
                // Not an expression after all: keep the literal.
                _ => Value::Str(s),
            },
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.resolve_plain(v, anchor))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    out.insert(key, self.resolve_plain(item, anchor)?);
                }
                Value::Map(out)
            }
            other => other,
        })
    }
}

/// Context handed to context-aware resolvers: access to the anchor node
/// and root-relative selection within the active evaluation (cycle
/// detection included).
pub struct ResolverContext<'e> {
    evaluator: &'e Evaluator<'e>,
    anchor: NodeId,
}

impl ResolverContext<'_> {
    /// Full key of the node whose value is being resolved.
    pub fn anchor_key(&self) -> String {
        self.evaluator.cfg.full_key(self.anchor)
    }

    /// The parent container of the node under evaluation, projected with
    /// resolution.
    pub fn parent(&self) -> Result<Option<Value>> {
        match self.evaluator.cfg.node(self.anchor).parent {
            Some(parent) => self.evaluator.project_resolved(parent).map(Some),
            None => Ok(None),
        }
    }

    /// The root container, projected with resolution.
    pub fn root(&self) -> Result<Value> {
        self.evaluator.project_resolved(self.evaluator.cfg.root)
    }

    /// Parse and evaluate a string through the element grammar.
    pub fn decode(&self, expr: &str) -> Result<Value> {
        let element = strata_grammar::parse_element(expr)
            .map_err(|e| ConfigError::Interpolation(InterpolationError::Grammar(e)))?;
        self.evaluator.eval_element(&element, self.anchor)
    }

    /// Select a value by path. Leading dots make the path relative to the
    /// anchor, matching node-reference semantics. Absent paths and MISSING
    /// values yield `None`; other failures propagate.
    pub fn select(&self, path: &str) -> Result<Option<Value>> {
        match self.lookup(path)? {
            Some(id) => {
                if matches!(
                    &self.evaluator.cfg.node(id).kind,
                    NodeKind::Scalar(Scalar::Missing)
                ) {
                    return Ok(None);
                }
                match &self.evaluator.cfg.node(id).kind {
                    NodeKind::Scalar(Scalar::Interp(_)) => {
                        let out = self.evaluator.resolve_node(id)?;
                        self.evaluator.cfg.adapt(out, id).map(Some)
                    }
                    NodeKind::Scalar(s) => Ok(Some(scalar_to_value(s))),
                    _ => self.evaluator.project_resolved(id).map(Some),
                }
            }
            None => Ok(None),
        }
    }

    /// Strict variant of [`ResolverContext::select`]: absence is an
    /// interpolation key error.
    pub fn select_strict(&self, path: &str) -> Result<Value> {
        match self.select(path)? {
            Some(value) => Ok(value),
            None => Err(ConfigError::Interpolation(InterpolationError::Key {
                message: format!("interpolation key `{path}` not found"),
                full_key: self.anchor_key(),
            })),
        }
    }

    fn lookup(&self, path: &str) -> Result<Option<NodeId>> {
        let cfg = self.evaluator.cfg;
        let dots = path.len() - path.trim_start_matches('.').len();
        let rest = &path[dots..];
        let mut cursor = if dots == 0 {
            cfg.root
        } else {
            let mut current = self.anchor;
            for _ in 0..dots {
                current = match cfg.node(current).parent {
                    Some(p) => p,
                    None => {
                        return Err(ConfigError::Interpolation(InterpolationError::Key {
                            message: format!("relative key `{path}` exceeds the root"),
                            full_key: self.anchor_key(),
                        }))
                    }
                };
            }
            current
        };
        if rest.is_empty() {
            return Ok(Some(cursor));
        }
        for part in crate::path::parse_path(rest)? {
            match cfg.descend(cursor, &part)? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cursor))
    }
}

/// Syntactic description of a node reference, for error messages.
fn describe_ref(node_ref: &NodeRef) -> String {
    let mut out = ".".repeat(node_ref.rel_depth);
    for (i, segment) in node_ref.segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match segment {
            strata_grammar::Segment::Key(k) => out.push_str(k),
            strata_grammar::Segment::Interp(_) => out.push_str("${…}"),
        }
    }
    out
}
