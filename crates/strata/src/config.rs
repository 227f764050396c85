//! The configuration tree and its access / mutation API.
//!
//! A [`Config`] owns an arena of nodes addressed by stable ids. All
//! mutation goes through this API so parent links, flags and declared
//! types stay consistent. Paths use the mixed dotted/bracketed notation
//! `a.b[0].c`.

use crate::error::{ConfigError, InterpolationError, Result};
use crate::eval::{EvalOut, Evaluator};
use crate::node::{Flag, NodeData, NodeId, NodeKind};
use crate::path::{format_path, parse_path, PathPart};
use crate::schema::TypeHint;
use crate::value::{Key, Scalar, ScalarKind, Value};
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Options for [`Config::update_with`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Merge container values into existing containers instead of
    /// replacing them.
    pub merge: bool,
    /// Create keys even under struct mode, along the whole path.
    pub force_add: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            merge: true,
            force_add: false,
        }
    }
}

/// A mutable configuration tree.
pub struct Config {
    pub(crate) nodes: Vec<Option<NodeData>>,
    pub(crate) root: NodeId,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config({})", self.project_raw(self.root))
    }
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let mut copy = Config {
            nodes: Vec::with_capacity(self.nodes.len()),
            root: NodeId(0),
        };
        let root = copy.copy_subtree_from(self, self.root);
        copy.root = root;
        copy
    }
}

/// Equality compares raw structure: values, declared interpolation
/// expressions and MISSING markers, ignoring arena layout.
impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.project_raw(self.root) == other.project_raw(other.root)
    }
}

impl Config {
    /// An empty map root with both flags unset (resolving to false).
    pub fn new() -> Self {
        let mut cfg = Config {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = cfg.alloc(NodeData::container(NodeKind::empty_map(), TypeHint::any()));
        cfg.root = root;
        cfg
    }

    /// Create a tree from a plain map or list value.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_container() {
            return Err(ConfigError::TypeMismatch {
                message: format!("cannot create a config from a {} value", value.kind_name()),
                full_key: String::new(),
                object_type: value.kind_name().to_string(),
            });
        }
        let mut cfg = Config::new();
        let built = cfg.build_node(value, &TypeHint::any(), true, None, "")?;
        cfg.replace_root(built);
        Ok(cfg)
    }

    /// Create a tree from `path=value` assignments. The right-hand side is
    /// parsed through the element grammar; a bare `path` assigns null.
    pub fn from_dotlist<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut cfg = Config::new();
        for item in items {
            let item = item.as_ref();
            let (path, value) = match item.split_once('=') {
                Some((p, rhs)) => (p.trim(), dotlist_value(rhs.trim())?),
                None => (item.trim(), Value::Null),
            };
            cfg.update(path, value)?;
        }
        Ok(cfg)
    }

    // ------------------------------------------------------------------
    // Arena plumbing.

    pub(crate) fn node(&self, id: NodeId) -> &NodeData {
        self.nodes[id.0]
            .as_ref()
            .expect("stale node id: node was freed")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.nodes[id.0]
            .as_mut()
            .expect("stale node id: node was freed")
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(data));
        id
    }

    /// Vacate a subtree. Ids of freed nodes are never reused within one
    /// tree, which keeps outstanding ids unambiguous.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        for child in self.child_ids(id) {
            self.free_subtree(child);
        }
        self.nodes[id.0] = None;
    }

    pub(crate) fn replace_root(&mut self, id: NodeId) {
        if id != self.root {
            self.free_subtree(self.root);
            self.root = id;
            self.node_mut(id).parent = None;
        }
    }

    pub(crate) fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Scalar(_) => Vec::new(),
            NodeKind::Map { entries, .. } => entries.values().copied().collect(),
            NodeKind::List { items } => items.clone(),
        }
    }

    /// The key or index of a node within its parent, by scanning the
    /// parent container. `None` for the root.
    pub(crate) fn key_of(&self, id: NodeId) -> Option<PathPart> {
        let parent = self.node(id).parent?;
        match &self.node(parent).kind {
            NodeKind::Map { entries, .. } => entries
                .iter()
                .find(|(_, child)| **child == id)
                .map(|(key, _)| PathPart::Key(key.to_string())),
            NodeKind::List { items } => items
                .iter()
                .position(|child| *child == id)
                .map(PathPart::Index),
            NodeKind::Scalar(_) => None,
        }
    }

    /// Full dotted/bracketed key from the root, empty for the root itself.
    pub(crate) fn full_key(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = id;
        while let Some(part) = self.key_of(cursor) {
            parts.push(part);
            cursor = self.node(cursor).parent.expect("key_of implies a parent");
        }
        parts.reverse();
        format_path(&parts)
    }

    /// Deep-copy a subtree from another tree (or this one) into this
    /// arena. The copy is detached: its parent is `None` until attached.
    pub(crate) fn copy_subtree_from(&mut self, src: &Config, src_id: NodeId) -> NodeId {
        let source = src.node(src_id);
        let kind = match &source.kind {
            NodeKind::Scalar(s) => NodeKind::Scalar(s.clone()),
            NodeKind::Map { entries, schema } => {
                let mut copied = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    let child_id = self.copy_subtree_from(src, *child);
                    copied.insert(key.clone(), child_id);
                }
                NodeKind::Map {
                    entries: copied,
                    schema: schema.clone(),
                }
            }
            NodeKind::List { items } => {
                let copied = items
                    .iter()
                    .map(|child| self.copy_subtree_from(src, *child))
                    .collect();
                NodeKind::List { items: copied }
            }
        };
        let id = self.alloc(NodeData {
            kind,
            parent: None,
            hint: source.hint.clone(),
            optional: source.optional,
            flags: source.flags,
        });
        for child in self.child_ids(id) {
            self.node_mut(child).parent = Some(id);
        }
        id
    }

    // ------------------------------------------------------------------
    // Building nodes from plain values.

    /// Build a subtree from a plain value, validating against a type
    /// hint. `at` is the would-be path of the node, for error reporting.
    pub(crate) fn build_node(
        &mut self,
        value: Value,
        hint: &TypeHint,
        optional: bool,
        parent: Option<NodeId>,
        at: &str,
    ) -> Result<NodeId> {
        let (hint, optional) = {
            let (inner, opt) = hint.unwrap_optional();
            (inner.clone(), optional || opt)
        };
        let id = match (&hint, value) {
            (TypeHint::Struct(schema), Value::Map(overrides)) => {
                let schema = Arc::clone(schema);
                let mut entries = IndexMap::new();
                let mut overrides = overrides;
                for field in schema.fields() {
                    let child_at = join_key(at, &field.name);
                    let supplied = overrides.shift_remove(&Key::Str(field.name.clone()));
                    let child_value = match supplied {
                        Some(v) => Some(v),
                        None => field.default.as_ref().map(|d| d.materialize()),
                    };
                    let child = match child_value {
                        Some(v) => {
                            self.build_node(v, &field.hint, field.optional, None, &child_at)?
                        }
                        None => {
                            let (inner, opt) = field.hint.unwrap_optional();
                            self.alloc(NodeData::scalar(
                                Scalar::Missing,
                                inner.clone(),
                                field.optional || opt,
                            ))
                        }
                    };
                    self.mark_open_container(child, &field.hint);
                    entries.insert(Key::Str(field.name.clone()), child);
                }
                if let Some((key, _)) = overrides.first() {
                    return Err(ConfigError::NotInStruct {
                        key: key.to_string(),
                        full_key: join_key(at, &key.to_string()),
                    });
                }
                let mut data = NodeData::container(
                    NodeKind::Map {
                        entries,
                        schema: Some(Arc::clone(&schema)),
                    },
                    TypeHint::Struct(schema),
                );
                data.flags.struct_mode = Some(true);
                data.optional = optional;
                self.alloc(data)
            }
            (TypeHint::Struct(schema), Value::Str(s)) => {
                let scalar = self.classify_string(s, at)?;
                if matches!(scalar, Scalar::Str(_)) {
                    return Err(self.validation_value_err(&scalar, &hint, at));
                }
                self.alloc(NodeData::scalar(scalar, TypeHint::Struct(Arc::clone(schema)), optional))
            }
            (TypeHint::Struct(_), other) => {
                return Err(self.validation_plain_err(&other, &hint, at));
            }
            (TypeHint::List(elem), Value::List(items)) => {
                let mut children = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let child_at = format!("{at}[{index}]");
                    children.push(self.build_node(item, elem, false, None, &child_at)?);
                }
                let mut data =
                    NodeData::container(NodeKind::List { items: children }, hint.clone());
                data.optional = optional;
                self.alloc(data)
            }
            (TypeHint::Map(key_kind, elem), Value::Map(entries)) => {
                let mut children = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = coerce_key(key, key_kind, at)?;
                    let child_at = join_key(at, &key.to_string());
                    let child = self.build_node(item, elem, false, None, &child_at)?;
                    children.insert(key, child);
                }
                let mut data = NodeData::container(
                    NodeKind::Map {
                        entries: children,
                        schema: None,
                    },
                    hint.clone(),
                );
                data.optional = optional;
                self.alloc(data)
            }
            (TypeHint::List(_), Value::Str(s)) | (TypeHint::Map(..), Value::Str(s)) => {
                let scalar = self.classify_string(s, at)?;
                if matches!(scalar, Scalar::Str(_)) {
                    return Err(self.validation_value_err(&scalar, &hint, at));
                }
                self.alloc(NodeData::scalar(scalar, hint.clone(), optional))
            }
            (TypeHint::List(_), Value::Null) | (TypeHint::Map(..), Value::Null) => {
                if !optional {
                    return Err(self.validation_plain_err(&Value::Null, &hint, at));
                }
                self.alloc(NodeData::scalar(Scalar::Null, hint.clone(), optional))
            }
            (TypeHint::List(_), other) | (TypeHint::Map(..), other) => {
                return Err(self.validation_plain_err(&other, &hint, at));
            }
            (TypeHint::Union(arms), value) => {
                let scalar = self.value_to_scalar(value, at, &hint)?;
                if matches!(scalar, Scalar::Missing | Scalar::Interp(_)) {
                    self.alloc(NodeData::scalar(scalar, hint.clone(), optional))
                } else if scalar.is_null() {
                    if optional {
                        self.alloc(NodeData::scalar(scalar, hint.clone(), optional))
                    } else {
                        return Err(self.validation_value_err(&scalar, &hint, at));
                    }
                } else if arms.iter().any(|arm| arm.matches_exactly(&scalar)) {
                    self.alloc(NodeData::scalar(scalar, hint.clone(), optional))
                } else {
                    return Err(self.validation_value_err(&scalar, &hint, at));
                }
            }
            (TypeHint::Scalar(kind), Value::List(items)) => {
                if !matches!(kind, ScalarKind::Any) {
                    return Err(self.validation_plain_err(&Value::List(items), &hint, at));
                }
                let value = Value::List(items);
                return self.build_node(
                    value,
                    &TypeHint::list_of(TypeHint::any()),
                    optional,
                    parent,
                    at,
                );
            }
            (TypeHint::Scalar(kind), Value::Map(entries)) => {
                if !matches!(kind, ScalarKind::Any) {
                    return Err(self.validation_plain_err(&Value::Map(entries), &hint, at));
                }
                let value = Value::Map(entries);
                return self.build_node(
                    value,
                    &TypeHint::map_of(ScalarKind::Any, TypeHint::any()),
                    optional,
                    parent,
                    at,
                );
            }
            (TypeHint::Scalar(kind), value) => {
                let scalar = self.value_to_scalar(value, at, &hint)?;
                let scalar = if scalar.is_null() {
                    if !optional && !matches!(kind, ScalarKind::Any) {
                        return Err(self.validation_value_err(&scalar, &hint, at));
                    }
                    scalar
                } else {
                    kind.coerce(scalar).map_err(|e| ConfigError::Validation {
                        value: e.value,
                        expected: e.expected,
                        full_key: at.to_string(),
                    })?
                };
                self.alloc(NodeData::scalar(scalar, hint.clone(), optional))
            }
            (TypeHint::Optional(_), _) => unreachable!("optional unwrapped above"),
        };
        self.node_mut(id).parent = parent;
        Ok(id)
    }

    /// Convert a plain scalar value to a stored scalar, classifying
    /// strings into MISSING / interpolation / plain text.
    fn value_to_scalar(&self, value: Value, at: &str, hint: &TypeHint) -> Result<Scalar> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(b) => Ok(Scalar::Bool(b)),
            Value::Int(i) => Ok(Scalar::Int(i)),
            Value::Float(f) => Ok(Scalar::Float(f)),
            Value::Str(s) => self.classify_string(s, at),
            Value::Bytes(b) => Ok(Scalar::Bytes(b)),
            Value::Enum(e) => Ok(Scalar::Enum(e)),
            Value::Path(p) => Ok(Scalar::Path(p)),
            container => Err(self.validation_plain_err(&container, hint, at)),
        }
    }

    /// Containers declared open (plain list or map hints) are not
    /// themselves struct-locked, even under a struct-bound ancestor.
    pub(crate) fn mark_open_container(&mut self, id: NodeId, hint: &TypeHint) {
        let (inner, _) = hint.unwrap_optional();
        if matches!(inner, TypeHint::List(_) | TypeHint::Map(..))
            && self.node(id).kind.is_container()
        {
            self.node_mut(id).flags.struct_mode = Some(false);
        }
    }

    /// `???` becomes MISSING; strings containing `${` must parse as
    /// interpolation expressions (syntax is checked on assignment,
    /// resolution deferred to access).
    fn classify_string(&self, s: String, _at: &str) -> Result<Scalar> {
        if s == "???" {
            return Ok(Scalar::Missing);
        }
        if s.contains("${") {
            strata_grammar::parse_text(&s)
                .map_err(|e| ConfigError::Interpolation(InterpolationError::Grammar(e)))?;
            return Ok(Scalar::Interp(s));
        }
        Ok(Scalar::Str(s))
    }

    fn validation_plain_err(&self, value: &Value, hint: &TypeHint, at: &str) -> ConfigError {
        ConfigError::Validation {
            value: value.to_string(),
            expected: hint.to_string(),
            full_key: at.to_string(),
        }
    }

    fn validation_value_err(&self, scalar: &Scalar, hint: &TypeHint, at: &str) -> ConfigError {
        ConfigError::Validation {
            value: scalar.to_display_string(),
            expected: hint.to_string(),
            full_key: at.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Navigation.

    /// One navigation step. `Ok(None)` means structural absence; errors
    /// mean the step cannot apply to this node kind.
    pub(crate) fn descend(&self, from: NodeId, part: &PathPart) -> Result<Option<NodeId>> {
        match &self.node(from).kind {
            NodeKind::Map { entries, .. } => {
                let id = match part {
                    PathPart::Key(name) => entries
                        .get(&Key::Str(name.clone()))
                        .or_else(|| {
                            crate::value::parse_int_literal(name)
                                .and_then(|i| entries.get(&Key::Int(i)))
                        })
                        .or_else(|| match name.as_str() {
                            "true" => entries.get(&Key::Bool(true)),
                            "false" => entries.get(&Key::Bool(false)),
                            _ => None,
                        }),
                    PathPart::Index(i) => entries
                        .get(&Key::Int(*i as i64))
                        .or_else(|| entries.get(&Key::Str(i.to_string()))),
                };
                Ok(id.copied())
            }
            NodeKind::List { items } => {
                let index = match part {
                    PathPart::Index(i) => *i,
                    PathPart::Key(name) => match name.parse::<usize>() {
                        Ok(i) => i,
                        Err(_) => {
                            return Err(ConfigError::TypeMismatch {
                                message: format!("list indices must be integers, not `{name}`"),
                                full_key: self.full_key(from),
                                object_type: "list".to_string(),
                            })
                        }
                    },
                };
                Ok(items.get(index).copied())
            }
            NodeKind::Scalar(s) => Err(ConfigError::TypeMismatch {
                message: format!("cannot navigate into a {} value", s.kind_name()),
                full_key: self.full_key(from),
                object_type: s.kind_name().to_string(),
            }),
        }
    }

    /// Strict navigation: absence is an error naming the failing step.
    pub(crate) fn node_at_parts(&self, parts: &[PathPart]) -> Result<NodeId> {
        let mut cursor = self.root;
        for (i, part) in parts.iter().enumerate() {
            match self.descend(cursor, part)? {
                Some(next) => cursor = next,
                None => {
                    let full_key = format_path(&parts[..=i]);
                    return Err(match (part, &self.node(cursor).kind) {
                        (PathPart::Index(index), NodeKind::List { items }) => {
                            ConfigError::IndexOutOfRange {
                                index: *index,
                                len: items.len(),
                                full_key,
                            }
                        }
                        _ => ConfigError::KeyNotFound {
                            key: part.to_string(),
                            full_key,
                        },
                    });
                }
            }
        }
        Ok(cursor)
    }

    pub(crate) fn try_node_at(&self, parts: &[PathPart]) -> Result<Option<NodeId>> {
        let mut cursor = self.root;
        for part in parts {
            match self.descend(cursor, part)? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cursor))
    }

    pub(crate) fn node_at(&self, path: &str) -> Result<NodeId> {
        self.node_at_parts(&parse_path(path)?)
    }

    // ------------------------------------------------------------------
    // Reads.

    /// Read and resolve a value. Interpolations are evaluated; reading a
    /// MISSING scalar fails with a missing-mandatory error.
    pub fn get(&self, path: &str) -> Result<Value> {
        let id = self.node_at(path)?;
        self.read_node(id)
    }

    /// Like [`Config::get`], but structural absence (a missing key or an
    /// out-of-range index) yields the default. Validation and
    /// interpolation errors still propagate.
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Result<Value> {
        match self.get(path) {
            Err(e) if e.is_structural_absence() => Ok(default.into()),
            other => other,
        }
    }

    /// Resolve a path to a value, converting structural absence and
    /// MISSING into `None`.
    pub fn select(&self, path: &str) -> Result<Option<Value>> {
        let parts = parse_path(path)?;
        let Some(id) = self.try_node_at(&parts)? else {
            return Ok(None);
        };
        if let NodeKind::Scalar(Scalar::Missing) = &self.node(id).kind {
            return Ok(None);
        }
        self.read_node(id).map(Some)
    }

    /// Raw read: interpolation expressions come back verbatim and MISSING
    /// comes back as the `???` marker string. Containers project without
    /// resolution.
    pub fn get_raw(&self, path: &str) -> Result<Value> {
        let id = self.node_at(path)?;
        Ok(self.project_raw(id))
    }

    pub fn contains(&self, path: &str) -> bool {
        parse_path(path)
            .and_then(|parts| self.try_node_at(&parts))
            .map(|found| found.is_some())
            .unwrap_or(false)
    }

    /// True when the node holds the MISSING sentinel (without resolving).
    pub fn is_missing(&self, path: &str) -> Result<bool> {
        let id = self.node_at(path)?;
        Ok(matches!(
            &self.node(id).kind,
            NodeKind::Scalar(Scalar::Missing)
        ))
    }

    /// True when the node holds an interpolation expression (without
    /// resolving).
    pub fn is_interpolation(&self, path: &str) -> Result<bool> {
        let id = self.node_at(path)?;
        Ok(matches!(
            &self.node(id).kind,
            NodeKind::Scalar(Scalar::Interp(_))
        ))
    }

    /// Resolve one node to a plain value.
    pub(crate) fn read_node(&self, id: NodeId) -> Result<Value> {
        match &self.node(id).kind {
            NodeKind::Scalar(Scalar::Missing) => Err(ConfigError::MissingMandatory {
                full_key: self.full_key(id),
            }),
            NodeKind::Scalar(Scalar::Interp(_)) => {
                let evaluator = Evaluator::new(self);
                let out = evaluator.resolve_node(id)?;
                self.adapt(out, id)
            }
            NodeKind::Scalar(s) => Ok(crate::eval::scalar_to_value(s)),
            NodeKind::Map { .. } | NodeKind::List { .. } => {
                let evaluator = Evaluator::new(self);
                evaluator.project_resolved(id)
            }
        }
    }

    /// Type adaptation: coerce an interpolation result to the node's
    /// declared kind. Containers pass through as-is.
    pub(crate) fn adapt(&self, out: EvalOut, id: NodeId) -> Result<Value> {
        let node = self.node(id);
        match out {
            EvalOut::Scalar(scalar) => {
                let adapted = match node.hint.unwrap_optional().0 {
                    TypeHint::Scalar(kind) => {
                        kind.coerce(scalar)
                            .map_err(|e| InterpolationError::Validation {
                                message: format!(
                                    "value `{}` is not convertible to {}",
                                    e.value, e.expected
                                ),
                                full_key: self.full_key(id),
                            })?
                    }
                    TypeHint::Union(arms) => {
                        if arms.iter().any(|arm| arm.matches_exactly(&scalar))
                            || scalar.is_null() && node.optional
                        {
                            scalar
                        } else {
                            return Err(InterpolationError::Validation {
                                message: format!(
                                    "value `{}` does not match any arm of {}",
                                    scalar.to_display_string(),
                                    node.hint
                                ),
                                full_key: self.full_key(id),
                            }
                            .into());
                        }
                    }
                    _ => scalar,
                };
                Ok(crate::eval::scalar_to_value(&adapted))
            }
            EvalOut::Plain(value) => Ok(value),
        }
    }

    // ------------------------------------------------------------------
    // Writes.

    /// Assign a value. The parent container must already exist; the new
    /// value is validated against the target's declared type.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let parts = parse_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(ConfigError::TypeMismatch {
                message: "cannot assign to the root; merge instead".to_string(),
                full_key: String::new(),
                object_type: "map".to_string(),
            });
        };
        let parent = self.node_at_parts(parents)?;
        self.write_child(
            parent,
            last,
            value.into(),
            &UpdateOptions {
                merge: false,
                force_add: false,
            },
        )
    }

    /// Update a value, creating intermediate containers as needed.
    /// Containers merge by default; `update_with` exposes the knobs.
    pub fn update(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.update_with(path, value, &UpdateOptions::default())
    }

    pub fn update_with(
        &mut self,
        path: &str,
        value: impl Into<Value>,
        options: &UpdateOptions,
    ) -> Result<()> {
        let parts = parse_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(ConfigError::TypeMismatch {
                message: "cannot update the root; merge instead".to_string(),
                full_key: String::new(),
                object_type: "map".to_string(),
            });
        };

        let mut cursor = self.root;
        for (i, part) in parents.iter().enumerate() {
            match self.descend(cursor, part)? {
                Some(next) => cursor = next,
                None => {
                    // Intermediate containers are created with
                    // inherit-from-parent flags.
                    let at = format_path(&parts[..=i]);
                    self.check_writable(cursor, part, &at, options)?;
                    let child = self.alloc(NodeData::container(
                        NodeKind::empty_map(),
                        TypeHint::any(),
                    ));
                    self.attach(cursor, part, child, &at)?;
                    cursor = child;
                }
            }
        }
        self.write_child(cursor, last, value.into(), options)
    }

    /// Append to a list.
    pub fn append(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.node_at(path)?;
        if self.effective_flag(id, Flag::ReadOnly) {
            return Err(ConfigError::ReadOnly {
                full_key: self.full_key(id),
            });
        }
        let (len, elem) = match &self.node(id).kind {
            NodeKind::List { items } => (
                items.len(),
                match self.node(id).hint.unwrap_optional().0 {
                    TypeHint::List(elem) => (**elem).clone(),
                    _ => TypeHint::any(),
                },
            ),
            other => {
                return Err(ConfigError::TypeMismatch {
                    message: "append target is not a list".to_string(),
                    full_key: self.full_key(id),
                    object_type: other.type_name().to_string(),
                })
            }
        };
        let at = format!("{}[{len}]", self.full_key(id));
        let child = self.build_node(value.into(), &elem, false, Some(id), &at)?;
        match &mut self.node_mut(id).kind {
            NodeKind::List { items } => items.push(child),
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Remove a key or list element and return its resolved value.
    pub fn pop(&mut self, path: &str) -> Result<Value> {
        let parts = parse_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(ConfigError::TypeMismatch {
                message: "cannot pop the root".to_string(),
                full_key: String::new(),
                object_type: "map".to_string(),
            });
        };
        let parent = self.node_at_parts(parents)?;
        if self.effective_flag(parent, Flag::ReadOnly) {
            return Err(ConfigError::ReadOnly {
                full_key: format_path(&parts),
            });
        }
        let id = match self.descend(parent, last)? {
            Some(id) => id,
            None => {
                return Err(ConfigError::KeyNotFound {
                    key: last.to_string(),
                    full_key: format_path(&parts),
                })
            }
        };
        if matches!(&self.node(parent).kind, NodeKind::Map { .. })
            && self.effective_flag(parent, Flag::Struct)
        {
            return Err(ConfigError::NotInStruct {
                key: last.to_string(),
                full_key: format_path(&parts),
            });
        }
        let value = self.read_node(id)?;
        match &mut self.node_mut(parent).kind {
            NodeKind::Map { entries, .. } => {
                let key = entries
                    .iter()
                    .find(|(_, child)| **child == id)
                    .map(|(k, _)| k.clone())
                    .expect("child key present");
                entries.shift_remove(&key);
            }
            NodeKind::List { items } => {
                let index = items.iter().position(|c| *c == id).expect("child present");
                items.remove(index);
            }
            NodeKind::Scalar(_) => unreachable!("descend succeeded through a container"),
        }
        self.free_subtree(id);
        Ok(value)
    }

    /// Like [`Config::pop`], but structural absence yields the default.
    pub fn pop_or(&mut self, path: &str, default: impl Into<Value>) -> Result<Value> {
        match self.pop(path) {
            Err(e) if e.is_structural_absence() => Ok(default.into()),
            other => other,
        }
    }

    fn check_writable(
        &self,
        parent: NodeId,
        part: &PathPart,
        at: &str,
        options: &UpdateOptions,
    ) -> Result<()> {
        if self.effective_flag(parent, Flag::ReadOnly) {
            return Err(ConfigError::ReadOnly {
                full_key: at.to_string(),
            });
        }
        let is_new = self.descend(parent, part)?.is_none();
        if is_new && !options.force_add {
            if let NodeKind::Map { schema, .. } = &self.node(parent).kind {
                if let Some(schema) = schema {
                    let name = part.to_string();
                    if !schema.has_field(&name) {
                        return Err(ConfigError::NotInStruct {
                            key: name,
                            full_key: at.to_string(),
                        });
                    }
                } else if self.effective_flag(parent, Flag::Struct) {
                    return Err(ConfigError::NotInStruct {
                        key: part.to_string(),
                        full_key: at.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Core write primitive: place `value` at `part` under `parent`.
    pub(crate) fn write_child(
        &mut self,
        parent: NodeId,
        part: &PathPart,
        value: Value,
        options: &UpdateOptions,
    ) -> Result<()> {
        let at = {
            let parent_key = self.full_key(parent);
            match part {
                PathPart::Key(k) => join_key(&parent_key, k),
                PathPart::Index(i) => format!("{parent_key}[{i}]"),
            }
        };
        self.check_writable(parent, part, &at, options)?;

        let existing = self.descend(parent, part)?;
        match existing {
            Some(child) => {
                let child_node = self.node(child);
                if options.merge && child_node.kind.is_container() && value.is_container() {
                    return crate::merge::merge_value_into_node(self, child, value, &at);
                }
                let hint = child_node.hint.clone();
                let optional = child_node.optional;
                let flags = child_node.flags;
                let replacement = self.build_node(value, &hint, optional, Some(parent), &at)?;
                self.node_mut(replacement).flags = flags;
                self.replace_child(parent, child, replacement);
                self.free_subtree(child);
                Ok(())
            }
            None => {
                let (hint, optional) = self.child_hint(parent, part);
                let child = self.build_node(value, &hint, optional, Some(parent), &at)?;
                if self.node(parent).schema().is_some() {
                    self.mark_open_container(child, &hint);
                }
                self.attach(parent, part, child, &at)
            }
        }
    }

    /// Declared type for a new child: schema field, then container
    /// element hint, then any.
    fn child_hint(&self, parent: NodeId, part: &PathPart) -> (TypeHint, bool) {
        let node = self.node(parent);
        if let NodeKind::Map { schema: Some(schema), .. } = &node.kind {
            if let PathPart::Key(name) = part {
                if let Some(field) = schema.field(name) {
                    let (inner, opt) = field.hint.unwrap_optional();
                    return (inner.clone(), field.optional || opt);
                }
            }
        }
        match node.hint.unwrap_optional().0 {
            TypeHint::List(elem) => ((**elem).clone(), false),
            TypeHint::Map(_, elem) => ((**elem).clone(), false),
            _ => (TypeHint::any(), true),
        }
    }

    /// Insert a detached node under a container. For maps the key is
    /// coerced to the container's key kind; for lists only appending at
    /// the current length is allowed.
    fn attach(&mut self, parent: NodeId, part: &PathPart, child: NodeId, at: &str) -> Result<()> {
        let key_kind = match self.node(parent).hint.unwrap_optional().0 {
            TypeHint::Map(kind, _) => kind.clone(),
            _ => ScalarKind::Any,
        };
        match &self.node(parent).kind {
            NodeKind::Map { .. } => {
                let key = match part {
                    PathPart::Key(name) => coerce_key(Key::Str(name.clone()), &key_kind, at)?,
                    PathPart::Index(i) => Key::Int(*i as i64),
                };
                match &mut self.node_mut(parent).kind {
                    NodeKind::Map { entries, .. } => {
                        entries.insert(key, child);
                    }
                    _ => unreachable!(),
                }
            }
            NodeKind::List { items } => {
                let len = items.len();
                let index = match part {
                    PathPart::Index(i) => *i,
                    PathPart::Key(name) => name.parse::<usize>().map_err(|_| {
                        ConfigError::TypeMismatch {
                            message: format!("list indices must be integers, not `{name}`"),
                            full_key: at.to_string(),
                            object_type: "list".to_string(),
                        }
                    })?,
                };
                if index != len {
                    return Err(ConfigError::IndexOutOfRange {
                        index,
                        len,
                        full_key: at.to_string(),
                    });
                }
                match &mut self.node_mut(parent).kind {
                    NodeKind::List { items } => items.push(child),
                    _ => unreachable!(),
                }
            }
            NodeKind::Scalar(s) => {
                return Err(ConfigError::TypeMismatch {
                    message: format!("cannot add a child to a {} value", s.kind_name()),
                    full_key: at.to_string(),
                    object_type: s.kind_name().to_string(),
                })
            }
        }
        self.node_mut(child).parent = Some(parent);
        Ok(())
    }

    /// Swap a child id in place, preserving map insertion order and list
    /// position.
    pub(crate) fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        match &mut self.node_mut(parent).kind {
            NodeKind::Map { entries, .. } => {
                for (_, child) in entries.iter_mut() {
                    if *child == old {
                        *child = new;
                        break;
                    }
                }
            }
            NodeKind::List { items } => {
                for child in items.iter_mut() {
                    if *child == old {
                        *child = new;
                        break;
                    }
                }
            }
            NodeKind::Scalar(_) => unreachable!("scalar cannot own children"),
        }
        self.node_mut(new).parent = Some(parent);
    }

    // ------------------------------------------------------------------
    // Flags.

    /// Resolve a flag with inheritance: the nearest ancestor with a
    /// definite value wins, the root defaults to false.
    pub(crate) fn effective_flag(&self, id: NodeId, flag: Flag) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(value) = self.node(current).flags.get(flag) {
                return value;
            }
            cursor = self.node(current).parent;
        }
        false
    }

    pub(crate) fn set_flag_at(&mut self, id: NodeId, flag: Flag, value: Option<bool>) {
        self.node_mut(id).flags.set(flag, value);
    }

    fn container_at(&self, path: &str) -> Result<NodeId> {
        let id = self.node_at(path)?;
        if !self.node(id).kind.is_container() {
            return Err(ConfigError::TypeMismatch {
                message: "flags apply to containers".to_string(),
                full_key: self.full_key(id),
                object_type: self.node(id).kind.type_name().to_string(),
            });
        }
        Ok(id)
    }

    pub fn set_readonly(&mut self, path: &str, value: Option<bool>) -> Result<()> {
        let id = self.container_at(path)?;
        self.set_flag_at(id, Flag::ReadOnly, value);
        Ok(())
    }

    pub fn set_struct(&mut self, path: &str, value: Option<bool>) -> Result<()> {
        let id = self.container_at(path)?;
        self.set_flag_at(id, Flag::Struct, value);
        Ok(())
    }

    pub fn is_readonly(&self, path: &str) -> Result<bool> {
        let id = self.node_at(path)?;
        Ok(self.effective_flag(id, Flag::ReadOnly))
    }

    pub fn is_struct(&self, path: &str) -> Result<bool> {
        let id = self.node_at(path)?;
        Ok(self.effective_flag(id, Flag::Struct))
    }

    /// Scoped flag override, restored when the guard drops (on every exit
    /// path, including errors).
    pub fn flag_override(
        &mut self,
        path: &str,
        flag: Flag,
        value: Option<bool>,
    ) -> Result<FlagGuard<'_>> {
        let id = self.container_at(path)?;
        let prev = self.node(id).flags.get(flag);
        self.set_flag_at(id, flag, value);
        Ok(FlagGuard {
            cfg: self,
            node: id,
            flag,
            prev,
        })
    }

    /// Temporarily lift read-only on a subtree.
    pub fn read_write(&mut self, path: &str) -> Result<FlagGuard<'_>> {
        self.flag_override(path, Flag::ReadOnly, Some(false))
    }

    /// Temporarily lift struct mode on a subtree.
    pub fn open_dict(&mut self, path: &str) -> Result<FlagGuard<'_>> {
        self.flag_override(path, Flag::Struct, Some(false))
    }
}

/// Guard returned by the scoped flag overrides. Dereferences to the
/// config so the override scope can keep operating on the tree.
pub struct FlagGuard<'a> {
    cfg: &'a mut Config,
    node: NodeId,
    flag: Flag,
    prev: Option<bool>,
}

impl Deref for FlagGuard<'_> {
    type Target = Config;

    fn deref(&self) -> &Config {
        self.cfg
    }
}

impl DerefMut for FlagGuard<'_> {
    fn deref_mut(&mut self) -> &mut Config {
        self.cfg
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.cfg.node_mut(self.node).flags.set(self.flag, self.prev);
    }
}

/// Coerce a map key to the container's declared key kind.
pub(crate) fn coerce_key(key: Key, kind: &ScalarKind, at: &str) -> Result<Key> {
    let scalar = match &key {
        Key::Str(s) => Scalar::Str(s.clone()),
        Key::Int(i) => Scalar::Int(*i),
        Key::Bool(b) => Scalar::Bool(*b),
        Key::Float(f) => Scalar::Float(*f),
        Key::Bytes(b) => Scalar::Bytes(b.clone()),
        Key::Enum(e) => Scalar::Enum(e.clone()),
    };
    let coerced = kind.coerce(scalar).map_err(|e| ConfigError::Validation {
        value: e.value,
        expected: format!("{} (map key)", e.expected),
        full_key: at.to_string(),
    })?;
    Ok(match coerced {
        Scalar::Str(s) => Key::Str(s),
        Scalar::Int(i) => Key::Int(i),
        Scalar::Bool(b) => Key::Bool(b),
        Scalar::Float(f) => Key::Float(f),
        Scalar::Bytes(b) => Key::Bytes(b),
        Scalar::Enum(e) => Key::Enum(e),
        other => {
            return Err(ConfigError::Validation {
                value: other.to_display_string(),
                expected: "map key".to_string(),
                full_key: at.to_string(),
            })
        }
    })
}

fn join_key(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

/// Parse a dotlist right-hand side. Interpolation-bearing text is kept
/// verbatim so it lands in the tree as an expression node.
fn dotlist_value(rhs: &str) -> Result<Value> {
    if rhs.contains("${") {
        return Ok(Value::Str(rhs.to_string()));
    }
    let element = strata_grammar::parse_element(rhs)
        .map_err(|e| ConfigError::Interpolation(InterpolationError::Grammar(e)))?;
    element_to_plain(&element)
}

/// Convert an interpolation-free element to a plain value.
pub(crate) fn element_to_plain(element: &strata_grammar::Element) -> Result<Value> {
    use strata_grammar::{Element, Fragment};
    Ok(match element {
        Element::Null => Value::Null,
        Element::Bool(b) => Value::Bool(*b),
        Element::Int(i) => Value::Int(*i),
        Element::Float(f) => Value::Float(*f),
        Element::Str(s) => Value::Str(s.clone()),
        Element::Quoted(text) | Element::Composite(text) => {
            let mut out = String::new();
            for fragment in &text.fragments {
                match fragment {
                    Fragment::Literal(s) => out.push_str(s),
                    Fragment::Escape(c) => out.push(*c),
                    Fragment::Interp(_) => {
                        return Err(ConfigError::Interpolation(InterpolationError::Key {
                            message: "interpolation is not allowed in this context".to_string(),
                            full_key: String::new(),
                        }))
                    }
                }
            }
            Value::Str(out)
        }
        Element::List(items) => {
            Value::List(items.iter().map(element_to_plain).collect::<Result<_>>()?)
        }
        Element::Map(entries) => {
            let mut map = IndexMap::new();
            for (key, value) in entries {
                let key = match element_to_plain(key)? {
                    Value::Str(s) => Key::Str(s),
                    Value::Int(i) => Key::Int(i),
                    Value::Bool(b) => Key::Bool(b),
                    Value::Float(f) => Key::Float(f),
                    other => {
                        return Err(ConfigError::Validation {
                            value: other.to_string(),
                            expected: "map key".to_string(),
                            full_key: String::new(),
                        })
                    }
                };
                map.insert(key, element_to_plain(value)?);
            }
            Value::Map(map)
        }
        Element::Interp(_) => {
            return Err(ConfigError::Interpolation(InterpolationError::Key {
                message: "interpolation is not allowed in this context".to_string(),
                full_key: String::new(),
            }))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumType;

    fn sample() -> Config {
        Config::from_value(Value::map([
            (
                Key::from("server"),
                Value::map([
                    (Key::from("port"), Value::Int(80)),
                    (Key::from("host"), Value::from("localhost")),
                ]),
            ),
            (
                Key::from("users"),
                Value::list([Value::from("user1"), Value::from("user2")]),
            ),
        ]))
        .unwrap()
    }

    #[test]
    fn get_and_set_round_trip() {
        let mut cfg = sample();
        assert_eq!(cfg.get("server.port").unwrap(), Value::Int(80));
        cfg.set("server.port", 8080).unwrap();
        assert_eq!(cfg.get("server.port").unwrap(), Value::Int(8080));
        assert_eq!(cfg.get("users[1]").unwrap(), Value::from("user2"));
    }

    #[test]
    fn key_not_found_reports_full_path() {
        let cfg = sample();
        match cfg.get("server.missing").unwrap_err() {
            ConfigError::KeyNotFound { key, full_key } => {
                assert_eq!(key, "missing");
                assert_eq!(full_key, "server.missing");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn index_out_of_range() {
        let cfg = sample();
        match cfg.get("users[5]").unwrap_err() {
            ConfigError::IndexOutOfRange { index, len, full_key } => {
                assert_eq!(index, 5);
                assert_eq!(len, 2);
                assert_eq!(full_key, "users[5]");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn get_or_converts_only_structural_absence() {
        let mut cfg = sample();
        assert_eq!(cfg.get_or("server.timeout", 30).unwrap(), Value::Int(30));
        cfg.set("server.host", "???").unwrap();
        // MISSING is not structural absence; it still raises.
        assert!(matches!(
            cfg.get_or("server.host", "fallback").unwrap_err(),
            ConfigError::MissingMandatory { .. }
        ));
    }

    #[test]
    fn select_returns_none_for_absent_and_missing() {
        let mut cfg = sample();
        assert_eq!(cfg.select("server.nothing").unwrap(), None);
        cfg.set("server.host", "???").unwrap();
        assert_eq!(cfg.select("server.host").unwrap(), None);
        assert_eq!(cfg.select("server.port").unwrap(), Some(Value::Int(80)));
    }

    #[test]
    fn update_creates_intermediate_containers() {
        let mut cfg = Config::new();
        cfg.update("a.b.c", 1).unwrap();
        assert_eq!(cfg.get("a.b.c").unwrap(), Value::Int(1));
    }

    #[test]
    fn set_does_not_create_intermediates() {
        let mut cfg = Config::new();
        assert!(cfg.set("a.b.c", 1).is_err());
    }

    #[test]
    fn struct_mode_denies_new_keys() {
        let mut cfg = sample();
        cfg.set_struct("", Some(true)).unwrap();
        match cfg.set("server.extra", 1).unwrap_err() {
            ConfigError::NotInStruct { key, .. } => assert_eq!(key, "extra"),
            other => panic!("unexpected {other}"),
        }
        // Existing keys remain assignable.
        cfg.set("server.port", 81).unwrap();
        // force_add defeats struct mode along the path.
        cfg.update_with(
            "server.extra.deep",
            1,
            &UpdateOptions {
                merge: true,
                force_add: true,
            },
        )
        .unwrap();
        assert_eq!(cfg.get("server.extra.deep").unwrap(), Value::Int(1));
    }

    #[test]
    fn read_only_rejects_mutation_of_descendants() {
        let mut cfg = sample();
        cfg.set_readonly("", Some(true)).unwrap();
        assert!(matches!(
            cfg.set("server.port", 1).unwrap_err(),
            ConfigError::ReadOnly { .. }
        ));
        assert!(matches!(
            cfg.pop("users[0]").unwrap_err(),
            ConfigError::ReadOnly { .. }
        ));
    }

    #[test]
    fn read_write_guard_restores_on_drop() {
        let mut cfg = sample();
        cfg.set_readonly("", Some(true)).unwrap();
        {
            let mut guard = cfg.read_write("").unwrap();
            guard.set("server.port", 90).unwrap();
        }
        assert!(cfg.is_readonly("server").unwrap());
        assert_eq!(cfg.get("server.port").unwrap(), Value::Int(90));
        assert!(cfg.set("server.port", 91).is_err());
    }

    #[test]
    fn pop_returns_and_removes() {
        let mut cfg = sample();
        assert_eq!(cfg.pop("server.port").unwrap(), Value::Int(80));
        assert!(!cfg.contains("server.port"));
        assert_eq!(cfg.pop_or("server.port", 0).unwrap(), Value::Int(0));
    }

    #[test]
    fn append_respects_element_type() {
        let mut cfg = sample();
        cfg.append("users", "user3").unwrap();
        assert_eq!(cfg.get("users[2]").unwrap(), Value::from("user3"));
        assert!(cfg.append("server", 1).is_err());
    }

    #[test]
    fn interpolation_syntax_checked_on_assignment() {
        let mut cfg = sample();
        assert!(matches!(
            cfg.set("server.host", "${unclosed").unwrap_err(),
            ConfigError::Interpolation(InterpolationError::Grammar(_))
        ));
        // A valid expression is stored unresolved.
        cfg.set("server.host", "${server.port}").unwrap();
        assert!(cfg.is_interpolation("server.host").unwrap());
    }

    #[test]
    fn declared_type_survives_replacement() {
        let ty = EnumType::new("Mode", ["DEV", "PROD"]);
        let schema = crate::schema::Schema::builder("App")
            .field(crate::schema::Field::new(
                "mode",
                TypeHint::Scalar(ScalarKind::Enum(ty)),
            ))
            .build();
        let mut cfg = Config::structured(&schema).unwrap();
        cfg.set("mode", "DEV").unwrap();
        match cfg.get("mode").unwrap() {
            Value::Enum(e) => assert_eq!(e.member, "DEV"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(cfg.set("mode", "STAGING").is_err());
    }

    #[test]
    fn from_dotlist_builds_nested_values() {
        let cfg = Config::from_dotlist(&[
            "server.port=8080",
            "server.hosts=[a, b]",
            "debug",
            "name='quoted value'",
        ])
        .unwrap();
        assert_eq!(cfg.get("server.port").unwrap(), Value::Int(8080));
        assert_eq!(
            cfg.get("server.hosts").unwrap(),
            Value::list([Value::from("a"), Value::from("b")])
        );
        assert_eq!(cfg.get("debug").unwrap(), Value::Null);
        assert_eq!(cfg.get("name").unwrap(), Value::from("quoted value"));
    }

    #[test]
    fn clone_is_deep() {
        let mut cfg = sample();
        let copy = cfg.clone();
        cfg.set("server.port", 9999).unwrap();
        assert_eq!(copy.get("server.port").unwrap(), Value::Int(80));
        assert_ne!(cfg, copy);
    }

    #[test]
    fn parent_links_compose_back_to_the_node() {
        let cfg = sample();
        let id = cfg.node_at("server.port").unwrap();
        assert_eq!(cfg.full_key(id), "server.port");
        let again = cfg.node_at(&cfg.full_key(id)).unwrap();
        assert_eq!(id, again);
    }
}
