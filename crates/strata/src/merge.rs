//! The layered merge engine.
//!
//! `merge` produces a new tree from a right-biased per-position overlay of
//! its inputs. The engine works on a scratch tree (a copy of the first
//! layer) and only hands it back on success, so a mid-merge validation
//! failure leaves every input observably unchanged. `unsafe_merge` has the
//! identical contract but consumes its inputs.

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::node::{Flag, NodeId, NodeKind};
use crate::schema::TypeHint;
use crate::value::{Key, Scalar};

/// How list containers combine during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMergeMode {
    /// The right list replaces the left.
    #[default]
    Replace,
    /// Left elements followed by right elements.
    Extend,
    /// Left elements followed by right elements not already present
    /// (value equality).
    ExtendUnique,
}

/// Options for [`merge_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub list_mode: ListMergeMode,
}

/// Merge configuration layers left to right; later layers win.
pub fn merge<'a>(configs: impl IntoIterator<Item = &'a Config>) -> Result<Config> {
    merge_with_options(&MergeOptions::default(), configs)
}

pub fn merge_with_options<'a>(
    options: &MergeOptions,
    configs: impl IntoIterator<Item = &'a Config>,
) -> Result<Config> {
    let mut layers = configs.into_iter();
    let Some(first) = layers.next() else {
        return Ok(Config::new());
    };
    let mut dest = first.clone();
    for layer in layers {
        merge_layer(&mut dest, layer, options)?;
    }
    Ok(dest)
}

/// Identical contract to [`merge`], but consumes its inputs so the engine
/// is free to cannibalize them.
pub fn unsafe_merge(configs: Vec<Config>) -> Result<Config> {
    let mut layers = configs.into_iter();
    let Some(mut dest) = layers.next() else {
        return Ok(Config::new());
    };
    let options = MergeOptions::default();
    for layer in layers {
        merge_layer(&mut dest, &layer, &options)?;
    }
    Ok(dest)
}

impl Config {
    /// In-place layered merge: `other` overlays `self`. Performed against
    /// a scratch tree and swapped in on success.
    pub fn merge_with(&mut self, other: &Config) -> Result<()> {
        let merged = merge([&*self, other])?;
        *self = merged;
        Ok(())
    }
}

fn merge_layer(dest: &mut Config, src: &Config, options: &MergeOptions) -> Result<()> {
    let dest_root = dest.root;
    let dest_is_map = matches!(dest.node(dest_root).kind, NodeKind::Map { .. });
    let src_is_map = matches!(src.node(src.root).kind, NodeKind::Map { .. });
    match (dest_is_map, src_is_map) {
        (true, true) => merge_maps(dest, dest_root, src, src.root, options),
        (false, false) => merge_lists(dest, dest_root, src, src.root, options),
        _ => Err(ConfigError::TypeMismatch {
            message: "cannot merge a map with a list".to_string(),
            full_key: String::new(),
            object_type: dest.node(dest_root).kind.type_name().to_string(),
        }),
    }
}

/// Union of keys: left keys keep their order, new right keys follow in
/// their own order. Shared keys recurse.
fn merge_maps(
    dest: &mut Config,
    dest_id: NodeId,
    src: &Config,
    src_id: NodeId,
    options: &MergeOptions,
) -> Result<()> {
    let src_entries: Vec<(Key, NodeId)> = match &src.node(src_id).kind {
        NodeKind::Map { entries, .. } => {
            entries.iter().map(|(k, v)| (k.clone(), *v)).collect()
        }
        _ => unreachable!("merge_maps on a non-map"),
    };

    for (key, src_child) in src_entries {
        // MISSING on the right never overwrites.
        if let NodeKind::Scalar(Scalar::Missing) = &src.node(src_child).kind {
            if dest_map_child(dest, dest_id, &key).is_some() {
                continue;
            }
        }

        match dest_map_child(dest, dest_id, &key) {
            Some(dest_child) => merge_node(dest, dest_child, src, src_child, options)?,
            None => {
                let at = child_key_path(dest, dest_id, &key);
                if let Some(schema) = dest.node(dest_id).schema() {
                    if !schema.has_field(&key.to_string()) {
                        return Err(ConfigError::Validation {
                            value: key.to_string(),
                            expected: format!("a field of {}", schema.name()),
                            full_key: at,
                        });
                    }
                } else if dest.effective_flag(dest_id, Flag::Struct) {
                    return Err(ConfigError::NotInStruct {
                        key: key.to_string(),
                        full_key: at,
                    });
                }
                insert_from_src(dest, dest_id, key, src, src_child, &at)?;
            }
        }
    }
    Ok(())
}

fn dest_map_child(dest: &Config, dest_id: NodeId, key: &Key) -> Option<NodeId> {
    match &dest.node(dest_id).kind {
        NodeKind::Map { entries, .. } => entries.get(key).copied(),
        _ => None,
    }
}

fn child_key_path(dest: &Config, dest_id: NodeId, key: &Key) -> String {
    let base = dest.full_key(dest_id);
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

/// Copy a right-hand subtree into the left under a new key. The value is
/// validated against the left container's declared child type; the new
/// nodes carry unset flags so the left target's flags propagate by
/// inheritance.
fn insert_from_src(
    dest: &mut Config,
    dest_id: NodeId,
    key: Key,
    src: &Config,
    src_child: NodeId,
    at: &str,
) -> Result<()> {
    let (hint, optional) = dest_child_hint(dest, dest_id, &key);
    let raw = src.project_raw(src_child);
    let built = dest.build_node(raw, &hint, optional, Some(dest_id), at)?;
    if dest.node(dest_id).schema().is_some() {
        dest.mark_open_container(built, &hint);
    }
    match &mut dest.node_mut(dest_id).kind {
        NodeKind::Map { entries, .. } => {
            entries.insert(key, built);
        }
        NodeKind::List { items } => items.push(built),
        NodeKind::Scalar(_) => unreachable!("insert into a scalar"),
    }
    Ok(())
}

fn dest_child_hint(dest: &Config, dest_id: NodeId, key: &Key) -> (TypeHint, bool) {
    let node = dest.node(dest_id);
    if let Some(schema) = node.schema() {
        if let Some(field) = schema.field(&key.to_string()) {
            let (inner, opt) = field.hint.unwrap_optional();
            return (inner.clone(), field.optional || opt);
        }
    }
    match node.hint.unwrap_optional().0 {
        TypeHint::List(elem) => ((**elem).clone(), false),
        TypeHint::Map(_, elem) => ((**elem).clone(), false),
        _ => (TypeHint::any(), true),
    }
}

/// Merge one right node onto one left node.
fn merge_node(
    dest: &mut Config,
    dest_id: NodeId,
    src: &Config,
    src_id: NodeId,
    options: &MergeOptions,
) -> Result<()> {
    // MISSING on the right keeps the left value, concrete or not.
    if let NodeKind::Scalar(Scalar::Missing) = &src.node(src_id).kind {
        return Ok(());
    }

    let dest_is = container_shape(&dest.node(dest_id).kind);
    let src_is = container_shape(&src.node(src_id).kind);
    match (dest_is, src_is) {
        (Shape::Map, Shape::Map) => merge_maps(dest, dest_id, src, src_id, options),
        (Shape::List, Shape::List) => merge_lists(dest, dest_id, src, src_id, options),
        _ => replace_node(dest, dest_id, src, src_id),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Shape {
    Map,
    List,
    Scalar,
}

fn container_shape(kind: &NodeKind) -> Shape {
    match kind {
        NodeKind::Map { .. } => Shape::Map,
        NodeKind::List { .. } => Shape::List,
        NodeKind::Scalar(_) => Shape::Scalar,
    }
}

/// Right wins, validated against the left's declared type (the left
/// anchors the schema). Interpolations are copied by expression text, not
/// forwarded to the source tree.
fn replace_node(dest: &mut Config, dest_id: NodeId, src: &Config, src_id: NodeId) -> Result<()> {
    let at = dest.full_key(dest_id);
    let node = dest.node(dest_id);
    let hint = node.hint.clone();
    let optional = node.optional;
    let flags = node.flags;
    let parent = node.parent;

    let raw = src.project_raw(src_id);
    let built = dest.build_node(raw, &hint, optional, parent, &at)?;
    // Flags are preserved on the left target.
    dest.node_mut(built).flags = flags;
    match parent {
        Some(parent) => {
            dest.replace_child(parent, dest_id, built);
            dest.free_subtree(dest_id);
        }
        None => dest.replace_root(built),
    }
    Ok(())
}

fn merge_lists(
    dest: &mut Config,
    dest_id: NodeId,
    src: &Config,
    src_id: NodeId,
    options: &MergeOptions,
) -> Result<()> {
    let src_items: Vec<NodeId> = match &src.node(src_id).kind {
        NodeKind::List { items } => items.clone(),
        _ => unreachable!("merge_lists on a non-list"),
    };

    match options.list_mode {
        ListMergeMode::Replace => {
            // Structured-record elements merge position-wise; the list
            // container itself still follows replace semantics for the
            // tail.
            let elem_is_struct = matches!(
                dest.node(dest_id).hint.unwrap_optional().0,
                TypeHint::List(elem) if matches!(elem.unwrap_optional().0, TypeHint::Struct(_))
            );
            if elem_is_struct {
                return merge_lists_positionwise(dest, dest_id, src, &src_items, options);
            }
            let old: Vec<NodeId> = match &dest.node(dest_id).kind {
                NodeKind::List { items } => items.clone(),
                _ => unreachable!(),
            };
            match &mut dest.node_mut(dest_id).kind {
                NodeKind::List { items } => items.clear(),
                _ => unreachable!(),
            }
            for id in old {
                dest.free_subtree(id);
            }
            for src_child in src_items {
                append_from_src(dest, dest_id, src, src_child)?;
            }
            Ok(())
        }
        ListMergeMode::Extend => {
            for src_child in src_items {
                append_from_src(dest, dest_id, src, src_child)?;
            }
            Ok(())
        }
        ListMergeMode::ExtendUnique => {
            let existing: Vec<crate::value::Value> = dest
                .child_ids(dest_id)
                .into_iter()
                .map(|c| dest.project_raw(c))
                .collect();
            for src_child in src_items {
                let candidate = src.project_raw(src_child);
                if !existing.contains(&candidate) {
                    append_from_src(dest, dest_id, src, src_child)?;
                }
            }
            Ok(())
        }
    }
}

/// Position-wise recursive merge for lists of structured records: shared
/// positions merge field-wise, right extras append.
fn merge_lists_positionwise(
    dest: &mut Config,
    dest_id: NodeId,
    src: &Config,
    src_items: &[NodeId],
    options: &MergeOptions,
) -> Result<()> {
    for (index, src_child) in src_items.iter().enumerate() {
        let dest_child = match &dest.node(dest_id).kind {
            NodeKind::List { items } => items.get(index).copied(),
            _ => unreachable!(),
        };
        match dest_child {
            Some(dest_child) => merge_node(dest, dest_child, src, *src_child, options)?,
            None => append_from_src(dest, dest_id, src, *src_child)?,
        }
    }
    Ok(())
}

fn append_from_src(
    dest: &mut Config,
    dest_id: NodeId,
    src: &Config,
    src_child: NodeId,
) -> Result<()> {
    let (hint, optional) = match dest.node(dest_id).hint.unwrap_optional().0 {
        TypeHint::List(elem) => ((**elem).clone(), false),
        _ => (TypeHint::any(), true),
    };
    let len = dest.child_ids(dest_id).len();
    let at = format!("{}[{len}]", dest.full_key(dest_id));
    let raw = src.project_raw(src_child);
    let built = dest.build_node(raw, &hint, optional, Some(dest_id), &at)?;
    match &mut dest.node_mut(dest_id).kind {
        NodeKind::List { items } => items.push(built),
        _ => unreachable!(),
    }
    Ok(())
}

/// Merge a plain container value into an existing container node; the
/// update API's merge-by-default path.
pub(crate) fn merge_value_into_node(
    dest: &mut Config,
    dest_id: NodeId,
    value: crate::value::Value,
    at: &str,
) -> Result<()> {
    // Build the incoming value as a transient sibling tree, then reuse
    // the node-level merge. The transient is untyped on purpose: the
    // destination anchors the schema, and validation happens while
    // merging so defaults are not re-instantiated over set values.
    let mut transient = Config::new();
    let built = transient.build_node(value, &TypeHint::any(), true, None, at)?;
    transient.replace_root(built);
    let src_root = transient.root;
    merge_node(dest, dest_id, &transient, src_root, &MergeOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn cfg(yaml: &str) -> Config {
        Config::from_yaml(yaml).unwrap()
    }

    fn dump(cfg: &Config) -> Value {
        cfg.project_raw(cfg.root)
    }

    #[test]
    fn right_bias_and_key_order() {
        let left = cfg("a: 1\nb: {x: 1, y: 2}\n");
        let right = cfg("b: {y: 20, z: 30}\nc: 3\n");
        let merged = merge([&left, &right]).unwrap();
        assert_eq!(merged.get("a").unwrap(), Value::Int(1));
        assert_eq!(merged.get("b.x").unwrap(), Value::Int(1));
        assert_eq!(merged.get("b.y").unwrap(), Value::Int(20));
        assert_eq!(merged.get("b.z").unwrap(), Value::Int(30));
        assert_eq!(merged.get("c").unwrap(), Value::Int(3));
        // Left keys first in their order, then new right keys.
        match dump(&merged) {
            Value::Map(entries) => {
                let keys: Vec<String> = entries.keys().map(|k| k.to_string()).collect();
                assert_eq!(keys, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lists_replace_by_default() {
        let left = cfg("users: [u1, u2]\n");
        let right = cfg("users: [u3]\n");
        let merged = merge([&left, &right]).unwrap();
        assert_eq!(merged.get("users").unwrap(), Value::list([Value::from("u3")]));
    }

    #[test]
    fn lists_extend_unique() {
        let left = cfg("server: {port: 80}\nusers: [user1, user2]\n");
        let right = cfg("users: [user2, user3]\n");
        let merged = merge_with_options(
            &MergeOptions {
                list_mode: ListMergeMode::ExtendUnique,
            },
            [&left, &right],
        )
        .unwrap();
        assert_eq!(merged.get("server.port").unwrap(), Value::Int(80));
        assert_eq!(
            merged.get("users").unwrap(),
            Value::list([
                Value::from("user1"),
                Value::from("user2"),
                Value::from("user3")
            ])
        );
    }

    #[test]
    fn missing_on_the_right_never_overwrites() {
        let left = cfg("a: 1\nb: ???\n");
        let right = cfg("a: ???\nb: 2\n");
        let merged = merge([&left, &right]).unwrap();
        assert_eq!(merged.get("a").unwrap(), Value::Int(1));
        assert_eq!(merged.get("b").unwrap(), Value::Int(2));
    }

    #[test]
    fn interpolations_copy_by_expression() {
        let left = cfg("port: 80\nref: 1\n");
        let right = cfg("ref: ${port}\n");
        let merged = merge([&left, &right]).unwrap();
        assert!(merged.is_interpolation("ref").unwrap());
        assert_eq!(merged.get("ref").unwrap(), Value::Int(80));
    }

    #[test]
    fn merge_failure_leaves_inputs_unchanged() {
        let schema = crate::schema::Schema::builder("Server")
            .field(crate::schema::Field::new(
                "port",
                TypeHint::Scalar(crate::value::ScalarKind::Int),
            ))
            .build();
        let mut left = Config::structured(&schema).unwrap();
        left.set("port", 80).unwrap();
        let right = cfg("port: not-a-number\n");

        let before = left.clone();
        assert!(left.merge_with(&right).is_err());
        assert_eq!(left, before);
    }

    #[test]
    fn schema_rejects_unknown_keys() {
        let schema = crate::schema::Schema::builder("Server")
            .field(crate::schema::Field::new(
                "port",
                TypeHint::Scalar(crate::value::ScalarKind::Int),
            ))
            .build();
        let left = Config::structured(&schema).unwrap();
        let right = cfg("unknown: 1\n");
        let err = merge([&left, &right]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn scalar_replaces_container_when_untyped() {
        let left = cfg("a: {b: 1}\n");
        let right = cfg("a: 2\n");
        let merged = merge([&left, &right]).unwrap();
        assert_eq!(merged.get("a").unwrap(), Value::Int(2));
    }

    #[test]
    fn unsafe_merge_matches_merge() {
        let left = cfg("a: 1\nb: {c: 2}\n");
        let right = cfg("b: {d: 3}\n");
        let expected = merge([&left, &right]).unwrap();
        let got = unsafe_merge(vec![left, right]).unwrap();
        assert_eq!(expected, got);
    }

    #[test]
    fn right_associativity_without_replacements() {
        let a = cfg("x: 1\nm: {p: 1}\n");
        let b = cfg("m: {q: 2}\n");
        let c = cfg("x: 3\nm: {p: 9}\n");
        let left_first = merge([&merge([&a, &b]).unwrap(), &c]).unwrap();
        let right_first = merge([&a, &merge([&b, &c]).unwrap()]).unwrap();
        assert_eq!(left_first, right_first);
    }
}
