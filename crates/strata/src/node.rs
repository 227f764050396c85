//! Node data model: the building blocks of a configuration tree.
//!
//! Nodes live in an arena owned by [`crate::Config`] and address each other
//! through stable [`NodeId`]s. The parent edge is an id, never owning, and
//! is updated when a node is attached or detached; the owning edge is the
//! entry in the parent container.

use crate::schema::{Schema, TypeHint};
use crate::value::{Key, Scalar};
use indexmap::IndexMap;
use std::sync::Arc;

/// Stable handle of a node within one tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Container flags with inherit-from-parent semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Mutation anywhere in the subtree is rejected.
    ReadOnly,
    /// Adding or removing map keys is rejected.
    Struct,
}

/// Per-node flag state. `None` inherits from the nearest ancestor with a
/// definite value; the root defaults to false for both flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub read_only: Option<bool>,
    pub struct_mode: Option<bool>,
}

impl Flags {
    pub fn get(&self, flag: Flag) -> Option<bool> {
        match flag {
            Flag::ReadOnly => self.read_only,
            Flag::Struct => self.struct_mode,
        }
    }

    pub fn set(&mut self, flag: Flag, value: Option<bool>) {
        match flag {
            Flag::ReadOnly => self.read_only = value,
            Flag::Struct => self.struct_mode = value,
        }
    }
}

/// The payload of a node: one scalar or one container.
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Scalar(Scalar),
    Map {
        entries: IndexMap<Key, NodeId>,
        /// Schema backing this container, when bound to a structured
        /// record.
        schema: Option<Arc<Schema>>,
    },
    List {
        items: Vec<NodeId>,
    },
}

impl NodeKind {
    pub fn empty_map() -> Self {
        NodeKind::Map {
            entries: IndexMap::new(),
            schema: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Scalar(s) => s.kind_name(),
            NodeKind::Map { .. } => "map",
            NodeKind::List { .. } => "list",
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, NodeKind::Scalar(_))
    }
}

/// One arena slot: payload plus metadata.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Declared type. For containers this carries the element hint
    /// (`TypeHint::List` / `TypeHint::Map` / `TypeHint::Struct`).
    pub hint: TypeHint,
    /// Whether null is a permitted value.
    pub optional: bool,
    pub flags: Flags,
}

impl NodeData {
    pub fn scalar(scalar: Scalar, hint: TypeHint, optional: bool) -> Self {
        Self {
            kind: NodeKind::Scalar(scalar),
            parent: None,
            hint,
            optional,
            flags: Flags::default(),
        }
    }

    pub fn container(kind: NodeKind, hint: TypeHint) -> Self {
        Self {
            kind,
            parent: None,
            hint,
            optional: true,
            flags: Flags::default(),
        }
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        match &self.kind {
            NodeKind::Map { schema, .. } => schema.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarKind;

    #[test]
    fn flags_default_to_inherit() {
        let flags = Flags::default();
        assert_eq!(flags.get(Flag::ReadOnly), None);
        assert_eq!(flags.get(Flag::Struct), None);
    }

    #[test]
    fn scalar_node_records_declared_type() {
        let node = NodeData::scalar(
            Scalar::Int(8080),
            TypeHint::Scalar(ScalarKind::Int),
            false,
        );
        assert_eq!(node.kind.type_name(), "int");
        assert!(!node.optional);
        assert!(node.parent.is_none());
    }
}
