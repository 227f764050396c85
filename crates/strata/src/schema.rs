//! Structured schemas: declared record types bound to map containers.
//!
//! A schema is an ordered set of named fields, each carrying a type hint,
//! optionality and an optional default (or default factory for values that
//! should be built fresh per instantiation). Binding a schema produces a
//! map container whose children are typed from the field metadata and whose
//! backing schema drives validation on later mutation and merge.

use crate::config::Config;
use crate::error::Result;
use crate::value::{ScalarKind, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Declared type of a field or container element.
#[derive(Debug, Clone)]
pub enum TypeHint {
    /// A scalar kind; `ScalarKind::Any` accepts anything.
    Scalar(ScalarKind),
    /// Null is permitted in addition to the inner hint.
    Optional(Box<TypeHint>),
    /// The value must exactly match one of the arms, with no cross-arm
    /// coercion.
    Union(Vec<ScalarKind>),
    /// A list container with an element hint.
    List(Box<TypeHint>),
    /// A map container with a key kind and an element hint.
    Map(ScalarKind, Box<TypeHint>),
    /// A nested structured record.
    Struct(Arc<Schema>),
}

impl TypeHint {
    pub fn any() -> Self {
        TypeHint::Scalar(ScalarKind::Any)
    }

    pub fn list_of(elem: TypeHint) -> Self {
        TypeHint::List(Box::new(elem))
    }

    pub fn map_of(key: ScalarKind, elem: TypeHint) -> Self {
        TypeHint::Map(key, Box::new(elem))
    }

    pub fn optional(inner: TypeHint) -> Self {
        TypeHint::Optional(Box::new(inner))
    }

    /// Strip `Optional` wrappers, reporting whether null is permitted.
    pub(crate) fn unwrap_optional(&self) -> (&TypeHint, bool) {
        match self {
            TypeHint::Optional(inner) => (inner.unwrap_optional().0, true),
            other => (other, false),
        }
    }

    pub(crate) fn is_any(&self) -> bool {
        matches!(self, TypeHint::Scalar(ScalarKind::Any))
    }
}

impl PartialEq for TypeHint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeHint::Scalar(a), TypeHint::Scalar(b)) => a == b,
            (TypeHint::Optional(a), TypeHint::Optional(b)) => a == b,
            (TypeHint::Union(a), TypeHint::Union(b)) => a == b,
            (TypeHint::List(a), TypeHint::List(b)) => a == b,
            (TypeHint::Map(ka, va), TypeHint::Map(kb, vb)) => ka == kb && va == vb,
            (TypeHint::Struct(a), TypeHint::Struct(b)) => {
                Arc::ptr_eq(a, b) || a.name() == b.name()
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::Scalar(kind) => write!(f, "{kind}"),
            TypeHint::Optional(inner) => write!(f, "optional {inner}"),
            TypeHint::Union(arms) => {
                let names: Vec<String> = arms.iter().map(|a| a.to_string()).collect();
                write!(f, "union[{}]", names.join(", "))
            }
            TypeHint::List(elem) => write!(f, "list[{elem}]"),
            TypeHint::Map(key, elem) => write!(f, "map[{key}, {elem}]"),
            TypeHint::Struct(schema) => write!(f, "{}", schema.name()),
        }
    }
}

/// Default value for a schema field.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    /// Built fresh at every instantiation, for defaults that should not be
    /// shared between trees.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    pub(crate) fn materialize(&self) -> Value {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => write!(f, "Value({v:?})"),
            FieldDefault::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

impl PartialEq for FieldDefault {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldDefault::Value(a), FieldDefault::Value(b)) => a == b,
            (FieldDefault::Factory(_), FieldDefault::Factory(_)) => true,
            _ => false,
        }
    }
}

/// One declared field of a structured schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub hint: TypeHint,
    pub optional: bool,
    pub default: Option<FieldDefault>,
}

impl Field {
    pub fn new(name: impl Into<String>, hint: TypeHint) -> Self {
        let (_, optional) = hint.unwrap_optional();
        Self {
            name: name.into(),
            hint,
            optional,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn with_default_factory(
        mut self,
        factory: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }
}

/// A declared record type with ordered named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: IndexMap<String, Field>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

impl Config {
    /// Instantiate a schema as a struct-validated configuration tree.
    ///
    /// Fields without a default start out MISSING. The bound container is
    /// struct-locked; descendant containers declared as open (plain list or
    /// map hints) are not.
    pub fn structured(schema: &Arc<Schema>) -> Result<Self> {
        Config::structured_with(schema, Value::Map(IndexMap::new()))
    }

    /// Instantiate a schema with field overrides applied on top of the
    /// declared defaults.
    pub fn structured_with(schema: &Arc<Schema>, overrides: Value) -> Result<Self> {
        let mut cfg = Config::new();
        let hint = TypeHint::Struct(Arc::clone(schema));
        let built = cfg.build_node(overrides, &hint, false, None, "")?;
        cfg.replace_root(built);
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_optionality_tracks_optional_hint() {
        let field = Field::new("x", TypeHint::optional(TypeHint::Scalar(ScalarKind::Int)));
        assert!(field.optional);
        let field = Field::new("y", TypeHint::Scalar(ScalarKind::Int));
        assert!(!field.optional);
    }

    #[test]
    fn builder_preserves_field_order() {
        let schema = Schema::builder("ServerConfig")
            .field(Field::new("port", TypeHint::Scalar(ScalarKind::Int)))
            .field(Field::new("host", TypeHint::Scalar(ScalarKind::Str)).with_default("localhost"))
            .build();
        let names: Vec<&str> = schema.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["port", "host"]);
    }

    #[test]
    fn default_factory_materializes_fresh_values() {
        let field = Field::new("tags", TypeHint::list_of(TypeHint::any()))
            .with_default_factory(|| Value::list([Value::from("a")]));
        let default = field.default.as_ref().unwrap();
        assert_eq!(default.materialize(), Value::list([Value::from("a")]));
    }
}
