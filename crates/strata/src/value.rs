//! Scalar and plain-value domains.
//!
//! Two value layers exist. [`Scalar`] is what a scalar *node* stores: the
//! primitive domain plus the MISSING sentinel and unresolved interpolation
//! expressions. [`Value`] is the plain, detached projection used at API
//! boundaries: container conversion output, creation input, resolver
//! arguments and results.

use indexmap::IndexMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

/// A declared enumeration type: a name plus ordered member names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = impl Into<String>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        })
    }

    pub fn ordinal_of(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    pub fn member_at(&self, ordinal: usize) -> Option<&str> {
        self.members.get(ordinal).map(String::as_str)
    }
}

/// A member of a declared enumeration.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub ty: Arc<EnumType>,
    pub member: String,
}

impl EnumValue {
    pub fn new(ty: &Arc<EnumType>, member: impl Into<String>) -> Self {
        Self {
            ty: Arc::clone(ty),
            member: member.into(),
        }
    }

    /// Fully-qualified name, e.g. `Color.RED`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.ty.name, self.member)
    }

    pub fn ordinal(&self) -> Option<usize> {
        self.ty.ordinal_of(&self.member)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty.name == other.ty.name && self.member == other.member
    }
}

impl Eq for EnumValue {}

impl Hash for EnumValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.name.hash(state);
        self.member.hash(state);
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// The declared kind of a scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarKind {
    /// Accepts any scalar unchanged.
    Any,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Path,
    Enum(Arc<EnumType>),
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Any => write!(f, "any"),
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Str => write!(f, "str"),
            ScalarKind::Bytes => write!(f, "bytes"),
            ScalarKind::Path => write!(f, "path"),
            ScalarKind::Enum(ty) => write!(f, "enum {}", ty.name),
        }
    }
}

/// The runtime value held by a scalar node.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// The absent-mandatory sentinel, serialized as `???`.
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Path(PathBuf),
    /// A syntactically-validated interpolation expression, resolved on
    /// access.
    Interp(String),
}

impl Scalar {
    pub fn is_missing(&self) -> bool {
        matches!(self, Scalar::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn is_interpolation(&self) -> bool {
        matches!(self, Scalar::Interp(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Missing => "missing",
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "str",
            Scalar::Bytes(_) => "bytes",
            Scalar::Enum(_) => "enum",
            Scalar::Path(_) => "path",
            Scalar::Interp(_) => "interpolation",
        }
    }

    /// Language-neutral stringification, used when an interpolation result
    /// is spliced into surrounding text and for coercion to `str`.
    pub fn to_display_string(&self) -> String {
        match self {
            Scalar::Missing => "???".to_string(),
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => format_float(*f),
            Scalar::Str(s) => s.clone(),
            Scalar::Bytes(b) => format!("{b:?}"),
            Scalar::Enum(e) => e.qualified(),
            Scalar::Path(p) => p.display().to_string(),
            Scalar::Interp(expr) => expr.clone(),
        }
    }
}

/// Float formatting that keeps the float-ness of integral values visible
/// (`1.0`, not `1`) and uses the reserved lowercase tokens for the
/// non-finite values.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// A map key. Key type is uniform per container when constrained by a
/// schema; otherwise heterogeneous keys are permitted.
#[derive(Debug, Clone)]
pub enum Key {
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    Bytes(Vec<u8>),
    Enum(EnumValue),
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Int(a), Key::Int(b)) => a == b,
            (Key::Bool(a), Key::Bool(b)) => a == b,
            // Bit equality, so same-pattern NaN keys stay retrievable.
            (Key::Float(a), Key::Float(b)) => a.to_bits() == b.to_bits(),
            (Key::Bytes(a), Key::Bytes(b)) => a == b,
            (Key::Enum(a), Key::Enum(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Str(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Key::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Key::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Key::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Key::Bytes(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Key::Enum(e) => {
                5u8.hash(state);
                e.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Float(x) => write!(f, "{}", format_float(*x)),
            Key::Bytes(b) => write!(f, "{b:?}"),
            Key::Enum(e) => write!(f, "{e}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

/// A plain, detached configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Path(PathBuf),
    List(Vec<Value>),
    Map(IndexMap<Key, Value>),
}

impl Value {
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Build a map value from an entry iterator, preserving order.
    pub fn map(entries: impl IntoIterator<Item = (Key, Value)>) -> Self {
        Value::Map(entries.into_iter().collect())
    }

    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }
}

/// Flow-style display, used when container results are spliced into text
/// and in error messages.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{b:?}"),
            Value::Enum(e) => write!(f, "{e}"),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Failed coercion, reported without path context. The config layer wraps
/// this with the full key of the offending node.
#[derive(Debug, Clone, PartialEq)]
pub struct CoerceError {
    /// Display form of the offending raw value.
    pub value: String,
    /// Display form of the target kind.
    pub expected: String,
}

impl CoerceError {
    fn new(value: &Scalar, kind: &ScalarKind) -> Self {
        Self {
            value: value.to_display_string(),
            expected: kind.to_string(),
        }
    }
}

impl ScalarKind {
    /// Coerce a scalar to this kind per the assignment coercion table.
    ///
    /// MISSING, null and interpolation expressions pass through unchanged;
    /// null admissibility and interpolation syntax are enforced by the node
    /// layer. Coercion that would lose information fails.
    pub fn coerce(&self, scalar: Scalar) -> Result<Scalar, CoerceError> {
        if matches!(scalar, Scalar::Missing | Scalar::Null | Scalar::Interp(_)) {
            return Ok(scalar);
        }
        match self {
            ScalarKind::Any => Ok(scalar),
            ScalarKind::Bool => coerce_bool(scalar),
            ScalarKind::Int => coerce_int(scalar),
            ScalarKind::Float => coerce_float(scalar),
            ScalarKind::Str => coerce_str(scalar),
            ScalarKind::Bytes => match scalar {
                Scalar::Bytes(_) => Ok(scalar),
                other => Err(CoerceError::new(&other, self)),
            },
            ScalarKind::Path => match scalar {
                Scalar::Path(_) => Ok(scalar),
                Scalar::Str(s) => Ok(Scalar::Path(PathBuf::from(s))),
                other => Err(CoerceError::new(&other, self)),
            },
            ScalarKind::Enum(ty) => coerce_enum(scalar, ty),
        }
    }

    /// True when the scalar already has exactly this kind, with no
    /// conversion. Union-typed fields use this for arm matching.
    pub fn matches_exactly(&self, scalar: &Scalar) -> bool {
        match (self, scalar) {
            (ScalarKind::Any, _) => true,
            (ScalarKind::Bool, Scalar::Bool(_)) => true,
            (ScalarKind::Int, Scalar::Int(_)) => true,
            (ScalarKind::Float, Scalar::Float(_)) => true,
            (ScalarKind::Str, Scalar::Str(_)) => true,
            (ScalarKind::Bytes, Scalar::Bytes(_)) => true,
            (ScalarKind::Path, Scalar::Path(_)) => true,
            (ScalarKind::Enum(ty), Scalar::Enum(e)) => e.ty.name == ty.name,
            _ => false,
        }
    }
}

fn coerce_bool(scalar: Scalar) -> Result<Scalar, CoerceError> {
    match scalar {
        Scalar::Bool(_) => Ok(scalar),
        Scalar::Str(ref s) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" => Ok(Scalar::Bool(true)),
            "false" | "off" | "no" => Ok(Scalar::Bool(false)),
            _ => Err(CoerceError::new(&scalar, &ScalarKind::Bool)),
        },
        other => Err(CoerceError::new(&other, &ScalarKind::Bool)),
    }
}

fn coerce_int(scalar: Scalar) -> Result<Scalar, CoerceError> {
    match scalar {
        Scalar::Int(_) => Ok(scalar),
        Scalar::Float(f) if f == f.trunc() && f.is_finite() => {
            if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(Scalar::Int(f as i64))
            } else {
                Err(CoerceError::new(&Scalar::Float(f), &ScalarKind::Int))
            }
        }
        Scalar::Str(ref s) => parse_int_literal(s)
            .map(Scalar::Int)
            .ok_or_else(|| CoerceError::new(&scalar, &ScalarKind::Int)),
        other => Err(CoerceError::new(&other, &ScalarKind::Int)),
    }
}

fn coerce_float(scalar: Scalar) -> Result<Scalar, CoerceError> {
    match scalar {
        Scalar::Float(_) => Ok(scalar),
        Scalar::Int(i) => Ok(Scalar::Float(i as f64)),
        Scalar::Str(ref s) => parse_float_literal(s)
            .map(Scalar::Float)
            .ok_or_else(|| CoerceError::new(&scalar, &ScalarKind::Float)),
        other => Err(CoerceError::new(&other, &ScalarKind::Float)),
    }
}

fn coerce_str(scalar: Scalar) -> Result<Scalar, CoerceError> {
    match scalar {
        Scalar::Str(_) => Ok(scalar),
        Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_) | Scalar::Enum(_) | Scalar::Path(_) => {
            Ok(Scalar::Str(scalar.to_display_string()))
        }
        other => Err(CoerceError::new(&other, &ScalarKind::Str)),
    }
}

fn coerce_enum(scalar: Scalar, ty: &Arc<EnumType>) -> Result<Scalar, CoerceError> {
    let kind = ScalarKind::Enum(Arc::clone(ty));
    match scalar {
        Scalar::Enum(ref e) if e.ty.name == ty.name => Ok(scalar.clone()),
        Scalar::Str(ref s) => {
            // Member name, or fully-qualified `Type.MEMBER`.
            let member = s
                .strip_prefix(&format!("{}.", ty.name))
                .unwrap_or(s.as_str());
            if ty.ordinal_of(member).is_some() {
                Ok(Scalar::Enum(EnumValue::new(ty, member)))
            } else {
                Err(CoerceError::new(&scalar, &kind))
            }
        }
        Scalar::Int(i) => {
            let ordinal = usize::try_from(i).ok();
            match ordinal.and_then(|o| ty.member_at(o)) {
                Some(member) => Ok(Scalar::Enum(EnumValue::new(ty, member))),
                None => Err(CoerceError::new(&Scalar::Int(i), &kind)),
            }
        }
        other => Err(CoerceError::new(&other, &kind)),
    }
}

/// Decimal integer literal with optional sign and underscore separators.
pub(crate) fn parse_int_literal(s: &str) -> Option<i64> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    if body.is_empty()
        || !body.chars().all(|c| c.is_ascii_digit() || c == '_')
        || !body.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    s.replace('_', "").parse().ok()
}

/// Decimal or scientific float literal, or the reserved inf/nan tokens.
pub(crate) fn parse_float_literal(s: &str) -> Option<f64> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    if body.eq_ignore_ascii_case("inf") {
        return Some(if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if body.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    if body.is_empty()
        || !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_'))
    {
        return None;
    }
    s.replace('_', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_compares_unequal_to_null() {
        assert_ne!(Scalar::Missing, Scalar::Null);
        assert_ne!(Scalar::Missing, Scalar::Str("???".into()));
        assert_eq!(Scalar::Missing, Scalar::Missing);
    }

    #[test]
    fn bool_coercion_accepts_switch_words() {
        for (text, expected) in [
            ("true", true),
            ("On", true),
            ("YES", true),
            ("false", false),
            ("off", false),
            ("No", false),
        ] {
            assert_eq!(
                ScalarKind::Bool.coerce(Scalar::Str(text.into())).unwrap(),
                Scalar::Bool(expected),
            );
        }
        assert!(ScalarKind::Bool.coerce(Scalar::Str("maybe".into())).is_err());
        assert!(ScalarKind::Bool.coerce(Scalar::Int(1)).is_err());
    }

    #[test]
    fn int_coercion() {
        assert_eq!(
            ScalarKind::Int.coerce(Scalar::Str("1_000".into())).unwrap(),
            Scalar::Int(1000)
        );
        assert_eq!(
            ScalarKind::Int.coerce(Scalar::Str("-42".into())).unwrap(),
            Scalar::Int(-42)
        );
        // Exactly integral floats are accepted.
        assert_eq!(
            ScalarKind::Int.coerce(Scalar::Float(3.0)).unwrap(),
            Scalar::Int(3)
        );
        assert!(ScalarKind::Int.coerce(Scalar::Float(3.5)).is_err());
        assert!(ScalarKind::Int.coerce(Scalar::Str("3.5".into())).is_err());
    }

    #[test]
    fn float_coercion() {
        assert_eq!(
            ScalarKind::Float.coerce(Scalar::Str("1.5e3".into())).unwrap(),
            Scalar::Float(1500.0)
        );
        assert_eq!(
            ScalarKind::Float.coerce(Scalar::Int(2)).unwrap(),
            Scalar::Float(2.0)
        );
        assert_eq!(
            ScalarKind::Float.coerce(Scalar::Str("-INF".into())).unwrap(),
            Scalar::Float(f64::NEG_INFINITY)
        );
        match ScalarKind::Float.coerce(Scalar::Str("nan".into())).unwrap() {
            Scalar::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn str_coercion_stringifies() {
        assert_eq!(
            ScalarKind::Str.coerce(Scalar::Int(10)).unwrap(),
            Scalar::Str("10".into())
        );
        assert_eq!(
            ScalarKind::Str.coerce(Scalar::Float(1.0)).unwrap(),
            Scalar::Str("1.0".into())
        );
        assert_eq!(
            ScalarKind::Str.coerce(Scalar::Bool(true)).unwrap(),
            Scalar::Str("true".into())
        );
    }

    #[test]
    fn enum_coercion_by_name_qualified_name_and_ordinal() {
        let ty = EnumType::new("Color", ["RED", "GREEN", "BLUE"]);
        let kind = ScalarKind::Enum(Arc::clone(&ty));
        let green = Scalar::Enum(EnumValue::new(&ty, "GREEN"));

        assert_eq!(kind.coerce(Scalar::Str("GREEN".into())).unwrap(), green);
        assert_eq!(kind.coerce(Scalar::Str("Color.GREEN".into())).unwrap(), green);
        assert_eq!(kind.coerce(Scalar::Int(1)).unwrap(), green);
        assert!(kind.coerce(Scalar::Str("PINK".into())).is_err());
        assert!(kind.coerce(Scalar::Int(7)).is_err());
    }

    #[test]
    fn null_and_missing_pass_through_typed_kinds() {
        assert_eq!(ScalarKind::Int.coerce(Scalar::Null).unwrap(), Scalar::Null);
        assert_eq!(
            ScalarKind::Int.coerce(Scalar::Missing).unwrap(),
            Scalar::Missing
        );
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn flow_display() {
        let value = Value::map([
            (Key::from("a"), Value::Int(1)),
            (Key::from("b"), Value::list([Value::Int(1), Value::Str("x".into())])),
        ]);
        assert_eq!(value.to_string(), "{a: 1, b: [1, x]}");
    }

    #[test]
    fn float_keys_compare_by_bits() {
        assert_eq!(Key::Float(1.5), Key::Float(1.5));
        // Bit equality makes same-pattern NaN keys retrievable.
        assert_eq!(Key::Float(f64::NAN), Key::Float(f64::NAN));
        assert_ne!(Key::Float(f64::NAN), Key::Float(1.5));
        assert_ne!(Key::Float(0.0), Key::Str("0.0".into()));
    }
}
