//! Error taxonomy for the configuration engine.
//!
//! Errors fall into four families: structural (bad path, out-of-range
//! index, struct-mode violation), validation (type or value mismatch),
//! interpolation (its own sub-family so callers can catch broadly), and
//! mandatory-missing. Every variant carries the full key path from the
//! root so failures deep in a tree stay diagnosable.

use strata_grammar::GrammarParseError;
use thiserror::Error;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A path names a map key that does not exist.
    #[error("key `{key}` not found (full key: {full_key})")]
    KeyNotFound { key: String, full_key: String },

    /// A path indexes past the end of a list.
    #[error("index {index} out of range for list of length {len} (full key: {full_key})")]
    IndexOutOfRange {
        index: usize,
        len: usize,
        full_key: String,
    },

    /// Struct mode forbids creating the key.
    #[error("key `{key}` is not in struct (full key: {full_key})")]
    NotInStruct { key: String, full_key: String },

    /// An operation does not apply to the node's kind, e.g. indexing a
    /// scalar or appending to a map.
    #[error("{message} (full key: {full_key}, object type: {object_type})")]
    TypeMismatch {
        message: String,
        full_key: String,
        object_type: String,
    },

    /// A value failed coercion against a declared type.
    #[error("value `{value}` could not be converted to {expected} (full key: {full_key})")]
    Validation {
        value: String,
        expected: String,
        full_key: String,
    },

    /// Mutation attempted under a read-only flag.
    #[error("cannot change read-only config container (full key: {full_key})")]
    ReadOnly { full_key: String },

    /// A MISSING (`???`) scalar was read through a strict accessor.
    #[error("missing mandatory value: {full_key}")]
    MissingMandatory { full_key: String },

    /// An interpolation produced something the surrounding context cannot
    /// accept, or named an unknown resolver.
    #[error("unsupported interpolation type `{type_name}` (full key: {full_key})")]
    UnsupportedInterpolationType {
        type_name: String,
        full_key: String,
    },

    /// The interpolation-resolution family, including grammar failures.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    /// A resolver name was registered twice without `replace`.
    #[error("resolver `{name}` is already registered")]
    ResolverAlreadyRegistered { name: String },

    /// Serialized input contained the same key twice in one mapping.
    #[error("duplicate key `{key}` in YAML input (line {line})")]
    DuplicateKey { key: String, line: usize },

    /// The YAML codec rejected the input.
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// A path string could not be tokenized.
    #[error("invalid path `{path}`: {message}")]
    InvalidPath { path: String, message: String },
}

/// Interpolation-resolution errors. Kept as a separate enum so `match` on
/// [`ConfigError::Interpolation`] covers the whole family at once.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    /// The expression itself does not parse.
    #[error(transparent)]
    Grammar(#[from] GrammarParseError),

    /// A referenced key does not exist, or a relative reference climbed
    /// past the root.
    #[error("interpolation key error: {message} (full key: {full_key})")]
    Key { message: String, full_key: String },

    /// The resolved value failed validation against the declared type of
    /// the node under evaluation.
    #[error("while resolving interpolation at {full_key}: {message}")]
    Validation { message: String, full_key: String },

    /// The reference resolved to a MISSING value.
    #[error("interpolation target `{target}` is a missing mandatory value (full key: {full_key})")]
    ToMissing { target: String, full_key: String },

    /// A reference chain revisited a node already being resolved.
    #[error("interpolation cycle detected: {chain}")]
    Cycle { chain: String },

    /// A resolver callable failed.
    #[error("error executing resolver `{name}`: {message}")]
    Resolver { name: String, message: String },
}

impl ConfigError {
    /// The full key carried by this error, when it has one.
    pub fn full_key(&self) -> Option<&str> {
        match self {
            ConfigError::KeyNotFound { full_key, .. }
            | ConfigError::IndexOutOfRange { full_key, .. }
            | ConfigError::NotInStruct { full_key, .. }
            | ConfigError::TypeMismatch { full_key, .. }
            | ConfigError::Validation { full_key, .. }
            | ConfigError::ReadOnly { full_key }
            | ConfigError::MissingMandatory { full_key }
            | ConfigError::UnsupportedInterpolationType { full_key, .. } => Some(full_key),
            ConfigError::Interpolation(inner) => inner.full_key(),
            _ => None,
        }
    }

    /// True for the structural-absence errors that `select`, `get_or` and
    /// `pop_or` convert into their default.
    pub(crate) fn is_structural_absence(&self) -> bool {
        matches!(
            self,
            ConfigError::KeyNotFound { .. } | ConfigError::IndexOutOfRange { .. }
        )
    }
}

impl InterpolationError {
    pub fn full_key(&self) -> Option<&str> {
        match self {
            InterpolationError::Key { full_key, .. }
            | InterpolationError::Validation { full_key, .. }
            | InterpolationError::ToMissing { full_key, .. } => Some(full_key),
            _ => None,
        }
    }
}
