//! Parse error type for the interpolation grammar.

use thiserror::Error;

/// Error produced when tokenizing or parsing an interpolation-bearing string.
///
/// The offset is a byte offset into the original input, suitable for caret
/// diagnostics by callers that still hold the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte offset {offset})")]
pub struct GrammarParseError {
    /// One-line description of what went wrong.
    pub message: String,
    /// Byte offset of the offending character in the input.
    pub offset: usize,
}

impl GrammarParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Result type alias for grammar operations.
pub type ParseResult<T> = Result<T, GrammarParseError>;
