//! Dotted/bracketed path tokenization: `a.b[0].c`.
//!
//! Shared by the access API, `missing-keys` reporting and error messages,
//! so that the path a caller writes is the path an error prints.

use crate::error::{ConfigError, Result};
use std::fmt;

/// One step of a navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPart {
    /// A map key (also used for integer-keyed maps; navigation decides).
    Key(String),
    /// A list index from a `[n]` segment.
    Index(usize),
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPart::Key(k) => write!(f, "{k}"),
            PathPart::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Tokenize a path. The empty path addresses the root.
pub fn parse_path(path: &str) -> Result<Vec<PathPart>> {
    let mut parts = Vec::new();
    if path.is_empty() {
        return Ok(parts);
    }

    let bad = |message: &str| ConfigError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    let mut chars = path.chars().peekable();
    let mut key = String::new();
    let mut expect_key = true;

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && expect_key {
                    return Err(bad("empty key segment"));
                }
                if !key.is_empty() {
                    parts.push(PathPart::Key(std::mem::take(&mut key)));
                }
                expect_key = true;
            }
            '[' => {
                if !key.is_empty() {
                    parts.push(PathPart::Key(std::mem::take(&mut key)));
                }
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => inner.push(ch),
                        None => return Err(bad("unterminated '[' segment")),
                    }
                }
                if inner.is_empty() {
                    return Err(bad("empty '[]' segment"));
                }
                match inner.parse::<usize>() {
                    Ok(index) => parts.push(PathPart::Index(index)),
                    Err(_) => parts.push(PathPart::Key(inner)),
                }
                expect_key = false;
            }
            ']' => return Err(bad("']' without matching '['")),
            _ => {
                key.push(c);
                expect_key = false;
            }
        }
    }

    if !key.is_empty() {
        parts.push(PathPart::Key(key));
    } else if expect_key {
        return Err(bad("trailing '.'"));
    }
    Ok(parts)
}

/// Join parts back into the canonical path notation: keys dot-joined,
/// indices bracketed (`foo.bar[2]`).
pub fn format_path(parts: &[PathPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            PathPart::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathPart::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_dotted_path() {
        assert_eq!(
            parse_path("a.b.c").unwrap(),
            vec![
                PathPart::Key("a".into()),
                PathPart::Key("b".into()),
                PathPart::Key("c".into()),
            ]
        );
    }

    #[test]
    fn mixed_notation() {
        assert_eq!(
            parse_path("a.b[0].c").unwrap(),
            vec![
                PathPart::Key("a".into()),
                PathPart::Key("b".into()),
                PathPart::Index(0),
                PathPart::Key("c".into()),
            ]
        );
    }

    #[test]
    fn bracketed_string_key() {
        assert_eq!(
            parse_path("a[key with spaces]").unwrap(),
            vec![
                PathPart::Key("a".into()),
                PathPart::Key("key with spaces".into()),
            ]
        );
    }

    #[test]
    fn empty_path_is_root() {
        assert!(parse_path("").unwrap().is_empty());
    }

    #[test]
    fn malformed_paths() {
        assert!(parse_path(".a").is_err());
        assert!(parse_path("a.").is_err());
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[1").is_err());
        assert!(parse_path("a]").is_err());
        assert!(parse_path("a[]").is_err());
    }

    #[test]
    fn round_trip_formatting() {
        for path in ["a.b.c", "a.b[0].c", "list[2]"] {
            assert_eq!(format_path(&parse_path(path).unwrap()), path);
        }
    }
}
