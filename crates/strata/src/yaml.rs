//! The YAML codec boundary.
//!
//! Loading drives `yaml-rust2`'s event parser through a builder (rather
//! than the stock loader) so duplicate keys are detected, insertion order
//! is preserved and quoting style is visible: a plain `1234` is an int
//! while a quoted `"1234"` stays a string. Dumping emits deterministic
//! block YAML where MISSING serializes as `???`, interpolation
//! expressions serialize verbatim and ambiguous strings are quoted.

use crate::config::Config;
use crate::convert::{StructuredMode, ToContainerOptions};
use crate::error::{ConfigError, Result};
use crate::value::{format_float, parse_float_literal, Key, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

impl Config {
    /// Load a single YAML document. Empty documents load to an empty map.
    pub fn from_yaml(source: &str) -> Result<Config> {
        match yaml_to_value(source)? {
            Value::Null => Ok(Config::new()),
            container @ (Value::Map(_) | Value::List(_)) => Config::from_value(container),
            scalar => Err(ConfigError::TypeMismatch {
                message: format!(
                    "top-level YAML value must be a map or a list, got {}",
                    scalar.kind_name()
                ),
                full_key: String::new(),
                object_type: scalar.kind_name().to_string(),
            }),
        }
    }

    /// Serialize to the canonical text form. With `resolve` set,
    /// interpolations are evaluated first; otherwise their expressions are
    /// emitted verbatim.
    pub fn to_yaml(&self, resolve: bool) -> Result<String> {
        let value = self.to_container(&ToContainerOptions {
            resolve,
            throw_on_missing: false,
            structured_mode: StructuredMode::Dict,
        })?;
        let mut out = String::new();
        match &value {
            Value::Map(entries) if entries.is_empty() => out.push_str("{}\n"),
            Value::List(items) if items.is_empty() => out.push_str("[]\n"),
            Value::Map(_) | Value::List(_) => emit_block(&mut out, &value, 0),
            scalar => {
                out.push_str(&emit_scalar(scalar));
                out.push('\n');
            }
        }
        Ok(out)
    }
}

/// Parse a YAML document to a plain value (`oc.create` and the load
/// path).
pub(crate) fn yaml_str_to_value(source: &str) -> Result<Value> {
    yaml_to_value(source)
}

fn yaml_to_value(source: &str) -> Result<Value> {
    let mut parser = Parser::new_from_str(source);
    let mut builder = EventTreeBuilder::default();
    parser
        .load(&mut builder, false)
        .map_err(|e| ConfigError::Yaml {
            message: e.to_string(),
        })?;
    if let Some(message) = builder.error {
        return Err(ConfigError::Yaml { message });
    }
    match builder.root {
        Some(node) => node_to_value(node),
        None => Ok(Value::Null),
    }
}

/// Intermediate parse tree: scalars keep their style and position so
/// classification and duplicate-key reporting happen after the event
/// stream ends.
#[derive(Debug, Clone)]
enum RawNode {
    Scalar {
        text: String,
        style: TScalarStyle,
    },
    List(Vec<RawNode>),
    Map(Vec<(RawNode, Option<RawNode>, Marker)>),
}

enum BuildFrame {
    Seq(Vec<RawNode>, usize),
    Map(Vec<(RawNode, Option<RawNode>, Marker)>, usize),
}

#[derive(Default)]
struct EventTreeBuilder {
    stack: Vec<BuildFrame>,
    root: Option<RawNode>,
    anchors: HashMap<usize, RawNode>,
    error: Option<String>,
}

impl EventTreeBuilder {
    fn push_complete(&mut self, node: RawNode, marker: Marker) {
        match self.stack.last_mut() {
            None => self.root = Some(node),
            Some(BuildFrame::Seq(items, _)) => items.push(node),
            Some(BuildFrame::Map(entries, _)) => match entries.last_mut() {
                Some((_, value @ None, _)) => *value = Some(node),
                _ => entries.push((node, None, marker)),
            },
        }
    }
}

impl MarkedEventReceiver for EventTreeBuilder {
    fn on_event(&mut self, event: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match event {
            Event::Scalar(text, style, anchor_id, _tag) => {
                let node = RawNode::Scalar { text, style };
                if anchor_id > 0 {
                    self.anchors.insert(anchor_id, node.clone());
                }
                self.push_complete(node, marker);
            }
            Event::SequenceStart(anchor_id, _tag) => {
                self.stack.push(BuildFrame::Seq(Vec::new(), anchor_id));
            }
            Event::SequenceEnd => match self.stack.pop() {
                Some(BuildFrame::Seq(items, anchor_id)) => {
                    let node = RawNode::List(items);
                    if anchor_id > 0 {
                        self.anchors.insert(anchor_id, node.clone());
                    }
                    self.push_complete(node, marker);
                }
                _ => self.error = Some("unbalanced sequence events".to_string()),
            },
            Event::MappingStart(anchor_id, _tag) => {
                self.stack.push(BuildFrame::Map(Vec::new(), anchor_id));
            }
            Event::MappingEnd => match self.stack.pop() {
                Some(BuildFrame::Map(entries, anchor_id)) => {
                    let node = RawNode::Map(entries);
                    if anchor_id > 0 {
                        self.anchors.insert(anchor_id, node.clone());
                    }
                    self.push_complete(node, marker);
                }
                _ => self.error = Some("unbalanced mapping events".to_string()),
            },
            Event::Alias(anchor_id) => match self.anchors.get(&anchor_id) {
                Some(node) => self.push_complete(node.clone(), marker),
                None => {
                    self.error = Some(format!("unknown alias id {anchor_id}"));
                }
            },
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

fn node_to_value(node: RawNode) -> Result<Value> {
    match node {
        RawNode::Scalar { text, style } => Ok(classify_scalar(&text, style)),
        RawNode::List(items) => Ok(Value::List(
            items
                .into_iter()
                .map(node_to_value)
                .collect::<Result<_>>()?,
        )),
        RawNode::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key_node, value_node, marker) in entries {
                let key = match key_node {
                    RawNode::Scalar { text, style } => scalar_key(&text, style),
                    _ => {
                        return Err(ConfigError::Yaml {
                            message: format!(
                                "complex mapping keys are not supported (line {})",
                                marker.line()
                            ),
                        })
                    }
                };
                if out.contains_key(&key) {
                    return Err(ConfigError::DuplicateKey {
                        key: key.to_string(),
                        line: marker.line(),
                    });
                }
                let value = match value_node {
                    Some(v) => node_to_value(v)?,
                    None => Value::Null,
                };
                out.insert(key, value);
            }
            Ok(Value::Map(out))
        }
    }
}

/// Scalar resolution per the YAML core schema. Quoted scalars are always
/// strings; `???`, interpolation detection and coercion happen later at
/// node construction.
fn classify_scalar(text: &str, style: TScalarStyle) -> Value {
    if style != TScalarStyle::Plain {
        return Value::Str(text.to_string());
    }
    if text.is_empty() || text == "~" || text.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(i) = parse_yaml_int(text) {
        return Value::Int(i);
    }
    if let Some(f) = parse_yaml_float(text) {
        return Value::Float(f);
    }
    Value::Str(text.to_string())
}

fn scalar_key(text: &str, style: TScalarStyle) -> Key {
    match classify_scalar(text, style) {
        Value::Str(s) => Key::Str(s),
        Value::Int(i) => Key::Int(i),
        Value::Bool(b) => Key::Bool(b),
        Value::Float(f) => Key::Float(f),
        // Null and friends have no key form; keep the raw text.
        _ => Key::Str(text.to_string()),
    }
}

fn parse_yaml_int(text: &str) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = body.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else {
        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        body.parse().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_yaml_float(text: &str) -> Option<f64> {
    match text {
        ".inf" | "+.inf" => return Some(f64::INFINITY),
        "-.inf" => return Some(f64::NEG_INFINITY),
        ".nan" | ".NaN" => return Some(f64::NAN),
        _ => {}
    }
    // The core-schema float forms overlap with the element grammar's,
    // minus underscore separators.
    if let Some(candidate) = parse_float_literal(text) {
        return if text.contains('_') { None } else { Some(candidate) };
    }
    // Integers too large for i64 degrade to floats.
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    None
}

// ----------------------------------------------------------------------
// Emission.

fn emit_block(out: &mut String, value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Map(entries) => {
            for (key, child) in entries {
                let key_text = emit_key(key);
                match child {
                    Value::Map(inner) if !inner.is_empty() => {
                        out.push_str(&format!("{pad}{key_text}:\n"));
                        emit_block(out, child, indent + 1);
                    }
                    Value::List(inner) if !inner.is_empty() => {
                        out.push_str(&format!("{pad}{key_text}:\n"));
                        emit_block(out, child, indent + 1);
                    }
                    _ => {
                        out.push_str(&format!("{pad}{key_text}: {}\n", emit_scalar(child)));
                    }
                }
            }
        }
        Value::List(items) => {
            for child in items {
                match child {
                    Value::Map(inner) if !inner.is_empty() => {
                        out.push_str(&format!("{pad}-\n"));
                        emit_block(out, child, indent + 1);
                    }
                    Value::List(inner) if !inner.is_empty() => {
                        out.push_str(&format!("{pad}-\n"));
                        emit_block(out, child, indent + 1);
                    }
                    _ => {
                        out.push_str(&format!("{pad}- {}\n", emit_scalar(child)));
                    }
                }
            }
        }
        scalar => {
            out.push_str(&format!("{pad}{}\n", emit_scalar(scalar)));
        }
    }
}

fn emit_key(key: &Key) -> String {
    match key {
        Key::Str(s) => emit_str(s),
        other => other.to_string(),
    }
}

fn emit_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => {
            if f.is_nan() {
                ".nan".to_string()
            } else if f.is_infinite() {
                if *f > 0.0 { ".inf" } else { "-.inf" }.to_string()
            } else {
                format_float(*f)
            }
        }
        Value::Str(s) => emit_str(s),
        Value::Bytes(b) => format!("'{b:?}'"),
        Value::Enum(e) => emit_str(&e.qualified()),
        Value::Path(p) => emit_str(&p.display().to_string()),
        Value::Map(entries) if entries.is_empty() => "{}".to_string(),
        Value::List(items) if items.is_empty() => "[]".to_string(),
        Value::Map(_) | Value::List(_) => unreachable!("containers emitted in block form"),
    }
}

fn emit_str(s: &str) -> String {
    // The MISSING marker and interpolation expressions go out verbatim.
    if s == "???" || s.contains("${") {
        return s.to_string();
    }
    if s.contains('\n') || s.chars().any(|c| c.is_control()) {
        let escaped = s
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        return format!("\"{escaped}\"");
    }
    if needs_quoting(s) {
        return format!("'{}'", s.replace('\'', "''"));
    }
    s.to_string()
}

/// Quote anything that would re-parse as a non-string scalar or trip the
/// block grammar. Over-quoting is harmless; under-quoting corrupts
/// round-trips.
fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if !matches!(classify_scalar(s, TScalarStyle::Plain), Value::Str(_)) {
        return true;
    }
    if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
        return true;
    }
    let first = s.chars().next().expect("non-empty checked above");
    if matches!(
        first,
        '#' | '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' | '"' | '\'' | '[' | ']' | '{' | '}'
            | ','
    ) {
        return true;
    }
    if s.starts_with("- ") || s.starts_with("? ") || s == "-" || s == "?" {
        return true;
    }
    if s.contains(": ") || s.ends_with(':') || s.contains(" #") {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_preserves_order_and_types() {
        let cfg = Config::from_yaml("b: 1\na: two\nc:\n  - 1\n  - x\n").unwrap();
        let value = cfg.get_raw("").unwrap();
        match value {
            Value::Map(entries) => {
                let keys: Vec<String> = entries.keys().map(|k| k.to_string()).collect();
                assert_eq!(keys, vec!["b", "a", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cfg.get("b").unwrap(), Value::Int(1));
        assert_eq!(cfg.get("c[1]").unwrap(), Value::from("x"));
    }

    #[test]
    fn quoted_numbers_stay_strings() {
        let cfg = Config::from_yaml("a: '1234'\nb: 1234\n").unwrap();
        assert_eq!(cfg.get("a").unwrap(), Value::from("1234"));
        assert_eq!(cfg.get("b").unwrap(), Value::Int(1234));
    }

    #[test]
    fn duplicate_keys_are_a_load_error() {
        let err = Config::from_yaml("a: 1\nb: 2\na: 3\n").unwrap_err();
        match err {
            ConfigError::DuplicateKey { key, line } => {
                assert_eq!(key, "a");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn empty_document_loads_to_empty_map() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.get_raw("").unwrap(), Value::Map(IndexMap::new()));
        assert_eq!(cfg.to_yaml(false).unwrap(), "{}\n");
    }

    #[test]
    fn missing_round_trips_as_marker() {
        let cfg = Config::from_yaml("a: ???\n").unwrap();
        assert!(cfg.is_missing("a").unwrap());
        assert_eq!(cfg.to_yaml(false).unwrap(), "a: ???\n");
    }

    #[test]
    fn interpolations_serialize_verbatim() {
        let cfg = Config::from_yaml("a: 1\nb: ${a}\n").unwrap();
        assert_eq!(cfg.to_yaml(false).unwrap(), "a: 1\nb: ${a}\n");
        assert_eq!(cfg.to_yaml(true).unwrap(), "a: 1\nb: 1\n");
    }

    #[test]
    fn ambiguous_strings_are_quoted_on_output() {
        let mut cfg = Config::new();
        cfg.update("a", "1234").unwrap();
        cfg.update("b", "true").unwrap();
        cfg.update("c", "null").unwrap();
        let dumped = cfg.to_yaml(false).unwrap();
        assert_eq!(dumped, "a: '1234'\nb: 'true'\nc: 'null'\n");
        // And they come back as strings.
        let reloaded = Config::from_yaml(&dumped).unwrap();
        assert_eq!(reloaded.get("a").unwrap(), Value::from("1234"));
        assert_eq!(reloaded.get("b").unwrap(), Value::from("true"));
    }

    #[test]
    fn round_trip_nested() {
        let source = "server:\n  port: 80\n  hosts:\n    - a\n    - b\nlimit: 1.5\n";
        let cfg = Config::from_yaml(source).unwrap();
        assert_eq!(cfg.to_yaml(false).unwrap(), source);
    }

    #[test]
    fn anchors_and_aliases_expand() {
        let cfg = Config::from_yaml("base: &b\n  x: 1\nother: *b\n").unwrap();
        assert_eq!(cfg.get("other.x").unwrap(), Value::Int(1));
    }

    #[test]
    fn non_finite_floats_round_trip() {
        let cfg = Config::from_yaml("a: .inf\nb: -.inf\nc: .nan\n").unwrap();
        assert_eq!(cfg.get("a").unwrap(), Value::Float(f64::INFINITY));
        assert_eq!(cfg.to_yaml(false).unwrap(), "a: .inf\nb: -.inf\nc: .nan\n");
    }
}
