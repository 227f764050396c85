//! Recursive-descent parser for the interpolation grammar.
//!
//! Two entry points mirror the grammar's entry productions: [`parse_text`]
//! for the body of a scalar (plain text mixed with interpolations) and
//! [`parse_element`] for a single element (the resolver-argument grammar,
//! also used for dotlist right-hand sides and string decoding).

use crate::ast::{
    Arg, Element, Fragment, Interpolation, NamePart, NodeRef, ResolverCall, Segment, Text,
};
use crate::error::{GrammarParseError, ParseResult};
use crate::lexer::{Lexer, Mode, Token, TokenKind};

/// Parse an interpolation-bearing text value.
pub fn parse_text(source: &str) -> ParseResult<Text> {
    let tokens = Lexer::new(source, Mode::Text).tokenize()?;
    let mut parser = Parser::new(source, tokens);
    parser.parse_text_value()
}

/// Parse a single element: one primitive, quoted string, list or map.
pub fn parse_element(source: &str) -> ParseResult<Element> {
    let tokens = Lexer::new(source, Mode::Value).tokenize()?;
    let mut parser = Parser::new(source, tokens);
    let element = parser.parse_element_until(StopSet::InputEnd)?;
    parser.skip_ws();
    parser.expect_stop(StopSet::InputEnd)?;
    Ok(element)
}

/// Token sets that terminate an element in a given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSet {
    /// Resolver argument: `,` or the closing `}`.
    ArgEnd,
    /// List member: `,` or `]`.
    ListEnd,
    /// Map value: `,` or `}`.
    MapValueEnd,
    /// Map key: `:`.
    MapKeyEnd,
    /// Whole-input element: end of input.
    InputEnd,
}

impl StopSet {
    fn matches(self, kind: &TokenKind) -> bool {
        match self {
            StopSet::ArgEnd => matches!(kind, TokenKind::Comma | TokenKind::InterClose),
            StopSet::ListEnd => matches!(kind, TokenKind::Comma | TokenKind::RBracket),
            StopSet::MapValueEnd => matches!(kind, TokenKind::Comma | TokenKind::RBrace),
            StopSet::MapKeyEnd => matches!(kind, TokenKind::Colon),
            StopSet::InputEnd => matches!(kind, TokenKind::Eof),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// End offset of the most recently consumed token.
    last_end: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            last_end: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].start
    }

    fn bump(&mut self) -> TokenKind {
        let token = self.tokens[self.pos].clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        self.last_end = token.end;
        token.kind
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), TokenKind::Ws(_)) {
            self.bump();
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(GrammarParseError::new(message, self.offset()))
    }

    fn expect_stop(&self, stop: StopSet) -> ParseResult<()> {
        if stop.matches(self.peek()) {
            Ok(())
        } else {
            self.error(format!("unexpected {}", describe(self.peek())))
        }
    }

    /// Top-level text: fragments until end of input.
    fn parse_text_value(&mut self) -> ParseResult<Text> {
        let mut fragments: Vec<Fragment> = Vec::new();
        loop {
            match self.bump() {
                TokenKind::Text(s) => push_literal(&mut fragments, &s),
                TokenKind::Escape(c) => fragments.push(Fragment::Escape(c)),
                TokenKind::InterOpen => {
                    fragments.push(Fragment::Interp(self.parse_interpolation()?));
                }
                TokenKind::Eof => break,
                other => return self.error(format!("unexpected {}", describe(&other))),
            }
        }
        if fragments.is_empty() {
            fragments.push(Fragment::Literal(String::new()));
        }
        Ok(Text::new(fragments))
    }

    /// Everything between `${` and the matching `}`.
    fn parse_interpolation(&mut self) -> ParseResult<Interpolation> {
        self.skip_ws();

        let mut rel_depth = 0;
        while matches!(self.peek(), TokenKind::Dot) {
            self.bump();
            rel_depth += 1;
        }

        let mut segments: Vec<Segment> = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Word(_) => {
                    if let TokenKind::Word(w) = self.bump() {
                        segments.push(Segment::Key(w));
                    }
                }
                TokenKind::InterOpen => {
                    self.bump();
                    segments.push(Segment::Interp(Box::new(self.parse_interpolation()?)));
                }
                TokenKind::LBracket => {
                    self.bump();
                    segments.push(self.parse_bracket_segment()?);
                }
                _ => break,
            }
            match self.peek() {
                TokenKind::Dot => {
                    self.bump();
                }
                TokenKind::LBracket => {}
                _ => break,
            }
        }

        self.skip_ws();
        match self.peek() {
            TokenKind::Colon => {
                self.bump();
                let name = self.resolver_name(rel_depth, segments)?;
                let args = self.parse_args()?;
                match self.bump() {
                    TokenKind::InterClose => Ok(Interpolation::Call(ResolverCall { name, args })),
                    other => self.error(format!(
                        "expected '}}' to close resolver call, found {}",
                        describe(&other)
                    )),
                }
            }
            TokenKind::InterClose => {
                self.bump();
                Ok(Interpolation::Ref(NodeRef {
                    rel_depth,
                    segments,
                }))
            }
            other => {
                let msg = format!("unexpected {} in interpolation", describe(other));
                self.error(msg)
            }
        }
    }

    /// A `[…]` path segment: a literal key, an integer index, or a nested
    /// interpolation.
    fn parse_bracket_segment(&mut self) -> ParseResult<Segment> {
        self.skip_ws();
        let segment = match self.peek() {
            TokenKind::Word(_) => {
                if let TokenKind::Word(w) = self.bump() {
                    Segment::Key(w)
                } else {
                    unreachable!()
                }
            }
            TokenKind::InterOpen => {
                self.bump();
                Segment::Interp(Box::new(self.parse_interpolation()?))
            }
            other => {
                let msg = format!("expected key inside '[…]', found {}", describe(other));
                return self.error(msg);
            }
        };
        self.skip_ws();
        match self.bump() {
            TokenKind::RBracket => Ok(segment),
            other => self.error(format!("expected ']', found {}", describe(&other))),
        }
    }

    /// Reinterpret a parsed path prefix as a resolver name.
    fn resolver_name(
        &self,
        rel_depth: usize,
        segments: Vec<Segment>,
    ) -> ParseResult<Vec<NamePart>> {
        if rel_depth > 0 {
            return self.error("resolver name cannot start with '.'");
        }
        if segments.is_empty() {
            return self.error("missing resolver name before ':'");
        }
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Key(word) => {
                    if !is_identifier(&word) {
                        return self.error(format!(
                            "invalid resolver name part `{word}` (expected identifier)"
                        ));
                    }
                    parts.push(NamePart::Ident(word));
                }
                Segment::Interp(interp) => parts.push(NamePart::Interp(interp)),
            }
        }
        Ok(parts)
    }

    /// The comma-separated argument list of a resolver call. The caller
    /// consumes the closing `}`.
    fn parse_args(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();
        self.skip_ws();
        if matches!(self.peek(), TokenKind::InterClose) {
            return Ok(args);
        }
        loop {
            self.skip_ws();
            let start = self.offset();
            let value = self.parse_element_until(StopSet::ArgEnd)?;
            let end = self.last_end.max(start);
            let raw = self.source[start..end].trim().to_string();
            if raw.is_empty() {
                // DEPRECATED: empty arguments should be written as ''.
                tracing::warn!(
                    "empty resolver argument is deprecated, use a quoted empty string instead"
                );
            }
            args.push(Arg { value, raw });
            match self.peek() {
                TokenKind::Comma => {
                    self.bump();
                    self.skip_ws();
                    // A trailing comma yields one final empty argument.
                    if matches!(self.peek(), TokenKind::InterClose) {
                        tracing::warn!(
                            "empty resolver argument is deprecated, use a quoted empty string instead"
                        );
                        args.push(Arg {
                            value: Element::Str(String::new()),
                            raw: String::new(),
                        });
                        break;
                    }
                }
                TokenKind::InterClose => break,
                other => {
                    let msg = format!("unexpected {} in argument list", describe(other));
                    return self.error(msg);
                }
            }
        }
        Ok(args)
    }

    /// One element terminated by `stop`. The stop token is not consumed.
    fn parse_element_until(&mut self, stop: StopSet) -> ParseResult<Element> {
        self.skip_ws();
        match self.peek() {
            TokenKind::QuoteOpen(_) => {
                let element = self.parse_quoted()?;
                self.skip_ws();
                self.expect_after_closed_element(stop)?;
                Ok(element)
            }
            TokenKind::LBracket => {
                let element = self.parse_list()?;
                self.skip_ws();
                self.expect_after_closed_element(stop)?;
                Ok(element)
            }
            TokenKind::LBrace => {
                let element = self.parse_map()?;
                self.skip_ws();
                self.expect_after_closed_element(stop)?;
                Ok(element)
            }
            _ => self.parse_unquoted_run(stop),
        }
    }

    fn expect_after_closed_element(&self, stop: StopSet) -> ParseResult<()> {
        if stop.matches(self.peek()) {
            Ok(())
        } else {
            self.error(format!(
                "unexpected {} after element",
                describe(self.peek())
            ))
        }
    }

    /// A quoted string, possibly containing nested interpolations.
    fn parse_quoted(&mut self) -> ParseResult<Element> {
        let quote = match self.bump() {
            TokenKind::QuoteOpen(q) => q,
            _ => unreachable!("parse_quoted called off a quote"),
        };
        let mut fragments: Vec<Fragment> = Vec::new();
        loop {
            match self.bump() {
                TokenKind::Text(s) => push_literal(&mut fragments, &s),
                TokenKind::Escape(c) => fragments.push(Fragment::Escape(c)),
                TokenKind::InterOpen => {
                    fragments.push(Fragment::Interp(self.parse_interpolation()?));
                }
                TokenKind::QuoteClose(q) if q == quote => break,
                TokenKind::Eof => {
                    return self.error("unterminated quoted string");
                }
                other => return self.error(format!("unexpected {}", describe(&other))),
            }
        }
        if fragments.is_empty() {
            fragments.push(Fragment::Literal(String::new()));
        }
        Ok(Element::Quoted(Text::new(fragments)))
    }

    fn parse_list(&mut self) -> ParseResult<Element> {
        self.bump(); // [
        let mut items = Vec::new();
        self.skip_ws();
        if matches!(self.peek(), TokenKind::RBracket) {
            self.bump();
            return Ok(Element::List(items));
        }
        loop {
            items.push(self.parse_element_until(StopSet::ListEnd)?);
            match self.bump() {
                TokenKind::Comma => {}
                TokenKind::RBracket => break,
                other => {
                    return self.error(format!("expected ',' or ']', found {}", describe(&other)))
                }
            }
        }
        Ok(Element::List(items))
    }

    fn parse_map(&mut self) -> ParseResult<Element> {
        self.bump(); // {
        let mut entries = Vec::new();
        self.skip_ws();
        if matches!(self.peek(), TokenKind::RBrace) {
            self.bump();
            return Ok(Element::Map(entries));
        }
        loop {
            let key = self.parse_map_key()?;
            match self.bump() {
                TokenKind::Colon => {}
                other => {
                    return self.error(format!(
                        "expected ':' after map key, found {}",
                        describe(&other)
                    ))
                }
            }
            let value = self.parse_element_until(StopSet::MapValueEnd)?;
            entries.push((key, value));
            match self.bump() {
                TokenKind::Comma => self.skip_ws(),
                TokenKind::RBrace => break,
                other => {
                    return self.error(format!("expected ',' or '}}', found {}", describe(&other)))
                }
            }
        }
        Ok(Element::Map(entries))
    }

    /// A map key is an unquoted primitive; interpolations are not allowed.
    fn parse_map_key(&mut self) -> ParseResult<Element> {
        self.skip_ws();
        if matches!(self.peek(), TokenKind::InterOpen) {
            return self.error("interpolations cannot be used as map keys");
        }
        match self.parse_unquoted_run(StopSet::MapKeyEnd)? {
            Element::Composite(_) | Element::Interp(_) => {
                self.error("interpolations cannot be used as map keys")
            }
            key => Ok(key),
        }
    }

    /// An unquoted run of words, whitespace, escapes and interpolations.
    fn parse_unquoted_run(&mut self, stop: StopSet) -> ParseResult<Element> {
        let mut fragments: Vec<Fragment> = Vec::new();
        loop {
            if stop.matches(self.peek()) {
                break;
            }
            match self.peek().clone() {
                TokenKind::Word(w) => {
                    self.bump();
                    push_literal(&mut fragments, &w);
                }
                TokenKind::Ws(s) => {
                    self.bump();
                    push_literal(&mut fragments, &s);
                }
                TokenKind::Dot => {
                    self.bump();
                    push_literal(&mut fragments, ".");
                }
                TokenKind::Colon => {
                    self.bump();
                    push_literal(&mut fragments, ":");
                }
                TokenKind::Escape(c) => {
                    self.bump();
                    fragments.push(Fragment::Escape(c));
                }
                TokenKind::InterOpen => {
                    self.bump();
                    fragments.push(Fragment::Interp(self.parse_interpolation()?));
                }
                TokenKind::Eof => {
                    return self.error("unexpected end of input");
                }
                other => {
                    return self.error(format!(
                        "unexpected {} in unquoted value (escape it or quote the value)",
                        describe(&other)
                    ));
                }
            }
        }
        Ok(finish_unquoted(fragments))
    }
}

/// Append to the previous literal fragment when possible so that runs like
/// `1` `.` `5` classify as one primitive.
fn push_literal(fragments: &mut Vec<Fragment>, text: &str) {
    if let Some(Fragment::Literal(prev)) = fragments.last_mut() {
        prev.push_str(text);
    } else {
        fragments.push(Fragment::Literal(text.to_string()));
    }
}

/// Turn a finished unquoted run into an element: trim boundary whitespace,
/// then classify.
fn finish_unquoted(mut fragments: Vec<Fragment>) -> Element {
    if let Some(Fragment::Literal(first)) = fragments.first_mut() {
        *first = first.trim_start().to_string();
        if first.is_empty() {
            fragments.remove(0);
        }
    }
    if let Some(Fragment::Literal(last)) = fragments.last_mut() {
        *last = last.trim_end().to_string();
        if last.is_empty() {
            fragments.pop();
        }
    }

    match fragments.len() {
        0 => Element::Str(String::new()),
        1 => match fragments.into_iter().next().unwrap() {
            Fragment::Interp(interp) => Element::Interp(interp),
            Fragment::Literal(text) => classify_primitive(text),
            Fragment::Escape(c) => Element::Str(c.to_string()),
        },
        _ => {
            if fragments.iter().any(|f| matches!(f, Fragment::Interp(_))) {
                Element::Composite(Text::new(fragments))
            } else {
                // Escaped characters force the run to be a plain string.
                let mut out = String::new();
                for fragment in fragments {
                    match fragment {
                        Fragment::Literal(s) => out.push_str(&s),
                        Fragment::Escape(c) => out.push(c),
                        Fragment::Interp(_) => unreachable!(),
                    }
                }
                Element::Str(out)
            }
        }
    }
}

/// Classify a bare word per the primitive grammar: null, bool, int, float,
/// otherwise string.
fn classify_primitive(text: String) -> Element {
    if text.eq_ignore_ascii_case("null") {
        return Element::Null;
    }
    if text.eq_ignore_ascii_case("true") {
        return Element::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Element::Bool(false);
    }
    if let Some(i) = try_int(&text) {
        return Element::Int(i);
    }
    if let Some(f) = try_float(&text) {
        return Element::Float(f);
    }
    Element::Str(text)
}

/// Decimal integer with optional sign and underscore digit separators.
fn try_int(text: &str) -> Option<i64> {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return None;
    }
    if !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    text.replace('_', "").parse().ok()
}

/// Decimal or scientific float, or the reserved inf/nan tokens.
fn try_float(text: &str) -> Option<f64> {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let negative = text.starts_with('-');
    if body.eq_ignore_ascii_case("inf") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if body.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    if !body.contains(['.', 'e', 'E']) {
        return None;
    }
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_'))
    {
        return None;
    }
    text.replace('_', "").parse().ok()
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Text(s) => format!("text `{s}`"),
        TokenKind::Escape(c) => format!("escape `\\{c}`"),
        TokenKind::InterOpen => "'${'".to_string(),
        TokenKind::InterClose => "'}'".to_string(),
        TokenKind::QuoteOpen(q) | TokenKind::QuoteClose(q) => format!("quote {q}"),
        TokenKind::Word(w) => format!("`{w}`"),
        TokenKind::Ws(_) => "whitespace".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_path(source: &str) -> NodeRef {
        let text = parse_text(source).unwrap();
        match text.standalone_interpolation() {
            Some(Interpolation::Ref(r)) => r.clone(),
            other => panic!("expected node reference, got {other:?}"),
        }
    }

    fn call(source: &str) -> ResolverCall {
        let text = parse_text(source).unwrap();
        match text.standalone_interpolation() {
            Some(Interpolation::Call(c)) => c.clone(),
            other => panic!("expected resolver call, got {other:?}"),
        }
    }

    #[test]
    fn plain_text() {
        let text = parse_text("just text").unwrap();
        assert_eq!(text.fragments, vec![Fragment::Literal("just text".into())]);
        assert!(!text.has_interpolation());
    }

    #[test]
    fn empty_input_is_empty_string() {
        let text = parse_text("").unwrap();
        assert_eq!(text.fragments, vec![Fragment::Literal(String::new())]);
    }

    #[test]
    fn absolute_reference() {
        let r = ref_path("${a.b.c}");
        assert_eq!(r.rel_depth, 0);
        assert_eq!(
            r.segments,
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Key("c".into()),
            ]
        );
    }

    #[test]
    fn relative_reference_counts_dots() {
        assert_eq!(ref_path("${.x}").rel_depth, 1);
        assert_eq!(ref_path("${..x}").rel_depth, 2);
        assert_eq!(ref_path("${...x}").rel_depth, 3);
    }

    #[test]
    fn bracket_segments() {
        let r = ref_path("${a[0].b}");
        assert_eq!(
            r.segments,
            vec![
                Segment::Key("a".into()),
                Segment::Key("0".into()),
                Segment::Key("b".into()),
            ]
        );
    }

    #[test]
    fn nested_interpolation_in_brackets() {
        let r = ref_path("${plans[${selected_plan}]}");
        assert_eq!(r.segments.len(), 2);
        match &r.segments[1] {
            Segment::Interp(inner) => match inner.as_ref() {
                Interpolation::Ref(inner_ref) => {
                    assert_eq!(inner_ref.segments, vec![Segment::Key("selected_plan".into())]);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn resolver_call_with_args() {
        let c = call("${oc.env:HOME,/root}");
        assert_eq!(
            c.name,
            vec![NamePart::Ident("oc".into()), NamePart::Ident("env".into())]
        );
        assert_eq!(c.args.len(), 2);
        assert_eq!(c.args[0].value, Element::Str("HOME".into()));
        assert_eq!(c.args[0].raw, "HOME");
        assert_eq!(c.args[1].value, Element::Str("/root".into()));
    }

    #[test]
    fn resolver_call_no_args() {
        let c = call("${now:}");
        assert_eq!(c.name, vec![NamePart::Ident("now".into())]);
        assert!(c.args.is_empty());
    }

    #[test]
    fn argument_whitespace_is_trimmed() {
        let c = call("${r:0, 1}");
        assert_eq!(c.args[0].raw, "0");
        assert_eq!(c.args[1].raw, "1");
        assert_eq!(c.args[1].value, Element::Int(1));
    }

    #[test]
    fn quoted_argument_preserves_whitespace() {
        let c = call("${concat:' a ', b}");
        match &c.args[0].value {
            Element::Quoted(text) => {
                assert_eq!(text.fragments, vec![Fragment::Literal(" a ".into())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trailing_empty_argument_is_accepted() {
        let c = call("${f:a,}");
        assert_eq!(c.args.len(), 2);
        assert_eq!(c.args[1].value, Element::Str(String::new()));
    }

    #[test]
    fn primitive_classification() {
        assert_eq!(parse_element("null").unwrap(), Element::Null);
        assert_eq!(parse_element("TRUE").unwrap(), Element::Bool(true));
        assert_eq!(parse_element("-10").unwrap(), Element::Int(-10));
        assert_eq!(parse_element("1_000").unwrap(), Element::Int(1000));
        assert_eq!(parse_element("1.5e3").unwrap(), Element::Float(1500.0));
        assert_eq!(parse_element("-inf").unwrap(), Element::Float(f64::NEG_INFINITY));
        assert_eq!(parse_element("hello").unwrap(), Element::Str("hello".into()));
        assert_eq!(parse_element("a b").unwrap(), Element::Str("a b".into()));
    }

    #[test]
    fn nan_classifies_as_float() {
        match parse_element("nan").unwrap() {
            Element::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn escapes_force_string() {
        assert_eq!(parse_element(r"\:\=").unwrap(), Element::Str(":=".into()));
        assert_eq!(parse_element(r"a\,b").unwrap(), Element::Str("a,b".into()));
    }

    #[test]
    fn list_element() {
        assert_eq!(
            parse_element("[1, two, [3]]").unwrap(),
            Element::List(vec![
                Element::Int(1),
                Element::Str("two".into()),
                Element::List(vec![Element::Int(3)]),
            ])
        );
        assert_eq!(parse_element("[]").unwrap(), Element::List(vec![]));
    }

    #[test]
    fn map_element() {
        assert_eq!(
            parse_element("{a: 1, b: {c: d}}").unwrap(),
            Element::Map(vec![
                (Element::Str("a".into()), Element::Int(1)),
                (
                    Element::Str("b".into()),
                    Element::Map(vec![(Element::Str("c".into()), Element::Str("d".into()))])
                ),
            ])
        );
    }

    #[test]
    fn map_rejects_interpolation_keys() {
        assert!(parse_element("{${k}: 1}").is_err());
    }

    #[test]
    fn composite_argument() {
        let c = call("${f:a_${b}_c}");
        match &c.args[0].value {
            Element::Composite(text) => {
                assert_eq!(text.fragments.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dynamic_resolver_name() {
        let c = call("${${which}.lookup:x}");
        assert!(matches!(c.name[0], NamePart::Interp(_)));
        assert_eq!(c.name[1], NamePart::Ident("lookup".into()));
    }

    #[test]
    fn colon_inside_argument_is_plain() {
        let c = call("${f:a:b}");
        assert_eq!(c.args.len(), 1);
        assert_eq!(c.args[0].value, Element::Str("a:b".into()));
    }

    #[test]
    fn errors_carry_offsets() {
        let err = parse_text("${a..b}").unwrap_err();
        assert!(err.offset > 0);
        let err = parse_element("[1, 2").unwrap_err();
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn unquoted_quote_is_rejected() {
        assert!(parse_element("it's").is_err());
        assert_eq!(parse_element(r"it\'s").unwrap(), Element::Str("it's".into()));
    }
}
