//! Cross-cutting grammar behavior: escapes in each lexical context,
//! nesting across quote boundaries and diagnostic offsets.

use strata_grammar::{parse_element, parse_text, Element, Fragment, Interpolation, Segment};

fn literal_text(text: &strata_grammar::Text) -> String {
    let mut out = String::new();
    for fragment in &text.fragments {
        match fragment {
            Fragment::Literal(s) => out.push_str(s),
            Fragment::Escape(c) => out.push(*c),
            Fragment::Interp(_) => panic!("unexpected interpolation"),
        }
    }
    out
}

#[test]
fn backslashes_are_literal_unless_before_an_interpolation() {
    // Windows-style paths survive untouched.
    let text = parse_text(r"C:\Users\config").unwrap();
    assert_eq!(literal_text(&text), r"C:\Users\config");

    // An odd backslash count escapes the interpolation itself.
    let text = parse_text(r"\${not.an.interp}").unwrap();
    assert!(!text.has_interpolation());
    assert_eq!(literal_text(&text), "${not.an.interp}");

    // An even count leaves the interpolation live.
    let text = parse_text(r"\\${a}").unwrap();
    assert!(text.has_interpolation());
}

#[test]
fn interpolations_nest_across_quote_boundaries() {
    let text = parse_text(r#"${concat:'prefix ${inner.key} suffix', x}"#).unwrap();
    let call = match text.standalone_interpolation().unwrap() {
        Interpolation::Call(call) => call,
        other => panic!("unexpected {other:?}"),
    };
    match &call.args[0].value {
        Element::Quoted(inner) => {
            assert!(inner.has_interpolation());
            assert_eq!(inner.fragments.len(), 3);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn deeply_nested_structures_parse() {
    let element = parse_element("{outer: [1, {inner: [true, null]}, 'two']}").unwrap();
    match element {
        Element::Map(entries) => {
            assert_eq!(entries.len(), 1);
            match &entries[0].1 {
                Element::List(items) => assert_eq!(items.len(), 3),
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn bracket_segments_mix_with_dots() {
    let text = parse_text("${a[0].b[${k}].c}").unwrap();
    let node_ref = match text.standalone_interpolation().unwrap() {
        Interpolation::Ref(r) => r,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(node_ref.segments.len(), 5);
    assert_eq!(node_ref.segments[0], Segment::Key("a".into()));
    assert_eq!(node_ref.segments[1], Segment::Key("0".into()));
    assert!(matches!(node_ref.segments[3], Segment::Interp(_)));
    assert_eq!(node_ref.segments[4], Segment::Key("c".into()));
}

#[test]
fn escape_set_inside_arguments() {
    // Escaped commas, colons, equals and spaces all fold into the string.
    assert_eq!(
        parse_element(r"k\=v\,w\ x").unwrap(),
        Element::Str("k=v,w x".into())
    );
    // An escaped bracket stops the lexer from opening a list.
    assert_eq!(parse_element(r"\[x\]").unwrap(), Element::Str("[x]".into()));
}

#[test]
fn offsets_point_into_the_source() {
    let source = "leading text ${a..b}";
    let err = parse_text(source).unwrap_err();
    assert!(err.offset >= 15, "offset {} too small", err.offset);
    assert!(err.offset < source.len());

    let err = parse_text("${f:'unterminated}").unwrap_err();
    assert_eq!(err.offset, 18);
}

#[test]
fn whitespace_tolerated_inside_interpolations() {
    let text = parse_text("${ a.b }").unwrap();
    match text.standalone_interpolation().unwrap() {
        Interpolation::Ref(r) => {
            assert_eq!(
                r.segments,
                vec![Segment::Key("a".into()), Segment::Key("b".into())]
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn quoted_strings_may_hold_grammar_characters() {
    let element = parse_element(r#"'a, b: c [d] {e}'"#).unwrap();
    match element {
        Element::Quoted(text) => {
            assert_eq!(literal_text(&text), "a, b: c [d] {e}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn double_and_single_quotes_both_work() {
    for source in [r#""x""#, "'x'"] {
        match parse_element(source).unwrap() {
            Element::Quoted(text) => assert_eq!(literal_text(&text), "x"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
