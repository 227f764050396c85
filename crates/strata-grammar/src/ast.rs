//! Abstract syntax tree for interpolation-bearing text.
//!
//! Two entry productions exist: a *text* value (plain fragments mixed with
//! interpolations, the shape of every scalar read from a config file) and an
//! *element* (one primitive, quoted string, list or map, the shape of
//! resolver arguments and dotlist right-hand sides).

/// A parsed text value: the body of a scalar that may contain interpolations.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub fragments: Vec<Fragment>,
}

impl Text {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    /// If the whole text is exactly one interpolation, return it.
    ///
    /// A standalone interpolation preserves the type of its referent instead
    /// of being stringified into the surrounding text.
    pub fn standalone_interpolation(&self) -> Option<&Interpolation> {
        match self.fragments.as_slice() {
            [Fragment::Interp(interp)] => Some(interp),
            _ => None,
        }
    }

    /// True if any fragment is an interpolation, at any nesting depth of the
    /// top-level fragment list.
    pub fn has_interpolation(&self) -> bool {
        self.fragments
            .iter()
            .any(|f| matches!(f, Fragment::Interp(_)))
    }
}

/// One piece of a text value.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// An escaped character, emitted without its backslash.
    Escape(char),
    /// An embedded `${…}` interpolation.
    Interp(Interpolation),
}

/// An interpolation is either a node reference or a resolver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolation {
    Ref(NodeRef),
    Call(ResolverCall),
}

/// A node reference: `${a.b[0]}`, `${.sibling}`, `${plans[${selected}]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    /// Number of leading dots. Zero means the path is absolute from the
    /// root; one resolves against the anchor's parent, two against the
    /// grandparent, and so on.
    pub rel_depth: usize,
    /// Path segments, outermost first.
    pub segments: Vec<Segment>,
}

/// One segment of a node-reference path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A literal key. Integer-looking keys index into lists.
    Key(String),
    /// A nested interpolation evaluated to a key at resolution time.
    Interp(Box<Interpolation>),
}

/// A resolver call: `${oc.env:HOME}`, `${cache:${name}, 60}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverCall {
    /// Dot-joined name parts. Parts may themselves be interpolations,
    /// enabling dynamic resolver selection.
    pub name: Vec<NamePart>,
    pub args: Vec<Arg>,
}

/// One dot-separated part of a resolver name.
#[derive(Debug, Clone, PartialEq)]
pub enum NamePart {
    Ident(String),
    Interp(Box<Interpolation>),
}

/// One resolver argument, together with its raw source text.
///
/// The raw text (whitespace-trimmed) is what cached resolvers key their
/// memoization on, so `${r:0, 1}` and `${r:0,1}` share a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: Element,
    pub raw: String,
}

/// An element: a resolver argument or an inline container member.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// An unquoted string (surrounding whitespace already trimmed).
    Str(String),
    /// A quoted string; may contain embedded interpolations.
    Quoted(Text),
    /// An unquoted run mixing text and interpolations, stringified on
    /// evaluation.
    Composite(Text),
    List(Vec<Element>),
    Map(Vec<(Element, Element)>),
    /// A bare interpolation used as an argument.
    Interp(Interpolation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_detection() {
        let lone = Text::new(vec![Fragment::Interp(Interpolation::Ref(NodeRef {
            rel_depth: 0,
            segments: vec![Segment::Key("a".into())],
        }))]);
        assert!(lone.standalone_interpolation().is_some());

        let mixed = Text::new(vec![
            Fragment::Literal("port=".into()),
            Fragment::Interp(Interpolation::Ref(NodeRef {
                rel_depth: 0,
                segments: vec![Segment::Key("port".into())],
            })),
        ]);
        assert!(mixed.standalone_interpolation().is_none());
        assert!(mixed.has_interpolation());
    }
}
