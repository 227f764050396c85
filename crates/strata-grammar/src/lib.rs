//! # strata-grammar
//!
//! The interpolation grammar of the strata configuration engine.
//!
//! Configuration scalars may embed `${…}` interpolations: references to
//! other nodes (`${server.port}`, `${.sibling}`, `${plans[${selected}]}`)
//! or calls to named resolvers (`${oc.env:HOME,/root}`). This crate turns
//! such strings into an AST of text fragments, node references and resolver
//! calls; evaluation lives in the engine crate, which owns the node tree.
//!
//! Two entry productions exist:
//!
//! - [`parse_text`]: the body of a scalar value, a mix of literal text,
//!   escapes and interpolations. A text that is exactly one interpolation is
//!   "standalone" and preserves the type of its referent.
//! - [`parse_element`]: a single element (primitive, quoted string, list or
//!   map), the grammar of resolver arguments, dotlist right-hand sides and
//!   decoded strings.
//!
//! Syntactic validity is checked when a value is assigned; resolution is
//! deferred to access time. Parse failures report byte offsets.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{
    Arg, Element, Fragment, Interpolation, NamePart, NodeRef, ResolverCall, Segment, Text,
};
pub use error::{GrammarParseError, ParseResult};
pub use parser::{parse_element, parse_text};
