//! # strata
//!
//! A hierarchical, typed, mergeable configuration engine with lazy string
//! interpolation and user-extensible resolvers.
//!
//! The heart of the crate is [`Config`], a mutable tree of typed scalars,
//! ordered maps and lists. Scalars may hold `${…}` interpolation
//! expressions (parsed by `strata-grammar`) that resolve lazily on
//! access: node references, relative references, dynamic keys and calls
//! to named resolvers such as `${oc.env:HOME}`. Trees are combined with a
//! right-biased layered [`merge`], optionally validated against
//! structured [`Schema`] records bound to map containers.
//!
//! ```no_run
//! use strata::{Config, Value};
//!
//! let cfg = Config::from_yaml(
//!     "database_server:\n  port: 1234\ndatabase_client:\n  server_port: ${database_server.port}\n",
//! )?;
//! assert_eq!(cfg.get("database_client.server_port")?, Value::Int(1234));
//! # Ok::<(), strata::ConfigError>(())
//! ```
//!
//! Operations on one tree must not run concurrently; the only process-wide
//! state is the resolver registry, which uses copy-on-write snapshots so
//! an evaluation in flight never observes registry mutation.

mod builtins;
mod config;
mod convert;
mod error;
mod eval;
mod merge;
mod node;
mod path;
mod resolver;
mod schema;
mod value;
mod yaml;

pub use config::{Config, FlagGuard, UpdateOptions};
pub use convert::{StructuredMode, ToContainerOptions};
pub use error::{ConfigError, InterpolationError, Result};
pub use eval::ResolverContext;
pub use merge::{merge, merge_with_options, unsafe_merge, ListMergeMode, MergeOptions};
pub use node::Flag;
pub use path::{format_path, parse_path, PathPart};
pub use resolver::{
    clear_resolver, clear_resolvers, has_resolver, register_resolver,
    register_resolver_with_context, RegisterOptions,
};
pub use schema::{Field, FieldDefault, Schema, SchemaBuilder, TypeHint};
pub use value::{EnumType, EnumValue, Key, Scalar, ScalarKind, Value};

// The grammar is a public dependency: parse errors surface through
// `InterpolationError::Grammar`.
pub use strata_grammar::GrammarParseError;
