//! Built-in resolvers, reserved under the `oc.` namespace.
//!
//! | name | behaviour |
//! |---|---|
//! | `oc.env` | environment variable lookup with optional default |
//! | `oc.decode` | parse a string through the element grammar |
//! | `oc.select` | node lookup with a default, silent on missing |
//! | `oc.create` | turn a map/list (or YAML string) into a subconfig |
//! | `oc.deprecated` | warn on access and forward to the new key |
//! | `oc.dict.keys` | the keys of a map, as a list |
//! | `oc.dict.values` | the values of a map, as a list |

use crate::error::{ConfigError, InterpolationError, Result};
use crate::eval::ResolverContext;
use crate::resolver::{ResolverEntry, ResolverFn, ResolverTable};
use crate::value::{Key, Value};
use std::sync::Arc;

pub(crate) fn builtin_table() -> ResolverTable {
    let mut table = ResolverTable::default();
    let mut add_plain = |name: &str, f: fn(&[Value]) -> Result<Value>| {
        table.insert(name, ResolverEntry::new(ResolverFn::Plain(Arc::new(f)), false));
    };
    add_plain("oc.env", env);

    let mut add_ctx = |name: &str, f: fn(&ResolverContext<'_>, &[Value]) -> Result<Value>| {
        table.insert(
            name,
            ResolverEntry::new(ResolverFn::WithContext(Arc::new(f)), false),
        );
    };
    add_ctx("oc.decode", decode);
    add_ctx("oc.select", select);
    add_ctx("oc.create", create);
    add_ctx("oc.deprecated", deprecated);
    add_ctx("oc.dict.keys", dict_keys);
    add_ctx("oc.dict.values", dict_values);
    table
}

fn resolver_err(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Interpolation(InterpolationError::Resolver {
        name: name.to_string(),
        message: message.into(),
    })
}

fn string_arg<'a>(args: &'a [Value], index: usize, name: &str, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(resolver_err(
            name,
            format!("{what} must be a string, got {}", other.kind_name()),
        )),
        None => Err(resolver_err(name, format!("missing {what} argument"))),
    }
}

/// `${oc.env:KEY}` / `${oc.env:KEY,default}`.
///
/// The value always comes back as a string. A default is stringified,
/// except the literal `null`, which yields the null value.
fn env(args: &[Value]) -> Result<Value> {
    let key = string_arg(args, 0, "oc.env", "variable name")?;
    if args.len() > 2 {
        return Err(resolver_err(
            "oc.env",
            format!("expected at most 2 arguments, got {}", args.len()),
        ));
    }
    match std::env::var(key) {
        Ok(value) => Ok(Value::Str(value)),
        Err(_) => match args.get(1) {
            Some(Value::Null) => Ok(Value::Null),
            Some(default) => Ok(Value::Str(default.to_string())),
            None => Err(resolver_err(
                "oc.env",
                format!("environment variable '{key}' not found"),
            )),
        },
    }
}

/// `${oc.decode:text}`: parse the argument through the element grammar and
/// return the typed result. Null passes through.
fn decode(ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Null) | None => Ok(Value::Null),
        Some(Value::Str(s)) => ctx.decode(s),
        Some(other) => Err(resolver_err(
            "oc.decode",
            format!("expected a string or null, got {}", other.kind_name()),
        )),
    }
}

/// `${oc.select:key}` / `${oc.select:key,default}`: like a node reference,
/// but missing targets produce the default instead of an error.
fn select(ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    let path = string_arg(args, 0, "oc.select", "key")?;
    match ctx.select(path)? {
        Some(value) => Ok(value),
        None => Ok(args.get(1).cloned().unwrap_or(Value::Null)),
    }
}

/// `${oc.create:value}`: produce a fresh subconfig from a map or list
/// value; YAML strings are parsed first.
fn create(_ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    match args.first() {
        None | Some(Value::Null) => Ok(Value::Map(Default::default())),
        Some(Value::Str(s)) => match crate::yaml::yaml_str_to_value(s)? {
            Value::Null => Ok(Value::Map(Default::default())),
            container @ (Value::Map(_) | Value::List(_)) => Ok(container),
            scalar => Err(resolver_err(
                "oc.create",
                format!("cannot create a config from a {} value", scalar.kind_name()),
            )),
        },
        Some(container @ (Value::Map(_) | Value::List(_))) => Ok(container.clone()),
        Some(other) => Err(resolver_err(
            "oc.create",
            format!("cannot create a config from {}", other.kind_name()),
        )),
    }
}

/// `${oc.deprecated:old.key}` / with a custom message. Warns on access and
/// forwards to the new key. `$OLD_KEY` and `$NEW_KEY` in the message are
/// substituted.
fn deprecated(ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    let key = string_arg(args, 0, "oc.deprecated", "key")?;
    let template = match args.get(1) {
        Some(Value::Str(s)) => s.clone(),
        Some(other) => {
            return Err(resolver_err(
                "oc.deprecated",
                format!("message must be a string, got {}", other.kind_name()),
            ))
        }
        None => "'$OLD_KEY' is deprecated. Change your code and config to use '$NEW_KEY'"
            .to_string(),
    };
    let value = ctx.select_strict(key)?;
    let message = template
        .replace("$OLD_KEY", &ctx.anchor_key())
        .replace("$NEW_KEY", key);
    tracing::warn!("{message}");
    Ok(value)
}

fn map_arg(ctx: &ResolverContext<'_>, args: &[Value], name: &str) -> Result<Value> {
    match args.first() {
        Some(Value::Str(path)) => match ctx.select(path)? {
            Some(found @ Value::Map(_)) => Ok(found),
            Some(other) => Err(resolver_err(
                name,
                format!("`{path}` is a {}, expected a map", other.kind_name()),
            )),
            None => Err(ConfigError::Interpolation(InterpolationError::Key {
                message: format!("interpolation key `{path}` not found"),
                full_key: ctx.anchor_key(),
            })),
        },
        Some(found @ Value::Map(_)) => Ok(found.clone()),
        Some(other) => Err(resolver_err(
            name,
            format!("expected a map or a key, got {}", other.kind_name()),
        )),
        None => Err(resolver_err(name, "missing argument")),
    }
}

fn key_to_value(key: &Key) -> Value {
    match key {
        Key::Str(s) => Value::Str(s.clone()),
        Key::Int(i) => Value::Int(*i),
        Key::Bool(b) => Value::Bool(*b),
        Key::Float(f) => Value::Float(*f),
        Key::Bytes(b) => Value::Bytes(b.clone()),
        Key::Enum(e) => Value::Enum(e.clone()),
    }
}

/// `${oc.dict.keys:some.map}`: the map's keys as a list.
fn dict_keys(ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    match map_arg(ctx, args, "oc.dict.keys")? {
        Value::Map(entries) => Ok(Value::List(entries.keys().map(key_to_value).collect())),
        _ => unreachable!("map_arg returns maps"),
    }
}

/// `${oc.dict.values:some.map}`: the map's values as a list. The values
/// track the referenced map at access time.
fn dict_values(ctx: &ResolverContext<'_>, args: &[Value]) -> Result<Value> {
    match map_arg(ctx, args, "oc.dict.values")? {
        Value::Map(entries) => Ok(Value::List(entries.into_values().collect())),
        _ => unreachable!("map_arg returns maps"),
    }
}
