//! Template resolution for node params and workflow outputs.
//!
//! Templates are `${path}` references resolved against a layered context:
//! caller-supplied extracted params first, then the shared store's top level,
//! then declared input defaults. A string that is exactly one reference (a
//! *simple* template) preserves the source value's type; a string with
//! embedded references (a *complex* template) always renders to a string.
//!
//! In [`TemplateMode::Strict`] an unresolvable reference is an error. In
//! [`TemplateMode::Permissive`] a simple template yields `null` and a complex
//! template splices the literal `[unresolved:${path}]`; either way the
//! reference is reported so the run can be marked degraded.
//!
//! # Examples
//!
//! ```rust
//! use pflow::ir::TemplateMode;
//! use pflow::template::{ResolveContext, resolve_value};
//! use serde_json::json;
//!
//! let shared = serde_json::from_value(json!({
//!     "fetch": {"count": 3, "tags": ["a", "b"]}
//! })).unwrap();
//! let ctx = ResolveContext::new().layer(&shared);
//!
//! // Simple template: type preserved.
//! let r = resolve_value(&json!("${fetch.count}"), &ctx, TemplateMode::Strict).unwrap();
//! assert_eq!(r.value, json!(3));
//!
//! // Complex template: rendered into text.
//! let r = resolve_value(&json!("have ${fetch.count}"), &ctx, TemplateMode::Strict).unwrap();
//! assert_eq!(r.value, json!("have 3"));
//! ```

pub mod parser;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

pub use parser::{PathExpr, PathStep, Segment, scan};

use crate::ir::TemplateMode;
use crate::types::JsonMap;

/// Layered lookup context for template roots.
///
/// Layers are consulted in insertion order; the first layer containing the
/// root key wins. Typical layering, outermost first: extracted params, the
/// shared store top level, declared input defaults.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext<'a> {
    layers: Vec<&'a JsonMap>,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lookup layer with lower precedence than existing layers.
    #[must_use]
    pub fn layer(mut self, map: &'a JsonMap) -> Self {
        self.layers.push(map);
        self
    }

    fn root(&self, key: &str) -> Option<&'a Value> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

/// Outcome of resolving one value: the result plus any permissive-mode
/// references that failed to resolve.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub value: Value,
    /// Raw paths that resolved to a sentinel; empty in strict mode.
    pub unresolved: Vec<String>,
}

/// Errors raised by template scanning and strict-mode resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum TemplateError {
    /// The template text does not match the `${path}` grammar.
    #[error("malformed template `{template}`: {reason}")]
    #[diagnostic(
        code(pflow::template::malformed),
        help("Templates are `${{head.tail[0]}}`; use `$$` for a literal dollar sign.")
    )]
    Malformed { template: String, reason: String },

    /// A reference did not resolve under strict mode.
    #[error("template reference `${{{path}}}` did not resolve")]
    #[diagnostic(
        code(pflow::template::unresolved),
        help("Check that `{path}` names a declared input or an upstream node output.")
    )]
    Unresolved { path: String },
}

/// Resolve every template in a JSON value.
///
/// Strings are scanned for references; mappings and sequences are resolved
/// recursively; other scalars pass through unchanged.
pub fn resolve_value(
    value: &Value,
    ctx: &ResolveContext<'_>,
    mode: TemplateMode,
) -> Result<Resolution, TemplateError> {
    let mut unresolved = Vec::new();
    let value = resolve_inner(value, ctx, mode, &mut unresolved)?;
    Ok(Resolution { value, unresolved })
}

/// Resolve every template in a param map. Convenience over [`resolve_value`].
pub fn resolve_params(
    params: &JsonMap,
    ctx: &ResolveContext<'_>,
    mode: TemplateMode,
) -> Result<(JsonMap, Vec<String>), TemplateError> {
    let resolution = resolve_value(&Value::Object(params.clone()), ctx, mode)?;
    match resolution.value {
        Value::Object(map) => Ok((map, resolution.unresolved)),
        // resolve_inner maps objects to objects.
        other => Ok((
            JsonMap::from_iter([("value".to_string(), other)]),
            resolution.unresolved,
        )),
    }
}

fn resolve_inner(
    value: &Value,
    ctx: &ResolveContext<'_>,
    mode: TemplateMode,
    unresolved: &mut Vec<String>,
) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => resolve_string(s, ctx, mode, unresolved),
        Value::Object(map) => {
            let mut out = JsonMap::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_inner(v, ctx, mode, unresolved)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_inner(item, ctx, mode, unresolved)?);
            }
            Ok(Value::Array(out))
        }
        scalar => Ok(scalar.clone()),
    }
}

fn resolve_string(
    s: &str,
    ctx: &ResolveContext<'_>,
    mode: TemplateMode,
    unresolved: &mut Vec<String>,
) -> Result<Value, TemplateError> {
    let segments = scan(s)?;

    // Simple template: the whole string is one reference; preserve type.
    if let [Segment::Reference(path)] = segments.as_slice() {
        return match walk(path, ctx) {
            Some(found) => Ok(found.clone()),
            None => match mode {
                TemplateMode::Strict => Err(TemplateError::Unresolved {
                    path: path.raw.clone(),
                }),
                TemplateMode::Permissive => {
                    unresolved.push(path.raw.clone());
                    Ok(Value::Null)
                }
            },
        };
    }

    // Complex template (or no references at all): render to a string.
    let mut rendered = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Reference(path) => match walk(path, ctx) {
                Some(Value::String(text)) => rendered.push_str(text),
                Some(found) => {
                    rendered.push_str(&serde_json::to_string(found).unwrap_or_default());
                }
                None => match mode {
                    TemplateMode::Strict => {
                        return Err(TemplateError::Unresolved {
                            path: path.raw.clone(),
                        });
                    }
                    TemplateMode::Permissive => {
                        unresolved.push(path.raw.clone());
                        rendered.push_str(&format!("[unresolved:${{{}}}]", path.raw));
                    }
                },
            },
        }
    }
    Ok(Value::String(rendered))
}

/// Walk a parsed path against the context. `None` when any step misses.
fn walk<'a>(path: &PathExpr, ctx: &ResolveContext<'a>) -> Option<&'a Value> {
    let mut current = ctx.root(&path.root)?;
    for step in &path.steps {
        current = match step {
            PathStep::Key(key) => current.as_object()?.get(key)?,
            PathStep::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// Collect every reference in a JSON value, plus scan errors for strings
/// that fail the template grammar. Used by the validator.
#[must_use]
pub fn collect_references(value: &Value) -> (Vec<PathExpr>, Vec<String>) {
    let mut refs = Vec::new();
    let mut errors = Vec::new();
    collect_inner(value, &mut refs, &mut errors);
    (refs, errors)
}

fn collect_inner(value: &Value, refs: &mut Vec<PathExpr>, errors: &mut Vec<String>) {
    match value {
        Value::String(s) => match scan(s) {
            Ok(segments) => {
                refs.extend(segments.into_iter().filter_map(|seg| match seg {
                    Segment::Reference(p) => Some(p),
                    Segment::Literal(_) => None,
                }));
            }
            Err(err) => errors.push(err.to_string()),
        },
        Value::Object(map) => {
            for v in map.values() {
                collect_inner(v, refs, errors);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_inner(item, refs, errors);
            }
        }
        _ => {}
    }
}
