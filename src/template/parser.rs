//! Scanner for `${path}` template strings.
//!
//! Grammar: `${head(.tail)*}` where `head` is a word identifier and each
//! `tail` is `.ident` or `[index]`. A `$$` pair is an escape for one literal
//! `$` and never opens a template.

use super::TemplateError;

/// One piece of a scanned template string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, escapes already folded (`$$` arrives here as `$`).
    Literal(String),
    /// A `${...}` reference.
    Reference(PathExpr),
}

/// A parsed reference path: root variable plus access steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathExpr {
    /// The inner text as written, e.g. `fetch.body.items[0]`.
    pub raw: String,
    /// First identifier; an input name or a node id.
    pub root: String,
    /// Accesses applied after the root.
    pub steps: Vec<PathStep>,
}

/// One access step of a reference path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Mapping lookup by key (`.ident`).
    Key(String),
    /// Sequence lookup by integer index (`[3]`).
    Index(usize),
}

impl PathExpr {
    /// The first access step's key, when the path starts with `.ident`.
    ///
    /// Used by the validator to check node-output references against the
    /// source node's declared output fields.
    #[must_use]
    pub fn first_key(&self) -> Option<&str> {
        match self.steps.first() {
            Some(PathStep::Key(k)) => Some(k),
            _ => None,
        }
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Scan a string into literal and reference segments.
///
/// Fails on an unterminated `${` or a reference whose inner text does not
/// match the path grammar. A lone `$` that opens neither a template nor an
/// escape is literal text.
pub fn scan(text: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek().map(|(_, next)| *next) {
            Some('$') => {
                chars.next();
                literal.push('$');
            }
            Some('{') => {
                chars.next();
                let rest = &text[at..];
                let Some(close) = rest.find('}') else {
                    return Err(TemplateError::Malformed {
                        template: text.to_string(),
                        reason: "unterminated `${`".to_string(),
                    });
                };
                let inner = &rest[2..close];
                let path = parse_path(inner).map_err(|reason| TemplateError::Malformed {
                    template: text.to_string(),
                    reason,
                })?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Reference(path));
                // Advance past the reference body and closing brace.
                while let Some((i, _)) = chars.peek() {
                    if *i < at + close + 1 {
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            _ => literal.push('$'),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Parse the inner text of a `${...}` reference.
fn parse_path(inner: &str) -> Result<PathExpr, String> {
    let mut chars = inner.chars().peekable();
    let root = take_ident(&mut chars)
        .ok_or_else(|| format!("`${{{inner}}}` must start with an identifier"))?;
    let mut steps = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let key = take_ident(&mut chars)
                    .ok_or_else(|| format!("`${{{inner}}}` has an empty `.` segment"))?;
                steps.push(PathStep::Key(key));
            }
            '[' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.next() != Some(']') || digits.is_empty() {
                    return Err(format!("`${{{inner}}}` has a malformed `[index]` segment"));
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| format!("`${{{inner}}}` index out of range"))?;
                steps.push(PathStep::Index(index));
            }
            other => {
                return Err(format!("`${{{inner}}}` has unexpected character `{other}`"));
            }
        }
    }

    Ok(PathExpr {
        raw: inner.to_string(),
        root,
        steps,
    })
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if is_word(c) {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    (!ident.is_empty()).then_some(ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(text: &str) -> Vec<String> {
        scan(text)
            .unwrap()
            .into_iter()
            .filter_map(|s| match s {
                Segment::Reference(p) => Some(p.raw),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(
            scan("hello").unwrap(),
            vec![Segment::Literal("hello".into())]
        );
    }

    #[test]
    fn single_reference() {
        let segs = scan("${fetch.body.items[0]}").unwrap();
        assert_eq!(segs.len(), 1);
        let Segment::Reference(p) = &segs[0] else {
            panic!("expected reference");
        };
        assert_eq!(p.root, "fetch");
        assert_eq!(
            p.steps,
            vec![
                PathStep::Key("body".into()),
                PathStep::Key("items".into()),
                PathStep::Index(0)
            ]
        );
    }

    #[test]
    fn embedded_references() {
        assert_eq!(refs("a ${x} b ${y.z} c"), vec!["x", "y.z"]);
    }

    #[test]
    fn double_dollar_escapes() {
        assert_eq!(
            scan("cost: $$3").unwrap(),
            vec![Segment::Literal("cost: $3".into())]
        );
        // The escaped dollar does not open the following brace.
        assert_eq!(
            scan("$${not_a_ref}").unwrap(),
            vec![Segment::Literal("${not_a_ref}".into())]
        );
    }

    #[test]
    fn lone_dollar_is_literal() {
        assert_eq!(
            scan("5$ and $x").unwrap(),
            vec![Segment::Literal("5$ and $x".into())]
        );
    }

    #[test]
    fn unterminated_template_is_an_error() {
        assert!(scan("${oops").is_err());
    }

    #[test]
    fn malformed_paths_are_errors() {
        assert!(scan("${a..b}").is_err());
        assert!(scan("${a[x]}").is_err());
        assert!(scan("${a b}").is_err());
        assert!(scan("${}").is_err());
    }

    #[test]
    fn first_key_skips_indexes() {
        let segs = scan("${n[0]}").unwrap();
        let Segment::Reference(p) = &segs[0] else {
            panic!("expected reference");
        };
        assert_eq!(p.first_key(), None);
    }
}
