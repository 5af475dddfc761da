//! Action and resource pattern matching.
//!
//! Actions look like `service:resource-type:operation`; resources are either
//! colon-delimited identifiers (`api:documents:owner:user-123/report.pdf`) or
//! slash-delimited paths (`/api/v1/users`). Patterns are matched segment by
//! segment and delimiters must line up.
//!
//! | pattern segment | matches |
//! |---|---|
//! | `*` (not last) | any single segment |
//! | `*` (last, after `:` or alone) | the whole remainder |
//! | `*` (last, after `/`) | exactly one path segment |
//! | `**` (last) | one or more remaining segments |
//! | text with `*` | loose glob ([`match_resource_pattern`]) |
//! | text | exact equality |

use tracing::{debug, trace};

use crate::condition::stringify;
use crate::context::{EvaluationContext, PathLookup};
use crate::resolver::{match_resource_pattern, resolve_hierarchy};

const ACTION_DELIMITERS: &[char] = &[':'];
const RESOURCE_DELIMITERS: &[char] = &[':', '/'];

/// Characters a substituted value may not carry into a resource pattern.
const PATTERN_METACHARACTERS: &[char] = &['*', ':', '/'];

/// What a pattern is matched against. Determines delimiters and the meaning
/// of a trailing `/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Action,
    Resource,
}

impl PatternKind {
    fn delimiters(self) -> &'static [char] {
        match self {
            Self::Action => ACTION_DELIMITERS,
            Self::Resource => RESOURCE_DELIMITERS,
        }
    }
}

/// A segment and the delimiter that precedes it (`None` for the first).
type Token<'a> = (Option<char>, &'a str);

/// Returns `true` if any of `patterns` matches `requested`.
pub fn match_action<P: AsRef<str>>(patterns: &[P], requested: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| match_pattern(pattern.as_ref(), requested, PatternKind::Action))
}

/// Returns `true` if any of `patterns`, after placeholder substitution
/// against `ctx`, matches `requested`.
///
/// Substituted values are literal. A pattern whose placeholder resolves to a
/// value containing `*`, `:` or `/` matches nothing.
pub fn match_resource<P: AsRef<str>, C: PathLookup + ?Sized>(
    patterns: &[P],
    requested: &str,
    ctx: &C,
) -> bool {
    patterns.iter().any(|pattern| {
        let Some(pattern) = substitute_literals(pattern.as_ref(), ctx) else {
            return false;
        };
        let matched = match_pattern(&pattern, requested, PatternKind::Resource);
        trace!(pattern = %pattern, requested = %requested, matched, "Resource pattern");
        matched
    })
}

/// Matches a rule-based policy's resource patterns against the context's
/// resource keys and the hierarchy of its path, using the loose predicate.
/// An empty list matches everything.
pub fn match_resource_patterns<P: AsRef<str>>(patterns: &[P], ctx: &EvaluationContext) -> bool {
    if patterns.is_empty() {
        return true;
    }

    let keys = ctx.resource_keys();
    let hierarchy = resolve_hierarchy(&ctx.resource.path);
    let candidates: Vec<&str> = keys
        .into_iter()
        .chain(hierarchy.iter().map(String::as_str))
        .collect();

    patterns.iter().any(|pattern| {
        let Some(pattern) = substitute_literals(pattern.as_ref(), ctx) else {
            return false;
        };
        candidates
            .iter()
            .any(|candidate| match_resource_pattern(&pattern, candidate))
    })
}

/// Segment-aware match of a single pattern. An empty value never matches.
pub fn match_pattern(pattern: &str, value: &str, kind: PatternKind) -> bool {
    if value.is_empty() {
        return false;
    }
    if pattern == "*" || pattern == value {
        return true;
    }

    let delimiters = kind.delimiters();
    let pattern = tokenize(pattern, delimiters);
    let value = tokenize(value, delimiters);
    match_tokens(&pattern, &value, kind)
}

fn match_tokens(pattern: &[Token<'_>], value: &[Token<'_>], kind: PatternKind) -> bool {
    for (i, &(delimiter, segment)) in pattern.iter().enumerate() {
        let last = i + 1 == pattern.len();
        let aligned = value.get(i).is_some_and(|(d, _)| *d == delimiter);

        if last && segment == "**" {
            return aligned;
        }
        if last && segment == "*" {
            return match (kind, delimiter) {
                (PatternKind::Resource, Some('/')) => {
                    aligned && value.len() == i + 1 && !value[i].1.is_empty()
                }
                _ => aligned,
            };
        }

        let Some(&(value_delimiter, value_segment)) = value.get(i) else {
            return false;
        };
        if value_delimiter != delimiter || !segment_matches(segment, value_segment) {
            return false;
        }
    }
    pattern.len() == value.len()
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    if pattern == "*" {
        true
    } else if pattern.contains('*') {
        match_resource_pattern(pattern, segment)
    } else {
        pattern == segment
    }
}

fn tokenize<'a>(s: &'a str, delimiters: &[char]) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    let mut delimiter = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if delimiters.contains(&c) {
            tokens.push((delimiter, &s[start..i]));
            delimiter = Some(c);
            start = i + c.len_utf8();
        }
    }
    tokens.push((delimiter, &s[start..]));
    tokens
}

/// Replaces `${namespace:Field}` placeholders with values from `ctx`.
///
/// A placeholder resolves the context path `namespace.Field`; one without a
/// namespace resolves against the environment. Unresolved placeholders become
/// the empty string and an unterminated `${` is copied through.
///
/// ```
/// use warden_abac::substitute_variables;
/// use warden_types::Attributes;
/// use serde_json::json;
///
/// let ctx: Attributes = json!({"request": {"UserId": "user-123"}})
///     .as_object()
///     .cloned()
///     .unwrap();
/// assert_eq!(
///     substitute_variables("owner:${request:UserId}/*", &ctx),
///     "owner:user-123/*",
/// );
/// assert_eq!(substitute_variables("${request:Nope}!", &ctx), "!");
/// ```
pub fn substitute_variables<C: PathLookup + ?Sized>(template: &str, ctx: &C) -> String {
    expand(template, ctx, |_| true).unwrap_or_default()
}

/// Substitution for resource patterns: `None` if any resolved value contains
/// a pattern metacharacter.
fn substitute_literals<C: PathLookup + ?Sized>(template: &str, ctx: &C) -> Option<String> {
    expand(template, ctx, |value| {
        let literal = !value.contains(PATTERN_METACHARACTERS);
        if !literal {
            debug!(template = %template, "Rejected placeholder value with pattern characters");
        }
        literal
    })
}

fn expand<C: PathLookup + ?Sized>(
    template: &str,
    ctx: &C,
    mut accept: impl FnMut(&str) -> bool,
) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            out.push_str(&rest[start..]);
            return Some(out);
        };
        let path = body[..end].trim().replacen(':', ".", 1);
        if let Some(value) = ctx.lookup(&path) {
            let value = stringify(&value);
            if !accept(&value) {
                return None;
            }
            out.push_str(&value);
        }
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;
    use warden_types::Attributes;

    #[test_case("*", "s3:object:read", true ; "bare star")]
    #[test_case("*", "", false ; "bare star empty action")]
    #[test_case("svc:*:read", "svc:file:read", true ; "middle wildcard")]
    #[test_case("svc:*:read", "svc:file:write", false ; "middle wildcard wrong op")]
    #[test_case("svc:*:read", "svc:read", false ; "middle wildcard too short")]
    #[test_case("document-service:file:*", "document-service:file:read", true ; "trailing star")]
    #[test_case("document-service:file:*", "document-service:file:read:all", true ; "trailing star remainder")]
    #[test_case("document-service:file:*", "document-service:file", false ; "trailing star needs a segment")]
    #[test_case("svc:file:read", "svc:file:read", true ; "exact")]
    #[test_case("svc:fi*:read", "svc:files:read", true ; "glob segment")]
    #[test_case("svc:file", "svc:file:read", false ; "pattern shorter")]
    fn matches_actions(pattern: &str, action: &str, expected: bool) {
        assert_eq!(match_pattern(pattern, action, PatternKind::Action), expected);
    }

    #[test_case("/api/v1/*", "/api/v1/users", true ; "slash star one segment")]
    #[test_case("/api/v1/*", "/api/v1/users/123", false ; "slash star not deeper")]
    #[test_case("/api/v1/*", "/api/v1", false ; "slash star needs segment")]
    #[test_case("/api/**", "/api/v1/users/123", true ; "double star subtree")]
    #[test_case("/api/**", "/api", false ; "double star needs segment")]
    #[test_case("/api/*/users", "/api/v2/users", true ; "middle star")]
    #[test_case("api:documents:*", "api:documents:owner:u/report.pdf", true ; "colon star remainder")]
    #[test_case("api:documents:owner:u/*", "api:documents:owner:u/report.pdf", true ; "mixed delimiters")]
    #[test_case("api:documents:owner:u/*", "api:documents:owner:u:report.pdf", false ; "delimiters must line up")]
    #[test_case("/files/*.pdf", "/files/report.pdf", true ; "glob file")]
    fn matches_resources(pattern: &str, resource: &str, expected: bool) {
        assert_eq!(match_pattern(pattern, resource, PatternKind::Resource), expected);
    }

    #[test]
    fn any_pattern_in_list() {
        let patterns = ["svc:file:write", "svc:*:read"];
        assert!(match_action(&patterns, "svc:file:read"));
        assert!(!match_action(&patterns, "svc:file:delete"));
        assert!(!match_action::<&str>(&[], "svc:file:read"));
    }

    #[test]
    fn resource_placeholders_are_substituted() {
        let ctx: Attributes = json!({"request": {"UserId": "user-123"}})
            .as_object()
            .cloned()
            .unwrap();
        let patterns = ["api:documents:owner:${request:UserId}/*"];

        assert!(match_resource(
            &patterns,
            "api:documents:owner:user-123/report.pdf",
            &ctx
        ));
        assert!(!match_resource(
            &patterns,
            "api:documents:owner:user-456/report.pdf",
            &ctx
        ));
    }

    #[test_case("*" ; "star")]
    #[test_case("victim/report.pdf" ; "slash")]
    #[test_case("user-123:victim" ; "colon")]
    #[test_case("vic*" ; "embedded star")]
    fn substituted_values_cannot_widen_patterns(username: &str) {
        let ctx: Attributes = json!({"subject": {"username": username}})
            .as_object()
            .cloned()
            .unwrap();
        let patterns = ["api:documents:owner:${subject:username}/*"];

        assert!(!match_resource(
            &patterns,
            "api:documents:owner:victim/report.pdf",
            &ctx
        ));
        assert!(!match_resource(
            &patterns,
            "api:documents:owner:user-123:victim/report.pdf",
            &ctx
        ));
    }

    #[test]
    fn substitution_edge_cases() {
        let ctx: Attributes = json!({
            "subject": {"level": 3, "tags": ["a"]},
            "source_ip": "10.0.0.1"
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_eq!(substitute_variables("lvl-${subject:level}", &ctx), "lvl-3");
        assert_eq!(substitute_variables("${subject:tags}", &ctx), r#"["a"]"#);
        assert_eq!(substitute_variables("${source_ip}", &ctx), "10.0.0.1");
        assert_eq!(substitute_variables("open ${subject:level", &ctx), "open ${subject:level");
        assert_eq!(substitute_variables("no placeholders", &ctx), "no placeholders");
    }
}
