//! Single predicate evaluation.
//!
//! A field resolves to zero or more candidate strings. Zero candidates means
//! the field is missing:
//!
//! | operator     | missing field | present field                       |
//! |--------------|---------------|-------------------------------------|
//! | `equals`     | false         | any candidate equals the value      |
//! | `not_equals` | true          | no candidate equals the value       |
//! | `contains`   | false         | any candidate contains the value    |
//! | `regex`      | false         | any candidate matches the pattern   |
//! | `in`         | false         | any candidate equals a set member   |
//!
//! String comparisons are case-sensitive; regex patterns are compiled
//! case-insensitive.

use std::borrow::Cow;

use thiserror::Error;
use tracing::error;

use super::{FieldPath, Matcher, Predicate};
use crate::event::Event;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type PredicateResult<T> = Result<T, PredicateError>;

/// Evaluates a predicate, recovering locally from [`PredicateError`].
///
/// An error is logged and the predicate evaluates to `false`; sibling
/// predicates and other destinations are unaffected.
pub fn evaluate(predicate: &Predicate, event: &Event) -> bool {
    match try_evaluate(predicate, event) {
        Ok(verdict) => verdict,
        Err(e) => {
            error!(field = %predicate.field, error = %e, "Filter predicate failed, treating as no match");
            false
        }
    }
}

pub fn try_evaluate(predicate: &Predicate, event: &Event) -> PredicateResult<bool> {
    let candidates = resolve(&predicate.field, event);

    let verdict = match &predicate.matcher {
        Matcher::Equals(value) => candidates.iter().any(|c| c == value),
        Matcher::NotEquals(value) => !candidates.iter().any(|c| c == value),
        Matcher::Contains(value) => candidates.iter().any(|c| c.contains(value.as_str())),
        Matcher::Regex(pattern) => {
            let regex = pattern.regex()?;
            candidates.iter().any(|c| regex.is_match(c))
        }
        Matcher::In(values) => candidates.iter().any(|c| values.iter().any(|v| v == c)),
    };
    Ok(verdict)
}

/// Resolves a field path to its candidate strings.
pub fn resolve<'a>(field: &FieldPath, event: &'a Event) -> Vec<Cow<'a, str>> {
    let single = |value: &'a Option<String>| -> Vec<Cow<'a, str>> {
        value.as_deref().map(Cow::Borrowed).into_iter().collect()
    };

    match field {
        FieldPath::Level => vec![Cow::Borrowed(event.level.as_ref())],
        FieldPath::Project => single(&event.project),
        FieldPath::ProjectName => single(&event.project_name),
        FieldPath::Environment => single(&event.environment),
        FieldPath::Message => single(&event.message),
        FieldPath::Title => single(&event.title),
        FieldPath::Culprit => single(&event.culprit),
        FieldPath::Url => single(&event.url),
        FieldPath::Platform => single(&event.platform),
        FieldPath::ShortId => single(&event.short_id),
        FieldPath::Tag(name) => event
            .tags
            .get(name)
            .map(|v| Cow::Borrowed(v.as_str()))
            .into_iter()
            .collect(),
        FieldPath::AnyTag => event
            .tags
            .values()
            .map(|v| Cow::Borrowed(v.as_str()))
            .collect(),
        FieldPath::Raw => {
            let mut out = Vec::new();
            collect_json_strings(&event.raw, &mut out);
            out
        }
    }
}

fn collect_json_strings<'a>(value: &'a serde_json::Value, out: &mut Vec<Cow<'a, str>>) {
    match value {
        serde_json::Value::String(s) => out.push(Cow::Borrowed(s.as_str())),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                out.push(Cow::Borrowed(key.as_str()));
                collect_json_strings(item, out);
            }
        }
        _ => {}
    }
}
