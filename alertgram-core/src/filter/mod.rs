//! # Filters
//!
//! Per-destination filter expressions deciding whether an [`Event`] is routed
//! to a destination.
//!
//! A filter is a tree built once at configuration load time:
//!
//! ```text
//! FilterExpression = MatchAll
//!                  | Predicate(field, matcher)
//!                  | And([FilterExpression])
//!                  | Or([FilterExpression])
//! ```
//!
//! - [`predicate`] evaluates a single field comparison against an event.
//! - [`expression`] composes predicates with short-circuiting AND / OR.
//! - [`parse`] converts the structural configuration form (and the legacy
//!   `filters` syntax) into typed trees, and back.
//!
//! Evaluation never touches untyped configuration data and never mutates any
//! state, so the same `(expression, event)` pair always yields the same verdict.
//!
//! [`Event`]: crate::event::Event

pub mod expression;
pub mod parse;
pub mod predicate;

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use tracing::warn;

pub use parse::{parse_filter, parse_legacy_filters, MAX_FILTER_DEPTH};
pub use predicate::PredicateError;

/// Path into an [`Event`](crate::event::Event) addressed by a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Level,
    Project,
    ProjectName,
    Environment,
    Message,
    Title,
    Culprit,
    Url,
    Platform,
    ShortId,
    /// `tags.<name>`
    Tag(String),
    /// `tags.*`, any tag value.
    AnyTag,
    /// `raw`, every string and object key of the raw payload.
    Raw,
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "level" => FieldPath::Level,
            "project" => FieldPath::Project,
            "project_name" => FieldPath::ProjectName,
            "environment" => FieldPath::Environment,
            "message" => FieldPath::Message,
            "title" => FieldPath::Title,
            "culprit" => FieldPath::Culprit,
            "url" => FieldPath::Url,
            "platform" => FieldPath::Platform,
            "short_id" => FieldPath::ShortId,
            "raw" => FieldPath::Raw,
            "tags.*" => FieldPath::AnyTag,
            other => match other.strip_prefix("tags.") {
                Some(tag) if !tag.is_empty() => FieldPath::Tag(tag.to_string()),
                _ => return Err(format!("unknown field '{}'", other)),
            },
        };
        Ok(field)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Level => write!(f, "level"),
            FieldPath::Project => write!(f, "project"),
            FieldPath::ProjectName => write!(f, "project_name"),
            FieldPath::Environment => write!(f, "environment"),
            FieldPath::Message => write!(f, "message"),
            FieldPath::Title => write!(f, "title"),
            FieldPath::Culprit => write!(f, "culprit"),
            FieldPath::Url => write!(f, "url"),
            FieldPath::Platform => write!(f, "platform"),
            FieldPath::ShortId => write!(f, "short_id"),
            FieldPath::Tag(name) => write!(f, "tags.{}", name),
            FieldPath::AnyTag => write!(f, "tags.*"),
            FieldPath::Raw => write!(f, "raw"),
        }
    }
}

/// Comparison operator of a predicate, as spelled in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum Operator {
    #[strum(to_string = "equals", serialize = "eq")]
    Equals,
    #[strum(to_string = "not_equals", serialize = "not-equals", serialize = "ne")]
    NotEquals,
    #[strum(to_string = "contains")]
    Contains,
    #[strum(
        to_string = "regex",
        serialize = "regex_match",
        serialize = "regex-match",
        serialize = "matches"
    )]
    Regex,
    #[strum(to_string = "in", serialize = "in_set", serialize = "in-set")]
    In,
}

/// A regular expression compiled at load time.
///
/// Patterns are case-insensitive. An invalid pattern is kept together with its
/// compile error so that evaluation can report it and fail the predicate
/// without failing configuration loading.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| e.to_string());
        if let Err(reason) = &compiled {
            warn!(pattern = %source, error = %reason, "Invalid regex pattern in filter");
        }
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    pub(crate) fn regex(&self) -> Result<&Regex, PredicateError> {
        self.compiled
            .as_ref()
            .map_err(|reason| PredicateError::InvalidPattern {
                pattern: self.source.clone(),
                reason: reason.clone(),
            })
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Operator together with its argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Equals(String),
    NotEquals(String),
    Contains(String),
    Regex(Pattern),
    In(Vec<String>),
}

impl Matcher {
    pub fn operator(&self) -> Operator {
        match self {
            Matcher::Equals(_) => Operator::Equals,
            Matcher::NotEquals(_) => Operator::NotEquals,
            Matcher::Contains(_) => Operator::Contains,
            Matcher::Regex(_) => Operator::Regex,
            Matcher::In(_) => Operator::In,
        }
    }
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: FieldPath,
    pub matcher: Matcher,
}

impl Predicate {
    /// `Tag("*")` is stored as [`FieldPath::AnyTag`], since both print as
    /// `tags.*`. Sentry tag keys never contain `*`.
    pub fn new(field: FieldPath, matcher: Matcher) -> Self {
        let field = match field {
            FieldPath::Tag(name) if name == "*" => FieldPath::AnyTag,
            other => other,
        };
        Self { field, matcher }
    }

    pub fn equals(field: FieldPath, value: impl Into<String>) -> Self {
        Self::new(field, Matcher::Equals(value.into()))
    }

    pub fn not_equals(field: FieldPath, value: impl Into<String>) -> Self {
        Self::new(field, Matcher::NotEquals(value.into()))
    }

    pub fn contains(field: FieldPath, value: impl Into<String>) -> Self {
        Self::new(field, Matcher::Contains(value.into()))
    }

    pub fn regex(field: FieldPath, pattern: impl Into<String>) -> Self {
        Self::new(field, Matcher::Regex(Pattern::new(pattern)))
    }

    pub fn in_set<I, S>(field: FieldPath, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(field, Matcher::In(values.into_iter().map(Into::into).collect()))
    }
}

/// Boolean composition of predicates.
///
/// `MatchAll` is distinct from an empty `Or`: it always evaluates to true,
/// whereas `Or([])` evaluates to false and `And([])` to true.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterExpression {
    #[default]
    MatchAll,
    Predicate(Predicate),
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
}

impl FilterExpression {
    pub fn is_match_all(&self) -> bool {
        matches!(self, FilterExpression::MatchAll)
    }

    /// Depth of the tree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            FilterExpression::MatchAll | FilterExpression::Predicate(_) => 1,
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }
}

impl From<Predicate> for FilterExpression {
    fn from(predicate: Predicate) -> Self {
        FilterExpression::Predicate(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_parsing() {
        assert_eq!("level".parse::<FieldPath>().unwrap(), FieldPath::Level);
        assert_eq!(
            "tags.server_name".parse::<FieldPath>().unwrap(),
            FieldPath::Tag("server_name".to_string())
        );
        assert_eq!("tags.*".parse::<FieldPath>().unwrap(), FieldPath::AnyTag);
        assert!("tags.".parse::<FieldPath>().is_err());
        assert!("severity".parse::<FieldPath>().is_err());
    }

    #[test]
    fn test_field_path_display_matches_parse() {
        for path in ["environment", "tags.release", "tags.*", "raw", "short_id"] {
            assert_eq!(path.parse::<FieldPath>().unwrap().to_string(), path);
        }
    }

    #[test]
    fn test_star_tag_becomes_any_tag() {
        let predicate = Predicate::equals(FieldPath::Tag("*".into()), "x");
        assert_eq!(predicate.field, FieldPath::AnyTag);
        assert_eq!(
            predicate.field.to_string().parse::<FieldPath>().unwrap(),
            predicate.field
        );
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!("in-set".parse::<Operator>().unwrap(), Operator::In);
        assert_eq!("regex-match".parse::<Operator>().unwrap(), Operator::Regex);
        assert_eq!("not-equals".parse::<Operator>().unwrap(), Operator::NotEquals);
        assert_eq!(Operator::NotEquals.to_string(), "not_equals");
        assert!("greater_than".parse::<Operator>().is_err());
    }

    #[test]
    fn test_invalid_pattern_is_kept() {
        let pattern = Pattern::new("([unclosed");
        assert!(!pattern.is_valid());
        assert_eq!(pattern.as_str(), "([unclosed");
        assert!(pattern.regex().is_err());
    }

    #[test]
    fn test_depth() {
        let leaf = FilterExpression::from(Predicate::equals(FieldPath::Level, "error"));
        assert_eq!(leaf.depth(), 1);
        let tree = FilterExpression::And(vec![FilterExpression::Or(vec![leaf.clone()]), leaf]);
        assert_eq!(tree.depth(), 3);
        assert_eq!(FilterExpression::Or(vec![]).depth(), 1);
    }
}
