//! Conversion between configuration documents and [`FilterExpression`] trees.
//!
//! Structural form, one object per node:
//!
//! ```json
//! { "op": "and", "children": [ ... ] }
//! { "op": "or",  "children": [ ... ] }
//! { "op": "all" }
//! { "field": "tags.server_name", "operator": "in", "value": ["db1", "db2"] }
//! ```
//!
//! An absent filter, `null` or `{}` at the top level is the match-all
//! expression. The legacy `filters` syntax (`{type, value}` leaves grouped by
//! `and_filters` / `or_filters`) is translated into the same trees.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{FieldPath, FilterExpression, Matcher, Operator, Pattern, Predicate};
use crate::config::{ConfigError, ConfigResult};

/// Deepest accepted nesting of a filter tree.
pub const MAX_FILTER_DEPTH: usize = 32;

const NODE_KEYS: [&str; 5] = ["op", "children", "field", "operator", "value"];

/// Parses a structural filter tree.
pub fn parse_filter(value: &Value, path: &str) -> ConfigResult<FilterExpression> {
    match value {
        Value::Null => Ok(FilterExpression::MatchAll),
        Value::Object(map) if map.is_empty() => Ok(FilterExpression::MatchAll),
        _ => parse_node(value, path, 1),
    }
}

fn parse_node(value: &Value, path: &str, depth: usize) -> ConfigResult<FilterExpression> {
    if depth > MAX_FILTER_DEPTH {
        return Err(ConfigError::FilterTooDeep {
            path: path.to_string(),
            max: MAX_FILTER_DEPTH,
        });
    }

    let map = value
        .as_object()
        .ok_or_else(|| ConfigError::malformed(path, "expected an object"))?;

    if let Some(key) = map.keys().find(|k| !NODE_KEYS.contains(&k.as_str())) {
        return Err(ConfigError::malformed(path, format!("unexpected key '{}'", key)));
    }

    let has_children = map.contains_key("children");
    let has_value = map.contains_key("value");
    if has_children && has_value {
        return Err(ConfigError::malformed(
            path,
            "a node cannot carry both 'value' and 'children'",
        ));
    }

    match map.get("op") {
        Some(op) => parse_group(op, map, path, depth),
        None if has_children => Err(ConfigError::malformed(path, "'children' requires 'op'")),
        None => parse_predicate(map, path).map(FilterExpression::Predicate),
    }
}

fn parse_group(
    op: &Value,
    map: &Map<String, Value>,
    path: &str,
    depth: usize,
) -> ConfigResult<FilterExpression> {
    let op = op
        .as_str()
        .ok_or_else(|| ConfigError::malformed(path, "'op' must be a string"))?;

    if ["field", "operator", "value"].iter().any(|k| map.contains_key(*k)) {
        return Err(ConfigError::malformed(
            path,
            "a group node cannot carry 'field', 'operator' or 'value'",
        ));
    }

    if op == "all" {
        if map.contains_key("children") {
            return Err(ConfigError::malformed(path, "'all' takes no children"));
        }
        return Ok(FilterExpression::MatchAll);
    }

    let children = map
        .get("children")
        .ok_or_else(|| ConfigError::malformed(path, format!("'{}' requires 'children'", op)))?
        .as_array()
        .ok_or_else(|| ConfigError::malformed(path, "'children' must be an array"))?;

    let parsed = children
        .iter()
        .enumerate()
        .map(|(i, child)| parse_node(child, &format!("{}.children[{}]", path, i), depth + 1))
        .collect::<ConfigResult<Vec<_>>>()?;

    match op {
        "and" => Ok(FilterExpression::And(parsed)),
        "or" => Ok(FilterExpression::Or(parsed)),
        other => Err(ConfigError::UnknownOperator {
            path: path.to_string(),
            operator: other.to_string(),
        }),
    }
}

fn parse_predicate(map: &Map<String, Value>, path: &str) -> ConfigResult<Predicate> {
    let field = map
        .get("field")
        .ok_or_else(|| ConfigError::malformed(path, "expected 'op' or 'field'"))?
        .as_str()
        .ok_or_else(|| ConfigError::malformed(path, "'field' must be a string"))?;
    let field = parse_field(field, path)?;

    let operator = map
        .get("operator")
        .ok_or_else(|| ConfigError::malformed(path, "predicate requires 'operator'"))?
        .as_str()
        .ok_or_else(|| ConfigError::malformed(path, "'operator' must be a string"))?;
    let operator: Operator = operator.parse().map_err(|_| ConfigError::UnknownOperator {
        path: path.to_string(),
        operator: operator.to_string(),
    })?;

    let value = map
        .get("value")
        .ok_or_else(|| ConfigError::malformed(path, "predicate requires 'value'"))?;

    let matcher = match operator {
        Operator::In => {
            let items = value
                .as_array()
                .ok_or_else(|| ConfigError::malformed(path, "'in' requires an array value"))?;
            let set = items
                .iter()
                .map(|item| scalar_to_string(item, path))
                .collect::<ConfigResult<Vec<_>>>()?;
            Matcher::In(set)
        }
        Operator::Equals => Matcher::Equals(scalar_to_string(value, path)?),
        Operator::NotEquals => Matcher::NotEquals(scalar_to_string(value, path)?),
        Operator::Contains => Matcher::Contains(scalar_to_string(value, path)?),
        Operator::Regex => Matcher::Regex(Pattern::new(scalar_to_string(value, path)?)),
    };

    Ok(Predicate::new(field, matcher))
}

fn parse_field(field: &str, path: &str) -> ConfigResult<FieldPath> {
    field.parse().map_err(|reason| ConfigError::UnknownField {
        path: path.to_string(),
        reason,
    })
}

fn scalar_to_string(value: &Value, path: &str) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::malformed(
            path,
            "'value' must be a string, number or boolean",
        )),
    }
}

/// Serializes an expression back to its structural form.
pub fn to_structural(expr: &FilterExpression) -> Value {
    match expr {
        FilterExpression::MatchAll => json!({ "op": "all" }),
        FilterExpression::And(children) => json!({
            "op": "and",
            "children": children.iter().map(to_structural).collect::<Vec<_>>(),
        }),
        FilterExpression::Or(children) => json!({
            "op": "or",
            "children": children.iter().map(to_structural).collect::<Vec<_>>(),
        }),
        FilterExpression::Predicate(p) => {
            let value = match &p.matcher {
                Matcher::Equals(v) | Matcher::NotEquals(v) | Matcher::Contains(v) => json!(v),
                Matcher::Regex(pattern) => json!(pattern.as_str()),
                Matcher::In(set) => json!(set),
            };
            json!({
                "field": p.field.to_string(),
                "operator": p.matcher.operator().to_string(),
                "value": value,
            })
        }
    }
}

impl Serialize for FilterExpression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        to_structural(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterExpression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parse_filter(&value, "filter").map_err(serde::de::Error::custom)
    }
}

/// Translates the legacy `filters` syntax.
///
/// A list of leaves is an AND of all of them; an empty list, an empty object
/// or a group whose only list is empty is match-all.
pub fn parse_legacy_filters(value: &Value, path: &str) -> ConfigResult<FilterExpression> {
    match value {
        Value::Null => Ok(FilterExpression::MatchAll),
        Value::Array(items) if items.is_empty() => Ok(FilterExpression::MatchAll),
        Value::Object(map) if map.is_empty() => Ok(FilterExpression::MatchAll),
        Value::Object(map) if is_empty_group(map) => Ok(FilterExpression::MatchAll),
        Value::Array(items) => Ok(FilterExpression::And(parse_legacy_list(items, path, 1)?)),
        Value::Object(_) => parse_legacy_group(value, path, 1),
        _ => Err(ConfigError::malformed(
            path,
            "legacy filters must be a list or a filter group",
        )),
    }
}

fn is_empty_group(map: &Map<String, Value>) -> bool {
    let empty = |key: &str| match map.get(key) {
        None => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    };
    (map.contains_key("and_filters") || map.contains_key("or_filters"))
        && empty("and_filters")
        && empty("or_filters")
}

fn parse_legacy_list(items: &[Value], path: &str, depth: usize) -> ConfigResult<Vec<FilterExpression>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_legacy_item(item, &format!("{}[{}]", path, i), depth))
        .collect()
}

fn parse_legacy_item(value: &Value, path: &str, depth: usize) -> ConfigResult<FilterExpression> {
    match value.as_object() {
        Some(map) if map.contains_key("type") => parse_legacy_leaf(map, path).map(Into::into),
        Some(_) => parse_legacy_group(value, path, depth + 1),
        None => Err(ConfigError::malformed(path, "expected a filter object")),
    }
}

fn parse_legacy_group(value: &Value, path: &str, depth: usize) -> ConfigResult<FilterExpression> {
    if depth > MAX_FILTER_DEPTH {
        return Err(ConfigError::FilterTooDeep {
            path: path.to_string(),
            max: MAX_FILTER_DEPTH,
        });
    }
    let map = value
        .as_object()
        .ok_or_else(|| ConfigError::malformed(path, "expected a filter group"))?;

    // 'and_filters' wins when a group carries both lists
    match (map.get("and_filters"), map.get("or_filters")) {
        (Some(Value::Array(items)), or_filters) => {
            if or_filters.is_some() {
                warn!(path, "Filter group has both 'and_filters' and 'or_filters', ignoring 'or_filters'");
            }
            Ok(FilterExpression::And(parse_legacy_list(
                items,
                &format!("{}.and_filters", path),
                depth,
            )?))
        }
        (None, Some(Value::Array(items))) => Ok(FilterExpression::Or(parse_legacy_list(
            items,
            &format!("{}.or_filters", path),
            depth,
        )?)),
        (Some(_), _) | (None, Some(_)) => {
            Err(ConfigError::malformed(path, "filter group members must be a list"))
        }
        (None, None) => Err(ConfigError::malformed(
            path,
            "expected 'and_filters' or 'or_filters'",
        )),
    }
}

fn parse_legacy_leaf(map: &Map<String, Value>, path: &str) -> ConfigResult<Predicate> {
    let filter_type = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::malformed(path, "'type' must be a string"))?;
    let value = map
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::malformed(path, "'value' must be a string"))?;

    let predicate = match filter_type {
        "regex__message" => Predicate::regex(FieldPath::Message, value),
        "regex__title" => Predicate::regex(FieldPath::Title, value),
        "level" => Predicate::equals(FieldPath::Level, value),
        "project_slug" => Predicate::equals(FieldPath::Project, value),
        "value__tag" => Predicate::equals(FieldPath::AnyTag, value),
        "event_raw_regex" => Predicate::regex(FieldPath::Raw, value),
        other => match other.strip_prefix("tag__") {
            Some(tag) if !tag.is_empty() => Predicate::regex(FieldPath::Tag(tag.to_string()), value),
            _ => {
                return Err(ConfigError::UnknownLegacyFilter {
                    path: path.to_string(),
                    filter_type: other.to_string(),
                });
            }
        },
    };
    Ok(predicate)
}
