//! Filter expression evaluation.

use super::{FilterExpression, predicate};
use crate::event::Event;

/// Evaluates a filter expression against an event.
///
/// `And` stops at the first false child and is true for no children; `Or`
/// stops at the first true child and is false for no children. `MatchAll` is
/// always true. Recursion depth is bounded by the tree, which is capped at
/// load time by [`MAX_FILTER_DEPTH`](super::MAX_FILTER_DEPTH).
pub fn evaluate(expr: &FilterExpression, event: &Event) -> bool {
    match expr {
        FilterExpression::MatchAll => true,
        FilterExpression::Predicate(p) => predicate::evaluate(p, event),
        FilterExpression::And(children) => children.iter().all(|child| evaluate(child, event)),
        FilterExpression::Or(children) => children.iter().any(|child| evaluate(child, event)),
    }
}

impl FilterExpression {
    pub fn matches(&self, event: &Event) -> bool {
        evaluate(self, event)
    }
}
