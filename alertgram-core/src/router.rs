//! # Router
//!
//! Selects the destinations an event is delivered to. Pure: the result only
//! depends on the event and the destinations, and nothing is sent here.

use tracing::{debug, trace};

use crate::event::Event;
use crate::registry::Destination;

/// Returns the destinations whose filter matches `event`, in registry order.
///
/// Fallback destinations are considered only when no regular destination
/// matched. An empty result is a normal outcome.
pub fn route<'a>(event: &Event, destinations: &'a [Destination]) -> Vec<&'a Destination> {
    let matched = select(event, destinations.iter().filter(|d| !d.fallback));
    if !matched.is_empty() {
        return matched;
    }

    let fallback = select(event, destinations.iter().filter(|d| d.fallback));
    if !fallback.is_empty() {
        debug!(count = fallback.len(), "No regular destination matched, using fallback");
    }
    fallback
}

/// Keeps the first of several routed destinations that post to the same chat
/// thread with the same bot, so a chat never receives one event twice.
///
/// Runs after [`route`] on its result; order is preserved.
pub fn dedupe_targets<'a>(routed: Vec<&'a Destination>) -> Vec<&'a Destination> {
    let mut kept: Vec<&Destination> = Vec::with_capacity(routed.len());
    for destination in routed {
        if kept.iter().any(|k| k.same_target(destination)) {
            debug!(destination = %destination.label(), "Skipping duplicate target");
            continue;
        }
        kept.push(destination);
    }
    kept
}

fn select<'a>(
    event: &Event,
    destinations: impl Iterator<Item = &'a Destination>,
) -> Vec<&'a Destination> {
    destinations
        .filter(|destination| {
            let matched = destination.filter.matches(event);
            trace!(destination = %destination.label(), matched, "Evaluated destination filter");
            matched
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use crate::filter::{FieldPath, FilterExpression, Predicate};
    use crate::sender::BotCredentials;
    use crate::template::TemplateOptions;

    fn bot() -> BotCredentials {
        BotCredentials::new("https://api.telegram.org", "123:abc")
    }

    fn labels(routed: &[&Destination]) -> Vec<String> {
        routed.iter().map(|d| d.label()).collect()
    }

    fn prod_error_event() -> Event {
        Event::new(Level::Error)
            .with_environment("prod")
            .with_tag("server_name", "db1")
    }

    #[test]
    fn test_and_filter_scenario() {
        let destinations = vec![
            Destination::new("-1001", bot()).with_name("A").with_filter(FilterExpression::And(vec![
                Predicate::equals(FieldPath::Level, "error").into(),
                Predicate::equals(FieldPath::Environment, "prod").into(),
            ])),
            Destination::new("-1002", bot())
                .with_name("B")
                .with_filter(Predicate::equals(FieldPath::Tag("server_name".into()), "web1")),
        ];

        assert_eq!(labels(&route(&prod_error_event(), &destinations)), vec!["A"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let destinations = vec![Destination::new("-1001", bot())
            .with_filter(Predicate::equals(FieldPath::Level, "fatal"))];
        assert!(route(&prod_error_event(), &destinations).is_empty());
        assert!(route(&prod_error_event(), &[]).is_empty());
    }

    #[test]
    fn test_fallback_only_when_nothing_matched() {
        let destinations = vec![
            Destination::new("-1000", bot()).with_name("default").as_fallback(),
            Destination::new("-1001", bot())
                .with_name("fatal")
                .with_filter(Predicate::equals(FieldPath::Level, "fatal")),
        ];

        assert_eq!(labels(&route(&prod_error_event(), &destinations)), vec!["default"]);
        assert_eq!(
            labels(&route(&Event::new(Level::Fatal), &destinations)),
            vec!["fatal"]
        );
    }

    #[test]
    fn test_match_all_keeps_destinations_sharing_a_chat() {
        let destinations = vec![
            Destination::new("-1001", bot()).with_name("plain"),
            Destination::new("-1001", bot())
                .with_name("with-tags")
                .with_template_options(TemplateOptions {
                    include_tags: true,
                    ..Default::default()
                }),
        ];

        assert_eq!(
            labels(&route(&prod_error_event(), &destinations)),
            vec!["plain", "with-tags"]
        );
    }

    #[test]
    fn test_duplicate_targets_collapsed() {
        let destinations = vec![
            Destination::new("-1001", bot()).with_name("first"),
            Destination::new("-1001", bot()).with_name("second"),
            Destination::new("-1001", bot()).with_name("thread").with_thread(3),
            Destination::new("-1001", BotCredentials::new("https://api.telegram.org", "456:def"))
                .with_name("other-bot"),
        ];

        assert_eq!(
            labels(&dedupe_targets(route(&prod_error_event(), &destinations))),
            vec!["first", "thread", "other-bot"]
        );
    }
}
