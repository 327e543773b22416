//! # Message templates
//!
//! Renders an [`Event`] into the Telegram message text for one destination.
//!
//! Templates use `{placeholder}` substitution:
//!
//! | placeholder                      | value                                  |
//! |----------------------------------|----------------------------------------|
//! | `{project_name}`, `{project}`    | project name / slug                    |
//! | `{title}`                        | title, truncated to 500 chars          |
//! | `{message}`                      | event message, truncated to fit        |
//! | `{url}`                          | link back to the issue                 |
//! | `{level}`, `{event_level}`       | event level                            |
//! | `{environment}`, `{culprit}`     |                                        |
//! | `{platform}`, `{short_id}`       |                                        |
//! | `{times_seen}`, `{event_datetime}` |                                      |
//! | `{tag[name]}`                    | tag value, `[NA]` when undefined       |
//! | `{tags}`                         | all tags as `key=value, ...`           |
//!
//! `{{` and `}}` produce literal braces. Unknown placeholders render as `-`.
//! Substituted values are escaped for Telegram Markdown (v1); the template
//! text itself is not, so it can carry formatting.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::warn;

use crate::config::DEFAULT_MESSAGE_TEMPLATE;
use crate::event::Event;

/// Telegram's limit for a single message.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;
pub const EVENT_TITLE_MAX_LENGTH: usize = 500;
pub const TRUNCATION_MARKER: &str = "... (truncated)";
pub const NOT_AVAILABLE: &str = "[NA]";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{|\}\}|\{([a-z_]+)(?:\[([^\]\}]*)\])?\}").expect("placeholder regex");
}

/// Which event fields go into a destination's message, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOptions {
    pub template: String,
    /// Append a sorted `key: value` listing of all tags.
    pub include_tags: bool,
    /// Append an `Environment:` line.
    pub include_environment: bool,
    pub disable_web_page_preview: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            include_tags: false,
            include_environment: false,
            disable_web_page_preview: false,
        }
    }
}

impl TemplateOptions {
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }
}

/// Escapes the characters that Telegram Markdown v1 treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Cuts `text` to at most `max` chars, appending `suffix` when cut.
pub fn truncate_chars(text: &str, max: usize, suffix: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    // never leave half of an escape sequence behind
    let trailing = cut.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        cut.pop();
    }
    cut.push_str(suffix);
    cut
}

/// Renders the message for `event` according to `options`.
///
/// The result never exceeds [`TELEGRAM_MAX_MESSAGE_LENGTH`] chars: the event
/// message is shortened first, then the whole text as a last resort.
pub fn render(event: &Event, options: &TemplateOptions) -> String {
    let suffix = render_suffix(event, options);
    let message = escape_markdown(event.message.as_deref().unwrap_or(""));

    let overhead = substitute(&options.template, event, TRUNCATION_MARKER).chars().count()
        + suffix.chars().count();
    let budget = TELEGRAM_MAX_MESSAGE_LENGTH.saturating_sub(overhead);
    let message = truncate_chars(&message, budget, TRUNCATION_MARKER);

    let mut text = substitute(&options.template, event, &message);
    text.push_str(&suffix);
    if text.chars().count() > TELEGRAM_MAX_MESSAGE_LENGTH {
        text = truncate_chars(
            &text,
            TELEGRAM_MAX_MESSAGE_LENGTH - TRUNCATION_MARKER.chars().count(),
            TRUNCATION_MARKER,
        );
    }
    text
}

fn substitute(template: &str, event: &Event, message: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[0] {
            "{{" => "{".to_string(),
            "}}" => "}".to_string(),
            _ => {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let key = caps.get(2).map(|m| m.as_str());
                placeholder_value(name, key, event, message)
            }
        })
        .into_owned()
}

fn placeholder_value(name: &str, key: Option<&str>, event: &Event, message: &str) -> String {
    let or_na = |value: Option<&str>| escape_markdown(value.unwrap_or(NOT_AVAILABLE));

    match (name, key) {
        ("tag", Some(key)) => or_na(event.tags.get(key).map(String::as_str)),
        ("message", None) => message.to_string(),
        ("title", None) => escape_markdown(&truncate_chars(
            event.display_title(),
            EVENT_TITLE_MAX_LENGTH,
            "...",
        )),
        ("project_name", None) => or_na(event.project_name.as_deref().or(event.project.as_deref())),
        ("project", None) => or_na(event.project.as_deref()),
        ("url", None) => event.url.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ("level", None) | ("event_level", None) => event.level.to_string(),
        ("environment", None) => or_na(event.environment.as_deref()),
        ("culprit", None) => or_na(event.culprit.as_deref()),
        ("platform", None) => or_na(event.platform.as_deref()),
        ("short_id", None) => or_na(event.short_id.as_deref()),
        ("times_seen", None) => event
            .times_seen
            .map_or_else(|| NOT_AVAILABLE.to_string(), |n| n.to_string()),
        ("event_datetime", None) => event
            .datetime
            .map_or_else(|| NOT_AVAILABLE.to_string(), |dt| dt.to_rfc3339()),
        ("tags", None) => escape_markdown(
            &event
                .tags
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => {
            warn!(placeholder = name, "Unknown placeholder in message template");
            "-".to_string()
        }
    }
}

fn render_suffix(event: &Event, options: &TemplateOptions) -> String {
    let mut suffix = String::new();
    if options.include_environment {
        suffix.push_str("\nEnvironment: ");
        suffix.push_str(&escape_markdown(
            event.environment.as_deref().unwrap_or(NOT_AVAILABLE),
        ));
    }
    if options.include_tags && !event.tags.is_empty() {
        suffix.push_str("\nTags:");
        for (key, value) in &event.tags {
            suffix.push_str(&format!("\n{}: {}", escape_markdown(key), escape_markdown(value)));
        }
    }
    suffix
}
