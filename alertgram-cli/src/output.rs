//! Printing of routing and delivery results.

use alertgram_core::{DeliveryReport, DeliveryResult, Destination};
use clap::ValueEnum;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn target(channel_id: &str, thread_id: Option<i64>) -> String {
    match thread_id {
        Some(thread) => format!("{}/{}", channel_id, thread),
        None => channel_id.to_string(),
    }
}

pub fn format_routes(routed: &[&Destination], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text if routed.is_empty() => "No destination matched".to_string(),
        OutputFormat::Text => routed
            .iter()
            .map(|d| format!("{}\t{}", d.label(), target(&d.channel_id, d.thread_id)))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => json!(
            routed
                .iter()
                .map(|d| json!({
                    "destination": d.label(),
                    "channel_id": d.channel_id,
                    "thread_id": d.thread_id,
                    "fallback": d.fallback,
                }))
                .collect::<Vec<_>>()
        )
        .to_string(),
    }
}

pub fn format_reports(reports: &[DeliveryReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text if reports.is_empty() => "No destination matched".to_string(),
        OutputFormat::Text => reports
            .iter()
            .map(|r| {
                let outcome = match &r.result {
                    DeliveryResult::Delivered => "delivered".to_string(),
                    DeliveryResult::Failed(reason) => format!("failed: {}", reason),
                };
                format!(
                    "{}\t{}\t{} (attempts: {})",
                    r.destination,
                    target(&r.channel_id, r.thread_id),
                    outcome,
                    r.attempts
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => json!(reports).to_string(),
    }
}
