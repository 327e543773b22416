//! # Dispatcher
//!
//! Formats an event for every matched destination and sends it through a
//! [`MessageSender`]. Each destination is handled on its own: a failure is
//! recorded as [`DeliveryResult::Failed`] and never prevents delivery to the
//! other destinations.
//!
//! Per destination the delivery moves through:
//!
//! ```text
//! Pending -> Sending -> Delivered
//!                    -> Retrying -> Sending ...
//!                    -> Failed
//! ```
//!
//! Every attempt is bounded by the configured timeout; transient failures are
//! retried according to the [`RetryPolicy`].

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::event::Event;
use crate::registry::Destination;
use crate::sender::{MessageSender, OutboundMessage, SendError, SendResult};
use crate::template;

pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};

/// Outcome of delivering one event to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum DeliveryResult {
    Delivered,
    Failed(String),
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Sending,
    Retrying,
    Delivered,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub destination: String,
    pub channel_id: String,
    pub thread_id: Option<i64>,
    pub result: DeliveryResult,
    pub attempts: u32,
}

pub struct Dispatcher {
    sender: Arc<dyn MessageSender>,
    policy: RetryPolicy,
    timeout: Duration,
    concurrent: bool,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self::from_config(sender, &DeliveryConfig::default())
    }

    pub fn from_config(sender: Arc<dyn MessageSender>, config: &DeliveryConfig) -> Self {
        Self {
            sender,
            policy: RetryPolicy::from(config),
            timeout: config.timeout,
            concurrent: config.concurrent,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Delivers `event` to every destination and reports one result per
    /// destination, in the order given.
    #[instrument(
        skip_all,
        fields(dispatch_id = %Uuid::new_v4(), destinations = destinations.len())
    )]
    pub async fn dispatch(&self, event: &Event, destinations: &[&Destination]) -> Vec<DeliveryReport> {
        let reports = if self.concurrent {
            join_all(destinations.iter().map(|d| self.deliver(event, d))).await
        } else {
            let mut reports = Vec::with_capacity(destinations.len());
            for destination in destinations {
                reports.push(self.deliver(event, destination).await);
            }
            reports
        };

        let failed = reports.iter().filter(|r| !r.result.is_delivered()).count();
        info!(
            delivered = reports.len() - failed,
            failed, "Dispatch finished"
        );
        reports
    }

    #[instrument(
        skip_all,
        fields(destination = %destination.label(), channel_id = %destination.channel_id, thread_id = ?destination.thread_id)
    )]
    async fn deliver(&self, event: &Event, destination: &Destination) -> DeliveryReport {
        let message = OutboundMessage {
            bot: destination.bot.clone(),
            channel_id: destination.channel_id.clone(),
            thread_id: destination.thread_id,
            text: template::render(event, &destination.template_options),
            disable_web_page_preview: destination.template_options.disable_web_page_preview,
        };

        let mut state = DeliveryState::Pending;
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            transition(&mut state, DeliveryState::Sending, attempt);

            let error = match self.attempt(&message).await {
                Ok(()) => {
                    transition(&mut state, DeliveryState::Delivered, attempt);
                    info!(attempt, "Delivered");
                    break DeliveryResult::Delivered;
                }
                Err(error) => error,
            };

            match self.policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Send failed, retrying"
                    );
                    transition(&mut state, DeliveryState::Retrying, attempt);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { reason } => {
                    transition(&mut state, DeliveryState::Failed, attempt);
                    error!(attempt, error = %error, reason = %reason, "Delivery failed");
                    break DeliveryResult::Failed(error.to_string());
                }
            }
        };

        DeliveryReport {
            destination: destination.label(),
            channel_id: destination.channel_id.clone(),
            thread_id: destination.thread_id,
            result,
            attempts: attempt,
        }
    }

    async fn attempt(&self, message: &OutboundMessage) -> SendResult<()> {
        match tokio::time::timeout(self.timeout, self.sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(self.timeout)),
        }
    }
}

fn transition(state: &mut DeliveryState, next: DeliveryState, attempt: u32) {
    debug!(from = %state, to = %next, attempt, "Delivery state");
    *state = next;
}
