//! # Outbound messaging
//!
//! [`MessageSender`] is the capability the dispatcher uses to post a message
//! to one chat (and optionally one thread). [`telegram::TelegramSender`]
//! implements it on top of the Telegram Bot API; tests use the generated
//! `MockMessageSender`.

pub mod telegram;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub use telegram::TelegramSender;

/// Failure of a single send attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {status}: {description}")]
    Server { status: u16, description: String },

    #[error("rejected: HTTP {status}: {description}")]
    Rejected { status: u16, description: String },
}

impl SendError {
    /// Transient failures are retried, permanent ones (invalid chat,
    /// unauthorized bot, malformed request) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Network(_)
            | SendError::Timeout(_)
            | SendError::RateLimited { .. }
            | SendError::Server { .. } => true,
            SendError::Rejected { .. } => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type SendResult<T> = Result<T, SendError>;

/// Bot identity used to reach the Telegram API.
#[derive(Clone)]
pub struct BotCredentials {
    pub api_origin: String,
    pub api_token: SecretString,
}

impl BotCredentials {
    pub fn new(api_origin: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_origin: api_origin.into().trim_end_matches('/').to_string(),
            api_token: SecretString::from(api_token.into()),
        }
    }

    pub fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_origin,
            self.api_token.expose_secret()
        )
    }

    /// Same URL with the token masked, for logs.
    pub fn masked_url(&self) -> String {
        format!("{}/bot.../sendMessage", self.api_origin)
    }

    pub fn same_bot(&self, other: &BotCredentials) -> bool {
        self.api_origin == other.api_origin
            && self.api_token.expose_secret() == other.api_token.expose_secret()
    }
}

impl fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCredentials")
            .field("api_origin", &self.api_origin)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// One formatted message addressed to one chat.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub bot: BotCredentials,
    pub channel_id: String,
    pub thread_id: Option<i64>,
    pub text: String,
    pub disable_web_page_preview: bool,
}

#[mockall::automock]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> SendResult<()>;
}
