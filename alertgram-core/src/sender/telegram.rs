//! Telegram Bot API sender.
//!
//! Posts to `{api_origin}/bot{token}/sendMessage` and classifies failures:
//!
//! - HTTP 429 (or `error_code: 429`) is [`SendError::RateLimited`], carrying
//!   `parameters.retry_after` when Telegram provides it.
//! - HTTP 5xx is [`SendError::Server`].
//! - Connection failures and timeouts are [`SendError::Network`] /
//!   [`SendError::Timeout`].
//! - Anything else (unknown chat, kicked bot, bad token) is
//!   [`SendError::Rejected`] and is not retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{MessageSender, OutboundMessage, SendError, SendResult};
use crate::{Error, InternalResult};

pub const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TelegramSender {
    client: Client,
    timeout: Duration,
}

impl TelegramSender {
    pub fn new(timeout: Duration) -> InternalResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("alertgram/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn classify_transport(&self, e: reqwest::Error) -> SendError {
        if e.is_timeout() {
            SendError::Timeout(self.timeout)
        } else {
            // the request URL carries the bot token
            SendError::Network(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    #[instrument(
        skip(self, message),
        fields(url = %message.bot.masked_url(), channel_id = %message.channel_id, thread_id = ?message.thread_id)
    )]
    async fn send(&self, message: &OutboundMessage) -> SendResult<()> {
        let body = SendMessageRequest {
            chat_id: &message.channel_id,
            text: &message.text,
            parse_mode: PARSE_MODE,
            message_thread_id: message.thread_id,
            disable_web_page_preview: message.disable_web_page_preview,
        };

        let response = self
            .client
            .post(message.bot.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let header_retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| self.classify_transport(e))?;
        let api: ApiResponse = serde_json::from_str(&text).unwrap_or_default();

        debug!(status = status.as_u16(), ok = api.ok, "Telegram API responded");
        classify_response(status, header_retry_after, api, text)
    }
}

fn classify_response(
    status: StatusCode,
    header_retry_after: Option<u64>,
    api: ApiResponse,
    raw_body: String,
) -> SendResult<()> {
    if status.is_success() && api.ok {
        return Ok(());
    }

    let description = api.description.unwrap_or(raw_body);
    if status == StatusCode::TOO_MANY_REQUESTS || api.error_code == Some(429) {
        let retry_after = api
            .parameters
            .and_then(|p| p.retry_after)
            .or(header_retry_after)
            .map(Duration::from_secs);
        return Err(SendError::RateLimited { retry_after });
    }
    if status.is_server_error() {
        return Err(SendError::Server {
            status: status.as_u16(),
            description,
        });
    }
    Err(SendError::Rejected {
        status: api.error_code.unwrap_or(status.as_u16()),
        description,
    })
}
