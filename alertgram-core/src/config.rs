//! # Configuration
//!
//! The relay configuration is a JSON document consumed, never produced, by
//! this crate:
//!
//! ```json
//! {
//!   "api_origin": "https://api.telegram.org",
//!   "api_token": "123456:ABC",
//!   "default_template": "*[Sentry]* {project_name} {tag[level]}: *{title}*\n{url}",
//!   "delivery": { "timeout_ms": 10000, "max_retries": 2, "backoff_ms": 500 },
//!   "destinations": [
//!     {
//!       "name": "backend-prod",
//!       "channel_id": "-1001234567890",
//!       "thread_id": 42,
//!       "filter": {
//!         "op": "and",
//!         "children": [
//!           { "field": "level", "operator": "equals", "value": "error" },
//!           { "field": "environment", "operator": "equals", "value": "prod" }
//!         ]
//!       },
//!       "include_tags": true
//!     }
//!   ]
//! }
//! ```
//!
//! Malformed configuration fails at load time with a [`ConfigError`]; it is
//! never discovered while processing an event.

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::retry::BackoffStrategy;

pub const DEFAULT_API_ORIGIN: &str = "https://api.telegram.org";
/// Upper bound for `delivery.max_retries`.
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "*[Sentry]* {project_name} {tag[level]}: *{title}*\n```\n{message}```\n{url}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: unknown operator '{operator}'")]
    UnknownOperator { path: String, operator: String },

    #[error("{path}: {reason}")]
    UnknownField { path: String, reason: String },

    #[error("{path}: unknown legacy filter type '{filter_type}'")]
    UnknownLegacyFilter { path: String, filter_type: String },

    #[error("{path}: malformed filter node: {reason}")]
    MalformedNode { path: String, reason: String },

    #[error("{path}: filter nesting exceeds {max} levels")]
    FilterTooDeep { path: String, max: usize },

    #[error("{path}: invalid destination: {reason}")]
    InvalidDestination { path: String, reason: String },

    #[error("invalid api origin '{0}': must start with http:// or https://")]
    InvalidApiOrigin(String),

    #[error("delivery.{field}: {reason}")]
    InvalidDelivery { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::MalformedNode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_destination(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidDestination {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_api_origin")]
    pub api_origin: String,

    /// Bot token used by destinations that do not carry their own.
    #[serde(default)]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_message_template")]
    pub default_template: String,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default, alias = "channels")]
    pub destinations: Vec<DestinationConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_origin: default_api_origin(),
            api_token: None,
            default_template: default_message_template(),
            delivery: DeliveryConfig::default(),
            destinations: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        from_file(path)
    }

    pub fn from_json(s: &str) -> ConfigResult<Self> {
        from_str(s)
    }
}

/// Delivery behaviour shared by all destinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound for a single send attempt.
    #[serde(default = "default_timeout", rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Retries after the first attempt, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff", rename = "backoff_ms", with = "duration_ms")]
    pub backoff: Duration,

    #[serde(default, rename = "backoff")]
    pub backoff_strategy: BackoffStrategy,

    /// Longest wait between two attempts, including rate-limit hints.
    #[serde(
        default = "default_max_backoff",
        rename = "max_backoff_ms",
        with = "duration_ms"
    )]
    pub max_backoff: Duration,

    /// Send to matched destinations concurrently.
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

impl DeliveryConfig {
    /// Rejects settings that would make every send fail or retry without end.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidDelivery {
                field: "timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_retries > MAX_RETRIES {
            return Err(ConfigError::InvalidDelivery {
                field: "max_retries",
                reason: format!("{} exceeds the limit of {}", self.max_retries, MAX_RETRIES),
            });
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            backoff: default_backoff(),
            backoff_strategy: BackoffStrategy::default(),
            max_backoff: default_max_backoff(),
            concurrent: default_true(),
        }
    }
}

/// Channel identifier as written in configuration: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelIdConfig {
    Text(String),
    Number(i64),
}

impl From<ChannelIdConfig> for String {
    fn from(value: ChannelIdConfig) -> Self {
        match value {
            ChannelIdConfig::Text(s) => s,
            ChannelIdConfig::Number(n) => n.to_string(),
        }
    }
}

/// One destination entry, before validation.
///
/// Either `channel_id` (with optional `thread_id`) or a `receivers` string in
/// the `"chat;chat/thread"` form must be given. `filter` holds the structural
/// tree, `filters` the legacy syntax; at most one of them may be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel_id: Option<ChannelIdConfig>,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub receivers: Option<String>,
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub include_tags: bool,
    #[serde(default)]
    pub include_environment: bool,
    #[serde(default)]
    pub disable_web_page_preview: bool,
    #[serde(default)]
    pub api_token: Option<SecretString>,
    #[serde(default)]
    pub api_origin: Option<String>,
    #[serde(default)]
    pub fallback: bool,
}

pub fn validate_api_origin(origin: &str) -> ConfigResult<()> {
    if origin.starts_with("http://") || origin.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidApiOrigin(origin.to_string()))
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> ConfigResult<T> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_api_origin() -> String {
    DEFAULT_API_ORIGIN.to_string()
}
fn default_message_template() -> String {
    DEFAULT_MESSAGE_TEMPLATE.to_string()
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff() -> Duration {
    Duration::from_millis(500)
}
fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}
fn default_true() -> bool {
    true
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config.api_origin, DEFAULT_API_ORIGIN);
        assert_eq!(config.default_template, DEFAULT_MESSAGE_TEMPLATE);
        assert_eq!(config.delivery, DeliveryConfig::default());
        assert_eq!(config.delivery.max_retries, 2);
        assert_eq!(config.delivery.timeout, Duration::from_secs(10));
        assert!(config.destinations.is_empty());
    }

    #[test]
    fn test_delivery_durations_in_milliseconds() {
        let config = RelayConfig::from_json(
            &json!({
                "delivery": {"timeout_ms": 2500, "backoff_ms": 100, "backoff": "fixed", "concurrent": false}
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(config.delivery.timeout, Duration::from_millis(2500));
        assert_eq!(config.delivery.backoff, Duration::from_millis(100));
        assert_eq!(config.delivery.backoff_strategy, BackoffStrategy::Fixed);
        assert!(!config.delivery.concurrent);
    }

    #[test]
    fn test_channels_alias_and_channel_id_forms() {
        let config = RelayConfig::from_json(
            &json!({
                "api_token": "123:abc",
                "channels": [
                    {"channel_id": -100123},
                    {"channel_id": "@alerts", "thread_id": 7}
                ]
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(config.api_token.unwrap().expose_secret(), "123:abc");
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(
            String::from(config.destinations[0].channel_id.clone().unwrap()),
            "-100123"
        );
        assert_eq!(config.destinations[1].thread_id, Some(7));
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = RelayConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_delivery_validation() {
        assert!(DeliveryConfig::default().validate().is_ok());

        let config = RelayConfig::from_json(r#"{"delivery": {"timeout_ms": 0}}"#).unwrap();
        let err = config.delivery.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDelivery { field: "timeout_ms", .. }));

        let config = RelayConfig::from_json(r#"{"delivery": {"max_retries": 4000000000}}"#).unwrap();
        let err = config.delivery.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDelivery { field: "max_retries", .. }));
        assert_eq!(
            err.to_string(),
            "delivery.max_retries: 4000000000 exceeds the limit of 10"
        );

        let config = RelayConfig::from_json(r#"{"delivery": {"max_retries": 10}}"#).unwrap();
        assert!(config.delivery.validate().is_ok());
    }

    #[test]
    fn test_api_origin_validation() {
        assert!(validate_api_origin("https://api.telegram.org").is_ok());
        assert!(validate_api_origin("http://localhost:8081").is_ok());
        assert!(matches!(
            validate_api_origin("api.telegram.org"),
            Err(ConfigError::InvalidApiOrigin(_))
        ));
    }
}
