//! # Destination Registry
//!
//! Holds the ordered list of configured [`Destination`]s. Built once from a
//! [`RelayConfig`] at startup and read-only afterwards, so it can be shared
//! between concurrent event-processing calls behind an `Arc` without locking.
//!
//! Loading validates everything up front: filter trees are parsed into
//! [`FilterExpression`]s, `receivers` strings are split into one destination
//! per chat, and credentials are resolved. Any problem is a [`ConfigError`]
//! naming the offending entry.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::{
    validate_api_origin, ConfigError, ConfigResult, DestinationConfig, RelayConfig,
};
use crate::filter::{parse_filter, parse_legacy_filters, FilterExpression};
use crate::sender::BotCredentials;
use crate::template::TemplateOptions;

/// A configured target for notifications: one chat, optionally one thread.
#[derive(Debug, Clone)]
pub struct Destination {
    pub name: Option<String>,
    pub channel_id: String,
    /// Absent means the top-level channel.
    pub thread_id: Option<i64>,
    pub filter: FilterExpression,
    pub template_options: TemplateOptions,
    pub bot: BotCredentials,
    /// Only receives events no regular destination matched.
    pub fallback: bool,
}

impl Destination {
    pub fn new(channel_id: impl Into<String>, bot: BotCredentials) -> Self {
        Self {
            name: None,
            channel_id: channel_id.into(),
            thread_id: None,
            filter: FilterExpression::MatchAll,
            template_options: TemplateOptions::default(),
            bot,
            fallback: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_thread(mut self, thread_id: i64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<FilterExpression>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_template_options(mut self, options: TemplateOptions) -> Self {
        self.template_options = options;
        self
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    /// Human readable identifier for logs and reports.
    pub fn label(&self) -> String {
        match (&self.name, self.thread_id) {
            (Some(name), _) => name.clone(),
            (None, Some(thread)) => format!("{}/{}", self.channel_id, thread),
            (None, None) => self.channel_id.clone(),
        }
    }

    /// Whether both destinations post to the same chat thread with the same bot.
    pub fn same_target(&self, other: &Destination) -> bool {
        self.channel_id == other.channel_id
            && self.thread_id == other.thread_id
            && self.bot.same_bot(&other.bot)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    destinations: Vec<Destination>,
}

impl DestinationRegistry {
    pub fn load(config: &RelayConfig) -> ConfigResult<Self> {
        validate_api_origin(&config.api_origin)?;
        config.delivery.validate()?;

        let mut destinations = Vec::new();
        for (index, entry) in config.destinations.iter().enumerate() {
            let path = format!("destinations[{}]", index);
            let loaded = load_destination(config, entry, &path)?;
            debug!(path = %path, count = loaded.len(), "Loaded destination entry");
            destinations.extend(loaded);
        }

        info!(destinations = destinations.len(), "Destination registry loaded");
        Ok(Self { destinations })
    }

    pub fn from_destinations(destinations: Vec<Destination>) -> Self {
        Self { destinations }
    }

    /// Every destination, in configuration order.
    pub fn all(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

fn load_destination(
    config: &RelayConfig,
    entry: &DestinationConfig,
    path: &str,
) -> ConfigResult<Vec<Destination>> {
    let filter = match (&entry.filter, &entry.filters) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::invalid_destination(
                path,
                "'filter' and legacy 'filters' cannot both be set",
            ));
        }
        (Some(filter), None) => parse_filter(filter, &format!("{}.filter", path))?,
        (None, Some(filters)) => parse_legacy_filters(filters, &format!("{}.filters", path))?,
        (None, None) => FilterExpression::MatchAll,
    };

    let targets = resolve_targets(entry, path)?;
    let bot = resolve_bot(config, entry, path)?;

    let template_options = TemplateOptions {
        template: entry
            .template
            .clone()
            .unwrap_or_else(|| config.default_template.clone()),
        include_tags: entry.include_tags,
        include_environment: entry.include_environment,
        disable_web_page_preview: entry.disable_web_page_preview,
    };

    Ok(targets
        .into_iter()
        .map(|(channel_id, thread_id)| Destination {
            name: entry.name.clone(),
            channel_id,
            thread_id,
            filter: filter.clone(),
            template_options: template_options.clone(),
            bot: bot.clone(),
            fallback: entry.fallback,
        })
        .collect())
}

fn resolve_targets(entry: &DestinationConfig, path: &str) -> ConfigResult<Vec<(String, Option<i64>)>> {
    match (&entry.channel_id, &entry.receivers) {
        (Some(_), Some(_)) => Err(ConfigError::invalid_destination(
            path,
            "'channel_id' and 'receivers' cannot both be set",
        )),
        (None, None) => Err(ConfigError::invalid_destination(
            path,
            "either 'channel_id' or 'receivers' is required",
        )),
        (Some(channel_id), None) => {
            let channel_id = String::from(channel_id.clone()).trim().to_string();
            if channel_id.is_empty() {
                return Err(ConfigError::invalid_destination(path, "empty 'channel_id'"));
            }
            Ok(vec![(channel_id, entry.thread_id)])
        }
        (None, Some(receivers)) => {
            if entry.thread_id.is_some() {
                return Err(ConfigError::invalid_destination(
                    path,
                    "'thread_id' cannot be combined with 'receivers', use 'chat/thread'",
                ));
            }
            let targets = parse_receivers(receivers, path)?;
            if targets.is_empty() {
                return Err(ConfigError::invalid_destination(path, "empty 'receivers'"));
            }
            Ok(targets)
        }
    }
}

/// Splits a `"chat;chat/thread"` receivers string.
pub fn parse_receivers(receivers: &str, path: &str) -> ConfigResult<Vec<(String, Option<i64>)>> {
    receivers
        .split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|receiver| match receiver.split_once('/') {
            None => Ok((receiver.to_string(), None)),
            Some((chat, thread)) => {
                let chat = chat.trim();
                let thread = thread.trim().parse::<i64>().map_err(|_| {
                    ConfigError::invalid_destination(
                        path,
                        format!("invalid thread id in receiver '{}'", receiver),
                    )
                })?;
                if chat.is_empty() {
                    return Err(ConfigError::invalid_destination(
                        path,
                        format!("missing chat id in receiver '{}'", receiver),
                    ));
                }
                Ok((chat.to_string(), Some(thread)))
            }
        })
        .collect()
}

fn resolve_bot(
    config: &RelayConfig,
    entry: &DestinationConfig,
    path: &str,
) -> ConfigResult<BotCredentials> {
    let origin = entry.api_origin.as_deref().unwrap_or(&config.api_origin);
    validate_api_origin(origin)?;

    let token: &SecretString = entry
        .api_token
        .as_ref()
        .or(config.api_token.as_ref())
        .ok_or_else(|| ConfigError::invalid_destination(path, "no 'api_token' configured"))?;
    if token.expose_secret().trim().is_empty() {
        return Err(ConfigError::invalid_destination(path, "empty 'api_token'"));
    }

    Ok(BotCredentials::new(origin, token.expose_secret().trim()))
}
