use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use alertgram_core::{ConfigError, Event, RelayConfig};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid event: {0}")]
    Event(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Core(#[from] alertgram_core::Error),

    #[error("{failed} of {total} deliveries failed")]
    DeliveryFailed { failed: usize, total: usize },
}

pub type CliResult<T> = Result<T, CliError>;

/// Loads the relay configuration. A token given on the command line (or via
/// `ALERTGRAM_API_TOKEN`) replaces the configured global token.
pub fn load_config(path: &Path, api_token: Option<&str>) -> CliResult<RelayConfig> {
    debug!(path = %path.display(), "Loading configuration");
    let mut config = RelayConfig::from_file(path)?;
    if let Some(token) = api_token.filter(|t| !t.trim().is_empty()) {
        config.api_token = Some(SecretString::from(token.trim().to_string()));
    }
    Ok(config)
}

/// Reads an event from a JSON file, or from stdin when `path` is `-`.
pub fn load_event(path: &Path) -> CliResult<Event> {
    let contents = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Shows only the last 4 characters of a secret.
pub fn partial_show_secret(s: &SecretString) -> String {
    let chars: Vec<char> = s.expose_secret().chars().collect();
    if chars.len() <= 4 {
        "********".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}
