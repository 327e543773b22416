use thiserror::Error;

use crate::config::ConfigError;
use crate::filter::PredicateError;
use crate::sender::SendError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Predicate error: {0}")]
    Predicate(#[from] PredicateError),
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
