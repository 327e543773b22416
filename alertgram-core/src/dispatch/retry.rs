//! Retry decisions for failed send attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DeliveryConfig;
use crate::sender::SendError;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay grows by the base amount each retry.
    #[default]
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Duration,
    pub strategy: BackoffStrategy,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff,
            strategy: config.backoff_strategy,
            max_backoff: config.max_backoff,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Decides what to do after attempt number `attempt` (1-based) failed
    /// with `error`.
    ///
    /// A rate-limit hint is honoured as-is when it fits within `max_backoff`;
    /// a longer hint means giving up rather than stalling the dispatch.
    pub fn decide(&self, attempt: u32, error: &SendError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {}", error),
            };
        }
        if attempt > self.max_retries {
            return RetryDecision::GiveUp {
                reason: format!("maximum retries ({}) exceeded", self.max_retries),
            };
        }

        if let Some(hint) = error.retry_after() {
            if hint > self.max_backoff {
                return RetryDecision::GiveUp {
                    reason: format!(
                        "rate limit hint {}s exceeds max backoff {}ms",
                        hint.as_secs(),
                        self.max_backoff.as_millis()
                    ),
                };
            }
            return RetryDecision::Retry { delay: hint };
        }

        RetryDecision::Retry {
            delay: self.backoff_delay(attempt),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.backoff,
            BackoffStrategy::Linear => self.backoff.saturating_mul(attempt.max(1)),
        };
        delay.min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(100),
            strategy,
            max_backoff: Duration::from_millis(250),
        }
    }

    fn transient() -> SendError {
        SendError::Network("connection reset".into())
    }

    #[test]
    fn test_linear_backoff_is_capped() {
        let policy = policy(BackoffStrategy::Linear);
        let delays: Vec<_> = (1..=3)
            .map(|attempt| policy.decide(attempt, &transient()))
            .collect();
        assert_eq!(
            delays,
            vec![
                RetryDecision::Retry { delay: Duration::from_millis(100) },
                RetryDecision::Retry { delay: Duration::from_millis(200) },
                RetryDecision::Retry { delay: Duration::from_millis(250) },
            ]
        );
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = policy(BackoffStrategy::Fixed);
        assert_eq!(
            policy.decide(3, &transient()),
            RetryDecision::Retry { delay: Duration::from_millis(100) }
        );
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let policy = policy(BackoffStrategy::Fixed);
        assert!(matches!(
            policy.decide(4, &transient()),
            RetryDecision::GiveUp { .. }
        ));
        assert!(matches!(
            RetryPolicy::no_retry().decide(1, &transient()),
            RetryDecision::GiveUp { .. }
        ));
    }

    #[test]
    fn test_permanent_errors_never_retried() {
        let err = SendError::Rejected {
            status: 403,
            description: "Forbidden: bot was kicked".into(),
        };
        match policy(BackoffStrategy::Linear).decide(1, &err) {
            RetryDecision::GiveUp { reason } => assert!(reason.contains("non-retryable")),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_hint() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_secs(5),
            ..policy(BackoffStrategy::Linear)
        };
        let short = SendError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            policy.decide(1, &short),
            RetryDecision::Retry { delay: Duration::from_secs(2) }
        );

        let long = SendError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert!(matches!(policy.decide(1, &long), RetryDecision::GiveUp { .. }));

        let no_hint = SendError::RateLimited { retry_after: None };
        assert_eq!(
            policy.decide(1, &no_hint),
            RetryDecision::Retry { delay: Duration::from_millis(100) }
        );
    }

    #[test]
    fn test_policy_from_delivery_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert_eq!(policy.strategy, BackoffStrategy::Linear);
    }
}
