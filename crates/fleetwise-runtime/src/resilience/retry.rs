//! Retry policy and backoff strategies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted between failed attempts of one call.
///
/// The delay is never charged against the per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed {
        #[serde(with = "crate::config::duration")]
        delay: Duration,
    },

    /// Delay grows by `factor` per retry, capped at `max`
    Exponential {
        #[serde(with = "crate::config::duration")]
        initial: Duration,

        #[serde(with = "crate::config::duration")]
        max: Duration,

        #[serde(default = "default_factor")]
        factor: f32,
    },
}

fn default_factor() -> f32 {
    2.0
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl BackoffStrategy {
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial,
            max,
            factor: default_factor(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Fixed { .. } => Ok(()),
            Self::Exponential { initial, max, factor } => {
                if initial > max {
                    return Err(format!(
                        "initial delay {:?} exceeds max delay {:?}",
                        initial, max
                    ));
                }
                if !factor.is_finite() || *factor < 1.0 {
                    return Err(format!("factor must be >= 1.0 (got {})", factor));
                }
                Ok(())
            }
        }
    }
}

/// How one dependency is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub attempts: u32,

    /// Hard timeout for each attempt
    #[serde(with = "crate::config::duration")]
    pub attempt_timeout: Duration,

    #[serde(default)]
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            attempt_timeout: Duration::from_secs(3),
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Retries after the first attempt.
    pub fn retries(&self) -> usize {
        self.attempts.saturating_sub(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.retries(), 1);
        assert_eq!(policy.backoff, BackoffStrategy::fixed(Duration::from_secs(1)));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy {
            attempts: 1,
            ..Default::default()
        };
        assert_eq!(policy.retries(), 0);
    }

    #[test]
    fn test_backoff_tagged_format() {
        let strategy: BackoffStrategy =
            serde_json::from_str(r#"{"type": "exponential", "initial": "200ms", "max": "5s"}"#)
                .unwrap();
        assert_eq!(
            strategy,
            BackoffStrategy::exponential(Duration::from_millis(200), Duration::from_secs(5))
        );

        let value = serde_json::to_value(BackoffStrategy::default()).unwrap();
        assert_eq!(value, serde_json::json!({"type": "fixed", "delay": "1s"}));
    }

    #[test]
    fn test_exponential_validation() {
        let inverted = BackoffStrategy::exponential(Duration::from_secs(5), Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        let shrinking = BackoffStrategy::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 0.5,
        };
        assert!(shrinking.validate().is_err());
        assert!(BackoffStrategy::default().validate().is_ok());
    }
}
