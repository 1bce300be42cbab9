//! Bounded retry of units of work that hit transient storage conflicts.

use inventory_core::config::RetryConfig;
use inventory_core::error::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            multiplier: 1.5,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff delay for given attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the attempt bound is reached.
    ///
    /// Each call of `attempt` must open its own transaction.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged, or
    /// [`InventoryError::RetriesExhausted`] carrying the last conflict.
    pub async fn run<T, F>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt(attempts) {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    let delay = self.calculate_delay(attempts);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempts, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!("{} gave up after {} attempts: {}", operation, attempts, e);
                    return Err(InventoryError::RetriesExhausted {
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = fast();
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(2));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(4));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(4));
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_conflict_then_success() {
        let mut calls = 0;
        let result = fast()
            .run("put", |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(InventoryError::conflict("busy"))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let err = fast()
            .run("put", |_| -> Result<()> { Err(InventoryError::conflict("busy")) })
            .await
            .unwrap_err();
        match err {
            InventoryError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("busy"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_immediately() {
        let mut calls = 0;
        let err = fast()
            .run("delete", |_| -> Result<()> {
                calls += 1;
                Err(InventoryError::VersionMissing { uri: "/x".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::VersionMissing { .. }));
        assert_eq!(calls, 1);
    }
}
