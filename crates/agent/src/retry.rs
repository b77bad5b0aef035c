use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use hearth_core::config::RetryConfig;
use hearth_core::errors::EngineError;

/// Backoff policy consumed by the retry wrapper. Built once from
/// configuration and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub jitter_factor: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// Deterministic base delay before jitter: `initial * 2^attempt`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        let jitter = base.mul_f64(self.jitter_factor * rand::thread_rng().gen::<f64>());
        base + jitter
    }
}

/// Run `operation` with retry on retryable errors only. Exhausting the
/// budget re raises the last error; non retryable kinds propagate on the
/// first attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_label: &str,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.jittered_delay(attempt);
                warn!(
                    operation = operation_label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if error.is_retryable() {
                    warn!(
                        operation = operation_label,
                        attempts = attempt + 1,
                        error = %error,
                        "retry budget exhausted"
                    );
                }
                return Err(error);
            }
        }
    }
}

/// Bound an external call with a deadline. A timeout is indistinguishable
/// from a network failure for retry and fallback purposes.
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    service: &str,
    future: Fut,
) -> Result<T, EngineError>
where
    Fut: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::TransientNetwork(format!(
            "{service} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
