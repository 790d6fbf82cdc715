use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const MAX_BACKOFF_SHIFT: u32 = 16;

/// Timeout and retry budget applied to every external provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; transient failures only.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
            ..Self::default()
        }
    }

    /// Exponential backoff delay before retry number `attempt + 1`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32 << attempt.min(MAX_BACKOFF_SHIFT))
    }
}

/// Run `f` under `policy`: each attempt is bounded by `policy.timeout`, transient
/// failures are retried with exponential backoff, fatal failures return at once.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, `LlmError::Timeout` if the
/// final attempt timed out, or the first non-transient error.
pub async fn with_retry<T, F, Fut>(
    provider: &'static str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => LlmError::Timeout {
                provider,
                seconds: policy.timeout.as_secs(),
            },
        };

        if !err.is_transient() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        tracing::warn!(
            provider,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "{err}, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
