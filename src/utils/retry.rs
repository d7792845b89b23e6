use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Whether to enable exponential backoff (delay * 2)
    pub exponential_backoff: bool,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            base_delay: Duration::from_secs(2),
            exponential_backoff: true,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// `retries` extra attempts after the first one.
    pub fn with_retries(retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: Some(retries.saturating_add(1)),
            base_delay,
            ..Self::default()
        }
    }
}

/// Generic asynchronous retry function
///
/// Runs `operation` until it succeeds or `config.max_attempts` is used up,
/// returning the last error in that case. `label` names the operation in logs.
pub async fn retry_async<F, Fut, T, E>(label: &str, mut operation: F, config: RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.base_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!("✅ {label} succeeded after {attempt} attempts");
                }
                return Ok(result);
            }
            Err(e) => {
                if let Some(max) = config.max_attempts
                    && attempt >= max
                {
                    error!("🚫 {label} failed after {attempt} attempts: {e}");
                    return Err(e);
                }

                warn!("❌ {label} attempt {attempt} failed: {e}, retrying in {delay:?}");
                sleep(delay).await;

                if config.exponential_backoff {
                    delay = std::cmp::min(delay * 2, config.max_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use tokio::time::Instant;

    fn fast(max_attempts: u32, exponential_backoff: bool) -> RetryConfig {
        RetryConfig {
            max_attempts: Some(max_attempts),
            base_delay: Duration::from_millis(10),
            exponential_backoff,
            max_delay: Duration::from_millis(25),
        }
    }

    #[tokio::test]
    async fn first_success_is_returned() {
        let result = retry_async("noop", || async { Ok::<_, String>(7) }, fast(3, true)).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_async(
            "flaky",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("attempt {n} failed"))
                    } else {
                        Ok("published")
                    }
                }
            },
            fast(5, false),
        )
        .await;

        assert_eq!(result, Ok("published"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_async(
            "broken",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(format!("attempt {n} failed")) }
            },
            fast(3, false),
        )
        .await;

        assert_eq!(result, Err("attempt 3 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backoff_is_capped() {
        let start = Instant::now();
        let result = retry_async(
            "capped",
            || async { Err::<(), _>("down") },
            fast(4, true),
        )
        .await;

        // 10ms + 20ms + 25ms (capped instead of 40ms)
        let elapsed = start.elapsed();
        assert!(result.is_err());
        assert!(elapsed >= Duration::from_millis(55), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(200), "elapsed: {elapsed:?}");
    }

    #[test]
    fn with_retries_counts_the_first_attempt() {
        let config = RetryConfig::with_retries(3, Duration::from_millis(500));
        assert_eq!(config.max_attempts, Some(4));
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert!(config.exponential_backoff);

        assert_eq!(RetryConfig::with_retries(0, Duration::ZERO).max_attempts, Some(1));
    }
}
