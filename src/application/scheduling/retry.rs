use super::{Job, JobFuture};
use crate::config::RetryEnvConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff for whole-job retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total runs including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0, e.g. 0.1 for ±10%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl From<RetryEnvConfig> for RetryPolicy {
    fn from(config: RetryEnvConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), capped at `max_delay`
    /// before jitter is applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff_delay(
            retry,
            self.initial_delay,
            self.max_delay,
            self.multiplier,
            self.jitter,
        )
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// # Arguments
/// - `attempt`: Current attempt number (0-based)
/// - `initial`: Initial delay
/// - `max`: Maximum delay cap
/// - `multiplier`: Backoff multiplier (typically 2.0)
/// - `jitter`: Jitter factor (0.0-1.0)
pub fn calculate_backoff_delay(
    attempt: u32,
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
) -> Duration {
    let base = initial.as_secs_f64() * multiplier.powi(attempt as i32);
    let capped = base.min(max.as_secs_f64());

    let jittered = if jitter > 0.0 {
        // rand::random::<f64>() is in [0, 1)
        let spread = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
        capped * (1.0 + spread)
    } else {
        capped
    };

    Duration::from_secs_f64(jittered.max(0.0))
}

/// Re-runs the whole job body on error, up to `policy.max_attempts` runs.
pub fn with_retry(job: Job, policy: RetryPolicy) -> Job {
    Arc::new(move || -> JobFuture {
        let job = job.clone();
        Box::pin(async move {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                match (job)().await {
                    Ok(outcome) => {
                        if attempt > 1 {
                            info!("Retry: job succeeded on attempt {}", attempt);
                        }
                        return Ok(outcome);
                    }
                    Err(e) if attempt < policy.max_attempts => {
                        let delay = policy.delay_for(attempt - 1);
                        warn!(
                            "Retry: attempt {}/{} failed: {:#}. Retrying in {:?}",
                            attempt, policy.max_attempts, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        return Err(e.context(format!("gave up after {} attempts", attempt)));
                    }
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scheduling::{JobOutcome, job_fn};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_without_jitter() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy {
            jitter: 0.2,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let d = policy.delay_for(1).as_secs_f64();
            assert!((1.6..=2.4).contains(&d), "delay {} outside ±20%", d);
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let job = job_fn(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("transient failure {}", n);
                }
                Ok(JobOutcome::Completed("done".to_string()))
            }
        });

        let outcome = with_retry(job, fast_policy(3))().await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed("done".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let job = job_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<JobOutcome, _>(anyhow::anyhow!("always down"))
            }
        });

        let err = with_retry(job, fast_policy(2))().await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(format!("{:#}", err).contains("always down"));
    }
}
