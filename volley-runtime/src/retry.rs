use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, warn};

/// Exponential backoff policy for pipeline I/O (enqueueing and persisting).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// The backoff cap is never below `initial_delay`.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: defaults.max_delay.max(initial_delay),
            ..defaults
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()));

        if self.jitter && !delay.is_zero() {
            rand::thread_rng().gen_range(delay / 2..=delay)
        } else {
            delay
        }
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted, returning the last error.
    pub async fn retry<F, Fut, T, E>(&self, name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{name} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(err) if attempt >= self.max_attempts => {
                    error!("{name} failed after {attempt} attempts: {err}");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{name} failed on attempt {attempt}/{}: {err}. Retrying in {}",
                        self.max_attempts,
                        humantime::format_duration(delay)
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
