//! Task-level retry with exponential backoff and jitter.
//!
//! Only transient transport failures go through this policy. Envelope-level
//! errors never self-heal and are not retried here.

use std::time::Duration;

use crate::http_client::{HttpError, HttpErrorKind};

/// Delay strategy between task attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same pause before every retry.
    Fixed {
        /// Pause before each retry.
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`, optionally with ±50% jitter.
    Exponential {
        /// Pause before the first retry.
        base: Duration,
        /// Growth per retry.
        factor: f64,
        /// Upper bound applied before jitter.
        max: Duration,
        /// Spread each pause by up to half its length either way.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));
                if jitter {
                    apply_jitter(capped)
                } else {
                    capped
                }
            }
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let spread = millis / 2;
    let offset = fastrand::u64(0..=spread.saturating_mul(2));
    Duration::from_millis((millis + offset).saturating_sub(spread))
}

/// Retry policy for a single contract fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// When false every contract gets exactly one attempt.
    pub enabled: bool,
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Pause schedule between attempts.
    pub backoff: Backoff,
    /// Non-200 statuses worth another attempt (gateway and throttling codes).
    pub retry_on_status: Vec<u16>,
    /// Retry when the transport or the per-request deadline times out.
    pub retry_on_timeout: bool,
    /// Retry when the quote server refuses or drops the connection.
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    /// Default exponential schedule with a custom retry count.
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Constant `delay` between up to `max_retries` retries.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Single attempt per contract.
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts a contract may make, first one included.
    pub const fn attempt_limit(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Whether a response with `status` is retried.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retry_on_status.contains(&status)
    }

    /// Whether a transport failure is retried, by its kind and retryable flag.
    pub fn should_retry_transport(&self, error: &HttpError) -> bool {
        if !self.enabled || !error.retryable() {
            return false;
        }
        match error.kind() {
            HttpErrorKind::Timeout => self.retry_on_timeout,
            HttpErrorKind::Connect => self.retry_on_connect,
            HttpErrorKind::Body | HttpErrorKind::Other => true,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
