//! Support for retrying requests that fail transiently.
//!
//! [`Client::request`](crate::Client::request) retries transport failures and 5xx responses.
//! The configuration is public so that it can be carried by higher-level configuration, such as
//! `cloudstore-export`'s `SessionConfig`.
use crate::error::Error;
use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoff;
use std::time::Duration;

/// Configuration for a client's automatic retrying.
#[derive(Debug, Clone)]
pub struct Retry {
    /// Number of retries after the first attempt.  Zero disables retries. (default 5)
    pub retries: u32,

    /// Upper bound on a single delay (default 30s)
    pub max_delay: Duration,

    /// Delay before the first retry; each later delay doubles. (default 100ms)
    pub delay_factor: Duration,

    /// Jitter applied to each delay, as a fraction of the delay (default 0.25)
    pub randomization_factor: f64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            retries: 5,
            max_delay: Duration::from_secs(30),
            delay_factor: Duration::from_millis(100),
            randomization_factor: 0.25,
        }
    }
}

impl Retry {
    /// A configuration that never retries.
    pub fn never() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Start tracking the delays for one request.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self)
    }
}

/// The delays between attempts of a single request.
#[derive(Debug)]
pub struct Backoff {
    remaining: u32,
    delays: ExponentialBackoff,
}

impl Backoff {
    pub fn new(retry: &Retry) -> Backoff {
        let mut delays = ExponentialBackoff {
            // bounded by `remaining`, not by time
            max_elapsed_time: None,
            max_interval: retry.max_delay,
            initial_interval: retry.delay_factor,
            multiplier: 2.0,
            #[cfg(not(test))]
            randomization_factor: retry.randomization_factor,
            #[cfg(test)]
            randomization_factor: 0.0,
            ..Default::default()
        };
        delays.reset();
        Backoff {
            remaining: retry.retries,
            delays,
        }
    }

    /// The delay before the next attempt, or None once the retries are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.delays.next_backoff()
    }
}

/// True for failures that may succeed on a later attempt: transport errors (including
/// timeouts) and 5xx responses.
pub(crate) fn is_transient(err: &Error) -> bool {
    match err {
        Error::Transport { .. } => true,
        Error::Http { status, .. } => (500..600).contains(status),
        _ => false,
    }
}
