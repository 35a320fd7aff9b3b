use std::time::Duration;
use tokio::time::Instant;

use crate::config::Tuning;

/// Reconnect pacing for a collector link.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    pub name: String,
    pub attempts: u32,
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
    pub current_cooldown: Duration,
    pub next_retry_time: Instant,
    logged_attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(name: &str, base_cooldown: Duration, max_cooldown: Duration, logged_attempts: u32) -> Self {
        ReconnectBackoff {
            name: name.to_string(),
            attempts: 0,
            base_cooldown,
            max_cooldown,
            current_cooldown: base_cooldown,
            next_retry_time: Instant::now(),
            logged_attempts,
        }
    }

    pub fn from_tuning(name: &str, tuning: &Tuning) -> Self {
        Self::new(
            name,
            tuning.connect_base_backoff,
            tuning.connect_max_backoff,
            tuning.connect_logged_attempts,
        )
    }

    pub fn can_retry(&self) -> bool {
        Instant::now() >= self.next_retry_time
    }

    /// Failures past the first few are only logged at debug.
    pub fn should_log(&self) -> bool {
        self.attempts <= self.logged_attempts
    }

    /// Record a failed attempt and return how long to wait before the next.
    ///
    /// The first wait is the base cooldown; each later one is 1.5x the
    /// previous, capped.
    pub fn record_failure(&mut self) -> Duration {
        if self.attempts > 0 {
            self.current_cooldown = Duration::from_secs_f64(
                (self.current_cooldown.as_secs_f64() * 1.5).min(self.max_cooldown.as_secs_f64()),
            );
        }
        self.attempts += 1;
        self.next_retry_time = Instant::now() + self.current_cooldown;

        if self.should_log() {
            log::warn!(
                "{} connect attempt {} failed, next retry in {:.1}s",
                self.name,
                self.attempts,
                self.current_cooldown.as_secs_f64()
            );
        } else {
            log::debug!(
                "{} connect attempt {} failed, next retry in {:.1}s",
                self.name,
                self.attempts,
                self.current_cooldown.as_secs_f64()
            );
        }
        self.current_cooldown
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!("{} connected after {} attempt(s)", self.name, self.attempts + 1);
        }
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
        self.next_retry_time = Instant::now();
    }
}
