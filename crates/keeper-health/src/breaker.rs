//! Circuit-style backoff for the flaky third-party ranking API.
//!
//! After `threshold` consecutive failures the breaker opens for the
//! cooldown period; while open the probe short-circuits to `failed`
//! without touching the network, so a dead third party costs a probe
//! cycle nothing.

use chrono::{DateTime, Duration, Utc};

pub struct Breaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
}

impl Breaker {
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            threshold,
            cooldown: Duration::seconds(cooldown_secs as i64),
            consecutive_failures: 0,
            open_until: None,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.open_until.is_some_and(|until| until > now)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            self.open_until = Some(now + self.cooldown);
        }
    }
}
