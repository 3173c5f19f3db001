use std::thread;
use std::time::Duration;

use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Deserialize;

/// Exponential backoff with jitter.
/// Based on https://www.awsarchitectureblog.com/2015/03/backoff.html.
pub(crate) struct RetryBackoff {
    attempt: u32,
    base_ms: u64,
    cap_ms: u64,
}

impl RetryBackoff {
    pub(crate) fn new(cap: Duration) -> Self {
        Self {
            attempt: 0,
            base_ms: 100,
            cap_ms: cap.as_millis() as u64,
        }
    }

    fn max_wait_ms(&self) -> u64 {
        let shift = self.attempt.min(63);
        self.cap_ms.min(self.base_ms.saturating_mul(1u64 << shift))
    }

    pub(crate) fn wait(&mut self) {
        let max_wait = self.max_wait_ms();
        let wait_ms = if max_wait > 0 {
            OsRng.try_next_u64().unwrap_or(0) % max_wait
        } else {
            0
        };
        thread::sleep(Duration::from_millis(wait_ms));
        self.attempt = self.attempt.saturating_add(1);
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "delay-ms", with = "millis")]
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn sleep(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
