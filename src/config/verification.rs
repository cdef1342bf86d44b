// ABOUTME: Bounded retry policy for health verification.
// ABOUTME: Exponential backoff between attempts, capped at a maximum delay.

use serde::Deserialize;
use std::time::Duration;

/// Retry policy shared by bootstrap phase verification and rollback restarts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay after the first failed attempt; doubled after each further failure.
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Bound on a single health probe.
    #[serde(default = "default_attempt_timeout", with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

fn default_attempts() -> u32 {
    5
}

fn default_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: default_backoff(),
            max_backoff: default_max_backoff(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting, for tests and dry runs.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout: Duration::from_secs(1),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Upper bound on one verification cycle: attempts x (attempt timeout + backoff).
    pub fn cycle_timeout(&self) -> Duration {
        (1..=self.attempts)
            .map(|attempt| self.attempt_timeout + self.delay_after(attempt))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            attempts: 6,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(2),
        };

        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
        assert_eq!(policy.delay_after(10), Duration::from_secs(5));
    }

    #[test]
    fn cycle_timeout_sums_attempts_and_backoff() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(5),
        };

        // (5+1) + (5+2) + (5+4)
        assert_eq!(policy.cycle_timeout(), Duration::from_secs(22));
    }

    #[test]
    fn parses_humantime_durations() {
        let policy: RetryPolicy =
            serde_yaml::from_str("attempts: 2\nbackoff: 500ms\nmax_backoff: 10s\n").unwrap();
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
    }
}
