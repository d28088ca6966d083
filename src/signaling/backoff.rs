//! Reconnect delay schedule.

use crate::config::ReconnectPolicy;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with up to 25% additive jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt, without jitter.
    pub fn base_delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempts.min(16)).unwrap_or(u32::MAX);
        self.policy
            .initial_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay)
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempts = self.attempts.saturating_add(1);
        let max_jitter = (base.as_millis() / 4) as u64;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_delays_double_until_capped() {
        let mut backoff = Backoff::new(policy());
        let expected = [1, 2, 4, 8, 16, 30, 30];
        for secs in expected {
            let base = Duration::from_secs(secs);
            let delay = backoff.next_delay();
            assert!(
                delay >= base && delay <= base + base / 4,
                "delay {delay:?} outside [{base:?}, +25%]"
            );
        }
        assert_eq!(backoff.attempts(), expected.len() as u32);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(policy());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = Backoff::new(policy());
        for _ in 0..100 {
            backoff.next_delay();
        }
        assert_eq!(backoff.base_delay(), Duration::from_secs(30));
    }
}
