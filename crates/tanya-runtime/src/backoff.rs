//! Reconnect backoff for a dropped Host link

use std::time::Duration;

use tanya_core::ReconnectConfig;

/// Exponential backoff capped at eight times the base delay
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempt: 0,
            base: config.base_delay(),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before the next attempt
    pub fn next(&mut self) -> Duration {
        self.attempt += 1;
        self.base * 2u32.pow((self.attempt - 1).min(3))
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_then_cap() {
        let mut backoff = Backoff::new(&ReconnectConfig {
            max_attempts: 6,
            base_delay_ms: 1_000,
        });

        let delays: Vec<u64> = (0..6).map(|_| backoff.next().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
        assert!(backoff.is_exhausted());

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(!backoff.is_exhausted());
    }

    #[test]
    fn test_disabled_policy_is_exhausted_immediately() {
        let backoff = Backoff::new(&ReconnectConfig::default());
        assert!(backoff.is_exhausted());
    }

    proptest::proptest! {
        #[test]
        fn delays_never_shrink_and_stay_capped(base_ms in 1u64..5_000, attempts in 1u32..20) {
            let mut backoff = Backoff::new(&ReconnectConfig {
                max_attempts: attempts,
                base_delay_ms: base_ms,
            });
            let mut previous = Duration::ZERO;
            while !backoff.is_exhausted() {
                let delay = backoff.next();
                proptest::prop_assert!(delay >= previous);
                proptest::prop_assert!(delay <= Duration::from_millis(base_ms * 8));
                previous = delay;
            }
            proptest::prop_assert_eq!(backoff.attempt(), attempts);
        }
    }
}
