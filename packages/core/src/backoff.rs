//! Exponential retry delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maps a retry attempt number to a redelivery delay: `base * 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_secs(base_secs: u64, max_secs: u64) -> Self {
        Self::new(Duration::from_secs(base_secs), Duration::from_secs(max_secs))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before redelivering after `attempt` attempts have been made.
    ///
    /// `attempt` is the attempt count after increment and is at least 1;
    /// a zero is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_secs(60, 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_until_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(120));
        assert_eq!(policy.delay(2), Duration::from_secs(240));
        assert_eq!(policy.delay(5), Duration::from_secs(1920));
        assert_eq!(policy.delay(6), Duration::from_secs(3600));
        assert_eq!(policy.delay(40), Duration::from_secs(3600));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn zero_attempt_is_clamped() {
        let policy = BackoffPolicy::from_secs(1, 100);
        assert_eq!(policy.delay(0), policy.delay(1));
    }

    proptest! {
        #[test]
        fn monotone_and_capped(a1 in 1u32..200, step in 1u32..200, base in 1u64..600, cap in 1u64..100_000) {
            let policy = BackoffPolicy::from_secs(base, cap);
            let a2 = a1 + step;
            prop_assert!(policy.delay(a2) >= policy.delay(a1));
            prop_assert!(policy.delay(a1) <= policy.max());
            prop_assert!(policy.delay(a2) <= policy.max());
        }
    }
}
