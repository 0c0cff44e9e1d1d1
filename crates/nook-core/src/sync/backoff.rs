//! Retry scheduling for failed pushes

use std::time::Duration;

/// Capped exponential backoff: failure `n` waits `min(base * 2^(n-1), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub const DEFAULT_BASE: Duration = Duration::from_secs(2);
    pub const DEFAULT_CAP: Duration = Duration::from_secs(5 * 60);

    /// `cap` is raised to `base` when smaller
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    pub const fn base(&self) -> Duration {
        self.base
    }

    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the next attempt after `failures` consecutive failures
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay in whole milliseconds, for timestamp arithmetic
    pub fn delay_millis(&self, failures: u32) -> i64 {
        i64::try_from(self.delay(failures).as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}
