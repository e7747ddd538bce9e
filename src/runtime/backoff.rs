//! Retry pacing for a failed head mutation.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    mutation::Mutation,
    types::{EpochMillis, RetryCount},
};

/// Minimum wait between a failed attempt and the next one.
///
/// The queue never sleeps on this; a `process()` call that arrives inside the
/// window is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry as soon as triggered.
    #[default]
    None,
    /// Constant delay after every failure.
    Fixed {
        /// Delay after each failure.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `base * 2^(retries - 1)`, capped at `max`.
    Exponential {
        /// Delay after the first failure.
        #[serde(with = "humantime_serde")]
        base: Duration,
        /// Upper bound.
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl Backoff {
    /// Delay owed after `retry_count` failures.
    pub fn delay_for(&self, retry_count: RetryCount) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay } => delay,
            Self::Exponential { base, max } => {
                let shift = (retry_count - 1).min(31);
                base.checked_mul(1u32 << shift).unwrap_or(max).min(max)
            }
        }
    }

    /// Earliest time `mutation` may be attempted again, if it is waiting.
    pub fn ready_at(&self, mutation: &Mutation) -> Option<EpochMillis> {
        let last = mutation.last_attempt_at?;
        let delay = self.delay_for(mutation.retry_count);
        if delay.is_zero() {
            return None;
        }
        Some(last.saturating_add(delay.as_millis() as u64))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Exponential { base, max } if base > max => {
                Err("backoff base must not exceed max".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn exponential_doubles_and_caps() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        assert_eq!(b.delay_for(0), Duration::ZERO);
        assert_eq!(b.delay_for(1), Duration::from_millis(100));
        assert_eq!(b.delay_for(2), Duration::from_millis(200));
        assert_eq!(b.delay_for(4), Duration::from_millis(800));
        assert_eq!(b.delay_for(5), Duration::from_millis(1000));
        assert_eq!(b.delay_for(200), Duration::from_millis(1000));
    }

    #[test]
    fn ready_at_only_for_failed_mutations() {
        let b = Backoff::Fixed {
            delay: Duration::from_secs(2),
        };
        let mut m = Mutation::new("x", json!(null), 0);
        assert_eq!(b.ready_at(&m), None);

        m.retry_count = 1;
        m.last_attempt_at = Some(10_000);
        assert_eq!(b.ready_at(&m), Some(12_000));
        assert_eq!(Backoff::None.ready_at(&m), None);
    }

    #[test]
    fn base_above_max_is_invalid() {
        let b = Backoff::Exponential {
            base: Duration::from_secs(5),
            max: Duration::from_secs(1),
        };
        assert!(b.validate().is_err());
    }
}
