//! Delay jitter for fragment timing

use std::time::Duration;

use crate::FragmentPolicy;

/// Jitter configuration derived from a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayJitter {
    /// Apply jitter at all
    pub enabled: bool,

    /// Maximum deviation in either direction
    pub range: Duration,
}

impl DelayJitter {
    pub fn from_policy(policy: &FragmentPolicy) -> Self {
        Self {
            enabled: policy.random_delays,
            range: policy.delay_randomness,
        }
    }

    /// Return `delay` shifted by a uniform offset in `[-range, range)`, floored at zero
    pub fn apply(&self, delay: Duration, rng: &mut fastrand::Rng) -> Duration {
        if !self.enabled || self.range.is_zero() {
            return delay;
        }

        let range = self.range.as_nanos().min(u64::MAX as u128 / 2) as u64;
        let offset = rng.u64(0..range * 2);
        (delay + Duration::from_nanos(offset)).saturating_sub(Duration::from_nanos(range))
    }
}
