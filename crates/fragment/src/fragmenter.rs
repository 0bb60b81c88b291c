//! Fragmentation state machine shared by the blocking and async writers
//!
//! The machine starts in [`Phase::Fragmenting`] and moves to
//! [`Phase::Passthrough`] once the minimum-bytes threshold is reached or the
//! chunk plan runs out. It never moves back.

use std::time::Duration;
use tracing::trace;

use crate::{ChunkPlan, DelayJitter, FragmentPolicy, plan_chunks};

#[derive(Debug)]
enum Phase {
    /// Still splitting the stream prefix; the plan is computed on the first write
    Fragmenting {
        plan: Option<ChunkPlan>,
        index: usize,
    },
    /// Everything is forwarded unchanged
    Passthrough,
}

/// What to do with the remaining input of a write call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Issue one underlying write of at most this many bytes
    Chunk(usize),
    /// Forward all remaining input in one underlying write
    Passthrough,
}

/// Writer state: plan, chunk cursor, byte counter and timing
#[derive(Debug)]
pub struct Fragmenter {
    policy: FragmentPolicy,
    jitter: DelayJitter,
    rng: fastrand::Rng,
    phase: Phase,
    total_written: u64,
    started: bool,
}

impl Fragmenter {
    pub fn new(policy: FragmentPolicy) -> Self {
        Self::with_rng(policy, fastrand::Rng::new())
    }

    /// Use a caller-supplied generator (seeded in tests)
    pub fn with_rng(policy: FragmentPolicy, rng: fastrand::Rng) -> Self {
        let phase = if policy.minimum_bytes == 0 {
            Phase::Passthrough
        } else {
            Phase::Fragmenting {
                plan: None,
                index: 0,
            }
        };

        Self {
            jitter: DelayJitter::from_policy(&policy),
            policy,
            rng,
            phase,
            total_written: 0,
            started: false,
        }
    }

    /// A machine that never fragments and never sleeps
    pub fn passthrough() -> Self {
        Self {
            policy: FragmentPolicy::default(),
            jitter: DelayJitter::default(),
            rng: fastrand::Rng::new(),
            phase: Phase::Passthrough,
            total_written: 0,
            started: true,
        }
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.phase, Phase::Passthrough)
    }

    /// Delay to observe before the first non-empty write, if any
    pub fn start(&mut self, input_len: usize) -> Option<Duration> {
        if self.started || input_len == 0 {
            return None;
        }
        self.started = true;

        if self.policy.delay_before_start.is_zero() {
            return None;
        }
        Some(self.jitter.apply(self.policy.delay_before_start, &mut self.rng))
    }

    /// Decide how to write the next part of `remaining` (> 0) input bytes
    pub fn next_step(&mut self, remaining: usize) -> Step {
        loop {
            let Phase::Fragmenting { plan, index } = &mut self.phase else {
                return Step::Passthrough;
            };

            let plan = plan.get_or_insert_with(|| {
                let budget = self.policy.minimum_bytes.min(remaining);
                let plan = plan_chunks(budget, &self.policy, &mut self.rng);
                trace!("Fragmenting first {} bytes as {:?}", budget, plan);
                plan
            });

            match plan.get(*index) {
                Some(0) => *index += 1,
                Some(&left) => return Step::Chunk(left.min(remaining)),
                None => self.finish(),
            }
        }
    }

    /// Account for `written` bytes accepted by the sink.
    ///
    /// Returns the delay to observe before the next chunk when one is due.
    pub fn advance(&mut self, written: usize) -> Option<Duration> {
        self.total_written += written as u64;

        let exhausted = match &mut self.phase {
            Phase::Fragmenting {
                plan: Some(plan),
                index,
            } => {
                let chunk = plan.get_mut(*index)?;
                *chunk = chunk.saturating_sub(written);
                if *chunk > 0 {
                    return None;
                }
                *index += 1;
                *index >= plan.len()
            }
            _ => return None,
        };

        if exhausted || self.total_written >= self.policy.minimum_bytes as u64 {
            self.finish();
            return None;
        }

        if self.policy.delay_between_chunks.is_zero() {
            return None;
        }
        Some(self.jitter.apply(self.policy.delay_between_chunks, &mut self.rng))
    }

    fn finish(&mut self) {
        trace!(
            "Fragmentation done after {} bytes, switching to passthrough",
            self.total_written
        );
        self.phase = Phase::Passthrough;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(minimum_bytes: usize, chunk_size: usize) -> FragmentPolicy {
        FragmentPolicy {
            minimum_bytes,
            chunk_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_steps_follow_plan() {
        let mut f = Fragmenter::new(policy(10, 4));

        assert_eq!(f.next_step(100), Step::Chunk(4));
        assert!(f.advance(4).is_some());
        assert_eq!(f.next_step(96), Step::Chunk(4));
        assert!(f.advance(4).is_some());
        assert_eq!(f.next_step(92), Step::Chunk(2));
        // Last chunk: no delay, threshold reached
        assert_eq!(f.advance(2), None);
        assert!(f.is_passthrough());
        assert_eq!(f.next_step(90), Step::Passthrough);
        assert_eq!(f.total_written(), 10);
    }

    #[test]
    fn test_partial_sink_write_keeps_chunk() {
        let mut f = Fragmenter::new(policy(10, 4));

        assert_eq!(f.next_step(10), Step::Chunk(4));
        assert_eq!(f.advance(1), None);
        assert_eq!(f.next_step(9), Step::Chunk(3));
        assert!(f.advance(3).is_some());
    }

    #[test]
    fn test_short_first_write_plans_short() {
        let mut f = Fragmenter::new(policy(67, 2));

        assert_eq!(f.next_step(3), Step::Chunk(2));
        assert!(f.advance(2).is_some());
        assert_eq!(f.next_step(1), Step::Chunk(1));
        assert_eq!(f.advance(1), None);
        // Plan exhausted below the threshold
        assert!(f.is_passthrough());
    }

    #[test]
    fn test_zero_threshold_is_passthrough() {
        let mut f = Fragmenter::new(policy(0, 2));
        assert!(f.is_passthrough());
        assert_eq!(f.next_step(5), Step::Passthrough);
    }

    #[test]
    fn test_start_delay_once() {
        let mut f = Fragmenter::new(policy(10, 2));

        assert_eq!(f.start(0), None);
        assert_eq!(f.start(5), Some(Duration::from_millis(100)));
        assert_eq!(f.start(5), None);

        let mut f = Fragmenter::passthrough();
        assert_eq!(f.start(5), None);
    }

    #[test]
    fn test_zero_chunks_skipped() {
        let mut f = Fragmenter::new(policy(10, 4));
        f.phase = Phase::Fragmenting {
            plan: Some(vec![0, 3, 0, 0, 7]),
            index: 0,
        };

        assert_eq!(f.next_step(10), Step::Chunk(3));
        assert!(f.advance(3).is_some());
        assert_eq!(f.next_step(7), Step::Chunk(7));
        assert_eq!(f.advance(7), None);
        assert!(f.is_passthrough());
    }
}
