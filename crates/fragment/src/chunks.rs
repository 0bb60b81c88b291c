//! Chunk scheduler
//!
//! Splits a byte budget into an ordered list of segment sizes whose sum is
//! exactly the budget.

use crate::FragmentPolicy;

/// Upper bound of a single randomized draw
const MAX_RANDOM_DRAW: usize = 1000;

/// Ordered segment sizes covering a byte budget
pub type ChunkPlan = Vec<usize>;

/// Plan `budget` bytes according to `policy`
pub fn plan_chunks(budget: usize, policy: &FragmentPolicy, rng: &mut fastrand::Rng) -> ChunkPlan {
    if policy.random_chunks {
        random_chunks(budget, policy.chunk_size, rng)
    } else {
        fixed_chunks(budget, policy.chunk_size)
    }
}

/// Equal chunks of `size` bytes, the last one holding the remainder
pub fn fixed_chunks(budget: usize, size: usize) -> ChunkPlan {
    let size = size.max(1);
    let count = budget.div_ceil(size);
    let remainder = budget % size;

    let mut chunks = vec![size; count];
    if remainder != 0 {
        if let Some(last) = chunks.last_mut() {
            *last = remainder;
        }
    }
    chunks
}

/// `count` chunks of random size, rescaled so they sum to `budget`.
///
/// The last chunk takes whatever the truncated proportional shares left
/// over, so it may be larger than the others. Scaled chunks may be zero.
pub fn random_chunks(budget: usize, count: usize, rng: &mut fastrand::Rng) -> ChunkPlan {
    let count = count.max(1);
    let mut chunks: ChunkPlan = (0..count)
        .map(|_| rng.usize(1..=MAX_RANDOM_DRAW))
        .collect();
    let sum: usize = chunks.iter().sum();

    let mut remaining = budget;
    for chunk in chunks.iter_mut().take(count - 1) {
        *chunk = *chunk * budget / sum;
        remaining -= *chunk;
    }
    chunks[count - 1] = remaining;
    chunks
}
