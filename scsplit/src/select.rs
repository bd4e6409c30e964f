//! Picking the best of several independent runs.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::cmp::Ordering;

/// Index of a run across all chunks.
pub type RunIdx = usize;

/// A slice of the restarts executed sequentially on one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunChunk {
    /// Seed of the chunk's generator.
    pub seed: u64,
    /// Runs in this chunk.
    pub runs: std::ops::Range<RunIdx>,
    /// Position of the chunk.
    pub chunk_idx: usize,
}

/// Split `restarts` runs into at most `chunk_count` chunks, each with its own seed
/// drawn from a generator seeded with `seed`.
pub fn chunk_runs(chunk_count: usize, restarts: usize, seed: u64) -> Vec<RunChunk> {
    let chunk_count = chunk_count.max(1);
    let runs_per_chunk = restarts.div_ceil(chunk_count).max(1);
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    (0..chunk_count)
        .map(|chunk_idx| {
            let start = (chunk_idx * runs_per_chunk).min(restarts);
            let end = ((chunk_idx + 1) * runs_per_chunk).min(restarts);
            RunChunk {
                seed: rng.gen::<u64>(),
                runs: start..end,
                chunk_idx,
            }
        })
        .filter(|chunk| !chunk.runs.is_empty())
        .collect()
}

/// Whether a run with `candidate` log-likelihood replaces the `incumbent`.
///
/// Only a strictly higher log-likelihood wins; a tie keeps the lower run index.
pub fn is_better(candidate: (f64, RunIdx), incumbent: (f64, RunIdx)) -> bool {
    match candidate.0.partial_cmp(&incumbent.0) {
        Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => candidate.1 < incumbent.1,
        // NaN never wins
        _ => incumbent.0.is_nan() && !candidate.0.is_nan(),
    }
}

/// Keep the best of `items`, ranked by the `(log_likelihood, run_idx)` that `key` yields.
pub fn keep_best<T>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> (f64, RunIdx),
) -> Option<T> {
    let mut best: Option<T> = None;
    for item in items {
        if best.as_ref().map_or(true, |b| is_better(key(&item), key(b))) {
            best = Some(item);
        }
    }
    best
}

/// Position of the best `(log_likelihood, run_idx)` pair, `None` when empty.
pub fn select_best(results: &[(f64, RunIdx)]) -> Option<usize> {
    keep_best(results.iter().enumerate(), |&(_, &result)| result).map(|(pos, _)| pos)
}
