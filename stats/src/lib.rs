//! stats
#![deny(missing_docs)]

mod kmeans;
mod pca;
pub use kmeans::{KMeans, KMeansFit};
pub use pca::{pca, standardize_columns, PcaProjection};

/// Offset keeping `log2` finite at probabilities of exactly 0 or 1.
const ENTROPY_OFFSET: f64 = 1e-20;

/// Binary entropy, in bits, of a Bernoulli variable with success probability `p`.
pub fn binary_entropy(p: f64) -> f64 {
    -p * (p + ENTROPY_OFFSET).log2() - (1.0 - p) * (1.0 - p + ENTROPY_OFFSET).log2()
}

/// Mean of the values, `None` when there are none.
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut n = 0usize;
    let mut s = 0_f64;
    for v in values {
        n += 1;
        s += v;
    }
    (n > 0).then(|| s / n as f64)
}

/// `log2(sum_i 2^x_i)` without overflowing on large magnitudes.
pub fn log2_sum_exp2(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|x| (x - max).exp2()).sum();
    max + sum.log2()
}
