//! Expectation-maximization over per-state allele frequencies.

use crate::counts::AlleleCounts;
use crate::ProbMatrix;
use log::{debug, warn};
use ndarray::{Array2, Axis};
use sprs::CsMat;

/// Stopping rule of the EM loop.
#[derive(Debug, Clone, Copy)]
pub struct EmParams {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Converged once the last two trace values differ by at most
    /// `tolerance * max(1, |previous|)`.
    pub tolerance: f64,
}

/// Final state of one EM run.
#[derive(Debug, Clone)]
pub struct EmResult {
    /// Allele frequency per SNV and state after the last M-step.
    pub theta: ProbMatrix,
    /// Posterior per barcode and state from the last E-step.
    pub posterior: ProbMatrix,
    /// Approximate total log2-likelihood after every iteration.
    pub trace: Vec<f64>,
    /// False when the iteration cap stopped the loop.
    pub converged: bool,
}

impl EmResult {
    /// Last value of the convergence trace.
    pub fn log_likelihood(&self) -> f64 {
        self.trace.last().copied().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Log2-likelihood of every barcode's counts under every state:
/// `ll[c, s] = sum_v alt[v, c] log2(theta[v, s]) + ref[v, c] log2(1 - theta[v, s])`.
pub fn log_likelihoods(counts: &AlleleCounts, theta: &ProbMatrix) -> Array2<f64> {
    let log_alt = theta.mapv(f64::log2);
    let log_ref = theta.mapv(|t| (1.0 - t).log2());
    let mut ll = Array2::zeros((counts.num_barcodes(), theta.ncols()));
    accumulate_log_likelihood(&mut ll, counts.alt_mtx(), &log_alt);
    accumulate_log_likelihood(&mut ll, counts.ref_mtx(), &log_ref);
    ll
}

fn accumulate_log_likelihood(ll: &mut Array2<f64>, mtx: &CsMat<u32>, log_p: &Array2<f64>) {
    for (v, row) in mtx.outer_iterator().enumerate() {
        let log_p_v = log_p.row(v);
        for (c, &n) in row.iter() {
            ll.row_mut(c).scaled_add(f64::from(n), &log_p_v);
        }
    }
}

/// Posterior state probabilities from log2-likelihoods, with a uniform prior.
///
/// Uses `p[c, i] = 1 / sum_j 2^(ll[c, j] - ll[c, i])`, which only ever
/// exponentiates differences and so cannot overflow to NaN.
pub fn posteriors(ll: &Array2<f64>) -> ProbMatrix {
    let mut posterior = Array2::zeros(ll.dim());
    for (ll_c, mut p_c) in ll.axis_iter(Axis(0)).zip(posterior.axis_iter_mut(Axis(0))) {
        for (i, p) in p_c.iter_mut().enumerate() {
            let denom: f64 = ll_c.iter().map(|&ll_j| (ll_j - ll_c[i]).exp2()).sum();
            *p = 1.0 / denom;
        }
    }
    posterior
}

/// Posterior-weighted allele frequencies, shrunk towards the background prior:
/// `theta[v, s] = (alt[v, :] . p[:, s] + k_alt[v]) / ((alt + ref)[v, :] . p[:, s] + k_ref[v] + k_alt[v])`.
pub fn update_allele_frequencies(counts: &AlleleCounts, posterior: &ProbMatrix) -> ProbMatrix {
    let prior = counts.background_prior();
    let shape = (counts.num_snvs(), posterior.ncols());
    let mut alt_weighted = Array2::zeros(shape);
    let mut total_weighted = Array2::zeros(shape);
    weighted_row_sums(&mut alt_weighted, counts.alt_mtx(), posterior);
    weighted_row_sums(&mut total_weighted, counts.alt_mtx(), posterior);
    weighted_row_sums(&mut total_weighted, counts.ref_mtx(), posterior);

    let mut theta = Array2::zeros(shape);
    for ((v, s), t) in theta.indexed_iter_mut() {
        let (k_alt, k_ref) = (prior.k_alt[v], prior.k_ref[v]);
        *t = (alt_weighted[[v, s]] + k_alt) / (total_weighted[[v, s]] + k_ref + k_alt);
    }
    theta
}

fn weighted_row_sums(acc: &mut Array2<f64>, mtx: &CsMat<u32>, posterior: &ProbMatrix) {
    for (v, row) in mtx.outer_iterator().enumerate() {
        let mut acc_v = acc.row_mut(v);
        for (c, &n) in row.iter() {
            acc_v.scaled_add(f64::from(n), &posterior.row(c));
        }
    }
}

/// `sum_c max_s ll[c, s]`, the trace statistic.
pub fn approximate_log_likelihood(ll: &Array2<f64>) -> f64 {
    ll.axis_iter(Axis(0))
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .sum()
}

/// `sum_c log2(sum_s 2^ll[c, s])`, the total log2-likelihood the trace approximates.
pub fn exact_log_likelihood(ll: &Array2<f64>) -> f64 {
    ll.axis_iter(Axis(0))
        .map(|row| stats::log2_sum_exp2(&row.to_vec()))
        .sum()
}

fn has_converged(trace: &[f64], tolerance: f64) -> bool {
    match trace {
        [.., previous, last] => (last - previous).abs() <= tolerance * previous.abs().max(1.0),
        _ => false,
    }
}

/// Alternate E- and M-steps from `theta` until the trace plateaus.
pub fn expectation_maximization(
    counts: &AlleleCounts,
    mut theta: ProbMatrix,
    params: &EmParams,
    run_idx: usize,
) -> EmResult {
    let mut trace = Vec::new();
    let mut posterior = Array2::zeros((counts.num_barcodes(), theta.ncols()));
    let mut converged = false;
    for iteration in 1..=params.max_iterations {
        let ll = log_likelihoods(counts, &theta);
        posterior = posteriors(&ll);
        theta = update_allele_frequencies(counts, &posterior);
        trace.push(approximate_log_likelihood(&ll));
        debug!(
            "run {run_idx} iteration {iteration}: log-likelihood {} (exact {})",
            trace[trace.len() - 1],
            exact_log_likelihood(&ll)
        );
        if has_converged(&trace, params.tolerance) {
            converged = true;
            break;
        }
    }
    if !converged {
        warn!(
            "run {run_idx} stopped after {} EM iterations without converging",
            params.max_iterations
        );
    }
    EmResult {
        theta,
        posterior,
        trace,
        converged,
    }
}
