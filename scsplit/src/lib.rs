//! Crate for scsplit.
//!
//! Reference-free genetic demultiplexing of pooled cells using per cell
//! barcode ref/alt allele count matrices. Donor genotypes are learned as
//! per-state allele frequencies by expectation-maximization, the best of many
//! randomly initialised runs is kept, and one state is called as the doublet
//! state.
#![deny(missing_docs)]

mod assign;
pub mod counts;
mod doublet;
pub mod em;
mod error;
pub mod init;
pub mod io;
mod params;
pub mod select;
#[cfg(test)]
mod test_pipeline;
#[cfg(test)]
mod testing;

pub use assign::assign_cells;
pub use counts::AlleleCounts;
pub use doublet::{define_doublet, DoubletCall};
pub use error::{Axis, ScSplitError};
pub use params::ScSplitParams;

use anyhow::Result;
use counts::BarcodeIdx;
use em::{expectation_maximization, EmParams};
use init::initialize;
use log::{info, warn};
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use select::{keep_best, RunChunk, RunIdx};

/// Dense probability matrix; rows are SNVs (allele frequencies) or barcodes (posteriors).
pub type ProbMatrix = Array2<f64>;

/// What is kept of one initialisation + EM run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Index of the run across all chunks.
    pub run_idx: RunIdx,
    /// Final value of the convergence trace.
    pub log_likelihood: f64,
    /// Approximate log-likelihood after every EM iteration.
    pub trace: Vec<f64>,
    /// False when EM hit its iteration cap.
    pub converged: bool,
    /// Allele frequency per SNV and state.
    pub theta: ProbMatrix,
    /// Posterior per barcode and state.
    pub posterior: ProbMatrix,
    /// Barcodes the initializer's k-means placed in each cluster.
    pub initial_grouping: Vec<Vec<BarcodeIdx>>,
}

impl RunResult {
    /// EM iterations performed.
    pub fn iterations(&self) -> usize {
        self.trace.len()
    }
}

/// Outcome of the full demultiplexing.
#[derive(Debug, Clone)]
pub struct Demultiplexed {
    /// The run with the highest log-likelihood.
    pub best_run: RunResult,
    /// Sorted barcodes assigned to each state.
    pub assigned: Vec<Vec<String>>,
    /// Barcodes of each initial k-means cluster of the best run.
    pub initial: Vec<Vec<String>>,
    /// The doublet state.
    pub doublet: DoubletCall,
}

/// Initialize the states and run EM once.
pub fn run_once(
    counts: &AlleleCounts,
    params: &ScSplitParams,
    run_idx: RunIdx,
    rng: &mut Xoshiro256StarStar,
) -> Result<RunResult, ScSplitError> {
    let init = initialize(counts, params, rng)?;
    let em_params = EmParams {
        max_iterations: params.max_em_iterations,
        tolerance: params.em_tolerance,
    };
    let em = expectation_maximization(counts, init.theta, &em_params, run_idx);
    Ok(RunResult {
        run_idx,
        log_likelihood: em.log_likelihood(),
        converged: em.converged,
        trace: em.trace,
        theta: em.theta,
        posterior: em.posterior,
        initial_grouping: init.grouping,
    })
}

/// Best successful run, else the last error; `None` when there were no results.
fn reduce_runs(
    results: impl IntoIterator<Item = Result<RunResult, ScSplitError>>,
) -> Option<Result<RunResult, ScSplitError>> {
    let mut last_error = None;
    let best = keep_best(
        results.into_iter().filter_map(|result| match result {
            Ok(run) => Some(run),
            Err(err) => {
                last_error = Some(err);
                None
            }
        }),
        |run| (run.log_likelihood, run.run_idx),
    );
    match (best, last_error) {
        (Some(best), _) => Some(Ok(best)),
        (None, Some(err)) => Some(Err(err)),
        (None, None) => None,
    }
}

/// Run a chunk of restarts sequentially and keep its best run.
///
/// A run whose initialisation fails is skipped; the chunk only fails when
/// every one of its runs did, with the last error.
pub fn run_chunk(
    chunk: &RunChunk,
    counts: &AlleleCounts,
    params: &ScSplitParams,
) -> Result<RunResult, ScSplitError> {
    let mut rng = Xoshiro256StarStar::seed_from_u64(chunk.seed);
    let results = chunk.runs.clone().map(|run_idx| {
        let result = run_once(counts, params, run_idx, &mut rng);
        match &result {
            Ok(run) => info!(
                "run {run_idx}: log-likelihood {} after {} iterations",
                run.log_likelihood,
                run.iterations()
            ),
            Err(err) => warn!("run {run_idx} failed: {err}"),
        }
        result
    });
    reduce_runs(results).unwrap_or_else(|| {
        Err(ScSplitError::InvalidParam {
            name: "restarts",
            reason: format!("chunk {} holds no runs", chunk.chunk_idx),
        })
    })
}

/// Get the best run among chunk results, the last error if none succeeded.
pub fn get_best_run(
    chunk_results: Vec<Result<RunResult, ScSplitError>>,
) -> Result<RunResult, ScSplitError> {
    reduce_runs(chunk_results).unwrap_or_else(|| {
        Err(ScSplitError::InvalidParam {
            name: "restarts",
            reason: "no runs were executed".to_string(),
        })
    })
}

fn barcode_names(counts: &AlleleCounts, groups: &[Vec<BarcodeIdx>]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|group| group.iter().map(|&c| counts.barcodes()[c].clone()).collect())
        .collect()
}

/// Run every restart, keep the most likely, assign cells and call the doublet state.
pub fn demultiplex(counts: &AlleleCounts, params: &ScSplitParams) -> Result<Demultiplexed> {
    params.validate()?;
    info!(
        "demultiplexing {} barcodes over {} SNVs into {} states with {} runs",
        counts.num_barcodes(),
        counts.num_snvs(),
        params.num_states(),
        params.restarts
    );

    let chunks = select::chunk_runs(params.threads, params.restarts, params.seed);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads)
        .build()?;
    let chunk_results: Vec<_> = pool.install(|| {
        chunks
            .par_iter()
            .map(|chunk| run_chunk(chunk, counts, params))
            .collect()
    });
    let best_run = get_best_run(chunk_results)?;
    info!(
        "best run {} with log-likelihood {}",
        best_run.run_idx, best_run.log_likelihood
    );
    if !best_run.converged {
        warn!("the best run did not converge");
    }

    let assigned = assign_cells(
        &best_run.posterior,
        counts.barcodes(),
        params.assignment_threshold,
    );
    let doublet = define_doublet(counts, &best_run.theta, &assigned, params.min_snv_coverage);
    if let DoubletCall::State {
        state,
        mean_entropy,
    } = doublet
    {
        info!("doublet state {state} (mean entropy {mean_entropy:.4})");
    }
    let initial = barcode_names(counts, &best_run.initial_grouping);
    Ok(Demultiplexed {
        best_run,
        assigned,
        initial,
        doublet,
    })
}
