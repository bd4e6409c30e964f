//! End-to-end demultiplexing of synthetic pools.

use crate::testing::{two_donor_counts, SyntheticCounts};
use crate::{
    demultiplex, get_best_run, run_chunk, run_once, RunResult, ScSplitError, ScSplitParams,
};
use anyhow::Result;
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

fn params(num_donors: usize, threads: usize) -> ScSplitParams {
    ScSplitParams {
        restarts: 6,
        threads,
        seed: 17,
        ..ScSplitParams::with_donors(num_donors)
    }
}

#[test]
fn test_two_donors_with_doublets() -> Result<()> {
    // 50 barcodes, 20 SNVs
    let SyntheticCounts {
        counts,
        donor_a,
        donor_b,
        doublets,
    } = two_donor_counts(20, 23, 4);
    let result = demultiplex(&counts, &params(2, 2))?;

    assert_eq!(result.assigned.len(), 3);
    let donor_states: Vec<usize> = [&donor_a, &donor_b]
        .iter()
        .map(|donor| {
            result
                .assigned
                .iter()
                .position(|assigned| assigned == *donor)
                .expect("every donor lands in its own state")
        })
        .collect();
    assert_ne!(donor_states[0], donor_states[1]);
    let doublet_state = 3 - donor_states[0] - donor_states[1];
    assert_eq!(result.assigned[doublet_state], doublets);
    assert_eq!(result.doublet.state(), Some(doublet_state));

    assert!(result.best_run.converged);
    assert!(result.best_run.iterations() < 50);
    for row in result.best_run.posterior.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }
    assert!(result.best_run.theta.iter().all(|&t| t > 0.0 && t < 1.0));
    Ok(())
}

#[test]
fn test_two_states_split_donors() -> Result<()> {
    let SyntheticCounts {
        counts,
        donor_a,
        donor_b,
        ..
    } = two_donor_counts(20, 25, 0);
    let result = demultiplex(&counts, &params(1, 1))?;
    let mut assigned = result.assigned.clone();
    assigned.sort();
    let mut expected = vec![donor_a, donor_b];
    expected.sort();
    assert_eq!(assigned, expected);
    assert_eq!(result.initial.len(), 2);
    Ok(())
}

#[test]
fn test_fixed_seed_is_reproducible() -> Result<()> {
    let SyntheticCounts { counts, .. } = two_donor_counts(16, 12, 3);
    let first = demultiplex(&counts, &params(2, 3))?;
    let second = demultiplex(&counts, &params(2, 3))?;
    assert_eq!(first.best_run.run_idx, second.best_run.run_idx);
    assert_eq!(first.best_run.log_likelihood, second.best_run.log_likelihood);
    assert_eq!(first.assigned, second.assigned);
    assert_eq!(first.initial, second.initial);
    assert_eq!(first.doublet, second.doublet);
    Ok(())
}

#[test]
fn test_every_run_failing_is_an_error() {
    let SyntheticCounts { counts, .. } = two_donor_counts(5, 1, 0);
    let err = demultiplex(&counts, &params(2, 2)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ScSplitError>(),
        Some(&ScSplitError::TooFewBarcodes {
            barcodes: 2,
            states: 3
        })
    );
}

#[test]
fn test_invalid_params_rejected() {
    let SyntheticCounts { counts, .. } = two_donor_counts(5, 4, 0);
    let err = demultiplex(&counts, &params(0, 1)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ScSplitError>(),
        Some(&ScSplitError::NoStates)
    );
}

#[test]
fn test_best_run_tie_keeps_earliest() {
    let run = |run_idx, log_likelihood| RunResult {
        run_idx,
        log_likelihood,
        trace: vec![log_likelihood],
        converged: true,
        theta: Array2::zeros((1, 2)),
        posterior: Array2::zeros((1, 2)),
        initial_grouping: vec![vec![], vec![]],
    };
    let best = get_best_run(vec![
        Ok(run(4, -10.0)),
        Err(ScSplitError::NoStates),
        Ok(run(1, -10.0)),
        Ok(run(2, -12.0)),
    ])
    .unwrap();
    assert_eq!(best.run_idx, 1);

    let all_failed = get_best_run(vec![
        Err(ScSplitError::NoStates),
        Err(ScSplitError::TooFewBarcodes {
            barcodes: 1,
            states: 2,
        }),
    ]);
    assert_eq!(
        all_failed.unwrap_err(),
        ScSplitError::TooFewBarcodes {
            barcodes: 1,
            states: 2,
        }
    );
    assert!(matches!(
        get_best_run(vec![]),
        Err(ScSplitError::InvalidParam {
            name: "restarts",
            ..
        })
    ));
}

#[test]
fn test_chunk_keeps_its_best_run() -> Result<()> {
    let SyntheticCounts { counts, .. } = two_donor_counts(20, 25, 0);
    let params = params(1, 1);
    let chunk = &crate::select::chunk_runs(1, 4, params.seed)[0];
    let best = run_chunk(chunk, &counts, &params)?;
    let mut rng = Xoshiro256StarStar::seed_from_u64(chunk.seed);
    let all: Vec<RunResult> = chunk
        .runs
        .clone()
        .map(|run_idx| run_once(&counts, &params, run_idx, &mut rng))
        .collect::<Result<_, _>>()?;
    let max = all
        .iter()
        .map(|run| run.log_likelihood)
        .fold(f64::NEG_INFINITY, f64::max);
    let first_max = all.iter().find(|run| run.log_likelihood == max).unwrap();
    assert_eq!(best.run_idx, first_max.run_idx);
    assert_eq!(best.log_likelihood, max);
    Ok(())
}
