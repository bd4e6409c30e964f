//! Initial allele frequencies from a dense, well covered sub-block of the counts.
//!
//! The coverage matrix is trimmed at random from its low-coverage end until
//! the remaining block is nearly dense. Alt-allele proportions on that block
//! are standardized, projected onto their principal components and split into
//! one k-means cluster per state. Each cluster's reads, over every SNV, seed
//! that state's allele frequency.

use crate::counts::{AlleleCounts, BarcodeIdx, SnvIdx};
use crate::error::ScSplitError;
use crate::params::ScSplitParams;
use crate::ProbMatrix;
use log::debug;
use ndarray::{Array1, Array2, Zip};
use rand::Rng;
use rand_distr::{Beta, Distribution};
use stats::{pca, standardize_columns, KMeans};

/// Fraction of rows and columns considered for removal each round.
const TRIM_FRACTION: f64 = 0.1;
/// Every retained row must cover this fraction of retained columns, and vice versa.
const DENSITY_TARGET: f64 = 0.9;
/// Shape of the Beta distribution picking trimmed positions, skewed to the low end.
const TRIM_BETA: (f64, f64) = (1.0, 10.0);
/// Pseudo-counts of the alt proportion fed to the PCA.
const PROPORTION_PSEUDO: (f64, f64) = (0.01, 0.02);

/// Limits on the densification loop.
#[derive(Debug, Clone, Copy)]
pub struct DensifyParams {
    /// Trimming rounds before giving up.
    pub max_iterations: usize,
    /// Fewest SNVs the block may shrink to.
    pub min_snvs: usize,
    /// Fewest barcodes the block may shrink to.
    pub min_barcodes: usize,
}

/// SNVs and barcodes of the dense sub-block, in ascending original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retained {
    /// Retained SNV rows.
    pub snvs: Vec<SnvIdx>,
    /// Retained barcode columns.
    pub barcodes: Vec<BarcodeIdx>,
}

/// Output of the state initializer.
#[derive(Debug, Clone)]
pub struct Initialization {
    /// Allele frequency per SNV (rows) and state (columns), strictly inside (0, 1).
    pub theta: ProbMatrix,
    /// Retained barcodes placed in each k-means cluster.
    pub grouping: Vec<Vec<BarcodeIdx>>,
    /// The dense sub-block the clustering ran on.
    pub retained: Retained,
}

/// Trim low-coverage rows and columns at random until the block is nearly dense.
///
/// `pattern[v]` lists the columns with coverage in row `v`. Each round ranks
/// the current rows and columns by how many non-zero entries they have,
/// draws `floor(0.1 n)` Beta(1, 10) positions from the bottom of each ranking
/// and drops them. The loop stops once every remaining column covers at least
/// 90% of the remaining rows and every remaining row covers at least 90% of
/// the remaining columns.
///
/// Once fewer than 10 rows and 10 columns remain nothing more can be drawn,
/// so that is the smallest block this can reach by trimming; a block already
/// dense is kept at any size.
pub fn densify<R: Rng>(
    pattern: &[Vec<BarcodeIdx>],
    num_barcodes: usize,
    params: &DensifyParams,
    rng: &mut R,
) -> Result<Retained, ScSplitError> {
    let beta = Beta::new(TRIM_BETA.0, TRIM_BETA.1).expect("valid beta shape");
    let mut rows: Vec<SnvIdx> = (0..pattern.len()).collect();
    let mut cols: Vec<BarcodeIdx> = (0..num_barcodes).collect();

    for iteration in 1..=params.max_iterations {
        let (row_nnz, col_nnz) = nonzero_counts(pattern, &rows, &cols, num_barcodes);
        let row_draws = (TRIM_FRACTION * rows.len() as f64) as usize;
        let col_draws = (TRIM_FRACTION * cols.len() as f64) as usize;
        if row_draws == 0 && col_draws == 0 {
            // Too small to trim further.
            if is_dense(pattern, &rows, &cols, num_barcodes) {
                return Ok(retained(rows, cols, iteration - 1));
            }
            return Err(ScSplitError::DensifyFailed {
                iterations: iteration - 1,
                snvs: rows.len(),
                barcodes: cols.len(),
            });
        }

        rows = trim_bottom(&rows, |r| row_nnz[r], row_draws, &beta, rng);
        cols = trim_bottom(&cols, |c| col_nnz[c], col_draws, &beta, rng);
        if rows.len() < params.min_snvs || cols.len() < params.min_barcodes {
            return Err(ScSplitError::DensifyFailed {
                iterations: iteration,
                snvs: rows.len(),
                barcodes: cols.len(),
            });
        }
        if is_dense(pattern, &rows, &cols, num_barcodes) {
            return Ok(retained(rows, cols, iteration));
        }
    }
    Err(ScSplitError::DensifyFailed {
        iterations: params.max_iterations,
        snvs: rows.len(),
        barcodes: cols.len(),
    })
}

fn retained(mut rows: Vec<SnvIdx>, mut cols: Vec<BarcodeIdx>, rounds: usize) -> Retained {
    debug!(
        "dense block of {} SNVs x {} barcodes after {rounds} rounds",
        rows.len(),
        cols.len()
    );
    rows.sort_unstable();
    cols.sort_unstable();
    Retained {
        snvs: rows,
        barcodes: cols,
    }
}

/// Every column covers at least 90% of the rows and every row at least 90% of the columns.
fn is_dense(
    pattern: &[Vec<BarcodeIdx>],
    rows: &[SnvIdx],
    cols: &[BarcodeIdx],
    num_barcodes: usize,
) -> bool {
    let (row_nnz, col_nnz) = nonzero_counts(pattern, rows, cols, num_barcodes);
    let min_rows_per_col = cols.iter().map(|&c| col_nnz[c]).min().unwrap_or(0);
    let min_cols_per_row = rows.iter().map(|&r| row_nnz[r]).min().unwrap_or(0);
    min_rows_per_col as f64 >= DENSITY_TARGET * rows.len() as f64
        && min_cols_per_row as f64 >= DENSITY_TARGET * cols.len() as f64
}

/// Non-zero entries per row and per column of the block `rows x cols`,
/// indexed by original row and column.
fn nonzero_counts(
    pattern: &[Vec<BarcodeIdx>],
    rows: &[SnvIdx],
    cols: &[BarcodeIdx],
    num_barcodes: usize,
) -> (Vec<usize>, Vec<usize>) {
    let mut alive = vec![false; num_barcodes];
    for &c in cols {
        alive[c] = true;
    }
    let mut row_nnz = vec![0; pattern.len()];
    let mut col_nnz = vec![0; num_barcodes];
    for &r in rows {
        for &c in &pattern[r] {
            if alive[c] {
                row_nnz[r] += 1;
                col_nnz[c] += 1;
            }
        }
    }
    (row_nnz, col_nnz)
}

/// Rank `items` by `nnz` ascending and drop the Beta-drawn positions.
fn trim_bottom<R: Rng>(
    items: &[usize],
    nnz: impl Fn(usize) -> usize,
    draws: usize,
    beta: &Beta<f64>,
    rng: &mut R,
) -> Vec<usize> {
    let mut ranked = items.to_vec();
    ranked.sort_by_key(|&i| nnz(i));
    let n = ranked.len();
    let mut drop = vec![false; n];
    for _ in 0..draws {
        let pos = (beta.sample(rng) * n as f64) as usize;
        drop[pos.min(n - 1)] = true;
    }
    ranked
        .into_iter()
        .zip(drop)
        .filter_map(|(item, dropped)| (!dropped).then_some(item))
        .collect()
}

/// Alt proportion `(alt + 0.01) / (alt + ref + 0.02)` on the retained block,
/// laid out barcodes x SNVs.
fn alt_proportions(counts: &AlleleCounts, retained: &Retained) -> Array2<f64> {
    let mut position = vec![None; counts.num_barcodes()];
    for (i, &c) in retained.barcodes.iter().enumerate() {
        position[c] = Some(i);
    }
    let shape = (retained.barcodes.len(), retained.snvs.len());
    let mut alt = Array2::<f64>::zeros(shape);
    let mut refs = Array2::<f64>::zeros(shape);
    for (j, &v) in retained.snvs.iter().enumerate() {
        for (mtx, dense) in [(counts.alt_mtx(), &mut alt), (counts.ref_mtx(), &mut refs)] {
            if let Some(row) = mtx.outer_view(v) {
                for (c, &n) in row.iter() {
                    if let Some(i) = position[c] {
                        dense[[i, j]] = f64::from(n);
                    }
                }
            }
        }
    }
    let (pa, pt) = PROPORTION_PSEUDO;
    Zip::from(&alt)
        .and(&refs)
        .map_collect(|&a, &r| (a + pa) / (a + r + pt))
}

/// Allele frequency per SNV for one group of barcodes, shrunk towards the background prior.
fn group_allele_frequency(
    counts: &AlleleCounts,
    k_alt: &Array1<f64>,
    k_ref: &Array1<f64>,
    group: &[BarcodeIdx],
) -> Array1<f64> {
    let mut mask = vec![false; counts.num_barcodes()];
    for &c in group {
        mask[c] = true;
    }
    let (alt, refs) = counts.column_subset_sums(&mask);
    (&alt + k_alt) / (&alt + &refs + k_alt + k_ref)
}

/// Initial allele frequencies and barcode grouping for every state.
pub fn initialize<R: Rng>(
    counts: &AlleleCounts,
    params: &ScSplitParams,
    rng: &mut R,
) -> Result<Initialization, ScSplitError> {
    let states = params.num_states();
    if counts.num_barcodes() < states {
        return Err(ScSplitError::TooFewBarcodes {
            barcodes: counts.num_barcodes(),
            states,
        });
    }
    let prior = counts.background_prior();

    let retained = densify(
        &counts.coverage_pattern(),
        counts.num_barcodes(),
        &DensifyParams {
            max_iterations: params.max_densify_iterations,
            min_snvs: 1,
            min_barcodes: states,
        },
        rng,
    )?;

    let standardized = standardize_columns(&alt_proportions(counts, &retained));
    let projection = pca(&standardized, params.pca_components);
    debug!(
        "PCA of {} barcodes x {} SNVs, component variances {:?}",
        retained.barcodes.len(),
        retained.snvs.len(),
        projection.variance
    );
    let kmeans = KMeans {
        restarts: params.kmeans_restarts,
        max_iterations: params.kmeans_max_iterations,
        ..KMeans::new(states)
    };
    let fit = kmeans
        .fit(projection.scores.view(), rng)
        .ok_or(ScSplitError::TooFewBarcodes {
            barcodes: retained.barcodes.len(),
            states,
        })?;

    let mut grouping = vec![Vec::new(); states];
    for (&barcode, &label) in retained.barcodes.iter().zip(&fit.labels) {
        grouping[label].push(barcode);
    }

    let mut theta = Array2::zeros((counts.num_snvs(), states));
    for (state, group) in grouping.iter().enumerate() {
        theta
            .column_mut(state)
            .assign(&group_allele_frequency(counts, &prior.k_alt, &prior.k_ref, group));
    }
    debug!(
        "initial cluster sizes {:?}",
        grouping.iter().map(Vec::len).collect::<Vec<_>>()
    );

    Ok(Initialization {
        theta,
        grouping,
        retained,
    })
}
