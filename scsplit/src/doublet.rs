//! Locating the doublet state among the assigned states.
//!
//! A droplet holding two donors' cells mixes their genotypes, pulling every
//! informative SNV's allele frequency towards 0.5. The state whose allele
//! frequencies carry the most binary entropy is called the doublet state.

use crate::counts::AlleleCounts;
use crate::ProbMatrix;
use log::{debug, warn};
use serde::Serialize;
use stats::{binary_entropy, mean};

/// Outcome of the doublet search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum DoubletCall {
    /// The state with the highest mean entropy.
    State {
        /// Doublet state index.
        state: usize,
        /// Mean binary entropy over the state's informative SNVs.
        mean_entropy: f64,
    },
    /// No state has informative SNVs with positive entropy.
    Undetermined,
}

impl DoubletCall {
    /// The doublet state, if one was found.
    pub fn state(&self) -> Option<usize> {
        match self {
            DoubletCall::State { state, .. } => Some(*state),
            DoubletCall::Undetermined => None,
        }
    }
}

/// Mean entropy of `theta[:, state]` over SNVs covered by more than
/// `min_coverage` reads among `assigned` barcodes.
fn state_mean_entropy(
    counts: &AlleleCounts,
    theta: &ProbMatrix,
    state: usize,
    assigned: &[String],
    min_coverage: u64,
) -> Option<f64> {
    let mut columns = vec![false; counts.num_barcodes()];
    for barcode in assigned {
        if let Some(c) = counts.barcode_index(barcode) {
            columns[c] = true;
        }
    }
    let (alt, refs) = counts.column_subset_sums(&columns);
    let informative = (0..counts.num_snvs()).filter(|&v| alt[v] + refs[v] > min_coverage as f64);
    mean(informative.map(|v| binary_entropy(theta[[v, state]])))
}

/// Call the doublet state: the assigned state with the strictly highest mean entropy.
pub fn define_doublet(
    counts: &AlleleCounts,
    theta: &ProbMatrix,
    assigned: &[Vec<String>],
    min_coverage: u64,
) -> DoubletCall {
    let mut call = DoubletCall::Undetermined;
    let mut max_entropy = 0.0;
    for (state, barcodes) in assigned.iter().enumerate() {
        if barcodes.is_empty() {
            continue;
        }
        let Some(entropy) = state_mean_entropy(counts, theta, state, barcodes, min_coverage)
        else {
            debug!("state {state} has no SNV covered by more than {min_coverage} reads");
            continue;
        };
        debug!("state {state} mean entropy {entropy}");
        if entropy > max_entropy {
            max_entropy = entropy;
            call = DoubletCall::State {
                state,
                mean_entropy: entropy,
            };
        }
    }
    if call == DoubletCall::Undetermined {
        warn!("no doublet state could be determined");
    }
    call
}
