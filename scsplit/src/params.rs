use crate::error::ScSplitError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;

/// Demultiplexing parameters.
///
/// Every field has a default, so a TOML file only needs to name the ones it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScSplitParams {
    /// Number of donors (K). The model fits K + 1 states, the extra one being
    /// the background state.
    pub num_donors: usize,
    /// Independent initialisation + EM runs.
    pub restarts: usize,
    /// Worker threads for the runs.
    pub threads: usize,
    /// Master seed for every run's generator.
    pub seed: u64,
    /// Minimum posterior for a barcode to be assigned to a state.
    pub assignment_threshold: f64,
    /// SNVs need strictly more reads than this among a state's barcodes to
    /// count towards its entropy.
    pub min_snv_coverage: u64,
    /// Principal components kept by the initializer.
    pub pca_components: usize,
    /// EM iteration cap.
    pub max_em_iterations: usize,
    /// Relative change of the log-likelihood trace treated as converged.
    pub em_tolerance: f64,
    /// Densification rounds before giving up.
    pub max_densify_iterations: usize,
    /// Seeded restarts of k-means inside the initializer.
    pub kmeans_restarts: usize,
    /// Lloyd iterations per k-means restart.
    pub kmeans_max_iterations: usize,
}

impl Default for ScSplitParams {
    fn default() -> Self {
        ScSplitParams {
            num_donors: 1,
            restarts: 50,
            threads: 1,
            seed: 0,
            assignment_threshold: 0.9,
            min_snv_coverage: 10,
            pca_components: 20,
            max_em_iterations: 1000,
            em_tolerance: 1e-12,
            max_densify_iterations: 1000,
            kmeans_restarts: 10,
            kmeans_max_iterations: 300,
        }
    }
}

impl ScSplitParams {
    /// Parameters with defaults for everything but the donor count.
    pub fn with_donors(num_donors: usize) -> Self {
        ScSplitParams {
            num_donors,
            ..Default::default()
        }
    }

    /// Read parameters from a TOML file.
    pub fn from_toml(path: &Path) -> Result<Self> {
        let text = read_to_string(path).with_context(|| path.display().to_string())?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Total number of model states, donors plus background.
    pub fn num_states(&self) -> usize {
        self.num_donors + 1
    }

    /// Reject values the algorithm cannot work with.
    pub fn validate(&self) -> Result<(), ScSplitError> {
        let invalid = |name, reason: &str| {
            Err(ScSplitError::InvalidParam {
                name,
                reason: reason.to_string(),
            })
        };
        if self.num_donors == 0 {
            return Err(ScSplitError::NoStates);
        }
        if self.restarts == 0 {
            return invalid("restarts", "at least one run is required");
        }
        if self.threads == 0 {
            return invalid("threads", "at least one thread is required");
        }
        if !(self.assignment_threshold > 0.5 && self.assignment_threshold <= 1.0) {
            return invalid("assignment_threshold", "must be in (0.5, 1]");
        }
        if self.pca_components == 0 {
            return invalid("pca_components", "must be positive");
        }
        if self.max_em_iterations < 2 {
            return invalid("max_em_iterations", "convergence needs two iterations");
        }
        if !(self.em_tolerance >= 0.0) {
            return invalid("em_tolerance", "must be non-negative");
        }
        if self.max_densify_iterations == 0 {
            return invalid("max_densify_iterations", "must be positive");
        }
        Ok(())
    }
}
