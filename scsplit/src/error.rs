use std::fmt;

/// Which of the two count matrices a label or shape belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// SNV rows.
    Snv,
    /// Barcode columns.
    Barcode,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Snv => write!(f, "SNV"),
            Axis::Barcode => write!(f, "barcode"),
        }
    }
}

/// Failures of the demultiplexing core.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ScSplitError {
    /// The ref and alt matrices, or a matrix and its labels, disagree in shape.
    #[error(
        "ref matrix is {ref_shape:?} (SNVs x barcodes) but alt matrix is {alt_shape:?}; \
         with {snvs} SNV labels and {barcodes} barcode labels"
    )]
    ShapeMismatch {
        /// Shape of the ref matrix.
        ref_shape: (usize, usize),
        /// Shape of the alt matrix.
        alt_shape: (usize, usize),
        /// Number of SNV labels.
        snvs: usize,
        /// Number of barcode labels.
        barcodes: usize,
    },

    /// The two input files list different labels, or in a different order.
    #[error("{axis} label {index} differs between ref ({ref_label:?}) and alt ({alt_label:?})")]
    LabelMismatch {
        /// Row or column labels.
        axis: Axis,
        /// Position of the first disagreement.
        index: usize,
        /// Label in the ref input.
        ref_label: String,
        /// Label in the alt input.
        alt_label: String,
    },

    /// A label occurs more than once, so its row or column is ambiguous.
    #[error("{axis} label {label:?} occurs at both {first} and {second}")]
    DuplicateLabel {
        /// Row or column labels.
        axis: Axis,
        /// The repeated label.
        label: String,
        /// Position of its first occurrence.
        first: usize,
        /// Position of the repeat.
        second: usize,
    },

    /// The model needs at least one donor state besides the background state.
    #[error("the number of donors must be at least 1")]
    NoStates,

    /// Clustering needs at least as many barcodes as states.
    #[error("{barcodes} barcodes cannot be split into {states} states")]
    TooFewBarcodes {
        /// Barcodes available.
        barcodes: usize,
        /// States requested.
        states: usize,
    },

    /// The randomized densification did not reach the density target.
    ///
    /// Trimming removes `floor(n / 10)` rows and columns per round, so it stops
    /// once both dimensions are below 10. A block that is still sparse at that
    /// size fails here, as does one that shrinks below a barcode per state or
    /// runs out of rounds.
    #[error(
        "failed to find a dense sub-block after {iterations} iterations \
         ({snvs} SNVs x {barcodes} barcodes left)"
    )]
    DensifyFailed {
        /// Trimming rounds performed.
        iterations: usize,
        /// SNVs retained when giving up.
        snvs: usize,
        /// Barcodes retained when giving up.
        barcodes: usize,
    },

    /// A parameter is outside its valid range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
