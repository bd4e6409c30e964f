//! SNV x barcode allele count store.

use crate::error::{Axis, ScSplitError};
use fxhash::FxHashMap;
use ndarray::{Array1, Array2};
use sprs::{CsMat, TriMat};

/// Pseudo-count added to both allele totals of the background prior.
pub(crate) const PSEUDO_COUNT: f64 = 1.0;

/// Index of an SNV row.
pub type SnvIdx = usize;
/// Index of a barcode column.
pub type BarcodeIdx = usize;

/// Reference and alternative read counts per SNV (rows) and barcode (columns).
///
/// Immutable after construction and shared read-only by every run.
#[derive(Debug, Clone)]
pub struct AlleleCounts {
    ref_mtx: CsMat<u32>,
    alt_mtx: CsMat<u32>,
    snvs: Vec<String>,
    barcodes: Vec<String>,
    barcode_to_index: FxHashMap<String, BarcodeIdx>,
}

/// Background alt/ref fraction per SNV over every barcode.
#[derive(Debug, Clone)]
pub struct BackgroundPrior {
    /// `(sum alt + 1) / (sum alt + sum ref + 2)` per SNV.
    pub k_alt: Array1<f64>,
    /// `1 - k_alt` per SNV.
    pub k_ref: Array1<f64>,
}

impl AlleleCounts {
    /// Build the store, checking that both matrices and both label lists agree in shape
    /// and that no barcode label repeats.
    pub fn new(
        ref_mtx: CsMat<u32>,
        alt_mtx: CsMat<u32>,
        snvs: Vec<String>,
        barcodes: Vec<String>,
    ) -> Result<Self, ScSplitError> {
        let shape = (snvs.len(), barcodes.len());
        if ref_mtx.shape() != shape || alt_mtx.shape() != shape {
            return Err(ScSplitError::ShapeMismatch {
                ref_shape: ref_mtx.shape(),
                alt_shape: alt_mtx.shape(),
                snvs: snvs.len(),
                barcodes: barcodes.len(),
            });
        }
        let mut barcode_to_index = FxHashMap::default();
        for (i, bc) in barcodes.iter().enumerate() {
            if let Some(first) = barcode_to_index.insert(bc.clone(), i) {
                return Err(ScSplitError::DuplicateLabel {
                    axis: Axis::Barcode,
                    label: bc.clone(),
                    first,
                    second: i,
                });
            }
        }
        Ok(AlleleCounts {
            ref_mtx: as_csr(ref_mtx),
            alt_mtx: as_csr(alt_mtx),
            snvs,
            barcodes,
            barcode_to_index,
        })
    }

    /// Build the store from dense SNV x barcode arrays.
    pub fn from_dense(
        ref_counts: &Array2<u32>,
        alt_counts: &Array2<u32>,
        snvs: Vec<String>,
        barcodes: Vec<String>,
    ) -> Result<Self, ScSplitError> {
        AlleleCounts::new(
            dense_to_csr(ref_counts),
            dense_to_csr(alt_counts),
            snvs,
            barcodes,
        )
    }

    /// Check that the labels read from a second input match this store's.
    pub fn check_labels(
        ref_labels: (&[String], &[String]),
        alt_labels: (&[String], &[String]),
    ) -> Result<(), ScSplitError> {
        for (axis, refs, alts) in [
            (Axis::Snv, ref_labels.0, alt_labels.0),
            (Axis::Barcode, ref_labels.1, alt_labels.1),
        ] {
            if refs.len() != alts.len() {
                return Err(ScSplitError::ShapeMismatch {
                    ref_shape: (ref_labels.0.len(), ref_labels.1.len()),
                    alt_shape: (alt_labels.0.len(), alt_labels.1.len()),
                    snvs: ref_labels.0.len(),
                    barcodes: ref_labels.1.len(),
                });
            }
            if let Some(index) = refs.iter().zip(alts).position(|(r, a)| r != a) {
                return Err(ScSplitError::LabelMismatch {
                    axis,
                    index,
                    ref_label: refs[index].clone(),
                    alt_label: alts[index].clone(),
                });
            }
        }
        Ok(())
    }

    /// Number of SNVs (rows).
    pub fn num_snvs(&self) -> usize {
        self.snvs.len()
    }

    /// Number of barcodes (columns).
    pub fn num_barcodes(&self) -> usize {
        self.barcodes.len()
    }

    /// SNV identifiers in row order.
    pub fn snvs(&self) -> &[String] {
        &self.snvs
    }

    /// Barcode identifiers in column order.
    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    /// Column of a barcode.
    pub fn barcode_index(&self, barcode: &str) -> Option<BarcodeIdx> {
        self.barcode_to_index.get(barcode).copied()
    }

    /// Reference-supporting counts, CSR.
    pub fn ref_mtx(&self) -> &CsMat<u32> {
        &self.ref_mtx
    }

    /// Alternative-supporting counts, CSR.
    pub fn alt_mtx(&self) -> &CsMat<u32> {
        &self.alt_mtx
    }

    /// Background alt fraction per SNV, pseudo-counted so it never reaches 0 or 1.
    pub fn background_prior(&self) -> BackgroundPrior {
        let n_alt = row_sums(&self.alt_mtx) + PSEUDO_COUNT;
        let n_ref = row_sums(&self.ref_mtx) + PSEUDO_COUNT;
        let total = &n_alt + &n_ref;
        BackgroundPrior {
            k_alt: &n_alt / &total,
            k_ref: &n_ref / &total,
        }
    }

    /// Per-SNV alt and ref totals over the barcodes flagged in `columns`.
    pub fn column_subset_sums(&self, columns: &[bool]) -> (Array1<f64>, Array1<f64>) {
        (
            masked_row_sums(&self.alt_mtx, columns),
            masked_row_sums(&self.ref_mtx, columns),
        )
    }

    /// For every SNV, the sorted barcodes with at least one read of either allele.
    pub fn coverage_pattern(&self) -> Vec<Vec<BarcodeIdx>> {
        self.ref_mtx
            .outer_iterator()
            .zip(self.alt_mtx.outer_iterator())
            .map(|(ref_row, alt_row)| {
                let mut covered: Vec<BarcodeIdx> = ref_row
                    .iter()
                    .chain(alt_row.iter())
                    .filter(|&(_, &n)| n > 0)
                    .map(|(c, _)| c)
                    .collect();
                covered.sort_unstable();
                covered.dedup();
                covered
            })
            .collect()
    }
}

fn as_csr(mtx: CsMat<u32>) -> CsMat<u32> {
    if mtx.is_csr() {
        mtx
    } else {
        mtx.to_csr()
    }
}

fn dense_to_csr(dense: &Array2<u32>) -> CsMat<u32> {
    let mut tri = TriMat::new(dense.dim());
    for ((row, col), &n) in dense.indexed_iter() {
        if n > 0 {
            tri.add_triplet(row, col, n);
        }
    }
    tri.to_csr()
}

fn row_sums(mtx: &CsMat<u32>) -> Array1<f64> {
    mtx.outer_iterator()
        .map(|row| row.iter().map(|(_, &n)| f64::from(n)).sum())
        .collect()
}

fn masked_row_sums(mtx: &CsMat<u32>, columns: &[bool]) -> Array1<f64> {
    mtx.outer_iterator()
        .map(|row| {
            row.iter()
                .filter(|(c, _)| columns[*c])
                .map(|(_, &n)| f64::from(n))
                .sum()
        })
        .collect()
}
