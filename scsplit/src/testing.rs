//! Synthetic allele counts for tests.

use crate::counts::AlleleCounts;
use ndarray::Array2;

/// Reads per covered SNV for a single-donor barcode.
const DONOR_DEPTH: u32 = 3;
/// Reads per SNV and allele for a doublet barcode.
const DOUBLET_DEPTH: u32 = 2;

pub(crate) struct SyntheticCounts {
    pub(crate) counts: AlleleCounts,
    pub(crate) donor_a: Vec<String>,
    pub(crate) donor_b: Vec<String>,
    pub(crate) doublets: Vec<String>,
}

/// Two donors with opposite homozygous genotypes at every SNV, plus doublets.
///
/// Donor A carries the alt allele on even SNVs, donor B on odd SNVs. Single
/// donor barcode `i` skips SNV `i % num_snvs`, doublets cover every SNV with
/// an even split of alleles, so doublets always rank as the best covered
/// barcodes.
pub(crate) fn two_donor_counts(
    num_snvs: usize,
    barcodes_per_donor: usize,
    num_doublets: usize,
) -> SyntheticCounts {
    let num_barcodes = 2 * barcodes_per_donor + num_doublets;
    let mut ref_counts = Array2::<u32>::zeros((num_snvs, num_barcodes));
    let mut alt_counts = Array2::<u32>::zeros((num_snvs, num_barcodes));
    let mut barcodes = Vec::with_capacity(num_barcodes);
    let (mut donor_a, mut donor_b, mut doublets) = (Vec::new(), Vec::new(), Vec::new());

    for c in 0..num_barcodes {
        let barcode = format!("{}-1", bases(c));
        if c < 2 * barcodes_per_donor {
            let is_a = c < barcodes_per_donor;
            for v in (0..num_snvs).filter(|&v| v != c % num_snvs) {
                let alt_carrier = (v % 2 == 0) == is_a;
                if alt_carrier {
                    alt_counts[[v, c]] = DONOR_DEPTH;
                } else {
                    ref_counts[[v, c]] = DONOR_DEPTH;
                }
            }
            if is_a {
                donor_a.push(barcode.clone());
            } else {
                donor_b.push(barcode.clone());
            }
        } else {
            for v in 0..num_snvs {
                alt_counts[[v, c]] = DOUBLET_DEPTH;
                ref_counts[[v, c]] = DOUBLET_DEPTH;
            }
            doublets.push(barcode.clone());
        }
        barcodes.push(barcode);
    }

    let snvs = (0..num_snvs).map(|v| format!("chr1:{}", 1000 + 17 * v)).collect();
    let counts = AlleleCounts::from_dense(&ref_counts, &alt_counts, snvs, barcodes)
        .expect("consistent synthetic shapes");
    for list in [&mut donor_a, &mut donor_b, &mut doublets] {
        list.sort();
    }
    SyntheticCounts {
        counts,
        donor_a,
        donor_b,
        doublets,
    }
}

/// A distinct 8-base barcode sequence for an index.
fn bases(mut i: usize) -> String {
    let mut seq = String::with_capacity(8);
    for _ in 0..8 {
        seq.push(['A', 'C', 'G', 'T'][i % 4]);
        i /= 4;
    }
    seq
}
