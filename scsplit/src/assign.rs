use crate::ProbMatrix;
use ndarray::Axis;

/// Barcodes whose posterior for a state reaches `threshold`, per state, sorted.
///
/// A barcode below the threshold everywhere is left out; nothing prevents a
/// barcode from landing in more than one state.
pub fn assign_cells(
    posterior: &ProbMatrix,
    barcodes: &[String],
    threshold: f64,
) -> Vec<Vec<String>> {
    posterior
        .axis_iter(Axis(1))
        .map(|p_s| {
            let mut assigned: Vec<String> = p_s
                .iter()
                .zip(barcodes)
                .filter(|&(&p, _)| p >= threshold)
                .map(|(_, bc)| bc.clone())
                .collect();
            assigned.sort();
            assigned
        })
        .collect()
}
