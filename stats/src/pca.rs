//! Column standardization and principal component projection on small dense blocks.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, Axis};
use std::cmp::Ordering;

/// Center every column to zero mean and scale it to unit population variance.
///
/// Columns with zero variance are only centered, so they become all zeros.
pub fn standardize_columns(matrix: &Array2<f64>) -> Array2<f64> {
    let mut standardized = matrix.clone();
    for mut column in standardized.axis_iter_mut(Axis(1)) {
        let n = column.len() as f64;
        if n == 0.0 {
            continue;
        }
        let mean = column.sum() / n;
        let var = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
        column.mapv_inplace(|x| (x - mean) / scale);
    }
    standardized
}

/// Projection of the rows of a matrix onto its leading principal components.
#[derive(Debug, Clone)]
pub struct PcaProjection {
    /// Row scores, one row per observation and one column per component.
    pub scores: Array2<f64>,
    /// Variance captured by each component, in decreasing order.
    pub variance: Vec<f64>,
}

/// Project the rows of `matrix` (observations x features) onto at most
/// `num_components` principal components.
///
/// The number of components is capped at the rank bound `min(rows, cols)`.
/// The eigendecomposition is taken on whichever of the covariance or the Gram
/// matrix is smaller, both give the same scores up to sign.
pub fn pca(matrix: &Array2<f64>, num_components: usize) -> PcaProjection {
    let (rows, cols) = matrix.dim();
    let num_components = num_components.min(rows).min(cols);
    if num_components == 0 {
        return PcaProjection {
            scores: Array2::zeros((rows, 0)),
            variance: Vec::new(),
        };
    }

    let centered = {
        let mut centered = matrix.clone();
        if let Some(mean) = matrix.mean_axis(Axis(0)) {
            centered -= &mean;
        }
        centered
    };
    let x = DMatrix::from_fn(rows, cols, |i, j| centered[[i, j]]);
    let dof = (rows.max(2) - 1) as f64;

    let mut scores = Array2::zeros((rows, num_components));
    let mut variance = Vec::with_capacity(num_components);
    if cols <= rows {
        let eigen = SymmetricEigen::new(x.transpose() * &x);
        let order = descending_order(eigen.eigenvalues.as_slice());
        let projected = &x * &eigen.eigenvectors;
        for (k, &idx) in order.iter().take(num_components).enumerate() {
            variance.push(eigen.eigenvalues[idx].max(0.0) / dof);
            for i in 0..rows {
                scores[[i, k]] = projected[(i, idx)];
            }
        }
    } else {
        let eigen = SymmetricEigen::new(&x * x.transpose());
        let order = descending_order(eigen.eigenvalues.as_slice());
        for (k, &idx) in order.iter().take(num_components).enumerate() {
            let lambda = eigen.eigenvalues[idx].max(0.0);
            variance.push(lambda / dof);
            let singular = lambda.sqrt();
            for i in 0..rows {
                scores[[i, k]] = eigen.eigenvectors[(i, idx)] * singular;
            }
        }
    }
    PcaProjection { scores, variance }
}

// nalgebra doesn't guarantee eigenvalue order
fn descending_order(eigenvalues: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardize_columns() {
        let m = array![[1.0, 5.0], [3.0, 5.0], [5.0, 5.0]];
        let s = standardize_columns(&m);
        let col0 = s.column(0);
        assert!((col0.sum()).abs() < 1e-12);
        let var = col0.iter().map(|x| x * x).sum::<f64>() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
        // constant column collapses to zero
        assert!(s.column(1).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_pca_dominant_axis() {
        // Points spread along (1, 1) with a little noise along (1, -1).
        let m = array![
            [-2.0, -2.1],
            [-1.0, -0.9],
            [0.0, 0.1],
            [1.0, 0.9],
            [2.0, 2.1],
        ];
        let proj = pca(&m, 20);
        assert_eq!(proj.scores.dim(), (5, 2));
        assert!(proj.variance[0] > 10.0 * proj.variance[1]);
        // Scores along the first component are monotone in the input order.
        let first: Vec<f64> = proj.scores.column(0).to_vec();
        let increasing = first.windows(2).all(|w| w[0] < w[1]);
        let decreasing = first.windows(2).all(|w| w[0] > w[1]);
        assert!(increasing || decreasing);
    }

    #[test]
    fn test_pca_wide_matrix_keeps_distances() {
        // More features than observations goes through the Gram matrix.
        let wide = array![
            [1.0, 0.0, 2.0, 1.0, 0.5],
            [0.0, 1.0, 1.0, 3.0, 0.0],
            [2.0, 2.0, 0.0, 1.0, 1.5],
        ];
        let proj = pca(&wide, 20);
        assert_eq!(proj.scores.dim(), (3, 3));
        // Scores keep the pairwise distances of the centered rows.
        let d_scores: f64 = (&proj.scores.row(0) - &proj.scores.row(1))
            .iter()
            .map(|x| x * x)
            .sum();
        let d_input: f64 = (&wide.row(0) - &wide.row(1)).iter().map(|x| x * x).sum();
        assert!((d_scores - d_input).abs() < 1e-8);
    }
}
