//! Lloyd's k-means with k-means++ seeding.
//! It runs several times and keeps the lowest inertia.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// K-means settings.
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    /// Number of clusters.
    pub num_clusters: usize,
    /// Number of independently seeded restarts.
    pub restarts: usize,
    /// Lloyd iterations per restart.
    pub max_iterations: usize,
    /// Stop a restart once the total squared center shift falls below this.
    pub tolerance: f64,
}

impl KMeans {
    /// K-means with `num_clusters` clusters and default iteration settings.
    pub fn new(num_clusters: usize) -> Self {
        KMeans {
            num_clusters,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-8,
        }
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster index for every row of the input.
    pub labels: Vec<usize>,
    /// Cluster centers, one row per cluster.
    pub centers: Array2<f64>,
    /// Sum of squared distances of every row to its center.
    pub inertia: f64,
}

impl KMeans {
    /// Cluster the rows of `data`. Returns `None` when there are fewer rows than clusters.
    pub fn fit<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> Option<KMeansFit> {
        if self.num_clusters == 0 || data.nrows() < self.num_clusters {
            return None;
        }
        let mut best: Option<KMeansFit> = None;
        for _ in 0..self.restarts.max(1) {
            let fit = self.lloyd(data, rng);
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        best
    }

    fn lloyd<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> KMeansFit {
        let k = self.num_clusters;
        let mut centers = plus_plus_centers(data, k, rng);
        let mut labels = vec![0; data.nrows()];
        let mut distances = vec![0.0; data.nrows()];

        for _ in 0..self.max_iterations {
            for (i, row) in data.axis_iter(Axis(0)).enumerate() {
                let (label, dist) = nearest(row, &centers);
                labels[i] = label;
                distances[i] = dist;
            }

            let mut next = Array2::zeros(centers.dim());
            let mut counts = vec![0usize; k];
            for (row, &label) in data.axis_iter(Axis(0)).zip(&labels) {
                let mut center = next.row_mut(label);
                center += &row;
                counts[label] += 1;
            }
            for (cluster, &count) in counts.iter().enumerate() {
                if count > 0 {
                    next.row_mut(cluster).mapv_inplace(|x| x / count as f64);
                } else {
                    // Reseed an empty cluster on the point farthest from its center.
                    let far = argmax(&distances);
                    next.row_mut(cluster).assign(&data.row(far));
                    distances[far] = 0.0;
                }
            }

            let shift: f64 = (&next - &centers).iter().map(|x| x * x).sum();
            centers = next;
            if shift <= self.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let (label, dist) = nearest(row, &centers);
            labels[i] = label;
            inertia += dist;
        }
        KMeansFit {
            labels,
            centers,
            inertia,
        }
    }
}

fn plus_plus_centers<R: Rng>(data: ArrayView2<'_, f64>, k: usize, rng: &mut R) -> Array2<f64> {
    let n = data.nrows();
    let mut centers = Array2::zeros((k, data.ncols()));
    centers.row_mut(0).assign(&data.row(rng.gen_range(0..n)));
    let mut d2: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|row| squared_distance(row, centers.row(0)))
        .collect();
    for c in 1..k {
        // All points coincide with a center: fall back to a uniform pick.
        let pick = match WeightedIndex::new(&d2) {
            Ok(weights) => weights.sample(rng),
            Err(_) => rng.gen_range(0..n),
        };
        centers.row_mut(c).assign(&data.row(pick));
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            d2[i] = d2[i].min(squared_distance(row, centers.row(c)));
        }
    }
    centers
}

fn nearest(row: ArrayView1<'_, f64>, centers: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.axis_iter(Axis(0)).enumerate() {
        let d = squared_distance(row, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::arbitrary::any;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use proptest::{prop_assert, prop_assert_eq, proptest};
    use rand_distr::Normal;

    fn blobs(rng: &mut Xoshiro256StarStar, per_cluster: usize) -> Array2<f64> {
        let means = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let noise = Normal::new(0.0, 0.5).unwrap();
        let mut data = Array2::zeros((means.len() * per_cluster, 2));
        for (m, &(x, y)) in means.iter().enumerate() {
            for i in 0..per_cluster {
                let row = m * per_cluster + i;
                data[[row, 0]] = x + noise.sample(rng);
                data[[row, 1]] = y + noise.sample(rng);
            }
        }
        data
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(239);
        let per_cluster = 40;
        let data = blobs(&mut rng, per_cluster);
        let fit = KMeans::new(3).fit(data.view(), &mut rng).unwrap();
        for chunk in fit.labels.chunks(per_cluster) {
            assert!(chunk.iter().all(|&l| l == chunk[0]));
        }
        let mut firsts: Vec<usize> = fit.labels.chunks(per_cluster).map(|c| c[0]).collect();
        firsts.sort_unstable();
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn test_kmeans_too_few_rows() {
        let data = Array2::<f64>::zeros((2, 3));
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        assert!(KMeans::new(3).fit(data.view(), &mut rng).is_none());
    }

    #[test]
    fn test_kmeans_identical_points() {
        let data = Array2::<f64>::ones((5, 2));
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        let fit = KMeans::new(2).fit(data.view(), &mut rng).unwrap();
        assert_eq!(fit.labels.len(), 5);
        assert_eq!(fit.inertia, 0.0);
    }

    proptest! {
        #[test]
        fn prop_test_kmeans_labels_in_range(
            rows in 1usize..40usize,
            k in 1usize..5usize,
            seed in any::<u64>(),
        ) {
            let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
            let data = Array2::from_shape_fn((rows, 3), |_| rng.gen::<f64>());
            let fit = KMeans::new(k)
                .fit(data.view(), &mut Xoshiro256StarStar::seed_from_u64(seed));
            if rows < k {
                prop_assert!(fit.is_none());
            } else {
                let fit = fit.unwrap();
                prop_assert_eq!(fit.labels.len(), rows);
                prop_assert!(fit.labels.iter().all(|&l| l < k));
                prop_assert!(fit.inertia >= 0.0);
                // Repeatability
                let again = KMeans::new(k)
                    .fit(data.view(), &mut Xoshiro256StarStar::seed_from_u64(seed))
                    .unwrap();
                prop_assert_eq!(fit.labels, again.labels);
            }
        }
    }
}
