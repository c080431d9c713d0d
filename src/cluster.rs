//! K-means partitioning of the feature space.
//!
//! Seeding is k-means++ driven by a `ChaCha8Rng`, so a fixed seed reproduces
//! the same assignments on every platform. Lloyd iterations assign each point
//! to its nearest centroid (ties go to the lower cluster id) and move each
//! centroid to the mean of its points. A cluster that loses all of its points
//! keeps its previous centroid and stays empty.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::error::FitError;
use crate::vectorize::{FeatureMatrix, SparseVector};

/// Fails unless `1 <= k <= points`.
///
/// # Errors
/// Returns `FitError::InvalidClusterCount`.
pub fn check_cluster_count(k: usize, points: usize) -> Result<(), FitError> {
    if k == 0 || k > points {
        return Err(FitError::InvalidClusterCount {
            requested: k,
            points,
        });
    }
    Ok(())
}

/// K-means parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub k: usize,
    /// Lloyd iteration cap.
    pub max_iterations: usize,
    /// Seeded restarts; the lowest inertia wins.
    pub n_init: usize,
    /// Total squared centroid shift at or below which iteration stops.
    pub tolerance: f64,
    /// RNG seed for k-means++.
    pub seed: u64,
}

impl From<&SelectionConfig> for KMeansConfig {
    fn from(cfg: &SelectionConfig) -> Self {
        Self {
            k: cfg.cluster_count,
            max_iterations: cfg.max_iterations,
            n_init: cfg.n_init,
            tolerance: cfg.tolerance,
            seed: cfg.random_seed,
        }
    }
}

/// A partition cell with its members in ascending street index order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Cluster id in `0..k`.
    pub cluster_id: usize,
    /// Mean of the members (or the last centroid if the cluster is empty).
    pub centroid: Vec<f64>,
    /// Street indices assigned to this cluster.
    pub members: Vec<usize>,
}

impl Cluster {
    /// Returns true if no street was assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
    /// Cluster id per street index.
    pub assignments: Vec<usize>,
    /// Final centroids, one per cluster id.
    pub centroids: Vec<Vec<f64>>,
    /// Lloyd iterations run by the winning restart.
    pub iterations: usize,
    /// Whether the winning restart stopped before the iteration cap.
    pub converged: bool,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
}

impl ClusterModel {
    /// Number of clusters.
    #[must_use]
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Clusters in id order, including empty ones.
    #[must_use]
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.k()];
        for (point, &cluster) in self.assignments.iter().enumerate() {
            members[cluster].push(point);
        }
        members
            .into_iter()
            .enumerate()
            .map(|(cluster_id, members)| Cluster {
                cluster_id,
                centroid: self.centroids[cluster_id].clone(),
                members,
            })
            .collect()
    }

    /// Number of clusters with no members.
    #[must_use]
    pub fn empty_clusters(&self) -> usize {
        let mut seen = vec![false; self.k()];
        for &c in &self.assignments {
            seen[c] = true;
        }
        seen.iter().filter(|s| !**s).count()
    }
}

/// Seeded k-means clusterer.
#[derive(Debug, Clone)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    /// Creates a clusterer.
    #[must_use]
    pub const fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    /// Partitions the rows of `matrix` into exactly `k` clusters.
    ///
    /// # Errors
    /// Returns `FitError::InvalidClusterCount` if `k == 0` or `k` exceeds the
    /// number of rows.
    pub fn fit(&self, matrix: &FeatureMatrix) -> Result<ClusterModel, FitError> {
        check_cluster_count(self.config.k, matrix.len())?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut best: Option<ClusterModel> = None;
        for _ in 0..self.config.n_init.max(1) {
            let seeds = kmeans_plus_plus(matrix, self.config.k, &mut rng);
            let model = self.lloyd(matrix, seeds);
            if best.as_ref().map_or(true, |b| model.inertia < b.inertia) {
                best = Some(model);
            }
        }

        best.ok_or(FitError::InvalidClusterCount {
            requested: self.config.k,
            points: matrix.len(),
        })
    }

    fn lloyd(&self, matrix: &FeatureMatrix, mut centroids: Vec<Vec<f64>>) -> ClusterModel {
        let rows = matrix.rows();
        let mut assignments = vec![usize::MAX; rows.len()];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let norms: Vec<f64> = centroids.iter().map(|c| squared_norm(c)).collect();

            let mut changed = false;
            for (i, row) in rows.iter().enumerate() {
                let (nearest, _) = nearest_centroid(row, &centroids, &norms);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                converged = true;
                break;
            }

            let shift = update_centroids(matrix, &assignments, &mut centroids);
            if shift <= self.config.tolerance {
                converged = true;
                break;
            }
        }

        let inertia = rows
            .iter()
            .zip(&assignments)
            .map(|(row, &c)| row.squared_distance(&centroids[c], squared_norm(&centroids[c])))
            .sum();

        ClusterModel {
            assignments,
            centroids,
            iterations,
            converged,
            inertia,
        }
    }
}

fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

fn nearest_centroid(row: &SparseVector, centroids: &[Vec<f64>], norms: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = row.squared_distance(centroid, norms[c]);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// Moves centroids to member means; returns the total squared shift.
fn update_centroids(
    matrix: &FeatureMatrix,
    assignments: &[usize],
    centroids: &mut [Vec<f64>],
) -> f64 {
    let dim = matrix.dim();
    let mut sums = vec![vec![0.0; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];
    for (row, &c) in matrix.rows().iter().zip(assignments) {
        row.add_to(&mut sums[c]);
        counts[c] += 1;
    }

    let mut shift = 0.0;
    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let inv = 1.0 / count as f64;
        for (old, s) in centroid.iter_mut().zip(sum) {
            let new = s * inv;
            shift += (new - *old) * (new - *old);
            *old = new;
        }
    }
    shift
}

/// k-means++ seeding: first centroid uniform, the rest sampled by D².
fn kmeans_plus_plus(matrix: &FeatureMatrix, k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let rows = matrix.rows();
    let dim = matrix.dim();
    let mut centroids = Vec::with_capacity(k);

    let first = rng.gen_range(0..rows.len());
    centroids.push(rows[first].to_dense(dim));

    let mut min_distances: Vec<f64> = {
        let c = &centroids[0];
        let n = squared_norm(c);
        rows.iter().map(|r| r.squared_distance(c, n)).collect()
    };

    while centroids.len() < k {
        let total: f64 = min_distances.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = None;
            let mut last_positive = 0;
            for (i, d) in min_distances.iter().enumerate() {
                if *d <= 0.0 {
                    continue;
                }
                last_positive = i;
                acc += d;
                if acc >= target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave `acc` just short of `target`.
            pick.unwrap_or(last_positive)
        } else {
            // Every point already coincides with a centroid.
            rng.gen_range(0..rows.len())
        };

        let centroid = rows[next].to_dense(dim);
        let n = squared_norm(&centroid);
        for (i, row) in rows.iter().enumerate() {
            let d = row.squared_distance(&centroid, n);
            if d < min_distances[i] {
                min_distances[i] = d;
            }
        }
        centroids.push(centroid);
    }

    centroids
}
