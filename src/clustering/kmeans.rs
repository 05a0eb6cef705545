use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clustering::{Cluster, Clustering, ClusteringResult};
use crate::database::{Database, RealVector};
use crate::math::l2_distance_sqr;
use crate::KddError;

/// k-means parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Number of centroids.
    pub k: usize,
    pub max_iterations: usize,
    /// Seed of the k-means++ initialisation.
    pub seed: u64,
}

impl KMeansConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), KddError> {
        if self.k == 0 {
            return Err(KddError::InvalidParameter {
                name: "k",
                value: self.k.to_string(),
                reason: "must be a positive integer",
            });
        }
        if self.max_iterations == 0 {
            return Err(KddError::InvalidParameter {
                name: "max_iterations",
                value: self.max_iterations.to_string(),
                reason: "must be a positive integer",
            });
        }
        Ok(())
    }
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 2,
            max_iterations: 100,
            seed: 42,
        }
    }
}

/// Lloyd iterations from a k-means++ initialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

impl Clustering for KMeans {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn validate(&self) -> Result<(), KddError> {
        self.config.validate()
    }

    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError> {
        self.config.validate()?;
        let ids = database.ids();
        if ids.is_empty() {
            return ClusteringResult::new(Vec::new(), &*database);
        }
        if self.config.k > ids.len() {
            return Err(KddError::Precondition(
                "k-means needs at least k objects in the database",
            ));
        }
        let data = ids
            .iter()
            .map(|&id| database.get(id))
            .collect::<Result<Vec<&RealVector>, KddError>>()?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut centroids = initialise_plus_plus(&data, self.config.k, &mut rng);
        // usize::MAX marks objects not assigned yet.
        let mut assignments = vec![usize::MAX; data.len()];
        let mut iterations = 0usize;

        for _ in 0..self.config.max_iterations {
            iterations += 1;
            let mut changed = 0usize;
            for (vector, assignment) in data.iter().zip(assignments.iter_mut()) {
                let (best, _) = nearest_centroid(vector.values(), &centroids);
                if *assignment != best {
                    *assignment = best;
                    changed += 1;
                }
            }
            if changed == 0 {
                break;
            }
            recompute_centroids(&data, &assignments, &mut centroids, &mut rng);
        }
        debug!(k = self.config.k, iterations, "k-means converged");

        let mut groups = vec![Vec::new(); self.config.k];
        for (&id, &cluster) in ids.iter().zip(assignments.iter()) {
            groups[cluster].push(id);
        }
        let clusters = groups
            .into_iter()
            .filter(|members| !members.is_empty())
            .enumerate()
            .map(|(index, members)| Cluster::new(format!("cluster.{}", index + 1), members))
            .collect();
        ClusteringResult::new(clusters, &*database)
    }
}

fn initialise_plus_plus(data: &[&RealVector], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    let mut chosen = vec![false; data.len()];

    let first = rng.gen_range(0..data.len());
    centroids.push(data[first].values().to_vec());
    chosen[first] = true;

    while centroids.len() < k {
        let distances: Vec<f64> = data
            .iter()
            .map(|vector| nearest_centroid(vector.values(), &centroids).1)
            .collect();
        let dist_sum: f64 = distances.iter().sum();
        if dist_sum <= f64::EPSILON {
            // Only duplicates left, take unchosen objects in order.
            for (index, taken) in chosen.iter_mut().enumerate() {
                if centroids.len() == k {
                    break;
                }
                if !*taken {
                    *taken = true;
                    centroids.push(data[index].values().to_vec());
                }
            }
            break;
        }
        let mut target = rng.gen::<f64>() * dist_sum;
        let mut next = 0usize;
        for (index, weight) in distances.iter().enumerate() {
            target -= *weight;
            if target <= 0.0 && *weight > 0.0 {
                next = index;
                break;
            }
        }
        if chosen[next] {
            next = (0..data.len()).find(|i| !chosen[*i]).unwrap_or(next);
        }
        centroids.push(data[next].values().to_vec());
        chosen[next] = true;
    }

    centroids
}

fn nearest_centroid(vector: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best_cluster = 0usize;
    let mut best_distance = f64::MAX;
    for (cid, centroid) in centroids.iter().enumerate() {
        let dist = l2_distance_sqr(vector, centroid);
        if dist < best_distance {
            best_distance = dist;
            best_cluster = cid;
        }
    }
    (best_cluster, best_distance)
}

fn recompute_centroids(
    data: &[&RealVector],
    assignments: &[usize],
    centroids: &mut [Vec<f64>],
    rng: &mut StdRng,
) {
    let k = centroids.len();
    let dim = centroids[0].len();
    let mut sums = vec![vec![0.0f64; dim]; k];
    let mut counts = vec![0usize; k];
    for (vector, &cluster) in data.iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(vector.values()) {
            *sum += *value;
        }
    }

    for cid in 0..k {
        if counts[cid] == 0 {
            let idx = rng.gen_range(0..data.len());
            centroids[cid] = data[idx].values().to_vec();
        } else {
            let inv = 1.0 / counts[cid] as f64;
            for d in 0..dim {
                centroids[cid][d] = sums[cid][d] * inv;
            }
        }
    }
}
