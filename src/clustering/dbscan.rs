use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clustering::{Cluster, Clustering, ClusteringResult, NOISE};
use crate::database::{Database, ObjectId};
use crate::distance::EuclideanDistance;
use crate::KddError;

/// DBSCAN parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbscanConfig {
    /// Radius of the neighborhood, inclusive.
    pub epsilon: f64,
    /// Minimum neighborhood size (the object itself included) of a core object.
    pub min_pts: usize,
}

impl DbscanConfig {
    pub fn new(epsilon: f64, min_pts: usize) -> Self {
        Self { epsilon, min_pts }
    }

    pub fn validate(&self) -> Result<(), KddError> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(KddError::InvalidParameter {
                name: "epsilon",
                value: self.epsilon.to_string(),
                reason: "must be a positive number",
            });
        }
        if self.min_pts == 0 {
            return Err(KddError::InvalidParameter {
                name: "min_pts",
                value: self.min_pts.to_string(),
                reason: "must be a positive integer",
            });
        }
        Ok(())
    }
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.5,
            min_pts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Noise,
    Member(usize),
}

/// Density-based clustering under the Euclidean distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dbscan {
    config: DbscanConfig,
}

impl Dbscan {
    pub fn new(config: DbscanConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DbscanConfig {
        &self.config
    }

    /// Density-connected groups of `database` in discovery order, plus the ids
    /// of all noise objects. Both keep the database's iteration order.
    pub(crate) fn density_clusters(
        &self,
        database: &dyn Database,
    ) -> Result<(Vec<Vec<ObjectId>>, Vec<ObjectId>), KddError> {
        let distance = EuclideanDistance;
        let ids = database.ids();
        let mut states: HashMap<ObjectId, State> = HashMap::with_capacity(ids.len());
        let mut cluster_count = 0usize;

        for &id in &ids {
            if states.contains_key(&id) {
                continue;
            }
            let neighbors = database.range_query_for_id(id, self.config.epsilon, &distance)?;
            if neighbors.len() < self.config.min_pts {
                states.insert(id, State::Noise);
                continue;
            }

            let cluster = cluster_count;
            cluster_count += 1;
            states.insert(id, State::Member(cluster));
            let mut seeds: VecDeque<ObjectId> = neighbors.iter().map(|n| n.id).collect();
            while let Some(seed) = seeds.pop_front() {
                match states.get(&seed).copied() {
                    Some(State::Member(_)) => continue,
                    // Former noise becomes a border object; it is not expanded.
                    Some(State::Noise) => {
                        states.insert(seed, State::Member(cluster));
                        continue;
                    }
                    None => {}
                }
                states.insert(seed, State::Member(cluster));
                let reachable =
                    database.range_query_for_id(seed, self.config.epsilon, &distance)?;
                if reachable.len() >= self.config.min_pts {
                    seeds.extend(reachable.iter().map(|n| n.id).filter(|candidate| {
                        !matches!(states.get(candidate), Some(State::Member(_)))
                    }));
                }
            }
        }

        let mut clusters = vec![Vec::new(); cluster_count];
        let mut noise = Vec::new();
        for id in ids {
            match states[&id] {
                State::Member(cluster) => clusters[cluster].push(id),
                State::Noise => noise.push(id),
            }
        }
        Ok((clusters, noise))
    }
}

impl Clustering for Dbscan {
    fn name(&self) -> &'static str {
        "DBSCAN"
    }

    fn validate(&self) -> Result<(), KddError> {
        self.config.validate()
    }

    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError> {
        let (groups, noise) = self.density_clusters(&*database)?;
        debug!(
            epsilon = self.config.epsilon,
            min_pts = self.config.min_pts,
            clusters = groups.len(),
            noise = noise.len(),
            "DBSCAN finished"
        );

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .enumerate()
            .map(|(index, ids)| Cluster::new(format!("cluster.{}", index + 1), ids))
            .collect();
        if !noise.is_empty() {
            clusters.push(Cluster::new(NOISE, noise));
        }
        ClusteringResult::new(clusters, &*database)
    }
}
