//! Clustering strategies
//!
//! Every strategy partitions a database into named, disjoint and exhaustive
//! groups wrapped in a [`ClusteringResult`]:
//! - DBSCAN: density-connected regions under the Euclidean distance
//! - k-means: k-means++ seeded Lloyd iterations
//! - COPAC: partition by local correlation dimensionality, then DBSCAN

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::KddError;

pub mod copac;
pub mod dbscan;
pub mod kmeans;
pub mod result;

pub use copac::{Copac, CopacConfig};
pub use dbscan::{Dbscan, DbscanConfig};
pub use kmeans::{KMeans, KMeansConfig};
pub use result::{Cluster, ClusteringResult, NOISE};

/// A clustering algorithm usable by the correlation meta-algorithm.
pub trait Clustering {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// Check the configuration without touching any data.
    fn validate(&self) -> Result<(), KddError> {
        Ok(())
    }

    /// Partition all objects of `database`. Strategies may store intermediate
    /// results as associations.
    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError>;
}

/// Closed set of clustering strategies, resolvable by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum ClusteringAlgorithm {
    Dbscan(Dbscan),
    #[serde(rename = "kmeans")]
    KMeans(KMeans),
    Copac(Copac),
}

impl Default for ClusteringAlgorithm {
    fn default() -> Self {
        ClusteringAlgorithm::Copac(Copac::default())
    }
}

impl FromStr for ClusteringAlgorithm {
    type Err = KddError;

    /// Resolve a strategy with its default configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dbscan" => Ok(ClusteringAlgorithm::Dbscan(Dbscan::default())),
            "kmeans" | "k-means" => Ok(ClusteringAlgorithm::KMeans(KMeans::default())),
            "copac" => Ok(ClusteringAlgorithm::Copac(Copac::default())),
            _ => Err(KddError::UnknownStrategy {
                role: "clustering algorithm",
                name: s.to_owned(),
            }),
        }
    }
}

impl Clustering for ClusteringAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            ClusteringAlgorithm::Dbscan(algorithm) => algorithm.name(),
            ClusteringAlgorithm::KMeans(algorithm) => algorithm.name(),
            ClusteringAlgorithm::Copac(algorithm) => algorithm.name(),
        }
    }

    fn validate(&self) -> Result<(), KddError> {
        match self {
            ClusteringAlgorithm::Dbscan(algorithm) => algorithm.validate(),
            ClusteringAlgorithm::KMeans(algorithm) => algorithm.validate(),
            ClusteringAlgorithm::Copac(algorithm) => algorithm.validate(),
        }
    }

    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError> {
        match self {
            ClusteringAlgorithm::Dbscan(algorithm) => algorithm.run(database),
            ClusteringAlgorithm::KMeans(algorithm) => algorithm.run(database),
            ClusteringAlgorithm::Copac(algorithm) => algorithm.run(database),
        }
    }
}
