use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::clustering::{Cluster, Clustering, ClusteringResult, Dbscan, DbscanConfig, NOISE};
use crate::database::{Association, Database, InMemoryDatabase, ObjectId, RealVector};
use crate::distance::{DistanceFunction, EuclideanDistance};
use crate::pca::pca;
use crate::progress::Progress;
use crate::KddError;

/// COPAC parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopacConfig {
    /// Neighborhood size of the local PCA. `None` resolves to three times the
    /// dimensionality of the data at run start.
    pub k: Option<usize>,
    /// Share of the local variance the strong eigenvectors have to explain.
    pub alpha: f64,
    /// DBSCAN parameters applied inside every dimensionality partition.
    pub dbscan: DbscanConfig,
}

impl CopacConfig {
    pub fn validate(&self) -> Result<(), KddError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(KddError::InvalidParameter {
                name: "alpha",
                value: self.alpha.to_string(),
                reason: "must lie in (0, 1]",
            });
        }
        if self.k == Some(0) {
            return Err(KddError::InvalidParameter {
                name: "k",
                value: "0".to_owned(),
                reason: "must be a positive integer",
            });
        }
        self.dbscan.validate()
    }
}

impl Default for CopacConfig {
    fn default() -> Self {
        Self {
            k: None,
            alpha: 0.85,
            dbscan: DbscanConfig::default(),
        }
    }
}

/// Correlation partitioning: objects are grouped by the dimensionality of
/// their local neighborhood, then every group is clustered with DBSCAN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Copac {
    config: CopacConfig,
}

impl Copac {
    pub fn new(config: CopacConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CopacConfig {
        &self.config
    }

    fn local_dimensionality(
        &self,
        database: &dyn Database,
        id: ObjectId,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<usize, KddError> {
        let neighbors = database.knn_query_for_id(id, k, distance)?;
        let vectors = neighbors
            .iter()
            .map(|neighbor| database.get(neighbor.id))
            .collect::<Result<Vec<&RealVector>, KddError>>()?;
        let dimensionality = pca(&vectors).strong_count(self.config.alpha);
        trace!(id, dimensionality, "local correlation dimensionality");
        Ok(dimensionality)
    }
}

impl Clustering for Copac {
    fn name(&self) -> &'static str {
        "COPAC"
    }

    fn validate(&self) -> Result<(), KddError> {
        self.config.validate()
    }

    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError> {
        let Some(dim) = database.dimensionality() else {
            return ClusteringResult::new(Vec::new(), &*database);
        };
        let start = Instant::now();
        let k = self.config.k.unwrap_or(3 * dim).max(1);
        let mut distance = EuclideanDistance;
        distance.bind(&*database)?;

        let ids = database.ids();
        let mut partitions: BTreeMap<usize, Vec<ObjectId>> = BTreeMap::new();
        let mut progress = Progress::new("Local correlation dimensionality", ids.len());
        for id in ids {
            let dimensionality = self.local_dimensionality(&*database, id, k, &distance)?;
            database.associate(id, Association::LocalDimensionality(dimensionality))?;
            partitions.entry(dimensionality).or_default().push(id);
            if progress.advance() {
                debug!("{progress}");
            }
        }

        let dbscan = Dbscan::new(self.config.dbscan.clone())?;
        let mut clusters = Vec::new();
        let mut noise = Vec::new();
        for (dimensionality, members) in &partitions {
            let partition = InMemoryDatabase::subset(&*database, members)?;
            let (groups, partition_noise) = dbscan.density_clusters(&partition)?;
            debug!(
                dimensionality,
                objects = members.len(),
                clusters = groups.len(),
                noise = partition_noise.len(),
                "partition clustered"
            );
            clusters.extend(groups.into_iter().enumerate().map(|(index, ids)| {
                Cluster::new(format!("cluster.{dimensionality}.{}", index + 1), ids)
            }));
            noise.extend(partition_noise);
        }
        if !noise.is_empty() {
            clusters.push(Cluster::new(NOISE, noise));
        }

        info!(
            k,
            alpha = self.config.alpha,
            partitions = partitions.len(),
            clusters = clusters.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "COPAC finished"
        );
        ClusteringResult::new(clusters, &*database)
    }
}
