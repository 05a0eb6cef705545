use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::database::{Association, Database, InMemoryDatabase, ObjectId};
use crate::dependency::CorrelationModel;
use crate::label::{ClassLabel, LabelType};
use crate::KddError;

/// Name of the group collecting objects no cluster claimed.
pub const NOISE: &str = "noise";

/// Named group of object ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    name: String,
    ids: Vec<ObjectId>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, ids: Vec<ObjectId>) -> Self {
        Self {
            name: name.into(),
            ids,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_noise(&self) -> bool {
        self.name == NOISE
    }
}

/// Partition of a database into clusters, optionally annotated with one model
/// of type `M` per cluster label.
#[derive(Debug, Clone)]
pub struct ClusteringResult<M = CorrelationModel> {
    clusters: Vec<Cluster>,
    models: BTreeMap<ClassLabel, M>,
}

impl<M> ClusteringResult<M> {
    /// Wrap `clusters` after checking that they partition `database`: every
    /// stored id appears in exactly one cluster and cluster names are unique.
    pub fn new(clusters: Vec<Cluster>, database: &dyn Database) -> Result<Self, KddError> {
        let mut names = HashSet::with_capacity(clusters.len());
        let mut seen = HashSet::with_capacity(database.size());
        for cluster in &clusters {
            if !names.insert(cluster.name()) {
                return Err(KddError::Precondition("cluster names must be unique"));
            }
            for &id in cluster.ids() {
                database.get(id)?;
                if !seen.insert(id) {
                    return Err(KddError::Precondition("clusters must be disjoint"));
                }
            }
        }
        if seen.len() != database.size() {
            return Err(KddError::Precondition(
                "clusters must cover every object of the database",
            ));
        }
        Ok(Self {
            clusters,
            models: BTreeMap::new(),
        })
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of groups, the noise group included.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Same clusters, ready to hold models of another type. Models attached
    /// so far are dropped.
    pub fn into_model_type<N>(self) -> ClusteringResult<N> {
        ClusteringResult {
            clusters: self.clusters,
            models: BTreeMap::new(),
        }
    }

    /// Copy of `database` in which every object carries its cluster's label as
    /// class association.
    pub fn label_projection(
        &self,
        database: &dyn Database,
        label_type: LabelType,
    ) -> Result<InMemoryDatabase, KddError> {
        let mut projection = InMemoryDatabase::subset(database, &database.ids())?;
        for cluster in &self.clusters {
            let label = label_type.label(cluster.name());
            for &id in cluster.ids() {
                projection.associate(id, Association::Class(label.clone()))?;
            }
        }
        Ok(projection)
    }

    /// One database per cluster, keyed by cluster label in ascending order.
    /// Members keep their ids and carry their cluster's label as class
    /// association.
    pub fn partition(
        &self,
        database: &dyn Database,
        label_type: LabelType,
    ) -> Result<BTreeMap<ClassLabel, InMemoryDatabase>, KddError> {
        let mut partitions = BTreeMap::new();
        for cluster in &self.clusters {
            let label = label_type.label(cluster.name());
            let mut members = InMemoryDatabase::subset(database, cluster.ids())?;
            for &id in cluster.ids() {
                members.associate(id, Association::Class(label.clone()))?;
            }
            partitions.insert(label, members);
        }
        Ok(partitions)
    }

    /// Attach `model` to the cluster with `label`, replacing an earlier model.
    pub fn append_model(&mut self, label: ClassLabel, model: M) {
        self.models.insert(label, model);
    }

    pub fn model(&self, label: &ClassLabel) -> Option<&M> {
        self.models.get(label)
    }

    /// Attached models in ascending label order.
    pub fn models(&self) -> &BTreeMap<ClassLabel, M> {
        &self.models
    }
}

impl<M: fmt::Display> fmt::Display for ClusteringResult<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cluster in &self.clusters {
            writeln!(f, "{} ({} objects)", cluster.name(), cluster.size())?;
            if let Some((_, model)) = self
                .models
                .iter()
                .find(|(label, _)| label.name() == cluster.name())
            {
                for line in model.to_string().lines() {
                    writeln!(f, "  {line}")?;
                }
            }
        }
        Ok(())
    }
}
