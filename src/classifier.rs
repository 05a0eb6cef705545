//! Lazy k-nearest-neighbor classification.

use tracing::trace;

use crate::database::{Database, RealVector};
use crate::distance::{DistanceFunction, EuclideanDistance};
use crate::label::ClassLabel;
use crate::KddError;

/// Relative frequency of every registered class among the neighbors of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
    probabilities: Vec<f64>,
    neighbors: usize,
}

impl ClassDistribution {
    /// Probability per registered label, in label order.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Number of neighbors the underlying query returned.
    pub fn neighbors(&self) -> usize {
        self.neighbors
    }

    /// `true` when the query returned no neighbor. All probabilities are then
    /// zero instead of the undefined `0 / 0`.
    pub fn is_degenerate(&self) -> bool {
        self.neighbors == 0
    }

    pub fn total(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Index of the most probable label; ties go to the smaller label.
    pub fn most_probable(&self) -> Option<usize> {
        if self.is_degenerate() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (index, &probability) in self.probabilities.iter().enumerate() {
            match best {
                Some((_, value)) if probability <= value => {}
                _ => best = Some((index, probability)),
            }
        }
        best.filter(|(_, value)| *value > 0.0).map(|(index, _)| index)
    }
}

/// Supervised classifier trained on the class associations of a database.
pub trait Classifier<'a> {
    /// Register the possible classes and the training database.
    fn build_classifier(
        &mut self,
        database: &'a dyn Database,
        labels: &[ClassLabel],
    ) -> Result<(), KddError>;

    /// Registered labels in ascending order.
    fn labels(&self) -> &[ClassLabel];

    fn class_distribution(&self, instance: &RealVector) -> Result<ClassDistribution, KddError>;

    /// Most probable label for `instance`, `None` when no class is supported
    /// by any neighbor.
    fn classify(&self, instance: &RealVector) -> Result<Option<ClassLabel>, KddError> {
        let distribution = self.class_distribution(instance)?;
        Ok(distribution
            .most_probable()
            .map(|index| self.labels()[index].clone()))
    }

    /// Human readable description of the learned model.
    fn model(&self) -> String;
}

/// Classifies an instance by the class distribution among its `k` nearest
/// neighbors in the training database.
///
/// Building is free: the database is only queried when a distribution is
/// requested.
pub struct KnnClassifier<'a, F = EuclideanDistance> {
    k: usize,
    distance: F,
    labels: Vec<ClassLabel>,
    database: Option<&'a dyn Database>,
}

impl<'a> KnnClassifier<'a, EuclideanDistance> {
    pub fn new(k: usize) -> Result<Self, KddError> {
        Self::with_distance(k, EuclideanDistance)
    }
}

impl<'a> Default for KnnClassifier<'a, EuclideanDistance> {
    fn default() -> Self {
        Self {
            k: 1,
            distance: EuclideanDistance,
            labels: Vec::new(),
            database: None,
        }
    }
}

impl<'a, F: DistanceFunction> KnnClassifier<'a, F> {
    pub fn with_distance(k: usize, distance: F) -> Result<Self, KddError> {
        if k == 0 {
            return Err(KddError::InvalidParameter {
                name: "k",
                value: k.to_string(),
                reason: "must be a positive integer",
            });
        }
        Ok(Self {
            k,
            distance,
            labels: Vec::new(),
            database: None,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn distribution(&self, instance: &RealVector) -> Result<ClassDistribution, KddError> {
        let database = self
            .database
            .ok_or(KddError::Precondition("classifier has not been built"))?;

        let query = database.knn_query_for_object(instance, self.k, &self.distance)?;
        let mut occurrences = vec![0usize; self.labels.len()];
        for neighbor in &query {
            let class = database.class_label(neighbor.id)?;
            // Classes unknown at build time only count towards the query size.
            if let Ok(index) = self.labels.binary_search(class) {
                occurrences[index] += 1;
            }
        }

        let probabilities = if query.is_empty() {
            vec![0.0; self.labels.len()]
        } else {
            let size = query.len() as f64;
            occurrences
                .iter()
                .map(|&count| count as f64 / size)
                .collect()
        };
        trace!(neighbors = query.len(), ?probabilities, "class distribution");

        Ok(ClassDistribution {
            probabilities,
            neighbors: query.len(),
        })
    }
}

impl<'a, F: DistanceFunction> Classifier<'a> for KnnClassifier<'a, F> {
    fn build_classifier(
        &mut self,
        database: &'a dyn Database,
        labels: &[ClassLabel],
    ) -> Result<(), KddError> {
        let mut labels = labels.to_vec();
        labels.sort();
        labels.dedup();
        self.distance.bind(database)?;
        self.labels = labels;
        self.database = Some(database);
        Ok(())
    }

    fn labels(&self) -> &[ClassLabel] {
        &self.labels
    }

    /// Any failure of the training database (unknown object, missing class
    /// association, dimension mismatch) or a call before
    /// [`build_classifier`](Classifier::build_classifier) surfaces as
    /// [`KddError::InvalidInvocation`] wrapping the original error.
    fn class_distribution(&self, instance: &RealVector) -> Result<ClassDistribution, KddError> {
        self.distribution(instance)
            .map_err(|err| KddError::InvalidInvocation(Box::new(err)))
    }

    fn model(&self) -> String {
        "lazy learner - provides no model".to_owned()
    }
}
