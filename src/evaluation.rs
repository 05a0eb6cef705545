//! Supervised evaluation of class-labeled databases.
//!
//! [`ClassifierEvaluation`] cross-validates a [`KnnClassifier`] on the class
//! associations of a database and reports a [`ConfusionMatrix`].

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{Classifier, KnnClassifier};
use crate::database::{Database, InMemoryDatabase, ObjectId};
use crate::label::ClassLabel;
use crate::KddError;

/// Cross-validation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Neighbors consulted by the classifier.
    pub k: usize,
    /// Number of folds, capped at the number of objects.
    pub folds: usize,
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), KddError> {
        if self.k == 0 {
            return Err(KddError::InvalidParameter {
                name: "k",
                value: self.k.to_string(),
                reason: "must be a positive integer",
            });
        }
        if self.folds == 0 {
            return Err(KddError::InvalidParameter {
                name: "folds",
                value: self.folds.to_string(),
                reason: "must be a positive integer",
            });
        }
        Ok(())
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { k: 1, folds: 10 }
    }
}

/// Counts of actual versus predicted classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: Vec<ClassLabel>,
    /// `counts[actual][predicted]`
    counts: Vec<Vec<usize>>,
    unclassified: usize,
}

impl ConfusionMatrix {
    /// Empty matrix over `labels`, which must be sorted and unique.
    pub fn new(labels: Vec<ClassLabel>) -> Self {
        let n = labels.len();
        Self {
            labels,
            counts: vec![vec![0; n]; n],
            unclassified: 0,
        }
    }

    pub fn labels(&self) -> &[ClassLabel] {
        &self.labels
    }

    pub fn count(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual][predicted]
    }

    /// Objects the classifier gave no prediction for.
    pub fn unclassified(&self) -> usize {
        self.unclassified
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum::<usize>() + self.unclassified
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Share of correctly classified objects, zero for an empty matrix.
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }

    fn record(
        &mut self,
        actual: &ClassLabel,
        predicted: Option<&ClassLabel>,
    ) -> Result<(), KddError> {
        let Some(predicted) = predicted else {
            self.unclassified += 1;
            return Ok(());
        };
        let index = |label: &ClassLabel| {
            self.labels
                .binary_search(label)
                .map_err(|_| KddError::Precondition("label is not part of the confusion matrix"))
        };
        let (actual, predicted) = (index(actual)?, index(predicted)?);
        self.counts[actual][predicted] += 1;
        Ok(())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actual \\ predicted")?;
        for label in &self.labels {
            write!(f, "\t{label}")?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{label}")?;
            for count in row {
                write!(f, "\t{count}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "unclassified\t{}", self.unclassified)
    }
}

/// Outcome of a cross-validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub matrix: ConfusionMatrix,
    /// Folds actually used.
    pub folds: usize,
    pub k: usize,
}

impl EvaluationResult {
    pub fn accuracy(&self) -> f64 {
        self.matrix.accuracy()
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}-fold cross-validation of kNN (k = {}): accuracy {:.4}",
            self.folds,
            self.k,
            self.accuracy()
        )?;
        write!(f, "{}", self.matrix)
    }
}

/// Evaluates the class associations of a database.
pub trait Evaluating {
    /// Check the configuration without touching any data.
    fn validate(&self) -> Result<(), KddError> {
        Ok(())
    }

    fn run(&self, database: &dyn Database) -> Result<EvaluationResult, KddError>;
}

/// Deterministic k-fold cross-validation of a kNN classifier.
///
/// The object at iteration position `i` is held out in fold `i % folds`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierEvaluation {
    config: EvaluationConfig,
}

impl ClassifierEvaluation {
    pub fn new(config: EvaluationConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }
}

impl Evaluating for ClassifierEvaluation {
    fn validate(&self) -> Result<(), KddError> {
        self.config.validate()
    }

    fn run(&self, database: &dyn Database) -> Result<EvaluationResult, KddError> {
        let ids = database.ids();
        if ids.is_empty() {
            return Err(KddError::Precondition("evaluation needs at least one object"));
        }
        let mut labels = ids
            .iter()
            .map(|&id| database.class_label(id).cloned())
            .collect::<Result<Vec<_>, KddError>>()?;
        labels.sort();
        labels.dedup();

        let start = Instant::now();
        let folds = self.config.folds.min(ids.len());
        let mut matrix = ConfusionMatrix::new(labels.clone());
        for fold in 0..folds {
            let (held_out, training): (Vec<(usize, ObjectId)>, Vec<(usize, ObjectId)>) = ids
                .iter()
                .copied()
                .enumerate()
                .partition(|(position, _)| position % folds == fold);
            let training_ids: Vec<ObjectId> = training.into_iter().map(|(_, id)| id).collect();
            let training_set = InMemoryDatabase::subset(database, &training_ids)?;

            let mut classifier = KnnClassifier::new(self.config.k)?;
            classifier.build_classifier(&training_set, &labels)?;
            for (_, id) in &held_out {
                let predicted = classifier.classify(database.get(*id)?)?;
                matrix.record(database.class_label(*id)?, predicted.as_ref())?;
            }
            debug!(
                fold,
                held_out = held_out.len(),
                training = training_ids.len(),
                "fold evaluated"
            );
        }

        info!(
            folds,
            k = self.config.k,
            accuracy = matrix.accuracy(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cross-validation finished"
        );
        Ok(EvaluationResult {
            matrix,
            folds,
            k: self.config.k,
        })
    }
}
