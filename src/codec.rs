//! Correlation derivator and classifier.
//!
//! [`Codec`] clusters a database and then either validates the clustering by
//! cross-validating a classifier on the cluster labels, or derives one linear
//! dependency model per cluster.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clustering::{Clustering, ClusteringAlgorithm, ClusteringResult};
use crate::database::Database;
use crate::dependency::{
    CorrelationModel, DependencyDerivator, DependencyDeriving, DerivatorConfig,
};
use crate::evaluation::{ClassifierEvaluation, EvaluationConfig, EvaluationResult, Evaluating};
use crate::label::LabelType;
use crate::KddError;

/// Configuration of a [`Codec`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Evaluate the clustering as a classifier instead of deriving dependencies.
    pub evaluate_as_classifier: bool,
    /// Label type applied to cluster names.
    pub label_type: LabelType,
    pub clustering: ClusteringAlgorithm,
    /// Only used when `evaluate_as_classifier` is set.
    pub evaluation: EvaluationConfig,
    /// Only used when `evaluate_as_classifier` is not set.
    pub derivator: DerivatorConfig,
}

impl CodecConfig {
    pub fn validate(&self) -> Result<(), KddError> {
        self.clustering.validate()?;
        self.evaluation.validate()?;
        self.derivator.validate()
    }
}

/// Outcome of a [`Codec`] run, depending on its mode. `M` is the model type
/// of the dependency derivator.
#[derive(Debug, Clone)]
pub enum CodecResult<M = CorrelationModel> {
    /// Cross-validation result of the cluster labels.
    Evaluation(EvaluationResult),
    /// Clustering with one dependency model per cluster.
    Clustering(ClusteringResult<M>),
}

impl<M> CodecResult<M> {
    pub fn as_evaluation(&self) -> Option<&EvaluationResult> {
        match self {
            CodecResult::Evaluation(result) => Some(result),
            CodecResult::Clustering(_) => None,
        }
    }

    pub fn as_clustering(&self) -> Option<&ClusteringResult<M>> {
        match self {
            CodecResult::Clustering(result) => Some(result),
            CodecResult::Evaluation(_) => None,
        }
    }
}

impl<M: fmt::Display> fmt::Display for CodecResult<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecResult::Evaluation(result) => write!(f, "{result}"),
            CodecResult::Clustering(result) => write!(f, "{result}"),
        }
    }
}

/// Clusters a database, then evaluates or describes the clusters.
#[derive(Debug, Clone)]
pub struct Codec<C = ClusteringAlgorithm, E = ClassifierEvaluation, R = DependencyDerivator> {
    evaluate_as_classifier: bool,
    label_type: LabelType,
    clustering: C,
    evaluator: E,
    derivator: R,
}

impl Codec {
    /// Build the configured strategies. Every nested configuration is
    /// validated here, before any data is touched.
    pub fn new(config: CodecConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self {
            evaluate_as_classifier: config.evaluate_as_classifier,
            label_type: config.label_type,
            clustering: config.clustering,
            evaluator: ClassifierEvaluation::new(config.evaluation)?,
            derivator: DependencyDerivator::new(config.derivator)?,
        })
    }
}

impl<C, E, R> Codec<C, E, R>
where
    C: Clustering,
    E: Evaluating,
    R: DependencyDeriving,
{
    pub fn with_strategies(
        evaluate_as_classifier: bool,
        label_type: LabelType,
        clustering: C,
        evaluator: E,
        derivator: R,
    ) -> Result<Self, KddError> {
        clustering.validate()?;
        evaluator.validate()?;
        derivator.validate()?;
        Ok(Self {
            evaluate_as_classifier,
            label_type,
            clustering,
            evaluator,
            derivator,
        })
    }

    pub fn evaluate_as_classifier(&self) -> bool {
        self.evaluate_as_classifier
    }

    pub fn label_type(&self) -> LabelType {
        self.label_type
    }

    pub fn clustering(&self) -> &C {
        &self.clustering
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn derivator(&self) -> &R {
        &self.derivator
    }

    /// Cluster `database`, then either cross-validate the cluster labels or
    /// derive a model for every cluster in ascending label order.
    ///
    /// The clustering strategy may add associations to `database`. Any
    /// failure aborts the run.
    pub fn run(&self, database: &mut dyn Database) -> Result<CodecResult<R::Model>, KddError> {
        let start = Instant::now();
        info!(
            algorithm = self.clustering.name(),
            objects = database.size(),
            "clustering"
        );
        let clustering = self.clustering.run(database)?;
        debug!(clusters = clustering.len(), "clustering finished");

        if self.evaluate_as_classifier {
            info!(label_type = self.label_type.name(), "evaluating clusters as classes");
            let labeled = clustering.label_projection(&*database, self.label_type)?;
            let evaluation = self.evaluator.run(&labeled)?;
            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "evaluation finished"
            );
            return Ok(CodecResult::Evaluation(evaluation));
        }

        let partitions = clustering.partition(&*database, self.label_type)?;
        let mut result = clustering.into_model_type::<R::Model>();
        for (label, members) in partitions {
            info!(label = %label, objects = members.size(), "deriving dependencies");
            let model = self.derivator.run(&members)?;
            result.append_model(label, model);
        }
        info!(
            models = result.models().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dependency derivation finished"
        );
        Ok(CodecResult::Clustering(result))
    }
}
