pub mod classifier;
pub mod clustering;
pub mod codec;
pub mod database;
pub mod dependency;
pub mod distance;
pub mod evaluation;
pub mod label;
pub mod preprocessing;

mod math;
mod pca;
mod progress;

pub use classifier::{ClassDistribution, Classifier, KnnClassifier};
pub use clustering::{
    Cluster, Clustering, ClusteringAlgorithm, ClusteringResult, Copac, CopacConfig, Dbscan,
    DbscanConfig, KMeans, KMeansConfig,
};
pub use codec::{Codec, CodecConfig, CodecResult};
pub use database::{
    Association, AssociationId, Database, InMemoryDatabase, ObjectId, QueryResult, RealVector,
};
pub use dependency::{
    CorrelationModel, DependencyDerivator, DependencyDeriving, DerivatorConfig, LinearEquation,
};
pub use distance::{DistanceFunction, EuclideanDistance};
pub use evaluation::{
    ClassifierEvaluation, ConfusionMatrix, EvaluationConfig, EvaluationResult, Evaluating,
};
pub use label::{ClassLabel, HierarchicalClassLabel, LabelType};
pub use preprocessing::{HiscConfig, HiscPreprocessor, PreferenceVector};

// Re-export RoaringBitmap so callers can inspect preference vectors directly
pub use roaring::RoaringBitmap;

#[cfg(test)]
mod tests;

/// Errors raised while configuring or running the analysis components.
#[derive(thiserror::Error, Debug)]
pub enum KddError {
    /// Returned when a named parameter carries a value outside its domain.
    #[error("wrong value '{value}' for parameter '{name}': {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    /// Returned when a strategy name does not resolve to a known implementation.
    #[error("unknown {role} '{name}'")]
    UnknownStrategy { role: &'static str, name: String },
    /// Returned when an operation is invoked on input it cannot accept.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    /// Returned when an object id is not stored in the database.
    #[error("object {0} is not stored in the database")]
    UnknownObject(ObjectId),
    /// Returned when an object id is inserted twice.
    #[error("object {0} is already stored in the database")]
    DuplicateObject(ObjectId),
    /// Returned when the dimensionality of a vector does not match the database.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when a required association has not been written for an object.
    #[error("association {key} is not set for object {id}")]
    MissingAssociation { key: AssociationId, id: ObjectId },
    /// Wraps a collaborator failure raised while a classifier was queried.
    #[error("invalid classifier invocation")]
    InvalidInvocation(#[source] Box<KddError>),
}
