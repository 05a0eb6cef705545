//! Preference vector preprocessing.
//!
//! For every object the preprocessor looks at its `k` nearest neighbors and
//! marks the coordinate axes along which that neighborhood hardly deviates
//! from the object. The resulting [`PreferenceVector`] is stored as an
//! association and exposes candidate subspace directions to correlation-aware
//! clustering.

use std::fmt;
use std::time::Instant;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::database::{Association, Database, ObjectId, RealVector};
use crate::distance::{DistanceFunction, EuclideanDistance};
use crate::math::squared_deviations;
use crate::progress::Progress;
use crate::KddError;

/// Bit-vector over the axes of a data space.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceVector {
    dimensionality: usize,
    bits: RoaringBitmap,
}

impl PreferenceVector {
    /// Empty preference vector over `dimensionality` axes.
    pub fn new(dimensionality: usize) -> Self {
        Self {
            dimensionality,
            bits: RoaringBitmap::new(),
        }
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Mark `axis` as preferred.
    ///
    /// # Panics
    /// Panics if `axis` is not below the dimensionality.
    pub fn set(&mut self, axis: usize) {
        assert!(
            axis < self.dimensionality,
            "axis {axis} out of range for dimensionality {}",
            self.dimensionality
        );
        self.bits.insert(axis as u32);
    }

    pub fn is_set(&self, axis: usize) -> bool {
        axis < self.dimensionality && self.bits.contains(axis as u32)
    }

    /// Number of preferred axes.
    pub fn cardinality(&self) -> usize {
        self.bits.len() as usize
    }

    /// Preferred axes in ascending order.
    pub fn axes(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().map(|axis| axis as usize)
    }

    pub fn bits(&self) -> &RoaringBitmap {
        &self.bits
    }
}

impl fmt::Display for PreferenceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in 0..self.dimensionality {
            f.write_str(if self.is_set(axis) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Configuration of [`HiscPreprocessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiscConfig {
    /// Maximum mean squared deviation along an axis for it to be preferred.
    pub alpha: f64,
    /// Neighborhood size; `None` resolves to three times the dimensionality.
    pub k: Option<usize>,
}

impl HiscConfig {
    pub const DEFAULT_ALPHA: f64 = 0.01;

    pub fn new(alpha: f64, k: Option<usize>) -> Self {
        Self { alpha, k }
    }

    pub fn validate(&self) -> Result<(), KddError> {
        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(KddError::InvalidParameter {
                name: "alpha",
                value: self.alpha.to_string(),
                reason: "must be a number between 0 and 1",
            });
        }
        if self.k == Some(0) {
            return Err(KddError::InvalidParameter {
                name: "k",
                value: "0".to_owned(),
                reason: "must be a positive integer",
            });
        }
        Ok(())
    }
}

impl Default for HiscConfig {
    fn default() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
            k: None,
        }
    }
}

/// Assigns HiSC preference vectors to all objects of a database.
#[derive(Debug, Clone, Default)]
pub struct HiscPreprocessor {
    config: HiscConfig,
}

impl HiscPreprocessor {
    pub fn new(config: HiscConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Declared configuration. The neighborhood size resolved during a run is
    /// never written back here.
    pub fn config(&self) -> &HiscConfig {
        &self.config
    }

    /// Neighborhood size used for objects of the given dimensionality.
    pub fn effective_k(&self, dimensionality: usize) -> usize {
        self.config.k.unwrap_or(3 * dimensionality)
    }

    /// Compute and store a preference vector for every object.
    ///
    /// Neighbors are always determined under the Euclidean distance. The first
    /// failing query or write aborts the run; objects processed before it keep
    /// their new association.
    pub fn run(&self, database: &mut dyn Database) -> Result<(), KddError> {
        if database.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let ids = database.ids();
        let k = self.effective_k(database.get(ids[0])?.dimensionality());

        let mut distance = EuclideanDistance;
        distance.bind(&*database)?;

        let mut progress = Progress::new("Preprocessing preference vector", ids.len());
        for id in ids {
            let preference_vector = self.preference_vector(&*database, id, k, &distance)?;
            database.associate(id, Association::PreferenceVector(preference_vector))?;
            if progress.advance() {
                debug!("{progress}");
            }
        }

        info!(
            alpha = self.config.alpha,
            k,
            objects = progress.processed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "preference vectors assigned"
        );
        Ok(())
    }

    fn preference_vector(
        &self,
        database: &dyn Database,
        id: ObjectId,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<PreferenceVector, KddError> {
        let neighbors = database.knn_query_for_id(id, k, distance)?;
        let object = database.get(id)?;
        let neighbor_vectors = neighbors
            .iter()
            .map(|neighbor| database.get(neighbor.id))
            .collect::<Result<Vec<&RealVector>, KddError>>()?;

        let variances = squared_deviations(object, &neighbor_vectors);
        let mut preference_vector = PreferenceVector::new(variances.len());
        for (axis, variance) in variances.iter().enumerate() {
            if *variance < self.config.alpha {
                preference_vector.set(axis);
            }
        }

        trace!(
            id,
            neighbors = ?neighbors.iter().map(|n| n.id).collect::<Vec<_>>(),
            variances = ?variances,
            preference = %preference_vector,
            "preference vector"
        );
        Ok(preference_vector)
    }
}
