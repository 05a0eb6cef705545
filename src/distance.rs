use crate::database::{Database, RealVector};
use crate::math::l2_distance;
use crate::KddError;

/// Distance between two vectors.
///
/// Distances are compared with [`f64::total_cmp`], so every value (including
/// NaN) has a place in the order.
pub trait DistanceFunction {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// Prepare the function for queries against `database`.
    ///
    /// Functions that derive state from the stored objects (weights,
    /// preprocessing results) read it here; stateless metrics keep the default.
    fn bind(&mut self, _database: &dyn Database) -> Result<(), KddError> {
        Ok(())
    }

    fn distance(&self, a: &RealVector, b: &RealVector) -> f64;
}

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EuclideanDistance;

impl DistanceFunction for EuclideanDistance {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    #[inline]
    fn distance(&self, a: &RealVector, b: &RealVector) -> f64 {
        l2_distance(a.values(), b.values())
    }
}
