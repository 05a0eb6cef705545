//! Linear dependency derivation.
//!
//! A [`DependencyDerivator`] describes a set of objects by its principal
//! components. The strong eigenvectors span the correlation hyperplane; every
//! weak eigenvector yields one linear equation that all objects of the set
//! approximately satisfy.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{Database, RealVector};
use crate::math::dot;
use crate::pca::pca;
use crate::KddError;

/// Parameters of the dependency derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivatorConfig {
    /// Share of the variance the strong eigenvectors have to explain.
    pub alpha: f64,
    /// Fixed number of strong eigenvectors. Takes precedence over `alpha`.
    pub correlation_dimensionality: Option<usize>,
    /// Decimal places of the rendered equations.
    pub fraction_digits: usize,
}

impl DerivatorConfig {
    pub fn validate(&self) -> Result<(), KddError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(KddError::InvalidParameter {
                name: "alpha",
                value: self.alpha.to_string(),
                reason: "must lie in (0, 1]",
            });
        }
        if self.correlation_dimensionality == Some(0) {
            return Err(KddError::InvalidParameter {
                name: "correlation_dimensionality",
                value: "0".to_owned(),
                reason: "must be a positive integer",
            });
        }
        if self.fraction_digits > 15 {
            return Err(KddError::InvalidParameter {
                name: "fraction_digits",
                value: self.fraction_digits.to_string(),
                reason: "must not exceed 15",
            });
        }
        Ok(())
    }
}

impl Default for DerivatorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.85,
            correlation_dimensionality: None,
            fraction_digits: 4,
        }
    }
}

/// `coefficients . x = rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEquation {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
    fraction_digits: usize,
}

impl LinearEquation {
    /// Deviation of `point` from the hyperplane, `coefficients . point - rhs`.
    pub fn residual(&self, point: &[f64]) -> f64 {
        dot(&self.coefficients, point) - self.rhs
    }
}

fn round_to(value: f64, fraction_digits: usize) -> f64 {
    let factor = 10f64.powi(fraction_digits as i32);
    let rounded = (value * factor).round() / factor;
    // Normalizes -0.0.
    rounded + 0.0
}

impl fmt::Display for LinearEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.fraction_digits;
        let mut written = false;
        for (axis, &coefficient) in self.coefficients.iter().enumerate() {
            let value = round_to(coefficient, digits);
            if value == 0.0 {
                continue;
            }
            match (written, value < 0.0) {
                (false, false) => write!(f, "{:.*}*x{}", digits, value, axis + 1)?,
                (false, true) => write!(f, "-{:.*}*x{}", digits, -value, axis + 1)?,
                (true, false) => write!(f, " + {:.*}*x{}", digits, value, axis + 1)?,
                (true, true) => write!(f, " - {:.*}*x{}", digits, -value, axis + 1)?,
            }
            written = true;
        }
        if !written {
            f.write_str("0")?;
        }
        write!(f, " = {:.*}", digits, round_to(self.rhs, digits))
    }
}

/// Linear model of a set of objects.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationModel {
    pub dimensionality: usize,
    /// Number of strong eigenvectors.
    pub correlation_dimensionality: usize,
    pub centroid: Vec<f64>,
    pub strong_eigenvectors: Vec<Vec<f64>>,
    pub weak_eigenvectors: Vec<Vec<f64>>,
    /// All eigenvalues in descending order.
    pub eigenvalues: Vec<f64>,
    /// One equation per weak eigenvector.
    pub equations: Vec<LinearEquation>,
}

impl fmt::Display for CorrelationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "correlation dimensionality {} of {}",
            self.correlation_dimensionality, self.dimensionality
        )?;
        for equation in &self.equations {
            writeln!(f, "{equation}")?;
        }
        Ok(())
    }
}

/// Derives a model from all objects of a database.
pub trait DependencyDeriving {
    /// Model attached to every cluster.
    type Model;

    /// Check the configuration without touching any data.
    fn validate(&self) -> Result<(), KddError> {
        Ok(())
    }

    fn run(&self, database: &dyn Database) -> Result<Self::Model, KddError>;
}

/// PCA based dependency derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyDerivator {
    config: DerivatorConfig,
}

impl DependencyDerivator {
    pub fn new(config: DerivatorConfig) -> Result<Self, KddError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DerivatorConfig {
        &self.config
    }
}

impl DependencyDeriving for DependencyDerivator {
    type Model = CorrelationModel;

    fn validate(&self) -> Result<(), KddError> {
        self.config.validate()
    }

    fn run(&self, database: &dyn Database) -> Result<CorrelationModel, KddError> {
        if database.is_empty() {
            return Err(KddError::Precondition(
                "dependency derivation needs at least one object",
            ));
        }
        let vectors = database
            .ids()
            .into_iter()
            .map(|id| database.get(id))
            .collect::<Result<Vec<&RealVector>, KddError>>()?;
        let analysis = pca(&vectors);
        let dimensionality = analysis.centroid.len();

        let strong = match self.config.correlation_dimensionality {
            Some(fixed) if fixed > dimensionality => {
                return Err(KddError::Precondition(
                    "correlation dimensionality exceeds the data dimensionality",
                ));
            }
            Some(fixed) => fixed,
            None => analysis.strong_count(self.config.alpha),
        };

        let mut eigenvectors = analysis.eigenvectors;
        let weak_eigenvectors = eigenvectors.split_off(strong);
        let equations = weak_eigenvectors
            .iter()
            .map(|weak| {
                let mut coefficients = weak.clone();
                // Eigenvector signs are arbitrary; make the leading term positive.
                let leading = coefficients
                    .iter()
                    .copied()
                    .find(|c| round_to(*c, self.config.fraction_digits) != 0.0);
                if leading.is_some_and(|c| c < 0.0) {
                    coefficients.iter_mut().for_each(|c| *c = -*c);
                }
                let rhs = dot(&coefficients, &analysis.centroid);
                LinearEquation {
                    coefficients,
                    rhs,
                    fraction_digits: self.config.fraction_digits,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            objects = vectors.len(),
            dimensionality,
            correlation_dimensionality = strong,
            equations = equations.len(),
            "dependencies derived"
        );
        Ok(CorrelationModel {
            dimensionality,
            correlation_dimensionality: strong,
            centroid: analysis.centroid,
            strong_eigenvectors: eigenvectors,
            weak_eigenvectors,
            eigenvalues: analysis.eigenvalues,
            equations,
        })
    }
}
