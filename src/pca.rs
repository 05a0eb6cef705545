//! Principal component analysis over small object sets.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::database::RealVector;
use crate::math::centroid;

/// Eigen-decomposition of the covariance matrix of a set of vectors, with
/// eigenpairs sorted by descending eigenvalue.
#[derive(Debug, Clone)]
pub struct PcaResult {
    pub centroid: Vec<f64>,
    /// Eigenvalues in descending order, clamped at zero.
    pub eigenvalues: Vec<f64>,
    /// Unit eigenvectors, `eigenvectors[i]` belongs to `eigenvalues[i]`.
    pub eigenvectors: Vec<Vec<f64>>,
}

impl PcaResult {
    /// Smallest number of leading eigenvalues whose share of the total
    /// variance reaches `alpha`. A set without variance has no strong
    /// direction.
    pub fn strong_count(&self, alpha: f64) -> usize {
        let total: f64 = self.eigenvalues.iter().sum();
        if total <= f64::EPSILON {
            return 0;
        }
        let mut explained = 0.0f64;
        for (index, value) in self.eigenvalues.iter().enumerate() {
            explained += value;
            if explained / total >= alpha {
                return index + 1;
            }
        }
        self.eigenvalues.len()
    }
}

/// Run PCA on a non-empty set of equally sized vectors.
pub fn pca(vectors: &[&RealVector]) -> PcaResult {
    let mean = centroid(vectors);
    let dim = mean.len();
    if dim == 0 {
        return PcaResult {
            centroid: mean,
            eigenvalues: Vec::new(),
            eigenvectors: Vec::new(),
        };
    }

    let mut covariance = DMatrix::<f64>::zeros(dim, dim);
    for vector in vectors {
        for i in 0..dim {
            let di = vector[i] - mean[i];
            for j in i..dim {
                covariance[(i, j)] += di * (vector[j] - mean[j]);
            }
        }
    }
    let inv = 1.0 / vectors.len() as f64;
    for i in 0..dim {
        for j in i..dim {
            let value = covariance[(i, j)] * inv;
            covariance[(i, j)] = value;
            covariance[(j, i)] = value;
        }
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let eigenvalues = order
        .iter()
        .map(|&index| eigen.eigenvalues[index].max(0.0))
        .collect();
    let eigenvectors = order
        .iter()
        .map(|&index| eigen.eigenvectors.column(index).iter().copied().collect())
        .collect();

    PcaResult {
        centroid: mean,
        eigenvalues,
        eigenvectors,
    }
}
