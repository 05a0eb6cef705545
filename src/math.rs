use crate::database::RealVector;

/// Compute the squared Euclidean distance between two vectors.
#[inline]
pub fn l2_distance_sqr(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Compute the Euclidean distance between two vectors.
#[inline]
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    l2_distance_sqr(a, b).sqrt()
}

/// Mean vector of a non-empty set of vectors.
pub fn centroid(vectors: &[&RealVector]) -> Vec<f64> {
    assert!(!vectors.is_empty(), "centroid requires at least one vector");
    let dim = vectors[0].dimensionality();
    let mut sum = vec![0.0f64; dim];
    for vector in vectors {
        for (acc, value) in sum.iter_mut().zip(vector.values()) {
            *acc += *value;
        }
    }
    let inv = 1.0 / vectors.len() as f64;
    for value in sum.iter_mut() {
        *value *= inv;
    }
    sum
}

/// Per-axis mean squared deviation of `neighbors` from `reference`.
///
/// This is not a centered sample variance: deviations are measured against the
/// reference coordinates. An empty neighbor set yields all zeros.
pub fn squared_deviations(reference: &RealVector, neighbors: &[&RealVector]) -> Vec<f64> {
    let dim = reference.dimensionality();
    let mut sums = vec![0.0f64; dim];
    if neighbors.is_empty() {
        return sums;
    }
    for neighbor in neighbors {
        for (d, sum) in sums.iter_mut().enumerate() {
            let diff = reference[d] - neighbor[d];
            *sum += diff * diff;
        }
    }
    let inv = 1.0 / neighbors.len() as f64;
    for sum in sums.iter_mut() {
        *sum *= inv;
    }
    sums
}

/// Dot product of two equally sized slices.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
