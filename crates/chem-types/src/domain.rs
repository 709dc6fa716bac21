//! Processed-domain encoding consumed by optimizers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-length descriptor vector used for similarity between candidates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<f64>);

impl Fingerprint {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Euclidean distance. Dimensions missing on either side count as zero.
    pub fn distance(&self, other: &Fingerprint) -> f64 {
        let n = self.len().max(other.len());
        (0..n)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0.0);
                let b = other.0.get(i).copied().unwrap_or(0.0);
                (a - b) * (a - b)
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// A candidate as the optimizer sees it: a position in the candidate pool and
/// the fingerprint of the molecule stored there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedPoint {
    pub index: usize,
    pub fingerprint: Fingerprint,
}

impl ProcessedPoint {
    pub fn new(index: usize, fingerprint: Fingerprint) -> Self {
        Self { index, fingerprint }
    }
}

impl fmt::Display for ProcessedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Fingerprint::new(vec![0.0, 3.0]);
        let b = Fingerprint::new(vec![4.0, 0.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn distance_pads_shorter_vectors() {
        let a = Fingerprint::new(vec![1.0]);
        let b = Fingerprint::new(vec![1.0, 2.0]);
        assert!((a.distance(&b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn processed_point_display() {
        let point = ProcessedPoint::new(7, Fingerprint::default());
        assert_eq!(point.to_string(), "#7");
    }
}
