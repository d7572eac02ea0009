use serde::{Deserialize, Serialize};

/// A dense feature vector; the representation of every numeric codeword
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Squared Euclidean distance to a raw feature slice
    #[inline]
    pub fn squared_distance(&self, other: &[f32]) -> f32 {
        crate::simd::squared_l2_simd(&self.data, other)
    }

    /// True if every component lies within `tolerance` of `other`
    #[inline]
    pub fn approx_eq(&self, other: &[f32], tolerance: f32) -> bool {
        self.dim() == other.len()
            && self
                .data
                .iter()
                .zip(other)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Pearson correlation between the components of two codewords.
    /// Constant vectors have no defined correlation and yield 0.
    pub fn pearson_correlation(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() || self.is_empty() {
            return 0.0;
        }
        let n = self.dim() as f64;
        let mean_a = self.data.iter().map(|&x| x as f64).sum::<f64>() / n;
        let mean_b = other.data.iter().map(|&x| x as f64).sum::<f64>() / n;

        let mut cov = 0.0f64;
        let mut var_a = 0.0f64;
        let mut var_b = 0.0f64;
        for (&a, &b) in self.data.iter().zip(&other.data) {
            let da = a as f64 - mean_a;
            let db = b as f64 - mean_b;
            cov += da * db;
            var_a += da * da;
            var_b += db * db;
        }

        let denom = (var_a * var_b).sqrt();
        if denom <= f64::from(f32::MIN_POSITIVE) {
            return 0.0;
        }
        (cov / denom) as f32
    }

    /// Element-wise mean of a non-empty group of equally sized vectors
    pub fn mean_of<'a>(group: impl IntoIterator<Item = &'a Vector>) -> Option<Vector> {
        let mut iter = group.into_iter();
        let first = iter.next()?;
        let mut sum: Vec<f64> = first.data.iter().map(|&x| x as f64).collect();
        let mut count = 1usize;
        for v in iter {
            for (s, &x) in sum.iter_mut().zip(&v.data) {
                *s += x as f64;
            }
            count += 1;
        }
        Some(Vector::new(
            sum.into_iter().map(|s| (s / count as f64) as f32).collect(),
        ))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Vector::new(data)
    }
}
