//! Frame activity filtering and column scaling of inputs and bags.

use serde::{Deserialize, Serialize};

use crate::config::ActivityFilter;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Active flag per frame; every frame is active without a filter
pub fn activity_mask(frames: &[Frame], filter: Option<&ActivityFilter>) -> Result<Vec<bool>> {
    let Some(filter) = filter else {
        return Ok(vec![true; frames.len()]);
    };
    frames
        .iter()
        .map(|frame| {
            frame
                .features
                .get(filter.column)
                .and_then(|v| v.as_numeric())
                .map(|energy| energy >= filter.threshold)
                .ok_or_else(|| {
                    Error::config(format!(
                        "energy column {} of frame '{}' is missing or not numeric",
                        filter.column, frame.name
                    ))
                })
        })
        .collect()
}

/// Per-column affine scaling `(x - offset) / scale`, fitted once and frozen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scaler {
    /// Zero mean, unit (sample) standard deviation
    Standardize { means: Vec<f32>, std_devs: Vec<f32> },
    /// Map the observed range onto [0, 1]
    Normalize { mins: Vec<f32>, widths: Vec<f32> },
}

impl Scaler {
    pub fn fit_standardize(rows: &[Vec<f32>]) -> Self {
        let dim = rows.first().map_or(0, Vec::len);
        let n = rows.len() as f64;
        let mut means = vec![0.0f64; dim];
        for row in rows {
            for (m, &x) in means.iter_mut().zip(row) {
                *m += x as f64;
            }
        }
        means.iter_mut().for_each(|m| *m /= n.max(1.0));

        let mut vars = vec![0.0f64; dim];
        for row in rows {
            for ((v, &x), m) in vars.iter_mut().zip(row).zip(&means) {
                let d = x as f64 - m;
                *v += d * d;
            }
        }
        let std_devs = vars
            .iter()
            .map(|v| {
                let std = if n > 1.0 { (v / (n - 1.0)).sqrt() } else { 0.0 };
                non_degenerate(std as f32)
            })
            .collect();
        Scaler::Standardize {
            means: means.into_iter().map(|m| m as f32).collect(),
            std_devs,
        }
    }

    pub fn fit_normalize(rows: &[Vec<f32>]) -> Self {
        let dim = rows.first().map_or(0, Vec::len);
        let mut mins = vec![f32::INFINITY; dim];
        let mut maxs = vec![f32::NEG_INFINITY; dim];
        for row in rows {
            for (d, &x) in row.iter().enumerate().take(dim) {
                mins[d] = mins[d].min(x);
                maxs[d] = maxs[d].max(x);
            }
        }
        if rows.is_empty() {
            mins.fill(0.0);
            maxs.fill(0.0);
        }
        let widths = mins
            .iter()
            .zip(&maxs)
            .map(|(lo, hi)| non_degenerate(hi - lo))
            .collect();
        Scaler::Normalize { mins, widths }
    }

    /// Rebuild from the two stored rows
    pub fn from_rows(standardize: bool, offsets: Vec<f32>, scales: Vec<f32>) -> Result<Self> {
        if offsets.len() != scales.len() {
            return Err(Error::InvalidDimension {
                expected: offsets.len(),
                actual: scales.len(),
            });
        }
        Ok(if standardize {
            Scaler::Standardize {
                means: offsets,
                std_devs: scales,
            }
        } else {
            Scaler::Normalize {
                mins: offsets,
                widths: scales,
            }
        })
    }

    pub fn is_standardize(&self) -> bool {
        matches!(self, Scaler::Standardize { .. })
    }

    /// Means or minimums
    pub fn offsets(&self) -> &[f32] {
        match self {
            Scaler::Standardize { means, .. } => means,
            Scaler::Normalize { mins, .. } => mins,
        }
    }

    /// Standard deviations or widths
    pub fn scales(&self) -> &[f32] {
        match self {
            Scaler::Standardize { std_devs, .. } => std_devs,
            Scaler::Normalize { widths, .. } => widths,
        }
    }

    pub fn dim(&self) -> usize {
        self.offsets().len()
    }

    pub fn apply(&self, rows: &mut [Vec<f32>]) -> Result<()> {
        let offsets = self.offsets();
        let scales = self.scales();
        for row in rows.iter_mut() {
            if row.len() != offsets.len() {
                return Err(Error::InvalidDimension {
                    expected: offsets.len(),
                    actual: row.len(),
                });
            }
            for ((x, o), s) in row.iter_mut().zip(offsets).zip(scales) {
                *x = (*x - o) / s;
            }
        }
        Ok(())
    }
}

/// Constant columns are left unscaled
fn non_degenerate(scale: f32) -> f32 {
    if scale < f32::MIN_POSITIVE {
        1.0
    } else {
        scale
    }
}
