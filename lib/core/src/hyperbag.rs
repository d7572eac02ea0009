//! Concatenation of sub-bags, term weighting and bag normalization.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BagNormalization;
use crate::error::{Error, Result};
use crate::mapping::InstanceMap;

/// Log and IDF weighting; IDF factors are frozen the first time they are needed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermWeighting {
    pub log: bool,
    pub idf: bool,
    /// Document frequency factor per codeword
    pub document_frequency: Option<Vec<f32>>,
}

impl TermWeighting {
    pub fn new(log: bool, idf: bool) -> Self {
        Self {
            log,
            idf,
            document_frequency: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.log || self.idf
    }

    /// `log10(tf + 1)` and/or `tf * dff`, computing and freezing `dff` if absent
    pub fn apply(&mut self, bag: &mut [Vec<f32>]) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let width = bag.first().map_or(0, Vec::len);
        let dff = if self.idf {
            let dff = self
                .document_frequency
                .get_or_insert_with(|| document_frequency_factors(bag));
            if dff.len() != width {
                return Err(Error::InvalidDimension {
                    expected: dff.len(),
                    actual: width,
                });
            }
            Some(dff.as_slice())
        } else {
            None
        };

        for row in bag.iter_mut() {
            for (w, tf) in row.iter_mut().enumerate() {
                if self.log {
                    *tf = (*tf + 1.0).log10();
                }
                if let Some(dff) = dff {
                    *tf *= dff[w];
                }
            }
        }
        Ok(())
    }
}

/// `log10(N / n_w)` where `n_w` counts the instances with a non-zero value for
/// codeword `w`; codewords that never occur get factor 1
pub fn document_frequency_factors(bag: &[Vec<f32>]) -> Vec<f32> {
    let width = bag.first().map_or(0, Vec::len);
    let num_instances = bag.len() as f32;
    (0..width)
        .map(|w| {
            let appear = bag.iter().filter(|row| row[w] > f32::MIN_POSITIVE).count();
            if appear > 0 {
                (num_instances / appear as f32).log10()
            } else {
                1.0
            }
        })
        .collect()
}

/// Concatenate sub-bags column-wise in the given order
pub fn concatenate(sub_bags: Vec<Vec<Vec<f32>>>, num_instances: usize) -> Result<Vec<Vec<f32>>> {
    let mut bag = vec![Vec::new(); num_instances];
    for sub in sub_bags {
        if sub.len() != num_instances {
            return Err(Error::InvalidDimension {
                expected: num_instances,
                actual: sub.len(),
            });
        }
        for (row, part) in bag.iter_mut().zip(sub) {
            row.extend(part);
        }
    }
    Ok(bag)
}

/// Divide each row by its normalization factor and multiply by the bag width.
/// A (numerically) zero factor yields an all-zero row.
pub fn normalize(bag: &mut [Vec<f32>], mode: BagNormalization, frame_counts: &[usize]) {
    let mut zeroed = 0usize;
    for (row, &frames) in bag.iter_mut().zip(frame_counts) {
        let width = row.len() as f32;
        let factor = match mode {
            BagNormalization::FrameCount => frames as f32,
            BagNormalization::TermFrequency => row.iter().sum(),
            BagNormalization::UnitLength => crate::simd::norm_simd(row),
        };
        if factor.abs() < f32::MIN_POSITIVE {
            row.fill(0.0);
            zeroed += 1;
            continue;
        }
        for v in row.iter_mut() {
            *v = *v * width / factor;
        }
    }
    if zeroed > 0 {
        debug!("{} bag rows had a zero normalization factor", zeroed);
    }
}

/// Join the sub-bags, then weight, then normalize
pub fn aggregate(
    sub_bags: Vec<Vec<Vec<f32>>>,
    map: &InstanceMap,
    weighting: &mut TermWeighting,
    normalization: Option<BagNormalization>,
) -> Result<Vec<Vec<f32>>> {
    let mut bag = concatenate(sub_bags, map.num_instances())?;
    weighting.apply(&mut bag)?;
    if let Some(mode) = normalization {
        let counts: Vec<usize> = map.instances().iter().map(|i| i.num_frames).collect();
        normalize(&mut bag, mode, &counts);
    }
    Ok(bag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_factors() {
        let bag = vec![
            vec![1.0, 2.0, 0.0],
            vec![3.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![5.0, 0.0, 0.0],
        ];
        let dff = document_frequency_factors(&bag);
        assert!(dff[0].abs() < 1e-6);
        assert!((dff[1] - 4f32.log10()).abs() < 1e-6);
        assert!((dff[1] - 0.602).abs() < 1e-3);
        assert_eq!(dff[2], 1.0);
    }

    #[test]
    fn test_weighting_freezes_factors() {
        let mut weighting = TermWeighting::new(false, true);
        let mut train = vec![vec![1.0, 1.0], vec![1.0, 0.0]];
        weighting.apply(&mut train).unwrap();
        let frozen = weighting.document_frequency.clone().unwrap();

        // different data, same factors
        let mut other = vec![vec![0.0, 2.0], vec![0.0, 2.0]];
        weighting.apply(&mut other).unwrap();
        assert_eq!(weighting.document_frequency.as_ref().unwrap(), &frozen);
        assert!((other[0][1] - 2.0 * 2f32.log10()).abs() < 1e-6);
    }

    #[test]
    fn test_log_weighting() {
        let mut weighting = TermWeighting::new(true, false);
        let mut bag = vec![vec![9.0, 0.0]];
        weighting.apply(&mut bag).unwrap();
        assert!((bag[0][0] - 1.0).abs() < 1e-6);
        assert_eq!(bag[0][1], 0.0);
    }

    #[test]
    fn test_unit_length_scaled_by_width() {
        let mut bag = vec![vec![3.0, 1.0, 0.5, 2.0, 0.0, 0.0, 0.0, 0.0, 7.0]];
        normalize(&mut bag, BagNormalization::UnitLength, &[7]);
        let width = 9.0f32;
        let norm = crate::simd::norm_simd(&bag[0]);
        assert!((norm - width).abs() < 1e-4);
        // per-cell scale of sqrt(width) on both sides
        assert!((norm / width.sqrt() - width.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_frame_count_and_term_frequency() {
        let mut bag = vec![vec![2.0, 2.0]];
        normalize(&mut bag, BagNormalization::FrameCount, &[4]);
        assert_eq!(bag[0], vec![1.0, 1.0]);

        let mut bag = vec![vec![1.0, 3.0]];
        normalize(&mut bag, BagNormalization::TermFrequency, &[4]);
        assert_eq!(bag[0], vec![0.5, 1.5]);
    }

    #[test]
    fn test_zero_factor_gives_zero_row() {
        let mut bag = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        normalize(&mut bag, BagNormalization::UnitLength, &[0, 1]);
        assert_eq!(bag[0], vec![0.0, 0.0]);
        let mut bag = vec![vec![0.001, 0.001]];
        normalize(&mut bag, BagNormalization::FrameCount, &[0]);
        assert_eq!(bag[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_concatenate_checks_rows() {
        let joined = concatenate(vec![vec![vec![1.0]], vec![vec![2.0, 3.0]]], 1).unwrap();
        assert_eq!(joined, vec![vec![1.0, 2.0, 3.0]]);
        assert!(concatenate(vec![vec![vec![1.0]]], 2).is_err());
    }
}
