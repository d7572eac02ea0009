//! Selection of the frames fed to numeric codebook generation.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::{NumericCodebookConfig, EPSILON};
use crate::error::{Error, Result};
use crate::frame::FrameId;
use crate::mapping::InstanceMap;

/// Training vectors for one class of a supervised codebook
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTraining {
    pub label: String,
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingSet {
    Unsupervised(Vec<Vec<f32>>),
    /// Classes in order of first appearance
    Supervised(Vec<ClassTraining>),
}

impl TrainingSet {
    pub fn num_vectors(&self) -> usize {
        match self {
            TrainingSet::Unsupervised(v) => v.len(),
            TrainingSet::Supervised(classes) => classes.iter().map(|c| c.vectors.len()).sum(),
        }
    }

    /// Feature dimensionality of the first training vector
    pub fn dim(&self) -> Option<usize> {
        match self {
            TrainingSet::Unsupervised(v) => v.first().map(Vec::len),
            TrainingSet::Supervised(classes) => classes
                .iter()
                .find_map(|c| c.vectors.first())
                .map(Vec::len),
        }
    }
}

/// A label is nominal if it is not a number, or an integral one
pub fn is_nominal(label: &str) -> bool {
    match label.trim().parse::<f64>() {
        Ok(x) => x.is_finite() && (x - x.round()).abs() <= f64::from(EPSILON),
        Err(_) => true,
    }
}

/// Draws training vectors out of a per-frame feature stream.
///
/// Only frames that contribute to at least one instance are eligible.
#[derive(Debug, Clone)]
pub struct TrainingSelector {
    supervised: bool,
    num_training: usize,
    seed: u64,
}

impl TrainingSelector {
    pub fn new(supervised: bool, num_training: usize, seed: u64) -> Self {
        Self {
            supervised,
            num_training,
            seed,
        }
    }

    pub fn from_config(config: &NumericCodebookConfig) -> Self {
        Self::new(config.supervised, config.num_training, config.random_seed)
    }

    /// `stream[f]` holds the selected features of frame `f`
    pub fn select(&self, stream: &[Vec<f32>], map: &InstanceMap) -> Result<TrainingSet> {
        if stream.len() != map.num_frames() {
            return Err(Error::InvalidDimension {
                expected: map.num_frames(),
                actual: stream.len(),
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);

        if !self.supervised {
            let eligible: Vec<FrameId> = map.contributing_frames().collect();
            let picked = sample(&eligible, self.num_training, &mut rng);
            debug!("Selected {} of {} frames for training", picked.len(), eligible.len());
            return Ok(TrainingSet::Unsupervised(
                picked.iter().map(|f| stream[f.index()].clone()).collect(),
            ));
        }

        let mut labels: Vec<String> = Vec::new();
        let mut members: Vec<Vec<FrameId>> = Vec::new();
        for frame in map.contributing_frames() {
            let instance = map.instance(map.instances_of(frame)[0]);
            let label = match instance.labels.as_slice() {
                [label] if is_nominal(label) => label,
                _ => {
                    return Err(Error::config(format!(
                        "supervised codebook needs exactly one nominal label per instance ('{}' has {:?})",
                        instance.name, instance.labels
                    )))
                }
            };
            match labels.iter().position(|l| l == label) {
                Some(c) => members[c].push(frame),
                None => {
                    labels.push(label.clone());
                    members.push(vec![frame]);
                }
            }
        }

        let per_class = if self.num_training == 0 || labels.is_empty() {
            0
        } else {
            self.num_training.div_ceil(labels.len())
        };
        let classes = labels
            .into_iter()
            .zip(members)
            .map(|(label, frames)| {
                let picked = sample(&frames, per_class, &mut rng);
                ClassTraining {
                    label,
                    vectors: picked.iter().map(|f| stream[f.index()].clone()).collect(),
                }
            })
            .collect::<Vec<_>>();
        debug!("Selected supervised training data for {} classes", classes.len());
        Ok(TrainingSet::Supervised(classes))
    }
}

/// `amount` distinct items drawn uniformly; everything if `amount` is 0 or
/// not smaller than the population
fn sample(frames: &[FrameId], amount: usize, rng: &mut StdRng) -> Vec<FrameId> {
    if amount == 0 || amount >= frames.len() {
        return frames.to_vec();
    }
    rand::seq::index::sample(rng, frames.len(), amount)
        .into_iter()
        .map(|i| frames[i])
        .collect()
}
