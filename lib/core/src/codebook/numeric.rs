use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use super::clustering::{kmeans, random_plus_plus, random_sampling};
use super::generic::generic_codewords;
use super::gmm::{expectation_maximization, GmmParams};
use super::reduce::reduce_codewords;
use crate::config::{AssignmentConfig, GenerationMethod, NumericCodebookConfig};
use crate::error::{Error, Result};
use crate::ngram::NGramCodebook;
use crate::selector::TrainingSet;
use crate::vector::Vector;

/// Codewords of one numeric feature class, plus the state its generation
/// method and encoding options need
#[derive(Debug, Clone, PartialEq)]
pub struct NumericCodebook {
    codewords: Vec<Vector>,
    gmm: Option<GmmParams>,
    ngrams: Option<NGramCodebook>,
    assignment: AssignmentConfig,
}

impl NumericCodebook {
    /// Assemble a codebook from stored parts, checking their consistency
    pub fn from_parts(
        codewords: Vec<Vector>,
        gmm: Option<GmmParams>,
        ngrams: Option<NGramCodebook>,
        assignment: AssignmentConfig,
    ) -> Result<Self> {
        let dim = codewords.first().map_or(0, Vector::dim);
        if let Some(bad) = codewords.iter().find(|c| c.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }
        if let Some(params) = &gmm {
            if params.len() != codewords.len() || params.covariances.len() != codewords.len() {
                return Err(Error::InvalidDimension {
                    expected: codewords.len(),
                    actual: params.len(),
                });
            }
            if let Some(bad) = params.covariances.iter().find(|c| c.len() != dim) {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: bad.len(),
                });
            }
        }
        if assignment.posterior.is_some() && gmm.is_none() {
            return Err(Error::config(
                "GMM posterior assignment requested on a codebook without mixture parameters",
            ));
        }
        Ok(Self {
            codewords,
            gmm,
            ngrams,
            assignment,
        })
    }

    /// Generate codewords from selected training vectors of `num_features` dimensions
    pub fn generate(
        training: &TrainingSet,
        config: &NumericCodebookConfig,
        num_features: usize,
    ) -> Result<Self> {
        config.validate()?;

        if config.method == GenerationMethod::Generic {
            let codewords = generic_codewords(num_features, config.generic_offset)?;
            if codewords.len() != config.size {
                warn!(
                    "Generic codebook over {} features has {} codewords, not the requested {}",
                    num_features,
                    codewords.len(),
                    config.size
                );
            }
            return Self::from_parts(
                codewords.into_iter().map(Vector::new).collect(),
                None,
                None,
                config.assignment.clone(),
            );
        }

        if let Some(dim) = training.dim() {
            if dim != num_features {
                return Err(Error::InvalidDimension {
                    expected: num_features,
                    actual: dim,
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let (centers, gmm) = match training {
            TrainingSet::Unsupervised(data) => cluster(data, config.size, config.method, &mut rng)?,
            TrainingSet::Supervised(classes) => {
                if classes.is_empty() {
                    return Err(Error::InsufficientData {
                        requested: config.size,
                        available: 0,
                    });
                }
                let per_class = config.size.div_ceil(classes.len());
                let mut centers = Vec::with_capacity(per_class * classes.len());
                let mut mixtures = Vec::new();
                for class in classes {
                    if class.vectors.len() < per_class {
                        return Err(Error::InsufficientClassData {
                            class: class.label.clone(),
                            requested: per_class,
                            available: class.vectors.len(),
                        });
                    }
                    let (class_centers, class_gmm) =
                        cluster(&class.vectors, per_class, config.method, &mut rng)?;
                    centers.extend(class_centers);
                    mixtures.extend(class_gmm);
                }
                let gmm = config.method.is_em().then(|| GmmParams::concat(mixtures));
                (centers, gmm)
            }
        };

        let mut codewords: Vec<Vector> = centers.into_iter().map(Vector::new).collect();
        if let Some(threshold) = config.reduce_threshold {
            codewords = reduce_codewords(codewords, threshold);
        }
        info!(
            "Generated {} codebook with {} codewords",
            config.method,
            codewords.len()
        );
        Self::from_parts(codewords, gmm, None, config.assignment.clone())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codewords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codewords.is_empty()
    }

    /// Feature dimensionality of the codewords
    pub fn dim(&self) -> usize {
        self.codewords.first().map_or(0, Vector::dim)
    }

    pub fn codewords(&self) -> &[Vector] {
        &self.codewords
    }

    pub fn gmm(&self) -> Option<&GmmParams> {
        self.gmm.as_ref()
    }

    pub fn ngrams(&self) -> Option<&NGramCodebook> {
        self.ngrams.as_ref()
    }

    pub fn assignment(&self) -> &AssignmentConfig {
        &self.assignment
    }

    pub fn set_ngrams(&mut self, ngrams: NGramCodebook) {
        self.ngrams = Some(ngrams);
    }

    /// Width of the histogram this codebook produces
    pub fn histogram_width(&self) -> usize {
        match &self.ngrams {
            Some(ngrams) => ngrams.len(),
            None => self.len(),
        }
    }
}

/// Seed, optionally refine with k-means, optionally fit a mixture
fn cluster(
    data: &[Vec<f32>],
    k: usize,
    method: GenerationMethod,
    rng: &mut StdRng,
) -> Result<(Vec<Vec<f32>>, Option<GmmParams>)> {
    let seeds = if method.uses_plus_plus() {
        random_plus_plus(data, k, rng)?
    } else {
        random_sampling(data, k, rng)?
    };
    let centers = if method.runs_kmeans() {
        kmeans(data, seeds, method.normalizes_distance()).centroids
    } else {
        seeds
    };
    if method.is_em() {
        let outcome = expectation_maximization(data, centers);
        Ok((outcome.means, Some(outcome.params)))
    } else {
        Ok((centers, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::ClassTraining;

    fn line(values: &[f32]) -> Vec<Vec<f32>> {
        values.iter().map(|&x| vec![x]).collect()
    }

    #[test]
    fn test_kmeans_end_to_end_centroids() {
        let training = TrainingSet::Unsupervised(line(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]));
        let config = NumericCodebookConfig::new(2, GenerationMethod::KMeans).with_seed(1);
        let book = NumericCodebook::generate(&training, &config, 1).unwrap();
        let mut centers: Vec<f32> = book.codewords().iter().map(|c| c.as_slice()[0]).collect();
        centers.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((centers[0] - 2.0).abs() < 1e-4);
        assert!((centers[1] - 11.0).abs() < 1e-4);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let data: Vec<Vec<f32>> = (0..50).map(|i| vec![(i * 7 % 13) as f32, i as f32]).collect();
        let training = TrainingSet::Unsupervised(data);
        for method in [
            GenerationMethod::Random,
            GenerationMethod::RandomPlusPlus,
            GenerationMethod::KMeans,
            GenerationMethod::KMeansPlusPlus,
        ] {
            let config = NumericCodebookConfig::new(5, method).with_seed(99);
            let a = NumericCodebook::generate(&training, &config, 2).unwrap();
            let b = NumericCodebook::generate(&training, &config, 2).unwrap();
            assert_eq!(a, b, "method {}", method);
        }
    }

    #[test]
    fn test_supervised_blocks_follow_class_order() {
        let training = TrainingSet::Supervised(vec![
            ClassTraining {
                label: "low".into(),
                vectors: line(&[0.0, 0.1, 0.2]),
            },
            ClassTraining {
                label: "high".into(),
                vectors: line(&[9.0, 9.1, 9.2]),
            },
        ]);
        let config = NumericCodebookConfig::new(4, GenerationMethod::RandomPlusPlus);
        let book = NumericCodebook::generate(&training, &config, 1).unwrap();
        assert_eq!(book.len(), 4);
        assert!(book.codewords()[..2].iter().all(|c| c.as_slice()[0] < 1.0));
        assert!(book.codewords()[2..].iter().all(|c| c.as_slice()[0] > 8.0));
    }

    #[test]
    fn test_supervised_class_too_small() {
        let training = TrainingSet::Supervised(vec![
            ClassTraining {
                label: "a".into(),
                vectors: line(&[0.0, 1.0, 2.0]),
            },
            ClassTraining {
                label: "b".into(),
                vectors: line(&[5.0]),
            },
        ]);
        let config = NumericCodebookConfig::new(4, GenerationMethod::Random);
        let err = NumericCodebook::generate(&training, &config, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientClassData { ref class, requested: 2, available: 1 } if class == "b"
        ));
    }

    #[test]
    fn test_supervised_em_weights_sum_to_one() {
        let training = TrainingSet::Supervised(vec![
            ClassTraining {
                label: "a".into(),
                vectors: line(&[0.0, 0.5, 1.0, 1.5]),
            },
            ClassTraining {
                label: "b".into(),
                vectors: line(&[10.0, 10.5, 11.0, 11.5]),
            },
        ]);
        let config = NumericCodebookConfig::new(4, GenerationMethod::EmPlusPlus);
        let book = NumericCodebook::generate(&training, &config, 1).unwrap();
        let gmm = book.gmm().unwrap();
        assert_eq!(gmm.len(), 4);
        assert!((gmm.mixture_weights.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_generic_ignores_training_data() {
        let config = NumericCodebookConfig {
            size: 8,
            method: GenerationMethod::Generic,
            generic_offset: 2.0,
            ..Default::default()
        };
        let book = NumericCodebook::generate(&TrainingSet::Unsupervised(Vec::new()), &config, 3).unwrap();
        assert_eq!(book.len(), 8);
        assert_eq!(book.codewords()[7].as_slice(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_reduction_shrinks_codebook() {
        let data = vec![
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 6.0],
            vec![3.0, 2.0, 1.0],
        ];
        let config = NumericCodebookConfig::new(3, GenerationMethod::Random).with_reduction(0.99);
        let book = NumericCodebook::generate(&TrainingSet::Unsupervised(data), &config, 3).unwrap();
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_insufficient_data() {
        let config = NumericCodebookConfig::new(10, GenerationMethod::KMeansPlusPlus);
        let err = NumericCodebook::generate(&TrainingSet::Unsupervised(line(&[1.0, 2.0])), &config, 1)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { requested: 10, available: 2 }));
    }
}
