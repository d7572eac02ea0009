//! Assignment of frames to codewords and per-instance histogram accumulation.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::codebook::gmm::posterior;
use crate::codebook::{NumericCodebook, TextCodebook};
use crate::config::{PosteriorMode, ZERO_FRAME_FILL};
use crate::error::{Error, Result};
use crate::frame::{CodewordId, FrameId};
use crate::mapping::InstanceMap;
use crate::ngram::source_sequences;
use crate::vector::Vector;

/// Nearest codewords of one frame, closest first
pub type FrameAssignment = SmallVec<[CodewordId; 4]>;

/// Histograms of one codebook, one row per instance
#[derive(Debug, Clone, PartialEq)]
pub struct BagOfFeatures {
    pub histograms: Vec<Vec<f32>>,
    /// Per-frame codeword indices (numeric codebooks only)
    pub assignments: Option<Vec<FrameAssignment>>,
}

impl BagOfFeatures {
    pub fn width(&self) -> usize {
        self.histograms.first().map_or(0, Vec::len)
    }
}

/// Turns per-frame features into instance histograms for a fixed mapping
pub struct AssignmentEngine<'a> {
    map: &'a InstanceMap,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(map: &'a InstanceMap) -> Self {
        Self { map }
    }

    /// Encode a numeric stream (`stream[f]` = features of frame `f`)
    pub fn encode_numeric(&self, book: &NumericCodebook, stream: &[Vec<f32>]) -> Result<BagOfFeatures> {
        self.check_stream(book, stream)?;
        let options = book.assignment();

        if let Some(ngrams) = book.ngrams() {
            let hard = hard_assignments(book, stream);
            let sequences = source_sequences(&hard, self.map);
            let mut histograms = ngrams.encode(&sequences, self.map);
            self.fill_empty_instances(&mut histograms);
            return Ok(BagOfFeatures {
                histograms,
                assignments: Some(hard.into_iter().map(|c| SmallVec::from_elem(c, 1)).collect()),
            });
        }

        if let Some(mode) = options.posterior {
            return self.encode_posterior(book, stream, mode);
        }

        if options.num_assignments > book.len() {
            return Err(Error::config(format!(
                "{} assignments requested for a codebook of {} codewords",
                options.num_assignments,
                book.len()
            )));
        }

        let two_sigma_sq = options.gaussian_sigma.map(|s| 2.0 * s * s);
        // None marks an increment rejected by the off-codeword threshold
        let per_frame: Vec<SmallVec<[(CodewordId, Option<f32>); 4]>> = stream
            .par_iter()
            .map(|x| {
                nearest_codewords(book.codewords(), x, options.num_assignments)
                    .into_iter()
                    .map(|(c, d2)| {
                        if options.off_threshold.is_some_and(|off| d2.sqrt() > off) {
                            return (c, None);
                        }
                        let increment = match two_sigma_sq {
                            Some(denom) => (-d2 / denom).exp(),
                            None => 1.0,
                        };
                        (c, Some(increment))
                    })
                    .collect()
            })
            .collect();

        let mut histograms = vec![vec![0.0f32; book.len()]; self.map.num_instances()];
        for (f, selected) in per_frame.iter().enumerate() {
            for instance in self.map.instances_of(FrameId(f)) {
                let row = &mut histograms[instance.index()];
                for &(c, increment) in selected {
                    if let Some(increment) = increment {
                        row[c.index()] += increment;
                    }
                }
            }
        }
        self.fill_empty_instances(&mut histograms);

        Ok(BagOfFeatures {
            histograms,
            assignments: Some(
                per_frame
                    .into_iter()
                    .map(|sel| sel.into_iter().map(|(c, _)| c).collect())
                    .collect(),
            ),
        })
    }

    fn encode_posterior(
        &self,
        book: &NumericCodebook,
        stream: &[Vec<f32>],
        mode: PosteriorMode,
    ) -> Result<BagOfFeatures> {
        let params = book.gmm().ok_or_else(|| {
            Error::config("GMM posterior assignment requires an EM-generated codebook")
        })?;
        let means: Vec<Vec<f32>> = book.codewords().iter().map(|c| c.as_slice().to_vec()).collect();
        let prior = mode == PosteriorMode::Prior;

        let posteriors: Vec<Option<Vec<f32>>> = stream
            .par_iter()
            .enumerate()
            .map(|(f, x)| {
                (!self.map.instances_of(FrameId(f)).is_empty())
                    .then(|| posterior(x, &means, params, prior))
            })
            .collect();

        let mut histograms = vec![vec![0.0f32; book.len()]; self.map.num_instances()];
        let mut assignments = Vec::with_capacity(stream.len());
        for (f, post) in posteriors.iter().enumerate() {
            let Some(post) = post else {
                assignments.push(SmallVec::new());
                continue;
            };
            for instance in self.map.instances_of(FrameId(f)) {
                for (cell, p) in histograms[instance.index()].iter_mut().zip(post) {
                    *cell += p;
                }
            }
            let best = post
                .iter()
                .enumerate()
                .max_by_key(|(_, &p)| OrderedFloat(p))
                .map_or(CodewordId(0), |(c, _)| CodewordId(c));
            assignments.push(SmallVec::from_elem(best, 1));
        }
        self.fill_empty_instances(&mut histograms);
        Ok(BagOfFeatures {
            histograms,
            assignments: Some(assignments),
        })
    }

    /// Encode one document per frame against a text vocabulary
    pub fn encode_text(&self, book: &TextCodebook, documents: &[String]) -> Result<BagOfFeatures> {
        if documents.len() != self.map.num_frames() {
            return Err(Error::InvalidDimension {
                expected: self.map.num_frames(),
                actual: documents.len(),
            });
        }
        let matches: Vec<Vec<CodewordId>> = documents
            .par_iter()
            .enumerate()
            .map(|(f, doc)| {
                if self.map.instances_of(FrameId(f)).is_empty() {
                    Vec::new()
                } else {
                    book.matches(doc)
                }
            })
            .collect();

        let mut histograms = vec![vec![0.0f32; book.len()]; self.map.num_instances()];
        for (f, words) in matches.iter().enumerate() {
            for instance in self.map.instances_of(FrameId(f)) {
                for c in words {
                    histograms[instance.index()][c.index()] += 1.0;
                }
            }
        }
        self.fill_empty_instances(&mut histograms);
        Ok(BagOfFeatures {
            histograms,
            assignments: None,
        })
    }

    fn check_stream(&self, book: &NumericCodebook, stream: &[Vec<f32>]) -> Result<()> {
        if stream.len() != self.map.num_frames() {
            return Err(Error::InvalidDimension {
                expected: self.map.num_frames(),
                actual: stream.len(),
            });
        }
        if book.is_empty() {
            return Err(Error::config("cannot assign frames to an empty codebook"));
        }
        if let Some(bad) = stream.iter().find(|x| x.len() != book.dim()) {
            return Err(Error::InvalidDimension {
                expected: book.dim(),
                actual: bad.len(),
            });
        }
        Ok(())
    }

    /// Instances without any contributing frame get a small constant row
    fn fill_empty_instances(&self, histograms: &mut [Vec<f32>]) {
        let mut filled = 0usize;
        for (row, instance) in histograms.iter_mut().zip(self.map.instances()) {
            if instance.num_frames == 0 {
                row.iter_mut().for_each(|v| *v = ZERO_FRAME_FILL);
                filled += 1;
            }
        }
        if filled > 0 {
            debug!("{} instances without frames filled with {}", filled, ZERO_FRAME_FILL);
        }
    }
}

/// Single nearest codeword of every frame
pub fn hard_assignments(book: &NumericCodebook, stream: &[Vec<f32>]) -> Vec<CodewordId> {
    stream
        .par_iter()
        .map(|x| {
            nearest_codewords(book.codewords(), x, 1)
                .first()
                .map_or(CodewordId(0), |&(c, _)| c)
        })
        .collect()
}

/// The `a` closest codewords with their squared distances, closest first.
/// Repeated minimum extraction; equal distances resolve to the lower index.
fn nearest_codewords(codewords: &[Vector], x: &[f32], a: usize) -> SmallVec<[(CodewordId, f32); 4]> {
    let distances: Vec<f32> = codewords.iter().map(|c| c.squared_distance(x)).collect();
    let mut used = vec![false; distances.len()];
    let mut selected = SmallVec::new();
    for _ in 0..a.min(distances.len()) {
        let best = distances
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .min_by_key(|(_, &d)| OrderedFloat(d));
        if let Some((i, &d)) = best {
            used[i] = true;
            selected.push((CodewordId(i), d));
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::{GmmParams, Tokenizer};
    use crate::config::AssignmentConfig;
    use crate::frame::Frame;
    use crate::mapping::InstanceMapper;
    use crate::ngram::NGramCodebook;

    fn book(codewords: &[f32], assignment: AssignmentConfig) -> NumericCodebook {
        NumericCodebook::from_parts(
            codewords.iter().map(|&c| Vector::new(vec![c])).collect(),
            None,
            None,
            assignment,
        )
        .unwrap()
    }

    fn two_instances() -> (InstanceMap, Vec<Vec<f32>>) {
        let frames: Vec<Frame> = [("a", 1.0), ("a", 2.0), ("a", 3.0), ("b", 10.0), ("b", 11.0), ("b", 12.0)]
            .iter()
            .map(|&(n, x)| Frame::numeric(n, &[x]))
            .collect();
        let map = InstanceMapper::new(None).map(&frames, &[true; 6]).unwrap();
        let stream = frames.iter().map(|f| f.numeric_subset(&[0]).unwrap()).collect();
        (map, stream)
    }

    #[test]
    fn test_hard_assignment_counts() {
        let (map, stream) = two_instances();
        let bag = AssignmentEngine::new(&map)
            .encode_numeric(&book(&[2.0, 11.0], AssignmentConfig::default()), &stream)
            .unwrap();
        assert_eq!(bag.histograms, vec![vec![3.0, 0.0], vec![0.0, 3.0]]);
        let assignments = bag.assignments.unwrap();
        assert_eq!(assignments[4].as_slice(), &[CodewordId(1)]);
    }

    #[test]
    fn test_multi_assignment_and_ties() {
        let codewords = vec![Vector::new(vec![0.0]), Vector::new(vec![2.0]), Vector::new(vec![5.0])];
        let picked = nearest_codewords(&codewords, &[1.0], 2);
        assert_eq!(picked[0].0, CodewordId(0));
        assert_eq!(picked[1].0, CodewordId(1));
    }

    #[test]
    fn test_gaussian_and_off_codeword() {
        let (map, stream) = two_instances();
        let options = AssignmentConfig {
            gaussian_sigma: Some(1.0),
            off_threshold: Some(0.5),
            ..Default::default()
        };
        let bag = AssignmentEngine::new(&map)
            .encode_numeric(&book(&[2.0, 11.0], options), &stream)
            .unwrap();
        // only the frames lying on a codeword pass the threshold, each adding exp(0)
        assert_eq!(bag.histograms, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let soft = AssignmentConfig {
            gaussian_sigma: Some(1.0),
            ..Default::default()
        };
        let bag = AssignmentEngine::new(&map)
            .encode_numeric(&book(&[2.0, 11.0], soft), &stream)
            .unwrap();
        let expected = 1.0 + 2.0 * (-0.5f32).exp();
        assert!((bag.histograms[0][0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_too_many_assignments() {
        let (map, stream) = two_instances();
        let options = AssignmentConfig {
            num_assignments: 3,
            ..Default::default()
        };
        let err = AssignmentEngine::new(&map)
            .encode_numeric(&book(&[2.0, 11.0], options), &stream)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_frame_instance_is_smoothed() {
        let frames = vec![Frame::numeric("a", &[1.0]), Frame::numeric("b", &[2.0])];
        let map = InstanceMapper::new(None).map(&frames, &[true, false]).unwrap();
        let stream = vec![vec![1.0], vec![2.0]];
        let bag = AssignmentEngine::new(&map)
            .encode_numeric(&book(&[1.0, 2.0], AssignmentConfig::default()), &stream)
            .unwrap();
        assert_eq!(bag.histograms[0], vec![1.0, 0.0]);
        assert!(bag.histograms[1].iter().all(|&v| v == ZERO_FRAME_FILL));
    }

    #[test]
    fn test_posterior_rows_sum_to_frame_count() {
        let (map, stream) = two_instances();
        let gmm = NumericCodebook::from_parts(
            vec![Vector::new(vec![2.0]), Vector::new(vec![11.0])],
            Some(GmmParams {
                mixture_weights: vec![0.5, 0.5],
                covariances: vec![vec![1.0], vec![1.0]],
            }),
            None,
            AssignmentConfig {
                posterior: Some(PosteriorMode::Uniform),
                ..Default::default()
            },
        )
        .unwrap();
        let bag = AssignmentEngine::new(&map).encode_numeric(&gmm, &stream).unwrap();
        for row in &bag.histograms {
            assert!((row.iter().sum::<f32>() - 3.0).abs() < 1e-5);
        }
        assert!(bag.histograms[0][0] > 2.99);
    }

    #[test]
    fn test_ngram_codebook_replaces_unigram_counts() {
        let (map, stream) = two_instances();
        let mut nbook = book(&[2.0, 11.0], AssignmentConfig::default());
        let grams = NGramCodebook::new([None, Some(vec![SmallVec::from_slice(&[0, 0])]), None]);
        nbook.set_ngrams(grams);
        let bag = AssignmentEngine::new(&map).encode_numeric(&nbook, &stream).unwrap();
        assert_eq!(bag.histograms, vec![vec![2.0], vec![0.0]]);
    }

    #[test]
    fn test_text_bag() {
        let frames = vec![
            Frame::text("a", "hello world"),
            Frame::text("a", "hello"),
            Frame::text("b", "bye"),
        ];
        let map = InstanceMapper::new(None).map(&frames, &[true; 3]).unwrap();
        let vocab = TextCodebook::new(Tokenizer::new("", 1, 0), vec!["HELLO".into(), "WORLD".into()]);
        let docs: Vec<String> = frames.iter().map(|f| f.text_subset(&[0]).unwrap()).collect();
        let bag = AssignmentEngine::new(&map).encode_text(&vocab, &docs).unwrap();
        assert_eq!(bag.histograms, vec![vec![2.0, 1.0], vec![0.0, 0.0]]);
    }
}
