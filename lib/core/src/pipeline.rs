//! End-to-end fitting of a hyper codebook and encoding of bags.

use tracing::info;

use crate::bag::{hard_assignments, AssignmentEngine, FrameAssignment};
use crate::codebook::{Codebook, NumericCodebook, TextCodebook};
use crate::config::{
    ActivityFilter, CodebookConfig, NumericCodebookConfig, PipelineConfig, SvqConfig,
};
use crate::error::{Error, Result};
use crate::frame::{FeatureLayout, Frame, TEXT_CLASS};
use crate::hyperbag::{aggregate, TermWeighting};
use crate::mapping::{Instance, InstanceMap, InstanceMapper};
use crate::ngram::{source_sequences, NGramCodebook};
use crate::preprocess::{activity_mask, Scaler};
use crate::selector::TrainingSelector;

/// Split vector quantization: one sub-codebook per block of numeric columns
/// and a top-level codebook over the stream of sub-codeword indices
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCodebook {
    pub sub_codebooks: Vec<NumericCodebook>,
    pub top: NumericCodebook,
}

/// Everything needed to encode new data exactly like the fitting run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HyperCodebook {
    pub activity: Option<ActivityFilter>,
    pub input_scaler: Option<Scaler>,
    pub weighting: TermWeighting,
    /// One codebook per feature class, in ascending class order
    pub codebooks: Vec<Codebook>,
    pub split: Option<SplitCodebook>,
    pub output_scaler: Option<Scaler>,
}

impl HyperCodebook {
    /// Total width of the bag produced with this codebook
    pub fn bag_width(&self) -> usize {
        match &self.split {
            Some(split) => split.top.histogram_width(),
            None => self.codebooks.iter().map(Codebook::histogram_width).sum(),
        }
    }
}

/// Result of encoding a frame sequence
#[derive(Debug, Clone, PartialEq)]
pub struct BagOutput {
    pub instances: Vec<Instance>,
    /// One row per instance
    pub bag: Vec<Vec<f32>>,
    /// Per-frame codeword indices of every numeric codebook
    pub assignments: Vec<Vec<FrameAssignment>>,
}

/// Frames after activity filtering, mapping and input scaling
struct Prepared {
    map: InstanceMap,
    numeric_columns: Vec<usize>,
    numeric_rows: Vec<Vec<f32>>,
}

impl Prepared {
    /// Scaled values of a subset of numeric columns, one vector per frame
    fn stream(&self, columns: &[usize]) -> Result<Vec<Vec<f32>>> {
        let positions = columns
            .iter()
            .map(|c| {
                self.numeric_columns
                    .binary_search(c)
                    .map_err(|_| Error::config(format!("feature column {} is not numeric", c)))
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(self
            .numeric_rows
            .iter()
            .map(|row| positions.iter().map(|&p| row[p]).collect())
            .collect())
    }
}

pub struct BagPipeline {
    config: PipelineConfig,
    layout: FeatureLayout,
}

impl BagPipeline {
    pub fn new(config: PipelineConfig, layout: FeatureLayout) -> Result<Self> {
        config.validate()?;
        if config.svq.is_some() && layout.groups().keys().ne([1u32].iter()) {
            return Err(Error::config(
                "split VQ requires every feature in numeric class 1",
            ));
        }
        Ok(Self { config, layout })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Generate every codebook from `frames` and encode them
    pub fn fit(&self, frames: &[Frame]) -> Result<(HyperCodebook, BagOutput)> {
        info!("Fitting codebooks on {} frames", frames.len());
        self.layout.validate(frames)?;

        let active = activity_mask(frames, self.config.activity.as_ref())?;
        let map = InstanceMapper::new(self.config.windowing).map(frames, &active)?;
        let numeric_columns = self.layout.numeric_columns();
        let mut numeric_rows = numeric_matrix(frames, &numeric_columns)?;

        let input_scaler = if self.config.standardize_input {
            Some(Scaler::fit_standardize(&numeric_rows))
        } else if self.config.normalize_input {
            Some(Scaler::fit_normalize(&numeric_rows))
        } else {
            None
        };
        if let Some(scaler) = &input_scaler {
            scaler.apply(&mut numeric_rows)?;
        }
        let prepared = Prepared {
            map,
            numeric_columns,
            numeric_rows,
        };

        let mut hyper = HyperCodebook {
            activity: self.config.activity,
            input_scaler,
            weighting: TermWeighting::new(self.config.log_weighting, self.config.idf_weighting),
            ..Default::default()
        };
        match &self.config.svq {
            Some(svq) => hyper.split = Some(self.fit_split(&prepared, svq)?),
            None => {
                for (class, columns) in self.layout.groups() {
                    let codebook = match self.config.codebook_for(class) {
                        CodebookConfig::Text(config) => {
                            let docs = text_documents(frames, &columns)?;
                            let contributing = prepared
                                .map
                                .contributing_frames()
                                .map(|f| docs[f.index()].as_str());
                            Codebook::Text(TextCodebook::generate(contributing, &config))
                        }
                        CodebookConfig::Numeric(config) => {
                            let stream = prepared.stream(&columns)?;
                            Codebook::Numeric(fit_numeric(&stream, &prepared.map, &config)?)
                        }
                    };
                    hyper.codebooks.push(codebook);
                }
            }
        }

        let (bag, assignments) = self.encode_prepared(&mut hyper, frames, &prepared)?;
        let mut bag = bag;
        hyper.output_scaler = if self.config.standardize_output {
            Some(Scaler::fit_standardize(&bag))
        } else if self.config.normalize_output {
            Some(Scaler::fit_normalize(&bag))
        } else {
            None
        };
        if let Some(scaler) = &hyper.output_scaler {
            scaler.apply(&mut bag)?;
        }

        info!(
            "Fitted hyper codebook: {} instances, bag width {}",
            prepared.map.num_instances(),
            hyper.bag_width()
        );
        let output = BagOutput {
            instances: prepared.map.instances().to_vec(),
            bag,
            assignments,
        };
        Ok((hyper, output))
    }

    /// Encode `frames` with a fitted or loaded hyper codebook
    pub fn encode(&self, hyper: &HyperCodebook, frames: &[Frame]) -> Result<BagOutput> {
        self.layout.validate(frames)?;

        let active = activity_mask(frames, hyper.activity.as_ref())?;
        let map = InstanceMapper::new(self.config.windowing).map(frames, &active)?;
        let numeric_columns = self.layout.numeric_columns();
        let mut numeric_rows = numeric_matrix(frames, &numeric_columns)?;
        if let Some(scaler) = &hyper.input_scaler {
            scaler.apply(&mut numeric_rows)?;
        }
        let prepared = Prepared {
            map,
            numeric_columns,
            numeric_rows,
        };

        // IDF factors missing from a loaded codebook are derived from this data only
        let mut local = hyper.clone();
        let (mut bag, assignments) = self.encode_prepared(&mut local, frames, &prepared)?;
        if let Some(scaler) = &hyper.output_scaler {
            scaler.apply(&mut bag)?;
        }
        Ok(BagOutput {
            instances: prepared.map.instances().to_vec(),
            bag,
            assignments,
        })
    }

    fn encode_prepared(
        &self,
        hyper: &mut HyperCodebook,
        frames: &[Frame],
        prepared: &Prepared,
    ) -> Result<(Vec<Vec<f32>>, Vec<Vec<FrameAssignment>>)> {
        let engine = AssignmentEngine::new(&prepared.map);
        let mut sub_bags = Vec::new();
        let mut assignments = Vec::new();

        if let Some(split) = &hyper.split {
            let top_stream = split_stream(&split.sub_codebooks, prepared)?;
            let bag = engine.encode_numeric(&split.top, &top_stream)?;
            sub_bags.push(bag.histograms);
            assignments.extend(bag.assignments);
        } else {
            let groups = self.layout.groups();
            if groups.len() != hyper.codebooks.len() {
                return Err(Error::config(format!(
                    "{} feature classes but {} codebooks",
                    groups.len(),
                    hyper.codebooks.len()
                )));
            }
            for ((class, columns), codebook) in groups.into_iter().zip(&hyper.codebooks) {
                let bag = match codebook {
                    Codebook::Text(book) if class == TEXT_CLASS => {
                        engine.encode_text(book, &text_documents(frames, &columns)?)?
                    }
                    Codebook::Numeric(book) if class != TEXT_CLASS => {
                        engine.encode_numeric(book, &prepared.stream(&columns)?)?
                    }
                    _ => {
                        return Err(Error::config(format!(
                            "codebook kind does not match feature class {}",
                            class
                        )))
                    }
                };
                sub_bags.push(bag.histograms);
                assignments.extend(bag.assignments);
            }
        }

        let bag = aggregate(
            sub_bags,
            &prepared.map,
            &mut hyper.weighting,
            self.config.normalization,
        )?;
        Ok((bag, assignments))
    }

    fn fit_split(&self, prepared: &Prepared, svq: &SvqConfig) -> Result<SplitCodebook> {
        let blocks = split_blocks(prepared.numeric_columns.len(), svq.num_sub_vectors)?;
        let mut sub_codebooks = Vec::with_capacity(blocks.len());
        for block in blocks {
            let columns = &prepared.numeric_columns[block];
            let stream = prepared.stream(columns)?;
            sub_codebooks.push(fit_numeric(&stream, &prepared.map, &svq.sub_codebook)?);
        }
        let top_stream = split_stream(&sub_codebooks, prepared)?;
        let top = fit_numeric(&top_stream, &prepared.map, self.config.numeric_for(1))?;
        Ok(SplitCodebook { sub_codebooks, top })
    }
}

/// Select training data, generate the codebook and its optional n-gram vocabulary
fn fit_numeric(
    stream: &[Vec<f32>],
    map: &InstanceMap,
    config: &NumericCodebookConfig,
) -> Result<NumericCodebook> {
    let dim = stream.first().map_or(0, Vec::len);
    let training = TrainingSelector::from_config(config).select(stream, map)?;
    let mut book = NumericCodebook::generate(&training, config, dim)?;
    if let Some(ngram_config) = &config.ngrams {
        let hard = hard_assignments(&book, stream);
        let sequences = source_sequences(&hard, map);
        let ngrams = NGramCodebook::build(&sequences, book.len(), ngram_config);
        book.set_ngrams(ngrams);
    }
    Ok(book)
}

/// Contiguous column blocks of `ceil(F / S)` features each
fn split_blocks(num_features: usize, num_sub_vectors: usize) -> Result<Vec<std::ops::Range<usize>>> {
    let block = num_features.div_ceil(num_sub_vectors.max(1));
    if num_sub_vectors == 0 || block == 0 || (num_sub_vectors - 1) * block >= num_features {
        return Err(Error::config(format!(
            "cannot split {} features into {} sub-vectors",
            num_features, num_sub_vectors
        )));
    }
    Ok((0..num_sub_vectors)
        .map(|s| s * block..((s + 1) * block).min(num_features))
        .collect())
}

/// Per-frame vector of sub-codeword indices
fn split_stream(sub_codebooks: &[NumericCodebook], prepared: &Prepared) -> Result<Vec<Vec<f32>>> {
    let blocks = split_blocks(prepared.numeric_columns.len(), sub_codebooks.len())?;
    let mut stream = vec![Vec::with_capacity(blocks.len()); prepared.map.num_frames()];
    for (block, book) in blocks.into_iter().zip(sub_codebooks) {
        let sub_stream = prepared.stream(&prepared.numeric_columns[block])?;
        if let Some(bad) = sub_stream.iter().find(|x| x.len() != book.dim()) {
            return Err(Error::InvalidDimension {
                expected: book.dim(),
                actual: bad.len(),
            });
        }
        for (row, c) in stream.iter_mut().zip(hard_assignments(book, &sub_stream)) {
            row.push(c.index() as f32);
        }
    }
    Ok(stream)
}

fn numeric_matrix(frames: &[Frame], columns: &[usize]) -> Result<Vec<Vec<f32>>> {
    frames.iter().map(|f| f.numeric_subset(columns)).collect()
}

fn text_documents(frames: &[Frame], columns: &[usize]) -> Result<Vec<String>> {
    frames.iter().map(|f| f.text_subset(columns)).collect()
}
