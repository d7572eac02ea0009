//! Immutable configuration values passed explicitly into every generation
//! and encoding call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::frame::TEXT_CLASS;

/// Upper bound on Lloyd and EM iterations
pub const MAX_ITERATIONS: usize = 500;

/// Tolerance used for duplicate detection, timestamp windows and label checks
pub const EPSILON: f32 = 1e-4;

/// Histogram value given to instances that received no frame at all
pub const ZERO_FRAME_FILL: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationMethod {
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "random++")]
    RandomPlusPlus,
    #[serde(rename = "kmeans")]
    KMeans,
    #[serde(rename = "kmeans++")]
    KMeansPlusPlus,
    #[serde(rename = "kmeansnorm")]
    KMeansNorm,
    #[serde(rename = "kmeans++norm")]
    KMeansPlusPlusNorm,
    #[serde(rename = "em")]
    Em,
    #[serde(rename = "em++")]
    EmPlusPlus,
    #[serde(rename = "em-kmeans")]
    EmKMeans,
    #[serde(rename = "em-kmeans++")]
    EmKMeansPlusPlus,
    #[serde(rename = "generic")]
    Generic,
}

impl GenerationMethod {
    pub const ALL: [GenerationMethod; 11] = [
        GenerationMethod::Random,
        GenerationMethod::RandomPlusPlus,
        GenerationMethod::KMeans,
        GenerationMethod::KMeansPlusPlus,
        GenerationMethod::KMeansNorm,
        GenerationMethod::KMeansPlusPlusNorm,
        GenerationMethod::Em,
        GenerationMethod::EmPlusPlus,
        GenerationMethod::EmKMeans,
        GenerationMethod::EmKMeansPlusPlus,
        GenerationMethod::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMethod::Random => "random",
            GenerationMethod::RandomPlusPlus => "random++",
            GenerationMethod::KMeans => "kmeans",
            GenerationMethod::KMeansPlusPlus => "kmeans++",
            GenerationMethod::KMeansNorm => "kmeansnorm",
            GenerationMethod::KMeansPlusPlusNorm => "kmeans++norm",
            GenerationMethod::Em => "em",
            GenerationMethod::EmPlusPlus => "em++",
            GenerationMethod::EmKMeans => "em-kmeans",
            GenerationMethod::EmKMeansPlusPlus => "em-kmeans++",
            GenerationMethod::Generic => "generic",
        }
    }

    /// Gaussian mixture codebooks carry mixture weights and covariances
    pub fn is_em(self) -> bool {
        matches!(
            self,
            GenerationMethod::Em
                | GenerationMethod::EmPlusPlus
                | GenerationMethod::EmKMeans
                | GenerationMethod::EmKMeansPlusPlus
        )
    }

    /// Seeding draws centers proportional to squared distance
    pub fn uses_plus_plus(self) -> bool {
        matches!(
            self,
            GenerationMethod::RandomPlusPlus
                | GenerationMethod::KMeansPlusPlus
                | GenerationMethod::KMeansPlusPlusNorm
                | GenerationMethod::EmPlusPlus
                | GenerationMethod::EmKMeansPlusPlus
        )
    }

    /// Seeds are refined by Lloyd iterations
    pub fn runs_kmeans(self) -> bool {
        matches!(
            self,
            GenerationMethod::KMeans
                | GenerationMethod::KMeansPlusPlus
                | GenerationMethod::KMeansNorm
                | GenerationMethod::KMeansPlusPlusNorm
                | GenerationMethod::EmKMeans
                | GenerationMethod::EmKMeansPlusPlus
        )
    }

    /// Per-dimension min-max scaling inside the k-means distance
    pub fn normalizes_distance(self) -> bool {
        matches!(
            self,
            GenerationMethod::KMeansNorm | GenerationMethod::KMeansPlusPlusNorm
        )
    }
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GenerationMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::config(format!("unknown codebook generation method '{}'", s)))
    }
}

/// Prior used when turning GMM likelihoods into a posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PosteriorMode {
    /// Every component weighted equally
    Uniform,
    /// Components weighted by the learned mixture weights
    Prior,
}

impl PosteriorMode {
    pub fn code(self) -> u8 {
        match self {
            PosteriorMode::Uniform => 1,
            PosteriorMode::Prior => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PosteriorMode::Uniform),
            2 => Some(PosteriorMode::Prior),
            _ => None,
        }
    }
}

/// How frames are turned into histogram increments for a numeric codebook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Number of nearest codewords incremented per frame
    pub num_assignments: usize,
    /// Gaussian soft encoding: increment `exp(-d2 / (2 sigma^2))`
    pub gaussian_sigma: Option<f32>,
    /// Skip increments whose Euclidean distance exceeds this threshold
    pub off_threshold: Option<f32>,
    /// Add the full GMM posterior instead of nearest-codeword counts
    pub posterior: Option<PosteriorMode>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            num_assignments: 1,
            gaussian_sigma: None,
            off_threshold: None,
            posterior: None,
        }
    }
}

impl AssignmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_assignments == 0 {
            return Err(Error::config("number of assignments must be at least 1"));
        }
        if let Some(sigma) = self.gaussian_sigma {
            if !(sigma > 0.0) {
                return Err(Error::config("gaussian sigma must be positive"));
            }
        }
        if let Some(off) = self.off_threshold {
            if !(off > 0.0) {
                return Err(Error::config("off-codeword threshold must be positive"));
            }
        }
        Ok(())
    }
}

/// Maximum vocabulary size per n-gram order; 0 disables that order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NGramConfig {
    pub max_unigrams: usize,
    pub max_bigrams: usize,
    pub max_trigrams: usize,
}

impl NGramConfig {
    /// Size cap for gram order 1..=3, if enabled
    pub fn max_size(&self, order: usize) -> Option<usize> {
        let size = match order {
            1 => self.max_unigrams,
            2 => self.max_bigrams,
            3 => self.max_trigrams,
            _ => 0,
        };
        (size > 0).then_some(size)
    }

    pub fn is_empty(&self) -> bool {
        self.max_unigrams == 0 && self.max_bigrams == 0 && self.max_trigrams == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericCodebookConfig {
    pub size: usize,
    pub method: GenerationMethod,
    pub random_seed: u64,
    pub supervised: bool,
    /// 0 means every eligible frame is used for training
    pub num_training: usize,
    /// Merge codewords whose Pearson correlation exceeds this value
    pub reduce_threshold: Option<f32>,
    /// Offset of the data-independent generic codebook
    pub generic_offset: f32,
    pub ngrams: Option<NGramConfig>,
    pub assignment: AssignmentConfig,
}

impl Default for NumericCodebookConfig {
    fn default() -> Self {
        Self {
            size: 500,
            method: GenerationMethod::RandomPlusPlus,
            random_seed: 10,
            supervised: false,
            num_training: 0,
            reduce_threshold: None,
            generic_offset: 1.0,
            ngrams: None,
            assignment: AssignmentConfig::default(),
        }
    }
}

impl NumericCodebookConfig {
    pub fn new(size: usize, method: GenerationMethod) -> Self {
        Self {
            size,
            method,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    #[must_use]
    pub fn with_supervised(mut self, supervised: bool) -> Self {
        self.supervised = supervised;
        self
    }

    #[must_use]
    pub fn with_num_training(mut self, num_training: usize) -> Self {
        self.num_training = num_training;
        self
    }

    #[must_use]
    pub fn with_reduction(mut self, threshold: f32) -> Self {
        self.reduce_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_ngrams(mut self, ngrams: NGramConfig) -> Self {
        self.ngrams = Some(ngrams);
        self
    }

    #[must_use]
    pub fn with_assignment(mut self, assignment: AssignmentConfig) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 && self.method != GenerationMethod::Generic {
            return Err(Error::config("codebook size must be positive"));
        }
        if self.reduce_threshold.is_some() && self.method.is_em() {
            return Err(Error::config(
                "codebook reduction cannot be applied to a GMM codebook",
            ));
        }
        if let Some(threshold) = self.reduce_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(Error::config("reduction threshold must lie in [-1, 1]"));
            }
        }
        if self.assignment.posterior.is_some() && !self.method.is_em() {
            return Err(Error::config(format!(
                "GMM posterior assignment requires an EM codebook, got '{}'",
                self.method
            )));
        }
        if self.ngrams.as_ref().is_some_and(NGramConfig::is_empty) {
            return Err(Error::config("n-gram codebook without any enabled order"));
        }
        // generic codebook size follows the feature count
        if self.method != GenerationMethod::Generic && self.assignment.num_assignments > self.size {
            return Err(Error::config(format!(
                "{} assignments requested for a codebook of {} codewords",
                self.assignment.num_assignments, self.size
            )));
        }
        self.assignment.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextCodebookConfig {
    pub min_term_freq: usize,
    /// 0 means unbounded
    pub max_term_freq: usize,
    pub stop_chars: String,
    /// Maximum word n-gram order (all orders 1..=n are kept)
    pub n_gram: usize,
    /// Character n-gram length, 0 disables
    pub n_char_gram: usize,
}

impl Default for TextCodebookConfig {
    fn default() -> Self {
        Self {
            min_term_freq: 1,
            max_term_freq: 0,
            stop_chars: String::new(),
            n_gram: 1,
            n_char_gram: 0,
        }
    }
}

impl TextCodebookConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_gram > 1 && self.n_char_gram > 0 {
            return Err(Error::config(
                "word n-grams and character n-grams cannot be combined",
            ));
        }
        if self.max_term_freq > 0 && self.max_term_freq < self.min_term_freq {
            return Err(Error::config(format!(
                "maximum term frequency {} is below minimum {}",
                self.max_term_freq, self.min_term_freq
            )));
        }
        Ok(())
    }
}

/// Generation settings of a single codebook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CodebookConfig {
    Numeric(NumericCodebookConfig),
    Text(TextCodebookConfig),
}

impl CodebookConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            CodebookConfig::Numeric(c) => c.validate(),
            CodebookConfig::Text(c) => c.validate(),
        }
    }
}

/// Sliding-window segmentation of each named recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Windowing {
    pub size: f32,
    pub hop: f32,
}

impl Windowing {
    pub fn new(size: f32, hop: f32) -> Self {
        Self { size, hop }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.size > 0.0) || !(self.hop > 0.0) {
            return Err(Error::config(format!(
                "window size and hop must be positive (got {} / {})",
                self.size, self.hop
            )));
        }
        Ok(())
    }
}

/// Frames whose energy feature is below `threshold` are inactive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityFilter {
    /// Feature column holding the energy descriptor
    pub column: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BagNormalization {
    /// Divide by the number of contributing frames
    FrameCount,
    /// Divide by the sum of term frequencies
    TermFrequency,
    /// Scale to unit Euclidean length
    UnitLength,
}

impl BagNormalization {
    pub fn from_code(code: u8) -> Result<Option<Self>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(BagNormalization::FrameCount)),
            2 => Ok(Some(BagNormalization::TermFrequency)),
            3 => Ok(Some(BagNormalization::UnitLength)),
            other => Err(Error::config(format!("unknown bag normalization mode {}", other))),
        }
    }
}

/// Split vector quantization of numeric class 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvqConfig {
    pub num_sub_vectors: usize,
    pub sub_codebook: NumericCodebookConfig,
}

/// Everything needed to fit a hyper codebook and encode bags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub windowing: Option<Windowing>,
    pub activity: Option<ActivityFilter>,
    pub standardize_input: bool,
    pub normalize_input: bool,
    pub text: TextCodebookConfig,
    /// Settings shared by every numeric feature class
    pub numeric: NumericCodebookConfig,
    /// Per-class replacements of `numeric`
    pub class_overrides: BTreeMap<u32, NumericCodebookConfig>,
    pub svq: Option<SvqConfig>,
    pub log_weighting: bool,
    pub idf_weighting: bool,
    pub normalization: Option<BagNormalization>,
    pub standardize_output: bool,
    pub normalize_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windowing: None,
            activity: None,
            standardize_input: false,
            normalize_input: false,
            text: TextCodebookConfig::default(),
            numeric: NumericCodebookConfig::default(),
            class_overrides: BTreeMap::new(),
            svq: None,
            log_weighting: false,
            idf_weighting: false,
            normalization: None,
            standardize_output: false,
            normalize_output: false,
        }
    }
}

impl PipelineConfig {
    /// Codebook settings for a numeric feature class
    pub fn numeric_for(&self, class: u32) -> &NumericCodebookConfig {
        self.class_overrides.get(&class).unwrap_or(&self.numeric)
    }

    /// Codebook settings for any feature class; class 0 is text
    pub fn codebook_for(&self, class: u32) -> CodebookConfig {
        if class == TEXT_CLASS {
            CodebookConfig::Text(self.text.clone())
        } else {
            CodebookConfig::Numeric(self.numeric_for(class).clone())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.standardize_input && self.normalize_input {
            return Err(Error::config(
                "input standardization and normalization cannot both be requested",
            ));
        }
        if self.standardize_output && self.normalize_output {
            return Err(Error::config(
                "output standardization and normalization cannot both be requested",
            ));
        }
        if let Some(windowing) = &self.windowing {
            windowing.validate()?;
        }
        self.text.validate()?;
        self.numeric.validate()?;
        for config in self.class_overrides.values() {
            config.validate()?;
        }
        if let Some(svq) = &self.svq {
            if svq.num_sub_vectors == 0 {
                return Err(Error::config("split VQ needs at least one sub-vector"));
            }
            svq.sub_codebook.validate()?;
            if svq.sub_codebook.ngrams.is_some() || svq.sub_codebook.assignment.posterior.is_some() {
                return Err(Error::config(
                    "split VQ sub-codebooks use plain hard assignment",
                ));
            }
        }
        Ok(())
    }
}
