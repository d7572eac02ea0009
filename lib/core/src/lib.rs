//! # xbag Core
//!
//! Core library for turning frame-level feature sequences into bags of features.
//!
//! - [`InstanceMapper`] - groups frames into output instances, by name or by time window
//! - [`TrainingSelector`] - picks the vectors a codebook is learned from
//! - [`NumericCodebook`] / [`TextCodebook`] - codeword vocabularies
//! - [`AssignmentEngine`] - per-instance codeword histograms
//! - [`BagPipeline`] - the complete fit / encode flow
//!
//! ## Example
//!
//! ```rust
//! use xbag_core::{BagPipeline, FeatureLayout, Frame, GenerationMethod, NumericCodebookConfig, PipelineConfig};
//!
//! let frames: Vec<Frame> = [("a", 1.0), ("a", 2.0), ("b", 10.0), ("b", 11.0)]
//!     .iter()
//!     .map(|&(name, x)| Frame::numeric(name, &[x]))
//!     .collect();
//!
//! let config = PipelineConfig {
//!     numeric: NumericCodebookConfig::new(2, GenerationMethod::KMeans),
//!     ..Default::default()
//! };
//! let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
//! let (codebook, output) = pipeline.fit(&frames).unwrap();
//!
//! assert_eq!(output.bag.len(), 2);
//! assert_eq!(codebook.bag_width(), 2);
//! ```

pub mod bag;
pub mod codebook;
pub mod config;
pub mod error;
pub mod frame;
pub mod hyperbag;
pub mod mapping;
pub mod ngram;
pub mod pipeline;
pub mod preprocess;
pub mod selector;
pub mod vector;

/// SIMD-optimized distance kernels
///
/// - AVX2/FMA on x86_64
/// - NEON on ARM64/Apple Silicon
pub mod simd;

pub use bag::{AssignmentEngine, BagOfFeatures, FrameAssignment};
pub use codebook::{Codebook, GmmParams, NumericCodebook, TextCodebook, Tokenizer};
pub use config::{
    ActivityFilter, AssignmentConfig, BagNormalization, CodebookConfig, GenerationMethod, NGramConfig,
    NumericCodebookConfig, PipelineConfig, PosteriorMode, SvqConfig, TextCodebookConfig,
    Windowing,
};
pub use error::{Error, Result};
pub use frame::{CodewordId, FeatureLayout, FeatureValue, Frame, FrameId, InstanceId, TEXT_CLASS};
pub use hyperbag::TermWeighting;
pub use mapping::{Instance, InstanceMap, InstanceMapper};
pub use ngram::NGramCodebook;
pub use pipeline::{BagOutput, BagPipeline, HyperCodebook, SplitCodebook};
pub use preprocess::Scaler;
pub use selector::{TrainingSelector, TrainingSet};
pub use vector::Vector;
