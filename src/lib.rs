//! # xbag
//!
//! Crossmodal bag-of-words: turns sequences of frame-level numeric and text
//! features into fixed-length histograms over learned codebooks.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! xbag -i features.csv -o bags.csv --size 100 --method kmeans++ --save codebook.txt
//! xbag -i test.csv -o test_bags.csv --load codebook.txt
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use xbag::prelude::*;
//!
//! let frames: Vec<Frame> = [("a", 1.0), ("a", 2.0), ("b", 10.0), ("b", 12.0)]
//!     .iter()
//!     .map(|&(name, x)| Frame::numeric(name, &[x]))
//!     .collect();
//!
//! let config = PipelineConfig {
//!     numeric: NumericCodebookConfig::new(2, GenerationMethod::KMeansPlusPlus),
//!     idf_weighting: true,
//!     ..Default::default()
//! };
//! let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
//! let (codebook, bags) = pipeline.fit(&frames).unwrap();
//!
//! // a reloaded codebook encodes exactly like the fitted one
//! let reloaded = xbag::storage::decode(&xbag::storage::encode(&codebook).unwrap()).unwrap();
//! assert_eq!(pipeline.encode(&reloaded, &frames).unwrap(), bags);
//! ```
//!
//! ## Crate Structure
//!
//! - [`xbag-core`](https://docs.rs/xbag-core) - Instance mapping, codebook generation, assignment, weighting
//! - [`xbag-storage`](https://docs.rs/xbag-storage) - Codebook file format and atomic persistence

pub mod table;

// Re-export core types
pub use xbag_core::{
    BagNormalization, BagOutput, BagPipeline, Codebook, Error, FeatureLayout, FeatureValue,
    Frame, GenerationMethod, HyperCodebook, Instance, NumericCodebook, NumericCodebookConfig,
    PipelineConfig, Result, TextCodebook, TextCodebookConfig, Windowing,
};

// Re-export storage
pub use xbag_storage::CodebookStore;

/// Codebook file encoding
pub mod storage {
    pub use xbag_storage::{decode, encode};
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BagNormalization, BagOutput, BagPipeline, Codebook, CodebookStore, Error, FeatureLayout,
        FeatureValue, Frame, GenerationMethod, HyperCodebook, Instance, NumericCodebook,
        NumericCodebookConfig, PipelineConfig, Result, TextCodebook, TextCodebookConfig,
        Windowing,
    };
}
