//! Block mean value perceptual hashing.
//!
//! An image is normalized to a square grayscale raster, cut into a grid of
//! blocks, and each block's mean intensity is binarized against the median
//! of all block means. Two hashes are compared by Hamming distance against a
//! tunable threshold.
//!
//! ```no_run
//! use bmvhash::{BmvConfig, Matcher, Normalizer, BlockMeanHasher};
//!
//! # fn main() -> bmvhash::Result<()> {
//! let cfg = BmvConfig::default();
//! let normalizer = Normalizer::from_config(&cfg);
//! let hasher = BlockMeanHasher::from_config(&cfg);
//! let a = hasher.hash(&normalizer.normalize_path("a.png".as_ref())?)?;
//! let b = hasher.hash(&normalizer.normalize_path("b.png".as_ref())?)?;
//! let cmp = Matcher::new(cfg.threshold).compare(&a, &b)?;
//! println!("hd: {}; match: {}", cmp.distance, cmp.is_match);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod hasher;
pub mod matcher;
pub mod normalize;
pub mod report;

pub use config::{BmvConfig, ResizeFilter};
pub use dedupe::{DedupeOutcome, DuplicateOf, PerceptualDeduper};
pub use error::{Error, ErrorKind, Result};
pub use hasher::{hash, BlockMeanHasher, Hash, NormalizedImage};
pub use matcher::{distance, is_match, Comparison, Matcher};
pub use normalize::Normalizer;
