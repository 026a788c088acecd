use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

pub const DEFAULT_SIDE: u32 = 256;
pub const DEFAULT_BLOCK_DIVISOR: u32 = 24;
pub const DEFAULT_THRESHOLD: u32 = 8;

/// Resampling filter used when normalizing to the square side length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(f: ResizeFilter) -> Self {
        match f {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// All tunables of the pipeline. Hashes are only comparable when `side`,
/// `block_divisor` and `filter` agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BmvConfig {
    /// Side length S of the normalized square image.
    pub side: u32,
    /// Blocks per axis; a hash has `block_divisor²` bits.
    pub block_divisor: u32,
    /// Largest Hamming distance still considered a match.
    pub threshold: u32,
    pub filter: ResizeFilter,
}

impl Default for BmvConfig {
    fn default() -> Self {
        Self {
            side: DEFAULT_SIDE,
            block_divisor: DEFAULT_BLOCK_DIVISOR,
            threshold: DEFAULT_THRESHOLD,
            filter: ResizeFilter::default(),
        }
    }
}

impl BmvConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self> {
        let cfg: BmvConfig = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&txt)
    }

    pub fn validate(&self) -> Result<()> {
        if self.side == 0 {
            return Err(Error::Config("side must be positive".into()));
        }
        if self.block_divisor == 0 || self.block_divisor > self.side {
            return Err(Error::BlockDivisor { divisor: self.block_divisor, side: self.side });
        }
        Ok(())
    }

    /// Number of bits in hashes produced under this configuration.
    pub fn hash_bits(&self) -> usize {
        let b = self.block_divisor as usize;
        b * b
    }
}
