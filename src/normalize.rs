use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

use crate::config::BmvConfig;
use crate::error::{Error, Result};
use crate::hasher::NormalizedImage;

/// Turns arbitrary raster input into a `side x side` grayscale image.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    side: u32,
    filter: FilterType,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&BmvConfig::default())
    }
}

impl Normalizer {
    pub fn new(side: u32, filter: FilterType) -> Self {
        Self { side, filter }
    }

    pub fn from_config(cfg: &BmvConfig) -> Self {
        Self::new(cfg.side, cfg.filter.into())
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedImage> {
        let img = image::load_from_memory(bytes)?;
        self.normalize_image(img)
    }

    pub fn normalize_path(&self, path: &Path) -> Result<NormalizedImage> {
        let img = image::open(path)?;
        self.normalize_image(img)
    }

    /// Grayscale first, then resize.
    pub fn normalize_image(&self, img: DynamicImage) -> Result<NormalizedImage> {
        if self.side == 0 {
            return Err(Error::Config("side must be positive".into()));
        }
        if img.width() == 0 || img.height() == 0 {
            return Err(Error::EmptyImage);
        }
        let gray = img.to_luma8();
        let gray = if gray.dimensions() == (self.side, self.side) {
            gray
        } else {
            image::imageops::resize(&gray, self.side, self.side, self.filter)
        };
        NormalizedImage::from_gray(gray)
    }
}
