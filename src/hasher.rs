//! Block mean value hashing.
//!
//! A normalized square grayscale image is cut into a `B x B` grid of tiles.
//! Each tile contributes one bit: 1 when its mean intensity is at or above
//! the median of all tile means, 0 below it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BmvConfig;
use crate::error::{Error, Result};

/// Square, single-channel 8-bit raster ready for hashing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    gray: GrayImage,
}

impl NormalizedImage {
    pub fn from_gray(gray: GrayImage) -> Result<Self> {
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::EmptyImage);
        }
        if w != h {
            return Err(Error::NotSquare { width: w, height: h });
        }
        Ok(Self { gray })
    }

    /// Accepts only `L8` images; anything else is a collaborator contract violation.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        match img {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray.clone()),
            other => Err(Error::NotGrayscale(other.color())),
        }
    }

    /// Row-major pixels of a `side x side` image.
    pub fn from_raw(side: u32, pixels: Vec<u8>) -> Result<Self> {
        if side == 0 {
            return Err(Error::EmptyImage);
        }
        let expected = side as usize * side as usize;
        let actual = pixels.len();
        // from_raw alone would accept an oversized buffer
        let gray = GrayImage::from_raw(side, side, pixels)
            .filter(|_| actual == expected)
            .ok_or(Error::PixelCount { side, expected, actual })?;
        Ok(Self { gray })
    }

    pub fn side(&self) -> u32 {
        self.gray.width()
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.gray.get_pixel(x, y)[0]
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.gray
    }
}

/// Fixed-length bit fingerprint. Bit `i` belongs to block `i` in row-major order.
///
/// Bits live in 64-bit words, LSB first; bits past `len` are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HashRepr", into = "HashRepr")]
pub struct Hash {
    words: Vec<u64>,
    len: usize,
}

impl Hash {
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            words[i / 64] |= 1u64 << (i % 64);
        }
        Self { words, len: bits.len() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at `index`, or `None` past the end.
    pub fn bit(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| (self.words[index / 64] >> (index % 64)) & 1 == 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| (self.words[i / 64] >> (i % 64)) & 1 == 1)
    }

    pub fn to_bits(&self) -> Vec<bool> {
        self.iter().collect()
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(self.len.div_ceil(8));
        bytes
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parses the output of [`Hash::to_base64`]; `bits` must be the original length.
    pub fn from_base64(s: &str, bits: usize) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedHash { expected: bits, reason };
        let bytes = STANDARD.decode(s.trim()).map_err(|e| malformed(e.to_string()))?;
        if bytes.len() != bits.div_ceil(8) {
            return Err(malformed(format!("decoded {} bytes", bytes.len())));
        }
        let mut words = vec![0u64; bits.div_ceil(64)];
        for (i, byte) in bytes.iter().enumerate() {
            words[i / 8] |= (*byte as u64) << ((i % 8) * 8);
        }
        let hash = Self { words, len: bits };
        let tail = bits % 64;
        if tail != 0 && hash.words.last().is_some_and(|w| w >> tail != 0) {
            return Err(malformed("bits set past the hash length".into()));
        }
        Ok(hash)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.iter() {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct HashRepr {
    bits: usize,
    base64: String,
}

impl From<Hash> for HashRepr {
    fn from(h: Hash) -> Self {
        Self { bits: h.len, base64: h.to_base64() }
    }
}

impl TryFrom<HashRepr> for Hash {
    type Error = Error;

    fn try_from(r: HashRepr) -> Result<Self> {
        Hash::from_base64(&r.base64, r.bits)
    }
}

/// Start offset and length of each tile along one axis.
///
/// `side` is split into `divisor` segments of `side / divisor` pixels; the
/// last `side % divisor` segments take one extra pixel each.
pub fn tile_spans(side: u32, divisor: u32) -> Result<Vec<(u32, u32)>> {
    if divisor == 0 || divisor > side {
        return Err(Error::BlockDivisor { divisor, side });
    }
    let base = side / divisor;
    let rem = side % divisor;
    let first_wide = divisor - rem;
    Ok((0..divisor)
        .map(|i| {
            let start = i * base + i.saturating_sub(first_wide);
            let len = if i >= first_wide { base + 1 } else { base };
            (start, len)
        })
        .collect())
}

/// Mean intensity of every tile, row-major over the tile grid.
pub fn block_means(image: &NormalizedImage, divisor: u32) -> Result<Vec<f64>> {
    let spans = tile_spans(image.side(), divisor)?;
    let mut means = Vec::with_capacity(spans.len() * spans.len());
    for &(y0, h) in &spans {
        for &(x0, w) in &spans {
            let mut sum: u64 = 0;
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    sum += image.pixel(x, y) as u64;
                }
            }
            means.push(sum as f64 / (w as u64 * h as u64) as f64);
        }
    }
    Ok(means)
}

/// Median of a non-empty slice; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    })
}

/// Hash `image` on a `block_divisor x block_divisor` grid.
pub fn hash(image: &NormalizedImage, block_divisor: u32) -> Result<Hash> {
    let means = block_means(image, block_divisor)?;
    let md = median(&means)
        .ok_or(Error::BlockDivisor { divisor: block_divisor, side: image.side() })?;
    // A mean equal to the median maps to 1.
    let bits: Vec<bool> = means.iter().map(|m| *m >= md).collect();
    let hash = Hash::from_bits(&bits);
    tracing::debug!(
        side = image.side(),
        blocks = block_divisor,
        median = md,
        ones = hash.count_ones(),
        "computed block mean hash"
    );
    Ok(hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeanHasher {
    block_divisor: u32,
}

impl Default for BlockMeanHasher {
    fn default() -> Self {
        Self { block_divisor: crate::config::DEFAULT_BLOCK_DIVISOR }
    }
}

impl BlockMeanHasher {
    pub fn new(block_divisor: u32) -> Self {
        Self { block_divisor }
    }

    pub fn from_config(cfg: &BmvConfig) -> Self {
        Self::new(cfg.block_divisor)
    }

    pub fn block_divisor(&self) -> u32 {
        self.block_divisor
    }

    pub fn hash(&self, image: &NormalizedImage) -> Result<Hash> {
        hash(image, self.block_divisor)
    }
}
