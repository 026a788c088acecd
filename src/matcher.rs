use serde::Serialize;

use crate::config::DEFAULT_THRESHOLD;
use crate::error::{Error, Result};
use crate::hasher::Hash;

/// Number of bit positions where `a` and `b` differ.
///
/// Hashes of different lengths come from different configurations and are
/// never compared.
pub fn distance(a: &Hash, b: &Hash) -> Result<u32> {
    if a.len() != b.len() {
        return Err(Error::LengthMismatch { left: a.len(), right: b.len() });
    }
    Ok(a.words().iter().zip(b.words()).map(|(x, y)| (x ^ y).count_ones()).sum())
}

/// Inclusive threshold: a distance equal to `threshold` still matches.
pub fn is_match(distance: u32, threshold: u32) -> bool {
    distance <= threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub distance: u32,
    pub bits: usize,
    pub threshold: u32,
    pub is_match: bool,
}

impl Comparison {
    /// Distance as a share of the hash length.
    pub fn fraction(&self) -> f64 {
        if self.bits == 0 {
            0.0
        } else {
            self.distance as f64 / self.bits as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    threshold: u32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl Matcher {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn compare(&self, a: &Hash, b: &Hash) -> Result<Comparison> {
        let d = distance(a, b)?;
        Ok(Comparison {
            distance: d,
            bits: a.len(),
            threshold: self.threshold,
            is_match: is_match(d, self.threshold),
        })
    }
}
