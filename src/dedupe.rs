use parking_lot::Mutex;
use serde::Serialize;

use crate::config::BmvConfig;
use crate::error::Result;
use crate::hasher::{BlockMeanHasher, Hash};
use crate::matcher::{distance, is_match};
use crate::normalize::Normalizer;

/// Closest previously seen image within the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateOf {
    pub label: String,
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupeOutcome {
    pub hash: Hash,
    pub duplicate_of: Option<DuplicateOf>,
}

impl DedupeOutcome {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Flags images whose block mean hash sits within the threshold of one seen before.
pub struct PerceptualDeduper {
    normalizer: Normalizer,
    hasher: BlockMeanHasher,
    /// Largest Hamming distance still treated as "the same image".
    threshold: u32,
    seen: Mutex<Vec<(String, Hash)>>,
}

impl PerceptualDeduper {
    pub fn new(cfg: &BmvConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            normalizer: Normalizer::from_config(cfg),
            hasher: BlockMeanHasher::from_config(cfg),
            threshold: cfg.threshold,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Closest seen hash within the threshold; ties keep the earliest.
    pub fn check(&self, hash: &Hash) -> Result<Option<DuplicateOf>> {
        let guard = self.seen.lock();
        closest(&guard, hash, self.threshold)
    }

    /// Decode, hash and look up `bytes`; remember the hash when it is new.
    pub fn check_and_insert(&self, label: &str, bytes: &[u8]) -> Result<DedupeOutcome> {
        let img = self.normalizer.normalize_bytes(bytes)?;
        let hash = self.hasher.hash(&img)?;
        self.insert_hash(label, hash)
    }

    /// Same as [`check_and_insert`](Self::check_and_insert) for an already computed hash.
    pub fn insert_hash(&self, label: &str, hash: Hash) -> Result<DedupeOutcome> {
        let mut guard = self.seen.lock();
        let duplicate_of = closest(&guard, &hash, self.threshold)?;
        match &duplicate_of {
            Some(dup) => {
                tracing::debug!(label, of = %dup.label, distance = dup.distance, "near-duplicate")
            }
            None => guard.push((label.to_string(), hash.clone())),
        }
        Ok(DedupeOutcome { hash, duplicate_of })
    }
}

fn closest(seen: &[(String, Hash)], hash: &Hash, threshold: u32) -> Result<Option<DuplicateOf>> {
    let mut best: Option<DuplicateOf> = None;
    for (label, h) in seen {
        let d = distance(hash, h)?;
        if is_match(d, threshold) && best.as_ref().is_none_or(|b| d < b.distance) {
            best = Some(DuplicateOf { label: label.clone(), distance: d });
        }
    }
    Ok(best)
}
