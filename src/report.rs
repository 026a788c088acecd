//! Records and writers for presenting hashes and comparisons.
//!
//! Nothing here decides anything; it only formats what `hasher` and
//! `matcher` produced.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::{self, OpenOptions}, io::AsyncWriteExt, sync::Mutex};

use crate::error::Result;
use crate::hasher::Hash;
use crate::matcher::Comparison;

#[derive(Debug, Clone, Serialize)]
pub struct HashRecord<'a> {
    pub path: &'a str,
    pub hash: &'a Hash,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRecord<'a> {
    pub reference: &'a str,
    pub candidate: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<&'a Hash>,
    pub distance: u32,
    pub bits: usize,
    pub threshold: u32,
    pub is_match: bool,
    pub created_at: String,
}

impl<'a> ComparisonRecord<'a> {
    pub fn new(
        reference: &'a str,
        candidate: &'a str,
        hash: Option<&'a Hash>,
        cmp: &Comparison,
    ) -> Self {
        Self {
            reference,
            candidate,
            hash,
            distance: cmp.distance,
            bits: cmp.bits,
            threshold: cmp.threshold,
            is_match: cmp.is_match,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// `<candidate> binary hash: <bits>; hd: <d>; match: <bool>`
pub fn render_line(rec: &ComparisonRecord<'_>) -> String {
    let bits = rec.hash.map(|h| h.to_string()).unwrap_or_default();
    format!(
        "{} binary hash: {}; hd: {}; match: {}",
        rec.candidate, bits, rec.distance, rec.is_match
    )
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub reference: String,
    pub compared: u64,
    pub matched: u64,
    pub failed: u64,
    pub threshold: u32,
}

/// Appends records to a JSONL file, one object per line.
#[derive(Clone)]
pub struct ReportWriter {
    file: Arc<Mutex<tokio::fs::File>>,
    path: PathBuf,
}

impl ReportWriter {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { file: Arc::new(Mutex::new(file)), path })
    }

    pub async fn append<T: Serialize>(&self, rec: &T) -> Result<()> {
        let line = serde_json::to_vec(rec)?;
        let mut f = self.file.lock().await;
        f.write_all(&line).await?;
        f.write_all(b"\n").await?;
        f.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `summary` as pretty JSON through a temp file and rename.
pub async fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(summary)?;
    {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(&bytes).await?;
        let _ = f.sync_all().await;
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}
