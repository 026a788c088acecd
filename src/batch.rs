use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::config::BmvConfig;
use crate::error::{Error, Result};
use crate::hasher::{BlockMeanHasher, Hash};
use crate::normalize::Normalizer;

pub struct BatchParams {
    pub concurrency: usize,
    pub show_progress: bool,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self { concurrency: 8, show_progress: false }
    }
}

#[derive(Debug)]
pub struct HashedFile {
    pub path: PathBuf,
    pub result: Result<Hash>,
}

/// Decode and hash every file in `paths`, at most `concurrency` at a time.
///
/// Results come back in input order; a file that fails carries its own error
/// and does not stop the rest.
pub async fn hash_files(
    paths: Vec<PathBuf>,
    cfg: &BmvConfig,
    params: BatchParams,
) -> Result<Vec<HashedFile>> {
    cfg.validate()?;
    let normalizer = Normalizer::from_config(cfg);
    let hasher = BlockMeanHasher::from_config(cfg);
    let sem = Arc::new(Semaphore::new(params.concurrency.max(1)));

    let progress = if params.show_progress {
        let pb = ProgressBar::new(paths.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            pb.set_style(style);
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut joinset = JoinSet::new();
    for (idx, path) in paths.iter().cloned().enumerate() {
        let sem = sem.clone();
        joinset.spawn(async move {
            let _permit = sem.acquire_owned().await;
            let task_path = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                let img = normalizer.normalize_path(&task_path)?;
                hasher.hash(&img)
            })
            .await
            .unwrap_or_else(|e| Err(Error::Io(std::io::Error::other(e))));
            (idx, HashedFile { path, result })
        });
    }

    let mut slots: Vec<Option<HashedFile>> = paths.iter().map(|_| None).collect();
    while let Some(joined) = joinset.join_next().await {
        let (idx, hashed) = joined.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        if let Err(e) = &hashed.result {
            tracing::warn!(path = %hashed.path.display(), error = %e, "failed to hash image");
        }
        progress.inc(1);
        slots[idx] = Some(hashed);
    }
    progress.finish_and_clear();

    let done: Vec<HashedFile> = slots.into_iter().flatten().collect();
    tracing::info!(
        side = normalizer.side(),
        blocks = hasher.block_divisor(),
        files = done.len(),
        failed = done.iter().filter(|h| h.result.is_err()).count(),
        "batch hashing finished"
    );
    Ok(done)
}
