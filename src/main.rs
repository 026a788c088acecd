use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use bmvhash::batch::{hash_files, BatchParams, HashedFile};
use bmvhash::report::{
    render_line, write_summary, ComparisonRecord, HashRecord, ReportWriter, Summary,
};
use bmvhash::{BmvConfig, Matcher, PerceptualDeduper};

#[derive(Parser, Debug)]
#[command(name = "bmvhash", about = "Block mean value perceptual hashing")]
struct Cli {
    /// YAML file with side / block_divisor / threshold / filter.
    #[arg(long, env = "BMV_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[arg(long, env = "BMV_SIDE", global = true)]
    side: Option<u32>,
    #[arg(long, env = "BMV_BLOCKS", global = true)]
    blocks: Option<u32>,
    #[arg(long, env = "BMV_THRESHOLD", global = true)]
    threshold: Option<u32>,
    #[arg(long, env = "BMV_CONCURRENCY", default_value_t = 8, global = true)]
    concurrency: usize,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the hash of each image.
    Hash {
        images: Vec<PathBuf>,
        /// Print base64 instead of the bit string.
        #[arg(long)]
        base64: bool,
        /// One JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Compare candidates against a reference image.
    Compare {
        reference: PathBuf,
        candidates: Vec<PathBuf>,
        /// Append JSONL comparison records here.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write a JSON summary here.
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Report near-duplicate images in a directory.
    Dedupe { dir: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashFormat {
    Bits,
    Base64,
    Json,
}

impl Cli {
    /// YAML file first, then flags (or their `BMV_*` variables) on top.
    fn bmv_config(&self) -> Result<BmvConfig> {
        let mut cfg = match &self.config {
            Some(p) => BmvConfig::load(p)
                .with_context(|| format!("Failed to load config: {}", p.display()))?,
            None => BmvConfig::default(),
        };
        if let Some(s) = self.side {
            cfg.side = s;
        }
        if let Some(b) = self.blocks {
            cfg.block_divisor = b;
        }
        if let Some(t) = self.threshold {
            cfg.threshold = t;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Fails the run when any image could not be hashed; each failure was already logged.
fn ensure_all_hashed(failed: usize, total: usize) -> Result<()> {
    if failed > 0 {
        anyhow::bail!("{failed} of {total} images failed to hash");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.bmv_config()?;
    let params = BatchParams { concurrency: cli.concurrency, show_progress: false };

    match cli.cmd {
        Cmd::Hash { images, base64, json } => {
            let format = match (json, base64) {
                (true, _) => HashFormat::Json,
                (false, true) => HashFormat::Base64,
                (false, false) => HashFormat::Bits,
            };
            run_hash(&cfg, images, format, params).await
        }
        Cmd::Compare { reference, candidates, report, summary } => {
            let params = BatchParams { show_progress: candidates.len() > 16, ..params };
            run_compare(&cfg, reference, candidates, report, summary, params).await
        }
        Cmd::Dedupe { dir } => run_dedupe(&cfg, &dir, params).await,
    }
}

async fn run_hash(
    cfg: &BmvConfig,
    images: Vec<PathBuf>,
    format: HashFormat,
    params: BatchParams,
) -> Result<()> {
    let total = images.len();
    let mut failed = 0;
    for hashed in hash_files(images, cfg, params).await? {
        let path = hashed.path.display().to_string();
        let Ok(h) = &hashed.result else {
            failed += 1;
            continue;
        };
        match format {
            HashFormat::Json => {
                println!("{}", serde_json::to_string(&HashRecord { path: &path, hash: h })?)
            }
            HashFormat::Base64 => println!("{path}: {}", h.to_base64()),
            HashFormat::Bits => println!("{path}: {h}"),
        }
    }
    ensure_all_hashed(failed, total)
}

async fn run_compare(
    cfg: &BmvConfig,
    reference: PathBuf,
    candidates: Vec<PathBuf>,
    report: Option<PathBuf>,
    summary_path: Option<PathBuf>,
    params: BatchParams,
) -> Result<()> {
    let total = candidates.len();
    let mut paths = vec![reference.clone()];
    paths.extend(candidates);
    let mut hashed = hash_files(paths, cfg, params).await?.into_iter();
    let reference_hash = match hashed.next() {
        Some(HashedFile { result: Ok(h), .. }) => h,
        Some(HashedFile { result: Err(e), .. }) => {
            return Err(e)
                .with_context(|| format!("Failed to hash reference {}", reference.display()))
        }
        None => anyhow::bail!("no reference image"),
    };

    let writer = match report {
        Some(p) => Some(ReportWriter::open(p).await.context("Failed to open report file")?),
        None => None,
    };
    let matcher = Matcher::new(cfg.threshold);
    let reference_name = reference.display().to_string();
    let mut summary = Summary {
        reference: reference_name.clone(),
        threshold: matcher.threshold(),
        ..Default::default()
    };

    println!("{} binary hash: {};", reference_name, reference_hash);
    for file in hashed {
        let candidate = file.path.display().to_string();
        let Ok(h) = file.result else {
            summary.failed += 1;
            continue;
        };
        let cmp = matcher.compare(&reference_hash, &h)?;
        let rec = ComparisonRecord::new(&reference_name, &candidate, Some(&h), &cmp);
        println!("{}", render_line(&rec));
        if let Some(w) = &writer {
            w.append(&rec).await?;
        }
        summary.compared += 1;
        if cmp.is_match {
            summary.matched += 1;
        }
    }
    tracing::info!(
        compared = summary.compared,
        matched = summary.matched,
        failed = summary.failed,
        "comparison finished"
    );

    if let Some(p) = summary_path {
        write_summary(&p, &summary).await.context("Failed to write summary")?;
    }
    ensure_all_hashed(summary.failed as usize, total)
}

/// Image files directly inside `dir`, sorted; other files are ignored.
async fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && ImageFormat::from_path(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn run_dedupe(cfg: &BmvConfig, dir: &Path, params: BatchParams) -> Result<()> {
    let paths = image_files(dir).await?;
    let total = paths.len();
    let deduper = PerceptualDeduper::new(cfg)?;
    let mut dupes = 0u64;
    let mut failed = 0;
    let params = BatchParams { show_progress: true, ..params };
    for file in hash_files(paths, cfg, params).await? {
        let label = file.path.display().to_string();
        let Ok(h) = file.result else {
            failed += 1;
            continue;
        };
        let outcome = deduper.insert_hash(&label, h)?;
        if let Some(dup) = outcome.duplicate_of {
            dupes += 1;
            println!("{label} ~ {} (hd: {})", dup.label, dup.distance);
        }
    }
    println!("{} unique, {} near-duplicates", deduper.len(), dupes);
    ensure_all_hashed(failed, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::{GrayImage, Luma};

    fn small_cfg() -> BmvConfig {
        BmvConfig { side: 16, block_divisor: 4, ..Default::default() }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_yaml_values() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("bmv.yaml");
        std::fs::write(&yaml, "side: 128\nblock_divisor: 16\nthreshold: 12\n").unwrap();

        let cli = Cli::try_parse_from([
            "bmvhash",
            "--config",
            yaml.to_str().unwrap(),
            "--threshold",
            "3",
            "hash",
            "a.png",
        ])
        .unwrap();
        let cfg = cli.bmv_config().unwrap();
        assert_eq!(cfg.threshold, 3);
        assert_eq!(cfg.block_divisor, 16);
        assert_eq!(cfg.side, 128);
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["bmvhash", "hash", "a.png", "--blocks", "8"]).unwrap();
        assert_eq!(cli.bmv_config().unwrap().block_divisor, 8);
    }

    #[test]
    fn divisor_larger_than_side_fails_validation() {
        let cli = Cli::try_parse_from([
            "bmvhash", "--blocks", "300", "--side", "256", "hash", "a.png",
        ])
        .unwrap();
        let err = cli.bmv_config().unwrap_err();
        let err = err.downcast_ref::<bmvhash::Error>().unwrap();
        assert_eq!(err.kind(), bmvhash::ErrorKind::Configuration);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let cli = Cli::try_parse_from([
            "bmvhash", "--config", "/nonexistent/bmv.yaml", "hash", "a.png",
        ])
        .unwrap();
        assert!(cli.bmv_config().is_err());
    }

    #[test]
    fn failure_count_decides_exit() {
        assert!(ensure_all_hashed(0, 3).is_ok());
        let msg = ensure_all_hashed(1, 3).unwrap_err().to_string();
        assert_eq!(msg, "1 of 3 images failed to hash");
    }

    #[tokio::test]
    async fn unreadable_image_fails_hash_command() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        GrayImage::from_pixel(16, 16, Luma([7])).save(&good).unwrap();

        let images = vec![good.clone()];
        let ok = run_hash(&small_cfg(), images, HashFormat::Bits, BatchParams::default()).await;
        assert!(ok.is_ok());

        let missing = dir.path().join("missing.png");
        let images = vec![good, missing];
        let err = run_hash(&small_cfg(), images, HashFormat::Json, BatchParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 images failed to hash");
    }

    #[tokio::test]
    async fn failed_candidate_fails_compare_but_keeps_summary() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.png");
        GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 0 } else { 255 }]))
            .save(&reference)
            .unwrap();
        let summary = dir.path().join("summary.json");

        let candidates = vec![reference.clone(), dir.path().join("missing.png")];
        let res = run_compare(
            &small_cfg(),
            reference,
            candidates,
            None,
            Some(summary.clone()),
            BatchParams::default(),
        )
        .await;
        assert_eq!(res.unwrap_err().to_string(), "1 of 2 images failed to hash");

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(v["compared"], 1);
        assert_eq!(v["matched"], 1);
        assert_eq!(v["failed"], 1);
    }

    #[tokio::test]
    async fn dedupe_only_considers_image_files() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(16, 16, Luma([7])).save(dir.path().join("b.png")).unwrap();
        GrayImage::from_pixel(16, 16, Luma([9])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let files = image_files(dir.path()).await.unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);

        assert!(run_dedupe(&small_cfg(), dir.path(), BatchParams::default()).await.is_ok());
    }
}
