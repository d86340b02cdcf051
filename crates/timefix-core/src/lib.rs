pub mod classify;
pub mod date;
pub mod error;
pub mod exiftool;
pub mod jpeg;
pub mod matcher;
pub mod media;
pub mod record_index;

#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use classify::{DeferredTask, PatchOutcome};
pub use error::FixError;
pub use exiftool::{DispatchReport, ProcessInvoker, ToolInvocation, ToolInvoker, ToolOutput};
pub use matcher::RecordMatch;
pub use media::MediaItem;
pub use record_index::RecordIndex;

fn default_exiftool() -> PathBuf {
    PathBuf::from(exiftool::DEFAULT_PROGRAM)
}

fn default_batch_size() -> usize {
    exiftool::DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Folder of `<name>.<ext>.json` sidecars
    pub json_dir: PathBuf,
    /// Folder of media files to rewrite
    pub media_dir: PathBuf,
    /// exiftool executable, looked up on `PATH` when not a path
    #[serde(default = "default_exiftool")]
    pub exiftool: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker threads for the per-file pass. 0 = one per core, 1 = inline.
    #[serde(default)]
    pub jobs: usize,
}

impl RunOptions {
    pub fn new(json_dir: impl Into<PathBuf>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: json_dir.into(),
            media_dir: media_dir.into(),
            exiftool: default_exiftool(),
            batch_size: default_batch_size(),
            jobs: 0,
        }
    }
}

/// Counters of one run. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub total: u64,
    /// A valid timestamp was found and a change was attempted or queued
    pub considered: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Record unreadable or malformed, nothing to do for the file, or a
    /// file name that is not UTF-8
    pub skipped: u64,
    /// No record matched the file at all
    pub no_match: u64,
}

impl RunTally {
    pub fn is_consistent(&self) -> bool {
        self.skipped + self.no_match + self.considered == self.total
            && self.succeeded + self.failed == self.considered
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub tally: RunTally,
    /// Files handed to exiftool
    pub deferred: u64,
    pub exiftool_invocations: usize,
    pub unrecognized_records: usize,
    /// Media files whose change was attempted and failed
    #[serde(default)]
    pub failures: Vec<String>,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Per-file result before it is folded into the tally.
#[derive(Debug)]
enum ItemResult {
    NoMatch,
    RecordError,
    Patched(PatchOutcome),
}

/// Fix every media file using exiftool from `PATH` for the deferred types.
pub fn run(options: &RunOptions, progress_callback: &ProgressCallback) -> anyhow::Result<RunSummary> {
    run_with_invoker(options, &ProcessInvoker, progress_callback)
}

/// Same as [`run`], with the process runner for exiftool batches supplied by
/// the caller.
pub fn run_with_invoker(
    options: &RunOptions,
    invoker: &dyn ToolInvoker,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<RunSummary> {
    let tp = ThrottledProgress::new(progress_callback);

    for dir in [&options.json_dir, &options.media_dir] {
        if !dir.is_dir() {
            return Err(FixError::MissingDirectory(dir.clone()).into());
        }
    }

    let index = RecordIndex::build(&options.json_dir);
    let listing = media::list_folder(&options.media_dir)
        .with_context(|| format!("Error accessing {}", options.media_dir.display()))?;

    if index.is_empty() {
        return Err(FixError::NoRecords(options.json_dir.clone()).into());
    }
    if listing.names.is_empty() && listing.non_utf8.is_empty() {
        return Err(FixError::NoMedia(options.media_dir.clone()).into());
    }
    // Non UTF-8 names are counted and skipped, never opened
    let unreadable = listing.non_utf8.len() as u64;
    let media: Vec<MediaItem> = listing.names.into_iter().map(MediaItem::new).collect();
    log::info!("Found {} mappable JSON entries", index.len());
    log::info!("Found {} media files to process", media.len() as u64 + unreadable);

    // Stage 1: match + classify, in parallel unless jobs == 1
    let total = media.len() as u64;
    let counter = AtomicU64::new(0);
    let process = |m: &MediaItem| {
        let result = process_item(options, &index, m);
        let current = counter.fetch_add(1, Ordering::Relaxed);
        tp.report("match", current, total, &m.filename);
        result
    };
    let results: Vec<ItemResult> = if options.jobs == 1 {
        media.iter().map(process).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
            .context("Failed to start worker threads")?;
        pool.install(|| media.par_iter().map(process).collect())
    };

    // Fold in listing order
    let mut tally = RunTally {
        total: total + unreadable,
        skipped: unreadable,
        ..Default::default()
    };
    let mut deferred: Vec<DeferredTask> = Vec::new();
    let mut failures: Vec<String> = Vec::new();
    for (m, result) in media.iter().zip(results) {
        match result {
            ItemResult::NoMatch => tally.no_match += 1,
            ItemResult::RecordError | ItemResult::Patched(PatchOutcome::NoAttempt) => {
                tally.skipped += 1
            }
            ItemResult::Patched(PatchOutcome::Success) => {
                tally.considered += 1;
                tally.succeeded += 1;
            }
            ItemResult::Patched(PatchOutcome::Failure) => {
                tally.considered += 1;
                tally.failed += 1;
                failures.push(m.filename.clone());
            }
            ItemResult::Patched(PatchOutcome::Deferred(task)) => {
                tally.considered += 1;
                deferred.push(task);
            }
        }
    }

    // Stage 2: exiftool batches, strictly after every file was classified
    let report = exiftool::dispatch(
        &deferred,
        options.batch_size,
        options.exiftool.as_os_str(),
        invoker,
        &tp,
    );
    tally.succeeded += report.succeeded;
    tally.failed += report.failed;
    failures.extend(report.failed_paths.iter().map(|p| display_name(p)));

    Ok(RunSummary {
        tally,
        deferred: deferred.len() as u64,
        exiftool_invocations: report.invocations,
        unrecognized_records: index.unrecognized().len(),
        failures,
    })
}

/// Match, load the record, classify. Errors stop here and become a result.
fn process_item(options: &RunOptions, index: &RecordIndex, media: &MediaItem) -> ItemResult {
    let Some(found) = matcher::resolve(media, index) else {
        log::info!(
            "No corresponding JSON file found for media: {}. Skipping.",
            media.filename
        );
        return ItemResult::NoMatch;
    };

    let record = match date::json::read_record(&options.json_dir, found.record()) {
        Ok(record) => record,
        Err(e) => {
            log::warn!("{}. Skipping {} (match: {}).", e, media.filename, found);
            return ItemResult::RecordError;
        }
    };

    let outcome = classify::classify(options, media, &record);
    if outcome == PatchOutcome::Failure {
        log::warn!(
            "Failed to process {} (JSON: {}, Match: {})",
            media.filename,
            found.record(),
            found
        );
    }
    ItemResult::Patched(outcome)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
