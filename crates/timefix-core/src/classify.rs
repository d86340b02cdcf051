use std::path::{Path, PathBuf};

use crate::date;
use crate::date::json::{photo_taken_timestamp, Record};
use crate::jpeg;
use crate::media::MediaItem;
use crate::RunOptions;

/// Patched in process.
const JPEG_EXTENSIONS: &[&str] = &[".jpg", ".jpeg"];
/// Handed to exiftool after the scan.
const EXIFTOOL_EXTENSIONS: &[&str] = &[".heic", ".mov", ".mp4", ".png"];

/// A media file whose timestamp exiftool has to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTask {
    pub path: PathBuf,
    /// `YYYY:MM:DD HH:MM:SS`
    pub timestamp: String,
    /// Lowercase extension without the dot, selects the tag set
    pub kind: String,
}

/// What happened to one media file. Exactly one per file per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Success,
    Failure,
    NoAttempt,
    Deferred(DeferredTask),
}

/// Decide what to do with `media` given its parsed sidecar, and do it when
/// it can be done in process.
pub fn classify(options: &RunOptions, media: &MediaItem, record: &Record) -> PatchOutcome {
    let path = options.media_dir.join(&media.filename);
    if !path.is_file() {
        log::warn!("Image file not found: {}", path.display());
        return PatchOutcome::NoAttempt;
    }

    let Some(raw) = photo_taken_timestamp(record) else {
        log::info!(
            "'photoTakenTime.timestamp' not found in JSON for {}",
            media.filename
        );
        return PatchOutcome::NoAttempt;
    };
    let Some(stamp) = date::normalize_timestamp(&raw) else {
        return PatchOutcome::NoAttempt;
    };

    let ext = media.ext.as_str();
    if JPEG_EXTENSIONS.contains(&ext) {
        return match jpeg::write_capture_time(&path, &stamp) {
            Ok(()) => {
                log::debug!("{}: capture time set to {}", media.filename, stamp);
                PatchOutcome::Success
            }
            Err(e) => {
                log::warn!("{}", e);
                PatchOutcome::Failure
            }
        };
    }

    if EXIFTOOL_EXTENSIONS.contains(&ext) {
        return PatchOutcome::Deferred(DeferredTask {
            path: absolute(&path),
            timestamp: stamp,
            kind: ext.trim_start_matches('.').to_string(),
        });
    }

    log::info!(
        "File type {} for {} is not supported for datetime modification",
        if ext.is_empty() { "(none)" } else { ext },
        media.filename
    );
    PatchOutcome::NoAttempt
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
