use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while fixing one media file, plus the few
/// input conditions that abort a run before any file is touched.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("JSON record {0} not found though listed in the index")]
    RecordNotFound(String),

    #[error("cannot read JSON record {name}: {source}")]
    RecordUnreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON record {name}: {reason}")]
    RecordMalformed { name: String, reason: String },

    #[error("cannot load EXIF from {}: {reason}", .path.display())]
    MetadataLoadFailure { path: PathBuf, reason: String },

    #[error("cannot encode EXIF for {}: {reason}", .path.display())]
    MetadataEncodeFailure { path: PathBuf, reason: String },

    #[error("cannot write {}: {source}", .path.display())]
    MetadataWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' command not found")]
    ExternalToolMissing(String),

    #[error("exiftool exited with {code:?}\nSTDOUT: {stdout}\nSTDERR: {stderr}")]
    ExternalToolNonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to run exiftool: {0}")]
    ExternalToolInvocationError(#[source] std::io::Error),

    // Fatal: the run stops before processing anything.
    #[error("folder '{}' not found or is not a directory", .0.display())]
    MissingDirectory(PathBuf),

    #[error("no mappable JSON files found in {}", .0.display())]
    NoRecords(PathBuf),

    #[error("no media files found in {}", .0.display())]
    NoMedia(PathBuf),
}
