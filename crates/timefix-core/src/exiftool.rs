//! Batched exiftool runs for the media types that are not patched in
//! process (HEIC, MOV, MP4, PNG).

use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::classify::DeferredTask;
use crate::error::FixError;
use crate::ThrottledProgress;

pub const DEFAULT_PROGRAM: &str = "exiftool";
/// Files per exiftool process.
pub const DEFAULT_BATCH_SIZE: usize = 50;

const BASE_FLAGS: &[&str] = &["-overwrite_original_in_place", "-m"];

const HEIC_TAGS: &[&str] = &["-EXIF:DateTimeOriginal", "-QuickTime:CreationDate", "-Keys:CreationDate"];
const MOV_TAGS: &[&str] = &[
    "-QuickTime:CreateDate",
    "-Keys:CreationDate",
    "-Track1:CreateDate",
    "-UserData:DateTimeOriginal",
];
const MP4_TAGS: &[&str] = &[
    "-QuickTime:CreateDate",
    "-Keys:CreationDate",
    "-TrackCreateDate",
    "-MediaCreateDate",
    "-UserData:DateTimeOriginal",
];
const PNG_TAGS: &[&str] = &[
    "-EXIF:DateTimeOriginal",
    "-PNG:CreationTime",
    "-XMP:DateTimeOriginal",
    "-CreateDate",
];
const DEFAULT_TAGS: &[&str] = &["-DateTimeOriginal", "-CreateDate"];

/// Tags written for a media kind (lowercase extension without the dot).
pub fn tags_for_kind(kind: &str) -> &'static [&'static str] {
    match kind {
        "heic" => HEIC_TAGS,
        "mov" => MOV_TAGS,
        "mp4" => MP4_TAGS,
        "png" => PNG_TAGS,
        _ => DEFAULT_TAGS,
    }
}

/// A program and its argument vector. Arguments are passed as-is to the
/// process, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an invocation to completion. `Err` means the process could not be
/// run at all; a non-zero exit is an `Ok` with the code.
pub trait ToolInvoker {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, FixError>;
}

/// Spawns the program found on `PATH` and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessInvoker;

impl ToolInvoker for ProcessInvoker {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, FixError> {
        let output = Command::new(invocation.program())
            .args(invocation.args())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    FixError::ExternalToolMissing(invocation.program().to_string_lossy().into_owned())
                }
                _ => FixError::ExternalToolInvocationError(e),
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One exiftool command line for a batch: base flags, then for every file
/// its `-Tag=value` assignments followed by its path.
pub fn build_invocation(program: &OsStr, batch: &[DeferredTask]) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(program);
    for flag in BASE_FLAGS {
        invocation.arg(flag);
    }
    for task in batch {
        for tag in tags_for_kind(&task.kind) {
            invocation.arg(format!("{}={}", tag, task.timestamp));
        }
        invocation.arg(&task.path);
    }
    invocation
}

/// Per-file accounting of a dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub succeeded: u64,
    pub failed: u64,
    /// Processes actually started (or attempted)
    pub invocations: usize,
    pub failed_paths: Vec<PathBuf>,
}

impl DispatchReport {
    fn fail_all(&mut self, batch: &[DeferredTask]) {
        self.failed += batch.len() as u64;
        self.failed_paths.extend(batch.iter().map(|t| t.path.clone()));
    }
}

/// Run exiftool over `tasks` in consecutive batches of `batch_size`, one
/// process at a time. A batch succeeds or fails as a whole. When the tool
/// cannot be found, the remaining batches are failed without being run.
pub fn dispatch(
    tasks: &[DeferredTask],
    batch_size: usize,
    program: &OsStr,
    invoker: &dyn ToolInvoker,
    progress: &ThrottledProgress,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    if tasks.is_empty() {
        return report;
    }

    let batch_size = batch_size.max(1);
    let total = tasks.len() as u64;
    let batch_count = tasks.len().div_ceil(batch_size);
    log::info!(
        "Starting batch ExifTool processing for {} files ({} batches)",
        tasks.len(),
        batch_count
    );

    let mut done = 0u64;
    let mut batches = tasks.chunks(batch_size).enumerate();
    while let Some((i, batch)) = batches.next() {
        let names = batch_preview(batch);
        log::info!("ExifTool batch {}/{} ({} files): {}", i + 1, batch_count, batch.len(), names);

        let invocation = build_invocation(program, batch);
        report.invocations += 1;
        match invoker.invoke(&invocation) {
            Ok(output) if output.success() => {
                report.succeeded += batch.len() as u64;
            }
            Ok(output) => {
                let err = FixError::ExternalToolNonZeroExit {
                    code: output.code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                };
                log::warn!("ExifTool batch {} failed for files ~{}: {}", i + 1, names, err);
                report.fail_all(batch);
            }
            Err(err @ FixError::ExternalToolMissing(_)) => {
                log::error!("{}. All remaining files failed.", err);
                report.fail_all(batch);
                for (_, rest) in batches.by_ref() {
                    report.fail_all(rest);
                }
                progress.report("exiftool", total, total, "exiftool not found");
                break;
            }
            Err(err) => {
                log::warn!("{}. All files in batch {} failed.", err, i + 1);
                report.fail_all(batch);
            }
        }

        done += batch.len() as u64;
        progress.report("exiftool", done - 1, total, &names);
    }

    log::info!(
        "Batch ExifTool processing finished. Success: {}, Failed: {}",
        report.succeeded,
        report.failed
    );
    report
}

fn batch_preview(batch: &[DeferredTask]) -> String {
    let mut names: Vec<String> = batch
        .iter()
        .take(3)
        .map(|t| {
            t.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();
    if batch.len() > 3 {
        names.push("...".to_string());
    }
    names.join(", ")
}
