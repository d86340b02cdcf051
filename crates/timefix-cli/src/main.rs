use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::Log;
use timefix_core::exiftool::{DEFAULT_BATCH_SIZE, DEFAULT_PROGRAM};
use timefix_core::{RunOptions, RunSummary};

#[derive(Parser)]
#[command(
    name = "gpth-timefix",
    version,
    about = "Apply 'photoTakenTime' from Google Takeout JSON files to the metadata of the matching media files"
)]
struct Cli {
    /// Folder of JSON files (e.g. 'IMG_0493.JPG.json')
    json_dir: PathBuf,

    /// Folder of media files (e.g. 'IMG_0493.JPG')
    media_dir: PathBuf,

    /// exiftool executable used for HEIC, MOV, MP4 and PNG files
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    exiftool: PathBuf,

    /// Files passed to one exiftool process
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Worker threads for matching and JPEG rewriting (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

/// One progress bar per pipeline stage, replaced when the stage changes.
#[derive(Default)]
struct StageBars {
    current: Mutex<Option<(String, ProgressBar)>>,
}

impl StageBars {
    fn update(&self, stage: &str, current: u64, total: u64, message: &str) {
        let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map_or(true, |(s, _)| s != stage) {
            if let Some((_, old)) = slot.take() {
                old.finish();
            }
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template("{prefix:>9} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            pb.set_prefix(stage.to_string());
            *slot = Some((stage.to_string(), pb));
        }
        if let Some((_, pb)) = slot.as_ref() {
            pb.set_position((current + 1).min(total));
            pb.set_message(message.to_string());
        }
    }

    fn finish(&self) {
        let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, pb)) = slot.take() {
            pb.finish();
        }
    }

    /// Run `f` with the active bar cleared from the terminal.
    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        let active = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, pb)| pb.clone());
        match active {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

/// env_logger output drawn above the progress bar instead of through it.
struct BarLogger {
    inner: env_logger::Logger,
    bars: Arc<StageBars>,
}

impl BarLogger {
    fn install(bars: Arc<StageBars>) -> Result<(), log::SetLoggerError> {
        // RUST_LOG overrides, e.g. RUST_LOG=debug
        let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
        let max_level = inner.filter();
        log::set_boxed_logger(Box::new(BarLogger { inner, bars }))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for BarLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.matches(record) {
            self.bars.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn main() -> anyhow::Result<()> {
    let bars = Arc::new(StageBars::default());
    BarLogger::install(Arc::clone(&bars))?;

    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    eprintln!("JSON folder: {}", cli.json_dir.display());
    eprintln!("Media folder: {}", cli.media_dir.display());
    eprintln!("---");
    eprintln!("IMPORTANT: This will OVERWRITE media files in the media folder with new metadata.");
    eprintln!("For HEIC/MOV/MP4/PNG files, ExifTool must be installed and in your system PATH.");
    eprintln!("Please BACKUP your media files before proceeding!");
    eprintln!("---");

    let options = RunOptions {
        json_dir: cli.json_dir,
        media_dir: cli.media_dir,
        exiftool: cli.exiftool,
        batch_size: cli.batch_size,
        jobs: cli.jobs,
    };

    let cb_bars = Arc::clone(&bars);
    let result = timefix_core::run(&options, &move |stage, current, total, message| {
        cb_bars.update(stage, current, total, message)
    });
    bars.finish();
    let summary = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    eprintln!("Done! ({:.2}s)", t_total.elapsed().as_secs_f64());

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let t = &summary.tally;
    println!();
    println!("--- Processing Complete ---");
    println!("Total media files scanned: {}", t.total);
    println!("Media files identified for change (valid photoTakenTime found): {}", t.considered);
    println!("  of which handed to ExifTool: {}", summary.deferred);
    println!("Media files successfully changed: {}", t.succeeded);
    println!("Media files failed to change (attempt made but failed): {}", t.failed);
    println!("Media files skipped (JSON error or no valid photoTakenTime): {}", t.skipped);
    println!("Media files without a matching JSON file: {}", t.no_match);
    if summary.unrecognized_records > 0 {
        println!("JSON files with an unrecognized name: {}", summary.unrecognized_records);
    }
    if !summary.failures.is_empty() {
        println!("Failed files:");
        for name in &summary.failures {
            println!("  {}", name);
        }
    }
}
