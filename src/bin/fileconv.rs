//! CLI binary for fileconv.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ConverterSession`, runs it, and saves the outputs.

use anyhow::{Context, Result};
use clap::Parser;
use fileconv::{
    format_file_size, Category, ConversionProgressCallback, ConversionResult, ConverterConfig,
    ConverterSession, FileInput, Mode, NoticeLevel, Notifier, ProgressCallback, QualityPreset,
    Resize, RunMode, RunRequest, SharedNotifier, TransformOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar plus one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(0),
        })
    }

    /// Time since `on_file_start`; empty for batch items, which have none.
    fn elapsed(&self, index: usize) -> String {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&index)
            .map(|t| dim(&format!("{:.1}s", t.elapsed().as_secs_f64())))
            .unwrap_or_default()
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize, mode: RunMode) {
        self.bar.set_position(0);
        self.bar.set_prefix("Converting");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        let how = match mode {
            RunMode::PerFile => "one by one",
            RunMode::Batch => "as one batch",
        };
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} file(s) {how}…"))
        ));
        if mode == RunMode::Batch {
            self.bar.set_message("uploading");
        }
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, result: &ConversionResult) {
        let elapsed = self.elapsed(index);
        if result.success {
            self.bar.println(format!(
                "  {} {:>3}/{:<3}  {}  {}",
                green("✓"),
                index,
                total,
                result.describe(),
                elapsed,
            ));
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
            let msg = result.describe();
            let msg = if msg.chars().count() > 100 {
                format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
            } else {
                msg
            };
            self.bar.println(format!(
                "  {} {:>3}/{:<3}  {}",
                red("✗"),
                index,
                total,
                red(&msg),
            ));
        }
    }

    fn on_progress(&self, percent: f64) {
        self.bar.set_position(percent.round() as u64);
    }

    fn on_run_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_files.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total_files { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }

    fn on_run_failed(&self, error: &str) {
        self.bar.abandon_with_message(red("failed"));
        tracing::debug!(
            "Run failed after {} item failure(s): {}",
            self.failures.load(Ordering::SeqCst),
            error
        );
    }
}

// ── Notifications ───────────────────────────────────────────────────────────

/// Prints notices to stderr without tearing the progress bar.
struct CliNotifier {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl Notifier for CliNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if self.quiet && level != NoticeLevel::Error {
            return;
        }
        let line = match level {
            NoticeLevel::Success => format!("{} {}", green("✔"), message),
            NoticeLevel::Error => format!("{} {}", red("✘"), red(message)),
            NoticeLevel::Warning => format!("{} {}", yellow("⚠"), message),
            NoticeLevel::Info => format!("{} {}", cyan("ℹ"), dim(message)),
        };
        match &self.bar {
            Some(bar) => bar.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert images locally (no service needed)
  fileconv photo.png scan.bmp --to jpg -o out/

  # Pick a quality preset
  fileconv photo.png --to webp --preset web-optimized

  # Convert through a conversion service, one request per file
  fileconv --backend http://localhost:5000 report.docx notes.txt --to pdf

  # Same, but one upload for the whole set
  fileconv --backend http://localhost:5000 --batch *.heic --to jpg

  # Video transforms (service only)
  fileconv --backend http://localhost:5000 clip.mov --to mp4 --resolution 720p --fps 30

  # What can be converted?
  fileconv --list-formats
  fileconv --backend http://localhost:5000 --health

QUALITY PRESETS:
  web-optimized   80   Optimized for web usage
  high-quality    95   Maximum quality retention
  compressed      60   Smaller file size

LOCAL MODE:
  Images are re-encoded in-process (png, jpg, webp, gif, bmp, tiff).
  Documents convert between txt and html only. Audio and video need a
  conversion service. Batch runs need a conversion service.

ENVIRONMENT VARIABLES:
  FILECONV_BACKEND_URL    Conversion service origin (enables remote mode)
  FILECONV_OUTPUT_DIR     Directory for converted files
  RUST_LOG                Override log filter (e.g. fileconv=debug)
"#;

/// Convert files to other formats, locally or through a conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert images, documents, audio and video to other formats",
    long_about = "Validate files, convert them to a chosen format and save the results. \
Runs entirely in-process by default; pass --backend to upload to a conversion service \
that also handles documents, audio and video.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert.
    inputs: Vec<PathBuf>,

    /// Target format (extension), e.g. png, jpg, pdf, mp3.
    #[arg(short, long, env = "FILECONV_TO")]
    to: Option<String>,

    /// Directory for converted files.
    #[arg(short, long, env = "FILECONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Conversion service origin. Without it, files are converted locally.
    #[arg(long, env = "FILECONV_BACKEND_URL")]
    backend: Option<String>,

    /// Upload every file in one request (service only).
    #[arg(long, env = "FILECONV_BATCH")]
    batch: bool,

    /// Quality 0–100.
    #[arg(short, long, env = "FILECONV_QUALITY",
          value_parser = clap::value_parser!(u32).range(0..=100),
          conflicts_with = "preset")]
    quality: Option<u32>,

    /// Named quality preset.
    #[arg(long, env = "FILECONV_PRESET", value_enum)]
    preset: Option<PresetArg>,

    /// Resize to WIDTHxHEIGHT (service only).
    #[arg(long, env = "FILECONV_RESIZE")]
    resize: Option<String>,

    /// Video resolution, WIDTHxHEIGHT or e.g. 720p (service only).
    #[arg(long, env = "FILECONV_RESOLUTION")]
    resolution: Option<String>,

    /// Video frame rate (service only).
    #[arg(long, env = "FILECONV_FPS")]
    fps: Option<u32>,

    /// Audio/video bitrate, e.g. 192k (service only).
    #[arg(long, env = "FILECONV_BITRATE")]
    bitrate: Option<String>,

    /// Largest accepted input in bytes (default 100 MiB remote, 1 GiB local).
    #[arg(long, env = "FILECONV_MAX_SIZE")]
    max_size: Option<u64>,

    /// Per-request timeout in seconds for the service.
    #[arg(long, env = "FILECONV_TIMEOUT")]
    timeout: Option<u64>,

    /// Print the supported extensions per category and exit.
    #[arg(long)]
    list_formats: bool,

    /// Check that the service is reachable and exit.
    #[arg(long)]
    health: bool,

    /// Print a JSON report on stdout instead of a summary.
    #[arg(long, env = "FILECONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "FILECONV_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PresetArg {
    WebOptimized,
    HighQuality,
    Compressed,
}

impl From<PresetArg> for QualityPreset {
    fn from(v: PresetArg) -> Self {
        match v {
            PresetArg::WebOptimized => QualityPreset::WebOptimized,
            PresetArg::HighQuality => QualityPreset::HighQuality,
            PresetArg::Compressed => QualityPreset::Compressed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let converting = !cli.list_formats && !cli.health;
    let show_progress = converting && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build session ────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let notifier: SharedNotifier = Arc::new(CliNotifier {
        bar: progress.as_ref().map(|p| p.bar.clone()),
        quiet: cli.quiet || cli.json,
    });
    let progress: Option<ProgressCallback> =
        progress.map(|cb| cb as Arc<dyn ConversionProgressCallback>);

    let config = build_config(&cli, progress, notifier)?;
    let remote = config.mode.is_remote();
    let mut session = ConverterSession::new(config).context("Failed to start session")?;

    if remote {
        if cli.health {
            if session.check_health().await {
                println!("{} conversion service is healthy", green("✔"));
                return Ok(());
            }
            anyhow::bail!("Conversion service is unreachable or unhealthy");
        }
        session.check_health().await;
        if !session.refresh_formats().await {
            tracing::warn!("Using the built-in format table");
        }
    } else if cli.health {
        println!("{} local mode: nothing to check", green("✔"));
        return Ok(());
    }

    // ── List formats ─────────────────────────────────────────────────────
    if cli.list_formats {
        print_formats(&session, cli.json)?;
        return Ok(());
    }

    // ── Select files ─────────────────────────────────────────────────────
    if cli.inputs.is_empty() {
        anyhow::bail!("No input files given");
    }
    let to = cli
        .to
        .as_deref()
        .context("Please select an output format with --to")?;

    for path in &cli.inputs {
        let input = FileInput::from_path(path)
            .await
            .with_context(|| format!("Cannot open {}", path.display()))?;
        // Rejections are reported through the notifier.
        let _ = session.add_file(input);
    }
    if session.selection().is_empty() {
        anyhow::bail!("No supported files selected");
    }

    let request = build_request(&cli, to)?;
    if !session.selection().offers(&request.format) {
        anyhow::bail!(
            "'{}' is not available for the selected files; choose one of: {}",
            request.format,
            session.output_formats().join(", ")
        );
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let mode = if cli.batch { RunMode::Batch } else { RunMode::PerFile };
    let summary = session
        .run(&request, mode)
        .await
        .context("Conversion failed")?;

    let saved = session
        .download_all(&cli.output_dir)
        .await
        .context("Failed to save converted files")?;

    if cli.json {
        let report = serde_json::json!({
            "summary": summary,
            "results": session.results().all(),
            "saved": saved,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for path in &saved {
            let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            eprintln!(
                "   {}  {}",
                bold(&path.display().to_string()),
                dim(&format_file_size(size))
            );
        }
        if !show_progress {
            eprintln!(
                "Converted {}/{} file(s) in {}ms",
                summary.succeeded, summary.total, summary.duration_ms
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ConverterConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    notifier: SharedNotifier,
) -> Result<ConverterConfig> {
    let mode = match cli.backend.as_deref() {
        Some(url) => Mode::remote(url).context("Invalid --backend")?,
        None => Mode::Local,
    };

    let mut builder = ConverterConfig::builder().mode(mode).notifier(notifier);
    if let Some(bytes) = cli.max_size {
        builder = builder.max_file_size(bytes);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to a validated `RunRequest`.
fn build_request(cli: &Cli, to: &str) -> Result<RunRequest> {
    let resize = cli
        .resize
        .as_deref()
        .map(str::parse::<Resize>)
        .transpose()
        .context("Invalid --resize")?;

    let mut request = RunRequest::new(to).transform(TransformOptions {
        resize,
        resolution: cli.resolution.clone(),
        fps: cli.fps,
        bitrate: cli.bitrate.clone(),
    });
    if let Some(preset) = cli.preset {
        request = request.preset(preset.into());
    }
    if let Some(q) = cli.quality {
        request = request.quality(q);
    }
    request.validate().context("Invalid conversion options")?;
    Ok(request)
}

fn print_formats(session: &ConverterSession, json: bool) -> Result<()> {
    let registry = session.registry();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&registry.to_table())
                .context("Failed to serialise formats")?
        );
        return Ok(());
    }
    for category in Category::ALL {
        let exts: Vec<&str> = registry.extensions_for(category).collect();
        if exts.is_empty() {
            continue;
        }
        println!("{:<10} {}", bold(category.as_str()), exts.join(", "));
    }
    println!();
    for preset in QualityPreset::ALL {
        println!(
            "{:<14} {:>3}  {}",
            preset.name(),
            preset.quality(),
            dim(preset.description())
        );
    }
    Ok(())
}
