//! # fileconv
//!
//! Validate a set of files, convert them to a chosen format, and stage the
//! outputs for download, either through a remote conversion service or
//! entirely in-process.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Select    extension + size checks against the format registry
//!  ├─ 2. Offer     output formats = union of the selected categories
//!  ├─ 3. Dispatch  remote (multipart upload, per file or batch)
//!  │               or local (image re-encode, text ↔ HTML)
//!  ├─ 4. Track     progress after every file, or once per batch
//!  └─ 5. Stage     results with download handles → files on disk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileconv::{ConverterConfig, ConverterSession, FileInput, Mode, RunMode, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::builder()
//!         .mode(Mode::remote("http://localhost:5000")?)
//!         .build()?;
//!     let mut session = ConverterSession::new(config)?;
//!     session.refresh_formats().await;
//!
//!     session.add_file(FileInput::from_path("photo.heic").await?)?;
//!     let summary = session.run(&RunRequest::new("jpg").quality(90), RunMode::PerFile).await?;
//!     eprintln!("{}/{} converted", summary.succeeded, summary.total);
//!
//!     session.download_all("out").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modes
//!
//! | Mode | Size ceiling | Per-file | Batch | Handles |
//! |------|--------------|----------|-------|---------|
//! | `Remote` | 100 MiB | all categories | yes | service URLs |
//! | `Local`  | 1 GiB   | images, txt/html | no | in-process objects |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod output;
pub mod progress;
pub mod registry;
pub mod request;
pub mod results;
pub mod selection;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder, Mode};
pub use dispatch::remote::{ConversionBackend, HttpBackend};
pub use dispatch::Dispatcher;
pub use error::{ConvertError, Rejection};
pub use notify::{NoticeLevel, Notifier, SharedNotifier, TracingNotifier};
pub use output::{format_file_size, sanitize_filename, ConversionResult, DownloadHandle, RunSummary};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{Category, FormatRegistry, FormatTable};
pub use request::{QualityPreset, Resize, RunMode, RunRequest, TransformOptions};
pub use results::{LocalHandle, ObjectStore, ResultStore};
pub use selection::{FileInput, FileSource, SelectedFile, SelectionStore};
pub use session::{ConverterSession, SessionPhase};
