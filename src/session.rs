//! The converter session: one explicit context owning every store.
//!
//! ```text
//!   add_file ──► SelectionStore ──► output_formats()
//!                     │
//!   run(request) ─────┤  validate → clear results → dispatch → record
//!                     ▼
//!                Dispatcher ──► ResultStore ──► download / download_all
//!                     │
//!                     └──► ProgressTracker ──► ConversionProgressCallback
//! ```
//!
//! Runs borrow the session mutably, so a second run cannot start while one
//! is in flight.

use crate::config::{ConverterConfig, Mode};
use crate::dispatch::remote::{ConversionBackend, HttpBackend};
use crate::dispatch::Dispatcher;
use crate::error::{ConvertError, Rejection};
use crate::notify::{NoticeLevel, SharedNotifier, TracingNotifier};
use crate::output::{sanitize_filename, ConversionResult, DownloadHandle, RunSummary};
use crate::progress::{NoopProgressCallback, ProgressTracker};
use crate::registry::FormatRegistry;
use crate::request::{RunMode, RunRequest};
use crate::results::{ObjectStore, ResultStore};
use crate::selection::{FileInput, SelectedFile, SelectionStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Which part of the workflow the session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Choosing files; also where a failed run lands.
    Selecting,
    /// A run is in flight.
    Converting,
    /// The last run finished; results are available.
    Completed,
}

pub struct ConverterSession {
    config: ConverterConfig,
    selection: SelectionStore,
    results: ResultStore,
    dispatcher: Dispatcher,
    tracker: ProgressTracker,
    notifier: SharedNotifier,
    phase: SessionPhase,
}

impl ConverterSession {
    /// Build a session for `config.mode`, creating the HTTP client if remote.
    pub fn new(config: ConverterConfig) -> Result<Self, ConvertError> {
        match config.mode.clone() {
            Mode::Remote { backend_url } => {
                let timeout = config.request_timeout_secs.map(Duration::from_secs);
                let backend = HttpBackend::new(backend_url, timeout)?;
                Self::with_backend(config, Arc::new(backend))
            }
            Mode::Local => {
                let objects = ObjectStore::new();
                let dispatcher = Dispatcher::local(objects.clone());
                Ok(Self::assemble(config, dispatcher, objects))
            }
        }
    }

    /// Build a remote session over a caller-supplied backend.
    pub fn with_backend(
        config: ConverterConfig,
        backend: Arc<dyn ConversionBackend>,
    ) -> Result<Self, ConvertError> {
        let Mode::Remote { backend_url } = &config.mode else {
            return Err(ConvertError::InvalidConfig(
                "a conversion backend requires remote mode".into(),
            ));
        };
        let dispatcher = Dispatcher::remote(backend, backend_url.clone());
        Ok(Self::assemble(config, dispatcher, ObjectStore::new()))
    }

    fn assemble(config: ConverterConfig, dispatcher: Dispatcher, objects: ObjectStore) -> Self {
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let notifier = config
            .notifier
            .clone()
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        Self {
            selection: SelectionStore::new(
                Arc::new(FormatRegistry::default()),
                config.max_file_size,
            ),
            results: ResultStore::new(objects),
            dispatcher,
            tracker: ProgressTracker::new(callback),
            notifier,
            phase: SessionPhase::Selecting,
            config,
        }
    }

    // ── Startup ──────────────────────────────────────────────────────────

    /// Replace the built-in registry with the service's format table.
    ///
    /// Returns `false` (keeping the current registry) in local mode or when
    /// the table cannot be fetched or is inconsistent. Files already selected
    /// are re-checked against the new table and dropped with a warning when
    /// it no longer lists them.
    pub async fn refresh_formats(&mut self) -> bool {
        let Some(backend) = self.dispatcher.backend() else {
            return false;
        };
        let loaded = match backend.formats().await {
            Ok(table) => FormatRegistry::from_table(&table),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(registry) => {
                info!(
                    "Loaded {} supported extensions from the conversion service",
                    registry.all_extensions().len()
                );
                let dropped = self.selection.set_registry(Arc::new(registry));
                if !dropped.is_empty() {
                    let names: Vec<&str> =
                        dropped.iter().map(|f| f.original_name.as_str()).collect();
                    self.notify(
                        NoticeLevel::Warning,
                        &format!("Removed unsupported files: {}", names.join(", ")),
                    );
                }
                true
            }
            Err(e) => {
                warn!("Could not load supported formats, using defaults: {}", e);
                false
            }
        }
    }

    /// Probe the service. Local sessions are always healthy.
    pub async fn check_health(&self) -> bool {
        let Some(backend) = self.dispatcher.backend() else {
            return true;
        };
        match backend.health().await {
            Ok(()) => {
                debug!("Conversion service is healthy");
                true
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                self.notify(
                    NoticeLevel::Warning,
                    "Backend connection failed. Please check your server.",
                );
                false
            }
        }
    }

    // ── Selection ────────────────────────────────────────────────────────

    pub fn add_file(&mut self, input: FileInput) -> Result<SelectedFile, Rejection> {
        self.selection.add(input).inspect_err(|rejection| {
            self.notifier.notify(NoticeLevel::Error, &rejection.to_string());
        })
    }

    /// Add several files; each outcome is reported independently.
    pub fn add_files(
        &mut self,
        inputs: impl IntoIterator<Item = FileInput>,
    ) -> Vec<Result<SelectedFile, Rejection>> {
        inputs.into_iter().map(|input| self.add_file(input)).collect()
    }

    pub fn remove_file(&mut self, id: Uuid) -> bool {
        self.selection.remove(id)
    }

    /// Forget the selection and every result, releasing local handles.
    pub fn clear(&mut self) {
        self.selection.clear();
        self.results.clear();
        self.phase = SessionPhase::Selecting;
        self.notify(NoticeLevel::Info, "All files cleared");
    }

    // ── Runs ─────────────────────────────────────────────────────────────

    /// Convert the whole selection.
    ///
    /// # Errors
    /// * Validation errors before anything is dispatched (nothing changes).
    /// * [`ConvertError::FileFailed`] when a per-file run stops at a file;
    ///   results of earlier files stay recorded.
    /// * The batch error itself when a batch run fails as a whole.
    pub async fn run(
        &mut self,
        request: &RunRequest,
        mode: RunMode,
    ) -> Result<RunSummary, ConvertError> {
        if let Err(e) = self.preflight(request, mode) {
            self.notify(NoticeLevel::Warning, &e.to_string());
            return Err(e);
        }

        let start = Instant::now();
        let files: Vec<SelectedFile> = self.selection.list().to_vec();
        let total = files.len();
        info!(
            "Converting {} file(s) to {} at quality {} ({:?})",
            total, request.format, request.quality, mode
        );

        self.results.clear();
        self.phase = SessionPhase::Converting;
        self.tracker.start(total, mode);

        let outcome = match mode {
            RunMode::PerFile => self.run_per_file(&files, request).await,
            RunMode::Batch => self.run_batch(&files, request).await,
        };
        if let Err(e) = outcome {
            return Err(self.fail_run(e));
        }

        let succeeded = self.results.list_successful().len();
        let summary = RunSummary {
            mode,
            total,
            succeeded,
            failed: self.results.len() - succeeded,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.phase = SessionPhase::Completed;
        self.tracker.callback().on_run_complete(total, succeeded);
        info!(
            "Run complete: {}/{} succeeded in {}ms",
            succeeded, total, summary.duration_ms
        );
        let message = match mode {
            RunMode::PerFile => "All files converted successfully!",
            RunMode::Batch => "Batch conversion completed!",
        };
        self.notify(NoticeLevel::Success, message);
        Ok(summary)
    }

    fn preflight(&self, request: &RunRequest, mode: RunMode) -> Result<(), ConvertError> {
        request.validate()?;
        if self.selection.is_empty() {
            return Err(ConvertError::EmptySelection);
        }
        if !self.selection.offers(&request.format) {
            return Err(ConvertError::FormatNotOffered {
                format: request.format.clone(),
            });
        }
        if mode == RunMode::Batch && !self.dispatcher.is_remote() {
            return Err(ConvertError::BatchUnsupported);
        }
        Ok(())
    }

    /// One file at a time, in selection order; stops at the first failure.
    async fn run_per_file(
        &mut self,
        files: &[SelectedFile],
        request: &RunRequest,
    ) -> Result<(), ConvertError> {
        let total = files.len();
        let callback = self.tracker.callback().clone();
        for (i, file) in files.iter().enumerate() {
            let index = i + 1;
            callback.on_file_start(index, total, &file.original_name);
            debug!("[{}/{}] {}", index, total, file.original_name);

            let result = self
                .dispatcher
                .convert_one(file, request)
                .await
                .map_err(|e| ConvertError::FileFailed {
                    file: file.original_name.clone(),
                    index,
                    total,
                    source: Box::new(e),
                })?;

            callback.on_file_complete(index, total, &result);
            self.results.record(result);
            self.tracker.on_unit_complete(index, total);
        }
        Ok(())
    }

    /// One service call for everything; per-item failures are kept.
    async fn run_batch(
        &mut self,
        files: &[SelectedFile],
        request: &RunRequest,
    ) -> Result<(), ConvertError> {
        let results = self.dispatcher.convert_batch(files, request).await?;
        let total = results.len();
        let callback = self.tracker.callback().clone();
        for (i, result) in results.into_iter().enumerate() {
            if !result.success {
                warn!(
                    "Batch item '{}' failed: {}",
                    result.original_name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            callback.on_file_complete(i + 1, total, &result);
            self.results.record(result);
        }
        self.tracker.on_batch_complete();
        Ok(())
    }

    fn fail_run(&mut self, err: ConvertError) -> ConvertError {
        error!("Conversion run failed: {}", err);
        self.phase = SessionPhase::Selecting;
        self.tracker.callback().on_run_failed(&err.to_string());
        self.notify(NoticeLevel::Error, "Conversion failed. Please try again.");
        err
    }

    // ── Downloads ────────────────────────────────────────────────────────

    /// Retrieve the bytes behind a result's download handle.
    pub async fn fetch(&self, result: &ConversionResult) -> Result<Vec<u8>, ConvertError> {
        let unavailable = || ConvertError::DownloadUnavailable {
            name: result.original_name.clone(),
        };
        match &result.download {
            Some(DownloadHandle::Remote(url)) => {
                let backend = self.dispatcher.backend().ok_or_else(unavailable)?;
                backend.fetch(url).await
            }
            Some(DownloadHandle::Local(handle)) => self
                .results
                .objects()
                .resolve(handle)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(unavailable),
            None => Err(unavailable()),
        }
    }

    /// Save one result into `dir` under its sanitised converted name.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn download(
        &self,
        result: &ConversionResult,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ConvertError> {
        let bytes = self.fetch(result).await?;
        let path = dir.as_ref().join(sanitize_filename(&result.converted_name));
        write_atomic(&path, &bytes).await?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Save every successful result of the last run, in result order.
    pub async fn download_all(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConvertError> {
        let dir = dir.as_ref();
        let mut saved = Vec::new();
        for result in self.results.list_successful() {
            saved.push(self.download(result, dir).await?);
        }
        Ok(saved)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn registry(&self) -> &FormatRegistry {
        self.selection.registry()
    }

    pub fn output_formats(&self) -> &[String] {
        self.selection.output_formats()
    }

    /// Last published progress value.
    pub fn progress(&self) -> f64 {
        self.tracker.percent()
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notifier.notify(level, message);
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let write_failed = |source| ConvertError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    let written = match tokio::fs::write(&tmp_path, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}
