//! Integration tests for the conversion pipeline.
//!
//! Remote sessions run against `FakeBackend`, an in-memory
//! `ConversionBackend` that records every call and answers from a script, so
//! no network is needed. Local sessions use images generated on the fly.

use async_trait::async_trait;
use fileconv::dispatch::remote::{
    BatchItem, BatchResponse, ConvertParams, ConvertResponse, Upload,
};
use fileconv::{
    Category, ConversionBackend, ConversionProgressCallback, ConversionResult, ConvertError,
    ConverterConfig, ConverterSession, DownloadHandle, FileInput, FormatRegistry, FormatTable,
    Mode, NoticeLevel, Notifier, Rejection, Resize, RunMode, RunRequest, SessionPhase,
    TransformOptions,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::Url;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeBackend {
    /// One entry per service call: `convert:<name>`, `batch:<n>`, `fetch:<url>`, …
    calls: Mutex<Vec<String>>,
    /// Names whose per-file conversion answers HTTP 500.
    fail: HashSet<String>,
    /// Names flagged failed inside a batch response.
    batch_fail: HashSet<String>,
    /// Drop the last batch entry to break the one-per-input invariant.
    short_batch: bool,
    formats: Option<FormatTable>,
    unhealthy: bool,
    last_params: Mutex<Option<ConvertParams>>,
}

impl FakeBackend {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn converted_name(name: &str, format: &str) -> String {
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        format!("{stem}_converted.{format}")
    }
}

#[async_trait]
impl ConversionBackend for FakeBackend {
    async fn formats(&self) -> Result<FormatTable, ConvertError> {
        self.log("formats".into());
        self.formats.clone().ok_or(ConvertError::Network {
            url: "http://svc.test/api/formats".into(),
            reason: "connection refused".into(),
        })
    }

    async fn health(&self) -> Result<(), ConvertError> {
        self.log("health".into());
        if self.unhealthy {
            Err(ConvertError::Service {
                status: 503,
                message: "down".into(),
            })
        } else {
            Ok(())
        }
    }

    async fn convert(
        &self,
        upload: Upload,
        params: &ConvertParams,
    ) -> Result<ConvertResponse, ConvertError> {
        self.log(format!("convert:{}", upload.file_name));
        *self.last_params.lock().unwrap() = Some(params.clone());
        if self.fail.contains(&upload.file_name) {
            return Err(ConvertError::Service {
                status: 500,
                message: "Conversion failed".into(),
            });
        }
        let filename = Self::converted_name(&upload.file_name, &params.format);
        Ok(ConvertResponse {
            download_url: format!("/api/download/{filename}"),
            filename,
            file_size: upload.bytes.len() as u64,
            conversion_info: Some(serde_json::json!({ "success": true })),
        })
    }

    async fn batch_convert(
        &self,
        uploads: Vec<Upload>,
        params: &ConvertParams,
    ) -> Result<BatchResponse, ConvertError> {
        self.log(format!("batch:{}", uploads.len()));
        *self.last_params.lock().unwrap() = Some(params.clone());
        let mut results: Vec<BatchItem> = uploads
            .iter()
            .map(|u| {
                if self.batch_fail.contains(&u.file_name) {
                    BatchItem {
                        original_filename: u.file_name.clone(),
                        converted_filename: None,
                        file_size: None,
                        download_url: None,
                        success: false,
                        error: Some("cannot identify image file".into()),
                    }
                } else {
                    let name = Self::converted_name(&u.file_name, &params.format);
                    BatchItem {
                        original_filename: u.file_name.clone(),
                        download_url: Some(format!("/api/download/{name}")),
                        converted_filename: Some(name),
                        file_size: Some(u.bytes.len() as u64),
                        success: true,
                        error: None,
                    }
                }
            })
            .collect();
        if self.short_batch {
            results.pop();
        }
        Ok(BatchResponse {
            results,
            total_files: Some(uploads.len()),
            successful_conversions: None,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ConvertError> {
        self.log(format!("fetch:{}", url.path()));
        Ok(format!("bytes of {}", url.path()).into_bytes())
    }
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<f64>>,
    completed: Mutex<Vec<(usize, usize, bool)>>,
    failures: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_file_complete(&self, index: usize, total: usize, result: &ConversionResult) {
        self.completed
            .lock()
            .unwrap()
            .push((index, total, result.success));
    }

    fn on_progress(&self, percent: f64) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_run_failed(&self, error: &str) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

#[derive(Default)]
struct Inbox(Mutex<Vec<(NoticeLevel, String)>>);

impl Notifier for Inbox {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.0.lock().unwrap().push((level, message.to_string()));
    }
}

impl Inbox {
    fn last(&self) -> Option<(NoticeLevel, String)> {
        self.0.lock().unwrap().last().cloned()
    }
}

struct Harness {
    session: ConverterSession,
    backend: Arc<FakeBackend>,
    recorder: Arc<Recorder>,
    inbox: Arc<Inbox>,
}

fn remote(backend: FakeBackend) -> Harness {
    remote_with_limit(backend, None)
}

fn remote_with_limit(backend: FakeBackend, limit: Option<u64>) -> Harness {
    let backend = Arc::new(backend);
    let recorder = Arc::new(Recorder::default());
    let inbox = Arc::new(Inbox::default());
    let mut builder = ConverterConfig::builder()
        .mode(Mode::remote("http://svc.test").unwrap())
        .progress_callback(recorder.clone())
        .notifier(inbox.clone());
    if let Some(limit) = limit {
        builder = builder.max_file_size(limit);
    }
    let session =
        ConverterSession::with_backend(builder.build().unwrap(), backend.clone()).unwrap();
    Harness {
        session,
        backend,
        recorder,
        inbox,
    }
}

fn local() -> (ConverterSession, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let config = ConverterConfig::builder()
        .progress_callback(recorder.clone())
        .notifier(Arc::new(Inbox::default()))
        .build()
        .unwrap();
    (ConverterSession::new(config).unwrap(), recorder)
}

fn file(name: &str) -> FileInput {
    FileInput::from_bytes(name, name.as_bytes().to_vec())
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 40, 90, 128])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

fn names(results: &[ConversionResult]) -> Vec<&str> {
    results.iter().map(|r| r.original_name.as_str()).collect()
}

fn names_of_selection(session: &ConverterSession) -> Vec<&str> {
    session
        .selection()
        .list()
        .iter()
        .map(|f| f.original_name.as_str())
        .collect()
}

// ── Selection ────────────────────────────────────────────────────────────────

#[test]
fn unsupported_extension_is_rejected_and_selection_unchanged() {
    let mut h = remote(FakeBackend::default());
    h.session.add_file(file("a.png")).unwrap();
    for bad in ["virus.exe", "README", "archive.tar.gz", "trailing."] {
        let err = h.session.add_file(file(bad)).unwrap_err();
        assert!(matches!(err, Rejection::UnsupportedExtension { .. }), "{bad}");
        assert_eq!(h.session.selection().len(), 1);
    }
    assert_eq!(h.inbox.last().unwrap().0, NoticeLevel::Error);
}

#[test]
fn oversized_file_is_rejected_and_selection_unchanged() {
    let mut h = remote_with_limit(FakeBackend::default(), Some(8));
    h.session
        .add_file(FileInput::from_bytes("ok.mp3", vec![0; 8]))
        .unwrap();
    let err = h
        .session
        .add_file(FileInput::from_bytes("big.mp3", vec![0; 9]))
        .unwrap_err();
    assert!(matches!(err, Rejection::TooLarge { size: 9, limit: 8, .. }));
    assert_eq!(h.session.selection().len(), 1);
}

#[test]
fn remote_ceiling_defaults_to_100_mib() {
    let h = remote(FakeBackend::default());
    assert_eq!(h.session.selection().max_file_size(), 100 * 1024 * 1024);
    let (l, _) = local();
    assert_eq!(l.selection().max_file_size(), 1024 * 1024 * 1024);
}

#[test]
fn output_formats_are_sorted_union_of_categories() {
    let mut h = remote(FakeBackend::default());
    h.session.add_file(file("a.jpg")).unwrap();
    h.session.add_file(file("b.wav")).unwrap();
    h.session.add_file(file("c.png")).unwrap();

    let registry = FormatRegistry::default();
    let mut expected: Vec<String> = registry
        .extensions_for(Category::Image)
        .chain(registry.extensions_for(Category::Audio))
        .map(str::to_string)
        .collect();
    expected.sort();
    expected.dedup();
    assert_eq!(h.session.output_formats(), expected.as_slice());
}

#[test]
fn remove_by_id_drops_exactly_one() {
    let mut h = remote(FakeBackend::default());
    let a = h.session.add_file(file("a.png")).unwrap();
    h.session.add_file(file("b.png")).unwrap();
    assert!(h.session.remove_file(a.id));
    assert_eq!(h.session.selection().len(), 1);
    assert!(h.session.selection().get(a.id).is_none());
    assert!(!h.session.remove_file(a.id));
    assert_eq!(h.session.selection().len(), 1);
}

// ── Remote per-file runs ─────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_run_records_in_order_with_stepwise_progress() {
    let mut h = remote(FakeBackend::default());
    for n in ["d.png", "b.jpg", "a.gif", "c.bmp"] {
        h.session.add_file(file(n)).unwrap();
    }
    let summary = h
        .session
        .run(&RunRequest::new("webp").quality(70), RunMode::PerFile)
        .await
        .unwrap();

    assert_eq!((summary.total, summary.succeeded, summary.failed), (4, 4, 0));
    assert_eq!(
        names(h.session.results().all()),
        ["d.png", "b.jpg", "a.gif", "c.bmp"]
    );
    assert_eq!(
        h.backend.calls(),
        ["convert:d.png", "convert:b.jpg", "convert:a.gif", "convert:c.bmp"]
    );
    assert_eq!(*h.recorder.progress.lock().unwrap(), [25.0, 50.0, 75.0, 100.0]);
    assert_eq!(h.session.phase(), SessionPhase::Completed);

    let first = &h.session.results().all()[0];
    assert_eq!(first.converted_name, "d_converted.webp");
    assert_eq!(first.quality, 70);
    assert!(first.conversion_info.is_some());
    assert_eq!(
        first.download.as_ref().unwrap().to_string(),
        "http://svc.test/api/download/d_converted.webp"
    );
    assert_eq!(
        h.inbox.last().unwrap(),
        (NoticeLevel::Success, "All files converted successfully!".into())
    );
}

#[tokio::test]
async fn failure_of_second_file_aborts_the_run() {
    let mut h = remote(FakeBackend {
        fail: HashSet::from(["two.png".to_string()]),
        ..Default::default()
    });
    for n in ["one.png", "two.png", "three.png"] {
        h.session.add_file(file(n)).unwrap();
    }
    let err = h
        .session
        .run(&RunRequest::new("jpg"), RunMode::PerFile)
        .await
        .unwrap_err();

    match &err {
        ConvertError::FileFailed { file, index, total, source } => {
            assert_eq!((file.as_str(), *index, *total), ("two.png", 2, 3));
            assert!(matches!(**source, ConvertError::Service { status: 500, .. }));
        }
        other => panic!("unexpected: {other}"),
    }
    assert!(err.is_remote());
    assert_eq!(names(h.session.results().all()), ["one.png"]);
    assert_eq!(h.backend.calls(), ["convert:one.png", "convert:two.png"]);
    assert_eq!(h.session.phase(), SessionPhase::Selecting);
    assert_eq!(h.recorder.failures.lock().unwrap().len(), 1);
    assert_eq!(
        h.inbox.last().unwrap(),
        (NoticeLevel::Error, "Conversion failed. Please try again.".into())
    );
}

#[tokio::test]
async fn transforms_are_sent_per_file_but_not_in_batches() {
    let transform = TransformOptions {
        resize: Some("640x480".parse::<Resize>().unwrap()),
        fps: Some(24),
        ..Default::default()
    };
    let mut h = remote(FakeBackend::default());
    h.session.add_file(file("clip.mov")).unwrap();
    let request = RunRequest::new("mp4").transform(transform.clone());

    h.session.run(&request, RunMode::PerFile).await.unwrap();
    let sent = h.backend.last_params.lock().unwrap().clone().unwrap();
    assert_eq!(sent.transform, transform);

    h.session.run(&request, RunMode::Batch).await.unwrap();
    let sent = h.backend.last_params.lock().unwrap().clone().unwrap();
    assert!(sent.transform.is_empty());
}

#[tokio::test]
async fn invalid_options_never_reach_the_service() {
    let mut h = remote(FakeBackend::default());
    h.session.add_file(file("clip.mov")).unwrap();
    let request = RunRequest::new("mp4").transform(TransformOptions {
        bitrate: Some("fast".into()),
        ..Default::default()
    });
    let err = h.session.run(&request, RunMode::PerFile).await.unwrap_err();
    assert!(matches!(err, ConvertError::InvalidOption { name: "bitrate", .. }));
    assert!(h.backend.calls().is_empty());
}

// ── Remote batch runs ────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_run_issues_one_call_and_publishes_100_once() {
    let mut h = remote(FakeBackend::default());
    for n in ["a.png", "b.png", "c.png"] {
        h.session.add_file(file(n)).unwrap();
    }
    let summary = h
        .session
        .run(&RunRequest::new("jpg"), RunMode::Batch)
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(h.backend.calls(), ["batch:3"]);
    assert_eq!(*h.recorder.progress.lock().unwrap(), [100.0]);
    assert_eq!(h.session.results().len(), 3);
    assert_eq!(
        h.inbox.last().unwrap(),
        (NoticeLevel::Success, "Batch conversion completed!".into())
    );
}

#[tokio::test]
async fn batch_item_failure_is_isolated() {
    let mut h = remote(FakeBackend {
        batch_fail: HashSet::from(["b.heic".to_string()]),
        ..Default::default()
    });
    for n in ["a.png", "b.heic", "c.png"] {
        h.session.add_file(file(n)).unwrap();
    }
    let summary = h
        .session
        .run(&RunRequest::new("jpg"), RunMode::Batch)
        .await
        .unwrap();

    assert_eq!((summary.succeeded, summary.failed), (2, 1));
    assert_eq!(h.session.results().len(), 3);
    let ok: Vec<&str> = h
        .session
        .results()
        .list_successful()
        .iter()
        .map(|r| r.original_name.as_str())
        .collect();
    assert_eq!(ok, ["a.png", "c.png"]);
    let failed = &h.session.results().all()[1];
    assert!(!failed.success && failed.download.is_none());
    assert_eq!(failed.error.as_deref(), Some("cannot identify image file"));
    assert_eq!(
        *h.recorder.completed.lock().unwrap(),
        [(1, 3, true), (2, 3, false), (3, 3, true)]
    );
    assert_eq!(h.session.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn short_batch_response_is_malformed() {
    let mut h = remote(FakeBackend {
        short_batch: true,
        ..Default::default()
    });
    h.session.add_file(file("a.png")).unwrap();
    h.session.add_file(file("b.png")).unwrap();
    let err = h
        .session
        .run(&RunRequest::new("jpg"), RunMode::Batch)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::MalformedResponse { endpoint: "/api/batch-convert", .. }
    ));
    assert!(h.session.results().is_empty());
    assert_eq!(h.session.phase(), SessionPhase::Selecting);
}

// ── Startup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn service_format_table_replaces_defaults() {
    let mut table = FormatTable::new();
    table.insert("images".into(), vec!["png".into(), "avif".into()]);
    table.insert("documents".into(), vec!["md".into()]);
    let mut h = remote(FakeBackend {
        formats: Some(table),
        ..Default::default()
    });
    assert!(h.session.refresh_formats().await);
    assert!(h.session.registry().is_supported("avif"));
    assert!(!h.session.registry().is_supported("mp3"));
    assert!(h.session.add_file(file("song.mp3")).is_err());
}

#[tokio::test]
async fn refresh_after_selection_rechecks_selected_files() {
    let mut table = FormatTable::new();
    table.insert("images".into(), vec!["png".into(), "avif".into()]);
    let mut h = remote(FakeBackend {
        formats: Some(table),
        ..Default::default()
    });
    h.session.add_file(file("a.png")).unwrap();
    h.session.add_file(file("song.mp3")).unwrap();
    assert!(h.session.output_formats().contains(&"wav".to_string()));

    assert!(h.session.refresh_formats().await);
    assert_eq!(names_of_selection(&h.session), ["a.png"]);
    assert_eq!(h.session.output_formats(), ["avif", "png"]);
    assert_eq!(
        h.inbox.last().unwrap(),
        (
            NoticeLevel::Warning,
            "Removed unsupported files: song.mp3".into()
        )
    );
}

#[tokio::test]
async fn failed_or_inconsistent_refresh_keeps_defaults() {
    let mut h = remote(FakeBackend::default());
    assert!(!h.session.refresh_formats().await);
    assert_eq!(h.session.registry(), &FormatRegistry::default());

    let mut table = FormatTable::new();
    table.insert("images".into(), vec!["ogg".into()]);
    table.insert("audio".into(), vec!["ogg".into()]);
    let mut h = remote(FakeBackend {
        formats: Some(table),
        ..Default::default()
    });
    assert!(!h.session.refresh_formats().await);
    assert_eq!(h.session.registry(), &FormatRegistry::default());
}

#[tokio::test]
async fn unhealthy_service_warns_but_does_not_block() {
    let mut h = remote(FakeBackend {
        unhealthy: true,
        ..Default::default()
    });
    assert!(!h.session.check_health().await);
    assert_eq!(
        h.inbox.last().unwrap(),
        (
            NoticeLevel::Warning,
            "Backend connection failed. Please check your server.".into()
        )
    );
    h.session.add_file(file("a.png")).unwrap();
    assert!(h
        .session
        .run(&RunRequest::new("jpg"), RunMode::PerFile)
        .await
        .is_ok());
}

// ── Downloads ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_download_all_fetches_successful_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = remote(FakeBackend {
        batch_fail: HashSet::from(["bad.png".to_string()]),
        ..Default::default()
    });
    h.session.add_file(file("my photo.png")).unwrap();
    h.session.add_file(file("bad.png")).unwrap();
    h.session
        .run(&RunRequest::new("jpg"), RunMode::Batch)
        .await
        .unwrap();

    let saved = h.session.download_all(dir.path()).await.unwrap();
    assert_eq!(saved, vec![dir.path().join("my_photo_converted.jpg")]);
    let body = std::fs::read_to_string(&saved[0]).unwrap();
    assert_eq!(body, "bytes of /api/download/my%20photo_converted.jpg");
    assert!(h
        .backend
        .calls()
        .iter()
        .any(|c| c.starts_with("fetch:/api/download/")));
}

// ── Local mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn local_png_at_quality_80() {
    let (mut session, recorder) = local();
    session
        .add_file(FileInput::from_bytes("photo.jpg", png(16, 9)))
        .unwrap();
    session
        .run(&RunRequest::new("png").quality(80), RunMode::PerFile)
        .await
        .unwrap();

    let result = &session.results().all()[0];
    assert!(result.success);
    assert_eq!(result.format, "png");
    assert!(result.size_bytes > 0);
    assert!(result.download.as_ref().unwrap().is_local());
    assert_eq!(*recorder.progress.lock().unwrap(), [100.0]);
}

#[tokio::test]
async fn local_jpeg_output_decodes() {
    let (mut session, _) = local();
    session
        .add_file(FileInput::from_bytes("logo.png", png(10, 10)))
        .unwrap();
    session
        .run(&RunRequest::new("jpg").quality(60), RunMode::PerFile)
        .await
        .unwrap();
    let bytes = session
        .fetch(&session.results().all()[0])
        .await
        .unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (10, 10));
}

#[tokio::test]
async fn corrupt_image_aborts_local_run() {
    let (mut session, _) = local();
    session
        .add_file(FileInput::from_bytes("ok.png", png(2, 2)))
        .unwrap();
    session
        .add_file(FileInput::from_bytes("broken.png", b"\x89PNG nope".to_vec()))
        .unwrap();
    let err = session
        .run(&RunRequest::new("bmp"), RunMode::PerFile)
        .await
        .unwrap_err();
    let ConvertError::FileFailed { source, .. } = err else {
        panic!("expected FileFailed");
    };
    assert!(source.to_string().starts_with("Failed to load image"));
    assert_eq!(session.results().len(), 1);
    assert_eq!(session.phase(), SessionPhase::Selecting);
}

#[tokio::test]
async fn local_rtf_document_converts_to_text() {
    let (mut session, _) = local();
    session
        .add_file(FileInput::from_bytes("notes.rtf", b"plain words".to_vec()))
        .unwrap();
    session
        .run(&RunRequest::new("txt"), RunMode::PerFile)
        .await
        .unwrap();

    let result = &session.results().all()[0];
    assert!(result.success);
    assert_eq!(result.converted_name, "notes_converted.txt");
    let bytes = session.fetch(result).await.unwrap();
    assert_eq!(bytes, b"plain words");
    assert_eq!(session.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn clearing_releases_every_local_handle() {
    let (mut session, _) = local();
    session
        .add_file(FileInput::from_bytes("a.png", png(3, 3)))
        .unwrap();
    session
        .add_file(FileInput::from_bytes("b.png", png(4, 4)))
        .unwrap();
    session
        .run(&RunRequest::new("gif"), RunMode::PerFile)
        .await
        .unwrap();

    let handles: Vec<_> = session
        .results()
        .all()
        .iter()
        .filter_map(|r| match &r.download {
            Some(DownloadHandle::Local(h)) => Some(h.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(handles.len(), 2);
    let objects = session.results().objects().clone();
    assert!(handles.iter().all(|h| objects.resolve(h).is_some()));

    session.clear();
    assert!(handles.iter().all(|h| objects.resolve(h).is_none()));
    assert_eq!(objects.live_count(), 0);
}

#[tokio::test]
async fn local_batch_is_refused_before_anything_runs() {
    let (mut session, recorder) = local();
    session
        .add_file(FileInput::from_bytes("a.png", png(1, 1)))
        .unwrap();
    let err = session
        .run(&RunRequest::new("png"), RunMode::Batch)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::BatchUnsupported));
    assert!(recorder.progress.lock().unwrap().is_empty());
    assert_eq!(session.phase(), SessionPhase::Selecting);
}
