//! Conversion dispatcher.
//!
//! ```text
//!              ┌───────────────────────┐
//! SelectedFile │      Dispatcher       │ ConversionResult
//! ───────────► │  Remote  │   Local    │ ─────────────────►
//!              │ (HTTP)   │ (in-proc)  │
//!              └───────────────────────┘
//! ```
//!
//! One strategy is chosen when the session is built and never changes. Both
//! produce the same [`ConversionResult`] shape; only the download handle
//! differs (remote URL vs. local object).
//!
//! Failure policy differs by run mode and must stay that way:
//! * [`Dispatcher::convert_one`] returns `Err` for any failure, and the
//!   caller aborts the sequential run.
//! * [`Dispatcher::convert_batch`] returns `Err` only when the batch as a
//!   whole failed; per-item failures reported by the service become failed
//!   results.

pub mod document;
pub mod local;
pub mod remote;

use crate::error::ConvertError;
use crate::output::{ConversionResult, DownloadHandle};
use crate::request::RunRequest;
use crate::results::ObjectStore;
use crate::selection::SelectedFile;
use local::LocalConverter;
use remote::{resolve_download_url, BatchItem, ConversionBackend, ConvertParams, Upload};
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, warn};

/// Strategy selected once at construction.
#[derive(Clone)]
pub enum Dispatcher {
    Remote {
        backend: Arc<dyn ConversionBackend>,
        base_url: Url,
    },
    Local(LocalConverter),
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Remote { base_url, .. } => f
                .debug_struct("Remote")
                .field("base_url", &base_url.as_str())
                .finish_non_exhaustive(),
            Dispatcher::Local(local) => f.debug_tuple("Local").field(local).finish(),
        }
    }
}

impl Dispatcher {
    pub fn remote(backend: Arc<dyn ConversionBackend>, base_url: Url) -> Self {
        Dispatcher::Remote { backend, base_url }
    }

    pub fn local(objects: ObjectStore) -> Self {
        Dispatcher::Local(LocalConverter::new(objects))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Dispatcher::Remote { .. })
    }

    pub fn backend(&self) -> Option<&Arc<dyn ConversionBackend>> {
        match self {
            Dispatcher::Remote { backend, .. } => Some(backend),
            Dispatcher::Local(_) => None,
        }
    }

    /// Convert a single file.
    pub async fn convert_one(
        &self,
        file: &SelectedFile,
        request: &RunRequest,
    ) -> Result<ConversionResult, ConvertError> {
        match self {
            Dispatcher::Remote { backend, base_url } => {
                let upload = to_upload(file).await?;
                let params = params_for(request, true);
                let response = backend.convert(upload, &params).await?;
                let url = resolve_download_url(base_url, &response.download_url)?;
                debug!(
                    "'{}' converted remotely → {} ({} bytes)",
                    file.original_name, response.filename, response.file_size
                );
                Ok(ConversionResult {
                    original_name: file.original_name.clone(),
                    converted_name: response.filename,
                    size_bytes: response.file_size,
                    format: request.format.clone(),
                    quality: request.quality,
                    download: Some(DownloadHandle::Remote(url)),
                    success: true,
                    error: None,
                    conversion_info: response.conversion_info,
                })
            }
            Dispatcher::Local(local) => local.convert(file, request).await,
        }
    }

    /// Convert all files in one service call.
    ///
    /// Returns exactly one result per input, in response order.
    pub async fn convert_batch(
        &self,
        files: &[SelectedFile],
        request: &RunRequest,
    ) -> Result<Vec<ConversionResult>, ConvertError> {
        let Dispatcher::Remote { backend, base_url } = self else {
            return Err(ConvertError::BatchUnsupported);
        };

        let mut uploads = Vec::with_capacity(files.len());
        for file in files {
            uploads.push(to_upload(file).await?);
        }
        // Transform options are not part of the batch form.
        let params = params_for(request, false);
        let response = backend.batch_convert(uploads, &params).await?;

        if response.results.len() != files.len() {
            return Err(ConvertError::MalformedResponse {
                endpoint: "/api/batch-convert",
                detail: format!(
                    "expected {} results, got {}",
                    files.len(),
                    response.results.len()
                ),
            });
        }

        Ok(response
            .results
            .into_iter()
            .map(|item| batch_item_to_result(item, base_url, request))
            .collect())
    }
}

fn params_for(request: &RunRequest, with_transform: bool) -> ConvertParams {
    ConvertParams {
        format: request.format.clone(),
        quality: request.quality,
        transform: if with_transform {
            request.transform.clone()
        } else {
            Default::default()
        },
    }
}

async fn to_upload(file: &SelectedFile) -> Result<Upload, ConvertError> {
    Ok(Upload {
        file_name: file.original_name.clone(),
        mime_type: file.mime_type_hint.clone(),
        bytes: file.source.read().await?,
    })
}

/// Map one batch entry; an incomplete success entry fails that item only.
fn batch_item_to_result(item: BatchItem, base_url: &Url, request: &RunRequest) -> ConversionResult {
    let failed = |original: String, error: String| {
        ConversionResult::failed(original, request.format.clone(), request.quality, error)
    };

    if !item.success {
        let error = item.error.unwrap_or_else(|| "Conversion failed".to_string());
        return failed(item.original_filename, error);
    }

    let (Some(converted), Some(relative), Some(size)) =
        (item.converted_filename, item.download_url, item.file_size)
    else {
        warn!(
            "Batch entry for '{}' is marked successful but lacks a filename, URL or size",
            item.original_filename
        );
        return failed(
            item.original_filename,
            "Incomplete result from conversion service".to_string(),
        );
    };

    match resolve_download_url(base_url, &relative) {
        Ok(url) => ConversionResult {
            original_name: item.original_filename,
            converted_name: converted,
            size_bytes: size,
            format: request.format.clone(),
            quality: request.quality,
            download: Some(DownloadHandle::Remote(url)),
            success: true,
            error: None,
            conversion_info: None,
        },
        Err(e) => failed(item.original_filename, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, success: bool) -> BatchItem {
        BatchItem {
            original_filename: name.into(),
            converted_filename: success.then(|| format!("{name}_converted.png")),
            file_size: success.then_some(42),
            download_url: success.then(|| format!("/api/download/{name}")),
            success,
            error: (!success).then(|| "cannot identify image file".into()),
        }
    }

    fn base() -> Url {
        Url::parse("http://localhost:5000").unwrap()
    }

    #[test]
    fn batch_success_item_gets_absolute_url() {
        let r = batch_item_to_result(item("a", true), &base(), &RunRequest::new("png"));
        assert!(r.success);
        assert_eq!(r.size_bytes, 42);
        assert_eq!(
            r.download.unwrap().to_string(),
            "http://localhost:5000/api/download/a"
        );
    }

    #[test]
    fn batch_failed_item_keeps_service_message() {
        let r = batch_item_to_result(item("b", false), &base(), &RunRequest::new("png"));
        assert!(!r.success);
        assert!(r.download.is_none());
        assert_eq!(r.error.as_deref(), Some("cannot identify image file"));
    }

    #[test]
    fn incomplete_success_item_fails_alone() {
        let mut it = item("c", true);
        it.download_url = None;
        let r = batch_item_to_result(it, &base(), &RunRequest::new("png"));
        assert!(!r.success);
        assert!(r.error.unwrap().contains("Incomplete"));
    }

    #[test]
    fn success_item_without_size_fails_alone() {
        let mut it = item("d", true);
        it.file_size = None;
        let r = batch_item_to_result(it, &base(), &RunRequest::new("png"));
        assert!(!r.success);
        assert_eq!(r.size_bytes, 0);
        assert!(r.download.is_none());
        assert_eq!(
            r.error.as_deref(),
            Some("Incomplete result from conversion service")
        );
    }

    #[tokio::test]
    async fn local_dispatcher_refuses_batches() {
        let d = Dispatcher::local(ObjectStore::new());
        assert!(!d.is_remote());
        assert!(d.backend().is_none());
        let err = d.convert_batch(&[], &RunRequest::new("png")).await.unwrap_err();
        assert!(matches!(err, ConvertError::BatchUnsupported));
    }

    #[test]
    fn batch_params_drop_transforms() {
        let req = RunRequest::new("mp4").transform(crate::request::TransformOptions {
            fps: Some(30),
            ..Default::default()
        });
        assert_eq!(params_for(&req, true).transform.fps, Some(30));
        assert!(params_for(&req, false).transform.is_empty());
    }
}
