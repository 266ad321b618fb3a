//! Remote strategy: talk to the conversion service over HTTP.
//!
//! The service is an opaque collaborator reached through the
//! [`ConversionBackend`] trait. [`HttpBackend`] is the real implementation;
//! tests and embedders can supply their own.
//!
//! ## Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | GET  | `/api/formats` | | `{category: [ext, …]}` |
//! | GET  | `/api/health` | | any 2xx is healthy |
//! | POST | `/api/convert` | multipart `file`, `format`, `quality`, transforms | [`ConvertResponse`] or `{error}` |
//! | POST | `/api/batch-convert` | multipart `files[]`, `format`, `quality` | [`BatchResponse`] or `{error}` |
//!
//! Paths are resolved under the configured service URL, so a service mounted
//! at `https://host/converter` is reached at `https://host/converter/api/...`.
//!
//! Every response body is parsed against an explicit schema; anything that
//! does not fit is a [`ConvertError::MalformedResponse`], never a default.

use crate::error::ConvertError;
use crate::registry::FormatTable;
use crate::request::TransformOptions;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// One file to upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Shared form fields of a conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertParams {
    pub format: String,
    pub quality: u32,
    pub transform: TransformOptions,
}

/// Success body of `POST /api/convert`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConvertResponse {
    pub filename: String,
    pub file_size: u64,
    /// Relative to the service origin, e.g. `/api/download/x.png`.
    pub download_url: String,
    #[serde(default)]
    pub conversion_info: Option<serde_json::Value>,
}

/// One entry of a batch response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchItem {
    pub original_filename: String,
    #[serde(default)]
    pub converted_filename: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub download_url: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Success body of `POST /api/batch-convert`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
    #[serde(default)]
    pub total_files: Option<usize>,
    #[serde(default)]
    pub successful_conversions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// The conversion service, as seen by the dispatcher.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// `GET /api/formats`.
    async fn formats(&self) -> Result<FormatTable, ConvertError>;

    /// `GET /api/health`; `Ok` for any 2xx.
    async fn health(&self) -> Result<(), ConvertError>;

    /// `POST /api/convert` for one file.
    async fn convert(
        &self,
        upload: Upload,
        params: &ConvertParams,
    ) -> Result<ConvertResponse, ConvertError>;

    /// `POST /api/batch-convert` for all files at once.
    async fn batch_convert(
        &self,
        uploads: Vec<Upload>,
        params: &ConvertParams,
    ) -> Result<BatchResponse, ConvertError>;

    /// Fetch converted output from a fully-qualified download URL.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ConvertError>;
}

/// Join a service path under `base`, keeping any path prefix the service is
/// mounted at. Absolute URLs are returned as-is.
pub fn join_service_path(base: &Url, path: &str) -> Result<Url, String> {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let dir = format!("{}/", root.path());
        root.set_path(&dir);
    }
    root.join(path.trim_start_matches('/')).map_err(|e| e.to_string())
}

/// Join a service-relative download path onto the service root.
pub fn resolve_download_url(base: &Url, relative: &str) -> Result<Url, ConvertError> {
    join_service_path(base, relative)
        .map_err(|e| ConvertError::MalformedResponse {
            endpoint: "download_url",
            detail: format!("'{}': {}", relative, e),
        })
}

/// Parse the body of a non-2xx response into a service error.
///
/// The service answers failures with `{"error": "…"}`; when the body is not
/// in that shape the status line alone is reported.
pub fn service_error(status: StatusCode, body: &[u8], fallback: &str) -> ConvertError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(msg) }) if !msg.trim().is_empty() => msg,
        Ok(_) => fallback.to_string(),
        Err(_) => format!(
            "{} ({})",
            fallback,
            status.canonical_reason().unwrap_or("unknown status")
        ),
    };
    ConvertError::Service {
        status: status.as_u16(),
        message,
    }
}

/// Parse a response of `endpoint` into `T`, mapping failures.
pub fn parse_response<T: for<'de> Deserialize<'de>>(
    endpoint: &'static str,
    status: StatusCode,
    body: &[u8],
    fallback: &str,
) -> Result<T, ConvertError> {
    if !status.is_success() {
        return Err(service_error(status, body, fallback));
    }
    serde_json::from_slice(body).map_err(|e| ConvertError::MalformedResponse {
        endpoint,
        detail: e.to_string(),
    })
}

/// [`ConversionBackend`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, ConvertError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConvertError> {
        join_service_path(&self.base, path)
            .map_err(|e| ConvertError::InvalidConfig(format!("endpoint '{path}': {e}")))
    }

    async fn read(
        &self,
        url: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), ConvertError> {
        let network = |e: reqwest::Error| ConvertError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let body = response.bytes().await.map_err(network)?;
        debug!("{} → HTTP {} ({} bytes)", url, status, body.len());
        Ok((status, body.to_vec()))
    }

    fn file_part(upload: Upload) -> Result<Part, ConvertError> {
        Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| ConvertError::Internal(format!("invalid MIME type: {e}")))
    }
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn formats(&self) -> Result<FormatTable, ConvertError> {
        let url = self.endpoint("/api/formats")?;
        let (status, body) = self.read(&url, self.client.get(url.clone())).await?;
        parse_response("/api/formats", status, &body, "Could not load supported formats")
    }

    async fn health(&self) -> Result<(), ConvertError> {
        let url = self.endpoint("/api/health")?;
        let (status, body) = self.read(&url, self.client.get(url.clone())).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(service_error(status, &body, "Health check failed"))
        }
    }

    async fn convert(
        &self,
        upload: Upload,
        params: &ConvertParams,
    ) -> Result<ConvertResponse, ConvertError> {
        let url = self.endpoint("/api/convert")?;
        info!("Uploading '{}' → {}", upload.file_name, params.format);

        let mut form = Form::new()
            .part("file", Self::file_part(upload)?)
            .text("format", params.format.clone())
            .text("quality", params.quality.to_string());
        for (name, value) in params.transform.form_fields() {
            form = form.text(name, value);
        }

        let (status, body) = self
            .read(&url, self.client.post(url.clone()).multipart(form))
            .await?;
        parse_response("/api/convert", status, &body, "Conversion failed")
    }

    async fn batch_convert(
        &self,
        uploads: Vec<Upload>,
        params: &ConvertParams,
    ) -> Result<BatchResponse, ConvertError> {
        let url = self.endpoint("/api/batch-convert")?;
        info!("Uploading batch of {} files → {}", uploads.len(), params.format);

        let mut form = Form::new();
        for upload in uploads {
            form = form.part("files", Self::file_part(upload)?);
        }
        let form = form
            .text("format", params.format.clone())
            .text("quality", params.quality.to_string());

        let (status, body) = self
            .read(&url, self.client.post(url.clone()).multipart(form))
            .await?;
        parse_response("/api/batch-convert", status, &body, "Batch conversion failed")
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ConvertError> {
        let (status, body) = self.read(url, self.client.get(url.clone())).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(service_error(status, &body, "Download failed"))
        }
    }
}
