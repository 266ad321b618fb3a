//! Configuration for a converter session.
//!
//! All behaviour is controlled through [`ConverterConfig`], built via its
//! [`ConverterConfigBuilder`]. The one decision that shapes everything else
//! is the [`Mode`]: whether files are uploaded to a conversion service or
//! converted in-process. It is fixed at construction.

use crate::error::ConvertError;
use crate::notify::SharedNotifier;
use crate::progress::ProgressCallback;
use std::fmt;

/// Upload ceiling when files go to a remote service (100 MiB).
pub const REMOTE_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Ceiling when files are converted in-process (1 GiB).
pub const LOCAL_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Where conversions happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Multipart uploads to a conversion service at `backend_url`.
    Remote { backend_url: reqwest::Url },
    /// In-process image re-encoding and text/HTML transforms.
    Local,
}

impl Mode {
    /// Parse and normalise a service URL. A path prefix is kept and always
    /// ends in `/`.
    pub fn remote(backend_url: &str) -> Result<Self, ConvertError> {
        let url = reqwest::Url::parse(backend_url.trim()).map_err(|e| {
            ConvertError::InvalidConfig(format!("backend URL '{}': {}", backend_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConvertError::InvalidConfig(format!(
                "backend URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        let mut url = url;
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let dir = format!("{}/", url.path());
            url.set_path(&dir);
        }
        Ok(Mode::Remote { backend_url: url })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Mode::Remote { .. })
    }

    pub fn default_max_file_size(&self) -> u64 {
        match self {
            Mode::Remote { .. } => REMOTE_MAX_FILE_SIZE,
            Mode::Local => LOCAL_MAX_FILE_SIZE,
        }
    }
}

/// Configuration for a [`crate::session::ConverterSession`].
///
/// # Example
/// ```rust
/// use fileconv::{ConverterConfig, Mode};
///
/// let config = ConverterConfig::builder()
///     .mode(Mode::remote("https://convert.example.com").unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(config.max_file_size, 100 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Remote service or in-process conversion. Default: [`Mode::Local`].
    pub mode: Mode,

    /// Largest accepted input in bytes. Default: 100 MiB remote, 1 GiB local.
    pub max_file_size: u64,

    /// Per-request timeout for the remote service. Default: none, so the
    /// transport's own behaviour applies.
    pub request_timeout_secs: Option<u64>,

    /// Receives per-file and percentage events.
    pub progress_callback: Option<ProgressCallback>,

    /// Receives user-facing messages. Default: log through `tracing`.
    pub notifier: Option<SharedNotifier>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Local,
            max_file_size: LOCAL_MAX_FILE_SIZE,
            request_timeout_secs: None,
            progress_callback: None,
            notifier: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("mode", &self.mode)
            .field("max_file_size", &self.max_file_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .field("notifier", &self.notifier.as_ref().map(|_| "<dyn Notifier>"))
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
            max_file_size: None,
        }
    }
}

/// Builder for [`ConverterConfig`].
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
    max_file_size: Option<u64>,
}

impl ConverterConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Override the mode's default ceiling.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn notifier(mut self, notifier: SharedNotifier) -> Self {
        self.config.notifier = Some(notifier);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let mut config = self.config;
        config.max_file_size = self
            .max_file_size
            .unwrap_or_else(|| config.mode.default_max_file_size());
        if config.max_file_size == 0 {
            return Err(ConvertError::InvalidConfig(
                "max file size must be ≥ 1 byte".into(),
            ));
        }
        if config.request_timeout_secs == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(config)
    }
}
