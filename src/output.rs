//! Output types: per-file results, download handles and run summaries.

use crate::request::RunMode;
use crate::results::LocalHandle;
use serde::{Serialize, Serializer};
use std::fmt;

/// How converted output can be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadHandle {
    /// Fully-qualified URL on the conversion service.
    Remote(reqwest::Url),
    /// In-process object, valid until the result store releases it.
    Local(LocalHandle),
}

impl DownloadHandle {
    pub fn is_local(&self) -> bool {
        matches!(self, DownloadHandle::Local(_))
    }
}

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadHandle::Remote(url) => write!(f, "{url}"),
            DownloadHandle::Local(handle) => write!(f, "{}", handle.url()),
        }
    }
}

impl Serialize for DownloadHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of converting one input file.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub original_name: String,
    pub converted_name: String,
    pub size_bytes: u64,
    /// Target extension.
    pub format: String,
    pub quality: u32,
    /// `None` for failed results.
    pub download: Option<DownloadHandle>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Service-provided details about the conversion (remote per-file only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_info: Option<serde_json::Value>,
}

impl ConversionResult {
    /// A failed item, as reported inside a batch response.
    pub fn failed(
        original_name: impl Into<String>,
        format: impl Into<String>,
        quality: u32,
        error: impl Into<String>,
    ) -> Self {
        let original_name = original_name.into();
        Self {
            converted_name: original_name.clone(),
            original_name,
            size_bytes: 0,
            format: format.into(),
            quality,
            download: None,
            success: false,
            error: Some(error.into()),
            conversion_info: None,
        }
    }

    /// One display line: name, size and format, plus the error when failed.
    pub fn describe(&self) -> String {
        if self.success {
            format!(
                "{} • {} • {}",
                self.converted_name,
                format_file_size(self.size_bytes),
                self.format.to_uppercase()
            )
        } else {
            format!(
                "{} • Failed: {}",
                self.original_name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Human-readable size, base 1024: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
///
/// Leading dots are also replaced so the result can never name a hidden file
/// or walk up a directory.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let leading_dots = out.len() - out.trim_start_matches('.').len();
    if leading_dots > 0 {
        out.replace_range(..leading_dots, &"_".repeat(leading_dots));
    }
    if out.is_empty() {
        out.push_str("download");
    }
    out
}
