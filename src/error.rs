//! Error types for the fileconv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Rejection`]: **Validation.** A file offered to the selection was
//!   refused (unknown extension, over the size ceiling). Nothing else is
//!   affected: the file is simply not added and no run is started.
//!
//! * [`ConvertError`]: **Everything else:** configuration mistakes, local
//!   decode/encode failures, service and transport errors. A `ConvertError`
//!   raised while converting one file of a sequential run aborts that run and
//!   comes back wrapped in [`ConvertError::FileFailed`].
//!
//! Batch runs never produce per-item `ConvertError`s: the service reports
//! each item's failure inside its response, and those failures are stored on
//! the [`crate::output::ConversionResult`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Why a file was refused by the selection store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The extension is not listed in the format registry.
    #[error("File \"{name}\" is not supported (extension '{extension}')")]
    UnsupportedExtension { name: String, extension: String },

    /// The file is larger than the configured ceiling.
    #[error("File \"{name}\" is too large: {size} bytes exceeds the {limit}-byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },
}

/// All non-validation errors returned by the fileconv library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation ────────────────────────────────────────────────────────
    /// A file was rejected by the selection store.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Quality outside 0–100.
    #[error("Quality must be 0–100, got {value}")]
    InvalidQuality { value: u32 },

    /// A transform parameter is not well-formed.
    #[error("Invalid {name} '{value}': {reason}")]
    InvalidOption {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// No files are selected.
    #[error("No files selected")]
    EmptySelection,

    /// The requested output format is not offered for the current selection.
    #[error("Output format '{format}' is not available for the selected files")]
    FormatNotOffered { format: String },

    // ── Local conversion ──────────────────────────────────────────────────
    /// The input bytes could not be decoded as an image.
    #[error("Failed to load image '{file}': {detail}")]
    Decode { file: String, detail: String },

    /// The decoded image could not be encoded to the target format.
    #[error("Failed to convert image '{file}' to {format}: {detail}")]
    Encode {
        file: String,
        format: String,
        detail: String,
    },

    /// The document cannot be converted to the requested format locally.
    #[error("Unsupported conversion for '{file}': {from} → {to}")]
    UnsupportedFormat {
        file: String,
        from: String,
        to: String,
    },

    /// The category of the file cannot be converted locally at all.
    #[error("Unsupported file type for local conversion: '{file}' ({category})")]
    UnsupportedType { file: String, category: String },

    /// Batch runs need the remote service.
    #[error("Batch conversion is only available with a remote conversion service")]
    BatchUnsupported,

    // ── Remote service ────────────────────────────────────────────────────
    /// The service answered with a non-success status.
    #[error("Conversion service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    /// The service answered 2xx but the body does not match the schema.
    #[error("Malformed response from {endpoint}: {detail}")]
    MalformedResponse {
        endpoint: &'static str,
        detail: String,
    },

    /// No response at all (connection refused, DNS, TLS, timeout …).
    #[error("Network error talking to '{url}': {reason}")]
    Network { url: String, reason: String },

    // ── Run level ─────────────────────────────────────────────────────────
    /// A sequential run stopped at the first failing file.
    #[error("Conversion of '{file}' ({index}/{total}) failed: {source}")]
    FileFailed {
        file: String,
        index: usize,
        total: usize,
        #[source]
        source: Box<ConvertError>,
    },

    // ── Downloads & I/O ───────────────────────────────────────────────────
    /// The result has no usable download handle (failed, or handle released).
    #[error("No download available for '{name}'")]
    DownloadUnavailable { name: String },

    /// Could not read an input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write a downloaded file.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The format table is inconsistent (e.g. an extension in two categories).
    #[error("Invalid format registry: {0}")]
    InvalidRegistry(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Whether the error came from the remote service or the transport to it.
    pub fn is_remote(&self) -> bool {
        match self {
            ConvertError::Service { .. }
            | ConvertError::MalformedResponse { .. }
            | ConvertError::Network { .. } => true,
            ConvertError::FileFailed { source, .. } => source.is_remote(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_display_names_the_file() {
        let r = Rejection::UnsupportedExtension {
            name: "notes.xyz".into(),
            extension: "xyz".into(),
        };
        assert!(r.to_string().contains("\"notes.xyz\" is not supported"));

        let r = Rejection::TooLarge {
            name: "big.mp4".into(),
            size: 200,
            limit: 100,
        };
        let msg = r.to_string();
        assert!(msg.contains("big.mp4") && msg.contains("100-byte"), "got: {msg}");
    }

    #[test]
    fn file_failed_display_includes_position_and_cause() {
        let e = ConvertError::FileFailed {
            file: "b.png".into(),
            index: 2,
            total: 3,
            source: Box::new(ConvertError::Service {
                status: 500,
                message: "boom".into(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("2/3"), "got: {msg}");
        assert!(msg.contains("boom"), "got: {msg}");
        assert!(e.is_remote());
    }

    #[test]
    fn rejection_converts_into_convert_error() {
        let e: ConvertError = Rejection::TooLarge {
            name: "x.png".into(),
            size: 2,
            limit: 1,
        }
        .into();
        assert!(matches!(e, ConvertError::Rejected(Rejection::TooLarge { .. })));
        assert!(!e.is_remote());
    }

    #[test]
    fn decode_error_mentions_loading() {
        let e = ConvertError::Decode {
            file: "a.png".into(),
            detail: "bad header".into(),
        };
        assert!(e.to_string().starts_with("Failed to load image"));
    }
}
