//! What the user asks a run to do: target format, quality and transforms.
//!
//! All parameters are validated strictly before a run starts. Nothing
//! malformed is ever uploaded, and a local encoder never sees a quality
//! outside 0–100.

use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default quality when the caller does not pick one.
pub const DEFAULT_QUALITY: u8 = 85;

/// Whether a run awaits files one by one or submits them all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One request per file, strictly in selection order; first failure aborts.
    PerFile,
    /// One request for the whole selection; item failures are isolated.
    Batch,
}

/// Named quality settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPreset {
    WebOptimized,
    HighQuality,
    Compressed,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [
        QualityPreset::WebOptimized,
        QualityPreset::HighQuality,
        QualityPreset::Compressed,
    ];

    pub fn quality(&self) -> u8 {
        match self {
            QualityPreset::WebOptimized => 80,
            QualityPreset::HighQuality => 95,
            QualityPreset::Compressed => 60,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QualityPreset::WebOptimized => "Optimized for web usage",
            QualityPreset::HighQuality => "Maximum quality retention",
            QualityPreset::Compressed => "Smaller file size",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QualityPreset::WebOptimized => "web-optimized",
            QualityPreset::HighQuality => "high-quality",
            QualityPreset::Compressed => "compressed",
        }
    }
}

/// Target dimensions, written `WxH` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

static RE_DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,5})\s*[xX]\s*(\d{1,5})\s*$").unwrap());
static RE_RESOLUTION_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3,4}p$").unwrap());
static RE_BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[kKmM]?$").unwrap());

impl FromStr for Resize {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConvertError::InvalidOption {
            name: "resize",
            value: s.to_string(),
            reason,
        };
        let caps = RE_DIMENSIONS
            .captures(s)
            .ok_or_else(|| invalid("expected WIDTHxHEIGHT"))?;
        let width: u32 = caps[1].parse().map_err(|_| invalid("width is not a number"))?;
        let height: u32 = caps[2].parse().map_err(|_| invalid("height is not a number"))?;
        if width == 0 || height == 0 {
            return Err(invalid("dimensions must be positive"));
        }
        Ok(Resize { width, height })
    }
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Optional transforms forwarded to the remote service.
///
/// Local conversions ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub resize: Option<Resize>,
    /// `WxH` or `<N>p`, e.g. `1280x720` or `720p`.
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    /// Digits with an optional `k` / `M` suffix, e.g. `192k`.
    pub bitrate: Option<String>,
}

impl TransformOptions {
    pub fn is_empty(&self) -> bool {
        self.resize.is_none()
            && self.resolution.is_none()
            && self.fps.is_none()
            && self.bitrate.is_none()
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if let Some(ref res) = self.resolution {
            let ok = RE_RESOLUTION_P.is_match(res)
                || res.parse::<Resize>().is_ok();
            if !ok {
                return Err(ConvertError::InvalidOption {
                    name: "resolution",
                    value: res.clone(),
                    reason: "expected WIDTHxHEIGHT or e.g. 720p",
                });
            }
        }
        if let Some(fps) = self.fps {
            if fps == 0 {
                return Err(ConvertError::InvalidOption {
                    name: "fps",
                    value: fps.to_string(),
                    reason: "frame rate must be positive",
                });
            }
        }
        if let Some(ref bitrate) = self.bitrate {
            if !RE_BITRATE.is_match(bitrate) {
                return Err(ConvertError::InvalidOption {
                    name: "bitrate",
                    value: bitrate.clone(),
                    reason: "expected whole digits with optional k/M suffix",
                });
            }
        }
        Ok(())
    }

    /// Non-empty `(field, value)` pairs in wire order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(r) = self.resize {
            fields.push(("resize", r.to_string()));
        }
        if let Some(ref r) = self.resolution {
            fields.push(("resolution", r.clone()));
        }
        if let Some(fps) = self.fps {
            fields.push(("fps", fps.to_string()));
        }
        if let Some(ref b) = self.bitrate {
            fields.push(("bitrate", b.clone()));
        }
        fields
    }
}

/// Parameters of one conversion run.
///
/// # Example
/// ```rust
/// use fileconv::{QualityPreset, RunRequest};
///
/// let req = RunRequest::new("PNG").preset(QualityPreset::WebOptimized);
/// assert_eq!(req.format, "png");
/// assert_eq!(req.quality, 80);
/// assert!(req.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Lowercase target extension.
    pub format: String,
    /// 0–100 inclusive.
    pub quality: u32,
    pub transform: TransformOptions,
}

impl RunRequest {
    pub fn new(format: impl AsRef<str>) -> Self {
        Self {
            format: format.as_ref().trim().trim_start_matches('.').to_ascii_lowercase(),
            quality: u32::from(DEFAULT_QUALITY),
            transform: TransformOptions::default(),
        }
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn preset(mut self, preset: QualityPreset) -> Self {
        self.quality = u32::from(preset.quality());
        self
    }

    pub fn transform(mut self, transform: TransformOptions) -> Self {
        self.transform = transform;
        self
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.format.is_empty() {
            return Err(ConvertError::InvalidOption {
                name: "format",
                value: String::new(),
                reason: "please select an output format",
            });
        }
        if self.quality > 100 {
            return Err(ConvertError::InvalidQuality {
                value: self.quality,
            });
        }
        self.transform.validate()
    }

    /// Quality as the 0.0–1.0 fraction local encoders expect.
    pub fn quality_fraction(&self) -> f32 {
        self.quality.min(100) as f32 / 100.0
    }
}
