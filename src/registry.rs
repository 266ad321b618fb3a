//! Format registry: which extensions are accepted, grouped by category.
//!
//! The registry is the single type discriminator of the whole pipeline. An
//! upload is valid iff its lowercase extension is listed, and the output
//! formats offered for a selection are the union of the categories the
//! selected files belong to.
//!
//! The built-in table is authoritative until (and unless) a remote service
//! hands us a replacement via `GET /api/formats`. A replacement is accepted
//! wholesale or not at all: [`FormatRegistry::from_table`] rejects tables that
//! list one extension under two categories.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// File category used for validation and output-format population.
///
/// Serialised with the service's wire names (`images`, `documents`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(rename = "images")]
    Image,
    #[serde(rename = "documents")]
    Document,
    Audio,
    Video,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Image,
        Category::Document,
        Category::Audio,
        Category::Video,
    ];

    /// Wire name used by the conversion service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Document => "documents",
            Category::Audio => "audio",
            Category::Video => "video",
        }
    }

    pub fn from_wire(name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw category → extensions table, as served by `GET /api/formats`.
pub type FormatTable = BTreeMap<String, Vec<String>>;

const DEFAULT_IMAGES: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "tiff", "heic", "heif",
];
const DEFAULT_DOCUMENTS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "html"];
const DEFAULT_AUDIO: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"];
const DEFAULT_VIDEO: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "ogv"];

/// Immutable mapping from category to the extensions it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRegistry {
    by_category: BTreeMap<Category, BTreeSet<String>>,
    by_extension: HashMap<String, Category>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut by_category = BTreeMap::new();
        by_category.insert(Category::Image, to_set(DEFAULT_IMAGES));
        by_category.insert(Category::Document, to_set(DEFAULT_DOCUMENTS));
        by_category.insert(Category::Audio, to_set(DEFAULT_AUDIO));
        by_category.insert(Category::Video, to_set(DEFAULT_VIDEO));
        let by_extension = by_category
            .iter()
            .flat_map(|(c, exts)| exts.iter().map(move |e| (e.clone(), *c)))
            .collect();
        Self {
            by_category,
            by_extension,
        }
    }
}

fn to_set(exts: &[&str]) -> BTreeSet<String> {
    exts.iter().map(|e| e.to_string()).collect()
}

impl FormatRegistry {
    /// Build a registry from a raw table.
    ///
    /// Extensions are trimmed, lowercased and stripped of a leading dot.
    /// Unknown category names are skipped with a warning; an extension listed
    /// under two categories is a configuration error.
    pub fn from_table(table: &FormatTable) -> Result<Self, ConvertError> {
        let mut by_category: BTreeMap<Category, BTreeSet<String>> = BTreeMap::new();

        for (name, exts) in table {
            let Some(category) = Category::from_wire(name) else {
                warn!("Ignoring unknown format category '{}'", name);
                continue;
            };
            let set = by_category.entry(category).or_default();
            for raw in exts {
                let ext = normalise_extension(raw);
                if ext.is_empty() {
                    return Err(ConvertError::InvalidRegistry(format!(
                        "empty extension in category '{}'",
                        name
                    )));
                }
                set.insert(ext);
            }
        }

        Self::from_sets(by_category)
    }

    /// Parse a JSON body of the `/api/formats` shape.
    pub fn from_json(body: &[u8]) -> Result<Self, ConvertError> {
        let table: FormatTable =
            serde_json::from_slice(body).map_err(|e| ConvertError::MalformedResponse {
                endpoint: "/api/formats",
                detail: e.to_string(),
            })?;
        Self::from_table(&table)
    }

    fn from_sets(by_category: BTreeMap<Category, BTreeSet<String>>) -> Result<Self, ConvertError> {
        let mut by_extension = HashMap::new();
        for (category, exts) in &by_category {
            for ext in exts {
                if let Some(previous) = by_extension.insert(ext.clone(), *category) {
                    return Err(ConvertError::InvalidRegistry(format!(
                        "extension '{}' is listed under both '{}' and '{}'",
                        ext, previous, category
                    )));
                }
            }
        }
        debug!(
            "Format registry: {} categories, {} extensions",
            by_category.len(),
            by_extension.len()
        );
        Ok(Self {
            by_category,
            by_extension,
        })
    }

    pub fn is_supported(&self, extension: &str) -> bool {
        self.by_extension.contains_key(&normalise_extension(extension))
    }

    /// Category of `extension`, or `None` when unknown.
    pub fn category_of(&self, extension: &str) -> Option<Category> {
        self.by_extension.get(&normalise_extension(extension)).copied()
    }

    pub fn all_extensions(&self) -> BTreeSet<String> {
        self.by_extension.keys().cloned().collect()
    }

    /// Extensions of one category (empty when the category is absent).
    pub fn extensions_for(&self, category: Category) -> impl Iterator<Item = &str> {
        self.by_category
            .get(&category)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.by_category.keys().copied()
    }

    /// Sorted union of the extensions of every category in `categories`.
    pub fn output_formats<I>(&self, categories: I) -> Vec<String>
    where
        I: IntoIterator<Item = Category>,
    {
        let mut formats = BTreeSet::new();
        for category in categories {
            formats.extend(self.extensions_for(category).map(str::to_string));
        }
        formats.into_iter().collect()
    }

    /// The registry as a raw wire table.
    pub fn to_table(&self) -> FormatTable {
        self.by_category
            .iter()
            .map(|(c, exts)| (c.as_str().to_string(), exts.iter().cloned().collect()))
            .collect()
    }
}

fn normalise_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercase suffix of `filename` after its last period.
///
/// A name without a period (or ending in one) has no extension and yields
/// an empty string, which no registry accepts.
pub fn extension_of(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Best-effort MIME type for an extension, for multipart uploads.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match normalise_extension(extension).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "odt" => "application/vnd.oasis.opendocument.text",
        "html" => "text/html",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "wma" => "audio/x-ms-wma",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        _ => "application/octet-stream",
    }
}
