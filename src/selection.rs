//! Selection store: the ordered set of files waiting to be converted.
//!
//! Every mutation recomputes the output formats on offer, so
//! [`SelectionStore::output_formats`] is always exactly the sorted union of
//! the registry entries for the categories currently selected.

use crate::error::{ConvertError, Rejection};
use crate::registry::{extension_of, mime_for_extension, Category, FormatRegistry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a selected file's bytes live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// On disk; read lazily when the file is converted.
    Path(PathBuf),
    /// Already in memory.
    Memory(Arc<[u8]>),
}

impl FileSource {
    pub async fn read(&self) -> Result<Vec<u8>, ConvertError> {
        match self {
            FileSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| ConvertError::ReadFailed {
                        path: path.clone(),
                        source: e,
                    })
            }
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// A file offered for selection, before validation.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type_hint: Option<String>,
    pub source: FileSource,
}

impl FileInput {
    /// Describe an in-memory file.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            mime_type_hint: None,
            source: FileSource::Memory(bytes),
        }
    }

    /// Describe a file on disk without reading it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ConvertError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        if !meta.is_file() {
            return Err(ConvertError::ReadFailed {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            size_bytes: meta.len(),
            mime_type_hint: None,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime_type_hint = Some(mime.into());
        self
    }
}

/// A validated entry of the selection. Only its category is ever revised,
/// when the registry is replaced.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub id: Uuid,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type_hint: String,
    /// Lowercase, derived from the name.
    pub extension: String,
    pub category: Category,
    pub source: FileSource,
}

impl SelectedFile {
    /// `name_converted.format`, the naming every converter uses for outputs.
    pub fn converted_name(&self, format: &str) -> String {
        let stem = match self.original_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.original_name.as_str(),
        };
        format!("{stem}_converted.{format}")
    }
}

/// Ordered collection of [`SelectedFile`]s, in insertion order.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    registry: Arc<FormatRegistry>,
    max_file_size: u64,
    entries: Vec<SelectedFile>,
    output_formats: Vec<String>,
}

impl SelectionStore {
    pub fn new(registry: Arc<FormatRegistry>, max_file_size: u64) -> Self {
        Self {
            registry,
            max_file_size,
            entries: Vec::new(),
            output_formats: Vec::new(),
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Replace the registry (startup refresh) and recompute the offer.
    ///
    /// Entries already selected are re-categorised under the new registry;
    /// those whose extension it no longer lists are removed and returned.
    pub fn set_registry(&mut self, registry: Arc<FormatRegistry>) -> Vec<SelectedFile> {
        self.registry = registry;
        let mut dropped = Vec::new();
        for mut entry in std::mem::take(&mut self.entries) {
            match self.registry.category_of(&entry.extension) {
                Some(category) => {
                    entry.category = category;
                    self.entries.push(entry);
                }
                None => {
                    warn!(
                        "Removed '{}': '{}' is not in the new format table",
                        entry.original_name, entry.extension
                    );
                    dropped.push(entry);
                }
            }
        }
        self.recompute_formats();
        dropped
    }

    /// Validate and append a file.
    pub fn add(&mut self, input: FileInput) -> Result<SelectedFile, Rejection> {
        let extension = extension_of(&input.name);
        let Some(category) = self.registry.category_of(&extension) else {
            warn!("Rejected '{}': unsupported extension '{}'", input.name, extension);
            return Err(Rejection::UnsupportedExtension {
                name: input.name,
                extension,
            });
        };
        if input.size_bytes > self.max_file_size {
            warn!(
                "Rejected '{}': {} bytes over the {}-byte limit",
                input.name, input.size_bytes, self.max_file_size
            );
            return Err(Rejection::TooLarge {
                name: input.name,
                size: input.size_bytes,
                limit: self.max_file_size,
            });
        }

        let mut id = Uuid::new_v4();
        while self.entries.iter().any(|e| e.id == id) {
            id = Uuid::new_v4();
        }

        let entry = SelectedFile {
            id,
            mime_type_hint: input
                .mime_type_hint
                .unwrap_or_else(|| mime_for_extension(&extension).to_string()),
            original_name: input.name,
            size_bytes: input.size_bytes,
            extension,
            category,
            source: input.source,
        };
        debug!("Selected '{}' ({}, {} bytes)", entry.original_name, category, entry.size_bytes);
        self.entries.push(entry.clone());
        self.recompute_formats();
        Ok(entry)
    }

    /// Remove by id; `false` when no such entry exists.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.recompute_formats();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recompute_formats();
    }

    pub fn list(&self) -> &[SelectedFile] {
        &self.entries
    }

    pub fn get(&self, id: Uuid) -> Option<&SelectedFile> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Categories represented in the current selection.
    pub fn categories(&self) -> BTreeSet<Category> {
        self.entries.iter().map(|e| e.category).collect()
    }

    /// Output formats on offer for the current selection, sorted.
    pub fn output_formats(&self) -> &[String] {
        &self.output_formats
    }

    pub fn offers(&self, format: &str) -> bool {
        self.output_formats.iter().any(|f| f == format)
    }

    fn recompute_formats(&mut self) {
        self.output_formats = self.registry.output_formats(self.categories());
    }
}
