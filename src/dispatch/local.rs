//! Local strategy: in-process conversion, one file at a time.
//!
//! ## Dispatch by category
//!
//! | Category | Handling |
//! |----------|----------|
//! | images | decode with `image`, re-encode at the requested format and quality |
//! | documents | text ↔ HTML transforms ([`super::document`]) |
//! | audio, video | refused with [`ConvertError::UnsupportedType`] |
//!
//! Image decode and encode are CPU-bound and run under `spawn_blocking`.
//!
//! Every produced object is registered in the [`ObjectStore`] and handed back
//! as a [`DownloadHandle::Local`]. The result store releases it later.

use super::document;
use crate::error::ConvertError;
use crate::output::{ConversionResult, DownloadHandle};
use crate::registry::Category;
use crate::request::RunRequest;
use crate::results::ObjectStore;
use crate::selection::SelectedFile;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Converts files without leaving the process.
#[derive(Debug, Clone, Default)]
pub struct LocalConverter {
    objects: ObjectStore,
}

impl LocalConverter {
    pub fn new(objects: ObjectStore) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Convert one file and register the output.
    pub async fn convert(
        &self,
        file: &SelectedFile,
        request: &RunRequest,
    ) -> Result<ConversionResult, ConvertError> {
        let bytes = match file.category {
            Category::Image => {
                let input = file.source.read().await?;
                convert_image(
                    &file.original_name,
                    input,
                    &request.format,
                    request.quality_fraction(),
                )
                .await?
            }
            Category::Document => {
                let input = file.source.read().await?;
                let text = String::from_utf8_lossy(&input);
                document::transform(
                    &file.original_name,
                    &file.extension,
                    &request.format,
                    &text,
                )?
                .into_bytes()
            }
            Category::Audio | Category::Video => {
                return Err(ConvertError::UnsupportedType {
                    file: file.original_name.clone(),
                    category: file.category.to_string(),
                });
            }
        };

        let handle = self.objects.create(bytes);
        debug!(
            "Converted '{}' locally → {} ({} bytes)",
            file.original_name,
            request.format,
            handle.size()
        );
        Ok(ConversionResult {
            original_name: file.original_name.clone(),
            converted_name: file.converted_name(&request.format),
            size_bytes: handle.size(),
            format: request.format.clone(),
            quality: request.quality,
            download: Some(DownloadHandle::Local(handle)),
            success: true,
            error: None,
            conversion_info: None,
        })
    }
}

/// Decode `bytes` and re-encode as `format` on the blocking pool.
///
/// `quality` is the 0.0–1.0 fraction; it only affects lossy encoders.
pub async fn convert_image(
    file: &str,
    bytes: Vec<u8>,
    format: &str,
    quality: f32,
) -> Result<Vec<u8>, ConvertError> {
    let file_owned = file.to_string();
    let format = format.to_string();
    tokio::task::spawn_blocking(move || reencode(&file_owned, &bytes, &format, quality))
        .await
        .map_err(|e| {
            ConvertError::Internal(format!("Image task for '{}' panicked: {}", file, e))
        })?
}

/// Blocking implementation of [`convert_image`].
pub fn reencode(
    file: &str,
    bytes: &[u8],
    format: &str,
    quality: f32,
) -> Result<Vec<u8>, ConvertError> {
    let img = image::load_from_memory(bytes).map_err(|e| ConvertError::Decode {
        file: file.to_string(),
        detail: e.to_string(),
    })?;
    debug!("Decoded '{}': {}x{}", file, img.width(), img.height());

    let encode_err = |detail: String| ConvertError::Encode {
        file: file.to_string(),
        format: format.to_string(),
        detail,
    };

    let mut buf = Vec::new();
    match format {
        "jpg" | "jpeg" => {
            let rgb = flatten_onto_white(&img);
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality));
            encoder
                .encode_image(&rgb)
                .map_err(|e| encode_err(e.to_string()))?;
        }
        "png" => {
            let encoder = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Default,
                FilterType::Adaptive,
            );
            img.write_with_encoder(encoder)
                .map_err(|e| encode_err(e.to_string()))?;
        }
        other => {
            let target = match other {
                "webp" => ImageFormat::WebP,
                "gif" => ImageFormat::Gif,
                "bmp" => ImageFormat::Bmp,
                "tiff" => ImageFormat::Tiff,
                _ => return Err(encode_err("no local encoder for this format".into())),
            };
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), target)
                .map_err(|e| encode_err(e.to_string()))?;
        }
    }

    if buf.is_empty() {
        return Err(encode_err("encoder produced no data".into()));
    }
    Ok(buf)
}

/// 0.0–1.0 → 1–100 for the JPEG encoder.
fn jpeg_quality(fraction: f32) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Composite onto white so transparent regions do not turn black in JPEG.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = u16::from(p[3]);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a)) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}
