//! Post-completion content transforms.
//!
//! A registry maps content classifications to transforms; anything without a
//! registered transform passes through untouched. The only concrete
//! transform is the image optimizer: decode, optional crop, resize-to-fit,
//! re-encode (optionally forcing WEBP), then swap the artifact under the
//! record. A transform failure is logged by the caller and never fails the
//! upload that already passed checksum verification.

use std::collections::HashMap;
use std::io::Cursor;

use color_quant::NeuQuant;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use log::{debug, warn};

use crate::checksum;
use crate::config::{CropBox, OptimizerConfig};
use crate::error::OptimizeError;
use crate::identity;
use crate::paths;
use crate::records::{ContentKind, UploadRecord};
use crate::store::FileStore;

pub trait Optimizer: Send + Sync {
    /// Transform the record's artifact in place. May replace the artifact
    /// and update `record.file_path`; the caller persists the record after.
    fn optimize(&self, record: &mut UploadRecord, files: &dyn FileStore)
        -> Result<(), OptimizeError>;
}

/// Dispatch table from content classification to transform. Kinds without an
/// entry get the identity transform.
#[derive(Default)]
pub struct OptimizerRegistry {
    transforms: HashMap<ContentKind, Box<dyn Optimizer>>,
}

impl OptimizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ContentKind, transform: Box<dyn Optimizer>) {
        self.transforms.insert(kind, transform);
    }

    pub fn run(
        &self,
        record: &mut UploadRecord,
        files: &dyn FileStore,
    ) -> Result<(), OptimizeError> {
        match self.transforms.get(&record.kind) {
            Some(transform) => transform.optimize(record, files),
            None => Ok(()),
        }
    }
}

/// Resize/format-normalize transform for uploaded images.
pub struct ImageOptimizer {
    config: OptimizerConfig,
    upload_to: String,
}

impl ImageOptimizer {
    pub fn new(config: OptimizerConfig, upload_to: &str) -> Self {
        Self {
            config,
            upload_to: upload_to.to_string(),
        }
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, OptimizeError> {
        let mut buf = Cursor::new(Vec::new());
        match format {
            ImageFormat::Png => {
                let rgba = quantize_palette(&image.to_rgba8());
                let encoder = PngEncoder::new_with_quality(
                    &mut buf,
                    png_compression(self.config.compress_level),
                    PngFilterType::Adaptive,
                );
                encoder
                    .write_image(&rgba, image.width(), image.height(), ExtendedColorType::Rgba8)
                    .map_err(|e| OptimizeError::Encode(e.to_string()))?;
            }
            ImageFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.config.quality);
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| OptimizeError::Encode(e.to_string()))?;
            }
            ImageFormat::WebP => {
                let rgba = image.to_rgba8();
                let encoder = WebPEncoder::new_lossless(&mut buf);
                encoder
                    .encode(
                        rgba.as_raw(),
                        image.width(),
                        image.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| OptimizeError::Encode(e.to_string()))?;
            }
            other => {
                return Err(OptimizeError::Encode(format!(
                    "unsupported output format {:?}",
                    other
                )))
            }
        }
        Ok(buf.into_inner())
    }
}

impl Optimizer for ImageOptimizer {
    fn optimize(
        &self,
        record: &mut UploadRecord,
        files: &dyn FileStore,
    ) -> Result<(), OptimizeError> {
        let data = files.read(&record.file_path)?;

        let reader = match ImageReader::new(Cursor::new(&data)).with_guessed_format() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Cannot probe image format for {}: {}", record.id, e);
                return Ok(());
            }
        };
        // Only these source formats are normalized; everything else (GIF,
        // SVG, ...) is left as uploaded.
        let (mut format, mut extension) = match reader.format() {
            Some(ImageFormat::Png) => (ImageFormat::Png, ".png"),
            Some(ImageFormat::Jpeg) => (ImageFormat::Jpeg, ".jpg"),
            Some(ImageFormat::WebP) => (ImageFormat::WebP, ".webp"),
            other => {
                debug!("Leaving {:?} artifact {} untouched", other, record.id);
                return Ok(());
            }
        };
        let image = match reader.decode() {
            Ok(image) => image,
            Err(e) => {
                // Corrupt or unsupported data is non-fatal; the verified
                // artifact stays authoritative.
                warn!("Cannot decode artifact for {}: {}", record.id, e);
                return Ok(());
            }
        };

        if self.config.to_webp {
            format = ImageFormat::WebP;
            extension = ".webp";
        }

        let image = match self.config.crop {
            Some(boxed) => crop_to_box(image, boxed),
            None => image,
        };
        let image = resize_to_fit(image, self.config.max_width, self.config.max_height);

        let encoded = self.encode(&image, format)?;

        // Name the replacement after its own content so the rename is as
        // deterministic as the original upload identity.
        let digest = checksum::digest_bytes(&encoded);
        let id = identity::derive(record.user.as_deref(), &digest);
        let bucket = paths::upload_bucket(&self.upload_to);
        let new_path = paths::logical_path(&format!("{}{}", id, extension), &bucket);

        // The replacement must be durably stored before the original goes
        // away; an encode or write failure above leaves the original alone.
        files.put(&new_path, &encoded)?;
        if new_path != record.file_path && !self.config.keep_original {
            if let Err(e) = files.delete(&record.file_path) {
                warn!("Cannot remove pre-optimization artifact {}: {}", record.file_path, e);
            }
        }
        record.file_path = new_path;
        Ok(())
    }
}

/// Scale down so the dimension that overflows its bound the most lands
/// exactly on that bound, preserving aspect ratio. Never upscales.
pub fn fit_dimensions(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    let width_ratio = w as f64 / max_w as f64;
    let height_ratio = h as f64 / max_h as f64;
    if width_ratio >= height_ratio {
        let nh = (h as f64 * max_w as f64 / w as f64).round() as u32;
        (max_w, nh.max(1))
    } else {
        let nw = (w as f64 * max_h as f64 / h as f64).round() as u32;
        (nw.max(1), max_h)
    }
}

fn resize_to_fit(image: DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    let (nw, nh) = fit_dimensions(w, h, max_w, max_h);
    if (nw, nh) == (w, h) {
        image
    } else {
        image.resize_exact(nw, nh, FilterType::Lanczos3)
    }
}

fn crop_to_box(image: DynamicImage, boxed: CropBox) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if boxed.x >= w || boxed.y >= h || boxed.width == 0 || boxed.height == 0 {
        return image;
    }
    let cw = boxed.width.min(w - boxed.x);
    let ch = boxed.height.min(h - boxed.y);
    image.crop_imm(boxed.x, boxed.y, cw, ch)
}

/// Reduce a PNG to a 256-color palette before re-encoding.
fn quantize_palette(rgba: &image::RgbaImage) -> Vec<u8> {
    let mut pixels = rgba.as_raw().clone();
    let quantizer = NeuQuant::new(10, 256, &pixels);
    let palette = quantizer.color_map_rgba();
    for pixel in pixels.chunks_exact_mut(4) {
        let idx = quantizer.index_of(pixel) * 4;
        pixel.copy_from_slice(&palette[idx..idx + 4]);
    }
    pixels
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock_store::MemoryFileStore;
    use crate::store::FileStore;
    use image::{Rgb, RgbImage};

    fn optimizer_config() -> OptimizerConfig {
        OptimizerConfig {
            quality: 82,
            compress_level: 9,
            max_width: 100,
            max_height: 60,
            to_webp: false,
            keep_original: false,
            crop: None,
        }
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 64]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn image_record(path: &str) -> UploadRecord {
        let mut record =
            UploadRecord::new(identity::derive(Some("alice"), "sum"), "sum", Some("alice"));
        record.file_path = path.to_string();
        record.kind = ContentKind::Image;
        record
    }

    #[test]
    fn test_fit_dimensions_binds_the_overflowing_side() {
        // Wide image: width is the binding dimension.
        assert_eq!(fit_dimensions(2000, 500, 1280, 720), (1280, 320));
        // Tall image: height binds.
        assert_eq!(fit_dimensions(500, 2000, 1280, 720), (180, 720));
        // Both overflow: the side overflowing more binds.
        assert_eq!(fit_dimensions(2560, 1440, 1280, 720), (1280, 720));
        // Within bounds: untouched, never upscaled.
        assert_eq!(fit_dimensions(640, 360, 1280, 720), (640, 360));
    }

    #[test]
    fn test_fit_dimensions_rounds_the_free_side() {
        let (nw, nh) = fit_dimensions(1000, 333, 100, 100);
        assert_eq!(nw, 100);
        assert_eq!(nh, 33); // round(333 * 100 / 1000)
    }

    #[test]
    fn test_optimize_resizes_and_replaces_artifact() {
        let files = MemoryFileStore::new();
        files.put("orig/a.png", &png_bytes(400, 120)).unwrap();
        let mut record = image_record("orig/a.png");

        let optimizer = ImageOptimizer::new(optimizer_config(), "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        assert_ne!(record.file_path, "orig/a.png");
        assert!(record.file_path.starts_with("opt/"));
        assert!(record.file_path.ends_with(".png"));
        assert!(!files.exists("orig/a.png"));

        let out = image::load_from_memory(&files.read(&record.file_path).unwrap()).unwrap();
        assert_eq!((out.width(), out.height()), (100, 30));
    }

    #[test]
    fn test_optimize_keeps_small_image_dimensions() {
        let files = MemoryFileStore::new();
        files.put("orig/small.png", &png_bytes(80, 40)).unwrap();
        let mut record = image_record("orig/small.png");

        let optimizer = ImageOptimizer::new(optimizer_config(), "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        let out = image::load_from_memory(&files.read(&record.file_path).unwrap()).unwrap();
        assert_eq!((out.width(), out.height()), (80, 40));
    }

    #[test]
    fn test_optimize_forces_webp_when_configured() {
        let files = MemoryFileStore::new();
        files.put("orig/a.png", &png_bytes(10, 10)).unwrap();
        let mut record = image_record("orig/a.png");

        let mut config = optimizer_config();
        config.to_webp = true;
        let optimizer = ImageOptimizer::new(config, "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        assert!(record.file_path.ends_with(".webp"));
        let data = files.read(&record.file_path).unwrap();
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn test_optimize_keep_original_retains_source() {
        let files = MemoryFileStore::new();
        files.put("orig/a.png", &png_bytes(10, 10)).unwrap();
        let mut record = image_record("orig/a.png");

        let mut config = optimizer_config();
        config.keep_original = true;
        let optimizer = ImageOptimizer::new(config, "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        assert!(files.exists("orig/a.png"));
        assert!(files.exists(&record.file_path));
    }

    #[test]
    fn test_optimize_ignores_corrupt_data() {
        let files = MemoryFileStore::new();
        files.put("orig/junk.png", b"definitely not an image").unwrap();
        let mut record = image_record("orig/junk.png");

        let optimizer = ImageOptimizer::new(optimizer_config(), "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        // Untouched: same path, same bytes.
        assert_eq!(record.file_path, "orig/junk.png");
        assert_eq!(files.read("orig/junk.png").unwrap(), b"definitely not an image");
    }

    #[test]
    fn test_crop_is_applied_before_resize() {
        // Crop a 400x400 image to its 200x100 top-left region, then fit into
        // 100x60: the resize must see the cropped dimensions (200x100 ->
        // 100x50), not the original 400x400.
        let files = MemoryFileStore::new();
        files.put("orig/a.png", &png_bytes(400, 400)).unwrap();
        let mut record = image_record("orig/a.png");

        let mut config = optimizer_config();
        config.crop = Some(CropBox {
            x: 0,
            y: 0,
            width: 200,
            height: 100,
        });
        let optimizer = ImageOptimizer::new(config, "opt");
        optimizer.optimize(&mut record, &files).unwrap();

        let out = image::load_from_memory(&files.read(&record.file_path).unwrap()).unwrap();
        assert_eq!((out.width(), out.height()), (100, 50));
    }

    #[test]
    fn test_crop_box_is_clamped_to_image_bounds() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(50, 50));
        let cropped = crop_to_box(
            image,
            CropBox {
                x: 40,
                y: 40,
                width: 100,
                height: 100,
            },
        );
        assert_eq!((cropped.width(), cropped.height()), (10, 10));
    }

    #[test]
    fn test_registry_defaults_to_identity() {
        let files = MemoryFileStore::new();
        files.put("orig/a.bin", b"raw bytes").unwrap();
        let mut record = image_record("orig/a.bin");
        record.kind = ContentKind::Binary;

        let registry = OptimizerRegistry::new();
        registry.run(&mut record, &files).unwrap();
        assert_eq!(record.file_path, "orig/a.bin");
        assert_eq!(files.read("orig/a.bin").unwrap(), b"raw bytes");
    }
}
