/// Capture providers and the capture directory they write into
///
/// `WebcamCamera` (webcam.rs) takes a still from a live camera. `PhotoPicker`
/// falls back to the native image picker; the picked image is decoded and
/// re-encoded as JPEG at the configured quality, so every record points at a
/// file this application owns.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::{debug, info};
use url::Url;

use super::webcam::WebcamCamera;
use super::{CameraCapture, CaptureOptions};
use crate::config::{CameraProviderKind, CaptureConfig};
use crate::error::CaptureError;
use crate::state::data::{CaptureResult, CapturedImage, ImageMetadata};

/// Extensions offered by the picker
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff", "bmp"];

/// Marker recognised by backup tools (https://bford.info/cachedir/)
const CACHEDIR_TAG: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag created by photo-capture.\n\
# For information about cache directory tags, see:\n\
#\thttps://bford.info/cachedir/\n";

/// Build the provider selected in the configuration
pub fn camera_from_config(config: &CaptureConfig) -> Arc<dyn CameraCapture> {
    match config.provider {
        CameraProviderKind::Webcam => Arc::new(WebcamCamera::new(
            config.source.clone(),
            config.warmup_frames,
            Duration::from_millis(config.frame_timeout_ms),
        )),
        CameraProviderKind::Picker => Arc::new(PhotoPicker::new()),
    }
}

/// Camera backed by the desktop's native file picker
#[derive(Debug, Clone, Default)]
pub struct PhotoPicker {
    /// Folder the picker opens in (e.g. ~/Pictures)
    start_dir: Option<PathBuf>,
}

impl PhotoPicker {
    pub fn new() -> Self {
        Self { start_dir: dirs::picture_dir() }
    }
}

#[async_trait]
impl CameraCapture for PhotoPicker {
    async fn capture(&self, options: &CaptureOptions) -> CaptureResult {
        let mut dialog = rfd::AsyncFileDialog::new()
            .set_title("Take a Photo")
            .add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(dir) = &self.start_dir {
            dialog = dialog.set_directory(dir);
        }

        let Some(handle) = dialog.pick_file().await else {
            return CaptureResult::Cancelled;
        };

        let source = handle.path().to_path_buf();
        let options = options.clone();

        // Decoding and encoding are CPU-bound
        let stored = tokio::task::spawn_blocking(move || store_capture(&source, &options))
            .await
            .map_err(|e| CaptureError::Join(e.to_string()));

        match stored {
            Ok(Ok(image)) => CaptureResult::Succeeded(image),
            Ok(Err(err)) | Err(err) => CaptureResult::Failed(err.to_string()),
        }
    }
}

/// Default capture directory
/// Returns ~/.cache/photo-capture/images on Linux
pub fn default_capture_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    path.push("photo-capture");
    path.push("images");
    path
}

/// Map a 0.0-1.0 quality factor to a JPEG quality (1-100)
pub fn jpeg_quality(factor: f32) -> u8 {
    let scaled = (factor.clamp(0.0, 1.0) * 100.0).round() as u8;
    scaled.max(1)
}

/// Re-encode `source` into the capture directory
pub fn store_capture(source: &Path, options: &CaptureOptions) -> Result<CapturedImage, CaptureError> {
    prepare_capture_dir(&options.temp_dir, options.exclude_from_backup)?;

    let decoded = image::open(source)?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let quality = jpeg_quality(options.quality);
    let target = capture_path(&options.temp_dir);

    let mut writer = BufWriter::new(File::create(&target)?);
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
    writer.flush()?;

    finish_capture(&target, Some(source.to_path_buf()), quality)
}

/// Path for a new capture in `dir`
pub(super) fn capture_path(dir: &Path) -> PathBuf {
    dir.join(format!("IMG_{}.jpg", Local::now().format("%Y%m%d_%H%M%S_%3f")))
}

/// Describe a JPEG already written to `path`
pub(super) fn finish_capture(
    path: &Path,
    source: Option<PathBuf>,
    quality: u8,
) -> Result<CapturedImage, CaptureError> {
    // URIs need an absolute path
    let path = fs::canonicalize(path)?;
    let file_size = fs::metadata(&path)?.len();
    let (width, height) = image::image_dimensions(&path)?;
    let uri = Url::from_file_path(&path)
        .map_err(|_| CaptureError::InvalidPath(path.clone()))?
        .to_string();

    info!(
        stored = %path.display(),
        quality,
        "📸 Stored capture ({}x{}, {} KB)",
        width,
        height,
        file_size / 1024
    );

    Ok(CapturedImage {
        uri,
        path,
        metadata: ImageMetadata {
            width,
            height,
            file_size,
            quality,
            source,
        },
    })
}

/// Create the capture directory and tag it for backup exclusion
pub(super) fn prepare_capture_dir(dir: &Path, exclude_from_backup: bool) -> Result<(), CaptureError> {
    fs::create_dir_all(dir)?;

    if exclude_from_backup {
        let tag = dir.join("CACHEDIR.TAG");
        if !tag.exists() {
            fs::write(&tag, CACHEDIR_TAG)?;
            debug!(path = %tag.display(), "Tagged capture directory for backup exclusion");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_source(dir: &Path) -> PathBuf {
        let path = dir.join("source.png");
        image::RgbImage::from_pixel(16, 8, image::Rgb([200, 40, 40]))
            .save(&path)
            .unwrap();
        path
    }

    fn options(dir: &Path, exclude_from_backup: bool) -> CaptureOptions {
        CaptureOptions {
            quality: 0.7,
            temp_dir: dir.join("images"),
            exclude_from_backup,
        }
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(3.0), 100);
    }

    #[test]
    fn test_store_capture_writes_jpeg_and_tag() {
        let dir = TempDir::new().unwrap();
        let source = sample_source(dir.path());

        let image = store_capture(&source, &options(dir.path(), true)).unwrap();

        assert!(image.path.exists());
        assert_eq!(image.path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(image.uri.starts_with("file://"));
        assert_eq!(image.metadata.width, 16);
        assert_eq!(image.metadata.height, 8);
        assert_eq!(image.metadata.quality, 70);
        assert_eq!(image.metadata.source.as_deref(), Some(source.as_path()));

        let format = image::guess_format(&fs::read(&image.path).unwrap()).unwrap();
        assert_eq!(format, image::ImageFormat::Jpeg);
        assert!(dir.path().join("images").join("CACHEDIR.TAG").exists());
    }

    #[test]
    fn test_store_capture_without_backup_exclusion() {
        let dir = TempDir::new().unwrap();
        let source = sample_source(dir.path());

        store_capture(&source, &options(dir.path(), false)).unwrap();

        assert!(!dir.path().join("images").join("CACHEDIR.TAG").exists());
    }

    #[test]
    fn test_store_capture_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.png");

        assert!(store_capture(&missing, &options(dir.path(), true)).is_err());
    }
}
