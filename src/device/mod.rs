/// Device services module
///
/// The workflow talks to the outside world through two seams:
/// - Camera capture: produce one image per invocation (camera.rs, webcam.rs)
/// - Geolocation: produce one best-effort coordinate (location.rs)
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LocationError;
use crate::state::data::{CaptureResult, Coordinate};

pub mod camera;
pub mod location;
pub mod webcam;

/// Fixed configuration handed to the camera on every capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Quality factor from 0.0 to 1.0 used for the stored JPEG
    pub quality: f32,
    /// Directory receiving captured images
    pub temp_dir: PathBuf,
    /// Mark `temp_dir` so backup tools skip it
    pub exclude_from_backup: bool,
}

/// Configuration handed to the geolocation service on every lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    pub high_accuracy: bool,
    /// Upper bound for the whole lookup
    pub timeout: Duration,
    /// Oldest cached fix that is still acceptable
    pub max_cached_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(20_000),
            max_cached_age: Duration::from_millis(1_000),
        }
    }
}

/// Something that can take a photo
#[async_trait]
pub trait CameraCapture: Send + Sync {
    /// Take one photo. Cancellation and failure are ordinary outcomes.
    async fn capture(&self, options: &CaptureOptions) -> CaptureResult;
}

/// Something that knows where the device is
#[async_trait]
pub trait Geolocation: Send + Sync {
    async fn current_position(&self, options: &LocationOptions) -> Result<Coordinate, LocationError>;
}
