/// Error types for the capture workflow and the services it talks to
///
/// `WorkflowError` is what the controller hands back to the UI. The service
/// errors stay close to their collaborator and are flattened to a reason
/// string once they reach the controller.
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Outcome taxonomy of the capture workflow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The user dismissed the camera without taking a photo
    #[error("capture cancelled by user")]
    UserCancelled,

    /// Camera or location unavailable, denied or broken
    #[error("device capability error: {0}")]
    DeviceCapability(String),

    /// The photo record could not be written to the store
    #[error("failed to save photo record: {0}")]
    PersistenceWrite(String),
}

/// Errors raised while producing a captured image
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("camera pipeline error: {0}")]
    Pipeline(String),

    #[error("camera produced no frame within {0:?}")]
    NoFrame(Duration),

    #[error("cannot build a file URI for {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Errors raised by a geolocation provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location is disabled in the configuration")]
    Disabled,

    #[error("location service unavailable: {0}")]
    Service(String),

    #[error("no fresh location within {0:?}")]
    Timeout(Duration),

    #[error("unexpected value for location property {0}")]
    MalformedProperty(&'static str),

    #[error("location service stopped without a fix")]
    NoFix,
}

impl From<zbus::Error> for LocationError {
    fn from(err: zbus::Error) -> Self {
        LocationError::Service(err.to_string())
    }
}

impl From<zbus::fdo::Error> for LocationError {
    fn from(err: zbus::fdo::Error) -> Self {
        LocationError::Service(err.to_string())
    }
}

/// Errors raised by the key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Errors raised while loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
