/// Application configuration.
///
/// Loaded from `<config_dir>/photo-capture/config.toml` (or `--config`).
/// Every key is optional; a missing default file means built-in defaults.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::camera::default_capture_dir;
use crate::device::webcam::DEFAULT_SOURCE;
use crate::device::{CaptureOptions, LocationOptions};
use crate::error::ConfigError;
use crate::state::picker::PickerDismissal;
use crate::state::store::SqliteStore;
use crate::state::workflow::SavePolicy;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub location: LocationConfig,
    pub picker: PickerConfig,
    pub save: SaveConfig,
    pub storage: StorageConfig,
}

/// Which camera provider to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraProviderKind {
    /// Live camera through a GStreamer source
    #[default]
    Webcam,
    /// Pick an existing image with the native file picker
    Picker,
}

/// Camera selection and the settings passed to it on every capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CaptureConfig {
    pub provider: CameraProviderKind,
    /// GStreamer source description for `webcam`
    pub source: String,
    /// Frames dropped while the camera adjusts exposure
    pub warmup_frames: u32,
    pub frame_timeout_ms: u64,
    /// JPEG quality factor, 0.0 to 1.0
    pub quality: f32,
    /// Tag the capture directory so backups skip it
    pub exclude_from_backup: bool,
    /// Where captured images go; defaults to the user cache directory
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            provider: CameraProviderKind::Webcam,
            source: DEFAULT_SOURCE.to_string(),
            warmup_frames: 5,
            frame_timeout_ms: 5_000,
            quality: 0.7,
            exclude_from_backup: true,
            temp_dir: None,
        }
    }
}

/// Which geolocation provider to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationProviderKind {
    /// GeoClue2 over the system D-Bus
    #[default]
    Geoclue,
    /// A constant coordinate from `latitude`/`longitude`
    Fixed,
    /// Never report a location
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LocationConfig {
    pub provider: LocationProviderKind,
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_cached_age_ms: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// D-Bus address to reach GeoClue on instead of the system bus
    pub bus_address: Option<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: LocationProviderKind::Geoclue,
            high_accuracy: true,
            timeout_ms: 20_000,
            max_cached_age_ms: 1_000,
            latitude: None,
            longitude: None,
            bus_address: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PickerConfig {
    /// Unset means the host platform's behaviour
    pub dismissal: Option<PickerDismissal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavePolicyKind {
    #[default]
    Immediate,
    AwaitLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SaveConfig {
    pub policy: SavePolicyKind,
    /// How long `await-location` holds a save
    pub location_grace_ms: u64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            policy: SavePolicyKind::Immediate,
            location_grace_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// SQLite file; defaults to the user data directory
    pub path: Option<PathBuf>,
    /// The single key every save overwrites
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            key: "photoData".to_string(),
        }
    }
}

impl Config {
    /// Load config from `explicit`, or from the default path.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound && explicit.is_none() => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::parse(&contents, &path)
    }

    /// Parse and validate TOML read from `path`
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The config file path: `<config_dir>/photo-capture/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("photo-capture").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.capture.quality) {
            return Err(ConfigError::Invalid(format!(
                "capture.quality must be between 0.0 and 1.0, got {}",
                self.capture.quality
            )));
        }

        if self.capture.provider == CameraProviderKind::Webcam && self.capture.source.trim().is_empty() {
            return Err(ConfigError::Invalid("capture.source must not be empty".into()));
        }

        if self.storage.key.is_empty() {
            return Err(ConfigError::Invalid("storage.key must not be empty".into()));
        }

        if self.location.provider == LocationProviderKind::Fixed {
            let (Some(latitude), Some(longitude)) = (self.location.latitude, self.location.longitude)
            else {
                return Err(ConfigError::Invalid(
                    "location.provider = \"fixed\" needs both latitude and longitude".into(),
                ));
            };
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(ConfigError::Invalid(format!(
                    "fixed location out of range: {latitude}, {longitude}"
                )));
            }
        }

        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            quality: self.capture.quality,
            temp_dir: self
                .capture
                .temp_dir
                .clone()
                .unwrap_or_else(default_capture_dir),
            exclude_from_backup: self.capture.exclude_from_backup,
        }
    }

    pub fn location_options(&self) -> LocationOptions {
        LocationOptions {
            high_accuracy: self.location.high_accuracy,
            timeout: Duration::from_millis(self.location.timeout_ms),
            max_cached_age: Duration::from_millis(self.location.max_cached_age_ms),
        }
    }

    /// Picker behaviour, resolved once at startup
    pub fn dismissal(&self) -> PickerDismissal {
        self.picker.dismissal.unwrap_or_else(PickerDismissal::for_host)
    }

    pub fn save_policy(&self) -> SavePolicy {
        match self.save.policy {
            SavePolicyKind::Immediate => SavePolicy::Immediate,
            SavePolicyKind::AwaitLocation => SavePolicy::AwaitLocation {
                grace: Duration::from_millis(self.save.location_grace_ms),
            },
        }
    }

    pub fn store_path(&self) -> Option<PathBuf> {
        self.storage.path.clone().or_else(SqliteStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(contents: &str) -> Result<Config, ConfigError> {
        Config::parse(contents, Path::new("config.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());

        let options = config.location_options();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(20));
        assert_eq!(options.max_cached_age, Duration::from_secs(1));
        assert_eq!(config.capture_options().quality, 0.7);
        assert_eq!(config.capture.provider, CameraProviderKind::Webcam);
        assert_eq!(config.capture.source, "pipewiresrc");
        assert!(config.capture_options().exclude_from_backup);
        assert_eq!(config.storage.key, "photoData");
        assert_eq!(config.save_policy(), SavePolicy::Immediate);
    }

    #[test]
    fn full_file_parses() {
        let config = parse(
            r#"
            [capture]
            provider = "picker"
            quality = 0.5
            exclude-from-backup = false
            temp-dir = "/tmp/captures"

            [location]
            provider = "fixed"
            latitude = 48.8584
            longitude = 2.2945
            timeout-ms = 5000
            bus-address = "unix:path=/run/test-bus"

            [picker]
            dismissal = "manual-close"

            [save]
            policy = "await-location"
            location-grace-ms = 1500

            [storage]
            path = "/tmp/store.db"
            key = "lastPhoto"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture_options().temp_dir, PathBuf::from("/tmp/captures"));
        assert!(!config.capture.exclude_from_backup);
        assert_eq!(config.capture.provider, CameraProviderKind::Picker);
        assert_eq!(config.location.bus_address.as_deref(), Some("unix:path=/run/test-bus"));
        assert_eq!(config.location.provider, LocationProviderKind::Fixed);
        assert_eq!(config.location_options().timeout, Duration::from_secs(5));
        assert_eq!(config.dismissal(), PickerDismissal::ManualClose);
        assert_eq!(
            config.save_policy(),
            SavePolicy::AwaitLocation { grace: Duration::from_millis(1500) }
        );
        assert_eq!(config.store_path(), Some(PathBuf::from("/tmp/store.db")));
        assert_eq!(config.storage.key, "lastPhoto");
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        let err = parse("[capture]\nquality = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn webcam_source_is_configurable_and_required() {
        let config = parse("[capture]\nsource = \"v4l2src device=/dev/video2\"\nwarmup-frames = 0\n").unwrap();
        assert_eq!(config.capture.source, "v4l2src device=/dev/video2");
        assert_eq!(config.capture.warmup_frames, 0);

        let err = parse("[capture]\nsource = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn fixed_provider_needs_coordinates() {
        let err = parse("[location]\nprovider = \"fixed\"\nlatitude = 10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = parse("[location]\nprovider = \"fixed\"\nlatitude = 95.0\nlongitude = 0.0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_provider_is_a_parse_error() {
        let err = parse("[location]\nprovider = \"gps\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(dir.path().join("missing.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[location]\nprovider = \"disabled\"\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.location.provider, LocationProviderKind::Disabled);
    }
}
