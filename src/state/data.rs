/// Shared data structures for the capture workflow
///
/// These structs represent the data model that flows between
/// the device services, the controller and the record store.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Native metadata reported alongside a captured image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Pixel width of the stored JPEG
    pub width: u32,
    /// Pixel height of the stored JPEG
    pub height: u32,
    /// Size of the stored JPEG in bytes
    pub file_size: u64,
    /// JPEG quality used for the re-encode (1-100)
    pub quality: u8,
    /// Where the picture came from before it was re-encoded
    pub source: Option<PathBuf>,
}

/// A successfully captured image, stored in the capture directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// `file://` URI of the stored JPEG, written into the record
    pub uri: String,
    /// Local path of the stored JPEG, used for the preview
    pub path: PathBuf,
    pub metadata: ImageMetadata,
}

/// Result of one capture invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult {
    /// The user closed the camera without taking a photo
    Cancelled,
    /// The camera could not produce an image
    Failed(String),
    /// A photo was taken and stored
    Succeeded(CapturedImage),
}

/// The persisted record: the only thing this application writes
///
/// Serialized as `{"image": ..., "location": ..., "dateTaken": ...}` with
/// `dateTaken` in epoch milliseconds. A missing location is written as `null`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    /// URI of the captured image
    pub image: String,
    /// Best-effort location, `None` when it had not resolved at save time
    #[serde(default)]
    pub location: Option<Coordinate>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_taken: DateTime<Utc>,
}

impl PhotoRecord {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string (from storage)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn may_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_absent_location_is_null() {
        let record = PhotoRecord {
            image: "file:///tmp/a.jpg".to_string(),
            location: None,
            date_taken: may_first(),
        };

        let json = record.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"image":"file:///tmp/a.jpg","location":null,"dateTaken":1714557600000}"#
        );

        let restored = PhotoRecord::from_json(&json).unwrap();
        assert_eq!(restored, record);
        assert!(restored.location.is_none());
    }

    #[test]
    fn test_location_round_trip() {
        let record = PhotoRecord {
            image: "file:///tmp/b.jpg".to_string(),
            location: Some(Coordinate::new(48.8584, 2.2945)),
            date_taken: may_first(),
        };

        let restored = PhotoRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_missing_location_field_reads_as_absent() {
        let restored =
            PhotoRecord::from_json(r#"{"image":"file:///tmp/c.jpg","dateTaken":1714557600000}"#)
                .unwrap();

        assert_eq!(restored.location, None);
        assert_eq!(restored.date_taken, may_first());
    }
}
