/// The capture workflow controller
///
/// Owns the only mutable state of the screen and applies every event to it:
/// capture results, location fixes, picker changes and save completions.
/// It performs no I/O. The UI dispatches the async work the controller asks
/// for and feeds the results back in.
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::data::{CaptureResult, CapturedImage, Coordinate, PhotoRecord};
use super::picker::{PickerDismissal, PickerEvent};
use crate::error::{LocationError, WorkflowError};

/// Identifies one capture session (successful capture until save or retake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// The capture under review
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCapture {
    pub session: SessionId,
    pub image: CapturedImage,
}

/// Where the best-effort location lookup stands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationStatus {
    NotRequested,
    Pending,
    Resolved(Coordinate),
    /// The lookup failed; not retried for this session
    Unavailable,
}

impl LocationStatus {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            LocationStatus::Resolved(coordinate) => Some(*coordinate),
            _ => None,
        }
    }
}

/// Progress of a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    /// Save pressed, holding for the location lookup
    AwaitingLocation,
    /// Record handed to the store
    Writing,
}

/// What to do about a location that is still pending when Save is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Write right away; the record carries whatever location is known
    Immediate,
    /// Hold the write for at most `grace` while the lookup is pending
    AwaitLocation { grace: Duration },
}

/// The mutable state of one capture-to-save cycle
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub current_capture: Option<ActiveCapture>,
    pub location: LocationStatus,
    pub date_taken: DateTime<Utc>,
    pub date_picker_visible: bool,
    pub save: SaveStatus,
    /// Last persistence failure, shown to the user until the next save or capture
    pub last_save_error: Option<String>,
}

impl WorkflowState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            current_capture: None,
            location: LocationStatus::NotRequested,
            date_taken: now,
            date_picker_visible: false,
            save: SaveStatus::Idle,
            last_save_error: None,
        }
    }
}

/// The two screen states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No capture; only "Take a Photo" is offered
    Idle,
    /// A capture is under review; picker and Save are offered
    Reviewing,
}

/// Ask the UI to start a location lookup for this session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    pub session: SessionId,
}

/// A record ready to be written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub session: SessionId,
    pub record: PhotoRecord,
}

/// Result of pressing Save
#[derive(Debug, Clone, PartialEq)]
pub enum SaveDecision {
    /// No capture to save
    NothingToSave,
    /// A save is already waiting or writing
    InFlight,
    /// Hold the write; report back with `location_grace_elapsed` after `grace`
    WaitForLocation { session: SessionId, grace: Duration },
    /// Write this record now
    Write(SaveRequest),
}

/// Result of a location lookup arriving
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Stored for the current session; `save` is set when a save was waiting on it
    Applied { save: Option<SaveRequest> },
    /// The lookup failed (already logged); location stays absent for this session
    Unavailable { save: Option<SaveRequest> },
    /// The session it was requested for is gone
    Stale,
}

/// The capture workflow controller
#[derive(Debug, Clone)]
pub struct CaptureWorkflow {
    state: WorkflowState,
    dismissal: PickerDismissal,
    save_policy: SavePolicy,
    next_session: u64,
    clock: fn() -> DateTime<Utc>,
}

impl CaptureWorkflow {
    /// Create a controller in the Idle state using the wall clock
    pub fn new(dismissal: PickerDismissal, save_policy: SavePolicy) -> Self {
        Self::with_clock(dismissal, save_policy, Utc::now)
    }

    /// Create a controller with a custom source for "now"
    pub fn with_clock(
        dismissal: PickerDismissal,
        save_policy: SavePolicy,
        clock: fn() -> DateTime<Utc>,
    ) -> Self {
        Self {
            state: WorkflowState::fresh(clock()),
            dismissal,
            save_policy,
            next_session: 0,
            clock,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn dismissal(&self) -> PickerDismissal {
        self.dismissal
    }

    pub fn phase(&self) -> Phase {
        if self.state.current_capture.is_some() {
            Phase::Reviewing
        } else {
            Phase::Idle
        }
    }

    /// Whether the Save action should be enabled
    pub fn can_save(&self) -> bool {
        self.state.current_capture.is_some() && self.state.save == SaveStatus::Idle
    }

    /// Whether `session` is the capture currently under review
    pub fn is_current(&self, session: SessionId) -> bool {
        self.active_session() == Some(session)
    }

    fn active_session(&self) -> Option<SessionId> {
        self.state.current_capture.as_ref().map(|capture| capture.session)
    }

    /// Apply the result of a camera invocation
    ///
    /// Cancelled and failed captures leave the state untouched, including an
    /// in-progress review. A success starts a new session and replaces any
    /// review without confirmation.
    pub fn apply_capture(&mut self, result: CaptureResult) -> Result<LocationRequest, WorkflowError> {
        match result {
            CaptureResult::Cancelled => {
                debug!("Capture cancelled by user");
                Err(WorkflowError::UserCancelled)
            }
            CaptureResult::Failed(reason) => {
                warn!(reason = %reason, "Capture failed");
                Err(WorkflowError::DeviceCapability(reason))
            }
            CaptureResult::Succeeded(image) => {
                self.next_session += 1;
                let session = SessionId(self.next_session);

                info!(
                    uri = %image.uri,
                    session = session.0,
                    width = image.metadata.width,
                    height = image.metadata.height,
                    source = ?image.metadata.source,
                    "📸 Photo captured"
                );

                self.state = WorkflowState {
                    current_capture: Some(ActiveCapture { session, image }),
                    location: LocationStatus::Pending,
                    date_taken: (self.clock)(),
                    date_picker_visible: true,
                    save: SaveStatus::Idle,
                    last_save_error: None,
                };

                Ok(LocationRequest { session })
            }
        }
    }

    /// Apply the result of a location lookup started for `session`
    pub fn apply_location(
        &mut self,
        session: SessionId,
        result: Result<Coordinate, LocationError>,
    ) -> LocationOutcome {
        if self.active_session() != Some(session) {
            debug!(session = session.0, "Ignoring location for a finished session");
            return LocationOutcome::Stale;
        }

        let waiting = self.state.save == SaveStatus::AwaitingLocation;

        match result {
            Ok(coordinate) => {
                info!(
                    latitude = coordinate.latitude,
                    longitude = coordinate.longitude,
                    "📍 Location resolved"
                );
                self.state.location = LocationStatus::Resolved(coordinate);
                let save = if waiting { self.begin_write() } else { None };
                LocationOutcome::Applied { save }
            }
            Err(err) => {
                warn!(error = %err, "Location lookup failed");
                self.state.location = LocationStatus::Unavailable;
                let save = if waiting { self.begin_write() } else { None };
                LocationOutcome::Unavailable { save }
            }
        }
    }

    /// Apply a change event from the date/time picker
    ///
    /// Returns false when there is no capture to tag. A missing selection
    /// keeps whatever date was last chosen.
    pub fn on_date_time_changed(&mut self, event: PickerEvent) -> bool {
        if self.state.current_capture.is_none() {
            return false;
        }

        self.state.date_picker_visible = self.dismissal.visible_after(event.kind);
        if let Some(selected) = event.selected {
            self.state.date_taken = selected;
        }

        true
    }

    /// Show the picker again while reviewing
    pub fn reopen_date_picker(&mut self) -> bool {
        if self.state.current_capture.is_none() {
            return false;
        }
        self.state.date_picker_visible = true;
        true
    }

    /// The user pressed Save
    pub fn request_save(&mut self) -> SaveDecision {
        let Some(session) = self.active_session() else {
            return SaveDecision::NothingToSave;
        };

        if self.state.save != SaveStatus::Idle {
            return SaveDecision::InFlight;
        }

        if let SavePolicy::AwaitLocation { grace } = self.save_policy {
            if self.state.location == LocationStatus::Pending {
                debug!(session = session.0, ?grace, "Holding save for location");
                self.state.save = SaveStatus::AwaitingLocation;
                return SaveDecision::WaitForLocation { session, grace };
            }
        }

        match self.begin_write() {
            Some(request) => SaveDecision::Write(request),
            None => SaveDecision::NothingToSave,
        }
    }

    /// The grace period of a held save ran out; write without the location
    pub fn location_grace_elapsed(&mut self, session: SessionId) -> Option<SaveRequest> {
        if self.active_session() != Some(session)
            || self.state.save != SaveStatus::AwaitingLocation
        {
            return None;
        }

        debug!(session = session.0, "Location grace elapsed, saving without it");
        self.begin_write()
    }

    /// Report the outcome of writing the record for `session`
    ///
    /// A successful write ends the session. A failed write keeps the draft so
    /// the user can try again, and records the reason for display.
    pub fn complete_save(
        &mut self,
        session: SessionId,
        result: Result<(), String>,
    ) -> Result<(), WorkflowError> {
        if self.active_session() != Some(session) {
            debug!(session = session.0, "Save finished for a superseded session");
            return result.map_err(WorkflowError::PersistenceWrite);
        }

        match result {
            Ok(()) => {
                info!(session = session.0, "✅ Photo record saved");
                self.state = WorkflowState::fresh((self.clock)());
                Ok(())
            }
            Err(reason) => {
                self.state.save = SaveStatus::Idle;
                self.state.last_save_error = Some(reason.clone());
                Err(WorkflowError::PersistenceWrite(reason))
            }
        }
    }

    /// Build the record from the current session and mark it as writing
    fn begin_write(&mut self) -> Option<SaveRequest> {
        let capture = self.state.current_capture.as_ref()?;

        let request = SaveRequest {
            session: capture.session,
            record: PhotoRecord {
                image: capture.image.uri.clone(),
                location: self.state.location.coordinate(),
                date_taken: self.state.date_taken,
            },
        };

        self.state.save = SaveStatus::Writing;
        Some(request)
    }
}
