use clap::{Parser, Subcommand};
use iced::widget::{button, column, container, row, text, Column};
use iced::{Alignment, ContentFit, Element, Length, Task, Theme};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

mod config;
mod device;
mod error;
mod state;
mod ui;

use config::Config;
use device::camera::camera_from_config;
use device::location::locator_from_config;
use device::{CameraCapture, CaptureOptions, Geolocation, LocationOptions};
use error::{LocationError, WorkflowError};
use state::data::{CaptureResult, Coordinate, ImageMetadata};
use state::store::{load_record, persist, KeyValueStore, SqliteStore};
use state::workflow::{
    ActiveCapture, CaptureWorkflow, LocationOutcome, LocationStatus, SaveDecision, SaveRequest,
    SaveStatus, SessionId,
};
use ui::datetime_picker::{DateTimePicker, PickerMessage};

/// Desktop id reported to system services
pub const APP_ID: &str = "photo-capture";

#[derive(Parser)]
#[command(name = "photo-capture")]
#[command(about = "Capture a photo, tag it with a date and location, and save the record")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/photo-capture/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the last saved photo record as JSON
    Last,
}

/// The collaborators the screen talks to
struct Services {
    camera: Arc<dyn CameraCapture>,
    locator: Arc<dyn Geolocation>,
    store: Arc<dyn KeyValueStore>,
}

/// Main application state
struct PhotoCapture {
    /// The capture workflow controller; owns all workflow state
    workflow: CaptureWorkflow,
    /// Picker draft while the picker is on screen
    picker: Option<DateTimePicker>,
    services: Services,
    capture_options: CaptureOptions,
    location_options: LocationOptions,
    /// The fixed key every save overwrites
    storage_key: String,
    /// The camera UI is open; a second one is not started
    camera_open: bool,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked "Take a Photo" (or "Retake")
    TakePhoto,
    /// The camera returned
    CaptureFinished(CaptureResult),
    /// The location lookup for a session returned
    LocationFinished(SessionId, Result<Coordinate, LocationError>),
    /// Interaction with the date/time picker
    Picker(PickerMessage),
    /// User asked to change the date again
    EditDate,
    /// User clicked "Save"
    Save,
    /// A held save stopped waiting for the location
    LocationGraceElapsed(SessionId),
    /// The store finished writing a record
    SaveFinished(SessionId, Result<(), String>),
}

impl PhotoCapture {
    /// Create a new instance of the application
    fn new(config: &Config, services: Services) -> (Self, Task<Message>) {
        let workflow = CaptureWorkflow::new(config.dismissal(), config.save_policy());

        info!(
            dismissal = ?workflow.dismissal(),
            save_policy = ?config.save_policy(),
            camera = ?config.capture.provider,
            provider = ?config.location.provider,
            "🎨 Photo Capture initialized"
        );

        (
            PhotoCapture {
                workflow,
                picker: None,
                services,
                capture_options: config.capture_options(),
                location_options: config.location_options(),
                storage_key: config.storage.key.clone(),
                camera_open: false,
                status: "Ready.".to_string(),
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TakePhoto => {
                if self.camera_open {
                    return Task::none();
                }
                self.camera_open = true;

                let camera = Arc::clone(&self.services.camera);
                let options = self.capture_options.clone();

                Task::perform(
                    async move { camera.capture(&options).await },
                    Message::CaptureFinished,
                )
            }
            Message::CaptureFinished(result) => {
                self.camera_open = false;

                match self.workflow.apply_capture(result) {
                    Ok(request) => {
                        self.status = "Photo captured. Set the date it was taken, then save.".to_string();
                        // A retake starts the picker over from the new date
                        self.picker = None;
                        self.sync_picker();
                        self.request_location(request.session)
                    }
                    // Cancellation and device errors stay off screen
                    Err(WorkflowError::UserCancelled) => Task::none(),
                    Err(err) => {
                        debug!(error = %err, "Capture not applied");
                        Task::none()
                    }
                }
            }
            Message::LocationFinished(session, result) => {
                match self.workflow.apply_location(session, result) {
                    LocationOutcome::Applied { save: Some(request) }
                    | LocationOutcome::Unavailable { save: Some(request) } => self.write(request),
                    LocationOutcome::Applied { save: None }
                    | LocationOutcome::Unavailable { save: None }
                    | LocationOutcome::Stale => Task::none(),
                }
            }
            Message::Picker(picker_message) => {
                let event = self
                    .picker
                    .as_mut()
                    .and_then(|picker| picker.update(picker_message));

                if let Some(event) = event {
                    self.workflow.on_date_time_changed(event);
                    self.sync_picker();
                }

                Task::none()
            }
            Message::EditDate => {
                if self.workflow.reopen_date_picker() {
                    self.sync_picker();
                }
                Task::none()
            }
            Message::Save => match self.workflow.request_save() {
                SaveDecision::Write(request) => self.write(request),
                SaveDecision::WaitForLocation { session, grace } => {
                    self.status = "Waiting for location...".to_string();
                    Task::perform(tokio::time::sleep(grace), move |()| {
                        Message::LocationGraceElapsed(session)
                    })
                }
                SaveDecision::NothingToSave | SaveDecision::InFlight => Task::none(),
            },
            Message::LocationGraceElapsed(session) => {
                match self.workflow.location_grace_elapsed(session) {
                    Some(request) => self.write(request),
                    None => Task::none(),
                }
            }
            Message::SaveFinished(session, result) => {
                // A newer capture owns the status line
                let current = self.workflow.is_current(session);

                match self.workflow.complete_save(session, result) {
                    Ok(()) if current => {
                        self.status = "✅ Photo saved.".to_string();
                    }
                    Ok(()) => {}
                    Err(err) => {
                        // The banner in the review screen tells the user
                        error!(error = %err, "Photo record was not saved");
                        if current {
                            self.status = "Save failed. Try again.".to_string();
                        }
                    }
                }
                self.sync_picker();
                Task::none()
            }
        }
    }

    /// Dispatch the best-effort location lookup for `session`
    fn request_location(&self, session: SessionId) -> Task<Message> {
        let locator = Arc::clone(&self.services.locator);
        let options = self.location_options;

        Task::perform(
            async move { locator.current_position(&options).await },
            move |result| Message::LocationFinished(session, result),
        )
    }

    /// Write a record in the background
    fn write(&mut self, request: SaveRequest) -> Task<Message> {
        self.status = "Saving...".to_string();

        let store = Arc::clone(&self.services.store);
        let key = self.storage_key.clone();
        let SaveRequest { session, record } = request;

        Task::perform(
            async move {
                persist(store.as_ref(), &key, &record)
                    .await
                    .map_err(|e| e.to_string())
            },
            move |result| Message::SaveFinished(session, result),
        )
    }

    /// Open or close the picker to match the workflow state
    fn sync_picker(&mut self) {
        let state = self.workflow.state();
        match (state.date_picker_visible, self.picker.is_some()) {
            (true, false) => {
                self.picker = Some(DateTimePicker::open(
                    state.date_taken,
                    self.workflow.dismissal(),
                ));
            }
            (false, true) => self.picker = None,
            _ => {}
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let body = match &self.workflow.state().current_capture {
            None => self.idle_view(),
            Some(capture) => self.review_view(capture),
        };

        let content: Column<Message> = column![text("Photo Capture").size(36), body]
            .spacing(24)
            .padding(40)
            .align_x(Alignment::Center);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn idle_view(&self) -> Element<Message> {
        column![
            button(text("Take a Photo").size(18))
                .padding(15)
                .on_press_maybe((!self.camera_open).then_some(Message::TakePhoto)),
            text(&self.status).size(16),
        ]
        .spacing(20)
        .align_x(Alignment::Center)
        .into()
    }

    fn review_view<'a>(&'a self, capture: &'a ActiveCapture) -> Element<'a, Message> {
        let state = self.workflow.state();

        let preview = iced::widget::image(iced::widget::image::Handle::from_path(
            capture.image.path.clone(),
        ))
        .width(Length::Fixed(300.0))
        .height(Length::Fixed(300.0))
        .content_fit(ContentFit::Cover);

        let taken = state
            .date_taken
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M");

        let mut content = column![
            preview,
            text(capture_label(&capture.image.metadata)).size(12),
            text(location_label(&state.location)).size(14),
            text(format!("Taken: {}", taken)).size(14),
        ]
        .spacing(12)
        .align_x(Alignment::Center);

        content = match &self.picker {
            Some(picker) if state.date_picker_visible => {
                content.push(picker.view().map(Message::Picker))
            }
            _ => content.push(button("Change date").on_press(Message::EditDate)),
        };

        let save_label = match state.save {
            SaveStatus::Idle => "Save",
            SaveStatus::AwaitingLocation => "Waiting for location...",
            SaveStatus::Writing => "Saving...",
        };

        content = content.push(
            row![
                button(save_label)
                    .padding(10)
                    .on_press_maybe(self.workflow.can_save().then_some(Message::Save)),
                button("Retake")
                    .padding(10)
                    .on_press_maybe((!self.camera_open).then_some(Message::TakePhoto)),
            ]
            .spacing(12),
        );

        if let Some(reason) = &state.last_save_error {
            content = content.push(
                text(format!("⚠️ Not saved: {}", reason))
                    .size(14)
                    .style(text::danger),
            );
        }

        content.push(text(&self.status).size(14)).into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Size and encoding of the stored capture
fn capture_label(metadata: &ImageMetadata) -> String {
    format!(
        "{}×{} · {} KB · JPEG quality {}",
        metadata.width,
        metadata.height,
        metadata.file_size / 1024,
        metadata.quality
    )
}

/// One-line description of the location lookup
fn location_label(location: &LocationStatus) -> String {
    match location {
        LocationStatus::NotRequested => "Location not requested".to_string(),
        LocationStatus::Pending => "📍 Locating...".to_string(),
        LocationStatus::Resolved(coordinate) => {
            format!("📍 {:.5}, {:.5}", coordinate.latitude, coordinate.longitude)
        }
        LocationStatus::Unavailable => "Location unavailable".to_string(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=photo_capture=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // The app cannot function without its record store
    let store_path = config
        .store_path()
        .ok_or("could not determine user data directory")?;
    let store = SqliteStore::open(store_path)?;

    match cli.command {
        Some(Commands::Last) => print_last(&store, &config.storage.key),
        None => run_gui(config, store),
    }
}

fn run_gui(config: Config, store: SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services {
        camera: camera_from_config(&config.capture),
        locator: locator_from_config(&config.location),
        store: Arc::new(store),
    };

    iced::application("Photo Capture", PhotoCapture::update, PhotoCapture::view)
        .theme(PhotoCapture::theme)
        .centered()
        .run_with(move || PhotoCapture::new(&config, services))?;

    Ok(())
}

/// Print the record stored under `key`
fn print_last(store: &SqliteStore, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    debug!(path = %store.path().display(), key, "Reading last photo record");

    match runtime.block_on(load_record(store, key))? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No photo saved yet."),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use device::location::DisabledLocator;
    use state::data::CapturedImage;
    use tempfile::TempDir;

    struct NoCamera;

    #[async_trait]
    impl CameraCapture for NoCamera {
        async fn capture(&self, _options: &CaptureOptions) -> CaptureResult {
            CaptureResult::Cancelled
        }
    }

    fn test_app(dir: &TempDir) -> PhotoCapture {
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        let services = Services {
            camera: Arc::new(NoCamera),
            locator: Arc::new(DisabledLocator),
            store: Arc::new(store),
        };
        PhotoCapture::new(&Config::default(), services).0
    }

    fn captured(uri: &str) -> Message {
        Message::CaptureFinished(CaptureResult::Succeeded(CapturedImage {
            uri: uri.to_string(),
            path: PathBuf::from("/tmp/capture.jpg"),
            metadata: ImageMetadata::default(),
        }))
    }

    fn current_session(app: &PhotoCapture) -> SessionId {
        app.workflow.state().current_capture.as_ref().unwrap().session
    }

    #[test]
    fn save_failure_for_current_capture_updates_status() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);

        let _ = app.update(captured("file:///tmp/a.jpg"));
        let session = current_session(&app);
        let _ = app.update(Message::Save);
        let _ = app.update(Message::SaveFinished(session, Err("disk full".into())));

        assert_eq!(app.status, "Save failed. Try again.");
        assert_eq!(app.workflow.state().last_save_error.as_deref(), Some("disk full"));
    }

    #[test]
    fn save_result_for_replaced_capture_leaves_status_alone() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);

        let _ = app.update(captured("file:///tmp/a.jpg"));
        let first = current_session(&app);
        let _ = app.update(Message::Save);
        let _ = app.update(captured("file:///tmp/b.jpg"));
        let status = app.status.clone();

        let _ = app.update(Message::SaveFinished(first, Err("disk full".into())));
        assert_eq!(app.status, status);
        assert_eq!(app.workflow.state().last_save_error, None);

        let _ = app.update(Message::SaveFinished(first, Ok(())));
        assert_eq!(app.status, status);
    }

    #[test]
    fn capture_label_shows_size_and_quality() {
        let metadata = ImageMetadata {
            width: 1280,
            height: 720,
            file_size: 150 * 1024,
            quality: 70,
            source: None,
        };

        assert_eq!(capture_label(&metadata), "1280×720 · 150 KB · JPEG quality 70");
    }

    #[test]
    fn location_label_covers_every_status() {
        assert_eq!(location_label(&LocationStatus::Pending), "📍 Locating...");
        assert_eq!(
            location_label(&LocationStatus::Resolved(Coordinate::new(48.858_44, 2.294_5))),
            "📍 48.85844, 2.29450"
        );
        assert_eq!(location_label(&LocationStatus::Unavailable), "Location unavailable");
    }

    #[test]
    fn cli_accepts_config_and_last() {
        let cli = Cli::try_parse_from(["photo-capture", "last", "--config", "/tmp/c.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Last)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
