/// Geolocation providers
///
/// `GeoClueLocator` asks the GeoClue2 service over the system D-Bus, which
/// works in both native and flatpak environments (with the location portal
/// permission). `FixedLocator` and `DisabledLocator` cover machines without it.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::{Geolocation, LocationOptions};
use crate::config::{LocationConfig, LocationProviderKind};
use crate::error::LocationError;
use crate::state::data::Coordinate;

const GEOCLUE_SERVICE: &str = "org.freedesktop.GeoClue2";
const MANAGER_PATH: &str = "/org/freedesktop/GeoClue2/Manager";
const MANAGER_INTERFACE: &str = "org.freedesktop.GeoClue2.Manager";
const CLIENT_INTERFACE: &str = "org.freedesktop.GeoClue2.Client";
const LOCATION_INTERFACE: &str = "org.freedesktop.GeoClue2.Location";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// GClueAccuracyLevel values
const ACCURACY_EXACT: u32 = 8;
const ACCURACY_NEIGHBORHOOD: u32 = 5;

/// Upper bound for stopping a client after the lookup
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the provider selected in the configuration
pub fn locator_from_config(config: &LocationConfig) -> Arc<dyn Geolocation> {
    match config.provider {
        LocationProviderKind::Geoclue => {
            let locator = GeoClueLocator::new(crate::APP_ID);
            match &config.bus_address {
                Some(address) => Arc::new(locator.with_bus_address(address.clone())),
                None => Arc::new(locator),
            }
        }
        LocationProviderKind::Fixed => match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => {
                Arc::new(FixedLocator::new(Coordinate::new(latitude, longitude)))
            }
            // Rejected by config validation; fall back rather than panic
            _ => Arc::new(DisabledLocator),
        },
        LocationProviderKind::Disabled => Arc::new(DisabledLocator),
    }
}

/// Location from the GeoClue2 D-Bus service
#[derive(Debug, Clone)]
pub struct GeoClueLocator {
    desktop_id: String,
    /// `None` means the system bus
    bus_address: Option<String>,
}

/// A GeoClue client that has to be stopped once the lookup ends
type ClientHandle = (zbus::Connection, OwnedObjectPath);

impl GeoClueLocator {
    pub fn new(desktop_id: impl Into<String>) -> Self {
        Self {
            desktop_id: desktop_id.into(),
            bus_address: None,
        }
    }

    /// Talk to GeoClue on `address` instead of the system bus
    pub fn with_bus_address(mut self, address: impl Into<String>) -> Self {
        self.bus_address = Some(address.into());
        self
    }

    async fn connect(&self) -> Result<zbus::Connection, LocationError> {
        let connection = match &self.bus_address {
            Some(address) => zbus::connection::Builder::address(address.as_str())?.build().await?,
            None => zbus::Connection::system().await?,
        };
        Ok(connection)
    }

    /// Every D-Bus step of one lookup; `client` is filled in as soon as GeoClue hands one out
    async fn locate(
        &self,
        options: &LocationOptions,
        client: &mut Option<ClientHandle>,
    ) -> Result<Coordinate, LocationError> {
        let connection = self.connect().await?;

        let manager = zbus::Proxy::new(
            &connection,
            GEOCLUE_SERVICE,
            MANAGER_PATH,
            MANAGER_INTERFACE,
        )
        .await?;

        let client_path: OwnedObjectPath = manager.call("GetClient", &()).await?;
        *client = Some((connection.clone(), client_path.clone()));

        let proxy = zbus::Proxy::new(
            &connection,
            GEOCLUE_SERVICE,
            client_path.as_str(),
            CLIENT_INTERFACE,
        )
        .await?;

        // GeoClue refuses to start a client without a desktop id
        proxy.set_property("DesktopId", self.desktop_id.as_str()).await?;
        proxy
            .set_property("RequestedAccuracyLevel", accuracy_level(options.high_accuracy))
            .await?;

        // Subscribe before starting so the first (possibly cached) fix is not missed
        let mut updates = proxy.receive_signal("LocationUpdated").await?;
        proxy.call_method("Start", &()).await?;

        next_fresh_fix(&connection, &mut updates, options.max_cached_age).await
    }
}

#[async_trait]
impl Geolocation for GeoClueLocator {
    async fn current_position(&self, options: &LocationOptions) -> Result<Coordinate, LocationError> {
        debug!(
            high_accuracy = options.high_accuracy,
            timeout = ?options.timeout,
            max_cached_age = ?options.max_cached_age,
            "Requesting location from GeoClue"
        );

        let mut client = None;

        // The timeout covers connecting, GetClient and Start as well as the wait for a fix
        let result = match tokio::time::timeout(options.timeout, self.locate(options, &mut client)).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(options.timeout)),
        };

        if let Some((connection, client_path)) = client {
            // A stalled service must not hold the result back
            tokio::spawn(async move {
                if let Err(e) = stop_client(&connection, &client_path).await {
                    warn!(error = %e, "Failed to stop GeoClue client");
                }
            });
        }

        match &result {
            Ok(coordinate) => info!(
                latitude = coordinate.latitude,
                longitude = coordinate.longitude,
                "GeoClue location acquired"
            ),
            Err(e) => debug!(error = %e, "GeoClue lookup ended without a location"),
        }

        result
    }
}

async fn stop_client(
    connection: &zbus::Connection,
    client_path: &OwnedObjectPath,
) -> Result<(), LocationError> {
    let client = zbus::Proxy::new(
        connection,
        GEOCLUE_SERVICE,
        client_path.as_str(),
        CLIENT_INTERFACE,
    )
    .await?;

    tokio::time::timeout(STOP_TIMEOUT, client.call_method("Stop", &()))
        .await
        .map_err(|_| LocationError::Timeout(STOP_TIMEOUT))??;

    Ok(())
}

/// Wait for the first `LocationUpdated` signal carrying a fix no older than `max_age`
async fn next_fresh_fix(
    connection: &zbus::Connection,
    updates: &mut (impl futures::Stream<Item = zbus::Message> + Unpin),
    max_age: Duration,
) -> Result<Coordinate, LocationError> {
    while let Some(message) = updates.next().await {
        let body = message.body();
        let (_old, new): (OwnedObjectPath, OwnedObjectPath) = body.deserialize()?;

        let (coordinate, fix_time) = read_fix(connection, &new).await?;
        match fix_time {
            Some(fix_time) if !is_fresh(fix_time, Utc::now(), max_age) => {
                debug!(%fix_time, "Skipping cached location older than allowed");
            }
            _ => return Ok(coordinate),
        }
    }

    Err(LocationError::NoFix)
}

fn accuracy_level(high_accuracy: bool) -> u32 {
    if high_accuracy {
        ACCURACY_EXACT
    } else {
        ACCURACY_NEIGHBORHOOD
    }
}

/// Read latitude, longitude and timestamp of a GeoClue location object
async fn read_fix(
    connection: &zbus::Connection,
    path: &OwnedObjectPath,
) -> Result<(Coordinate, Option<DateTime<Utc>>), LocationError> {
    let properties = zbus::Proxy::new(
        connection,
        GEOCLUE_SERVICE,
        path.as_str(),
        PROPERTIES_INTERFACE,
    )
    .await?;

    let latitude = float_property(&*get_property(&properties, "Latitude").await?, "Latitude")?;
    let longitude = float_property(&*get_property(&properties, "Longitude").await?, "Longitude")?;
    let timestamp = get_property(&properties, "Timestamp").await?;

    Ok((Coordinate::new(latitude, longitude), timestamp_from(&timestamp)))
}

async fn get_property(
    properties: &zbus::Proxy<'_>,
    name: &'static str,
) -> Result<OwnedValue, LocationError> {
    let value: OwnedValue = properties.call("Get", &(LOCATION_INTERFACE, name)).await?;
    Ok(value)
}

fn float_property(value: &Value<'_>, name: &'static str) -> Result<f64, LocationError> {
    match value {
        Value::F64(v) => Ok(*v),
        _ => Err(LocationError::MalformedProperty(name)),
    }
}

/// Decode GeoClue's `(seconds, microseconds)` timestamp
fn timestamp_from(value: &Value<'_>) -> Option<DateTime<Utc>> {
    let Value::Structure(structure) = value else {
        return None;
    };

    match structure.fields() {
        [Value::U64(secs), Value::U64(micros)] => {
            let nanos = micros.checked_mul(1_000)?;
            DateTime::from_timestamp(i64::try_from(*secs).ok()?, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

/// A fix is fresh when it is no older than `max_age`; clock skew into the future counts as fresh
fn is_fresh(fix_time: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match (now - fix_time).to_std() {
        Ok(age) => age <= max_age,
        Err(_) => true,
    }
}

/// Always reports the same configured coordinate
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    coordinate: Coordinate,
}

impl FixedLocator {
    pub fn new(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }
}

#[async_trait]
impl Geolocation for FixedLocator {
    async fn current_position(&self, _options: &LocationOptions) -> Result<Coordinate, LocationError> {
        Ok(self.coordinate)
    }
}

/// Location turned off
#[derive(Debug, Clone, Copy)]
pub struct DisabledLocator;

#[async_trait]
impl Geolocation for DisabledLocator {
    async fn current_position(&self, _options: &LocationOptions) -> Result<Coordinate, LocationError> {
        Err(LocationError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::os::unix::net::UnixListener;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn accuracy_follows_high_accuracy_flag() {
        assert_eq!(accuracy_level(true), 8);
        assert_eq!(accuracy_level(false), 5);
    }

    #[test]
    fn freshness_uses_max_age() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let max_age = Duration::from_millis(1_000);

        assert!(is_fresh(now, now, max_age));
        assert!(is_fresh(now - chrono::Duration::milliseconds(900), now, max_age));
        assert!(!is_fresh(now - chrono::Duration::seconds(5), now, max_age));
        assert!(is_fresh(now + chrono::Duration::seconds(2), now, max_age));
    }

    #[test]
    fn float_property_rejects_other_types() {
        assert_eq!(float_property(&Value::F64(48.85), "Latitude"), Ok(48.85));
        assert_eq!(
            float_property(&Value::U32(7), "Latitude"),
            Err(LocationError::MalformedProperty("Latitude"))
        );
    }

    #[test]
    fn timestamp_requires_structure() {
        assert_eq!(timestamp_from(&Value::U64(1)), None);
    }

    #[tokio::test]
    async fn fixed_and_disabled_locators() {
        let options = LocationOptions::default();
        let fixed = FixedLocator::new(Coordinate::new(48.8584, 2.2945));

        assert_eq!(
            fixed.current_position(&options).await,
            Ok(Coordinate::new(48.8584, 2.2945))
        );
        assert_eq!(
            DisabledLocator.current_position(&options).await,
            Err(LocationError::Disabled)
        );
    }

    #[tokio::test]
    async fn unresponsive_bus_is_bounded_by_timeout() {
        // Accepts connections but never answers, so the D-Bus handshake stalls
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("bus");
        let _listener = UnixListener::bind(&socket).unwrap();

        let locator = GeoClueLocator::new("photo-capture")
            .with_bus_address(format!("unix:path={}", socket.display()));
        let options = LocationOptions {
            timeout: Duration::from_millis(300),
            ..LocationOptions::default()
        };

        let started = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_secs(5), locator.current_position(&options)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result, Ok(Err(LocationError::Timeout(Duration::from_millis(300)))));
    }
}
