//! Windows Location Services backend

use super::data::{FixState, FixStatus, FixType, FixStore};
use super::Update;
use crate::error::{DeviceError, Result};
use chrono::Utc;
use windows::{
    Devices::Geolocation::{GeolocationAccessStatus, Geolocator, Geoposition, PositionAccuracy},
    Foundation::TimeSpan,
};

/// Ask the platform for location access. `Open` failure when the user or
/// policy denies it.
pub async fn request_location_access() -> Result<()> {
    let access_status = Geolocator::RequestAccessAsync()?.await?;

    match access_status {
        GeolocationAccessStatus::Allowed => Ok(()),
        GeolocationAccessStatus::Denied => Err(DeviceError::Open(
            "location access denied by user".to_string(),
        )),
        _ => Err(DeviceError::Open(
            "location access unavailable".to_string(),
        )),
    }
}

/// Create and configure a geolocator registration.
pub fn create_geolocator(accuracy_meters: u32) -> Result<Geolocator> {
    let geolocator = Geolocator::new()?;

    let desired = match accuracy_meters {
        0..=100 => PositionAccuracy::High,
        _ => PositionAccuracy::Default,
    };
    geolocator.SetDesiredAccuracy(desired)?;
    geolocator.SetMovementThreshold(1.0)?;

    Ok(geolocator)
}

/// Fetch one position report, with a 10 second age and timeout bound.
pub async fn get_position(geolocator: &Geolocator) -> Result<Geoposition> {
    let timeout = TimeSpan {
        Duration: 10_000_000 * 10, // 100ns units
    };

    let position = geolocator
        .GetGeopositionAsyncWithAgeAndTimeout(timeout, timeout)?
        .await?;

    Ok(position)
}

/// Apply one platform report to the fix state. Reported horizontal accuracy
/// stands in for fix dimensionality: beyond 500 m the report is unusable,
/// under 100 m it counts as a 3D fix, in between as 2D.
pub fn apply_position(state: &mut FixState, position: &Geoposition) -> Result<Update> {
    let coordinate = position.Coordinate()?;
    let point = coordinate.Point()?;
    let pos = point.Position()?;

    state.timestamp = Some(Utc::now());
    state.latitude = pos.Latitude;
    state.longitude = pos.Longitude;
    if pos.Altitude != 0.0 {
        state.altitude = pos.Altitude;
    }

    if let Ok(heading) = coordinate.Heading() {
        if let Ok(h) = heading.Value() {
            state.heading = h;
        }
    }
    if let Ok(speed) = coordinate.Speed() {
        if let Ok(s) = speed.Value() {
            state.speed = s * 3.6; // m/s to km/h
        }
    }

    let accuracy = coordinate.Accuracy().unwrap_or(f64::MAX);
    if accuracy > 500.0 {
        state.status = FixStatus::Void;
        state.fix_type = FixType::Unavailable;
        Ok(Update::Status)
    } else if accuracy < 100.0 {
        state.status = FixStatus::Active;
        state.fix_type = FixType::Fix3D;
        Ok(Update::Position)
    } else {
        state.status = FixStatus::Active;
        state.fix_type = FixType::Fix2D;
        Ok(Update::Position)
    }
}

/// One polling step of the platform backend: fetch a report and fold it
/// into the store under a single lock.
pub async fn poll_step(geolocator: &Geolocator, store: &FixStore) -> Result<Update> {
    let position = get_position(geolocator).await?;
    store.apply(|state| apply_position(state, &position))
}
