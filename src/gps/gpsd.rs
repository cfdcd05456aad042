//! gpsd text-protocol client.
//!
//! Speaks the daemon's old-style ASCII protocol: short watch commands at
//! connect time (no response parsing) and comma-delimited report lines whose
//! `O=` tokens carry a position report and whose `Y=` tokens carry the
//! satellite sky view.

use super::data::{FixState, FixStatus, FixType, SatelliteEntry};
use super::Update;
use crate::error::{DeviceError, Result};
use chrono::Utc;
use tokio::{io::AsyncWriteExt, net::TcpStream};

/// Connects to a gpsd daemon, requests watch mode and returns the socket.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let mut stream = TcpStream::connect((host, port)).await.map_err(|e| {
        DeviceError::Open(format!("cannot connect to gpsd at {}:{}: {}", host, port, e))
    })?;

    // Watch mode, raw reports, one report per fix. The daemon's replies to
    // the commands themselves need no parsing.
    for command in ["w+\n", "r+\n", "j=1\n"] {
        stream.write_all(command.as_bytes()).await.map_err(|e| {
            DeviceError::Open(format!("cannot enable gpsd watch mode: {}", e))
        })?;
    }

    Ok(stream)
}

/// Decodes one report line. A line holds comma-delimited key-prefixed
/// tokens; anything that is not an `O=` or `Y=` report is skipped.
pub fn decode_report(state: &mut FixState, line: &str) -> Update {
    let mut update = Update::None;
    for token in line.split(',').filter(|t| !t.is_empty()) {
        if let Some(rest) = token.strip_prefix("O=") {
            update = update.merge(decode_position_report(state, rest));
        } else if let Some(rest) = token.strip_prefix("Y=") {
            update = update.merge(decode_satellite_report(state, rest));
        }
    }
    update
}

/// `O=` position report: space-separated fields with latitude, longitude,
/// altitude, heading and speed at fixed positions. A payload beginning with
/// `?` means the daemon has no current fix.
fn decode_position_report(state: &mut FixState, report: &str) -> Update {
    if report.is_empty() {
        return Update::None;
    }
    state.fix_type = FixType::Invalid;
    if report.starts_with('?') {
        return Update::None;
    }

    let fields: Vec<&str> = report.split_whitespace().collect();
    if fields.len() < 5 {
        return Update::None;
    }

    state.fix_type = FixType::Fix3D;
    state.status = FixStatus::Active;
    if let Ok(lat) = fields[3].parse() {
        state.latitude = lat;
    }
    if let Ok(lon) = fields[4].parse() {
        state.longitude = lon;
    }
    if let Some(Ok(alt)) = fields.get(5).map(|f| f.parse()) {
        state.altitude = alt;
    }
    if let Some(Ok(heading)) = fields.get(7).map(|f| f.parse()) {
        state.heading = heading;
    }
    if let Some(Ok(speed)) = fields.get(9).map(|f| f.parse::<f64>()) {
        // gpsd reports m/s; the store carries km/h.
        state.speed = speed * 3.6;
    }
    state.timestamp = Some(Utc::now());

    Update::Position
}

/// `Y=` satellite report: a colon-delimited list of space-separated
/// (PRN, elevation, azimuth, SNR, used) records, preceded by a header
/// record. Replaces the whole visibility table.
fn decode_satellite_report(state: &mut FixState, report: &str) -> Update {
    state.satellites.clear();

    let mut seen = 0;
    for record in report.split(':').filter(|r| !r.is_empty()).skip(1) {
        let items: Vec<&str> = record.split_whitespace().collect();
        if items.len() < 5 {
            continue;
        }
        let prn = match items[0].parse::<usize>() {
            Ok(prn) => prn,
            Err(_) => continue,
        };
        let entry = SatelliteEntry {
            elevation: items[1].parse::<f64>().unwrap_or(0.0) as i32,
            azimuth: items[2].parse::<f64>().unwrap_or(0.0) as i32,
            snr: items[3].parse::<f64>().unwrap_or(0.0) as i32,
        };
        if state.satellites.set(prn, entry) {
            seen += 1;
        }
    }
    state.num_satellites = seen;

    Update::Status
}
