//! NMEA 0183 sentence decoding with strict field-position semantics.
//!
//! A frame arrives here already sliced by the frame extractor: it begins at
//! `$` and carries no line terminator. Dispatch looks at the 3-character
//! sentence-type code after the talker id (bytes 3..5), so `$GPGGA` and
//! `$GNGGA` route the same way.

use super::data::{Cardinal, FixMode, FixState, FixStatus, FixType, SatelliteEntry};
use super::Update;
use crate::error::DecodeError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Decodes one framed sentence into `state`. Returns which notifications the
/// caller should fire; unknown sentence types decode to [`Update::None`].
///
/// Field counts are validated per sentence type before any mutation, so a
/// short sentence fails with [`DecodeError::TooFewFields`] and leaves the
/// state untouched.
pub fn decode_sentence(state: &mut FixState, frame: &str) -> Result<Update, DecodeError> {
    if frame.len() < 6 {
        return Ok(Update::None);
    }
    if frame.matches('$').count() > 1 {
        return Err(DecodeError::MalformedFrame);
    }

    let parts: Vec<&str> = frame.split(',').collect();

    match frame.get(3..6) {
        Some("GGA") => decode_gga(state, &parts),
        Some("GLL") => decode_gll(state, &parts),
        Some("GSA") => decode_gsa(state, &parts),
        Some("RMC") => decode_rmc(state, &parts),
        Some("GSV") => decode_gsv(state, &parts),
        _ => Ok(Update::None),
    }
}

fn require(sentence: &'static str, parts: &[&str], expected: usize) -> Result<(), DecodeError> {
    if parts.len() < expected {
        return Err(DecodeError::TooFewFields {
            sentence,
            expected,
            got: parts.len(),
        });
    }
    Ok(())
}

/// Converts a degrees-minutes coordinate ("4807.038") to signed decimal
/// degrees. `split` is the number of leading degree digits (2 for latitude,
/// 3 for longitude); any hemisphere token other than `positive` flips the
/// sign.
fn dmm_to_decimal(value: &str, split: usize, hemisphere: &str, positive: &str) -> Option<f64> {
    let degrees: f64 = value.get(..split)?.parse().ok()?;
    let minutes: f64 = value.get(split..)?.parse().ok()?;
    let decimal = degrees + minutes / 60.0;
    Some(if hemisphere == positive {
        decimal
    } else {
        -decimal
    })
}

fn lat_cardinal(hemisphere: &str) -> Cardinal {
    match hemisphere.chars().next() {
        Some('N') => Cardinal::North,
        Some('S') => Cardinal::South,
        _ => Cardinal::None,
    }
}

fn lon_cardinal(hemisphere: &str) -> Cardinal {
    match hemisphere.chars().next() {
        Some('E') => Cardinal::East,
        Some('W') => Cardinal::West,
        _ => Cardinal::None,
    }
}

fn set_latitude(state: &mut FixState, value: &str, hemisphere: &str) {
    if let Some(lat) = dmm_to_decimal(value, 2, hemisphere, "N") {
        state.latitude = lat;
    }
    if !hemisphere.is_empty() {
        state.lat_cardinal = lat_cardinal(hemisphere);
    }
}

fn set_longitude(state: &mut FixState, value: &str, hemisphere: &str) {
    if let Some(lon) = dmm_to_decimal(value, 3, hemisphere, "E") {
        state.longitude = lon;
    }
    if !hemisphere.is_empty() {
        state.lon_cardinal = lon_cardinal(hemisphere);
    }
}

/// A position notification fires only for a sentence that yields a usable
/// fix: Active status with 2D, 3D or not-yet-reported dimensionality.
fn usable_fix(state: &FixState) -> bool {
    state.status == FixStatus::Active
        && matches!(
            state.fix_type,
            FixType::Fix2D | FixType::Fix3D | FixType::Unavailable
        )
}

/// GGA, fix data:
///
/// ```text
/// $GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47
///        time   lat      N lon       E q sat dop alt
/// ```
fn decode_gga(state: &mut FixState, parts: &[&str]) -> Result<Update, DecodeError> {
    require("GGA", parts, 10)?;

    set_latitude(state, parts[2], parts[3]);
    set_longitude(state, parts[4], parts[5]);

    if let Ok(quality) = parts[6].parse::<u8>() {
        state.fix_quality = quality;
    }
    if let Ok(sats) = parts[7].parse::<u32>() {
        state.num_satellites = sats;
    }
    if let Ok(dop) = parts[8].parse::<f64>() {
        state.dop = dop;
    }
    if let Ok(altitude) = parts[9].parse::<f64>() {
        state.altitude = altitude;
    }

    if usable_fix(state) {
        Ok(Update::Position)
    } else {
        Ok(Update::Status)
    }
}

/// GLL, geographic position:
///
/// ```text
/// $GPGLL,4916.45,N,12311.12,W,225444,A
///        lat     N lon      W time   status
/// ```
fn decode_gll(state: &mut FixState, parts: &[&str]) -> Result<Update, DecodeError> {
    require("GLL", parts, 7)?;

    set_latitude(state, parts[1], parts[2]);
    set_longitude(state, parts[3], parts[4]);

    state.status = if parts[6].starts_with('A') {
        FixStatus::Active
    } else {
        FixStatus::Void
    };

    Ok(Update::Status)
}

/// GSA, satellite status: fix mode, fix type and the active-satellite set.
/// Touches only the active set, never the visibility table.
///
/// ```text
/// $GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39
///        mode type <up to 12 PRNs.........> dop hdop vdop
/// ```
fn decode_gsa(state: &mut FixState, parts: &[&str]) -> Result<Update, DecodeError> {
    require("GSA", parts, 15)?;

    state.fix_mode = if parts[1] == "A" {
        FixMode::Auto
    } else {
        FixMode::Manual
    };

    state.fix_type = match parts[2].parse::<u8>() {
        Ok(1) => FixType::Invalid,
        Ok(2) => FixType::Fix2D,
        _ => FixType::Fix3D,
    };

    // Absent slots parse as 0.
    for (slot, token) in state.active_set.iter_mut().zip(&parts[3..15]) {
        *slot = token.parse().unwrap_or(0);
    }

    Ok(Update::Status)
}

/// RMC, recommended minimum fix data:
///
/// ```text
/// $GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A
///        time   s lat      N lon       E knots heading date  var   varhemi
/// ```
fn decode_rmc(state: &mut FixState, parts: &[&str]) -> Result<Update, DecodeError> {
    require("RMC", parts, 12)?;

    if let Some(ts) = compose_datetime(parts[9], parts[1]) {
        state.timestamp = Some(ts);
    }

    state.status = if parts[2] == "A" {
        FixStatus::Active
    } else {
        FixStatus::Void
    };

    set_latitude(state, parts[3], parts[4]);
    set_longitude(state, parts[5], parts[6]);

    if let Ok(knots) = parts[7].parse::<f64>() {
        state.speed = knots_to_kmh(knots);
    }
    if let Ok(heading) = parts[8].parse::<f64>() {
        state.heading = heading;
    }
    if let Ok(variation) = parts[10].parse::<f64>() {
        state.variation = variation;
    }
    if !parts[11].is_empty() {
        state.var_cardinal = lon_cardinal(parts[11]);
    }

    if usable_fix(state) {
        Ok(Update::Position)
    } else {
        Ok(Update::Status)
    }
}

/// GSV, satellites in view. Each sentence of a group carries up to four
/// (PRN, elevation, azimuth, SNR) tuples; sentence 1 starts a fresh table
/// and later sentences of the group fill in the rest.
///
/// ```text
/// $GPGSV,2,1,08,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75
///        tot cur num <prn elev azim snr> x4
/// ```
fn decode_gsv(state: &mut FixState, parts: &[&str]) -> Result<Update, DecodeError> {
    require("GSV", parts, 4)?;

    let current_sentence: u32 = parts[2].parse().unwrap_or(0);
    if current_sentence <= 1 {
        state.satellites.clear();
    }

    let mut i = 4;
    while i + 3 < parts.len() {
        let prn = parts[i].parse::<usize>();
        let elevation = parts[i + 1].parse().unwrap_or(0);
        let azimuth = parts[i + 2].parse().unwrap_or(0);
        // The last SNR of a sentence may carry the trailing checksum.
        let snr_token = parts[i + 3].split('*').next().unwrap_or("");
        let snr = snr_token.parse().unwrap_or(0);

        if let Ok(prn) = prn {
            // Out-of-range PRNs are rejected by the table, in-range ones
            // overwrite exactly their slot.
            state.satellites.set(
                prn,
                SatelliteEntry {
                    elevation,
                    azimuth,
                    snr,
                },
            );
        }
        i += 4;
    }

    Ok(Update::Status)
}

/// Rounded to one decimal place, matching how receivers report it.
fn knots_to_kmh(knots: f64) -> f64 {
    (knots * 1.852 * 10.0).round() / 10.0
}

/// Composes the RMC date ("ddmmyy") and time ("hhmmss" or "hhmmss.sss")
/// fields into a UTC instant. Two-digit years resolve against a 1970 pivot:
/// a parsed year below 1970 is taken to be 100 years later, so "94" is 1994
/// and "04" is 2004.
fn compose_datetime(date: &str, time: &str) -> Option<DateTime<Utc>> {
    if date.len() < 6 || time.len() < 6 {
        return None;
    }

    let day: u32 = date[0..2].parse().ok()?;
    let month: u32 = date[2..4].parse().ok()?;
    let mut year: i32 = 1900 + date[4..6].parse::<i32>().ok()?;
    if year < 1970 {
        year += 100;
    }

    let hour: u32 = time[0..2].parse().ok()?;
    let minute: u32 = time[2..4].parse().ok()?;
    let second: u32 = time[4..6].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?
        .and_time(NaiveTime::from_hms_opt(hour, minute, second)?);
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_gga_decoding() {
        let mut state = FixState::default();
        let update = decode_sentence(
            &mut state,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
        )
        .unwrap();

        assert!((state.latitude - 48.1173).abs() < 0.0001);
        assert!((state.longitude - 11.5167).abs() < 0.0001);
        assert_eq!(state.fix_quality, 1);
        assert_eq!(state.num_satellites, 8);
        assert_eq!(state.dop, 0.9);
        assert_eq!(state.altitude, 545.4);
        assert_eq!(state.lat_cardinal, Cardinal::North);
        assert_eq!(state.lon_cardinal, Cardinal::East);
        // Void status: GGA alone is not a usable fix.
        assert_eq!(update, Update::Status);
    }

    #[test]
    fn test_gga_southern_western_hemispheres() {
        let mut state = FixState::default();
        decode_sentence(
            &mut state,
            "$GPGGA,123519,4807.038,S,01131.000,W,1,08,0.9,545.4,M,46.9,M,,*47",
        )
        .unwrap();

        assert!((state.latitude + 48.1173).abs() < 0.0001);
        assert!((state.longitude + 11.5167).abs() < 0.0001);
        assert_eq!(state.lat_cardinal, Cardinal::South);
        assert_eq!(state.lon_cardinal, Cardinal::West);
    }

    #[test]
    fn test_gga_fires_position_once_active() {
        let mut state = FixState::default();
        state.status = FixStatus::Active;
        let update = decode_sentence(
            &mut state,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
        )
        .unwrap();

        assert_eq!(update, Update::Position);
    }

    #[test]
    fn test_gll_decoding() {
        let mut state = FixState::default();
        let update =
            decode_sentence(&mut state, "$GPGLL,4916.45,N,12311.12,W,225444,A,*1D").unwrap();

        assert!((state.latitude - 49.274166).abs() < 0.0001);
        assert!((state.longitude + 123.18533).abs() < 0.0001);
        assert_eq!(state.status, FixStatus::Active);
        assert_eq!(update, Update::Status);
    }

    #[test]
    fn test_rmc_decoding() {
        let mut state = FixState::default();
        let update = decode_sentence(
            &mut state,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A",
        )
        .unwrap();

        assert_eq!(state.status, FixStatus::Active);
        // 022.4 knots -> 41.5 km/h, rounded to one decimal.
        assert_eq!(state.speed, 41.5);
        assert_eq!(state.heading, 84.4);
        assert_eq!(state.variation, 3.1);
        assert_eq!(state.var_cardinal, Cardinal::West);
        assert_eq!(update, Update::Position);

        let ts = state.timestamp.unwrap();
        assert_eq!(ts.year(), 1994);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 23);
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.minute(), 35);
        assert_eq!(ts.second(), 19);
    }

    #[test]
    fn test_rmc_century_pivot() {
        // "04" parses as 1904, below the pivot, so it resolves to 2004.
        let mut state = FixState::default();
        decode_sentence(
            &mut state,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230304,003.1,W*6A",
        )
        .unwrap();
        assert_eq!(state.timestamp.unwrap().year(), 2004);

        // "94" is at or above the pivot and stays 1994.
        decode_sentence(
            &mut state,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A",
        )
        .unwrap();
        assert_eq!(state.timestamp.unwrap().year(), 1994);
    }

    #[test]
    fn test_rmc_void_status_is_status_only() {
        let mut state = FixState::default();
        let update = decode_sentence(
            &mut state,
            "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A",
        )
        .unwrap();

        assert_eq!(state.status, FixStatus::Void);
        assert_eq!(update, Update::Status);
    }

    #[test]
    fn test_gsa_decoding() {
        let mut state = FixState::default();
        let update =
            decode_sentence(&mut state, "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39")
                .unwrap();

        assert_eq!(state.fix_mode, FixMode::Auto);
        assert_eq!(state.fix_type, FixType::Fix3D);
        assert_eq!(state.active_set[0], 4);
        assert_eq!(state.active_set[1], 5);
        assert_eq!(state.active_set[2], 0);
        assert_eq!(state.active_set[3], 9);
        assert!(state.is_active_sat(24));
        assert!(!state.is_active_sat(7));
        assert_eq!(update, Update::Status);
    }

    #[test]
    fn test_gsa_leaves_visibility_table_alone() {
        let mut state = FixState::default();
        decode_sentence(
            &mut state,
            "$GPGSV,1,1,04,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75",
        )
        .unwrap();
        let before = state.satellites.get(1).unwrap();

        decode_sentence(&mut state, "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39").unwrap();

        assert_eq!(state.satellites.get(1), Some(before));
    }

    #[test]
    fn test_gsv_decoding() {
        let mut state = FixState::default();
        decode_sentence(
            &mut state,
            "$GPGSV,2,1,08,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75",
        )
        .unwrap();

        assert_eq!(
            state.satellites.get(1),
            Some(SatelliteEntry {
                elevation: 40,
                azimuth: 83,
                snr: 46,
            })
        );
        assert_eq!(
            state.satellites.get(14),
            Some(SatelliteEntry {
                elevation: 22,
                azimuth: 228,
                // Checksum suffix stripped before parsing.
                snr: 45,
            })
        );
    }

    #[test]
    fn test_gsv_group_continuation_keeps_first_sentence() {
        let mut state = FixState::default();
        decode_sentence(&mut state, "$GPGSV,2,1,08,01,40,083,46,02,17,308,41*79").unwrap();
        decode_sentence(&mut state, "$GPGSV,2,2,08,25,13,121,30,29,55,200,38*7C").unwrap();

        // Sentence 2 of the group must not wipe sentence 1's slots.
        assert!(state.satellites.get(1).unwrap().snr == 46);
        assert!(state.satellites.get(25).unwrap().snr == 30);

        // A new group starting at sentence 1 replaces the whole table.
        decode_sentence(&mut state, "$GPGSV,1,1,01,05,10,100,20*7E").unwrap();
        assert_eq!(state.satellites.get(1), Some(SatelliteEntry::default()));
        assert_eq!(state.satellites.get(5).unwrap().snr, 20);
    }

    #[test]
    fn test_gsv_out_of_range_prn_rejected() {
        let mut state = FixState::default();
        decode_sentence(&mut state, "$GPGSV,1,1,02,75,40,083,46,03,17,308,41*70").unwrap();

        // PRN 75 is outside the table; PRN 3 in the same sentence still lands.
        assert_eq!(state.satellites.get(3).unwrap().snr, 41);
        assert!((0..50).all(|prn| state.satellites.get(prn).unwrap().snr != 46));
    }

    #[test]
    fn test_gsv_does_not_touch_active_set() {
        let mut state = FixState::default();
        state.active_set[0] = 4;
        decode_sentence(
            &mut state,
            "$GPGSV,1,1,04,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75",
        )
        .unwrap();

        assert!(state.is_active_sat(4));
    }

    #[test]
    fn test_duplicate_marker_rejected_without_mutation() {
        let mut state = FixState::default();
        let err = decode_sentence(
            &mut state,
            "$GPGGA,123519,4807.038,N,$GPRMC,123519,A,4807.038,N",
        )
        .unwrap_err();

        assert_eq!(err, DecodeError::MalformedFrame);
        assert_eq!(state.latitude, 0.0);
        assert_eq!(state.status, FixStatus::Void);
    }

    #[test]
    fn test_too_few_fields_rejected_before_any_write() {
        let mut state = FixState::default();
        let err = decode_sentence(&mut state, "$GPGSA,A,3,04").unwrap_err();

        assert_eq!(
            err,
            DecodeError::TooFewFields {
                sentence: "GSA",
                expected: 15,
                got: 4,
            }
        );
        assert_eq!(state.fix_type, FixType::Unavailable);
        assert_eq!(state.active_set, [0; 12]);
    }

    #[test]
    fn test_unknown_sentence_ignored() {
        let mut state = FixState::default();
        let update = decode_sentence(&mut state, "$GPZDA,160012.71,11,03,2004,-1,00*7D").unwrap();

        assert_eq!(update, Update::None);
        assert_eq!(state.latitude, 0.0);
    }
}
