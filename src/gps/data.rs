//! Fix state: position, velocity, satellite visibility and fix status,
//! guarded by a single store lock.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Number of slots in the satellite visibility table. PRNs outside
/// `0..SAT_TABLE_SIZE` are rejected at every write.
pub const SAT_TABLE_SIZE: usize = 50;

/// Maximum number of satellites a receiver reports in its position solution.
pub const ACTIVE_SET_SIZE: usize = 12;

/// Whether the last report represents a usable fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixStatus {
    #[default]
    Void,
    Active,
}

/// Quality/dimensionality of the fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixType {
    #[default]
    Unavailable,
    Invalid,
    Fix2D,
    Fix3D,
}

/// Satellite-selection mode reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixMode {
    #[default]
    Auto,
    Manual,
}

/// Display-only hemisphere annotation. Derived alongside the signed
/// coordinate and kept consistent with its sign; latitude and longitude
/// carry independent annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinal {
    #[default]
    None,
    North,
    South,
    East,
    West,
}

/// One visibility-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SatelliteEntry {
    pub elevation: i32,
    pub azimuth: i32,
    pub snr: i32,
}

/// Bounded map of satellite data keyed by PRN. Writes outside the PRN range
/// are rejected, never indexed.
#[derive(Debug, Clone)]
pub struct SatelliteTable {
    slots: [SatelliteEntry; SAT_TABLE_SIZE],
}

impl Default for SatelliteTable {
    fn default() -> Self {
        Self {
            slots: [SatelliteEntry::default(); SAT_TABLE_SIZE],
        }
    }
}

impl SatelliteTable {
    pub fn get(&self, prn: usize) -> Option<SatelliteEntry> {
        self.slots.get(prn).copied()
    }

    /// Overwrites the slot for `prn`. Returns false (table untouched) when
    /// the PRN is out of range.
    pub fn set(&mut self, prn: usize, entry: SatelliteEntry) -> bool {
        match self.slots.get_mut(prn) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    /// Zeroes every slot, ahead of a wholesale repopulation by GSV or a
    /// gpsd satellite report.
    pub fn clear(&mut self) {
        self.slots = [SatelliteEntry::default(); SAT_TABLE_SIZE];
    }
}

/// Snapshot of the position/velocity part of the fix, carried by the
/// position-updated notification.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The latest decoded fix. Mutated only by the decode path of the owning
/// backend task, always inside [`FixStore::apply`].
#[derive(Debug, Clone, Default)]
pub struct FixState {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Ground speed in km/h.
    pub speed: f64,
    /// Heading in degrees, true north.
    pub heading: f64,
    /// Magnetic variation in degrees.
    pub variation: f64,
    pub lat_cardinal: Cardinal,
    pub lon_cardinal: Cardinal,
    pub var_cardinal: Cardinal,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: FixStatus,
    pub fix_type: FixType,
    pub fix_mode: FixMode,
    pub fix_quality: u8,
    pub num_satellites: u32,
    /// Horizontal dilution of precision.
    pub dop: f64,
    pub satellites: SatelliteTable,
    /// PRNs used in the position solution, 0 for an empty slot. Distinct
    /// from the visibility table and updated only by GSA.
    pub active_set: [u16; ACTIVE_SET_SIZE],
}

impl FixState {
    pub fn position(&self) -> PositionFix {
        PositionFix {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            speed: self.speed,
            heading: self.heading,
            timestamp: self.timestamp,
        }
    }

    pub fn is_active_sat(&self, prn: u16) -> bool {
        self.active_set.contains(&prn)
    }

    // Degree/minute/second decompositions, pure derivations from the signed
    // decimal degrees.

    pub fn lat_degrees(&self) -> i32 {
        self.latitude.abs() as i32
    }

    pub fn lat_minutes(&self) -> i32 {
        let m = self.latitude.abs() - self.lat_degrees() as f64;
        (m * 60.0) as i32
    }

    pub fn lat_seconds(&self) -> i32 {
        let m = self.latitude.abs() - self.lat_degrees() as f64;
        let s = (m * 60.0) - (m * 60.0).trunc();
        (s * 60.0) as i32
    }

    pub fn lon_degrees(&self) -> i32 {
        self.longitude.abs() as i32
    }

    pub fn lon_minutes(&self) -> i32 {
        let m = self.longitude.abs() - self.lon_degrees() as f64;
        (m * 60.0) as i32
    }

    pub fn lon_seconds(&self) -> i32 {
        let m = self.longitude.abs() - self.lon_degrees() as f64;
        let s = (m * 60.0) - (m * 60.0).trunc();
        (s * 60.0) as i32
    }
}

/// Shared fix store: one session-scoped `FixState` behind one non-re-entrant
/// lock. The backend task is the sole writer; consumers only read.
///
/// All mutation for one decoded sentence happens inside a single
/// [`FixStore::apply`] call, so a reader never observes a torn
/// (status, type, mode) combination or a half-written satellite table.
#[derive(Debug, Default)]
pub struct FixStore {
    state: Mutex<FixState>,
}

impl FixStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one update batch under the lock. Decoders receive `&mut FixState`
    /// and call no store method while inside, so the lock is never taken
    /// re-entrantly.
    pub(crate) fn apply<R>(&self, f: impl FnOnce(&mut FixState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Clones the full fix state.
    pub fn snapshot(&self) -> FixState {
        self.state.lock().unwrap().clone()
    }

    pub fn position(&self) -> PositionFix {
        self.state.lock().unwrap().position()
    }

    pub fn satellite(&self, prn: usize) -> Option<SatelliteEntry> {
        self.state.lock().unwrap().satellites.get(prn)
    }

    pub fn is_active_sat(&self, prn: u16) -> bool {
        self.state.lock().unwrap().is_active_sat(prn)
    }

    pub fn fix_status(&self) -> FixStatus {
        self.state.lock().unwrap().status
    }

    pub fn fix_type(&self) -> FixType {
        self.state.lock().unwrap().fix_type
    }

    pub fn fix_mode(&self) -> FixMode {
        self.state.lock().unwrap().fix_mode
    }
}
