//! GPS acquisition engine
//!
//! Ingests a continuous byte stream from a serial receiver, a replayed log
//! file, a gpsd daemon or the OS location service, and decodes it into a
//! continuously updated fix: position, velocity and satellite visibility.

pub mod config;
pub mod device;
pub mod error;
pub mod gps;

// Re-export main types for convenience
pub use config::DeviceConfig;
pub use device::{DeviceEvent, GpsDevice, GpsSource};
pub use error::{DecodeError, DeviceError, Result};
pub use gps::{FixState, FixStore, FrameExtractor, PositionFix};
