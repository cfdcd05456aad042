//! Stream framing, sentence decoding and fix state

pub mod data;
pub mod frame;
pub mod gpsd;
pub mod nmea;

#[cfg(windows)]
pub mod windows;

pub use data::{FixState, FixStore, PositionFix};
pub use frame::FrameExtractor;

/// What a successfully decoded frame changed, and therefore which
/// notifications to fire. `Position` implies a status update as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    None,
    Status,
    Position,
}

impl Update {
    /// Combines the outcome of several reports decoded from one line.
    pub fn merge(self, other: Update) -> Update {
        match (self, other) {
            (Update::Position, _) | (_, Update::Position) => Update::Position,
            (Update::Status, _) | (_, Update::Status) => Update::Status,
            _ => Update::None,
        }
    }
}
