//! Vehicle Model Error Types

use can_bridge::obd2::IsoTpError;
use thiserror::Error;

/// Errors raised by the PID catalog and vehicle model
#[derive(Debug, Error)]
pub enum ModelError {
    /// PID id not present in the catalog
    #[error("PID {0:04X} not in catalog")]
    UnknownPid(u16),

    /// Catalog already holds this id
    #[error("Duplicate PID {0:04X}")]
    DuplicatePid(u16),

    /// Bitmap PIDs are derived, not stored
    #[error("PID {0:04X} is not writable")]
    NotWritable(u16),

    /// Value outside the PID's declared range
    #[error("Value {value} out of range [{min}, {max}] for PID {pid:04X}")]
    OutOfRange { pid: u16, value: f64, min: f64, max: f64 },

    /// Too few data bytes for the PID's encoding
    #[error("PID {pid:04X} needs {expected} data bytes, got {actual}")]
    Decode { pid: u16, expected: usize, actual: usize },

    /// CAN frame could not be read as a single-frame response
    #[error("CAN frame error: {0}")]
    Frame(#[from] IsoTpError),
}
