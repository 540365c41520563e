//! CAN Bridge Error Types

use thiserror::Error;

/// Errors raised while building or parsing a CAN frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload longer than the 8 bytes a classic CAN frame can carry
    #[error("Invalid data length {0} (max 8)")]
    InvalidLength(usize),

    /// Identifier does not fit the selected bit width
    #[error("Identifier {id:#X} out of range for {} frame", if *extended { "29-bit" } else { "11-bit" })]
    IdOutOfRange { id: u32, extended: bool },

    /// Malformed textual frame representation
    #[error("Cannot parse frame: {0}")]
    Parse(String),
}

/// Errors reported by the CAN controller driver
///
/// Codes mirror the status values returned by the controller firmware so
/// they can be forwarded untouched to error callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Timeout")]
    Timeout,

    #[error("Driver not started or bus-off")]
    InvalidState,

    #[error("Operation not supported")]
    NotSupported,

    #[error("General failure: {0}")]
    Failure(String),
}

impl ControllerError {
    pub const CODE_INVALID_ARG: i32 = 0x102;
    pub const CODE_INVALID_STATE: i32 = 0x103;
    pub const CODE_NOT_SUPPORTED: i32 = 0x106;
    pub const CODE_TIMEOUT: i32 = 0x107;
    pub const CODE_FAIL: i32 = -1;

    /// Raw status code for this error
    pub fn code(&self) -> i32 {
        match self {
            ControllerError::InvalidArgument => Self::CODE_INVALID_ARG,
            ControllerError::Timeout => Self::CODE_TIMEOUT,
            ControllerError::InvalidState => Self::CODE_INVALID_STATE,
            ControllerError::NotSupported => Self::CODE_NOT_SUPPORTED,
            ControllerError::Failure(_) => Self::CODE_FAIL,
        }
    }

    /// Whether this error means the controller left the bus
    pub fn is_bus_off(&self) -> bool {
        matches!(self, ControllerError::InvalidState)
    }
}

impl From<i32> for ControllerError {
    fn from(code: i32) -> Self {
        match code {
            Self::CODE_INVALID_ARG => ControllerError::InvalidArgument,
            Self::CODE_INVALID_STATE => ControllerError::InvalidState,
            Self::CODE_NOT_SUPPORTED => ControllerError::NotSupported,
            Self::CODE_TIMEOUT => ControllerError::Timeout,
            other => ControllerError::Failure(format!("status code {:#X}", other)),
        }
    }
}

/// Errors returned by the bridge API
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Controller driver has not been installed
    #[error("CAN interface not initialized")]
    NotInitialized,

    /// Interface installed but not started
    #[error("CAN interface not running")]
    NotRunning,

    /// Speed or mode change attempted while the interface is active
    #[error("Cannot reconfigure while interface is active")]
    Busy,

    /// Bus-off is sticky until an explicit reset
    #[error("CAN bus off")]
    BusOff,

    /// Bounded transmit queue is full
    #[error("Transmit queue full ({0} frames)")]
    QueueFull(usize),

    /// Transmission did not complete within the timeout
    #[error("Transmit timeout after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ControllerError::from(0x107), ControllerError::Timeout);
        assert_eq!(ControllerError::from(0x103), ControllerError::InvalidState);
        assert!(matches!(ControllerError::from(-999), ControllerError::Failure(_)));
        assert_eq!(ControllerError::Timeout.code(), 0x107);
    }

    #[test]
    fn test_bus_off_classification() {
        assert!(ControllerError::InvalidState.is_bus_off());
        assert!(!ControllerError::Timeout.is_bus_off());
    }
}
