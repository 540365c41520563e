//! Session Error Types

use thiserror::Error;

/// Errors raised by the session layer and its transports
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation needs a connected client
    #[error("No client connected")]
    NotConnected,

    /// Session has not been initialized
    #[error("Session not initialized")]
    NotInitialized,

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Hardware-address override requested but not enabled in config
    #[error("Hardware address override disabled")]
    AddressOverrideDisabled,

    /// Malformed `XX:XX:XX:XX:XX:XX` address text
    #[error("Invalid hardware address: {0}")]
    InvalidAddress(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}
