//! Protocol Engine Error Types

use thiserror::Error;

/// Reasons a command line cannot be served
///
/// These never escape `process_command`; each maps onto a canned reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Unknown or malformed command, answered with `?`
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// `ATSPn` with an unsupported protocol number
    #[error("Unsupported protocol number: {0}")]
    UnsupportedProtocol(String),

    /// OBD query before the handshake reached Ready
    #[error("Bus not initialized")]
    NotReady,

    /// Query the emulated vehicle cannot answer, answered with `NO DATA`
    #[error("No data for {0}")]
    NoData(String),
}

impl EngineError {
    /// Reply text sent to the client
    pub fn reply(&self) -> &'static str {
        match self {
            EngineError::UnknownCommand(_) | EngineError::UnsupportedProtocol(_) => "?",
            EngineError::NotReady => "BUS INIT: ...ERROR",
            EngineError::NoData(_) => "NO DATA",
        }
    }

    /// Whether this failure counts against the error statistic
    pub fn is_counted(&self) -> bool {
        matches!(self, EngineError::UnknownCommand(_))
    }
}
