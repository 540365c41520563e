//! ELM327 Protocol Engine
//!
//! Emulates the command interpreter of an ELM327 OBD-II adapter: the AT
//! command handshake, reply formatting flags and Mode 01/03/04/09 queries
//! answered from the shared vehicle model.

mod config;
mod engine;
mod error;
pub mod format;
mod identity;
mod protocol;
mod stats;

pub use config::EngineConfig;
pub use engine::{CommandState, ElmEngine, Formatting};
pub use error::EngineError;
pub use identity::ScannerIdentity;
pub use protocol::ObdProtocol;
pub use stats::EngineStatistics;
