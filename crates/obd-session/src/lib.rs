//! Client Session & Device Identity
//!
//! Everything between a scanner app and the ELM327 engine:
//! - link lifecycle over a pluggable [`Transport`]
//! - device fingerprints ([`DeviceProfile`]) with opt-in address override
//! - reply timing emulation
//! - handshake sequence validation and a challenge/response hook

mod auth;
mod error;
mod event;
mod handshake;
mod latency;
mod link;
mod profile;
mod session;
mod stats;
mod transport;

pub use auth::{AuthState, ChallengeResponder, DecliningResponder};
pub use error::SessionError;
pub use event::{SecurityEvent, SessionEvent};
pub use handshake::{CommandCategory, HandshakePhase, HandshakeValidator, SequenceAnomaly};
pub use latency::{LatencyConfig, LatencyModel, ReplyScheduler};
pub use link::{LineAssembler, DEFAULT_LINE_CAPACITY};
pub use profile::{
    format_mac, parse_mac, DeviceProfile, ProfileKind, DEFAULT_CLASS_OF_DEVICE, SPP_SERVICE_UUID,
};
pub use session::{
    CommandHandler, ConnectionCallback, ConnectionInfo, LinkState, Reply, SecurityCallback, Session,
    SessionConfig,
};
pub use stats::SessionStatistics;
pub use transport::{MemoryTransport, Transport, TransportKind};
