//! Link and security events

use std::fmt;

/// Link events delivered by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A client attached
    Connected { peer: String },
    /// The client went away
    Disconnected,
    /// Raw bytes from the client
    DataReceived(Vec<u8>),
    /// Transport-reported error code
    Error(i32),
}

/// Security-relevant occurrences reported to the security callback
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityEvent {
    Initialized { name: String },
    ProfileChanged { profile: String },
    /// Hardware address rewritten; destructive on real adapters
    AddressOverride { address: String },
    ClientConnected { peer: String },
    ClientDisconnected { peer: String },
    ForcedDisconnect { reason: String },
    Challenge { accepted: bool },
    SequenceAnomaly { command: String, expected: String },
}

impl SecurityEvent {
    /// Stable tag used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityEvent::Initialized { .. } => "LINK_INITIALIZED",
            SecurityEvent::ProfileChanged { .. } => "PROFILE_CHANGED",
            SecurityEvent::AddressOverride { .. } => "ADDRESS_OVERRIDE",
            SecurityEvent::ClientConnected { .. } => "CLIENT_CONNECTED",
            SecurityEvent::ClientDisconnected { .. } => "CLIENT_DISCONNECTED",
            SecurityEvent::ForcedDisconnect { .. } => "FORCED_DISCONNECT",
            SecurityEvent::Challenge { .. } => "SECURITY_CHALLENGE",
            SecurityEvent::SequenceAnomaly { .. } => "SEQUENCE_ANOMALY",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, SecurityEvent::AddressOverride { .. })
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityEvent::Initialized { name } => write!(f, "{}: {}", self.kind(), name),
            SecurityEvent::ProfileChanged { profile } => write!(f, "{}: {}", self.kind(), profile),
            SecurityEvent::AddressOverride { address } => write!(f, "{}: {}", self.kind(), address),
            SecurityEvent::ClientConnected { peer } | SecurityEvent::ClientDisconnected { peer } => {
                write!(f, "{}: {}", self.kind(), peer)
            }
            SecurityEvent::ForcedDisconnect { reason } => write!(f, "{}: {}", self.kind(), reason),
            SecurityEvent::Challenge { accepted } => {
                write!(f, "{}: {}", self.kind(), if *accepted { "accepted" } else { "declined" })
            }
            SecurityEvent::SequenceAnomaly { command, expected } => {
                write!(f, "{}: {} (expected {})", self.kind(), command, expected)
            }
        }
    }
}
