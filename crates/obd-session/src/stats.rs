//! Session counters

use serde::Serialize;

use crate::auth::AuthState;
use crate::handshake::HandshakePhase;
use crate::session::LinkState;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub connections: u64,
    pub disconnections: u64,
    pub inactivity_timeouts: u64,
    pub commands_received: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub replies_sent: u64,
    pub security_events: u64,
    pub link_errors: u64,
    pub write_errors: u64,
}

/// Snapshot returned by `Session::statistics`
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatistics {
    pub state: LinkState,
    pub profile: String,
    pub peer: Option<String>,
    pub connected_ms: u64,
    pub connections: u64,
    pub disconnections: u64,
    pub inactivity_timeouts: u64,
    pub commands_received: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub replies_sent: u64,
    pub pending_replies: usize,
    pub average_reply_delay_ms: f64,
    pub latency_glitches: u64,
    pub buffer_overflows: u64,
    pub sequence_anomalies: u64,
    pub security_events: u64,
    pub link_errors: u64,
    pub write_errors: u64,
    pub handshake_phase: HandshakePhase,
    pub auth: AuthState,
}
