//! Client session
//!
//! [`Session`] owns the link lifecycle for a single client: advertising,
//! connect/disconnect bookkeeping, inbound line assembly, delayed reply
//! delivery, handshake validation and the active device profile. Commands
//! are handed to a [`CommandHandler`], normally the [`ElmEngine`].

use std::fmt;
use std::sync::Arc;

use can_bridge::Clock;
use elm_engine::{ElmEngine, ScannerIdentity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{AuthState, ChallengeResponder, DecliningResponder};
use crate::error::SessionError;
use crate::event::{SecurityEvent, SessionEvent};
use crate::handshake::HandshakeValidator;
use crate::latency::{LatencyConfig, LatencyModel, ReplyScheduler};
use crate::link::{LineAssembler, DEFAULT_LINE_CAPACITY};
use crate::profile::{format_mac, DeviceProfile, ProfileKind};
use crate::stats::{Counters, SessionStatistics};
use crate::transport::Transport;

/// Invoked with `(connected, peer)` on every connect and disconnect
pub type ConnectionCallback = Box<dyn FnMut(bool, &str) + Send>;
/// Invoked for every security event
pub type SecurityCallback = Box<dyn FnMut(&SecurityEvent) + Send>;

/// Reply produced for one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Vec<u8>),
}

impl Reply {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Reply::Text(text) => text.into_bytes(),
            Reply::Binary(bytes) => bytes,
        }
    }
}

/// Interprets command lines on behalf of the session
pub trait CommandHandler {
    /// Answer one line; `binary` asks for a raw frame where one exists
    fn handle_line(&mut self, line: &str, binary: bool) -> Reply;

    /// Swap identity strings without touching command state
    fn set_identity(&mut self, identity: ScannerIdentity);

    /// Client went away
    fn on_disconnect(&mut self);
}

impl CommandHandler for ElmEngine {
    fn handle_line(&mut self, line: &str, binary: bool) -> Reply {
        if binary {
            if let Some(frame) = self.process_binary(line) {
                return Reply::Binary(frame);
            }
        }
        Reply::Text(self.process_command(line))
    }

    fn set_identity(&mut self, identity: ScannerIdentity) {
        ElmEngine::set_identity(self, identity);
    }

    fn on_disconnect(&mut self) {
        self.reset();
    }
}

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    #[default]
    Disabled,
    Initializing,
    Advertising,
    Connected,
    Authenticated,
    Error,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disabled => "DISABLED",
            LinkState::Initializing => "INITIALIZING",
            LinkState::Advertising => "ADVERTISING",
            LinkState::Connected => "CONNECTED",
            LinkState::Authenticated => "AUTHENTICATED",
            LinkState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Profile selected at start-up
    pub profile: ProfileKind,
    /// Advertised name override for the selected profile
    pub device_name: Option<String>,
    /// Disconnect a client silent for this long
    pub inactivity_timeout_ms: u64,
    /// Inbound line buffer size
    pub line_capacity: usize,
    /// Let profiles rewrite the hardware address
    pub allow_address_override: bool,
    /// Answer Mode 01 queries with raw frames
    pub binary_replies: bool,
    pub latency: LatencyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: ProfileKind::GenuineElm327,
            device_name: None,
            inactivity_timeout_ms: 30_000,
            line_capacity: DEFAULT_LINE_CAPACITY,
            allow_address_override: false,
            binary_replies: false,
            latency: LatencyConfig::default(),
        }
    }
}

impl SessionConfig {
    /// No emulated reply delay
    pub fn instant() -> Self {
        Self {
            latency: LatencyConfig::disabled(),
            ..Default::default()
        }
    }

    /// Binary PID frames for dashboard clients, no emulated delay
    pub fn dashboard() -> Self {
        Self {
            binary_replies: true,
            latency: LatencyConfig::disabled(),
            ..Default::default()
        }
    }

    /// Profile with any configured name override applied
    pub fn initial_profile(&self) -> DeviceProfile {
        let mut profile = DeviceProfile::for_kind(self.profile);
        if let Some(name) = &self.device_name {
            profile.name = name.clone();
        }
        profile
    }
}

/// Details of the current client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer: String,
    pub connected_at_ms: u64,
}

/// Single-client session over a [`Transport`]
pub struct Session<T: Transport, H: CommandHandler> {
    config: SessionConfig,
    transport: T,
    handler: H,
    clock: Arc<dyn Clock>,
    profile: DeviceProfile,
    state: LinkState,
    connection: Option<ConnectionInfo>,
    last_activity_ms: u64,
    link: LineAssembler,
    latency: LatencyModel,
    replies: ReplyScheduler,
    handshake: HandshakeValidator,
    responder: Box<dyn ChallengeResponder + Send>,
    auth: AuthState,
    counters: Counters,
    on_connection: Option<ConnectionCallback>,
    on_security: Option<SecurityCallback>,
}

impl<T: Transport, H: CommandHandler> Session<T, H> {
    pub fn new(config: SessionConfig, transport: T, handler: H, clock: Arc<dyn Clock>) -> Self {
        let profile = config.initial_profile();
        Self {
            link: LineAssembler::new(config.line_capacity),
            latency: LatencyModel::new(config.latency.clone()),
            config,
            transport,
            handler,
            clock,
            profile,
            state: LinkState::Disabled,
            connection: None,
            last_activity_ms: 0,
            replies: ReplyScheduler::new(),
            handshake: HandshakeValidator::new(),
            responder: Box::new(DecliningResponder),
            auth: AuthState::Unsupported,
            counters: Counters::default(),
            on_connection: None,
            on_security: None,
        }
    }

    /// Apply the profile to the transport and start advertising
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        self.state = LinkState::Initializing;
        info!(
            "Initializing session as '{}' ({}) over {:?}",
            self.profile.name,
            self.profile.kind,
            self.transport.kind()
        );

        let identity = self.profile.identity.clone();
        self.handler.set_identity(identity);

        let result = self.apply_profile_to_transport().and_then(|_| self.transport.start_advertising());
        if let Err(e) = result {
            warn!("Session initialization failed: {}", e);
            self.state = LinkState::Error;
            return Err(e);
        }

        self.state = LinkState::Advertising;
        self.report(SecurityEvent::Initialized {
            name: self.profile.name.clone(),
        });
        Ok(())
    }

    /// Drop any client and stop advertising
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.is_connected() {
            self.transport.disconnect()?;
            self.end_connection();
        }
        self.transport.stop_advertising()?;
        self.replies.clear();
        self.state = LinkState::Disabled;
        info!("Session shut down");
        Ok(())
    }

    /// Dispatch one link event
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Connected { peer } => self.on_connected(peer),
            SessionEvent::Disconnected => {
                if self.is_connected() {
                    self.end_connection();
                    self.transport.start_advertising()?;
                }
                Ok(())
            }
            SessionEvent::DataReceived(bytes) => self.on_data(&bytes),
            SessionEvent::Error(code) => {
                self.counters.link_errors += 1;
                warn!(code, "Link error reported by transport");
                Ok(())
            }
        }
    }

    /// Enforce the inactivity timeout and deliver due replies
    pub fn poll(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        if self.is_connected()
            && now.saturating_sub(self.last_activity_ms) > self.config.inactivity_timeout_ms
        {
            warn!(
                "No traffic for {} ms, disconnecting client",
                now.saturating_sub(self.last_activity_ms)
            );
            self.counters.inactivity_timeouts += 1;
            self.report(SecurityEvent::ForcedDisconnect {
                reason: "inactivity timeout".to_string(),
            });
            self.transport.disconnect()?;
            self.end_connection();
            self.transport.start_advertising()?;
            return Ok(());
        }

        self.flush_due(now)
    }

    /// Write one ASCII line terminated by CR
    pub fn send_line(&mut self, text: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\r');
        self.write(&line)
    }

    /// Write raw bytes
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.write(bytes)
    }

    /// Switch to another device fingerprint
    ///
    /// The engine keeps its command state; only identity text changes.
    pub fn set_profile(&mut self, profile: DeviceProfile) -> Result<(), SessionError> {
        info!("Switching profile: '{}' -> '{}'", self.profile.kind, profile.kind);
        self.profile = profile;
        self.handler.set_identity(self.profile.identity.clone());
        if self.state != LinkState::Disabled {
            self.apply_profile_to_transport()?;
        }
        self.report(SecurityEvent::ProfileChanged {
            profile: self.profile.kind.to_string(),
        });
        Ok(())
    }

    pub fn set_profile_kind(&mut self, kind: ProfileKind) -> Result<(), SessionError> {
        self.set_profile(DeviceProfile::for_kind(kind))
    }

    /// Rewrite the transport's hardware address
    pub fn override_address(&mut self, address: [u8; 6]) -> Result<(), SessionError> {
        if !self.config.allow_address_override {
            return Err(SessionError::AddressOverrideDisabled);
        }
        self.transport.set_address(address)?;
        warn!("Hardware address overridden to {}", format_mac(&address));
        self.report(SecurityEvent::AddressOverride {
            address: format_mac(&address),
        });
        Ok(())
    }

    /// Answer a client challenge through the installed responder
    pub fn handle_challenge(&mut self, challenge: &[u8]) -> Option<Vec<u8>> {
        self.auth = AuthState::Pending;
        let response = self.responder.respond(challenge);
        let accepted = response.is_some();
        self.auth = match (accepted, self.profile.authentication_required) {
            (true, _) => AuthState::Authenticated,
            (false, true) => AuthState::Failed,
            (false, false) => AuthState::Unsupported,
        };
        if accepted && self.state == LinkState::Connected {
            self.state = LinkState::Authenticated;
        }
        self.report(SecurityEvent::Challenge { accepted });
        response
    }

    pub fn set_responder(&mut self, responder: Box<dyn ChallengeResponder + Send>) {
        self.responder = responder;
    }

    pub fn set_connection_callback(&mut self, callback: ConnectionCallback) {
        self.on_connection = Some(callback);
    }

    pub fn set_security_callback(&mut self, callback: SecurityCallback) {
        self.on_security = Some(callback);
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected | LinkState::Authenticated)
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Earliest time a queued reply becomes due
    pub fn next_reply_due_ms(&self) -> Option<u64> {
        self.replies.next_due_ms()
    }

    pub fn statistics(&self) -> SessionStatistics {
        let now = self.clock.now_ms();
        SessionStatistics {
            state: self.state,
            profile: self.profile.kind.to_string(),
            peer: self.connection.as_ref().map(|c| c.peer.clone()),
            connected_ms: self
                .connection
                .as_ref()
                .map(|c| now.saturating_sub(c.connected_at_ms))
                .unwrap_or(0),
            connections: self.counters.connections,
            disconnections: self.counters.disconnections,
            inactivity_timeouts: self.counters.inactivity_timeouts,
            commands_received: self.counters.commands_received,
            bytes_received: self.counters.bytes_received,
            bytes_sent: self.counters.bytes_sent,
            replies_sent: self.counters.replies_sent,
            pending_replies: self.replies.len(),
            average_reply_delay_ms: self.latency.average_delay_ms(),
            latency_glitches: self.latency.glitches(),
            buffer_overflows: self.link.overflows(),
            sequence_anomalies: self.handshake.anomalies(),
            security_events: self.counters.security_events,
            link_errors: self.counters.link_errors,
            write_errors: self.counters.write_errors,
            handshake_phase: self.handshake.phase(),
            auth: self.auth,
        }
    }

    pub fn reset_statistics(&mut self) {
        self.counters = Counters::default();
    }

    pub fn print_diagnostics(&self) {
        let stats = self.statistics();
        info!(
            "Session {} | profile='{}' peer={} | commands={} rx={}B tx={}B replies={} pending={} | avg_delay={:.1}ms glitches={} | anomalies={} overflows={} timeouts={} | handshake={}",
            stats.state,
            stats.profile,
            stats.peer.as_deref().unwrap_or("-"),
            stats.commands_received,
            stats.bytes_received,
            stats.bytes_sent,
            stats.replies_sent,
            stats.pending_replies,
            stats.average_reply_delay_ms,
            stats.latency_glitches,
            stats.sequence_anomalies,
            stats.buffer_overflows,
            stats.inactivity_timeouts,
            stats.handshake_phase
        );
    }

    fn on_connected(&mut self, peer: String) -> Result<(), SessionError> {
        if self.is_connected() {
            warn!("New client '{}' replaces current connection", peer);
            self.end_connection();
        }
        let now = self.clock.now_ms();
        self.transport.stop_advertising()?;
        self.reset_link_state();
        self.connection = Some(ConnectionInfo {
            peer: peer.clone(),
            connected_at_ms: now,
        });
        self.last_activity_ms = now;
        self.state = LinkState::Connected;
        self.auth = AuthState::Unsupported;
        self.counters.connections += 1;
        info!("Client connected: {}", peer);

        if let Some(cb) = self.on_connection.as_mut() {
            cb(true, &peer);
        }
        self.report(SecurityEvent::ClientConnected { peer });
        Ok(())
    }

    fn on_data(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if !self.is_connected() {
            debug!("Dropping {} bytes received without a client", bytes.len());
            return Ok(());
        }
        let now = self.clock.now_ms();
        self.last_activity_ms = now;
        self.counters.bytes_received += bytes.len() as u64;

        for line in self.link.push(bytes) {
            self.counters.commands_received += 1;
            debug!("<< {}", line);

            if let Some(anomaly) = self.handshake.observe(&line) {
                self.report(SecurityEvent::SequenceAnomaly {
                    command: anomaly.command,
                    expected: anomaly.expected.to_string(),
                });
            }

            let reply = self.handler.handle_line(&line, self.config.binary_replies);
            let delay = self.latency.next_delay(&self.profile);
            self.replies.schedule(now, delay, reply.into_bytes());
        }

        // Zero-delay replies go out immediately
        self.flush_due(now)
    }

    /// Write due replies in order; a failed one stays queued for the next poll
    fn flush_due(&mut self, now: u64) -> Result<(), SessionError> {
        while let Some(bytes) = self.replies.pop_due(now) {
            if let Err(e) = self.write(&bytes) {
                self.replies.requeue_front(now, bytes);
                return Err(e);
            }
            self.counters.replies_sent += 1;
        }
        Ok(())
    }

    /// Connection teardown shared by every disconnect path; leaves the
    /// session advertising
    fn end_connection(&mut self) {
        let peer = self
            .connection
            .take()
            .map(|c| c.peer)
            .unwrap_or_default();
        self.handler.on_disconnect();
        self.reset_link_state();
        self.state = LinkState::Advertising;
        self.auth = AuthState::Unsupported;
        self.counters.disconnections += 1;
        info!("Client disconnected: {}", peer);

        if let Some(cb) = self.on_connection.as_mut() {
            cb(false, &peer);
        }
        self.report(SecurityEvent::ClientDisconnected { peer });
    }

    fn reset_link_state(&mut self) {
        self.link.clear();
        self.replies.clear();
        self.handshake.reset();
        self.latency.reset();
    }

    fn apply_profile_to_transport(&mut self) -> Result<(), SessionError> {
        self.transport.set_device_name(&self.profile.name)?;
        if self.config.allow_address_override {
            self.override_address(self.profile.address)?;
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if let Err(e) = self.transport.write(bytes) {
            self.counters.write_errors += 1;
            return Err(e);
        }
        self.counters.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    fn report(&mut self, event: SecurityEvent) {
        self.counters.security_events += 1;
        if event.is_destructive() {
            warn!("Security event: {}", event);
        } else {
            info!("Security event: {}", event);
        }
        if let Some(cb) = self.on_security.as_mut() {
            cb(&event);
        }
    }
}
