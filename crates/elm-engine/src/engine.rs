//! ELM327 command interpreter
//!
//! Turns one command line into one reply. AT commands drive the handshake
//! state machine and formatting flags; OBD-II queries are answered from the
//! shared vehicle model once the handshake reaches [`CommandState::Ready`].

use std::fmt;
use std::sync::Arc;

use can_bridge::{Clock, MonotonicClock};
use obd_protocol::{mode, SharedVehicle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::format::{hex_byte_at, hex_bytes, prompt, xor_checksum};
use crate::identity::ScannerIdentity;
use crate::protocol::ObdProtocol;
use crate::stats::{Counters, EngineStatistics};

/// Stored codes reported by Mode 03: P0300, P0171
const STORED_DTCS: [u8; 4] = [0x03, 0x00, 0x01, 0x71];
/// Length of Mode 09 VIN and ECU name payloads
const INFO_FIELD_LEN: usize = 20;

/// Handshake phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    WaitingReset,
    EchoConfig,
    ProtocolSelect,
    HeadersConfig,
    Ready,
    /// Unrecoverable fault; only a reset leaves this state
    Error,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandState::WaitingReset => "WAITING_RESET",
            CommandState::EchoConfig => "ECHO_CONFIG",
            CommandState::ProtocolSelect => "PROTOCOL_SELECT",
            CommandState::HeadersConfig => "HEADERS_CONFIG",
            CommandState::Ready => "READY",
            CommandState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Reply formatting flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Formatting {
    pub echo: bool,
    pub linefeeds: bool,
    pub spaces: bool,
    pub headers: bool,
}

impl Default for Formatting {
    fn default() -> Self {
        Self {
            echo: true,
            linefeeds: true,
            spaces: true,
            headers: false,
        }
    }
}

/// ELM327-compatible protocol engine
pub struct ElmEngine {
    config: EngineConfig,
    identity: ScannerIdentity,
    vehicle: SharedVehicle,
    state: CommandState,
    protocol: ObdProtocol,
    formatting: Formatting,
    counters: Counters,
    clock: Arc<dyn Clock>,
}

impl ElmEngine {
    pub fn new(config: EngineConfig, identity: ScannerIdentity, vehicle: SharedVehicle) -> Self {
        info!("ELM engine created as '{}'", identity.device_info);
        Self {
            config,
            identity,
            vehicle,
            state: CommandState::WaitingReset,
            protocol: ObdProtocol::Auto,
            formatting: Formatting::default(),
            counters: Counters::default(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Time command handling against `clock` instead of a private monotonic one
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Process one command line and return the full reply including prompt
    pub fn process_command(&mut self, line: &str) -> String {
        let started = self.clock.now_ms();
        let cmd = normalize(line);
        self.counters.commands_processed += 1;

        let body = match self.dispatch(&cmd) {
            Ok(body) => body,
            Err(err) => {
                if err.is_counted() {
                    self.counters.errors += 1;
                }
                debug!("'{}': {}", cmd, err);
                err.reply().to_string()
            }
        };

        let mut reply = String::with_capacity(cmd.len() + body.len() + 3);
        if self.formatting.echo && cmd != "ATE0" {
            reply.push_str(&cmd);
            reply.push('\r');
        }
        reply.push_str(&body);
        reply.push_str(prompt(self.formatting.linefeeds));

        self.counters.total_response_ms += self.clock.now_ms().saturating_sub(started);
        reply
    }

    /// Binary reply `[0x41, pid, data..]` for a Mode 01 query
    ///
    /// Returns `None` for anything else, including queries before Ready, so
    /// the caller can fall back to `process_command`.
    pub fn process_binary(&mut self, line: &str) -> Option<Vec<u8>> {
        let started = self.clock.now_ms();
        let cmd = normalize(line);
        if self.state != CommandState::Ready || hex_byte_at(&cmd, 0) != Some(mode::CURRENT_DATA) {
            return None;
        }
        let pid = hex_byte_at(&cmd, 2)?;
        let mut frame = self.current_data(pid).ok()?;
        if self.config.binary_checksum {
            frame.push(xor_checksum(&frame));
        }

        self.counters.commands_processed += 1;
        self.counters.pid_queries += 1;
        self.counters.total_response_ms += self.clock.now_ms().saturating_sub(started);
        Some(frame)
    }

    fn dispatch(&mut self, cmd: &str) -> Result<String, EngineError> {
        if cmd.is_empty() {
            return Err(EngineError::NoData("empty line".to_string()));
        }
        if let Some(at) = cmd.strip_prefix("AT") {
            return self.handle_at(at);
        }
        if is_obd_query(cmd) {
            self.counters.pid_queries += 1;
            return self.handle_obd(cmd);
        }
        Err(EngineError::UnknownCommand(cmd.to_string()))
    }

    fn handle_at(&mut self, at: &str) -> Result<String, EngineError> {
        let ok = || Ok("OK".to_string());
        match at {
            "Z" => {
                self.reset();
                self.state = CommandState::EchoConfig;
                Ok(self.identity.device_info.clone())
            }
            "WS" => {
                self.formatting = Formatting::default();
                self.state = CommandState::EchoConfig;
                Ok(self.identity.device_info.clone())
            }
            "D" => {
                self.formatting = Formatting::default();
                ok()
            }
            "E0" | "E1" => {
                self.formatting.echo = at == "E1";
                self.advance(CommandState::ProtocolSelect);
                ok()
            }
            "L0" | "L1" => {
                self.formatting.linefeeds = at == "L1";
                ok()
            }
            "S0" | "S1" => {
                self.formatting.spaces = at == "S1";
                ok()
            }
            "H0" | "H1" => {
                self.formatting.headers = at == "H1";
                if self.state == CommandState::ProtocolSelect {
                    self.state = CommandState::HeadersConfig;
                }
                ok()
            }
            "M0" | "M1" | "PC" => ok(),
            "I" => Ok(self.identity.device_info.clone()),
            "@1" => Ok(self.identity.description.clone()),
            "@2" => Ok(self.identity.identifier.clone()),
            "RV" => {
                let volts = self.vehicle.snapshot().battery_voltage;
                Ok(self.identity.format_voltage(volts))
            }
            "DP" => {
                if self.protocol == ObdProtocol::Auto {
                    self.protocol = ObdProtocol::detect();
                    debug!("Auto-detected protocol: {}", self.protocol);
                }
                Ok(self.protocol.description().to_string())
            }
            "DPN" => Ok(self.protocol.number().to_string()),
            _ => {
                if let Some(n) = at.strip_prefix("SP") {
                    return self.select_protocol(n);
                }
                if is_timing_command(at) {
                    return ok();
                }
                Err(EngineError::UnknownCommand(format!("AT{}", at)))
            }
        }
    }

    fn select_protocol(&mut self, n: &str) -> Result<String, EngineError> {
        let mut chars = n.chars();
        let protocol = match (chars.next(), chars.next()) {
            (Some(digit), None) => ObdProtocol::from_number(digit),
            _ => None,
        }
        .ok_or_else(|| EngineError::UnsupportedProtocol(n.to_string()))?;

        self.set_protocol(protocol);
        self.advance(CommandState::Ready);
        Ok("OK".to_string())
    }

    /// Move to a handshake phase; a fault is only cleared by `ATZ`/`ATWS`
    fn advance(&mut self, next: CommandState) {
        if self.state == CommandState::Error {
            debug!("Staying in ERROR, {} needs a reset first", next);
            return;
        }
        self.state = next;
    }

    fn handle_obd(&mut self, cmd: &str) -> Result<String, EngineError> {
        if self.state != CommandState::Ready {
            return Err(EngineError::NotReady);
        }
        let spaced = self.formatting.spaces;
        let query_mode = hex_byte_at(cmd, 0).ok_or_else(|| EngineError::UnknownCommand(cmd.to_string()))?;
        let pid = hex_byte_at(cmd, 2);
        let no_data = || EngineError::NoData(cmd.to_string());

        match query_mode {
            mode::CURRENT_DATA => {
                let pid = pid.ok_or_else(no_data)?;
                let frame = self.current_data(pid)?;
                Ok(self.with_headers(&frame))
            }
            mode::READ_DTC => {
                let count = self.vehicle.snapshot().dtc_count;
                if count == 0 {
                    return Err(no_data());
                }
                let mut listing = vec![0x43, (STORED_DTCS.len() / 2) as u8];
                listing.extend_from_slice(&STORED_DTCS);
                Ok(hex_bytes(&listing, spaced))
            }
            mode::CLEAR_DTC => {
                self.vehicle.write().clear_dtcs();
                Ok("44".to_string())
            }
            mode::VEHICLE_INFO => {
                let payload = match pid.ok_or_else(no_data)? {
                    0x02 => info_field(0x02, self.config.vin.as_bytes(), true),
                    0x0A => info_field(0x0A, self.config.ecu_name.as_bytes(), false),
                    _ => return Err(no_data()),
                };
                Ok(hex_bytes(&payload, spaced))
            }
            _ => Err(no_data()),
        }
    }

    /// `[0x41, pid, data..]` for a catalog PID
    fn current_data(&self, pid: u8) -> Result<Vec<u8>, EngineError> {
        let data = self
            .vehicle
            .read()
            .encode_pid(pid)
            .ok_or_else(|| EngineError::NoData(format!("01{:02X}", pid)))?;
        let mut frame = Vec::with_capacity(data.len() + 2);
        frame.push(mode::CURRENT_DATA | 0x40);
        frame.push(pid);
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    fn with_headers(&self, frame: &[u8]) -> String {
        let spaced = self.formatting.spaces;
        if !self.formatting.headers {
            return hex_bytes(frame, spaced);
        }
        let header = if self.protocol.is_extended() {
            let ecu = (self.config.header_id & 0x07) as u8 | 0x10;
            hex_bytes(&[0x18, 0xDA, 0xF1, ecu], spaced)
        } else {
            format!("{:03X}", self.config.header_id)
        };
        let separator = if spaced { " " } else { "" };
        format!(
            "{}{}{:02X}{}{}",
            header,
            separator,
            frame.len(),
            separator,
            hex_bytes(frame, spaced)
        )
    }

    /// Restore power-on formatting and protocol; statistics restart
    pub fn reset(&mut self) {
        self.state = CommandState::WaitingReset;
        self.protocol = ObdProtocol::Auto;
        self.formatting = Formatting::default();
        self.counters = Counters::default();
        debug!("ELM engine reset");
    }

    /// Enter the terminal error state until the next reset
    pub fn fault(&mut self, reason: &str) {
        warn!("ELM engine fault: {}", reason);
        self.state = CommandState::Error;
    }

    pub fn set_protocol(&mut self, protocol: ObdProtocol) {
        if protocol != self.protocol {
            info!("Protocol set to: {}", protocol);
        }
        self.protocol = protocol;
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    pub fn formatting(&self) -> Formatting {
        self.formatting
    }

    pub fn identity(&self) -> &ScannerIdentity {
        &self.identity
    }

    /// Swap the reported identity without touching handshake state
    pub fn set_identity(&mut self, identity: ScannerIdentity) {
        info!("ELM identity: '{}' -> '{}'", self.identity.device_info, identity.device_info);
        self.identity = identity;
    }

    pub fn vehicle(&self) -> &SharedVehicle {
        &self.vehicle
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn statistics(&self) -> EngineStatistics {
        let vehicle = self.vehicle.read();
        EngineStatistics {
            commands_processed: self.counters.commands_processed,
            pid_queries: self.counters.pid_queries,
            errors: self.counters.errors,
            average_response_ms: self.counters.average_response_ms(),
            protocol: self.protocol.description().to_string(),
            state: self.state,
            supported_pids: vehicle.catalog().len(),
            vehicle_updates: vehicle.state().update_count,
        }
    }

    pub fn reset_statistics(&mut self) {
        self.counters = Counters::default();
    }

    pub fn print_diagnostics(&self) {
        let stats = self.statistics();
        info!(
            "ELM {} | protocol={} | commands={} pid_queries={} errors={} avg={:.3}ms | pids={} vehicle_updates={}",
            stats.state,
            stats.protocol,
            stats.commands_processed,
            stats.pid_queries,
            stats.errors,
            stats.average_response_ms,
            stats.supported_pids,
            stats.vehicle_updates
        );
    }
}

/// Trim, drop inner whitespace and fold to uppercase
fn normalize(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Mode prefix `01`..`09`
fn is_obd_query(cmd: &str) -> bool {
    matches!(cmd.as_bytes(), [b'0', b'1'..=b'9', ..])
}

/// `ATSTxx` and `ATATn`
fn is_timing_command(at: &str) -> bool {
    if let Some(arg) = at.strip_prefix("ST") {
        return arg.len() == 2 && arg.bytes().all(|b| b.is_ascii_hexdigit());
    }
    if let Some(arg) = at.strip_prefix("AT") {
        return matches!(arg, "0" | "1" | "2");
    }
    false
}

/// Mode 09 reply: service, PID, item count, then a fixed-width field
fn info_field(pid: u8, text: &[u8], pad_front: bool) -> Vec<u8> {
    let text = &text[..text.len().min(INFO_FIELD_LEN)];
    let padding = std::iter::repeat(0u8).take(INFO_FIELD_LEN - text.len());
    let mut out = vec![mode::VEHICLE_INFO | 0x40, pid, 0x01];
    if pad_front {
        out.extend(padding);
        out.extend_from_slice(text);
    } else {
        out.extend_from_slice(text);
        out.extend(padding);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{SimulationConfig, VehicleModel};
    use proptest::prelude::*;

    fn engine() -> ElmEngine {
        let vehicle = SharedVehicle::new(VehicleModel::new(SimulationConfig::static_idle()));
        ElmEngine::new(EngineConfig::default(), ScannerIdentity::elm327(), vehicle)
    }

    fn ready_engine() -> ElmEngine {
        let mut e = engine();
        e.process_command("ATZ");
        e.process_command("ATE0");
        e.process_command("ATSP0");
        e
    }

    #[test]
    fn test_reset_reply_echoes_and_prompts() {
        let mut e = engine();
        assert_eq!(e.process_command("atz"), "ATZ\rELM327 v1.5\r>");
        assert_eq!(e.state(), CommandState::EchoConfig);
    }

    #[test]
    fn test_echo_off_reply_not_echoed() {
        let mut e = engine();
        e.process_command("ATZ");
        assert_eq!(e.process_command("ATE0"), "OK\r>");
        assert_eq!(e.state(), CommandState::ProtocolSelect);
        assert_eq!(e.process_command("ATI"), "ELM327 v1.5\r>");
    }

    #[test]
    fn test_linefeeds_off_prompt() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("ATL0"), "OK>");
        assert_eq!(e.process_command("ATL1"), "OK\r>");
    }

    #[test]
    fn test_headers_phase_only_from_protocol_select() {
        let mut e = engine();
        e.process_command("ATZ");
        e.process_command("ATH1");
        assert_eq!(e.state(), CommandState::EchoConfig);
        e.process_command("ATE0");
        e.process_command("ATH0");
        assert_eq!(e.state(), CommandState::HeadersConfig);
        e.process_command("ATSP6");
        assert_eq!(e.state(), CommandState::Ready);
    }

    #[test]
    fn test_protocol_selection() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("ATSP7"), "OK\r>");
        assert_eq!(e.process_command("ATDPN"), "7\r>");
        assert_eq!(e.process_command("ATDP"), "ISO 15765-4 CAN (29-bit, 500kbps)\r>");
        assert_eq!(e.process_command("ATSP5"), "?\r>");
        assert_eq!(e.process_command("ATSP"), "?\r>");
        assert_eq!(e.protocol(), ObdProtocol::Iso15765_4Can29bit500);
    }

    #[test]
    fn test_auto_detect_on_describe() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("ATDPN"), "0\r>");
        assert_eq!(e.process_command("ATDP"), "ISO 15765-4 CAN (11-bit, 500kbps)\r>");
        assert_eq!(e.process_command("ATDPN"), "6\r>");
    }

    #[test]
    fn test_canned_identity_strings() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("AT@1"), "OBDII to RS232 Interpreter\r>");
        assert!(e.process_command("AT@2").starts_with("OBD Gateway v"));
        assert_eq!(e.process_command("ATRV"), "12.6V\r>");
    }

    #[test]
    fn test_accepted_no_op_commands() {
        let mut e = ready_engine();
        for cmd in ["ATST32", "ATAT1", "ATM0", "ATPC", "ATD"] {
            assert_eq!(e.process_command(cmd), "OK\r>", "{}", cmd);
        }
        assert_eq!(e.state(), CommandState::Ready);
    }

    #[test]
    fn test_unknown_commands_counted() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("ATXYZ"), "?\r>");
        assert_eq!(e.process_command("HELLO"), "?\r>");
        assert_eq!(e.process_command("ATST3"), "?\r>");
        assert_eq!(e.statistics().errors, 3);
        assert_eq!(e.state(), CommandState::Ready);
    }

    #[test]
    fn test_empty_line_no_data() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("   "), "NO DATA\r>");
        assert_eq!(e.statistics().errors, 0);
    }

    #[test]
    fn test_query_before_ready() {
        let mut e = engine();
        for cmd in ["010C", "03", "0902"] {
            assert_eq!(e.process_command(cmd), format!("{}\rBUS INIT: ...ERROR\r>", cmd));
        }
        e.process_command("ATZ");
        e.process_command("ATE0");
        assert_eq!(e.process_command("010C"), "BUS INIT: ...ERROR\r>");
    }

    #[test]
    fn test_rpm_query() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("010C"), "41 0C 0C 80\r>");
        assert_eq!(e.process_command("01 0d"), "41 0D 00\r>");
        e.process_command("ATS0");
        assert_eq!(e.process_command("010C"), "410C0C80\r>");
    }

    #[test]
    fn test_bitmap_and_unknown_pid() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("0100"), "41 00 18 7F 80 03\r>");
        assert_eq!(e.process_command("010A"), "41 0A 64\r>");
        assert_eq!(e.process_command("010E"), "41 0E 94\r>");
        assert_eq!(e.process_command("0120"), "41 20 00 02 00 01\r>");
        assert_eq!(e.process_command("0103"), "NO DATA\r>");
        assert_eq!(e.process_command("01"), "NO DATA\r>");
    }

    #[test]
    fn test_headers_prefix() {
        let mut e = ready_engine();
        e.process_command("ATH1");
        assert_eq!(e.process_command("010D"), "7E8 03 41 0D 00\r>");
        e.process_command("ATSP7");
        assert_eq!(e.process_command("010D"), "18 DA F1 10 03 41 0D 00\r>");
    }

    #[test]
    fn test_dtc_listing_and_clear() {
        let mut e = ready_engine();
        assert_eq!(e.process_command("03"), "NO DATA\r>");
        e.vehicle().write().set_dtc_count(2);
        assert_eq!(e.process_command("03"), "43 02 03 00 01 71\r>");
        assert_eq!(e.process_command("04"), "44\r>");
        assert!(!e.vehicle().snapshot().mil_on);
        assert_eq!(e.process_command("03"), "NO DATA\r>");
    }

    #[test]
    fn test_vehicle_info() {
        let mut e = ready_engine();
        assert_eq!(
            e.process_command("0902"),
            "49 02 01 00 00 00 31 44 34 47 50 30 30 42 35 35 42 31 32 33 34 35 36\r>"
        );
        let name = e.process_command("090A");
        assert!(name.starts_with("49 0A 01 4F 42 44 47 57"));
        assert_eq!(e.process_command("0904"), "NO DATA\r>");
        assert_eq!(e.process_command("0700"), "NO DATA\r>");
    }

    #[test]
    fn test_binary_reply() {
        let mut e = ready_engine();
        assert_eq!(e.process_binary("010C"), Some(vec![0x41, 0x0C, 0x0C, 0x80]));
        assert_eq!(e.process_binary("ATI"), None);
        assert_eq!(e.process_binary("0103"), None);

        let vehicle = e.vehicle().clone();
        let mut checked = ElmEngine::new(EngineConfig::binary(), ScannerIdentity::elm327(), vehicle);
        assert_eq!(checked.process_binary("010C"), None);
        checked.process_command("ATSP0");
        let frame = checked.process_binary("010C").unwrap();
        assert_eq!(frame.len(), 5);
        assert!(crate::format::verify_xor_frame(&frame));
    }

    #[test]
    fn test_fault_recovered_by_reset() {
        let mut e = ready_engine();
        e.fault("bus off");
        assert_eq!(e.state(), CommandState::Error);
        assert_eq!(e.process_command("010C"), "BUS INIT: ...ERROR\r>");
        e.process_command("ATZ");
        assert_eq!(e.state(), CommandState::EchoConfig);
    }

    #[test]
    fn test_fault_survives_handshake_commands() {
        let mut e = ready_engine();
        e.fault("bus off");
        assert_eq!(e.process_command("ATSP0"), "OK\r>");
        assert_eq!(e.state(), CommandState::Error);
        e.process_command("ATE1");
        e.process_command("ATH1");
        assert_eq!(e.state(), CommandState::Error);
        assert_eq!(e.process_command("010C"), "010C\rBUS INIT: ...ERROR\r>");
        assert_eq!(e.process_binary("010C"), None);

        e.process_command("ATWS");
        assert_eq!(e.state(), CommandState::EchoConfig);
        e.process_command("ATE0");
        e.process_command("ATSP0");
        assert_eq!(e.process_command("010C"), "41 0C 0C 80\r>");
    }

    /// Advances a fixed step on every read
    struct SteppingClock {
        now: std::sync::atomic::AtomicU64,
        step: u64,
    }

    impl Clock for SteppingClock {
        fn now_ms(&self) -> u64 {
            self.now.fetch_add(self.step, std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[test]
    fn test_response_time_uses_injected_clock() {
        let clock = Arc::new(SteppingClock {
            now: std::sync::atomic::AtomicU64::new(0),
            step: 4,
        });
        let mut e = ready_engine().with_clock(clock);
        e.reset_statistics();
        e.process_command("010C");
        e.process_binary("010D");
        let stats = e.statistics();
        assert_eq!(stats.commands_processed, 2);
        assert_eq!(stats.average_response_ms, 4.0);

        let frozen = can_bridge::ManualClock::new(1_000);
        let mut e = ready_engine().with_clock(Arc::new(frozen));
        e.reset_statistics();
        e.process_command("010C");
        assert_eq!(e.statistics().average_response_ms, 0.0);
    }

    #[test]
    fn test_identity_swap_keeps_state() {
        let mut e = ready_engine();
        e.process_command("ATS0");
        let mut identity = ScannerIdentity::elm327();
        identity.device_info = "OBDLink MX+".to_string();
        identity.voltage_precision = 2;
        e.set_identity(identity);
        assert_eq!(e.state(), CommandState::Ready);
        assert!(!e.formatting().spaces);
        assert_eq!(e.process_command("ATRV"), "12.60V\r>");
        assert_eq!(e.process_command("ATI"), "OBDLink MX+\r>");
    }

    #[test]
    fn test_statistics() {
        let mut e = ready_engine();
        e.process_command("010C");
        e.process_command("010D");
        let stats = e.statistics();
        // ATZ restarts the counters, so ATE0, ATSP0 and two queries remain
        assert_eq!(stats.commands_processed, 4);
        assert_eq!(stats.pid_queries, 2);
        assert_eq!(stats.state, CommandState::Ready);
        assert_eq!(stats.supported_pids, 17);
    }

    proptest! {
        #[test]
        fn prop_queries_before_ready_get_bus_init_error(
            setup in proptest::sample::subsequence(vec!["ATZ", "ATE0", "ATH1", "ATL0", "ATS0"], 0..=5),
            query_mode in 1u8..=9,
            pid in any::<u8>(),
        ) {
            let mut e = engine();
            for cmd in &setup {
                e.process_command(cmd);
            }
            prop_assume!(e.state() != CommandState::Ready);
            let reply = e.process_command(&format!("{:02X}{:02X}", query_mode, pid));
            prop_assert!(reply.contains("BUS INIT: ...ERROR"), "{}", reply);
        }
    }
}
