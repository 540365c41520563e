//! Handshake sequence validation
//!
//! Tracks how far a client has progressed through the usual scanner
//! start-up (reset, echo/identification, protocol selection, headers) and
//! flags commands that skip ahead. Nothing is rejected here; the protocol
//! engine decides what a command means.

use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakePhase {
    #[default]
    AwaitReset,
    AwaitEcho,
    AwaitProtocol,
    AwaitHeaders,
    Complete,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakePhase::AwaitReset => "reset",
            HandshakePhase::AwaitEcho => "echo/id",
            HandshakePhase::AwaitProtocol => "protocol-select",
            HandshakePhase::AwaitHeaders => "headers",
            HandshakePhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Command category as seen by the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Reset,
    EchoOrId,
    ProtocolSelect,
    Headers,
    Query,
    /// Valid in any phase
    Neutral,
}

impl CommandCategory {
    /// Classify a normalized (trimmed, uppercased, space-free) command
    pub fn classify(cmd: &str) -> Self {
        let Some(at) = cmd.strip_prefix("AT") else {
            return if cmd.is_empty() {
                CommandCategory::Neutral
            } else {
                CommandCategory::Query
            };
        };
        if at == "Z" || at == "WS" || at == "D" {
            CommandCategory::Reset
        } else if at.starts_with('E') || at.starts_with('I') || at.starts_with('@') || at.starts_with('L') {
            CommandCategory::EchoOrId
        } else if at.starts_with("SP") || at.starts_with("TP") {
            CommandCategory::ProtocolSelect
        } else if at.starts_with('H') {
            CommandCategory::Headers
        } else {
            CommandCategory::Neutral
        }
    }

    /// Phase reached once this command is accepted
    fn target(self) -> Option<HandshakePhase> {
        match self {
            CommandCategory::Reset => Some(HandshakePhase::AwaitEcho),
            CommandCategory::EchoOrId => Some(HandshakePhase::AwaitProtocol),
            CommandCategory::ProtocolSelect => Some(HandshakePhase::AwaitHeaders),
            CommandCategory::Headers | CommandCategory::Query => Some(HandshakePhase::Complete),
            CommandCategory::Neutral => None,
        }
    }

    /// Earliest phase in which this command is in sequence
    fn earliest(self) -> HandshakePhase {
        match self {
            CommandCategory::Reset | CommandCategory::Neutral => HandshakePhase::AwaitReset,
            CommandCategory::EchoOrId => HandshakePhase::AwaitEcho,
            CommandCategory::ProtocolSelect => HandshakePhase::AwaitProtocol,
            // Headers are optional before the first query
            CommandCategory::Headers | CommandCategory::Query => HandshakePhase::AwaitHeaders,
        }
    }
}

/// Out-of-sequence command report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceAnomaly {
    pub command: String,
    pub expected: HandshakePhase,
}

/// Handshake state machine, independent of the engine's command state
#[derive(Debug, Default)]
pub struct HandshakeValidator {
    phase: HandshakePhase,
    anomalies: u64,
}

impl HandshakeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one command and report it if it skipped a step
    pub fn observe(&mut self, line: &str) -> Option<SequenceAnomaly> {
        let cmd: String = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        let category = CommandCategory::classify(&cmd);

        let anomaly = if self.phase < category.earliest() {
            self.anomalies += 1;
            debug!(command = %cmd, phase = %self.phase, "Handshake step skipped");
            Some(SequenceAnomaly {
                command: cmd,
                expected: self.phase,
            })
        } else {
            None
        };

        match category {
            CommandCategory::Reset => self.phase = HandshakePhase::AwaitEcho,
            other => {
                if let Some(target) = other.target() {
                    self.phase = self.phase.max(target);
                }
            }
        }
        anomaly
    }

    pub fn reset(&mut self) {
        self.phase = HandshakePhase::AwaitReset;
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(CommandCategory::classify("ATZ"), CommandCategory::Reset);
        assert_eq!(CommandCategory::classify("ATE0"), CommandCategory::EchoOrId);
        assert_eq!(CommandCategory::classify("ATI"), CommandCategory::EchoOrId);
        assert_eq!(CommandCategory::classify("ATSP6"), CommandCategory::ProtocolSelect);
        assert_eq!(CommandCategory::classify("ATH1"), CommandCategory::Headers);
        assert_eq!(CommandCategory::classify("010C"), CommandCategory::Query);
        assert_eq!(CommandCategory::classify("ATRV"), CommandCategory::Neutral);
        assert_eq!(CommandCategory::classify("ATDPN"), CommandCategory::Neutral);
    }

    #[test]
    fn test_standard_sequence_has_no_anomalies() {
        let mut hs = HandshakeValidator::new();
        for cmd in ["ATZ", "ATE0", "ATL0", "ATSP0", "ATH0", "010C", "010D"] {
            assert!(hs.observe(cmd).is_none(), "{} flagged", cmd);
        }
        assert_eq!(hs.phase(), HandshakePhase::Complete);
        assert_eq!(hs.anomalies(), 0);
    }

    #[test]
    fn test_headers_optional() {
        let mut hs = HandshakeValidator::new();
        for cmd in ["atz", "ate0", "atsp0", "01 0c"] {
            assert!(hs.observe(cmd).is_none());
        }
    }

    #[test]
    fn test_query_before_reset_is_anomaly() {
        let mut hs = HandshakeValidator::new();
        let anomaly = hs.observe("010C").unwrap();
        assert_eq!(anomaly.command, "010C");
        assert_eq!(anomaly.expected, HandshakePhase::AwaitReset);
        assert_eq!(hs.anomalies(), 1);
    }

    #[test]
    fn test_protocol_before_echo_is_anomaly() {
        let mut hs = HandshakeValidator::new();
        hs.observe("ATZ");
        assert!(hs.observe("ATSP0").is_some());
        // Going back to echo config afterwards is fine
        assert!(hs.observe("ATE1").is_none());
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut hs = HandshakeValidator::new();
        for cmd in ["ATZ", "ATE0", "ATSP0", "010C"] {
            hs.observe(cmd);
        }
        hs.observe("ATZ");
        assert_eq!(hs.phase(), HandshakePhase::AwaitEcho);
        assert!(hs.observe("010C").is_some());
    }
}
