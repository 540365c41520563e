//! OBD-II Protocol Definitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocols selectable with `ATSPn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
}

impl ObdProtocol {
    /// Protocol for an `ATSP` digit, `None` for unsupported numbers
    pub fn from_number(n: char) -> Option<Self> {
        match n {
            '0' => Some(ObdProtocol::Auto),
            '1' => Some(ObdProtocol::J1850Pwm),
            '2' => Some(ObdProtocol::J1850Vpw),
            '3' => Some(ObdProtocol::Iso9141_2),
            '4' => Some(ObdProtocol::Iso14230_4Kwp),
            '6' => Some(ObdProtocol::Iso15765_4Can11bit500),
            '7' => Some(ObdProtocol::Iso15765_4Can29bit500),
            _ => None,
        }
    }

    /// Digit reported by `ATDPN`
    pub fn number(&self) -> char {
        match self {
            ObdProtocol::Auto => '0',
            ObdProtocol::J1850Pwm => '1',
            ObdProtocol::J1850Vpw => '2',
            ObdProtocol::Iso9141_2 => '3',
            ObdProtocol::Iso14230_4Kwp => '4',
            ObdProtocol::Iso15765_4Can11bit500 => '6',
            ObdProtocol::Iso15765_4Can29bit500 => '7',
        }
    }

    /// Text reported by `ATDP`
    pub fn description(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "AUTO",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 KWP2000",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 CAN (11-bit, 500kbps)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 CAN (29-bit, 500kbps)",
        }
    }

    /// Protocol auto-detection settles on; modern vehicles answer on CAN
    pub fn detect() -> Self {
        ObdProtocol::Iso15765_4Can11bit500
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500 | ObdProtocol::Iso15765_4Can29bit500
        )
    }

    /// CAN protocol with 29-bit identifiers
    pub fn is_extended(&self) -> bool {
        matches!(self, ObdProtocol::Iso15765_4Can29bit500)
    }
}

impl fmt::Display for ObdProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
