//! Canned identification strings reported by AT commands

use serde::{Deserialize, Serialize};

/// Text and formatting the engine uses to identify itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerIdentity {
    /// `ATZ`, `ATI` and `ATWS` reply
    pub device_info: String,
    /// `AT@1` reply
    pub description: String,
    /// `AT@2` reply
    pub identifier: String,
    /// Decimal places printed by `ATRV`
    pub voltage_precision: usize,
}

impl Default for ScannerIdentity {
    fn default() -> Self {
        Self::elm327()
    }
}

impl ScannerIdentity {
    /// Genuine ELM327 v1.5
    pub fn elm327() -> Self {
        Self {
            device_info: "ELM327 v1.5".to_string(),
            description: "OBDII to RS232 Interpreter".to_string(),
            identifier: concat!("OBD Gateway v", env!("CARGO_PKG_VERSION")).to_string(),
            voltage_precision: 1,
        }
    }

    /// `ATRV` text for a voltage
    pub fn format_voltage(&self, volts: f64) -> String {
        format!("{:.*}V", self.voltage_precision, volts)
    }
}
