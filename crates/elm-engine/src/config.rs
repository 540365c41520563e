//! Protocol engine configuration

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vehicle identification number reported by Mode 09 PID 02
    pub vin: String,
    /// ECU name reported by Mode 09 PID 0A
    pub ecu_name: String,
    /// Responding ECU id shown when headers are on (11-bit protocols)
    pub header_id: u32,
    /// Append an XOR checksum byte to binary replies
    pub binary_checksum: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vin: "1D4GP00B55B123456".to_string(),
            ecu_name: "OBDGW-ECU".to_string(),
            header_id: 0x7E8,
            binary_checksum: false,
        }
    }
}

impl EngineConfig {
    /// Checksummed binary replies for low-latency dashboard clients
    pub fn binary() -> Self {
        Self {
            binary_checksum: true,
            ..Default::default()
        }
    }
}
