//! Commercial scanner fingerprints
//!
//! A [`DeviceProfile`] bundles everything a client can observe about an
//! adapter besides its data: advertised name and address, reply timing and
//! the canned identification strings.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use elm_engine::ScannerIdentity;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Serial Port Profile service UUID
pub const SPP_SERVICE_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";
/// Uncategorized major device class
pub const DEFAULT_CLASS_OF_DEVICE: u32 = 0x1F00;

/// Built-in profile selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    GenuineElm327,
    ObdLinkMxPlus,
    Bafx,
    Custom,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileKind::GenuineElm327 => "Genuine ELM327 v1.5",
            ProfileKind::ObdLinkMxPlus => "OBDLink MX+",
            ProfileKind::Bafx => "BAFX Products",
            ProfileKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

impl FromStr for ProfileKind {
    type Err = Infallible;

    /// Matches on vendor keywords; anything unrecognized is `Custom`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = if s.contains("ELM327") {
            ProfileKind::GenuineElm327
        } else if s.contains("OBDLink") {
            ProfileKind::ObdLinkMxPlus
        } else if s.contains("BAFX") {
            ProfileKind::Bafx
        } else {
            ProfileKind::Custom
        };
        Ok(kind)
    }
}

/// Observable fingerprint of one adapter model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub kind: ProfileKind,
    /// Advertised device name
    pub name: String,
    pub vendor: String,
    /// Pseudo hardware address
    pub address: [u8; 6],
    pub service_uuid: String,
    pub class_of_device: u32,
    pub authentication_required: bool,
    /// Reply delay band in ms
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    /// Chance of an extra slow reply
    pub glitch_probability: f64,
    /// Strings and formatting pushed into the protocol engine
    pub identity: ScannerIdentity,
}

impl DeviceProfile {
    /// Genuine ELM327 v1.5
    pub fn genuine_elm327() -> Self {
        Self {
            kind: ProfileKind::GenuineElm327,
            name: "OBDII".to_string(),
            vendor: "ELM Electronics".to_string(),
            address: [0x00, 0x1B, 0xDC, 0x12, 0x34, 0x56],
            service_uuid: SPP_SERVICE_UUID.to_string(),
            class_of_device: DEFAULT_CLASS_OF_DEVICE,
            authentication_required: false,
            latency_min_ms: 40,
            latency_max_ms: 80,
            glitch_probability: 0.02,
            identity: ScannerIdentity::elm327(),
        }
    }

    /// ScanTool.net OBDLink MX+
    pub fn obdlink_mx_plus() -> Self {
        Self {
            kind: ProfileKind::ObdLinkMxPlus,
            name: "OBDLink MX+".to_string(),
            vendor: "ScanTool.net".to_string(),
            address: [0x00, 0x04, 0x3E, 0xAB, 0xCD, 0xEF],
            service_uuid: SPP_SERVICE_UUID.to_string(),
            class_of_device: DEFAULT_CLASS_OF_DEVICE,
            authentication_required: false,
            latency_min_ms: 10,
            latency_max_ms: 30,
            glitch_probability: 0.005,
            identity: ScannerIdentity {
                device_info: "ELM327 v1.4b".to_string(),
                description: "OBDLink MX+".to_string(),
                identifier: "STN2255 v5.6.19".to_string(),
                voltage_precision: 2,
            },
        }
    }

    /// BAFX Products Bluetooth reader
    pub fn bafx() -> Self {
        Self {
            kind: ProfileKind::Bafx,
            name: "OBDII".to_string(),
            vendor: "BAFX Products".to_string(),
            address: [0x00, 0x0D, 0x18, 0x11, 0x22, 0x33],
            service_uuid: SPP_SERVICE_UUID.to_string(),
            class_of_device: DEFAULT_CLASS_OF_DEVICE,
            authentication_required: false,
            latency_min_ms: 50,
            latency_max_ms: 120,
            glitch_probability: 0.05,
            identity: ScannerIdentity {
                identifier: "BAFX Products 34t5".to_string(),
                ..ScannerIdentity::elm327()
            },
        }
    }

    /// ELM327 fingerprint under a custom advertised name
    pub fn custom(name: &str) -> Self {
        Self {
            kind: ProfileKind::Custom,
            name: name.to_string(),
            vendor: "Custom".to_string(),
            ..Self::genuine_elm327()
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::GenuineElm327 => Self::genuine_elm327(),
            ProfileKind::ObdLinkMxPlus => Self::obdlink_mx_plus(),
            ProfileKind::Bafx => Self::bafx(),
            ProfileKind::Custom => Self::custom("OBDII"),
        }
    }

    pub fn address_string(&self) -> String {
        format_mac(&self.address)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::genuine_elm327()
    }
}

/// `XX:XX:XX:XX:XX:XX`
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse `XX:XX:XX:XX:XX:XX` (17 characters, any case)
pub fn parse_mac(text: &str) -> Result<[u8; 6], SessionError> {
    let invalid = || SessionError::InvalidAddress(text.to_string());
    if text.len() != 17 {
        return Err(invalid());
    }
    let mut mac = [0u8; 6];
    for (i, part) in text.split(':').enumerate() {
        if i >= 6 || part.len() != 2 {
            return Err(invalid());
        }
        mac[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_round_trip_through_parser() {
        for kind in [ProfileKind::GenuineElm327, ProfileKind::ObdLinkMxPlus, ProfileKind::Bafx] {
            assert_eq!(kind.to_string().parse::<ProfileKind>(), Ok(kind));
        }
        assert_eq!("something else".parse::<ProfileKind>(), Ok(ProfileKind::Custom));
    }

    #[test]
    fn test_builtin_fingerprints() {
        let elm = DeviceProfile::genuine_elm327();
        assert_eq!(elm.address_string(), "00:1B:DC:12:34:56");
        assert_eq!(elm.service_uuid, SPP_SERVICE_UUID);
        assert_eq!(elm.identity.device_info, "ELM327 v1.5");

        let mx = DeviceProfile::obdlink_mx_plus();
        assert_eq!(mx.name, "OBDLink MX+");
        assert_eq!(mx.identity.voltage_precision, 2);
        assert!(mx.latency_max_ms < elm.latency_min_ms);

        let bafx = DeviceProfile::bafx();
        assert_eq!(bafx.address_string(), "00:0D:18:11:22:33");
        assert!(!bafx.authentication_required);
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(parse_mac("00:04:3e:AB:CD:EF").unwrap(), [0x00, 0x04, 0x3E, 0xAB, 0xCD, 0xEF]);
        assert!(parse_mac("00:04:3E:AB:CD").is_err());
        assert!(parse_mac("00-04-3E-AB-CD-EF").is_err());
        assert!(parse_mac("00:04:3E:AB:CD:GG").is_err());
    }
}
