//! Classic CAN frame with validated construction
//!
//! Frames render in a candump-like text form: `7E8#04410C1AF8`, with
//! `#RTR` and `#EXT` suffixes for remote and 29-bit frames. Parsing treats an
//! identifier written with more than three hex digits as extended.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Maximum payload of a classic CAN frame
pub const MAX_DLC: usize = 8;
/// Largest 11-bit identifier
pub const STANDARD_ID_MAX: u32 = 0x7FF;
/// Largest 29-bit identifier
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// A single CAN 2.0 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    id: u32,
    extended: bool,
    remote: bool,
    dlc: u8,
    data: [u8; MAX_DLC],
    /// Receipt time in monotonic ms, zero until the bridge stamps it
    timestamp_ms: u64,
}

impl CanFrame {
    /// Build a data frame with an 11-bit identifier
    pub fn new(id: u32, data: &[u8]) -> Result<Self, FrameError> {
        Self::build(id, false, false, data)
    }

    /// Build a data frame with a 29-bit identifier
    pub fn new_extended(id: u32, data: &[u8]) -> Result<Self, FrameError> {
        Self::build(id, true, false, data)
    }

    /// Build a remote-request frame carrying `dlc` but no payload
    pub fn new_remote(id: u32, dlc: usize, extended: bool) -> Result<Self, FrameError> {
        if dlc > MAX_DLC {
            return Err(FrameError::InvalidLength(dlc));
        }
        let mut frame = Self::build(id, extended, true, &[])?;
        frame.dlc = dlc as u8;
        Ok(frame)
    }

    fn build(id: u32, extended: bool, remote: bool, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DLC {
            return Err(FrameError::InvalidLength(data.len()));
        }
        let limit = if extended { EXTENDED_ID_MAX } else { STANDARD_ID_MAX };
        if id > limit {
            return Err(FrameError::IdOutOfRange { id, extended });
        }

        let mut payload = [0u8; MAX_DLC];
        payload[..data.len()].copy_from_slice(data);

        Ok(Self {
            id,
            extended,
            remote,
            dlc: data.len() as u8,
            data: payload,
            timestamp_ms: 0,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Data length code (0-8)
    pub fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// Payload bytes up to the data length code
    pub fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub(crate) fn stamp(&mut self, now_ms: u64) {
        self.timestamp_ms = now_ms;
    }

    /// Copy of this frame carrying the given receipt time
    pub fn with_timestamp(mut self, now_ms: u64) -> Self {
        self.timestamp_ms = now_ms;
        self
    }

    /// Additive checksum over identifier bytes, length and payload
    pub fn checksum(&self) -> u8 {
        self.id
            .to_be_bytes()
            .iter()
            .chain(std::iter::once(&self.dlc))
            .chain(self.data().iter())
            .fold(0u8, |acc, b| acc.wrapping_add(*b))
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}#", self.id)?;
        } else {
            write!(f, "{:03X}#", self.id)?;
        }
        for byte in self.data() {
            write!(f, "{:02X}", byte)?;
        }
        if self.remote {
            write!(f, "#RTR")?;
        }
        if self.extended {
            write!(f, "#EXT")?;
        }
        Ok(())
    }
}

impl FromStr for CanFrame {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('#');
        let id_text = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FrameError::Parse(format!("missing identifier in '{}'", s)))?;
        let data_text = parts
            .next()
            .ok_or_else(|| FrameError::Parse(format!("missing '#' in '{}'", s)))?;

        let mut remote = false;
        let mut extended = id_text.len() > 3;
        for flag in parts {
            match flag {
                "RTR" => remote = true,
                "EXT" => extended = true,
                other => return Err(FrameError::Parse(format!("unknown flag '{}'", other))),
            }
        }

        let id = u32::from_str_radix(id_text, 16)
            .map_err(|e| FrameError::Parse(format!("identifier '{}': {}", id_text, e)))?;

        if data_text.len() % 2 != 0 {
            return Err(FrameError::Parse(format!("odd hex length in '{}'", data_text)));
        }
        let bytes = (0..data_text.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&data_text[i..i + 2], 16)
                    .map_err(|e| FrameError::Parse(format!("payload '{}': {}", data_text, e)))
            })
            .collect::<Result<Vec<u8>, _>>()?;

        if remote {
            Self::new_remote(id, bytes.len(), extended)
        } else {
            Self::build(id, extended, false, &bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_long_payload() {
        let err = CanFrame::new(0x7E8, &[0; 9]).unwrap_err();
        assert_eq!(err, FrameError::InvalidLength(9));
    }

    #[test]
    fn test_rejects_id_out_of_width() {
        assert!(CanFrame::new(0x800, &[]).is_err());
        assert!(CanFrame::new(0x7FF, &[]).is_ok());
        assert!(CanFrame::new_extended(0x2000_0000, &[]).is_err());
        assert!(CanFrame::new_extended(0x18DA_F110, &[1]).is_ok());
    }

    #[test]
    fn test_display_and_parse() {
        let frame = CanFrame::new(0x7E8, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]).unwrap();
        assert_eq!(frame.to_string(), "7E8#04410C1AF8");

        let parsed: CanFrame = "7E8#04410C1AF8".parse().unwrap();
        assert_eq!(parsed, frame);

        let ext: CanFrame = "18DB33F1#02010C".parse().unwrap();
        assert!(ext.is_extended());
        assert_eq!(ext.to_string(), "18DB33F1#02010C#EXT");
    }

    #[test]
    fn test_parse_errors() {
        assert!("7E8".parse::<CanFrame>().is_err());
        assert!("7E8#0".parse::<CanFrame>().is_err());
        assert!("ZZZ#00".parse::<CanFrame>().is_err());
        assert!("7E8#00#XYZ".parse::<CanFrame>().is_err());
    }

    #[test]
    fn test_remote_frame_has_no_payload() {
        let frame = CanFrame::new_remote(0x123, 4, false).unwrap();
        assert_eq!(frame.dlc(), 4);
        assert!(frame.data().is_empty());
        assert!(frame.to_string().ends_with("#RTR"));
    }

    #[test]
    fn test_checksum() {
        let frame = CanFrame::new(0x7DF, &[0x02, 0x01, 0x0C]).unwrap();
        // 0x00 + 0x00 + 0x07 + 0xDF + 3 + 0x02 + 0x01 + 0x0C
        assert_eq!(frame.checksum(), 0xF8);
    }

    proptest! {
        #[test]
        fn prop_text_form_is_stable(id in 0u32..=0x7FF, data in proptest::collection::vec(any::<u8>(), 0..=8)) {
            let frame = CanFrame::new(id, &data).unwrap();
            let parsed: CanFrame = frame.to_string().parse().unwrap();
            prop_assert_eq!(parsed, frame);
        }
    }
}
