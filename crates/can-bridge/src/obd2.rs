//! OBD-II addressing over ISO 15765-4
//!
//! Only single-frame ISO-TP messages are handled. First, consecutive and
//! flow-control frames are reported as [`IsoTpError::MultiFrameUnsupported`].

use thiserror::Error;

use crate::error::FrameError;
use crate::frame::CanFrame;

/// 11-bit functional (broadcast) request identifier
pub const FUNCTIONAL_REQUEST_ID: u32 = 0x7DF;
/// 11-bit physical request base, ECU 0..=7 added
pub const PHYSICAL_REQUEST_BASE: u32 = 0x7E0;
/// 11-bit response base, ECU 0..=7 added
pub const RESPONSE_ID_BASE: u32 = 0x7E8;
/// Number of ECUs addressable with 11-bit identifiers
pub const ECU_COUNT: u8 = 8;

/// 29-bit functional request identifier
pub const EXT_FUNCTIONAL_REQUEST_ID: u32 = 0x18DB_33F1;
/// 29-bit physical request base, target ECU in bits 8..16
pub const EXT_PHYSICAL_REQUEST_BASE: u32 = 0x18DA_00F1;
/// 29-bit response base, source ECU in the low byte
pub const EXT_RESPONSE_BASE: u32 = 0x18DA_F100;

/// Filler for unused request bytes
pub const PADDING: u8 = 0x55;

/// ISO-TP protocol control information, high nibble of byte 0
pub mod frame_type {
    pub const SINGLE: u8 = 0x00;
    pub const FIRST: u8 = 0x10;
    pub const CONSECUTIVE: u8 = 0x20;
    pub const FLOW_CONTROL: u8 = 0x30;
}

/// Positive responses echo the service with this bit set
pub const RESPONSE_SERVICE_OFFSET: u8 = 0x40;

/// Failure to interpret a frame as an OBD-II single-frame response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsoTpError {
    #[error("Frame {0:#X} is not an OBD-II response")]
    NotAResponse(u32),

    #[error("Frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("Invalid single-frame length {0}")]
    InvalidLength(u8),

    #[error("Multi-frame ISO-TP not supported (PCI {0:#04X})")]
    MultiFrameUnsupported(u8),
}

/// Decoded single-frame OBD-II response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObdResponse {
    /// Responding ECU index (0..=7 for 11-bit, low byte for 29-bit)
    pub ecu: u8,
    /// Response service byte, e.g. 0x41
    pub service: u8,
    pub pid: u8,
    pub data: Vec<u8>,
}

impl ObdResponse {
    /// Request mode this response answers
    pub fn mode(&self) -> u8 {
        self.service.wrapping_sub(RESPONSE_SERVICE_OFFSET)
    }

    /// Catalog key `(mode << 8) | pid`
    pub fn key(&self) -> u16 {
        ((self.mode() as u16) << 8) | self.pid as u16
    }
}

pub fn physical_request_id(ecu: u8) -> u32 {
    PHYSICAL_REQUEST_BASE + (ecu & 0x07) as u32
}

pub fn response_id(ecu: u8) -> u32 {
    RESPONSE_ID_BASE + (ecu & 0x07) as u32
}

pub fn ext_physical_request_id(ecu: u8) -> u32 {
    EXT_PHYSICAL_REQUEST_BASE | ((ecu as u32) << 8)
}

pub fn ext_response_id(ecu: u8) -> u32 {
    EXT_RESPONSE_BASE | ecu as u32
}

/// Identifiers the OBD-II receive whitelist admits
///
/// With `extended` the 29-bit functional id and the whole `0x18DAF1xx`
/// response bank are added to the 11-bit set.
pub fn obd2_filter_ids(extended: bool) -> Vec<u32> {
    let mut ids: Vec<u32> = std::iter::once(FUNCTIONAL_REQUEST_ID)
        .chain((0..ECU_COUNT).map(response_id))
        .collect();
    if extended {
        ids.push(EXT_FUNCTIONAL_REQUEST_ID);
        ids.extend((0..=u8::MAX).map(ext_response_id));
    }
    ids
}

/// Whether the frame's identifier is in a response bank
pub fn is_obd2_response(frame: &CanFrame) -> bool {
    response_ecu(frame).is_some()
}

/// ECU index encoded in a response identifier
pub fn response_ecu(frame: &CanFrame) -> Option<u8> {
    let id = frame.id();
    if frame.is_extended() {
        (id & 0xFFFF_FF00 == EXT_RESPONSE_BASE).then(|| (id & 0xFF) as u8)
    } else {
        (RESPONSE_ID_BASE..RESPONSE_ID_BASE + ECU_COUNT as u32)
            .contains(&id)
            .then(|| (id - RESPONSE_ID_BASE) as u8)
    }
}

/// Parse a single-frame response
pub fn parse_single_frame(frame: &CanFrame) -> Result<ObdResponse, IsoTpError> {
    let ecu = response_ecu(frame).ok_or(IsoTpError::NotAResponse(frame.id()))?;
    let data = frame.data();
    if data.len() < 3 {
        return Err(IsoTpError::TooShort(data.len()));
    }

    let pci = data[0];
    if pci & 0xF0 != frame_type::SINGLE {
        return Err(IsoTpError::MultiFrameUnsupported(pci));
    }
    let len = pci & 0x0F;
    if !(2..=7).contains(&len) || len as usize + 1 > data.len() {
        return Err(IsoTpError::InvalidLength(len));
    }

    Ok(ObdResponse {
        ecu,
        service: data[1],
        pid: data[2],
        data: data[3..1 + len as usize].to_vec(),
    })
}

/// Request payload `[0x02, mode, pid, 0x55 x 5]`
pub fn request_payload(mode: u8, pid: u8) -> [u8; 8] {
    let mut payload = [PADDING; 8];
    payload[0] = 0x02;
    payload[1] = mode;
    payload[2] = pid;
    payload
}

/// Broadcast request to all ECUs
pub fn functional_request(mode: u8, pid: u8, extended: bool) -> Result<CanFrame, FrameError> {
    let payload = request_payload(mode, pid);
    if extended {
        CanFrame::new_extended(EXT_FUNCTIONAL_REQUEST_ID, &payload)
    } else {
        CanFrame::new(FUNCTIONAL_REQUEST_ID, &payload)
    }
}

/// Request addressed to a single ECU with caller-supplied payload
pub fn physical_request(ecu: u8, data: &[u8], extended: bool) -> Result<CanFrame, FrameError> {
    if extended {
        CanFrame::new_extended(ext_physical_request_id(ecu), data)
    } else {
        CanFrame::new(physical_request_id(ecu), data)
    }
}

/// Single-frame positive response as an ECU would send it
pub fn single_frame_response(ecu: u8, mode: u8, pid: u8, data: &[u8]) -> Result<CanFrame, FrameError> {
    if data.len() > 5 {
        return Err(FrameError::InvalidLength(data.len() + 3));
    }
    let mut payload = Vec::with_capacity(8);
    payload.push((data.len() + 2) as u8);
    payload.push(mode | RESPONSE_SERVICE_OFFSET);
    payload.push(pid);
    payload.extend_from_slice(data);
    CanFrame::new(response_id(ecu), &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_helpers() {
        assert_eq!(physical_request_id(0), 0x7E0);
        assert_eq!(physical_request_id(9), 0x7E1);
        assert_eq!(response_id(7), 0x7EF);
        assert_eq!(ext_physical_request_id(0x10), 0x18DA_10F1);
        assert_eq!(ext_response_id(0x10), 0x18DA_F110);
    }

    #[test]
    fn test_filter_ids_by_addressing() {
        let standard = obd2_filter_ids(false);
        assert_eq!(standard.len(), 9);
        assert!(standard.contains(&0x7DF));
        assert!(standard.contains(&0x7EF));
        assert!(!standard.contains(&0x18DA_F110));

        let extended = obd2_filter_ids(true);
        assert_eq!(extended.len(), 9 + 1 + 256);
        assert!(extended.contains(&0x7E8));
        assert!(extended.contains(&EXT_FUNCTIONAL_REQUEST_ID));
        assert!(extended.contains(&0x18DA_F100));
        assert!(extended.contains(&0x18DA_F1FF));
        assert!(!extended.contains(&0x18DA_F200));
    }

    #[test]
    fn test_is_obd2_response() {
        assert!(is_obd2_response(&CanFrame::new(0x7E8, &[]).unwrap()));
        assert!(is_obd2_response(&CanFrame::new(0x7EF, &[]).unwrap()));
        assert!(!is_obd2_response(&CanFrame::new(0x7F0, &[]).unwrap()));
        assert!(!is_obd2_response(&CanFrame::new(0x7DF, &[]).unwrap()));
        assert!(is_obd2_response(&CanFrame::new_extended(0x18DA_F110, &[]).unwrap()));
    }

    #[test]
    fn test_request_payload_padding() {
        let frame = functional_request(0x01, 0x0C, false).unwrap();
        assert_eq!(frame.id(), 0x7DF);
        assert_eq!(frame.data(), &[0x02, 0x01, 0x0C, 0x55, 0x55, 0x55, 0x55, 0x55]);
    }

    #[test]
    fn test_parse_rpm_response() {
        let frame = CanFrame::new(0x7E8, &[0x04, 0x41, 0x0C, 0x1A, 0xF8, 0, 0, 0]).unwrap();
        let resp = parse_single_frame(&frame).unwrap();
        assert_eq!(resp.ecu, 0);
        assert_eq!(resp.mode(), 0x01);
        assert_eq!(resp.key(), 0x010C);
        assert_eq!(resp.data, vec![0x1A, 0xF8]);
    }

    #[test]
    fn test_parse_rejects_multi_frame() {
        let frame = CanFrame::new(0x7E8, &[0x10, 0x14, 0x49, 0x02, 0x01, 0x31, 0x44, 0x34]).unwrap();
        assert_eq!(parse_single_frame(&frame), Err(IsoTpError::MultiFrameUnsupported(0x10)));
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        let short = CanFrame::new(0x7E8, &[0x02, 0x41]).unwrap();
        assert_eq!(parse_single_frame(&short), Err(IsoTpError::TooShort(2)));

        let zero = CanFrame::new(0x7E8, &[0x01, 0x41, 0x0C]).unwrap();
        assert_eq!(parse_single_frame(&zero), Err(IsoTpError::InvalidLength(1)));

        let overrun = CanFrame::new(0x7E8, &[0x06, 0x41, 0x0C, 0x00]).unwrap();
        assert_eq!(parse_single_frame(&overrun), Err(IsoTpError::InvalidLength(6)));
    }

    #[test]
    fn test_single_frame_response_builder() {
        let frame = single_frame_response(1, 0x01, 0x0D, &[0x3C]).unwrap();
        assert_eq!(frame.id(), 0x7E9);
        assert_eq!(frame.data(), &[0x03, 0x41, 0x0D, 0x3C]);
        assert!(single_frame_response(0, 0x01, 0x0C, &[0; 6]).is_err());
    }
}
