//! Client link abstraction
//!
//! The session never touches sockets or radios directly. A [`Transport`]
//! accepts outbound bytes and discoverability commands; inbound traffic
//! arrives as [`SessionEvent`](crate::SessionEvent)s.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Physical link family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Bluetooth,
    Wifi,
    Usb,
    Tcp,
    Memory,
}

/// Outbound side of a client link
pub trait Transport {
    /// Queue bytes for the connected client
    fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError>;

    /// Drop the current client, if any
    fn disconnect(&mut self) -> Result<(), SessionError>;

    fn start_advertising(&mut self) -> Result<(), SessionError>;

    fn stop_advertising(&mut self) -> Result<(), SessionError>;

    /// Advertised device name
    fn set_device_name(&mut self, name: &str) -> Result<(), SessionError>;

    /// Rewrite the hardware address
    fn set_address(&mut self, address: [u8; 6]) -> Result<(), SessionError>;

    fn kind(&self) -> TransportKind;
}

#[derive(Debug, Default)]
struct MemoryState {
    written: Vec<u8>,
    advertising: bool,
    advertise_starts: u32,
    disconnects: u32,
    device_name: String,
    address: Option<[u8; 6]>,
    fail_writes: bool,
}

/// In-process transport recording everything the session does
///
/// Clones share state, so a test keeps one handle while the session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    /// Drain everything written so far
    pub fn take_written(&self) -> Vec<u8> {
        self.with(|s| std::mem::take(&mut s.written))
    }

    /// Drain written bytes as text
    pub fn take_text(&self) -> String {
        String::from_utf8_lossy(&self.take_written()).into_owned()
    }

    pub fn is_advertising(&self) -> bool {
        self.with(|s| s.advertising)
    }

    pub fn advertise_starts(&self) -> u32 {
        self.with(|s| s.advertise_starts)
    }

    pub fn disconnects(&self) -> u32 {
        self.with(|s| s.disconnects)
    }

    pub fn device_name(&self) -> String {
        self.with(|s| s.device_name.clone())
    }

    pub fn address(&self) -> Option<[u8; 6]> {
        self.with(|s| s.address)
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.with(|s| s.fail_writes = fail);
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.with(|s| {
            if s.fail_writes {
                return Err(SessionError::Transport("write refused".to_string()));
            }
            s.written.extend_from_slice(bytes);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.with(|s| s.disconnects += 1);
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), SessionError> {
        self.with(|s| {
            s.advertising = true;
            s.advertise_starts += 1;
        });
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), SessionError> {
        self.with(|s| s.advertising = false);
        Ok(())
    }

    fn set_device_name(&mut self, name: &str) -> Result<(), SessionError> {
        self.with(|s| s.device_name = name.to_string());
        Ok(())
    }

    fn set_address(&mut self, address: [u8; 6]) -> Result<(), SessionError> {
        self.with(|s| s.address = Some(address));
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}
