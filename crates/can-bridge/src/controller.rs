//! CAN controller driver seam
//!
//! `CanController` abstracts the on-chip controller driver. The bridge only
//! talks to the bus through this trait. `VirtualCan` is an in-memory
//! implementation used by tests and by the gateway's simulated mode.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ControllerError;
use crate::frame::CanFrame;

/// Supported bus bitrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bitrate {
    #[serde(rename = "125k")]
    Kbps125,
    #[serde(rename = "250k")]
    Kbps250,
    #[serde(rename = "500k")]
    Kbps500,
    #[serde(rename = "1M")]
    Mbps1,
}

impl Bitrate {
    pub fn bits_per_second(&self) -> u32 {
        match self {
            Bitrate::Kbps125 => 125_000,
            Bitrate::Kbps250 => 250_000,
            Bitrate::Kbps500 => 500_000,
            Bitrate::Mbps1 => 1_000_000,
        }
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Kbps500
    }
}

/// Controller operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusMode {
    #[default]
    Normal,
    /// Receive only, never acknowledges or transmits
    ListenOnly,
    /// Transmitted frames loop back to the receiver
    SelfTest,
    /// Transmit without requiring acknowledgement
    NoAck,
}

/// Controller-level state reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ControllerState {
    #[default]
    Stopped,
    Running,
    BusOff,
    Recovering,
}

/// Error counters and state read back from the controller
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub tx_error_counter: u32,
    pub rx_error_counter: u32,
    pub tx_failed_count: u32,
    pub rx_missed_count: u32,
    pub arbitration_lost_count: u32,
    pub bus_error_count: u32,
}

/// Low-level CAN controller driver
pub trait CanController {
    /// Install the driver with the given timing and mode
    fn install(&mut self, bitrate: Bitrate, mode: BusMode) -> Result<(), ControllerError>;

    fn uninstall(&mut self);

    fn start(&mut self) -> Result<(), ControllerError>;

    fn stop(&mut self);

    /// Queue a frame for transmission, waiting at most `timeout`
    fn transmit(&mut self, frame: &CanFrame, timeout: Duration) -> Result<(), ControllerError>;

    /// Read one frame, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, ControllerError>;

    fn status(&self) -> Result<ControllerStatus, ControllerError>;
}

#[derive(Debug, Default)]
struct VirtualBus {
    installed: bool,
    running: bool,
    bitrate: Bitrate,
    mode: BusMode,
    rx: VecDeque<CanFrame>,
    transmitted: Vec<CanFrame>,
    tx_faults: VecDeque<ControllerError>,
    rx_faults: VecDeque<ControllerError>,
    status: ControllerStatus,
}

/// In-memory controller
///
/// Clones share one bus, so a test can keep a handle for injecting frames and
/// faults after moving the controller into a bridge.
#[derive(Debug, Clone, Default)]
pub struct VirtualCan {
    bus: Arc<Mutex<VirtualBus>>,
}

impl VirtualCan {
    pub fn new() -> Self {
        Self::default()
    }

    fn bus(&self) -> MutexGuard<'_, VirtualBus> {
        self.bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver a frame as if it arrived from the wire
    pub fn inject(&self, frame: CanFrame) {
        self.bus().rx.push_back(frame);
    }

    /// Frames accepted for transmission so far
    pub fn transmitted(&self) -> Vec<CanFrame> {
        self.bus().transmitted.clone()
    }

    pub fn pending_rx(&self) -> usize {
        self.bus().rx.len()
    }

    /// Make the next transmit fail with `err`
    pub fn fail_next_transmit(&self, err: ControllerError) {
        self.bus().tx_faults.push_back(err);
    }

    /// Make the next receive fail with `err`
    pub fn fail_next_receive(&self, err: ControllerError) {
        self.bus().rx_faults.push_back(err);
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bus().bitrate
    }

    pub fn mode(&self) -> BusMode {
        self.bus().mode
    }
}

impl CanController for VirtualCan {
    fn install(&mut self, bitrate: Bitrate, mode: BusMode) -> Result<(), ControllerError> {
        let mut bus = self.bus();
        if bus.installed {
            return Err(ControllerError::InvalidState);
        }
        bus.installed = true;
        bus.bitrate = bitrate;
        bus.mode = mode;
        bus.status = ControllerStatus::default();
        debug!("Virtual CAN installed at {} bps, mode {:?}", bitrate.bits_per_second(), mode);
        Ok(())
    }

    fn uninstall(&mut self) {
        let mut bus = self.bus();
        bus.installed = false;
        bus.running = false;
    }

    fn start(&mut self) -> Result<(), ControllerError> {
        let mut bus = self.bus();
        if !bus.installed {
            return Err(ControllerError::InvalidState);
        }
        bus.running = true;
        bus.status.state = ControllerState::Running;
        Ok(())
    }

    fn stop(&mut self) {
        let mut bus = self.bus();
        bus.running = false;
        bus.status.state = ControllerState::Stopped;
    }

    fn transmit(&mut self, frame: &CanFrame, _timeout: Duration) -> Result<(), ControllerError> {
        let mut bus = self.bus();
        if !bus.running {
            return Err(ControllerError::InvalidState);
        }
        if let Some(err) = bus.tx_faults.pop_front() {
            bus.status.tx_failed_count += 1;
            bus.status.tx_error_counter += 8;
            if err.is_bus_off() {
                bus.status.state = ControllerState::BusOff;
            }
            return Err(err);
        }
        if bus.mode == BusMode::ListenOnly {
            return Err(ControllerError::NotSupported);
        }
        bus.transmitted.push(*frame);
        if bus.mode == BusMode::SelfTest {
            bus.rx.push_back(*frame);
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, ControllerError> {
        let mut bus = self.bus();
        if !bus.running {
            return Err(ControllerError::InvalidState);
        }
        if let Some(err) = bus.rx_faults.pop_front() {
            bus.status.rx_error_counter += 1;
            return Err(err);
        }
        Ok(bus.rx.pop_front())
    }

    fn status(&self) -> Result<ControllerStatus, ControllerError> {
        let bus = self.bus();
        if !bus.installed {
            return Err(ControllerError::InvalidState);
        }
        Ok(bus.status)
    }
}
