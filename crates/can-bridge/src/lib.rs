//! CAN Bus Bridge
//!
//! Connects the gateway to a vehicle CAN bus through a pluggable
//! controller driver. Provides validated frames, receive filtering,
//! bounded transmit/receive queues, OBD-II (ISO 15765-4) addressing and
//! bus-health statistics with sticky bus-off handling.

mod bridge;
mod clock;
mod controller;
mod error;
mod filter;
mod frame;
pub mod obd2;
mod stats;

pub use bridge::{BridgeConfig, CanBridge, ErrorCallback, FrameCallback, QUEUED_SEND_TIMEOUT, RECEIVE_BATCH, TRANSMIT_BATCH};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use controller::{Bitrate, BusMode, CanController, ControllerState, ControllerStatus, VirtualCan};
pub use error::{BridgeError, ControllerError, FrameError};
pub use filter::{CanFilter, FilterPolicy, FramePredicate};
pub use frame::{CanFrame, EXTENDED_ID_MAX, MAX_DLC, STANDARD_ID_MAX};
pub use stats::BridgeStatistics;
