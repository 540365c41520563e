//! OBD-II Vehicle Model
//!
//! PID catalog with exact encode/decode rules and the vehicle state it
//! reports on. Values are simulated, held static, or mirrored from OBD-II
//! responses seen on the CAN bus.

mod error;
mod pid;
mod vehicle;

pub use error::ModelError;
pub use pid::{Encoding, PidCatalog, PidDescriptor};
pub use vehicle::{DataSource, SharedVehicle, Signal, SimulationConfig, VehicleModel, VehicleState};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}
