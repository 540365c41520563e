//! Vehicle State and Simulation
//!
//! `VehicleModel` owns the current [`VehicleState`] and the PID catalog. Its
//! values come from one of three sources: fixed idle values, a time-driven
//! simulator, or single-frame OBD-II responses decoded off the CAN bus.

use std::f64::consts::PI;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use can_bridge::{obd2, CanFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::mode;
use crate::pid::PidCatalog;

/// Vehicle quantity reported by a PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Rpm,
    Speed,
    CoolantTemp,
    IntakeTemp,
    AmbientTemp,
    Throttle,
    EngineLoad,
    FuelLevel,
    BatteryVoltage,
    MapPressure,
    MafRate,
    FuelPressure,
    TimingAdvance,
    Runtime,
}

/// Snapshot of every vehicle signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Engine speed (rpm)
    pub rpm: f64,
    /// Vehicle speed (km/h)
    pub speed: f64,
    /// Coolant temperature (°C)
    pub coolant_temp: f64,
    /// Intake air temperature (°C)
    pub intake_temp: f64,
    /// Ambient air temperature (°C)
    pub ambient_temp: f64,
    /// Throttle position (%)
    pub throttle: f64,
    /// Calculated engine load (%)
    pub engine_load: f64,
    /// Fuel tank level (%)
    pub fuel_level: f64,
    /// Control module voltage (V)
    pub battery_voltage: f64,
    /// Intake manifold absolute pressure (kPa)
    pub map_pressure: f64,
    /// Mass air flow (g/s)
    pub maf_rate: f64,
    /// Fuel rail gauge pressure (kPa)
    pub fuel_pressure: f64,
    /// Ignition advance before TDC (°)
    pub timing_advance: f64,
    /// Seconds since engine start
    pub runtime_seconds: f64,
    pub dtc_count: u8,
    pub mil_on: bool,
    pub update_count: u64,
    pub last_update_ms: u64,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            rpm: 800.0,
            speed: 0.0,
            coolant_temp: 90.0,
            intake_temp: 25.0,
            ambient_temp: 22.0,
            throttle: 0.0,
            engine_load: 15.0,
            fuel_level: 75.0,
            battery_voltage: 12.6,
            map_pressure: 33.0,
            maf_rate: 2.5,
            fuel_pressure: 300.0,
            timing_advance: IDLE_ADVANCE,
            runtime_seconds: 0.0,
            dtc_count: 0,
            mil_on: false,
            update_count: 0,
            last_update_ms: 0,
        }
    }
}

impl VehicleState {
    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Rpm => self.rpm,
            Signal::Speed => self.speed,
            Signal::CoolantTemp => self.coolant_temp,
            Signal::IntakeTemp => self.intake_temp,
            Signal::AmbientTemp => self.ambient_temp,
            Signal::Throttle => self.throttle,
            Signal::EngineLoad => self.engine_load,
            Signal::FuelLevel => self.fuel_level,
            Signal::BatteryVoltage => self.battery_voltage,
            Signal::MapPressure => self.map_pressure,
            Signal::MafRate => self.maf_rate,
            Signal::FuelPressure => self.fuel_pressure,
            Signal::TimingAdvance => self.timing_advance,
            Signal::Runtime => self.runtime_seconds,
        }
    }

    pub fn set(&mut self, signal: Signal, value: f64) {
        let slot = match signal {
            Signal::Rpm => &mut self.rpm,
            Signal::Speed => &mut self.speed,
            Signal::CoolantTemp => &mut self.coolant_temp,
            Signal::IntakeTemp => &mut self.intake_temp,
            Signal::AmbientTemp => &mut self.ambient_temp,
            Signal::Throttle => &mut self.throttle,
            Signal::EngineLoad => &mut self.engine_load,
            Signal::FuelLevel => &mut self.fuel_level,
            Signal::BatteryVoltage => &mut self.battery_voltage,
            Signal::MapPressure => &mut self.map_pressure,
            Signal::MafRate => &mut self.maf_rate,
            Signal::FuelPressure => &mut self.fuel_pressure,
            Signal::TimingAdvance => &mut self.timing_advance,
            Signal::Runtime => &mut self.runtime_seconds,
        };
        *slot = value;
    }
}

/// Where vehicle values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fixed idle values
    Static,
    /// Time-driven idle simulation
    #[default]
    Simulated,
    /// Values decoded from OBD-II responses on the CAN bus
    LiveCan,
}

/// Simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub source: DataSource,
    /// Minimum interval between simulation steps
    pub tick_ms: u64,
    /// Peak random rpm noise added each step
    pub rpm_noise: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// DTCs reported at start-up
    pub initial_dtc_count: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Simulated,
            tick_ms: 100,
            rpm_noise: 0.0,
            seed: None,
            initial_dtc_count: 0,
        }
    }
}

impl SimulationConfig {
    /// Idle values that never change
    pub fn static_idle() -> Self {
        Self {
            source: DataSource::Static,
            ..Default::default()
        }
    }

    /// Idle simulation with sensor noise
    pub fn realistic() -> Self {
        Self {
            source: DataSource::Simulated,
            rpm_noise: 5.0,
            ..Default::default()
        }
    }

    /// Mirror a real vehicle on the CAN bus
    pub fn live_can() -> Self {
        Self {
            source: DataSource::LiveCan,
            ..Default::default()
        }
    }
}

/// Idle cycle length of the simulator
const CYCLE_MS: u64 = 10_000;
const WARMUP_STEP: f64 = 0.1;
const FUEL_BURN_STEP: f64 = 0.001;
/// Spark advance at 800 rpm, degrees before TDC
const IDLE_ADVANCE: f64 = 10.0;

/// Vehicle state plus the catalog that maps PIDs onto it
#[derive(Debug)]
pub struct VehicleModel {
    state: VehicleState,
    catalog: PidCatalog,
    config: SimulationConfig,
    rng: StdRng,
    engine_start_ms: Option<u64>,
    last_tick_ms: Option<u64>,
}

impl VehicleModel {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_catalog(config, PidCatalog::standard())
    }

    pub fn with_catalog(config: SimulationConfig, catalog: PidCatalog) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = VehicleState {
            dtc_count: config.initial_dtc_count,
            mil_on: config.initial_dtc_count > 0,
            ..Default::default()
        };
        info!(
            "Vehicle model created: source={:?}, {} PIDs",
            config.source,
            catalog.len()
        );
        Self {
            state,
            catalog,
            config,
            rng,
            engine_start_ms: None,
            last_tick_ms: None,
        }
    }

    /// Copy of the current state
    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn catalog(&self) -> &PidCatalog {
        &self.catalog
    }

    pub fn source(&self) -> DataSource {
        self.config.source
    }

    pub fn set_source(&mut self, source: DataSource) {
        if source != self.config.source {
            info!("Vehicle data source: {:?} -> {:?}", self.config.source, source);
            self.config.source = source;
        }
    }

    /// Restore idle defaults, keeping the data source
    pub fn reset(&mut self) {
        self.state = VehicleState::default();
        self.engine_start_ms = None;
        self.last_tick_ms = None;
    }

    /// Advance the model to `now_ms`
    ///
    /// Returns whether the state changed. Steps closer together than
    /// `tick_ms` are skipped.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let start = *self.engine_start_ms.get_or_insert(now_ms);
        if let Some(last) = self.last_tick_ms {
            if now_ms.saturating_sub(last) < self.config.tick_ms {
                return false;
            }
        }
        self.last_tick_ms = Some(now_ms);

        match self.config.source {
            DataSource::Static => false,
            DataSource::Simulated => {
                self.simulate(now_ms, start);
                self.touch(now_ms);
                true
            }
            DataSource::LiveCan => false,
        }
    }

    fn simulate(&mut self, now_ms: u64, start_ms: u64) {
        let t = (now_ms % CYCLE_MS) as f64 / CYCLE_MS as f64;
        let noise = if self.config.rpm_noise > 0.0 {
            self.rng.gen_range(-self.config.rpm_noise..=self.config.rpm_noise)
        } else {
            0.0
        };

        let s = &mut self.state;
        s.rpm = 800.0 + (2.0 * PI * t).sin() * 50.0 + noise;
        s.engine_load = 15.0 + (s.rpm - 800.0) / 50.0 * 5.0;
        s.timing_advance = IDLE_ADVANCE + (s.rpm - 800.0) / 50.0 * 2.0;
        s.fuel_pressure = 300.0 + (2.0 * PI * t).cos() * 6.0;
        if s.coolant_temp < 90.0 {
            s.coolant_temp = (s.coolant_temp + WARMUP_STEP).min(90.0);
        }
        s.battery_voltage = 12.6 + (4.0 * PI * t).sin() * 0.1;
        s.fuel_level = (s.fuel_level - FUEL_BURN_STEP).max(0.0);
        s.runtime_seconds = (now_ms.saturating_sub(start_ms) / 1000) as f64;
    }

    fn touch(&mut self, now_ms: u64) {
        self.state.update_count += 1;
        self.state.last_update_ms = now_ms;
    }

    /// Set a catalog PID from a physical value
    pub fn apply(&mut self, id: u16, value: f64, now_ms: u64) -> Result<(), ModelError> {
        let descriptor = self.catalog.get(id).ok_or(ModelError::UnknownPid(id))?;
        let signal = descriptor.signal.ok_or(ModelError::NotWritable(id))?;
        if !descriptor.in_range(value) {
            return Err(ModelError::OutOfRange {
                pid: id,
                value,
                min: descriptor.min,
                max: descriptor.max,
            });
        }
        self.state.set(signal, value);
        self.touch(now_ms);
        Ok(())
    }

    /// Update the state from an OBD-II response frame
    ///
    /// Only consulted in `LiveCan` mode. Returns the catalog id that changed.
    pub fn ingest_frame(&mut self, frame: &CanFrame) -> Result<Option<u16>, ModelError> {
        if self.config.source != DataSource::LiveCan || !obd2::is_obd2_response(frame) {
            return Ok(None);
        }
        let response = obd2::parse_single_frame(frame)?;
        if response.mode() != mode::CURRENT_DATA {
            return Ok(None);
        }
        let id = response.key();
        let Some(descriptor) = self.catalog.get(id) else {
            debug!("Ignoring response for uncatalogued PID {:04X}", id);
            return Ok(None);
        };
        let Some(signal) = descriptor.signal else {
            return Ok(None);
        };
        let value = descriptor.decode(&response.data)?;
        self.state.set(signal, value);
        self.touch(frame.timestamp_ms());
        Ok(Some(id))
    }

    /// Response bytes for a Mode 01 PID, `None` when not in the catalog
    pub fn encode_pid(&self, pid: u8) -> Option<Vec<u8>> {
        let descriptor = self.catalog.current_data(pid)?;
        match descriptor.signal {
            None => Some(self.catalog.supported_bitmap(pid).to_be_bytes().to_vec()),
            Some(signal) => Some(descriptor.encode(self.state.get(signal))),
        }
    }

    pub fn set_dtc_count(&mut self, count: u8) {
        self.state.dtc_count = count;
        self.state.mil_on = count > 0;
    }

    /// Mode 04 effect: clear stored codes and the MIL
    pub fn clear_dtcs(&mut self) {
        info!("Clearing {} stored DTCs", self.state.dtc_count);
        self.state.dtc_count = 0;
        self.state.mil_on = false;
    }
}

/// Cloneable handle for sharing one model between a writer and readers
#[derive(Debug, Clone)]
pub struct SharedVehicle {
    inner: Arc<RwLock<VehicleModel>>,
}

impl SharedVehicle {
    pub fn new(model: VehicleModel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VehicleModel> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, VehicleModel> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> VehicleState {
        self.read().state()
    }
}

impl From<VehicleModel> for SharedVehicle {
    fn from(model: VehicleModel) -> Self {
        Self::new(model)
    }
}
