//! Synchronous gateway core
//!
//! Wires the CAN bridge, vehicle model, protocol engine and client session
//! together. The async loop feeds it link events and calls [`Gateway::tick`]
//! on a fixed period; nothing in here blocks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use can_bridge::{BridgeStatistics, CanBridge, CanController, Clock};
use elm_engine::{ElmEngine, EngineStatistics};
use obd_protocol::{mode, DataSource, SharedVehicle, VehicleModel, VehicleState};
use obd_session::{Session, SessionEvent, SessionStatistics, Transport};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::poller::PidPoller;

/// Combined diagnostics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatistics {
    pub uptime_s: u64,
    pub bridge: BridgeStatistics,
    pub engine: EngineStatistics,
    pub session: SessionStatistics,
    pub vehicle: VehicleState,
}

pub struct Gateway<C: CanController, T: Transport> {
    clock: Arc<dyn Clock>,
    started_ms: u64,
    bridge: CanBridge<C>,
    vehicle: SharedVehicle,
    session: Session<T, ElmEngine>,
    poller: Option<PidPoller>,
    bus_fault_reported: bool,
}

impl<C: CanController, T: Transport> Gateway<C, T> {
    pub fn new(config: &GatewayConfig, controller: C, transport: T, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let now = clock.now_ms();

        let mut bridge = CanBridge::new(controller, config.bridge.clone(), clock.clone());
        bridge.initialize().context("CAN bridge initialization failed")?;
        bridge.start().context("CAN bridge start failed")?;

        let vehicle = SharedVehicle::new(VehicleModel::new(config.simulation.clone()));
        let poller = (config.simulation.source == DataSource::LiveCan)
            .then(|| PidPoller::new(vehicle.read().catalog(), &config.poll, now));

        let profile = config.session.initial_profile();
        let engine =
            ElmEngine::new(config.engine.clone(), profile.identity, vehicle.clone()).with_clock(clock.clone());
        let mut session = Session::new(config.session.clone(), transport, engine, clock.clone());
        session.initialize().context("Session initialization failed")?;

        info!(
            "Gateway ready: source={:?} bitrate={:?} profile='{}'",
            config.simulation.source,
            bridge.bitrate(),
            session.profile().kind
        );

        Ok(Self {
            clock,
            started_ms: now,
            bridge,
            vehicle,
            session,
            poller,
            bus_fault_reported: false,
        })
    }

    /// Forward a link event to the session
    pub fn handle_event(&mut self, event: SessionEvent) {
        if let Err(e) = self.session.handle_event(event) {
            warn!("Session event failed: {}", e);
        }
    }

    /// One scheduling step: vehicle, CAN, then session
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.vehicle.write().tick(now);
        self.service_can(now);
        if let Err(e) = self.session.poll() {
            warn!("Session poll failed: {}", e);
        }
    }

    fn service_can(&mut self, now: u64) {
        if !self.bridge.is_running() {
            return;
        }

        if self.bridge.is_bus_off() {
            if !self.bus_fault_reported {
                self.bus_fault_reported = true;
                error!("CAN bus off");
                if self.vehicle.read().source() == DataSource::LiveCan {
                    self.session.handler_mut().fault("CAN bus off");
                }
            }
            return;
        }

        if let Some(poller) = self.poller.as_mut() {
            if let Some(pid) = poller.next_due(now) {
                if let Err(e) = self.bridge.send_obd2_request(mode::CURRENT_DATA, pid) {
                    debug!("Request for PID {:02X} failed: {}", pid, e);
                }
            }
        }

        self.bridge.pump_receive();
        for _ in 0..self.bridge.available() {
            let frame = match self.bridge.receive(Duration::ZERO) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!("CAN receive failed: {}", e);
                    break;
                }
            };
            match self.vehicle.write().ingest_frame(&frame) {
                Ok(Some(id)) => debug!("Live update for PID {:04X}", id),
                Ok(None) => {}
                Err(e) => debug!("Ignoring frame {}: {}", frame, e),
            }
        }
    }

    /// Recover from bus-off and leave the engine's error state
    pub fn reset_can(&mut self) -> anyhow::Result<()> {
        self.bridge.reset().context("CAN bridge reset failed")?;
        self.bridge.start().context("CAN bridge start failed")?;
        self.bus_fault_reported = false;
        self.session.handler_mut().reset();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if let Err(e) = self.session.shutdown() {
            warn!("Session shutdown failed: {}", e);
        }
        self.bridge.stop();
        info!("Gateway stopped");
    }

    pub fn statistics(&self) -> GatewayStatistics {
        GatewayStatistics {
            uptime_s: self.clock.now_ms().saturating_sub(self.started_ms) / 1000,
            bridge: self.bridge.statistics(),
            engine: self.session.handler().statistics(),
            session: self.session.statistics(),
            vehicle: self.vehicle.snapshot(),
        }
    }

    pub fn print_diagnostics(&self) {
        self.bridge.print_diagnostics();
        self.session.handler().print_diagnostics();
        self.session.print_diagnostics();
        match serde_json::to_string(&self.statistics()) {
            Ok(json) => debug!(target: "gateway::stats", "{}", json),
            Err(e) => warn!("Statistics serialization failed: {}", e),
        }
    }

    pub fn session(&self) -> &Session<T, ElmEngine> {
        &self.session
    }

    pub fn bridge(&self) -> &CanBridge<C> {
        &self.bridge
    }

    pub fn vehicle(&self) -> &SharedVehicle {
        &self.vehicle
    }
}
