//! CAN bridge: lifecycle, queues, filtering and error accounting
//!
//! The bridge owns a [`CanController`] and layers on top of it:
//! - a bounded transmit queue flushed in small batches
//! - a FIFO receive queue fed by [`CanBridge::pump_receive`]
//! - receive filtering and a frame callback
//! - sticky bus-off tracking until [`CanBridge::reset`]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::controller::{Bitrate, BusMode, CanController};
use crate::error::{BridgeError, ControllerError};
use crate::filter::CanFilter;
use crate::frame::CanFrame;
use crate::obd2;
use crate::stats::{estimate_utilization, BridgeStatistics};

/// Frames sent per `flush_transmit_queue` call
pub const TRANSMIT_BATCH: usize = 10;
/// Frames moved per `pump_receive` call
pub const RECEIVE_BATCH: usize = 20;
/// Per-frame timeout used when flushing the transmit queue
pub const QUEUED_SEND_TIMEOUT: Duration = Duration::from_millis(10);
/// Poll slice used while waiting for an OBD-II response
const RESPONSE_POLL_SLICE: Duration = Duration::from_millis(10);

/// Invoked for every accepted received frame
pub type FrameCallback = Box<dyn FnMut(&CanFrame) + Send>;
/// Invoked with `(code, description)` for every controller failure
pub type ErrorCallback = Box<dyn FnMut(i32, &str) + Send>;

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bitrate: Bitrate,
    pub mode: BusMode,
    /// Capacity of each of the transmit and receive queues
    pub queue_capacity: usize,
    /// Default timeout for `send_default`
    pub send_timeout_ms: u64,
    /// Install the OBD-II response whitelist on initialization
    pub obd2_filter: bool,
    /// Use 29-bit OBD-II addressing for requests
    pub extended_addressing: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bitrate: Bitrate::Kbps500,
            mode: BusMode::Normal,
            queue_capacity: 100,
            send_timeout_ms: 100,
            obd2_filter: false,
            extended_addressing: false,
        }
    }
}

impl BridgeConfig {
    /// Passive sniffing of an existing OBD-II conversation
    pub fn listen_only() -> Self {
        Self {
            mode: BusMode::ListenOnly,
            obd2_filter: true,
            ..Default::default()
        }
    }

    /// Self-test loopback, no bus attached
    pub fn loopback() -> Self {
        Self {
            mode: BusMode::SelfTest,
            ..Default::default()
        }
    }
}

/// Bridge between the CAN controller and the rest of the gateway
pub struct CanBridge<C: CanController> {
    controller: C,
    clock: Arc<dyn Clock>,
    config: BridgeConfig,
    installed: bool,
    running: bool,
    bus_off: bool,
    rx_queue: VecDeque<CanFrame>,
    tx_queue: VecDeque<CanFrame>,
    filter: CanFilter,
    stats: BridgeStatistics,
    started_at_ms: u64,
    on_frame: Option<FrameCallback>,
    on_error: Option<ErrorCallback>,
}

impl<C: CanController> CanBridge<C> {
    pub fn new(controller: C, config: BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.queue_capacity;
        Self {
            controller,
            clock,
            config,
            installed: false,
            running: false,
            bus_off: false,
            rx_queue: VecDeque::with_capacity(capacity),
            tx_queue: VecDeque::with_capacity(capacity),
            filter: CanFilter::default(),
            stats: BridgeStatistics::default(),
            started_at_ms: 0,
            on_frame: None,
            on_error: None,
        }
    }

    /// Install the controller with the configured bitrate and mode
    pub fn initialize(&mut self) -> Result<(), BridgeError> {
        self.initialize_with(self.config.bitrate, self.config.mode)
    }

    /// Install the controller with an explicit bitrate and mode
    pub fn initialize_with(&mut self, bitrate: Bitrate, mode: BusMode) -> Result<(), BridgeError> {
        if self.installed {
            return Err(BridgeError::Busy);
        }
        self.controller.install(bitrate, mode)?;
        self.config.bitrate = bitrate;
        self.config.mode = mode;
        self.installed = true;
        self.bus_off = false;
        self.rx_queue.clear();
        self.tx_queue.clear();
        self.stats = BridgeStatistics::default();
        self.started_at_ms = self.clock.now_ms();

        if self.config.obd2_filter {
            self.configure_obd2_filter();
        }

        info!(
            "CAN bridge initialized: {} bps, mode {:?}",
            bitrate.bits_per_second(),
            mode
        );
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), BridgeError> {
        if !self.installed {
            return Err(BridgeError::NotInitialized);
        }
        if self.running {
            return Ok(());
        }
        self.controller.start()?;
        self.running = true;
        info!("CAN bridge started");
        Ok(())
    }

    /// Stop the controller and uninstall the driver
    pub fn stop(&mut self) {
        if !self.installed {
            return;
        }
        if self.running {
            self.controller.stop();
            self.running = false;
        }
        self.controller.uninstall();
        self.installed = false;
        info!("CAN bridge stopped");
    }

    /// Recover from bus-off: reinstall with the last bitrate and mode
    ///
    /// Restarts the controller only if it was running before the reset.
    pub fn reset(&mut self) -> Result<(), BridgeError> {
        let was_running = self.running;
        warn!("Resetting CAN bridge (bus_off={})", self.bus_off);
        self.stop();
        self.initialize()?;
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.installed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_bus_off(&self) -> bool {
        self.bus_off
    }

    pub fn bitrate(&self) -> Bitrate {
        self.config.bitrate
    }

    pub fn mode(&self) -> BusMode {
        self.config.mode
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<(), BridgeError> {
        if self.installed {
            return Err(BridgeError::Busy);
        }
        self.config.bitrate = bitrate;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: BusMode) -> Result<(), BridgeError> {
        if self.installed {
            return Err(BridgeError::Busy);
        }
        self.config.mode = mode;
        Ok(())
    }

    /// Transmit one frame, waiting at most `timeout`
    pub fn send(&mut self, frame: &CanFrame, timeout: Duration) -> Result<(), BridgeError> {
        if !self.installed {
            return Err(BridgeError::NotInitialized);
        }
        if self.bus_off {
            return Err(BridgeError::BusOff);
        }
        if !self.running {
            return Err(BridgeError::NotRunning);
        }

        match self.controller.transmit(frame, timeout) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                debug!("TX {}", frame);
                Ok(())
            }
            Err(ControllerError::Timeout) => {
                self.stats.transmit_timeouts += 1;
                self.handle_error(&ControllerError::Timeout);
                Err(BridgeError::Timeout(timeout.as_millis() as u64))
            }
            Err(err) => {
                self.handle_error(&err);
                Err(err.into())
            }
        }
    }

    /// Transmit with the configured default timeout
    pub fn send_default(&mut self, frame: &CanFrame) -> Result<(), BridgeError> {
        let timeout = Duration::from_millis(self.config.send_timeout_ms);
        self.send(frame, timeout)
    }

    /// Append a frame to the bounded transmit queue
    pub fn enqueue(&mut self, frame: CanFrame) -> Result<(), BridgeError> {
        if self.tx_queue.len() >= self.config.queue_capacity {
            warn!("Transmit queue full, dropping {}", frame);
            return Err(BridgeError::QueueFull(self.config.queue_capacity));
        }
        self.tx_queue.push_back(frame);
        Ok(())
    }

    /// Send up to [`TRANSMIT_BATCH`] queued frames, stopping at the first failure
    ///
    /// A frame that fails to send stays at the head of the queue.
    pub fn flush_transmit_queue(&mut self) -> usize {
        let mut sent = 0;
        while sent < TRANSMIT_BATCH {
            let Some(frame) = self.tx_queue.front().copied() else {
                break;
            };
            if self.send(&frame, QUEUED_SEND_TIMEOUT).is_err() {
                break;
            }
            self.tx_queue.pop_front();
            sent += 1;
        }
        sent
    }

    /// Next received frame, draining the local queue before the controller
    ///
    /// Returns `Ok(None)` when nothing passed the filter within `timeout`.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BridgeError> {
        if let Some(frame) = self.rx_queue.pop_front() {
            return Ok(Some(frame));
        }
        self.poll_controller(timeout)
    }

    /// Run an externally delivered frame through the receive path
    ///
    /// Returns whether the frame passed the filter.
    pub fn receive_frame(&mut self, mut frame: CanFrame) -> bool {
        frame.stamp(self.clock.now_ms());
        self.admit(&frame)
    }

    /// Move up to [`RECEIVE_BATCH`] accepted frames into the local queue
    pub fn pump_receive(&mut self) -> usize {
        let mut moved = 0;
        for _ in 0..RECEIVE_BATCH {
            match self.poll_controller(Duration::ZERO) {
                Ok(Some(frame)) => {
                    if self.rx_queue.len() >= self.config.queue_capacity {
                        self.stats.receive_overflow += 1;
                        warn!("Receive queue overflow, dropping {}", frame);
                        continue;
                    }
                    self.rx_queue.push_back(frame);
                    moved += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
        moved
    }

    /// Frames waiting in the local receive queue
    pub fn available(&self) -> usize {
        self.rx_queue.len()
    }

    /// Discard everything pending in both queues
    pub fn flush_receive_queue(&mut self) {
        let dropped = self.rx_queue.len() + self.tx_queue.len();
        self.rx_queue.clear();
        self.tx_queue.clear();
        if dropped > 0 {
            debug!("Flushed {} pending frames", dropped);
        }
    }

    pub fn set_frame_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&CanFrame) + Send + 'static,
    {
        self.on_frame = Some(Box::new(callback));
    }

    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    pub fn set_filter(&mut self, filter: CanFilter) {
        debug!("CAN filter set to {:?}", filter.policy());
        self.filter = filter;
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.filter.set_enabled(enabled);
    }

    pub fn filter(&self) -> &CanFilter {
        &self.filter
    }

    /// Whitelist the functional request ids and the response banks for the
    /// configured addressing
    pub fn configure_obd2_filter(&mut self) {
        let ids = obd2::obd2_filter_ids(self.config.extended_addressing);
        self.set_filter(CanFilter::whitelist(ids));
    }

    /// Broadcast a single-frame OBD-II request
    pub fn send_obd2_request(&mut self, mode: u8, pid: u8) -> Result<(), BridgeError> {
        let frame = obd2::functional_request(mode, pid, self.config.extended_addressing)?;
        self.send_default(&frame)
    }

    /// Send a request to one ECU
    pub fn send_obd2_physical(&mut self, ecu: u8, data: &[u8]) -> Result<(), BridgeError> {
        let frame = obd2::physical_request(ecu, data, self.config.extended_addressing)?;
        self.send_default(&frame)
    }

    /// Poll in short slices until an OBD-II response arrives or `timeout` elapses
    ///
    /// Non-response frames read while waiting are dropped.
    pub fn wait_obd2_response(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BridgeError> {
        let deadline = self.clock.now_ms() + timeout.as_millis() as u64;
        let max_polls = timeout.as_millis() / RESPONSE_POLL_SLICE.as_millis() + 1;

        for _ in 0..max_polls {
            if let Some(frame) = self.receive(RESPONSE_POLL_SLICE)? {
                if obd2::is_obd2_response(&frame) {
                    return Ok(Some(frame));
                }
            }
            if self.clock.now_ms() >= deadline {
                break;
            }
        }
        Ok(None)
    }

    /// Counter snapshot with derived fields filled in
    pub fn statistics(&self) -> BridgeStatistics {
        let mut stats = self.stats.clone();
        let uptime_ms = if self.installed {
            self.clock.now_ms().saturating_sub(self.started_at_ms)
        } else {
            0
        };
        stats.uptime_seconds = uptime_ms / 1000;
        stats.bus_utilization = estimate_utilization(
            stats.frames_received + stats.frames_sent,
            uptime_ms,
            self.config.bitrate.bits_per_second(),
        );
        stats.rx_queue_depth = self.rx_queue.len();
        stats.tx_queue_depth = self.tx_queue.len();
        if let Some((tx, rx)) = self.error_counters() {
            stats.tx_error_counter = tx;
            stats.rx_error_counter = rx;
        }
        stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = BridgeStatistics::default();
        self.started_at_ms = self.clock.now_ms();
    }

    /// DISABLED, STOPPED, RUNNING or BUS_OFF
    pub fn status(&self) -> &'static str {
        if !self.installed {
            "DISABLED"
        } else if self.bus_off {
            "BUS_OFF"
        } else if self.running {
            "RUNNING"
        } else {
            "STOPPED"
        }
    }

    /// Controller TX/RX error counters, if the controller can report them
    pub fn error_counters(&self) -> Option<(u32, u32)> {
        if !self.installed {
            return None;
        }
        self.controller
            .status()
            .ok()
            .map(|s| (s.tx_error_counter, s.rx_error_counter))
    }

    pub fn print_diagnostics(&self) {
        let stats = self.statistics();
        info!(
            "CAN {} | {} bps | rx={} tx={} errors={} bus_off={} timeouts={} rejects={} overflow={} util={:.1}% uptime={}s",
            self.status(),
            self.config.bitrate.bits_per_second(),
            stats.frames_received,
            stats.frames_sent,
            stats.error_frames,
            stats.bus_off_events,
            stats.transmit_timeouts,
            stats.filter_rejects,
            stats.receive_overflow,
            stats.bus_utilization,
            stats.uptime_seconds
        );
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    fn poll_controller(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BridgeError> {
        if !self.installed {
            return Err(BridgeError::NotInitialized);
        }
        if !self.running {
            return Err(BridgeError::NotRunning);
        }
        match self.controller.receive(timeout) {
            Ok(Some(mut frame)) => {
                frame.stamp(self.clock.now_ms());
                Ok(self.admit(&frame).then_some(frame))
            }
            Ok(None) | Err(ControllerError::Timeout) => Ok(None),
            Err(err) => {
                self.handle_error(&err);
                Err(err.into())
            }
        }
    }

    fn admit(&mut self, frame: &CanFrame) -> bool {
        if !self.filter.accepts(frame) {
            self.stats.filter_rejects += 1;
            return false;
        }
        self.stats.frames_received += 1;
        self.stats.last_frame_ms = frame.timestamp_ms();
        if let Some(callback) = self.on_frame.as_mut() {
            callback(frame);
        }
        true
    }

    fn handle_error(&mut self, err: &ControllerError) {
        self.stats.error_frames += 1;
        if err.is_bus_off() && !self.bus_off {
            self.bus_off = true;
            self.stats.bus_off_events += 1;
            error!("CAN bus-off detected");
        }
        warn!("CAN error {:#X}: {}", err.code(), err);
        if let Some(callback) = self.on_error.as_mut() {
            callback(err.code(), &err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::controller::VirtualCan;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn running_bridge(config: BridgeConfig) -> (CanBridge<VirtualCan>, VirtualCan, ManualClock) {
        let can = VirtualCan::new();
        let clock = ManualClock::new(0);
        let mut bridge = CanBridge::new(can.clone(), config, Arc::new(clock.clone()));
        bridge.initialize().unwrap();
        bridge.start().unwrap();
        (bridge, can, clock)
    }

    fn frame(id: u32) -> CanFrame {
        CanFrame::new(id, &[0x02, 0x01, 0x0C]).unwrap()
    }

    #[test]
    fn test_reconfigure_requires_stop() {
        let (mut bridge, _, _) = running_bridge(BridgeConfig::default());
        assert!(matches!(bridge.set_bitrate(Bitrate::Kbps250), Err(BridgeError::Busy)));
        assert!(matches!(bridge.set_mode(BusMode::NoAck), Err(BridgeError::Busy)));

        bridge.stop();
        assert_eq!(bridge.status(), "DISABLED");
        bridge.set_bitrate(Bitrate::Kbps250).unwrap();
        bridge.initialize().unwrap();
        assert_eq!(bridge.bitrate(), Bitrate::Kbps250);
        assert_eq!(bridge.status(), "STOPPED");
    }

    #[test]
    fn test_send_counts_and_refuses_when_stopped() {
        let can = VirtualCan::new();
        let mut bridge = CanBridge::new(can.clone(), BridgeConfig::default(), Arc::new(ManualClock::new(0)));
        assert!(matches!(
            bridge.send(&frame(0x7DF), Duration::from_millis(10)),
            Err(BridgeError::NotInitialized)
        ));

        bridge.initialize().unwrap();
        assert!(matches!(
            bridge.send(&frame(0x7DF), Duration::from_millis(10)),
            Err(BridgeError::NotRunning)
        ));

        bridge.start().unwrap();
        bridge.send(&frame(0x7DF), Duration::from_millis(10)).unwrap();
        assert_eq!(bridge.statistics().frames_sent, 1);
        assert_eq!(can.transmitted().len(), 1);
    }

    #[test]
    fn test_transmit_timeout_counted_and_reported() {
        let (mut bridge, can, _) = running_bridge(BridgeConfig::default());
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        bridge.set_error_callback(move |code, desc| sink.lock().unwrap().push((code, desc.to_string())));

        can.fail_next_transmit(ControllerError::Timeout);
        let result = bridge.send(&frame(0x7DF), Duration::from_millis(25));
        assert!(matches!(result, Err(BridgeError::Timeout(25))));

        let stats = bridge.statistics();
        assert_eq!(stats.transmit_timeouts, 1);
        assert_eq!(stats.error_frames, 1);
        assert_eq!(codes.lock().unwrap()[0], (0x107, "Timeout".to_string()));
        assert!(!bridge.is_bus_off());
    }

    #[test]
    fn test_bus_off_is_sticky_until_reset() {
        let (mut bridge, can, _) = running_bridge(BridgeConfig::default());
        can.fail_next_transmit(ControllerError::InvalidState);
        assert!(bridge.send(&frame(0x7DF), Duration::ZERO).is_err());
        assert!(bridge.is_bus_off());
        assert_eq!(bridge.status(), "BUS_OFF");
        assert_eq!(bridge.statistics().bus_off_events, 1);

        assert!(matches!(bridge.send(&frame(0x7DF), Duration::ZERO), Err(BridgeError::BusOff)));

        bridge.reset().unwrap();
        assert!(!bridge.is_bus_off());
        assert!(bridge.is_running());
        bridge.send(&frame(0x7DF), Duration::ZERO).unwrap();
    }

    #[test]
    fn test_reset_keeps_stopped_bridge_stopped() {
        let can = VirtualCan::new();
        let mut bridge = CanBridge::new(can, BridgeConfig::default(), Arc::new(ManualClock::new(0)));
        bridge.initialize_with(Bitrate::Mbps1, BusMode::NoAck).unwrap();
        bridge.reset().unwrap();
        assert!(!bridge.is_running());
        assert_eq!(bridge.bitrate(), Bitrate::Mbps1);
        assert_eq!(bridge.mode(), BusMode::NoAck);
    }

    #[test]
    fn test_enqueue_rejects_beyond_capacity() {
        let (mut bridge, _, _) = running_bridge(BridgeConfig::default());
        for i in 0..100 {
            bridge.enqueue(frame(0x100 + i)).unwrap();
        }
        assert!(matches!(bridge.enqueue(frame(0x7DF)), Err(BridgeError::QueueFull(100))));
        assert_eq!(bridge.statistics().tx_queue_depth, 100);
    }

    #[test]
    fn test_flush_transmit_queue_batches_and_stops_on_failure() {
        let (mut bridge, can, _) = running_bridge(BridgeConfig::default());
        for i in 0..15 {
            bridge.enqueue(frame(0x100 + i)).unwrap();
        }
        assert_eq!(bridge.flush_transmit_queue(), TRANSMIT_BATCH);
        assert_eq!(bridge.statistics().tx_queue_depth, 5);

        can.fail_next_transmit(ControllerError::Timeout);
        assert_eq!(bridge.flush_transmit_queue(), 0);
        assert_eq!(bridge.statistics().tx_queue_depth, 5);

        assert_eq!(bridge.flush_transmit_queue(), 5);
        assert_eq!(can.transmitted().len(), 15);
    }

    #[test]
    fn test_whitelist_blocks_callback_and_counts_rejects() {
        let (mut bridge, can, clock) = running_bridge(BridgeConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bridge.set_frame_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bridge.configure_obd2_filter();

        clock.set(42);
        can.inject(frame(0x123));
        can.inject(frame(0x7E8));

        assert_eq!(bridge.receive(Duration::ZERO).unwrap(), None);
        let got = bridge.receive(Duration::ZERO).unwrap().unwrap();
        assert_eq!(got.id(), 0x7E8);
        assert_eq!(got.timestamp_ms(), 42);

        let stats = bridge.statistics();
        assert_eq!(stats.filter_rejects, 1);
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.last_frame_ms, 42);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_obd2_filter_admits_extended_responses() {
        let config = BridgeConfig {
            obd2_filter: true,
            extended_addressing: true,
            ..Default::default()
        };
        let (mut bridge, _, _) = running_bridge(config);
        let reply = CanFrame::new_extended(0x18DA_F110, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]).unwrap();
        assert!(bridge.receive_frame(reply));
        assert!(bridge.receive_frame(frame(0x7E8)));
        assert!(!bridge.receive_frame(CanFrame::new_extended(0x18DA_F210, &[0x00]).unwrap()));
        assert_eq!(bridge.statistics().filter_rejects, 1);

        let (mut standard, _, _) = running_bridge(BridgeConfig {
            obd2_filter: true,
            ..Default::default()
        });
        assert!(!standard.receive_frame(CanFrame::new_extended(0x18DA_F110, &[0x00]).unwrap()));
    }

    #[test]
    fn test_receive_frame_external_path() {
        let (mut bridge, _, _) = running_bridge(BridgeConfig::listen_only());
        assert!(!bridge.receive_frame(frame(0x123)));
        assert!(bridge.receive_frame(frame(0x7E9)));
        assert_eq!(bridge.statistics().filter_rejects, 1);
    }

    #[test]
    fn test_pump_receive_fifo_and_overflow() {
        let config = BridgeConfig {
            queue_capacity: 5,
            ..Default::default()
        };
        let (mut bridge, can, _) = running_bridge(config);
        for i in 0..8 {
            can.inject(frame(0x200 + i));
        }
        assert_eq!(bridge.pump_receive(), 5);
        assert_eq!(bridge.available(), 5);
        assert_eq!(bridge.statistics().receive_overflow, 3);

        let first = bridge.receive(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.id(), 0x200);

        bridge.flush_receive_queue();
        assert_eq!(bridge.available(), 0);
    }

    #[test]
    fn test_obd2_round_trip_in_loopback() {
        let (mut bridge, can, _) = running_bridge(BridgeConfig::loopback());
        bridge.send_obd2_request(0x01, 0x0C).unwrap();
        assert_eq!(can.transmitted()[0].id(), obd2::FUNCTIONAL_REQUEST_ID);

        // loopback request is not a response, so the wait drops it
        can.inject(obd2::single_frame_response(0, 0x01, 0x0C, &[0x1A, 0xF8]).unwrap());
        let resp = bridge.wait_obd2_response(Duration::from_millis(50)).unwrap().unwrap();
        let parsed = obd2::parse_single_frame(&resp).unwrap();
        assert_eq!(parsed.data, vec![0x1A, 0xF8]);
    }

    #[test]
    fn test_wait_obd2_response_times_out() {
        let (mut bridge, _, _) = running_bridge(BridgeConfig::default());
        assert_eq!(bridge.wait_obd2_response(Duration::from_millis(30)).unwrap(), None);
    }

    #[test]
    fn test_utilization_uses_uptime() {
        let (mut bridge, _, clock) = running_bridge(BridgeConfig::default());
        for _ in 0..10 {
            bridge.send(&frame(0x7DF), Duration::ZERO).unwrap();
        }
        clock.advance(2_000);
        let stats = bridge.statistics();
        assert_eq!(stats.uptime_seconds, 2);
        assert!(stats.bus_utilization > 0.0);
        assert!(stats.bus_utilization < 1.0);
    }
}
