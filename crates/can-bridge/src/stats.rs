//! Bus health counters

use serde::Serialize;

/// Average classic frame length on the wire, including stuffing
pub const AVG_FRAME_BITS: f64 = 111.0;

/// Snapshot of bridge counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStatistics {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub error_frames: u64,
    pub bus_off_events: u64,
    pub arbitration_lost: u64,
    pub receive_overflow: u64,
    pub transmit_timeouts: u64,
    pub filter_rejects: u64,
    /// Estimated bus load in percent
    pub bus_utilization: f64,
    pub last_frame_ms: u64,
    pub uptime_seconds: u64,
    pub rx_queue_depth: usize,
    pub tx_queue_depth: usize,
    pub tx_error_counter: u32,
    pub rx_error_counter: u32,
}

/// Bus load estimate from total traffic over the uptime window
pub fn estimate_utilization(messages: u64, uptime_ms: u64, bitrate_bps: u32) -> f64 {
    if uptime_ms < 1000 || bitrate_bps == 0 {
        return 0.0;
    }
    let rate = messages as f64 / (uptime_ms as f64 / 1000.0);
    let load = rate * AVG_FRAME_BITS / bitrate_bps as f64 * 100.0;
    load.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_estimate() {
        // 1000 frames/s * 111 bits at 500k = 22.2%
        let load = estimate_utilization(10_000, 10_000, 500_000);
        assert!((load - 22.2).abs() < 1e-9);
    }

    #[test]
    fn test_utilization_capped() {
        assert_eq!(estimate_utilization(1_000_000, 1_000, 125_000), 100.0);
    }

    #[test]
    fn test_utilization_needs_a_full_second() {
        assert_eq!(estimate_utilization(500, 999, 500_000), 0.0);
    }
}
