//! Engine counters

use serde::Serialize;

use crate::engine::CommandState;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub commands_processed: u64,
    pub pid_queries: u64,
    pub errors: u64,
    pub total_response_ms: u64,
}

impl Counters {
    pub fn average_response_ms(&self) -> f64 {
        if self.commands_processed == 0 {
            return 0.0;
        }
        self.total_response_ms as f64 / self.commands_processed as f64
    }
}

/// Snapshot returned by `ElmEngine::statistics`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub commands_processed: u64,
    pub pid_queries: u64,
    pub errors: u64,
    pub average_response_ms: f64,
    pub protocol: String,
    pub state: CommandState,
    pub supported_pids: usize,
    pub vehicle_updates: u64,
}
