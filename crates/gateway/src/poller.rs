//! Live-vehicle PID polling
//!
//! In live CAN mode the gateway asks the real ECUs for each catalog PID on
//! a schedule; responses flow back through the bridge into the vehicle
//! model.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use obd_protocol::{mode, PidCatalog};
use tracing::info;

use crate::config::PollConfig;

/// PIDs polled at the fast rate
const FAST_PIDS: [u8; 4] = [0x0C, 0x0D, 0x04, 0x11];

#[derive(Debug, Clone, PartialEq, Eq)]
struct PollEntry {
    pid: u8,
    interval_ms: u64,
    next_due_ms: u64,
    priority: u8,
}

impl Ord for PollEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due first, then higher priority
        other
            .next_due_ms
            .cmp(&self.next_due_ms)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for PollEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of PIDs by next due time
#[derive(Debug)]
pub struct PidPoller {
    queue: BinaryHeap<PollEntry>,
}

fn interval_ms(rate_hz: f64) -> u64 {
    if rate_hz <= 0.0 {
        return u64::MAX / 2;
    }
    (1000.0 / rate_hz).round().max(1.0) as u64
}

impl PidPoller {
    /// Schedule every Mode 01 signal PID in `catalog`
    pub fn new(catalog: &PidCatalog, config: &PollConfig, now_ms: u64) -> Self {
        let mut queue = BinaryHeap::new();
        for descriptor in catalog.iter() {
            if descriptor.signal.is_none() || descriptor.id >> 8 != mode::CURRENT_DATA as u16 {
                continue;
            }
            let pid = (descriptor.id & 0xFF) as u8;
            let fast = FAST_PIDS.contains(&pid);
            queue.push(PollEntry {
                pid,
                interval_ms: interval_ms(if fast { config.fast_rate_hz } else { config.slow_rate_hz }),
                next_due_ms: now_ms,
                priority: if fast { 2 } else { 1 },
            });
        }
        info!("PID poller scheduling {} PIDs", queue.len());
        Self { queue }
    }

    /// Next PID due at `now_ms`, rescheduled on return
    pub fn next_due(&mut self, now_ms: u64) -> Option<u8> {
        if self.queue.peek()?.next_due_ms > now_ms {
            return None;
        }
        let mut entry = self.queue.pop()?;
        let pid = entry.pid;
        entry.next_due_ms = now_ms + entry.interval_ms;
        self.queue.push(entry);
        Some(pid)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
