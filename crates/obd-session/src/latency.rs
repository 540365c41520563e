//! Reply timing emulation
//!
//! Real adapters answer after a model-specific delay. [`LatencyModel`] draws
//! a delay per reply from the active profile's band and [`ReplyScheduler`]
//! releases replies in request order once they are due.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::profile::DeviceProfile;

/// Latency emulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub enabled: bool,
    /// Commands answered before jitter starts
    pub jitter_after_commands: u64,
    /// Upper bound of the extra jitter in ms
    pub jitter_ms: u64,
    /// Extra delay applied on a glitch
    pub glitch_delay_ms: u64,
    /// Fixed seed for reproducible timing
    pub seed: Option<u64>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_after_commands: 100,
            jitter_ms: 20,
            glitch_delay_ms: 250,
            seed: None,
        }
    }
}

impl LatencyConfig {
    /// Replies go out on the next poll
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Per-reply delay generator
#[derive(Debug)]
pub struct LatencyModel {
    config: LatencyConfig,
    rng: StdRng,
    commands: u64,
    glitches: u64,
    total_delay_ms: u64,
}

impl LatencyModel {
    pub fn new(config: LatencyConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            commands: 0,
            glitches: 0,
            total_delay_ms: 0,
        }
    }

    /// Delay for the next reply under `profile`
    pub fn next_delay(&mut self, profile: &DeviceProfile) -> u64 {
        self.commands += 1;
        if !self.config.enabled {
            return 0;
        }

        let (min, max) = if profile.latency_min_ms <= profile.latency_max_ms {
            (profile.latency_min_ms, profile.latency_max_ms)
        } else {
            (profile.latency_max_ms, profile.latency_min_ms)
        };
        let mut delay = self.rng.gen_range(min..=max);

        if self.commands > self.config.jitter_after_commands && self.config.jitter_ms > 0 {
            delay += self.rng.gen_range(0..=self.config.jitter_ms);
        }

        let p = profile.glitch_probability.clamp(0.0, 1.0);
        if p > 0.0 && self.rng.gen_bool(p) {
            delay += self.config.glitch_delay_ms;
            self.glitches += 1;
        }

        self.total_delay_ms += delay;
        delay
    }

    /// Restart the command count used for jitter
    pub fn reset(&mut self) {
        self.commands = 0;
    }

    pub fn glitches(&self) -> u64 {
        self.glitches
    }

    pub fn average_delay_ms(&self) -> f64 {
        if self.commands == 0 {
            return 0.0;
        }
        self.total_delay_ms as f64 / self.commands as f64
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }
}

#[derive(Debug)]
struct PendingReply {
    due_ms: u64,
    bytes: Vec<u8>,
}

/// Ordered queue of delayed replies
///
/// A reply is never due before the one queued ahead of it.
#[derive(Debug, Default)]
pub struct ReplyScheduler {
    pending: VecDeque<PendingReply>,
    last_due_ms: u64,
}

impl ReplyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `bytes` for release at `now_ms + delay_ms` or later
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, bytes: Vec<u8>) -> u64 {
        let due_ms = (now_ms + delay_ms).max(self.last_due_ms);
        self.last_due_ms = due_ms;
        self.pending.push_back(PendingReply { due_ms, bytes });
        due_ms
    }

    /// Remove the oldest reply if it is due at `now_ms`
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Vec<u8>> {
        if self.pending.front()?.due_ms > now_ms {
            return None;
        }
        self.pending.pop_front().map(|r| r.bytes)
    }

    /// Put back a reply taken with `pop_due` that could not be delivered
    ///
    /// It goes ahead of everything still queued and is due at `now_ms`.
    pub fn requeue_front(&mut self, now_ms: u64, bytes: Vec<u8>) {
        self.pending.push_front(PendingReply { due_ms: now_ms, bytes });
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.front().map(|r| r.due_ms)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_due_ms = 0;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(scheduler: &mut ReplyScheduler, now_ms: u64) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| scheduler.pop_due(now_ms)).collect()
    }

    fn seeded(jitter_after: u64) -> LatencyModel {
        LatencyModel::new(LatencyConfig {
            jitter_after_commands: jitter_after,
            seed: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn test_delay_within_profile_band() {
        let mut profile = DeviceProfile::genuine_elm327();
        profile.glitch_probability = 0.0;
        let mut model = seeded(u64::MAX);
        for _ in 0..200 {
            let d = model.next_delay(&profile);
            assert!((40..=80).contains(&d), "delay {} outside band", d);
        }
    }

    #[test]
    fn test_jitter_after_threshold() {
        let mut profile = DeviceProfile::obdlink_mx_plus();
        profile.glitch_probability = 0.0;
        let mut model = seeded(10);
        for _ in 0..10 {
            assert!(model.next_delay(&profile) <= 30);
        }
        for _ in 0..100 {
            assert!(model.next_delay(&profile) <= 30 + 20);
        }
    }

    #[test]
    fn test_certain_glitch_adds_delay() {
        let mut profile = DeviceProfile::bafx();
        profile.glitch_probability = 1.0;
        let mut model = seeded(u64::MAX);
        let d = model.next_delay(&profile);
        assert!(d >= 50 + 250);
        assert_eq!(model.glitches(), 1);
    }

    #[test]
    fn test_disabled_model_is_instant() {
        let mut model = LatencyModel::new(LatencyConfig::disabled());
        assert_eq!(model.next_delay(&DeviceProfile::bafx()), 0);
    }

    #[test]
    fn test_scheduler_releases_in_order() {
        let mut scheduler = ReplyScheduler::new();
        scheduler.schedule(0, 80, b"first".to_vec());
        // Shorter delay still waits for the earlier reply
        assert_eq!(scheduler.schedule(10, 5, b"second".to_vec()), 80);

        assert!(drain(&mut scheduler, 79).is_empty());
        assert_eq!(drain(&mut scheduler, 80), vec![b"first".to_vec(), b"second".to_vec()]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_requeued_reply_goes_first() {
        let mut scheduler = ReplyScheduler::new();
        scheduler.schedule(0, 0, b"first".to_vec());
        scheduler.schedule(0, 0, b"second".to_vec());

        let first = scheduler.pop_due(0).unwrap();
        scheduler.requeue_front(0, first);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(drain(&mut scheduler, 0), vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(scheduler.pop_due(0), None);
    }

    proptest! {
        #[test]
        fn prop_replies_never_overtake(delays in proptest::collection::vec(0u64..200, 1..50)) {
            let mut scheduler = ReplyScheduler::new();
            for (i, d) in delays.iter().enumerate() {
                scheduler.schedule(i as u64 * 3, *d, vec![i as u8]);
            }
            let released = drain(&mut scheduler, u64::MAX);
            let order: Vec<u8> = released.into_iter().map(|b| b[0]).collect();
            let expected: Vec<u8> = (0..delays.len() as u8).collect();
            prop_assert_eq!(order, expected);
        }
    }
}
