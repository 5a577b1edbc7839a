//! Passive observers: a frame recorder and a per-id traffic monitor.
//!
//! Both work purely from frame timestamps, so their output is as
//! deterministic as the frame stream itself.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use vbus_types::{ArbitrationId, Frame};

use crate::bus::{DeliveryError, Observer};

// ============================================================================
// Recorder
// ============================================================================

/// Keeps every published frame in memory.
///
/// With a capacity, frames beyond it are refused with
/// [`DeliveryError::BufferFull`] and the bus counts the failure.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    frames: Vec<Frame>,
    capacity: Option<usize>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Observer for FrameRecorder {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        if let Some(capacity) = self.capacity {
            if self.frames.len() >= capacity {
                return Err(DeliveryError::BufferFull { capacity });
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("recorder")
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Traffic statistics for one arbitration id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageStatistics {
    pub count: u64,
    pub first_seen_ns: Option<u64>,
    pub last_seen_ns: Option<u64>,
    pub min_interval_ns: Option<u64>,
    pub max_interval_ns: Option<u64>,
    pub total_bytes: u64,
}

impl MessageStatistics {
    /// Mean inter-arrival time; needs at least two frames.
    pub fn average_interval_ns(&self) -> Option<u64> {
        if self.count < 2 {
            return None;
        }
        let span = self.last_seen_ns? - self.first_seen_ns?;
        Some(span / (self.count - 1))
    }

    fn observe(&mut self, frame: &Frame) {
        let t = frame.timestamp_ns();
        if let Some(last) = self.last_seen_ns {
            let interval = t.saturating_sub(last);
            self.min_interval_ns = Some(self.min_interval_ns.map_or(interval, |m| m.min(interval)));
            self.max_interval_ns = Some(self.max_interval_ns.map_or(interval, |m| m.max(interval)));
        }
        self.count += 1;
        self.total_bytes += frame.data().len() as u64;
        self.first_seen_ns.get_or_insert(t);
        self.last_seen_ns = Some(t);
    }
}

/// Per-id traffic monitor.
#[derive(Debug, Clone, Default)]
pub struct BusMonitor {
    stats: BTreeMap<ArbitrationId, MessageStatistics>,
    frame_count: u64,
}

impl BusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn statistics(&self, id: ArbitrationId) -> Option<&MessageStatistics> {
        self.stats.get(&id)
    }

    /// Statistics for every id seen, in id order.
    pub fn all_statistics(&self) -> &BTreeMap<ArbitrationId, MessageStatistics> {
        &self.stats
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = ArbitrationId> + '_ {
        self.stats.keys().copied()
    }

    pub fn reset(&mut self) {
        self.stats.clear();
        self.frame_count = 0;
    }
}

impl Observer for BusMonitor {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        self.frame_count += 1;
        self.stats
            .entry(frame.arbitration_id())
            .or_default()
            .observe(frame);
        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("monitor")
    }
}
