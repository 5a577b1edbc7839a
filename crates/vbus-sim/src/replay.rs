//! Replay of captured frame sequences.
//!
//! A [`Replayer`] re-publishes a capture through the same [`Bus`] and
//! [`Clock`] contract the scheduler uses. Frames go out unchanged (same
//! timestamps, same sequence numbers) and the clock is driven to each frame's
//! timestamp, so inter-frame deltas are preserved exactly. There is no fault
//! injection and no randomness.
//!
//! The whole capture is validated before the first frame is published.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use vbus_types::Frame;

use crate::bus::{Bus, BusStats};
use crate::capture::read_frames_from_path;
use crate::clock::Clock;
use crate::digest::FrameDigest;
use crate::error::SimError;
use crate::simulation::StopHandle;

/// Why a replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// Every frame was published.
    Completed,
    /// The frame limit was reached.
    LimitReached,
    /// The stop signal was seen.
    Stopped,
}

/// Summary of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub outcome: ReplayOutcome,
    pub frames_published: u64,
    pub final_time_ns: u64,
    pub bus: BusStats,
    /// Same fingerprint a simulation run computes over its frames.
    pub digest: String,
}

/// Re-publishes a validated capture.
#[derive(Debug, Clone)]
pub struct Replayer {
    frames: Vec<Frame>,
    limit: Option<usize>,
    stop: StopHandle,
}

impl Replayer {
    /// Validates `frames`.
    ///
    /// Rejects an empty capture, timestamps that go backwards and frames that
    /// are not well formed, reporting the 0-based index of the first bad
    /// frame.
    pub fn new(frames: Vec<Frame>) -> Result<Self, SimError> {
        if frames.is_empty() {
            return Err(SimError::malformed(None, "capture contains no frames"));
        }
        let mut last_ts = 0;
        for (i, frame) in frames.iter().enumerate() {
            frame
                .validate()
                .map_err(|e| SimError::malformed(Some(i), e.to_string()))?;
            if frame.timestamp_ns() < last_ts {
                return Err(SimError::malformed(
                    Some(i),
                    format!(
                        "timestamp {}ns precedes previous {}ns",
                        frame.timestamp_ns(),
                        last_ts
                    ),
                ));
            }
            last_ts = frame.timestamp_ns();
        }
        Ok(Self {
            frames,
            limit: None,
            stop: StopHandle::new(),
        })
    }

    /// Loads and validates a JSON Lines capture.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        Self::new(read_frames_from_path(path)?)
    }

    /// Publishes at most `limit` frames.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Publishes the capture through `bus`, driving `clock`.
    ///
    /// Leading idle time before the first frame is skipped without waiting.
    pub fn run<C: Clock>(&self, bus: &mut Bus, clock: &mut C) -> Result<ReplaySummary, SimError> {
        info!(
            frames = self.frames.len(),
            limit = ?self.limit,
            mode = ?clock.mode(),
            "starting replay"
        );

        let mut digest = FrameDigest::new();
        let mut outcome = ReplayOutcome::Completed;

        if let Some(first) = self.frames.first() {
            if first.timestamp_ns() > clock.now() {
                clock.advance_to(first.timestamp_ns());
            }
        }

        for (published, frame) in self.frames.iter().enumerate() {
            if self.stop.is_stopped() {
                warn!(published, "stop requested, ending replay");
                outcome = ReplayOutcome::Stopped;
                break;
            }
            if self.limit.is_some_and(|limit| published >= limit) {
                outcome = ReplayOutcome::LimitReached;
                break;
            }

            let ts = frame.timestamp_ns();
            if ts > clock.now() {
                clock.wait_until(ts);
                clock.advance_to(ts);
            }

            digest.update(frame)?;
            let delivery = bus.publish(frame);
            debug!(%frame, delivered = delivery.delivered, failed = delivery.failed, "frame replayed");
        }

        let summary = ReplaySummary {
            outcome,
            frames_published: digest.frames(),
            final_time_ns: clock.now(),
            bus: bus.stats(),
            digest: digest.hex(),
        };
        info!(
            outcome = ?summary.outcome,
            frames = summary.frames_published,
            digest = %summary.digest,
            "replay finished"
        );
        Ok(summary)
    }
}
