//! Run trace: a bounded log of scheduler and fault decisions.
//!
//! When tracing is enabled the simulation records every decision it makes in
//! an [`EventLog`]. The log is stored with postcard (a small versioned header
//! followed by the entries) and can be loaded back to compare two runs
//! decision by decision.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

const LOG_FORMAT_VERSION: u32 = 1;

/// Default in-memory bound.
pub const DEFAULT_MAX_IN_MEMORY: usize = 100_000;

// ============================================================================
// Logged Decisions
// ============================================================================

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Virtual time of the decision.
    pub time_ns: u64,
    /// Position in the log, counting evicted entries.
    pub event_id: u64,
    pub decision: Decision,
}

/// Kinds of decisions the scheduler makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// A frame reached the bus.
    Published {
        sequence: u64,
        arbitration_id: u32,
        node_id: u32,
        delivered: usize,
        failed: usize,
    },
    /// A candidate was suppressed.
    Dropped { arbitration_id: u32, node_id: u32 },
    /// A candidate was re-queued.
    Delayed {
        arbitration_id: u32,
        node_id: u32,
        until_ns: u64,
    },
    /// A candidate's payload was replaced.
    Corrupted { arbitration_id: u32, node_id: u32 },
    /// Extra copies of a candidate were queued.
    Amplified {
        arbitration_id: u32,
        node_id: u32,
        copies: usize,
    },
    /// The stop signal was seen; `discarded` entries were drained.
    Stopped { discarded: usize },
}

// ============================================================================
// Event Log
// ============================================================================

/// Bounded, optionally disabled decision log.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<LoggedEvent>,
    next_id: u64,
    max_in_memory: usize,
    enabled: bool,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_IN_MEMORY)
    }

    /// A log that keeps at most `max_in_memory` entries, evicting the oldest.
    pub fn with_capacity(max_in_memory: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            max_in_memory,
            enabled: true,
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            max_in_memory: 0,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log(&mut self, time_ns: u64, decision: Decision) {
        if !self.enabled {
            return;
        }
        self.events.push_back(LoggedEvent {
            time_ns,
            event_id: self.next_id,
            decision,
        });
        self.next_id += 1;

        if self.events.len() > self.max_in_memory {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total number of decisions logged, including evicted ones.
    pub fn total_logged(&self) -> u64 {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<LoggedEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.next_id = 0;
    }

    /// Writes the log as postcard: version, entry count, then the entries.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&postcard::to_allocvec(&LOG_FORMAT_VERSION)?)?;
        writer.write_all(&postcard::to_allocvec(&(self.events.len() as u64))?)?;
        for event in &self.events {
            writer.write_all(&postcard::to_allocvec(event)?)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Loads a log written by [`EventLog::save_to_file`].
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<LoggedEvent>, SimError> {
        let bytes = std::fs::read(path)?;
        let (version, rest): (u32, _) = postcard::take_from_bytes(&bytes)?;
        if version != LOG_FORMAT_VERSION {
            return Err(SimError::Serialization(format!(
                "unsupported event log version {version}"
            )));
        }
        let (count, mut rest): (u64, _) = postcard::take_from_bytes(rest)?;
        let mut events = Vec::new();
        for _ in 0..count {
            let (event, tail): (LoggedEvent, _) = postcard::take_from_bytes(rest)?;
            events.push(event);
            rest = tail;
        }
        Ok(events)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
