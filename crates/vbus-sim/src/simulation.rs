//! The discrete-event scheduler that drives a run.
//!
//! A [`Simulation`] owns everything a run mutates: the clock, the event
//! queue, the RNG, the fault injector and the bus. Each step pops the next
//! schedule entry, advances the clock to its fire time and either synthesizes
//! a periodic emission (which goes through fault injection) or publishes an
//! already-decided frame.
//!
//! Randomness is drawn in a fixed order per periodic emission: payload
//! generation, then fault rules, then the successor's jitter sample.
//!
//! ```rust
//! use vbus_sim::{MessageConfig, RunOutcome, Scenario, Simulation, VirtualNode};
//! use vbus_types::ArbitrationId;
//!
//! let scenario = Scenario::new("doc")
//!     .with_duration_ns(1_000)
//!     .with_node(
//!         VirtualNode::new(1, "ecu")
//!             .with_message(MessageConfig::new(ArbitrationId::standard(0x100), 100)),
//!     );
//! let mut sim = Simulation::new(scenario)?;
//! let summary = sim.run()?;
//! assert_eq!(summary.outcome, RunOutcome::DurationReached);
//! assert_eq!(summary.frames_published, 11);
//! # Ok::<(), vbus_sim::SimError>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vbus_types::Frame;

use crate::bus::{Bus, BusStats};
use crate::clock::{Clock, SimClock};
use crate::digest::FrameDigest;
use crate::error::SimError;
use crate::event::{EntryKind, EventQueue};
use crate::event_log::{Decision, EventLog};
use crate::fault::{FaultCounts, FaultDecision, FaultInjector};
use crate::node::PayloadState;
use crate::rng::SimRng;
use crate::scenario::Scenario;

// ============================================================================
// Stop Signal
// ============================================================================

/// Cooperative cancellation flag, checked between schedule entries.
///
/// Cloneable and `Send`, so another thread (a Ctrl-C handler, for example)
/// can stop a realtime run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Outcome and Summary
// ============================================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The next entry would fire after the configured duration.
    DurationReached,
    /// The queue ran dry (every message was one-shot or disabled).
    Exhausted,
    /// The stop signal was seen.
    Stopped,
    /// `max_events` entries were processed.
    EventLimit,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DurationReached => "duration reached",
            Self::Exhausted => "queue exhausted",
            Self::Stopped => "stopped",
            Self::EventLimit => "event limit reached",
        };
        f.write_str(s)
    }
}

/// Result of a single [`Simulation::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One entry was processed; call `step` again.
    Continued,
    Finished(RunOutcome),
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimSummary {
    pub scenario: String,
    pub seed: u64,
    pub outcome: RunOutcome,
    pub frames_published: u64,
    pub events_processed: u64,
    pub final_time_ns: u64,
    pub faults: FaultCounts,
    pub bus: BusStats,
    /// BLAKE3 over the postcard encoding of every published frame.
    pub digest: String,
}

// ============================================================================
// Simulation
// ============================================================================

/// A deterministic run of one scenario.
pub struct Simulation {
    scenario: Scenario,
    clock: SimClock,
    queue: EventQueue,
    rng: SimRng,
    injector: FaultInjector,
    bus: Bus,
    /// Indexed like `scenario.nodes[i].messages[j]`.
    payload_states: Vec<Vec<PayloadState>>,
    next_sequence: u64,
    events_processed: u64,
    fault_counts: FaultCounts,
    log: EventLog,
    digest: FrameDigest,
    stop: StopHandle,
    outcome: Option<RunOutcome>,
}

impl Simulation {
    /// Validates `scenario` and queues the first emission of every enabled
    /// message.
    pub fn new(scenario: Scenario) -> Result<Self, SimError> {
        scenario.validate()?;

        let mut queue = EventQueue::new();
        let mut payload_states = Vec::with_capacity(scenario.nodes.len());
        for (i, node) in scenario.nodes.iter().enumerate() {
            payload_states.push(vec![PayloadState::new(); node.messages.len()]);
            for (j, msg) in node.messages.iter().enumerate() {
                if msg.enabled {
                    queue.schedule(
                        msg.offset_ns,
                        node.id,
                        msg.arbitration_id,
                        EntryKind::Periodic { node: i, message: j },
                    );
                }
            }
        }

        let log = if scenario.trace_enabled {
            EventLog::new()
        } else {
            EventLog::disabled()
        };

        Ok(Self {
            clock: SimClock::new(scenario.clock),
            rng: SimRng::new(scenario.seed),
            injector: scenario.build_injector(),
            queue,
            bus: Bus::new(),
            payload_states,
            next_sequence: 0,
            events_processed: 0,
            fault_counts: FaultCounts::default(),
            log,
            digest: FrameDigest::new(),
            stop: StopHandle::new(),
            outcome: None,
            scenario,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Observers are attached through this before (or between) steps.
    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn frames_published(&self) -> u64 {
        self.next_sequence
    }

    pub fn fault_counts(&self) -> FaultCounts {
        self.fault_counts
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// `None` until the run has finished.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Processes the next schedule entry.
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        if let Some(outcome) = self.outcome {
            return Ok(StepOutcome::Finished(outcome));
        }

        if self.stop.is_stopped() {
            let discarded = self.queue.drain();
            warn!(
                scenario = %self.scenario.name,
                time_ns = self.clock.now(),
                discarded,
                "stop requested, draining queue"
            );
            self.log
                .log(self.clock.now(), Decision::Stopped { discarded });
            return Ok(self.finish(RunOutcome::Stopped));
        }

        if let Some(limit) = self.scenario.max_events {
            if self.events_processed >= limit {
                return Ok(self.finish(RunOutcome::EventLimit));
            }
        }

        let Some(next_time) = self.queue.next_time() else {
            return Ok(self.finish(RunOutcome::Exhausted));
        };
        if next_time > self.scenario.duration_ns {
            return Ok(self.finish(RunOutcome::DurationReached));
        }
        let Some(entry) = self.queue.pop() else {
            return Ok(self.finish(RunOutcome::Exhausted));
        };

        self.clock.wait_until(entry.fire_time);
        self.clock.advance_to(entry.fire_time);
        self.events_processed += 1;

        match entry.kind {
            EntryKind::Periodic { node, message } => {
                self.fire_periodic(entry.fire_time, node, message)?;
            }
            EntryKind::Deliver(frame) => {
                self.publish(frame.with_timestamp(entry.fire_time))?;
            }
        }

        Ok(StepOutcome::Continued)
    }

    /// Runs until the scenario ends and returns the summary.
    pub fn run(&mut self) -> Result<SimSummary, SimError> {
        info!(
            scenario = %self.scenario.name,
            seed = self.scenario.seed,
            duration_ns = self.scenario.duration_ns,
            clock = ?self.scenario.clock,
            "starting simulation"
        );
        self.clock.start();

        loop {
            if let StepOutcome::Finished(_) = self.step()? {
                break;
            }
        }

        let summary = self.summary();
        info!(
            scenario = %summary.scenario,
            outcome = %summary.outcome,
            frames = summary.frames_published,
            final_time_ns = summary.final_time_ns,
            digest = %summary.digest,
            "simulation finished"
        );
        Ok(summary)
    }

    /// Summary of the run so far. `outcome` reads `Stopped` for an
    /// unfinished run.
    pub fn summary(&self) -> SimSummary {
        SimSummary {
            scenario: self.scenario.name.clone(),
            seed: self.scenario.seed,
            outcome: self.outcome.unwrap_or(RunOutcome::Stopped),
            frames_published: self.next_sequence,
            events_processed: self.events_processed,
            final_time_ns: self.clock.now(),
            faults: self.fault_counts,
            bus: self.bus.stats(),
            digest: self.digest.hex(),
        }
    }

    fn finish(&mut self, outcome: RunOutcome) -> StepOutcome {
        debug!(%outcome, time_ns = self.clock.now(), "run finished");
        self.outcome = Some(outcome);
        StepOutcome::Finished(outcome)
    }

    fn fire_periodic(&mut self, fire_time: u64, node: usize, message: usize) -> Result<(), SimError> {
        let node_cfg = &self.scenario.nodes[node];
        let msg = &node_cfg.messages[message];
        let node_id = node_cfg.id;
        let id = msg.arbitration_id;
        let period = msg.period_ns;
        let jitter_bound = msg.jitter_ns;

        let payload = msg
            .payload
            .generate(&mut self.payload_states[node][message], &mut self.rng);
        let candidate = Frame::new(id, payload, fire_time, node_id)?;

        let decision = self.injector.apply(&candidate, &mut self.rng);
        self.fault_counts.record(&decision);
        if decision != FaultDecision::Pass {
            debug!(
                id = %id,
                node = %node_id,
                time_ns = fire_time,
                decision = decision.label(),
                "fault injected"
            );
        }

        let (raw_id, raw_node) = (id.as_raw(), node_id.as_raw());
        match decision {
            FaultDecision::Pass => self.publish(candidate)?,
            FaultDecision::Drop => {
                self.log.log(
                    fire_time,
                    Decision::Dropped {
                        arbitration_id: raw_id,
                        node_id: raw_node,
                    },
                );
            }
            FaultDecision::Delay { until_ns } => {
                self.log.log(
                    fire_time,
                    Decision::Delayed {
                        arbitration_id: raw_id,
                        node_id: raw_node,
                        until_ns,
                    },
                );
                self.queue
                    .schedule_frame(until_ns, candidate.with_timestamp(until_ns));
            }
            FaultDecision::Replace(frame) => {
                self.log.log(
                    fire_time,
                    Decision::Corrupted {
                        arbitration_id: raw_id,
                        node_id: raw_node,
                    },
                );
                self.publish(frame)?;
            }
            FaultDecision::Amplify { extra_times } => {
                self.log.log(
                    fire_time,
                    Decision::Amplified {
                        arbitration_id: raw_id,
                        node_id: raw_node,
                        copies: extra_times.len(),
                    },
                );
                for t in extra_times {
                    self.queue
                        .schedule_frame(t, candidate.clone().with_timestamp(t));
                }
                self.publish(candidate)?;
            }
        }

        if period > 0 {
            let jitter = self.rng.jitter_ns(jitter_bound);
            let next = i128::from(fire_time) + i128::from(period) + i128::from(jitter);
            let next = u64::try_from(next.max(i128::from(fire_time))).unwrap_or(u64::MAX);
            self.queue.schedule(
                next,
                node_id,
                id,
                EntryKind::Periodic { node, message },
            );
        }
        Ok(())
    }

    fn publish(&mut self, frame: Frame) -> Result<(), SimError> {
        let frame = frame.with_sequence(self.next_sequence);
        self.next_sequence += 1;
        self.digest.update(&frame)?;

        let delivery = self.bus.publish(&frame);
        debug!(
            %frame,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "frame published"
        );
        self.log.log(
            frame.timestamp_ns(),
            Decision::Published {
                sequence: frame.sequence(),
                arbitration_id: frame.arbitration_id().as_raw(),
                node_id: frame.source_node().as_raw(),
                delivered: delivery.delivered,
                failed: delivery.failed,
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("scenario", &self.scenario.name)
            .field("now", &self.clock.now())
            .field("pending", &self.queue.len())
            .field("frames_published", &self.next_sequence)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
