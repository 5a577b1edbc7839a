//! # vbus-sim: Deterministic simulation of a virtual broadcast bus
//!
//! This crate runs a shared, CAN-like bus as a closed discrete-event system:
//! virtual nodes emit periodic frames, a fault injector perturbs them, the bus
//! fans them out to observers, and a timing analyzer turns the stream into
//! findings.
//!
//! ## Determinism
//!
//! - **Reproducibility**: same scenario + same seed → byte-identical frames
//! - **Time compression**: the default step clock never sleeps
//! - **Replay equivalence**: a capture replayed through the bus yields the
//!   same fingerprint as the run that produced it
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Simulation                            │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────────┐   │
//! │  │ SimClock   │   │ EventQueue   │   │ SimRng (ChaCha8)   │   │
//! │  └────────────┘   └──────┬───────┘   └────────────────────┘   │
//! │                          │ periodic entries                    │
//! │                   ┌──────▼───────┐                            │
//! │                   │FaultInjector │  (Replayer skips this)     │
//! │                   └──────┬───────┘                            │
//! │                   ┌──────▼───────┐                            │
//! │                   │     Bus      │                            │
//! │                   └──────┬───────┘                            │
//! │     FrameRecorder  BusMonitor  TimingAnalyzer  CaptureWriter  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **`Scenario`**: nodes, messages, fault rules and expectations
//! - **`Simulation`**: owns the clock, queue, RNG, injector and bus
//! - **`Replayer`**: re-publishes a capture with the same clock contract
//! - **`TimingAnalyzer`**: deadline, jitter, saturation and counter rules

#![allow(clippy::cast_precision_loss)] // Rates and deadlines are computed in f64
#![allow(clippy::float_cmp)]
#![cfg_attr(test, allow(clippy::similar_names))]

pub mod analyzer;
pub mod bus;
pub mod capture;
mod clock;
mod digest;
mod error;
mod event;
pub mod event_log;
mod fault;
pub mod monitor;
mod node;
mod replay;
mod rng;
mod scenario;
mod simulation;

pub use analyzer::{
    AnalysisSummary, AnalyzerConfig, Expectation, IdTrackerState, IntervalStats, TimingAnalyzer,
};
pub use bus::{Bus, BusStats, Delivery, DeliveryError, FnObserver, Observer, ObserverHandle};
pub use capture::{
    CaptureWriter, read_events, read_frames, read_frames_from_path, write_events,
    write_events_to_path, write_frames,
};
pub use clock::{
    Clock, ClockMode, NS_PER_MS, NS_PER_SEC, SimClock, ms_to_ns, ns_to_ms, ns_to_sec, sec_to_ns,
};
pub use digest::FrameDigest;
pub use error::SimError;
pub use event::{EntryKind, EventQueue, ScheduleEntry};
pub use event_log::{Decision, EventLog, LoggedEvent};
pub use fault::{
    FaultCounts, FaultDecision, FaultInjector, FaultRule, FaultType, MAX_AMPLIFY_COPIES,
};
pub use monitor::{BusMonitor, FrameRecorder, MessageStatistics};
pub use node::{MessageConfig, PayloadGenerator, PayloadState, VirtualNode};
pub use replay::{ReplayOutcome, ReplaySummary, Replayer};
pub use rng::SimRng;
pub use scenario::{DEFAULT_DURATION_NS, DEFAULT_MAX_EVENTS, Scenario};
pub use simulation::{RunOutcome, SimSummary, Simulation, StepOutcome, StopHandle};
