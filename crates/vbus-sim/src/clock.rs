//! Virtual clock with selectable wall-time coupling.
//!
//! Virtual time is a `u64` nanosecond counter that only moves when the driver
//! calls [`Clock::advance_to`]. The [`ClockMode`] decides what
//! [`Clock::wait_until`] does before that happens:
//!
//! - **Realtime**: sleep until the wall clock has moved as far as virtual time
//! - **Scaled**: same, but wall time is compressed by `factor`
//! - **Step**: never sleep; used for tests and replay verification
//!
//! The mode is fixed when the clock is built.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Nanoseconds per millisecond.
pub const NS_PER_MS: u64 = 1_000_000;

/// Nanoseconds per second.
pub const NS_PER_SEC: u64 = 1_000_000_000;

pub fn ms_to_ns(ms: u64) -> u64 {
    ms * NS_PER_MS
}

pub fn ns_to_ms(ns: u64) -> u64 {
    ns / NS_PER_MS
}

pub fn sec_to_ns(sec: u64) -> u64 {
    sec * NS_PER_SEC
}

pub fn ns_to_sec(ns: u64) -> f64 {
    ns as f64 / NS_PER_SEC as f64
}

// ============================================================================
// Mode
// ============================================================================

/// How virtual time relates to wall time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Virtual time tracks wall time 1:1.
    Realtime,
    /// Virtual time runs `factor` times faster than wall time.
    Scaled { factor: f64 },
    /// Virtual time only moves on `advance_to`; waiting never blocks.
    #[default]
    Step,
}

impl ClockMode {
    /// Wall-clock duration corresponding to a virtual delta.
    ///
    /// Returns `None` in step mode.
    pub fn wall_delay(self, virtual_delta_ns: u64) -> Option<Duration> {
        match self {
            Self::Realtime => Some(Duration::from_nanos(virtual_delta_ns)),
            Self::Scaled { factor } => Some(Duration::from_secs_f64(
                virtual_delta_ns as f64 / factor / NS_PER_SEC as f64,
            )),
            Self::Step => None,
        }
    }

    pub fn is_step(self) -> bool {
        matches!(self, Self::Step)
    }
}

// ============================================================================
// Clock Trait
// ============================================================================

/// Time source driven by the scheduler or replayer.
///
/// Use `<C: Clock>` generics rather than `&dyn Clock` on hot paths.
pub trait Clock {
    /// Current virtual time in nanoseconds.
    fn now(&self) -> u64;

    /// Blocks the caller until virtual time `time_ns` is due.
    ///
    /// Does not move virtual time; the caller follows up with `advance_to`.
    fn wait_until(&mut self, time_ns: u64);

    /// Moves virtual time forward.
    ///
    /// # Panics
    ///
    /// May panic in debug builds if `time_ns < self.now()`.
    fn advance_to(&mut self, time_ns: u64);

    fn mode(&self) -> ClockMode;

    /// Current virtual time in milliseconds.
    #[inline]
    fn now_ms(&self) -> u64 {
        ns_to_ms(self.now())
    }
}

// ============================================================================
// Simulation Implementation
// ============================================================================

/// The clock used by simulation runs and replays.
#[derive(Debug, Clone)]
pub struct SimClock {
    mode: ClockMode,
    now_ns: u64,
    /// Wall instant matching `origin_ns`; set by `start` or the first wait.
    anchor: Option<Instant>,
    origin_ns: u64,
}

impl SimClock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            now_ns: 0,
            anchor: None,
            origin_ns: 0,
        }
    }

    /// Step-mode clock starting at zero.
    pub fn step() -> Self {
        Self::new(ClockMode::Step)
    }

    /// Pins the wall anchor to "now" for the current virtual time.
    ///
    /// Called at the start of a run so setup work is not counted against the
    /// first emission.
    pub fn start(&mut self) {
        self.anchor = Some(Instant::now());
        self.origin_ns = self.now_ns;
    }

    /// Wall time elapsed since the anchor, if the clock has been started.
    pub fn wall_elapsed(&self) -> Option<Duration> {
        self.anchor.map(|a| a.elapsed())
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::step()
    }
}

impl Clock for SimClock {
    #[inline]
    fn now(&self) -> u64 {
        self.now_ns
    }

    fn wait_until(&mut self, time_ns: u64) {
        if self.mode.is_step() {
            return;
        }
        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                self.start();
                self.anchor.unwrap_or_else(Instant::now)
            }
        };
        if time_ns <= self.origin_ns {
            return;
        }
        let Some(offset) = self.mode.wall_delay(time_ns - self.origin_ns) else {
            return;
        };
        let deadline = anchor + offset;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }

    fn advance_to(&mut self, time_ns: u64) {
        debug_assert!(
            time_ns >= self.now_ns,
            "time cannot go backwards: current={}, target={}",
            self.now_ns,
            time_ns
        );
        self.now_ns = self.now_ns.max(time_ns);
    }

    fn mode(&self) -> ClockMode {
        self.mode
    }
}

// ============================================================================
// Tests
// ============================================================================
