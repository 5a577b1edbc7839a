//! Timing-rule analyzer.
//!
//! [`TimingAnalyzer`] consumes the frame stream and appends [`Event`]s when a
//! message misses its deadline, arrives with too much jitter, or when the bus
//! as a whole carries more traffic than the saturation threshold allows. It
//! also accepts decoded [`Signal`]s and flags counter signals that do not
//! advance by exactly one.
//!
//! For every frame the checks run in a fixed order (deadline, jitter,
//! saturation) before the per-id tracker is updated, so the event stream is a
//! pure function of the frame stream.
//!
//! The analyzer never mutates frames or touches scheduling.

use std::borrow::Cow;
use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vbus_types::{ArbitrationId, Event, EventKind, Frame, Severity, Signal, SignalQuality};

use crate::bus::{DeliveryError, Observer};
use crate::clock::{NS_PER_MS, NS_PER_SEC};

// ============================================================================
// Configuration
// ============================================================================

const fn default_tolerance_percent() -> f64 {
    20.0
}

const fn default_jitter_threshold_ns() -> u64 {
    5 * NS_PER_MS
}

const fn default_saturation_threshold() -> f64 {
    5_000.0
}

const fn default_window_ns() -> u64 {
    NS_PER_SEC
}

const fn enabled() -> bool {
    true
}

fn default_watch_signal() -> String {
    "counter".to_string()
}

/// Expected timing of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub arbitration_id: ArbitrationId,
    pub period_ns: u64,
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: f64,
    #[serde(default = "default_jitter_threshold_ns")]
    pub jitter_threshold_ns: u64,
}

impl Expectation {
    pub fn new(arbitration_id: ArbitrationId, period_ns: u64) -> Self {
        Self {
            arbitration_id,
            period_ns,
            tolerance_percent: default_tolerance_percent(),
            jitter_threshold_ns: default_jitter_threshold_ns(),
        }
    }

    pub fn with_tolerance(mut self, tolerance_percent: f64) -> Self {
        self.tolerance_percent = tolerance_percent;
        self
    }

    pub fn with_jitter_threshold(mut self, jitter_threshold_ns: u64) -> Self {
        self.jitter_threshold_ns = jitter_threshold_ns;
        self
    }

    /// Largest acceptable interval: `period * (1 + tolerance / 100)`.
    pub fn deadline_ns(&self) -> f64 {
        self.period_ns as f64 * (1.0 + self.tolerance_percent / 100.0)
    }
}

/// Switches and thresholds for the analyzer rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Bus-wide frames per second above which the bus counts as saturated.
    #[serde(default = "default_saturation_threshold")]
    pub bus_saturation_threshold: f64,

    /// Length of the sliding rate window.
    #[serde(default = "default_window_ns")]
    pub window_ns: u64,

    #[serde(default = "enabled")]
    pub enable_deadline_detection: bool,

    #[serde(default = "enabled")]
    pub enable_jitter_detection: bool,

    #[serde(default = "enabled")]
    pub enable_saturation_detection: bool,

    #[serde(default = "enabled")]
    pub enable_counter_detection: bool,

    /// Signal name checked by the counter rule.
    #[serde(default = "default_watch_signal")]
    pub watch_signal: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            bus_saturation_threshold: default_saturation_threshold(),
            window_ns: default_window_ns(),
            enable_deadline_detection: true,
            enable_jitter_detection: true,
            enable_saturation_detection: true,
            enable_counter_detection: true,
            watch_signal: default_watch_signal(),
        }
    }
}

// ============================================================================
// Per-id State
// ============================================================================

/// Tracker for one observed id. Created on first sight, kept for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdTrackerState {
    pub last_seen_ns: u64,
    /// Exponentially weighted moving average of the interval (weight 1/8).
    pub observed_period_estimate_ns: Option<u64>,
    pub miss_count: u64,
    pub frame_count: u64,
    intervals: IntervalStats,
}

impl IdTrackerState {
    fn new(t: u64) -> Self {
        Self {
            last_seen_ns: t,
            observed_period_estimate_ns: None,
            miss_count: 0,
            frame_count: 1,
            intervals: IntervalStats::default(),
        }
    }

    fn update(&mut self, t: u64, delta: u64) {
        self.observed_period_estimate_ns = Some(match self.observed_period_estimate_ns {
            None => delta,
            Some(est) => ((u128::from(est) * 7 + u128::from(delta)) / 8) as u64,
        });
        self.intervals.record(delta);
        self.last_seen_ns = t;
        self.frame_count += 1;
    }
}

/// Inter-arrival statistics for one id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntervalStats {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub total_ns: u128,
}

impl IntervalStats {
    fn record(&mut self, delta: u64) {
        if self.count == 0 {
            self.min_ns = delta;
            self.max_ns = delta;
        } else {
            self.min_ns = self.min_ns.min(delta);
            self.max_ns = self.max_ns.max(delta);
        }
        self.count += 1;
        self.total_ns += u128::from(delta);
    }

    pub fn mean_ns(&self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        Some((self.total_ns / u128::from(self.count)) as u64)
    }

    /// Spread between the longest and shortest interval.
    pub fn jitter_ns(&self) -> u64 {
        self.max_ns - self.min_ns
    }
}

/// Totals reported by [`TimingAnalyzer::summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub total_events: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_kind: BTreeMap<EventKind, usize>,
    pub monitored_ids: Vec<ArbitrationId>,
    pub observed_ids: Vec<ArbitrationId>,
}

// ============================================================================
// Analyzer
// ============================================================================

/// Stateful timing analyzer.
#[derive(Debug, Clone)]
pub struct TimingAnalyzer {
    config: AnalyzerConfig,
    expectations: BTreeMap<ArbitrationId, Expectation>,
    trackers: BTreeMap<ArbitrationId, IdTrackerState>,
    window: VecDeque<u64>,
    last_saturation_ns: Option<u64>,
    last_counter: Option<i64>,
    events: Vec<Event>,
}

impl TimingAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            expectations: BTreeMap::new(),
            trackers: BTreeMap::new(),
            window: VecDeque::new(),
            last_saturation_ns: None,
            last_counter: None,
            events: Vec::new(),
        }
    }

    pub fn with_expectations(
        config: AnalyzerConfig,
        expectations: impl IntoIterator<Item = Expectation>,
    ) -> Self {
        let mut analyzer = Self::new(config);
        for expectation in expectations {
            analyzer.set_expectation(expectation);
        }
        analyzer
    }

    /// Adds or replaces the expectation for an id.
    pub fn set_expectation(&mut self, expectation: Expectation) {
        self.expectations
            .insert(expectation.arbitration_id, expectation);
    }

    pub fn remove_expectation(&mut self, id: ArbitrationId) -> Option<Expectation> {
        self.expectations.remove(&id)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Hands the accumulated events to the caller, leaving trackers intact.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn tracker(&self, id: ArbitrationId) -> Option<&IdTrackerState> {
        self.trackers.get(&id)
    }

    /// Interval statistics for `id`, once at least two frames were seen.
    pub fn statistics(&self, id: ArbitrationId) -> Option<IntervalStats> {
        self.trackers
            .get(&id)
            .map(|t| t.intervals)
            .filter(|s| s.count > 0)
    }

    /// Clears all run state. Expectations and configuration are kept.
    pub fn reset(&mut self) {
        self.trackers.clear();
        self.window.clear();
        self.last_saturation_ns = None;
        self.last_counter = None;
        self.events.clear();
    }

    /// Runs every frame rule for `frame`. Returns the number of new events.
    pub fn observe(&mut self, frame: &Frame) -> usize {
        let before = self.events.len();
        let id = frame.arbitration_id();
        let t = frame.timestamp_ns();

        let delta = self.trackers.get(&id).map(|s| t.saturating_sub(s.last_seen_ns));

        if let Some(delta) = delta {
            if let Some(expectation) = self.expectations.get(&id).cloned() {
                if self.config.enable_deadline_detection {
                    self.check_deadline(id, t, delta, &expectation);
                }
                if self.config.enable_jitter_detection {
                    self.check_jitter(id, t, delta, &expectation);
                }
            }
        }

        self.slide_window(t);
        if self.config.enable_saturation_detection {
            self.check_saturation(t);
        }

        match delta {
            None => {
                self.trackers.insert(id, IdTrackerState::new(t));
            }
            Some(delta) => {
                if let Some(state) = self.trackers.get_mut(&id) {
                    state.update(t, delta);
                }
            }
        }

        self.events.len() - before
    }

    /// Runs the counter rule for a decoded signal. Returns true if it emitted.
    pub fn observe_signal(&mut self, signal: &Signal) -> bool {
        if !self.config.enable_counter_detection
            || signal.name != self.config.watch_signal
            || signal.quality != SignalQuality::Ok
        {
            return false;
        }
        let Some(value) = signal.value.as_i64() else {
            return false;
        };

        let mut emitted = false;
        if let Some(last) = self.last_counter {
            let expected = (last + 1).rem_euclid(256);
            if value != expected {
                self.emit(Event::new(
                    Severity::Warning,
                    EventKind::CounterJump,
                    signal.source_id,
                    signal.timestamp_ns,
                    format!(
                        "{} jumped from {last} to {value} (expected {expected})",
                        signal.name
                    ),
                ));
                emitted = true;
            }
        }
        self.last_counter = Some(value);
        emitted
    }

    pub fn summary(&self) -> AnalysisSummary {
        let mut by_severity = BTreeMap::new();
        let mut by_kind = BTreeMap::new();
        for event in &self.events {
            *by_severity.entry(event.severity()).or_insert(0) += 1;
            *by_kind.entry(event.kind()).or_insert(0) += 1;
        }
        AnalysisSummary {
            total_events: self.events.len(),
            by_severity,
            by_kind,
            monitored_ids: self.expectations.keys().copied().collect(),
            observed_ids: self.trackers.keys().copied().collect(),
        }
    }

    fn check_deadline(&mut self, id: ArbitrationId, t: u64, delta: u64, exp: &Expectation) {
        let deadline = exp.deadline_ns();
        let interval = delta as f64;
        if interval <= deadline {
            return;
        }
        let severity = if interval > 2.0 * deadline {
            Severity::Critical
        } else {
            Severity::Warning
        };
        if let Some(state) = self.trackers.get_mut(&id) {
            state.miss_count += 1;
        }
        self.emit(Event::new(
            severity,
            EventKind::MissedDeadline,
            Some(id),
            t,
            format!(
                "interval {delta}ns exceeds deadline {deadline:.0}ns (period {}ns)",
                exp.period_ns
            ),
        ));
    }

    fn check_jitter(&mut self, id: ArbitrationId, t: u64, delta: u64, exp: &Expectation) {
        let deviation = delta.abs_diff(exp.period_ns);
        if deviation > exp.jitter_threshold_ns {
            self.emit(Event::new(
                Severity::Warning,
                EventKind::JitterAnomaly,
                Some(id),
                t,
                format!(
                    "interval {delta}ns deviates {deviation}ns from period {}ns (threshold {}ns)",
                    exp.period_ns, exp.jitter_threshold_ns
                ),
            ));
        }
    }

    fn slide_window(&mut self, t: u64) {
        self.window.push_back(t);
        let window = self.config.window_ns;
        while let Some(&front) = self.window.front() {
            if front.saturating_add(window) <= t {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn check_saturation(&mut self, t: u64) {
        let window = self.config.window_ns.max(1);
        let rate = self.window.len() as f64 * NS_PER_SEC as f64 / window as f64;
        if rate <= self.config.bus_saturation_threshold {
            return;
        }
        if let Some(last) = self.last_saturation_ns {
            if t.saturating_sub(last) < window {
                return;
            }
        }
        self.last_saturation_ns = Some(t);
        self.emit(Event::new(
            Severity::Critical,
            EventKind::BusSaturation,
            None,
            t,
            format!(
                "bus rate {rate:.0} frames/s exceeds {:.0} frames/s",
                self.config.bus_saturation_threshold
            ),
        ));
    }

    fn emit(&mut self, event: Event) {
        debug!(%event, "analysis event");
        self.events.push(event);
    }
}

impl Default for TimingAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl Observer for TimingAnalyzer {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        self.observe(frame);
        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("analyzer")
    }
}

// ============================================================================
// Tests
// ============================================================================
