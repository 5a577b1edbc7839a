//! Fault injection for candidate emissions.
//!
//! The [`FaultInjector`] is a pure transform: given a candidate frame and the
//! run's [`SimRng`] it returns a [`FaultDecision`] and never touches the queue
//! or the bus itself. The scheduler applies the decision.
//!
//! Rules are evaluated in registration order. A rule is skipped when it is
//! disabled or its target filter excludes the frame's id; otherwise exactly one
//! probability draw is made for it. The first rule whose draw succeeds decides
//! the outcome and the remaining rules are not consulted (and draw nothing).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vbus_types::{ArbitrationId, Frame};

use crate::rng::SimRng;

/// Most copies a single burst or flood trigger may schedule.
pub const MAX_AMPLIFY_COPIES: u64 = 100_000;

// ============================================================================
// Rules
// ============================================================================

/// Kind of fault a rule injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Suppress the emission.
    Drop,
    /// Re-queue at `fire + delay_ns + uniform(-jitter_ns..=jitter_ns)`.
    Delay,
    /// Re-queue at `fire + uniform(0..=jitter_ns)`.
    Jitter,
    /// Publish the original plus `count` copies spaced by `interval_ns`.
    Burst,
    /// Publish the original plus copies every `interval_ns` for `duration_ns`.
    Flood,
    /// Flip one random bit of the payload.
    Corrupt,
}

impl std::fmt::Display for FaultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Drop => "drop",
            Self::Delay => "delay",
            Self::Jitter => "jitter",
            Self::Burst => "burst",
            Self::Flood => "flood",
            Self::Corrupt => "corrupt",
        };
        f.write_str(s)
    }
}

fn default_enabled() -> bool {
    true
}

/// A fault injection rule.
///
/// Parameters that a fault type does not use are ignored; the ones it needs
/// are checked by scenario validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRule {
    pub fault_type: FaultType,

    /// Chance in `[0, 1]` that the rule triggers for an applicable frame.
    pub probability: f64,

    /// Ids the rule applies to. Empty means every id.
    #[serde(default)]
    pub target_ids: BTreeSet<ArbitrationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ns: Option<u64>,

    /// Jitter bound for `delay`, maximum shift for `jitter`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ns: Option<u64>,

    /// Number of copies for `burst`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Copy spacing for `burst` and `flood`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ns: Option<u64>,

    /// Flood length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<u64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FaultRule {
    fn base(fault_type: FaultType, probability: f64) -> Self {
        Self {
            fault_type,
            probability,
            target_ids: BTreeSet::new(),
            delay_ns: None,
            jitter_ns: None,
            count: None,
            interval_ns: None,
            duration_ns: None,
            enabled: true,
        }
    }

    pub fn drop(probability: f64) -> Self {
        Self::base(FaultType::Drop, probability)
    }

    pub fn delay(probability: f64, delay_ns: u64, jitter_ns: u64) -> Self {
        Self {
            delay_ns: Some(delay_ns),
            jitter_ns: Some(jitter_ns),
            ..Self::base(FaultType::Delay, probability)
        }
    }

    pub fn jitter(probability: f64, max_jitter_ns: u64) -> Self {
        Self {
            jitter_ns: Some(max_jitter_ns),
            ..Self::base(FaultType::Jitter, probability)
        }
    }

    pub fn burst(probability: f64, count: u32, interval_ns: u64) -> Self {
        Self {
            count: Some(count),
            interval_ns: Some(interval_ns),
            ..Self::base(FaultType::Burst, probability)
        }
    }

    pub fn flood(probability: f64, interval_ns: u64, duration_ns: u64) -> Self {
        Self {
            interval_ns: Some(interval_ns),
            duration_ns: Some(duration_ns),
            ..Self::base(FaultType::Flood, probability)
        }
    }

    pub fn corrupt(probability: f64) -> Self {
        Self::base(FaultType::Corrupt, probability)
    }

    /// Restricts the rule to the given ids.
    pub fn targeting(mut self, ids: impl IntoIterator<Item = ArbitrationId>) -> Self {
        self.target_ids = ids.into_iter().collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn applies_to(&self, id: ArbitrationId) -> bool {
        self.target_ids.is_empty() || self.target_ids.contains(&id)
    }

    /// Parameter names this rule's fault type requires but does not have.
    pub fn missing_parameters(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self.fault_type {
            FaultType::Drop | FaultType::Corrupt => {}
            FaultType::Delay => {
                if self.delay_ns.is_none() {
                    missing.push("delay_ns");
                }
            }
            FaultType::Jitter => {
                if self.jitter_ns.is_none() {
                    missing.push("jitter_ns");
                }
            }
            FaultType::Burst => {
                if self.count.is_none() {
                    missing.push("count");
                }
                if self.interval_ns.is_none() {
                    missing.push("interval_ns");
                }
            }
            FaultType::Flood => {
                if self.interval_ns.is_none() {
                    missing.push("interval_ns");
                }
                if self.duration_ns.is_none() {
                    missing.push("duration_ns");
                }
            }
        }
        missing
    }

    /// Copies one trigger of this rule asks for, before any horizon cut.
    pub fn requested_copies(&self) -> u64 {
        match self.fault_type {
            FaultType::Burst => u64::from(self.count.unwrap_or(0)),
            FaultType::Flood => match self.interval_ns {
                Some(interval) if interval > 0 => self.duration_ns.unwrap_or(0) / interval,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Turns a triggered rule into a decision, drawing its parameters.
    ///
    /// Amplified copies later than `horizon_ns` are never created.
    fn decide(&self, candidate: &Frame, rng: &mut SimRng, horizon_ns: u64) -> FaultDecision {
        let fire = candidate.timestamp_ns();
        match self.fault_type {
            FaultType::Drop => FaultDecision::Drop,
            FaultType::Delay => {
                let delay = self.delay_ns.unwrap_or(0);
                let jitter = rng.jitter_ns(self.jitter_ns.unwrap_or(0));
                let target = i128::from(fire) + i128::from(delay) + i128::from(jitter);
                let until_ns = u64::try_from(target.max(i128::from(fire))).unwrap_or(u64::MAX);
                FaultDecision::Delay { until_ns }
            }
            FaultType::Jitter => {
                let shift = rng.range_inclusive(0, self.jitter_ns.unwrap_or(0));
                FaultDecision::Delay {
                    until_ns: fire.saturating_add(shift),
                }
            }
            FaultType::Burst | FaultType::Flood => {
                let interval = self.interval_ns.unwrap_or(0);
                let copies = self.requested_copies().min(MAX_AMPLIFY_COPIES);
                let extra_times = (1..=copies)
                    .map(|i| fire.saturating_add(i.saturating_mul(interval)))
                    .take_while(|&t| t <= horizon_ns)
                    .collect();
                FaultDecision::Amplify { extra_times }
            }
            FaultType::Corrupt => FaultDecision::Replace(flip_random_bit(candidate, rng)),
        }
    }
}

fn flip_random_bit(frame: &Frame, rng: &mut SimRng) -> Frame {
    let data = frame.data();
    if data.is_empty() {
        return frame.clone();
    }
    let mut corrupted = data.to_vec();
    let byte = rng.next_usize(corrupted.len());
    let bit = rng.next_usize(8);
    corrupted[byte] ^= 1 << bit;
    // Same length as the original, so this cannot exceed the payload limit.
    frame
        .clone()
        .with_data(corrupted)
        .unwrap_or_else(|_| frame.clone())
}

// ============================================================================
// Decisions
// ============================================================================

/// What the scheduler should do with a candidate emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultDecision {
    /// Publish unchanged.
    Pass,
    /// Do not publish.
    Drop,
    /// Publish at `until_ns` instead of now.
    Delay { until_ns: u64 },
    /// Publish this frame instead.
    Replace(Frame),
    /// Publish the original now and copies at each of `extra_times`.
    Amplify { extra_times: Vec<u64> },
}

impl FaultDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Drop => "drop",
            Self::Delay { .. } => "delay",
            Self::Replace(_) => "replace",
            Self::Amplify { .. } => "amplify",
        }
    }
}

/// Per-run fault statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCounts {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frames_delayed: u64,
    pub frames_corrupted: u64,
    /// Rules of type burst or flood that triggered.
    pub amplifications: u64,
    /// Extra copies scheduled by amplifications.
    pub frames_injected: u64,
}

impl FaultCounts {
    pub fn record(&mut self, decision: &FaultDecision) {
        self.frames_processed += 1;
        match decision {
            FaultDecision::Pass => {}
            FaultDecision::Drop => self.frames_dropped += 1,
            FaultDecision::Delay { .. } => self.frames_delayed += 1,
            FaultDecision::Replace(_) => self.frames_corrupted += 1,
            FaultDecision::Amplify { extra_times } => {
                self.amplifications += 1;
                self.frames_injected += extra_times.len() as u64;
            }
        }
    }

    /// Candidates that reached the bus unmodified and on time.
    pub fn frames_passed(&self) -> u64 {
        self.frames_processed
            - self.frames_dropped
            - self.frames_delayed
            - self.frames_corrupted
            - self.amplifications
    }
}

// ============================================================================
// Injector
// ============================================================================

/// Ordered list of fault rules.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rules: Vec<FaultRule>,
    enabled: bool,
    horizon_ns: u64,
}

impl FaultInjector {
    pub fn new(rules: Vec<FaultRule>) -> Self {
        Self {
            rules,
            enabled: true,
            horizon_ns: u64::MAX,
        }
    }

    /// Drops amplified copies that would fire after `horizon_ns`.
    pub fn with_horizon(mut self, horizon_ns: u64) -> Self {
        self.horizon_ns = horizon_ns;
        self
    }

    pub fn horizon_ns(&self) -> u64 {
        self.horizon_ns
    }

    /// An injector that always passes.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn add_rule(&mut self, rule: FaultRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[FaultRule] {
        &self.rules
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns all injection on or off. A disabled injector draws nothing.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Decides the fate of `candidate`.
    pub fn apply(&self, candidate: &Frame, rng: &mut SimRng) -> FaultDecision {
        if !self.enabled {
            return FaultDecision::Pass;
        }
        let id = candidate.arbitration_id();
        for rule in &self.rules {
            if !rule.enabled || !rule.applies_to(id) {
                continue;
            }
            if rng.next_bool_with_probability(rule.probability) {
                return rule.decide(candidate, rng, self.horizon_ns);
            }
        }
        FaultDecision::Pass
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::none()
    }
}

// ============================================================================
// Tests
// ============================================================================
