//! Scenario definition and validation.
//!
//! A [`Scenario`] is everything a run needs: seed, duration, clock mode, the
//! virtual nodes and their messages, fault rules, timing expectations and the
//! analyzer configuration. It is immutable once a run starts.
//!
//! [`Scenario::validate`] rejects inconsistent scenarios up front with a
//! [`SimError::Configuration`] naming the offending field as a dotted path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vbus_types::{ArbitrationId, MAX_PAYLOAD_LEN, NodeId};

use crate::analyzer::{AnalyzerConfig, Expectation, TimingAnalyzer};
use crate::clock::{ClockMode, NS_PER_SEC};
use crate::error::SimError;
use crate::fault::{FaultInjector, FaultRule, FaultType, MAX_AMPLIFY_COPIES};
use crate::node::{PayloadGenerator, VirtualNode};

/// Default virtual run length (10 seconds).
pub const DEFAULT_DURATION_NS: u64 = 10 * NS_PER_SEC;

/// Default safety bound on processed schedule entries.
pub const DEFAULT_MAX_EVENTS: u64 = 10_000_000;

fn default_name() -> String {
    "scenario".to_string()
}

const fn default_duration_ns() -> u64 {
    DEFAULT_DURATION_NS
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_events() -> Option<u64> {
    Some(DEFAULT_MAX_EVENTS)
}

/// Complete description of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub seed: u64,

    /// Virtual-time bound of the run.
    #[serde(default = "default_duration_ns")]
    pub duration_ns: u64,

    #[serde(default)]
    pub clock: ClockMode,

    /// Upper bound on processed schedule entries. `None` means unbounded.
    #[serde(default = "default_max_events")]
    pub max_events: Option<u64>,

    /// Record every scheduler decision in the run's event log.
    #[serde(default)]
    pub trace_enabled: bool,

    #[serde(default)]
    pub nodes: Vec<VirtualNode>,

    #[serde(default)]
    pub faults: Vec<FaultRule>,

    #[serde(default)]
    pub expectations: Vec<Expectation>,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: default_name(),
            seed: 0,
            duration_ns: DEFAULT_DURATION_NS,
            clock: ClockMode::Step,
            max_events: Some(DEFAULT_MAX_EVENTS),
            trace_enabled: false,
            nodes: Vec::new(),
            faults: Vec::new(),
            expectations: Vec::new(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration_ns(mut self, duration_ns: u64) -> Self {
        self.duration_ns = duration_ns;
        self
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_events(mut self, max_events: Option<u64>) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_tracing(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn with_node(mut self, node: VirtualNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_fault(mut self, rule: FaultRule) -> Self {
        self.faults.push(rule);
        self
    }

    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// A fresh analyzer carrying this scenario's expectations.
    pub fn build_analyzer(&self) -> TimingAnalyzer {
        TimingAnalyzer::with_expectations(self.analyzer.clone(), self.expectations.iter().cloned())
    }

    pub fn build_injector(&self) -> FaultInjector {
        FaultInjector::new(self.faults.clone()).with_horizon(self.duration_ns)
    }

    /// Checks the scenario for consistency.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.duration_ns == 0 {
            return Err(SimError::config("duration_ns", "must be positive"));
        }
        if let ClockMode::Scaled { factor } = self.clock {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(SimError::config(
                    "clock.factor",
                    format!("must be a positive finite number, got {factor}"),
                ));
            }
        }
        if self.max_events == Some(0) {
            return Err(SimError::config("max_events", "must be positive when set"));
        }

        let declared = self.validate_nodes()?;
        self.validate_faults()?;
        self.validate_expectations(&declared)?;
        self.validate_analyzer()
    }

    /// Returns every declared arbitration id.
    fn validate_nodes(&self) -> Result<BTreeMap<ArbitrationId, String>, SimError> {
        if self.nodes.is_empty() {
            return Err(SimError::config("nodes", "at least one node is required"));
        }

        let mut node_ids: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut declared: BTreeMap<ArbitrationId, String> = BTreeMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(first) = node_ids.insert(node.id, i) {
                return Err(SimError::config(
                    format!("nodes[{i}].id"),
                    format!("{} already used by nodes[{first}]", node.id),
                ));
            }

            for (j, msg) in node.messages.iter().enumerate() {
                let path = format!("nodes[{i}].messages[{j}]");
                let id = msg.arbitration_id;

                if !id.is_valid() {
                    return Err(SimError::config(
                        format!("{path}.arbitration_id"),
                        format!("{:#x} exceeds the 29-bit range", id.as_raw()),
                    ));
                }
                if let Some(owner) = declared.insert(id, path.clone()) {
                    return Err(SimError::config(
                        format!("{path}.arbitration_id"),
                        format!("{id} already declared by {owner}"),
                    ));
                }

                validate_payload(&format!("{path}.payload"), &msg.payload)?;

                if msg.period_ns > 0 && msg.jitter_ns >= msg.period_ns {
                    return Err(SimError::config(
                        format!("{path}.jitter_ns"),
                        format!(
                            "jitter {}ns must be below period {}ns",
                            msg.jitter_ns, msg.period_ns
                        ),
                    ));
                }
            }
        }
        Ok(declared)
    }

    fn validate_faults(&self) -> Result<(), SimError> {
        for (k, rule) in self.faults.iter().enumerate() {
            let path = format!("faults[{k}]");
            if !(0.0..=1.0).contains(&rule.probability) {
                return Err(SimError::config(
                    format!("{path}.probability"),
                    format!("must be within [0, 1], got {}", rule.probability),
                ));
            }
            if let Some(missing) = rule.missing_parameters().first() {
                return Err(SimError::config(
                    format!("{path}.{missing}"),
                    format!("required for {} faults", rule.fault_type),
                ));
            }
            if rule.fault_type == FaultType::Flood && rule.interval_ns == Some(0) {
                return Err(SimError::config(
                    format!("{path}.interval_ns"),
                    "flood interval must be positive",
                ));
            }
            if rule.requested_copies() > MAX_AMPLIFY_COPIES {
                let field = if rule.fault_type == FaultType::Burst {
                    "count"
                } else {
                    "duration_ns"
                };
                return Err(SimError::config(
                    format!("{path}.{field}"),
                    format!(
                        "{} copies per trigger exceeds the limit of {MAX_AMPLIFY_COPIES}",
                        rule.requested_copies()
                    ),
                ));
            }
            if let Some(bad) = rule.target_ids.iter().find(|id| !id.is_valid()) {
                return Err(SimError::config(
                    format!("{path}.target_ids"),
                    format!("{:#x} exceeds the 29-bit range", bad.as_raw()),
                ));
            }
        }
        Ok(())
    }

    fn validate_expectations(
        &self,
        declared: &BTreeMap<ArbitrationId, String>,
    ) -> Result<(), SimError> {
        for (k, exp) in self.expectations.iter().enumerate() {
            let path = format!("expectations[{k}]");
            if !declared.contains_key(&exp.arbitration_id) {
                return Err(SimError::config(
                    format!("{path}.arbitration_id"),
                    format!("{} is not sent by any node", exp.arbitration_id),
                ));
            }
            if exp.period_ns == 0 {
                return Err(SimError::config(
                    format!("{path}.period_ns"),
                    "must be positive",
                ));
            }
            if !(exp.tolerance_percent.is_finite() && exp.tolerance_percent >= 0.0) {
                return Err(SimError::config(
                    format!("{path}.tolerance_percent"),
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    fn validate_analyzer(&self) -> Result<(), SimError> {
        if self.analyzer.window_ns == 0 {
            return Err(SimError::config("analyzer.window_ns", "must be positive"));
        }
        let threshold = self.analyzer.bus_saturation_threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(SimError::config(
                "analyzer.bus_saturation_threshold",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

fn validate_payload(path: &str, payload: &PayloadGenerator) -> Result<(), SimError> {
    let len = payload.payload_len();
    if len > MAX_PAYLOAD_LEN {
        return Err(SimError::config(
            path,
            format!("payload of {len} bytes exceeds {MAX_PAYLOAD_LEN}"),
        ));
    }
    if len < payload.min_len() {
        return Err(SimError::config(
            path,
            format!("generator needs at least {} bytes", payload.min_len()),
        ));
    }
    if let PayloadGenerator::Temperature {
        step_deci_c,
        min_deci_c,
        max_deci_c,
        ..
    } = payload
    {
        if min_deci_c > max_deci_c {
            return Err(SimError::config(path, "min_deci_c exceeds max_deci_c"));
        }
        let span = i64::from(*max_deci_c) - i64::from(*min_deci_c);
        if *step_deci_c <= 0 || i64::from(*step_deci_c) > span {
            return Err(SimError::config(
                path,
                format!("step_deci_c must be within 1..={span}, got {step_deci_c}"),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
