//! Virtual sender nodes and their payload generators.
//!
//! A node owns a list of periodic messages. Each message carries a
//! [`PayloadGenerator`] that synthesizes the data bytes every time the
//! scheduler fires it. Generators keep their per-message state in a
//! [`PayloadState`] owned by the simulation, so two runs with the same seed
//! see identical payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use vbus_types::{ArbitrationId, MAX_PAYLOAD_LEN, NodeId};

use crate::rng::SimRng;

// ============================================================================
// Payload Generators
// ============================================================================

const fn default_len() -> usize {
    MAX_PAYLOAD_LEN
}

const fn default_start_deci_c() -> i32 {
    250
}

const fn default_step_deci_c() -> i32 {
    1
}

const fn default_min_deci_c() -> i32 {
    180
}

const fn default_max_deci_c() -> i32 {
    320
}

const fn default_base_mv() -> u16 {
    12_000
}

const fn default_ripple_mv() -> u16 {
    30
}

/// How a message's data bytes are produced on each emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadGenerator {
    /// The same bytes every time.
    Constant { data: Vec<u8> },

    /// Byte 0 is a mod-256 counter starting at 0; the rest are zero.
    Counter {
        #[serde(default = "default_len")]
        len: usize,
    },

    /// Bytes 0-1 hold a temperature in deci-degrees C (little endian) that
    /// drifts as a bounded sawtooth between `min_deci_c` and `max_deci_c`.
    Temperature {
        #[serde(default = "default_len")]
        len: usize,
        #[serde(default = "default_start_deci_c")]
        start_deci_c: i32,
        #[serde(default = "default_step_deci_c")]
        step_deci_c: i32,
        #[serde(default = "default_min_deci_c")]
        min_deci_c: i32,
        #[serde(default = "default_max_deci_c")]
        max_deci_c: i32,
    },

    /// Bytes 0-1 hold millivolts (little endian) following a triangle ripple
    /// of amplitude `ripple_mv` around `base_mv`.
    Voltage {
        #[serde(default = "default_len")]
        len: usize,
        #[serde(default = "default_base_mv")]
        base_mv: u16,
        #[serde(default = "default_ripple_mv")]
        ripple_mv: u16,
    },

    /// Seeded random bytes drawn from the run's generator.
    Random {
        #[serde(default = "default_len")]
        len: usize,
    },
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::Counter { len: default_len() }
    }
}

impl PayloadGenerator {
    /// Number of data bytes every emission carries.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Constant { data } => data.len(),
            Self::Counter { len }
            | Self::Temperature { len, .. }
            | Self::Voltage { len, .. }
            | Self::Random { len } => *len,
        }
    }

    /// Minimum length the generator needs to encode its value.
    pub fn min_len(&self) -> usize {
        match self {
            Self::Constant { .. } | Self::Random { .. } => 0,
            Self::Counter { .. } => 1,
            Self::Temperature { .. } | Self::Voltage { .. } => 2,
        }
    }

    /// Produces the next payload, advancing `state`.
    ///
    /// Only [`PayloadGenerator::Random`] consumes randomness.
    pub fn generate(&self, state: &mut PayloadState, rng: &mut SimRng) -> Bytes {
        match self {
            Self::Constant { data } => Bytes::copy_from_slice(data),
            Self::Counter { len } => {
                let mut buf = vec![0u8; *len];
                if let Some(first) = buf.first_mut() {
                    *first = state.counter;
                }
                state.counter = state.counter.wrapping_add(1);
                Bytes::from(buf)
            }
            Self::Temperature {
                len,
                start_deci_c,
                step_deci_c,
                min_deci_c,
                max_deci_c,
            } => {
                let current = state.temperature_deci_c.unwrap_or(*start_deci_c);
                let step = i64::from(*step_deci_c);
                let mut next = i64::from(current) + if state.falling { -step } else { step };
                if next > i64::from(*max_deci_c) {
                    next = i64::from(*max_deci_c);
                    state.falling = true;
                } else if next < i64::from(*min_deci_c) {
                    next = i64::from(*min_deci_c);
                    state.falling = false;
                }
                // Within [min_deci_c, max_deci_c] after the clamp above.
                let next = i32::try_from(next).unwrap_or(*max_deci_c);
                state.temperature_deci_c = Some(next);
                let raw = u16::try_from(next.max(0)).unwrap_or(u16::MAX);
                le_u16_payload(*len, raw)
            }
            Self::Voltage {
                len,
                base_mv,
                ripple_mv,
            } => {
                let r = i64::from(*ripple_mv);
                let dv = if r == 0 {
                    0
                } else {
                    let x = (state.phase % (4 * r as u64)) as i64;
                    if x <= r {
                        x
                    } else if x <= 2 * r {
                        2 * r - x
                    } else if x <= 3 * r {
                        -(x - 2 * r)
                    } else {
                        -(4 * r - x)
                    }
                };
                state.phase += 1;
                let mv = (i64::from(*base_mv) + dv).clamp(0, i64::from(u16::MAX)) as u16;
                le_u16_payload(*len, mv)
            }
            Self::Random { len } => {
                let mut buf = vec![0u8; *len];
                rng.fill_bytes(&mut buf);
                Bytes::from(buf)
            }
        }
    }
}

fn le_u16_payload(len: usize, value: u16) -> Bytes {
    let mut buf = vec![0u8; len];
    let encoded = value.to_le_bytes();
    let n = len.min(2);
    buf[..n].copy_from_slice(&encoded[..n]);
    Bytes::from(buf)
}

/// Mutable generator state for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadState {
    counter: u8,
    temperature_deci_c: Option<i32>,
    falling: bool,
    phase: u64,
}

impl PayloadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of emissions produced so far by a counter generator.
    pub fn counter(&self) -> u8 {
        self.counter
    }
}

// ============================================================================
// Messages and Nodes
// ============================================================================

fn default_enabled() -> bool {
    true
}

/// A periodic message owned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    pub arbitration_id: ArbitrationId,

    /// Nominal period. Zero makes the message one-shot.
    pub period_ns: u64,

    /// Symmetric bound on the per-emission jitter sample.
    #[serde(default)]
    pub jitter_ns: u64,

    /// Time of the first emission.
    #[serde(default)]
    pub offset_ns: u64,

    #[serde(default)]
    pub payload: PayloadGenerator,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MessageConfig {
    pub fn new(arbitration_id: ArbitrationId, period_ns: u64) -> Self {
        Self {
            arbitration_id,
            period_ns,
            jitter_ns: 0,
            offset_ns: 0,
            payload: PayloadGenerator::default(),
            enabled: true,
        }
    }

    pub fn with_jitter(mut self, jitter_ns: u64) -> Self {
        self.jitter_ns = jitter_ns;
        self
    }

    pub fn with_offset(mut self, offset_ns: u64) -> Self {
        self.offset_ns = offset_ns;
        self
    }

    pub fn with_payload(mut self, payload: PayloadGenerator) -> Self {
        self.payload = payload;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_one_shot(&self) -> bool {
        self.period_ns == 0
    }
}

/// A virtual sender. Nodes have no internal concurrency; the scheduler
/// drives every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNode {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub messages: Vec<MessageConfig>,
}

impl VirtualNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: MessageConfig) -> Self {
        self.messages.push(message);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn run(generator: &PayloadGenerator, n: usize) -> Vec<Bytes> {
        let mut state = PayloadState::new();
        let mut rng = SimRng::new(1);
        (0..n).map(|_| generator.generate(&mut state, &mut rng)).collect()
    }

    #[test]
    fn counter_wraps_mod_256() {
        let payloads = run(&PayloadGenerator::Counter { len: 2 }, 258);
        assert_eq!(payloads[0].as_ref(), &[0, 0]);
        assert_eq!(payloads[255].as_ref(), &[255, 0]);
        assert_eq!(payloads[256].as_ref(), &[0, 0]);
        assert_eq!(payloads[257].as_ref(), &[1, 0]);
    }

    #[test]
    fn temperature_is_a_bounded_sawtooth() {
        let generator = PayloadGenerator::Temperature {
            len: 8,
            start_deci_c: 318,
            step_deci_c: 1,
            min_deci_c: 180,
            max_deci_c: 320,
        };
        let values: Vec<u16> = run(&generator, 5)
            .iter()
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![319, 320, 320, 319, 318]);
    }

    #[test]
    fn temperature_walk_survives_extreme_bounds() {
        let generator = PayloadGenerator::Temperature {
            len: 2,
            start_deci_c: i32::MAX - 1,
            step_deci_c: i32::MAX,
            min_deci_c: 0,
            max_deci_c: i32::MAX,
        };
        let values: Vec<u16> = run(&generator, 3)
            .iter()
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        // Hits the ceiling, falls to the floor, then stays clamped there.
        assert_eq!(values, vec![u16::MAX, 0, 0]);
    }

    #[test]
    fn voltage_ripples_around_base() {
        let generator = PayloadGenerator::Voltage {
            len: 2,
            base_mv: 12_000,
            ripple_mv: 2,
        };
        let values: Vec<u16> = run(&generator, 9)
            .iter()
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(
            values,
            vec![12_000, 12_001, 12_002, 12_001, 12_000, 11_999, 11_998, 11_999, 12_000]
        );
    }

    #[test]
    fn random_is_seeded() {
        let generator = PayloadGenerator::Random { len: 8 };
        assert_eq!(run(&generator, 4), run(&generator, 4));
    }

    #[test]
    fn constant_does_not_touch_rng() {
        let generator = PayloadGenerator::Constant {
            data: vec![0xDE, 0xAD],
        };
        let mut state = PayloadState::new();
        let mut rng = SimRng::new(5);
        let mut untouched = SimRng::new(5);
        assert_eq!(generator.generate(&mut state, &mut rng).as_ref(), &[0xDE, 0xAD]);
        assert_eq!(rng.next_u64(), untouched.next_u64());
    }

    #[test_case(PayloadGenerator::Constant { data: vec![1, 2, 3] }, 3; "constant")]
    #[test_case(PayloadGenerator::Counter { len: 4 }, 4; "counter")]
    #[test_case(PayloadGenerator::Random { len: 0 }, 0; "empty random")]
    fn payload_len_matches_output(generator: PayloadGenerator, expected: usize) {
        assert_eq!(generator.payload_len(), expected);
        assert!(run(&generator, 3).iter().all(|p| p.len() == expected));
    }

    #[test]
    fn message_config_defaults_from_json() {
        let json = r#"{"arbitration_id": 256, "period_ns": 10000000}"#;
        let msg: MessageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(msg.arbitration_id, ArbitrationId::standard(0x100));
        assert_eq!(msg.jitter_ns, 0);
        assert!(msg.enabled);
        assert_eq!(msg.payload, PayloadGenerator::Counter { len: 8 });
    }

    #[test]
    fn payload_generator_tagged_by_kind() {
        let json = r#"{"kind": "voltage", "ripple_mv": 10}"#;
        let generator: PayloadGenerator = serde_json::from_str(json).unwrap();
        assert_eq!(
            generator,
            PayloadGenerator::Voltage {
                len: 8,
                base_mv: 12_000,
                ripple_mv: 10
            }
        );
    }
}
