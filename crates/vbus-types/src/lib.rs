//! # vbus-types: Core types for `vbus`
//!
//! This crate contains the shared vocabulary of the virtual bus:
//! - Identifiers ([`ArbitrationId`], [`NodeId`])
//! - Transport-level records ([`Frame`], [`FrameKey`])
//! - Analysis output ([`Event`], [`EventKind`], [`Severity`])
//! - Normalizer boundary ([`Signal`], [`SignalValue`], [`SignalQuality`])
//!
//! All timestamps are virtual time in nanoseconds since the start of a run.

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants (Classic CAN)
// ============================================================================

/// Largest 11-bit (standard) arbitration id.
pub const STANDARD_ID_MAX: u32 = 0x7FF;

/// Largest 29-bit (extended) arbitration id.
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Maximum payload of a classic CAN frame.
pub const MAX_PAYLOAD_LEN: usize = 8;

// ============================================================================
// Errors
// ============================================================================

/// Reasons a frame is not well formed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("arbitration id {0:#x} exceeds the 29-bit extended range")]
    IdOutOfRange(u32),

    #[error("payload of {0} bytes exceeds the classic limit of 8")]
    PayloadTooLong(usize),

    #[error("dlc {dlc} does not match payload length {len}")]
    DlcMismatch { dlc: u8, len: usize },
}

// ============================================================================
// Identifiers - All Copy
// ============================================================================

/// Numeric identifier of a bus message.
///
/// Values up to [`STANDARD_ID_MAX`] are standard 11-bit ids; anything above
/// is treated as a 29-bit extended id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ArbitrationId(u32);

impl ArbitrationId {
    /// Creates an id, rejecting values outside the 29-bit range.
    pub fn new(raw: u32) -> Result<Self, FrameError> {
        if raw > EXTENDED_ID_MAX {
            return Err(FrameError::IdOutOfRange(raw));
        }
        Ok(Self(raw))
    }

    /// Creates a standard 11-bit id.
    ///
    /// `raw` must not exceed [`STANDARD_ID_MAX`]. Debug builds panic on a wider
    /// value; release builds mask the high bits off.
    pub fn standard(raw: u16) -> Self {
        debug_assert!(
            u32::from(raw) <= STANDARD_ID_MAX,
            "standard id {raw:#x} exceeds 11 bits"
        );
        Self(u32::from(raw) & STANDARD_ID_MAX)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }

    pub fn is_extended(self) -> bool {
        self.0 > STANDARD_ID_MAX
    }

    /// Returns true if the value fits the 29-bit range.
    ///
    /// Only ids that bypassed [`ArbitrationId::new`] (deserialized ones) can fail this.
    pub fn is_valid(self) -> bool {
        self.0 <= EXTENDED_ID_MAX
    }
}

impl Display for ArbitrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{:#010x}", self.0)
        } else {
            write!(f, "{:#05x}", self.0)
        }
    }
}

impl From<ArbitrationId> for u32 {
    fn from(id: ArbitrationId) -> Self {
        id.0
    }
}

impl TryFrom<u32> for ArbitrationId {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Identifier of a virtual sender node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Total order of published frames: `(timestamp, source node, id, sequence)`.
pub type FrameKey = (u64, NodeId, ArbitrationId, u64);

/// Transport-level record of one bus emission.
///
/// Frames are immutable once published: observers only ever see `&Frame`, and
/// the builder-style methods consume `self` and return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    timestamp_ns: u64,
    arbitration_id: ArbitrationId,
    data: Bytes,
    dlc: u8,
    source_node: NodeId,
    sequence: u64,
}

impl Frame {
    /// Creates an unpublished frame (sequence 0).
    pub fn new(
        arbitration_id: ArbitrationId,
        data: impl Into<Bytes>,
        timestamp_ns: u64,
        source_node: NodeId,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            timestamp_ns,
            arbitration_id,
            dlc: data.len() as u8,
            data,
            source_node,
            sequence: 0,
        })
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn arbitration_id(&self) -> ArbitrationId {
        self.arbitration_id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    pub fn source_node(&self) -> NodeId {
        self.source_node
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the ordering key of this frame.
    pub fn key(&self) -> FrameKey {
        (
            self.timestamp_ns,
            self.source_node,
            self.arbitration_id,
            self.sequence,
        )
    }

    /// Stamps the publish sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Moves the frame to a different emission time.
    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Replaces the payload, keeping `dlc` consistent.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Result<Self, FrameError> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        self.dlc = data.len() as u8;
        self.data = data;
        Ok(self)
    }

    /// Checks a frame that did not come through [`Frame::new`].
    pub fn validate(&self) -> Result<(), FrameError> {
        if !self.arbitration_id.is_valid() {
            return Err(FrameError::IdOutOfRange(self.arbitration_id.as_raw()));
        }
        if self.data.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(self.data.len()));
        }
        if usize::from(self.dlc) != self.data.len() {
            return Err(FrameError::DlcMismatch {
                dlc: self.dlc,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    /// Payload as an uppercase hex string.
    pub fn hex_data(&self) -> String {
        self.data.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame(id={}, data={}, dlc={}, ts={}ns, src={}, seq={})",
            self.arbitration_id,
            self.hex_data(),
            self.dlc,
            self.timestamp_ns,
            self.source_node,
            self.sequence
        )
    }
}

// ============================================================================
// Analysis Events
// ============================================================================

/// Severity of an analysis finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Category of an analysis finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Inter-arrival time exceeded the expected period plus tolerance.
    MissedDeadline,
    /// Inter-arrival time deviated from the period by more than the threshold.
    JitterAnomaly,
    /// Bus-wide frame rate exceeded the saturation threshold.
    BusSaturation,
    /// A watched counter signal did not advance by exactly one.
    CounterJump,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissedDeadline => "missed_deadline",
            Self::JitterAnomaly => "jitter_anomaly",
            Self::BusSaturation => "bus_saturation",
            Self::CounterJump => "counter_jump",
        };
        f.write_str(s)
    }
}

/// An analysis finding. Append-only: there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    severity: Severity,
    kind: EventKind,
    arbitration_id: Option<ArbitrationId>,
    timestamp_ns: u64,
    message: String,
}

impl Event {
    pub fn new(
        severity: Severity,
        kind: EventKind,
        arbitration_id: Option<ArbitrationId>,
        timestamp_ns: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            arbitration_id,
            timestamp_ns,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn arbitration_id(&self) -> Option<ArbitrationId> {
        self.arbitration_id
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arbitration_id {
            Some(id) => write!(
                f,
                "{}[{}] {} @{}ns: {}",
                self.severity, id, self.kind, self.timestamp_ns, self.message
            ),
            None => write!(
                f,
                "{} {} @{}ns: {}",
                self.severity, self.kind, self.timestamp_ns, self.message
            ),
        }
    }
}

// ============================================================================
// Signals (normalizer boundary)
// ============================================================================

/// Decoded physical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SignalValue {
    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
}

/// Decode outcome reported by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalQuality {
    #[default]
    Ok,
    Unmapped,
    DecodeError,
}

/// Semantic-level value decoded from a frame by an external normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp_ns: u64,
    pub name: String,
    pub value: SignalValue,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub source_id: Option<ArbitrationId>,
    #[serde(default)]
    pub quality: SignalQuality,
}

impl Signal {
    pub fn new(timestamp_ns: u64, name: impl Into<String>, value: SignalValue) -> Self {
        Self {
            timestamp_ns,
            name: name.into(),
            value,
            units: None,
            source_id: None,
            quality: SignalQuality::Ok,
        }
    }

    pub fn with_source(mut self, source_id: ArbitrationId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn with_quality(mut self, quality: SignalQuality) -> Self {
        self.quality = quality;
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

    #[test_case(0x000, false; "lowest standard")]
    #[test_case(0x7FF, false; "highest standard")]
    #[test_case(0x800, true; "lowest extended")]
    #[test_case(0x1FFF_FFFF, true; "highest extended")]
    fn arbitration_id_classifies_width(raw: u32, extended: bool) {
        let id = ArbitrationId::new(raw).expect("in range");
        assert_eq!(id.is_extended(), extended);
        assert_eq!(id.as_raw(), raw);
    }

    #[test]
    fn arbitration_id_rejects_out_of_range() {
        assert_eq!(
            ArbitrationId::new(0x2000_0000),
            Err(FrameError::IdOutOfRange(0x2000_0000))
        );
    }

    #[test]
    fn standard_id_accepts_the_full_11_bit_range() {
        assert_eq!(ArbitrationId::standard(0x7FF).as_raw(), 0x7FF);
        assert!(!ArbitrationId::standard(0x7FF).is_extended());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds 11 bits")]
    fn standard_id_rejects_wide_values_in_debug() {
        let _ = ArbitrationId::standard(0x800);
    }

    #[test]
    fn frame_rejects_long_payload() {
        let err = Frame::new(ArbitrationId::standard(0x100), vec![0u8; 9], 0, NodeId::new(1))
            .expect_err("nine bytes is too long");
        assert_eq!(err, FrameError::PayloadTooLong(9));
    }

    #[test]
    fn frame_dlc_tracks_payload() {
        let frame = Frame::new(ArbitrationId::standard(0x100), vec![1, 2, 3], 10, NodeId::new(1))
            .unwrap();
        assert_eq!(frame.dlc(), 3);
        let frame = frame.with_data(vec![9u8; 8]).unwrap();
        assert_eq!(frame.dlc(), 8);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn frame_key_orders_by_time_then_node_then_id() {
        let a = Frame::new(ArbitrationId::standard(0x200), vec![], 5, NodeId::new(1)).unwrap();
        let b = Frame::new(ArbitrationId::standard(0x100), vec![], 5, NodeId::new(2)).unwrap();
        let c = Frame::new(ArbitrationId::standard(0x100), vec![], 4, NodeId::new(9)).unwrap();
        let mut keys = vec![a.key(), b.key(), c.key()];
        keys.sort();
        assert_eq!(keys, vec![c.key(), a.key(), b.key()]);
    }

    #[test]
    fn validate_catches_tampered_dlc() {
        let json = r#"{"timestamp_ns":1,"arbitration_id":256,"data":[1,2],"dlc":5,"source_node":1,"sequence":0}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame.validate(),
            Err(FrameError::DlcMismatch { dlc: 5, len: 2 })
        );
    }

    #[test]
    fn display_formats() {
        let frame = Frame::new(ArbitrationId::standard(0x123), vec![0xAB, 0x01], 7, NodeId::new(3))
            .unwrap()
            .with_sequence(4);
        assert_eq!(
            frame.to_string(),
            "Frame(id=0x123, data=AB01, dlc=2, ts=7ns, src=node-3, seq=4)"
        );

        let event = Event::new(
            Severity::Warning,
            EventKind::MissedDeadline,
            Some(ArbitrationId::standard(0x100)),
            260,
            "late",
        );
        assert_eq!(event.to_string(), "WARNING[0x100] missed_deadline @260ns: late");
    }

    #[test]
    fn signal_value_integer_view() {
        assert_eq!(SignalValue::Int(7).as_i64(), Some(7));
        assert_eq!(SignalValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(SignalValue::Float(3.5).as_i64(), None);
        assert_eq!(SignalValue::Text("x".into()).as_i64(), None);
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
    }
}
