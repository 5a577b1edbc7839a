//! Error types for simulation and replay.

use thiserror::Error;
use vbus_types::FrameError;

/// Fatal errors raised before or during a run.
///
/// Observer delivery failures are not represented here: they are transient,
/// counted by the bus, and never abort a run.
#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario failed validation. `field` is a dotted path such as
    /// `nodes[1].messages[0].jitter_ns`.
    #[error("invalid configuration at {field}: {reason}")]
    Configuration { field: String, reason: String },

    /// A captured frame sequence cannot be replayed.
    #[error("malformed capture{}: {reason}", at_index(.index))]
    MalformedCapture { index: Option<usize>, reason: String },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn at_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" at index {i}")).unwrap_or_default()
}

impl SimError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(index: Option<usize>, reason: impl Into<String>) -> Self {
        Self::MalformedCapture {
            index,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<postcard::Error> for SimError {
    fn from(err: postcard::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_names_the_field() {
        let err = SimError::config("nodes[1].messages[0].jitter_ns", "must be below period");
        assert_eq!(
            err.to_string(),
            "invalid configuration at nodes[1].messages[0].jitter_ns: must be below period"
        );
    }

    #[test]
    fn malformed_capture_message_with_and_without_index() {
        assert_eq!(
            SimError::malformed(Some(3), "truncated").to_string(),
            "malformed capture at index 3: truncated"
        );
        assert_eq!(
            SimError::malformed(None, "empty").to_string(),
            "malformed capture: empty"
        );
    }
}
