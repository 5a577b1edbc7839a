//! Fingerprint of a published frame sequence.
//!
//! Each frame is encoded with postcard and fed into a running BLAKE3 hash.
//! Two runs published byte-identical sequences exactly when their digests
//! match, which lets determinism and replay equivalence be checked from
//! summaries alone.

use vbus_types::Frame;

use crate::error::SimError;

/// Running digest over published frames.
#[derive(Debug, Clone)]
pub struct FrameDigest {
    hasher: blake3::Hasher,
    frames: u64,
}

impl FrameDigest {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            frames: 0,
        }
    }

    pub fn update(&mut self, frame: &Frame) -> Result<(), SimError> {
        let bytes = postcard::to_allocvec(frame)?;
        self.hasher.update(&bytes);
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Hex-encoded digest of everything seen so far.
    pub fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// Digest of a complete sequence.
    pub fn of<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Result<String, SimError> {
        let mut digest = Self::new();
        for frame in frames {
            digest.update(frame)?;
        }
        Ok(digest.hex())
    }
}

impl Default for FrameDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbus_types::{ArbitrationId, NodeId};

    fn frame(seq: u64, byte: u8) -> Frame {
        Frame::new(ArbitrationId::standard(0x10), vec![byte], seq, NodeId::new(1))
            .unwrap()
            .with_sequence(seq)
    }

    #[test]
    fn identical_sequences_match() {
        let a = [frame(0, 1), frame(1, 2)];
        let b = a.clone();
        assert_eq!(FrameDigest::of(&a).unwrap(), FrameDigest::of(&b).unwrap());
    }

    #[test]
    fn any_difference_changes_digest() {
        let a = [frame(0, 1), frame(1, 2)];
        let b = [frame(0, 1), frame(1, 3)];
        let c = [frame(1, 2), frame(0, 1)];
        let da = FrameDigest::of(&a).unwrap();
        assert_ne!(da, FrameDigest::of(&b).unwrap());
        assert_ne!(da, FrameDigest::of(&c).unwrap());
    }

    #[test]
    fn counts_frames() {
        let mut digest = FrameDigest::new();
        digest.update(&frame(0, 0)).unwrap();
        assert_eq!(digest.frames(), 1);
        assert_eq!(digest.hex().len(), 64);
    }
}
