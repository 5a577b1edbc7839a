//! JSON Lines capture files.
//!
//! A capture holds one serialized [`Frame`] per line, in publish order. Event
//! streams use the same layout with one [`Event`] per line. Blank lines are
//! ignored; any other line that fails to parse (typically a truncated final
//! line) is reported with its 1-based line number.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use vbus_types::{Event, Frame};

use crate::bus::{DeliveryError, Observer};
use crate::error::SimError;

// ============================================================================
// Writer
// ============================================================================

/// Bus observer that appends each frame as one JSON line.
pub struct CaptureWriter<W: Write> {
    out: W,
    written: u64,
}

impl CaptureWriter<BufWriter<File>> {
    /// Creates (or truncates) a capture file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SimError> {
        self.out.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W, SimError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Observer for CaptureWriter<W> {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        write_line(&mut self.out, frame).map_err(|e| DeliveryError::Rejected(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("capture")
    }
}

impl<W: Write> std::fmt::Debug for CaptureWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureWriter")
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

fn write_line<T: Serialize>(out: &mut impl Write, value: &T) -> Result<(), SimError> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

// ============================================================================
// Bulk Read / Write
// ============================================================================

fn read_lines<T: DeserializeOwned>(reader: impl BufRead) -> Result<Vec<T>, SimError> {
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .map_err(|e| SimError::malformed(Some(i + 1), format!("line {}: {e}", i + 1)))?;
        items.push(item);
    }
    Ok(items)
}

fn write_lines<'a, T: Serialize + 'a>(
    mut out: impl Write,
    items: impl IntoIterator<Item = &'a T>,
) -> Result<(), SimError> {
    for item in items {
        write_line(&mut out, item)?;
    }
    out.flush()?;
    Ok(())
}

/// Parses a frame capture.
pub fn read_frames(reader: impl BufRead) -> Result<Vec<Frame>, SimError> {
    read_lines(reader)
}

pub fn read_frames_from_path(path: impl AsRef<Path>) -> Result<Vec<Frame>, SimError> {
    let file = File::open(path)?;
    read_frames(BufReader::new(file))
}

pub fn write_frames<'a>(
    out: impl Write,
    frames: impl IntoIterator<Item = &'a Frame>,
) -> Result<(), SimError> {
    write_lines(out, frames)
}

/// Parses an event stream.
pub fn read_events(reader: impl BufRead) -> Result<Vec<Event>, SimError> {
    read_lines(reader)
}

pub fn write_events<'a>(
    out: impl Write,
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<(), SimError> {
    write_lines(out, events)
}

pub fn write_events_to_path(path: impl AsRef<Path>, events: &[Event]) -> Result<(), SimError> {
    let file = File::create(path)?;
    write_events(BufWriter::new(file), events)
}
