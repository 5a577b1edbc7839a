//! In-process broadcast bus.
//!
//! The bus keeps an ordered list of observers and hands every published frame
//! to each of them synchronously, in attachment order. It stores nothing,
//! transforms nothing and filters nothing. An observer that fails is logged and
//! counted; the rest still receive the frame and nothing is retried.
//!
//! Observers can only be attached or detached through `&mut Bus`, so the list
//! never changes in the middle of a publish.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use vbus_types::Frame;

// ============================================================================
// Observer
// ============================================================================

/// Transient failure of a single observer. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("observer buffer full (capacity {capacity})")]
    BufferFull { capacity: usize },

    #[error("observer rejected frame: {0}")]
    Rejected(String),
}

/// A consumer of published frames.
pub trait Observer {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError>;

    /// Name used in logs.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("observer")
    }
}

/// Lets a caller keep a handle on an observer after attaching it.
impl<O: Observer> Observer for Rc<RefCell<O>> {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        self.borrow_mut().on_frame(frame)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(self.borrow().name().into_owned())
    }
}

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F> {
    name: String,
    f: F,
}

impl<F> FnObserver<F>
where
    F: FnMut(&Frame) -> Result<(), DeliveryError>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Observer for FnObserver<F>
where
    F: FnMut(&Frame) -> Result<(), DeliveryError>,
{
    fn on_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        (self.f)(frame)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}

// ============================================================================
// Bus
// ============================================================================

/// Identifies an attached observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Bus-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub frames_published: u64,
    pub bytes_published: u64,
    pub delivery_failures: u64,
}

struct Attached {
    handle: ObserverHandle,
    /// Captured at attach time so failure logs never borrow a shared observer.
    name: String,
    observer: Box<dyn Observer>,
}

/// Broadcast channel with ordered synchronous fan-out.
#[derive(Default)]
pub struct Bus {
    observers: Vec<Attached>,
    next_handle: u64,
    stats: BusStats,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer to the fan-out list.
    pub fn attach(&mut self, observer: impl Observer + 'static) -> ObserverHandle {
        self.attach_boxed(Box::new(observer))
    }

    pub fn attach_boxed(&mut self, observer: Box<dyn Observer>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        let name = observer.name().into_owned();
        self.observers.push(Attached {
            handle,
            name,
            observer,
        });
        handle
    }

    /// Removes an observer, handing it back to the caller.
    ///
    /// Returns `None` if the handle is unknown or was already detached.
    pub fn detach(&mut self, handle: ObserverHandle) -> Option<Box<dyn Observer>> {
        let index = self.observers.iter().position(|a| a.handle == handle)?;
        Some(self.observers.remove(index).observer)
    }

    /// Name an attached observer reported when it was attached.
    pub fn observer_name(&self, handle: ObserverHandle) -> Option<&str> {
        self.observers
            .iter()
            .find(|a| a.handle == handle)
            .map(|a| a.name.as_str())
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Delivers `frame` to every observer in attachment order.
    pub fn publish(&mut self, frame: &Frame) -> Delivery {
        self.stats.frames_published += 1;
        self.stats.bytes_published += frame.data().len() as u64;

        let mut delivery = Delivery::default();
        for attached in &mut self.observers {
            match attached.observer.on_frame(frame) {
                Ok(()) => delivery.delivered += 1,
                Err(error) => {
                    delivery.failed += 1;
                    self.stats.delivery_failures += 1;
                    warn!(
                        observer = attached.name.as_str(),
                        handle = attached.handle.0,
                        sequence = frame.sequence(),
                        %error,
                        "frame delivery failed"
                    );
                }
            }
        }
        delivery
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("observers", &self.observers.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
