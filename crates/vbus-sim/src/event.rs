//! Schedule entries and the ordered event queue.
//!
//! Entries pop in `(fire_time, node_id, arbitration_id, insertion sequence)`
//! order. The insertion sequence makes ties fully deterministic even for
//! entries that agree on every other field (burst copies of one frame, for
//! example).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use vbus_types::{ArbitrationId, Frame, NodeId};

// ============================================================================
// Entries
// ============================================================================

/// What happens when an entry fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Periodic emission of `nodes[node].messages[message]`.
    ///
    /// The candidate frame is synthesized when the entry fires and goes
    /// through fault injection.
    Periodic { node: usize, message: usize },

    /// A frame that already went through fault injection (delayed,
    /// jittered or an injected copy). Published as-is at the fire time.
    Deliver(Frame),
}

/// A pending emission in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub fire_time: u64,
    pub node_id: NodeId,
    pub arbitration_id: ArbitrationId,
    pub kind: EntryKind,
    /// Insertion order, assigned by the queue.
    pub(crate) seq: u64,
}

impl ScheduleEntry {
    fn order_key(&self) -> (u64, NodeId, ArbitrationId, u64) {
        (self.fire_time, self.node_id, self.arbitration_id, self.seq)
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self.kind, EntryKind::Periodic { .. })
    }
}

impl Ord for ScheduleEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the smallest key pops first.
        other.order_key().cmp(&self.order_key())
    }
}

impl PartialOrd for ScheduleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Min-ordered queue of schedule entries.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduleEntry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry and returns its insertion sequence.
    pub fn schedule(
        &mut self,
        fire_time: u64,
        node_id: NodeId,
        arbitration_id: ArbitrationId,
        kind: EntryKind,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduleEntry {
            fire_time,
            node_id,
            arbitration_id,
            kind,
            seq,
        });
        seq
    }

    /// Schedules delivery of an already-decided frame at `fire_time`.
    pub fn schedule_frame(&mut self, fire_time: u64, frame: Frame) -> u64 {
        let node = frame.source_node();
        let id = frame.arbitration_id();
        self.schedule(fire_time, node, id, EntryKind::Deliver(frame))
    }

    pub fn pop(&mut self) -> Option<ScheduleEntry> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&ScheduleEntry> {
        self.heap.peek()
    }

    /// Fire time of the next entry, if any.
    pub fn next_time(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.fire_time)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Removes every pending entry, returning how many were discarded.
    pub fn drain(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn periodic(queue: &mut EventQueue, t: u64, node: u32, id: u16) -> u64 {
        queue.schedule(
            t,
            NodeId::new(node),
            ArbitrationId::standard(id),
            EntryKind::Periodic { node: 0, message: 0 },
        )
    }

    #[test]
    fn pops_by_time_first() {
        let mut q = EventQueue::new();
        periodic(&mut q, 300, 1, 0x100);
        periodic(&mut q, 100, 1, 0x100);
        periodic(&mut q, 200, 1, 0x100);

        let times: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.fire_time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn ties_break_on_node_then_id_then_insertion() {
        let mut q = EventQueue::new();
        let late_insert = periodic(&mut q, 10, 2, 0x050);
        periodic(&mut q, 10, 1, 0x300);
        periodic(&mut q, 10, 1, 0x200);
        let first_dup = periodic(&mut q, 10, 3, 0x100);
        let second_dup = periodic(&mut q, 10, 3, 0x100);

        let order: Vec<_> = std::iter::from_fn(|| q.pop())
            .map(|e| (e.node_id.as_raw(), e.arbitration_id.as_raw(), e.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, 0x200, 2),
                (1, 0x300, 1),
                (2, 0x050, late_insert),
                (3, 0x100, first_dup),
                (3, 0x100, second_dup),
            ]
        );
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = EventQueue::new();
        periodic(&mut q, 1, 1, 1);
        periodic(&mut q, 2, 1, 1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.drain(), 2);
        assert!(q.is_empty());
        assert_eq!(q.next_time(), None);
    }

    proptest! {
        #[test]
        fn pop_order_is_sorted(entries in prop::collection::vec((0u64..1_000, 0u32..4, 0u16..8), 1..64)) {
            let mut q = EventQueue::new();
            for (t, node, id) in &entries {
                periodic(&mut q, *t, *node, *id);
            }
            let keys: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.order_key()).collect();
            prop_assert_eq!(keys.len(), entries.len());
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
