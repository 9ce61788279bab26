//! Unit of work: batching depth and deferred effect queues.
//!
//! # Responsibility
//! - Track reentrant batch depth and whether a drain is running.
//! - Hold the eight deduplicated effect queues between drain passes.
//!
//! # Invariants
//! - Only the outermost batch exit outside a drain asks for a drain.
//! - Each queue keeps first-enqueue order and holds a subject at most once.
//! - One unit of work per store; there is no process-wide scheduler state.

use crate::reactive::{FieldKey, ObserverId};
use crate::record::RecordId;
use indexmap::IndexSet;

/// Deferred effects, drained in declaration order.
#[derive(Debug, Default)]
pub(crate) struct Queues {
    /// Fields to recompute.
    pub(crate) recompute: IndexSet<FieldKey>,
    /// Fields to re-sort.
    pub(crate) resort: IndexSet<FieldKey>,
    /// `on_add` hooks, keyed by relation and added record.
    pub(crate) added: IndexSet<(FieldKey, RecordId)>,
    /// `on_delete` hooks, keyed by relation and removed record.
    pub(crate) removed: IndexSet<(FieldKey, RecordId)>,
    /// `on_update` hooks.
    pub(crate) updated: IndexSet<FieldKey>,
    pub(crate) observers: IndexSet<ObserverId>,
    pub(crate) soft_deletes: IndexSet<RecordId>,
    pub(crate) hard_deletes: IndexSet<RecordId>,
}

impl Queues {
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn len(&self) -> usize {
        self.recompute.len()
            + self.resort.len()
            + self.added.len()
            + self.removed.len()
            + self.updated.len()
            + self.observers.len()
            + self.soft_deletes.len()
            + self.hard_deletes.len()
    }

    /// Puts `front` ahead of every entry already queued.
    fn prepend(&mut self, front: Queues) {
        merge_front(&mut self.recompute, front.recompute);
        merge_front(&mut self.resort, front.resort);
        merge_front(&mut self.added, front.added);
        merge_front(&mut self.removed, front.removed);
        merge_front(&mut self.updated, front.updated);
        merge_front(&mut self.observers, front.observers);
        merge_front(&mut self.soft_deletes, front.soft_deletes);
        merge_front(&mut self.hard_deletes, front.hard_deletes);
    }
}

fn merge_front<T: std::hash::Hash + Eq>(queue: &mut IndexSet<T>, mut front: IndexSet<T>) {
    front.extend(std::mem::take(queue));
    *queue = front;
}

/// Removes and returns the oldest entry of a queue.
pub(crate) fn pop_front<T: std::hash::Hash + Eq>(queue: &mut IndexSet<T>) -> Option<T> {
    queue.shift_remove_index(0)
}

/// Per-store transactional scheduler state.
#[derive(Debug, Default)]
pub(crate) struct UnitOfWork {
    depth: u32,
    draining: bool,
    queues: Queues,
}

impl UnitOfWork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leaves one batch level. Returns true when the caller must drain.
    pub(crate) fn exit(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0 && !self.draining
    }

    /// True when no batch is open and no drain runs.
    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.depth == 0 && !self.draining
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn begin_drain(&mut self) {
        self.draining = true;
    }

    pub(crate) fn end_drain(&mut self) {
        self.draining = false;
    }

    pub(crate) fn queues_mut(&mut self) -> &mut Queues {
        &mut self.queues
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Snapshots and clears every queue for one drain pass.
    pub(crate) fn take_pass(&mut self) -> Option<Queues> {
        if self.queues.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.queues))
    }

    /// Returns the unprocessed rest of an aborted pass to the queues.
    pub(crate) fn requeue(&mut self, rest: Queues) {
        self.queues.prepend(rest);
    }
}
