//! Explicit dependency tracking between fields, computations and observers.
//!
//! # Responsibility
//! - Record which field reads a computation or sort comparator performed.
//! - Answer "who depends on this field" when the field is written.
//! - Keep the registry of change observers.
//!
//! # Invariants
//! - `readers` and `sources` are exact inverses of each other.
//! - Re-running a computation replaces its previous dependency set.
//! - Removing a record removes every edge that mentions it.

use crate::error::StoreResult;
use crate::record::RecordId;
use crate::store::Store;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// One field of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub record: RecordId,
    pub field: String,
}

impl FieldKey {
    pub fn new(record: RecordId, field: impl Into<String>) -> Self {
        Self {
            record,
            field: field.into(),
        }
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

/// What a dependent re-runs when a source field changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum DependentKind {
    Compute,
    Sort,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Dependent {
    pub(crate) key: FieldKey,
    pub(crate) kind: DependentKind,
}

impl Dependent {
    pub(crate) fn compute(key: FieldKey) -> Self {
        Self {
            key,
            kind: DependentKind::Compute,
        }
    }

    pub(crate) fn sort(key: FieldKey) -> Self {
        Self {
            key,
            kind: DependentKind::Sort,
        }
    }
}

/// Field → dependents adjacency, with its inverse.
#[derive(Debug, Default)]
pub(crate) struct DependencyIndex {
    readers: HashMap<FieldKey, BTreeSet<Dependent>>,
    sources: HashMap<Dependent, BTreeSet<FieldKey>>,
}

impl DependencyIndex {
    /// Replaces the dependency set of `dependent` with `reads`.
    pub(crate) fn subscribe(&mut self, dependent: Dependent, reads: BTreeSet<FieldKey>) {
        self.unsubscribe(&dependent);
        for key in &reads {
            self.readers
                .entry(key.clone())
                .or_default()
                .insert(dependent.clone());
        }
        if !reads.is_empty() {
            self.sources.insert(dependent, reads);
        }
    }

    pub(crate) fn unsubscribe(&mut self, dependent: &Dependent) {
        let Some(reads) = self.sources.remove(dependent) else {
            return;
        };
        for key in reads {
            if let Some(readers) = self.readers.get_mut(&key) {
                readers.remove(dependent);
                if readers.is_empty() {
                    self.readers.remove(&key);
                }
            }
        }
    }

    pub(crate) fn dependents_of(&self, key: &FieldKey) -> Vec<Dependent> {
        self.readers
            .get(key)
            .map(|readers| readers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_dependents(&self, key: &FieldKey) -> bool {
        self.readers.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn sources_of(&self, dependent: &Dependent) -> Option<&BTreeSet<FieldKey>> {
        self.sources.get(dependent)
    }

    /// Drops every edge whose dependent or source belongs to `record`.
    pub(crate) fn forget_record(&mut self, record: RecordId) {
        let owned = self
            .sources
            .keys()
            .filter(|dependent| dependent.key.record == record)
            .cloned()
            .collect::<Vec<_>>();
        for dependent in owned {
            self.unsubscribe(&dependent);
        }

        let read_keys = self
            .readers
            .keys()
            .filter(|key| key.record == record)
            .cloned()
            .collect::<Vec<_>>();
        for key in read_keys {
            let Some(readers) = self.readers.remove(&key) else {
                continue;
            };
            for dependent in readers {
                if let Some(sources) = self.sources.get_mut(&dependent) {
                    sources.remove(&key);
                    if sources.is_empty() {
                        self.sources.remove(&dependent);
                    }
                }
            }
        }
    }
}

/// Stack of read sets, one frame per running computation.
#[derive(Debug, Default)]
pub(crate) struct ReadTracker {
    frames: Vec<BTreeSet<FieldKey>>,
}

impl ReadTracker {
    pub(crate) fn push(&mut self) {
        self.frames.push(BTreeSet::new());
    }

    pub(crate) fn pop(&mut self) -> BTreeSet<FieldKey> {
        self.frames.pop().unwrap_or_default()
    }

    pub(crate) fn record(&mut self, key: &FieldKey) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(key.clone());
        }
    }
}

/// Handle of a registered change observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Observer callback, called with the observed record.
pub type ObserverFn = Rc<dyn Fn(&mut Store, RecordId) -> StoreResult<()>>;

struct Observer {
    record: RecordId,
    keys: Vec<FieldKey>,
    callback: ObserverFn,
}

/// Registered change observers and the fields they watch.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: u64,
    observers: HashMap<ObserverId, Observer>,
    watchers: HashMap<FieldKey, BTreeSet<ObserverId>>,
}

impl ObserverRegistry {
    pub(crate) fn add(
        &mut self,
        record: RecordId,
        keys: Vec<FieldKey>,
        callback: ObserverFn,
    ) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        for key in &keys {
            self.watchers.entry(key.clone()).or_default().insert(id);
        }
        self.observers.insert(
            id,
            Observer {
                record,
                keys,
                callback,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let Some(observer) = self.observers.remove(&id) else {
            return false;
        };
        for key in observer.keys {
            if let Some(ids) = self.watchers.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.watchers.remove(&key);
                }
            }
        }
        true
    }

    pub(crate) fn watchers_of(&self, key: &FieldKey) -> Vec<ObserverId> {
        self.watchers
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_watchers(&self, key: &FieldKey) -> bool {
        self.watchers.contains_key(key)
    }

    pub(crate) fn get(&self, id: ObserverId) -> Option<(RecordId, ObserverFn)> {
        self.observers
            .get(&id)
            .map(|observer| (observer.record, observer.callback.clone()))
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    /// Removes every observer bound to `record`.
    pub(crate) fn forget_record(&mut self, record: RecordId) {
        let ids = self
            .observers
            .iter()
            .filter(|(_, observer)| observer.record == record)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in ids {
            self.remove(id);
        }
    }
}
