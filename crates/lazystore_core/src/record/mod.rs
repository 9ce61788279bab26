//! Record instances held in the store arena.
//!
//! # Responsibility
//! - Hold the identity, field slots and inverse-reference index of one record.
//! - Expose the opaque `RecordId` handle callers use to address records.
//!
//! # Invariants
//! - `local_id` never changes after creation.
//! - `uses` mirrors every relation slot elsewhere that currently holds this
//!   record: `uses[other][field]` is the number of occurrences.
//! - A `RecordId` is never reused, so a stale handle can only miss.

pub mod list;

use crate::model::schema::ModelSchema;
use crate::model::value::Value;
use indexmap::IndexMap;
use list::RecordList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Opaque handle of a record inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// True when `ids` holds this record.
    pub fn in_list(self, ids: &[RecordId]) -> bool {
        ids.contains(&self)
    }

    pub fn not_in_list(self, ids: &[RecordId]) -> bool {
        !self.in_list(ids)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordState {
    Active,
    /// Queued for soft delete; no further recomputation.
    Deleting,
}

/// Stored value of one field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SlotValue {
    Attr(Value),
    Relation(RecordList),
}

/// Per-record runtime storage of one declared field.
#[derive(Debug, Clone)]
pub(crate) struct FieldSlot {
    pub(crate) value: SlotValue,
    /// Lazy compute invalidated since last read.
    pub(crate) stale: bool,
}

impl FieldSlot {
    pub(crate) fn new(value: SlotValue) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    pub(crate) fn list(&self) -> Option<&RecordList> {
        match &self.value {
            SlotValue::Relation(list) => Some(list),
            SlotValue::Attr(_) => None,
        }
    }

    pub(crate) fn list_mut(&mut self) -> Option<&mut RecordList> {
        match &mut self.value {
            SlotValue::Relation(list) => Some(list),
            SlotValue::Attr(_) => None,
        }
    }
}

/// One entity instance.
#[derive(Debug)]
pub(crate) struct Record {
    pub(crate) id: RecordId,
    pub(crate) schema: Rc<ModelSchema>,
    pub(crate) local_id: String,
    pub(crate) fields: IndexMap<String, FieldSlot>,
    pub(crate) uses: BTreeMap<RecordId, BTreeMap<String, u32>>,
    pub(crate) state: RecordState,
}

impl Record {
    pub(crate) fn new(
        id: RecordId,
        schema: Rc<ModelSchema>,
        local_id: String,
        fields: IndexMap<String, FieldSlot>,
    ) -> Self {
        Self {
            id,
            schema,
            local_id,
            fields,
            uses: BTreeMap::new(),
            state: RecordState::Active,
        }
    }

    pub(crate) fn model(&self) -> &str {
        self.schema.name()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }

    pub(crate) fn add_use(&mut self, other: RecordId, field: &str) {
        *self
            .uses
            .entry(other)
            .or_default()
            .entry(field.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn remove_use(&mut self, other: RecordId, field: &str) {
        let Some(fields) = self.uses.get_mut(&other) else {
            return;
        };
        if let Some(count) = fields.get_mut(field) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                fields.remove(field);
            }
        }
        if fields.is_empty() {
            self.uses.remove(&other);
        }
    }

    /// Flattened copy of the inverse index as `(other, field, count)`.
    pub(crate) fn uses_snapshot(&self) -> Vec<(RecordId, String, u32)> {
        self.uses
            .iter()
            .flat_map(|(other, fields)| {
                fields
                    .iter()
                    .map(move |(field, count)| (*other, field.clone(), *count))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldSlot, Record, RecordId, SlotValue};
    use crate::model::schema::ModelSchema;
    use crate::model::value::Value;
    use indexmap::IndexMap;
    use std::rc::Rc;

    fn record() -> Record {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), FieldSlot::new(SlotValue::Attr(Value::Int(1))));
        Record::new(
            RecordId::from_raw(1),
            Rc::new(ModelSchema::new("Person")),
            "Person,1".to_string(),
            fields,
        )
    }

    #[test]
    fn uses_index_counts_and_prunes() {
        let mut record = record();
        let other = RecordId::from_raw(2);
        record.add_use(other, "friends");
        record.add_use(other, "friends");
        record.add_use(other, "manager");
        assert_eq!(record.uses_snapshot().len(), 2);

        record.remove_use(other, "friends");
        record.remove_use(other, "friends");
        record.remove_use(other, "manager");
        assert!(record.uses.is_empty());
    }

    #[test]
    fn in_list_compares_underlying_ids() {
        let a = RecordId::from_raw(1);
        let b = RecordId::from_raw(2);
        assert!(a.in_list(&[b, a]));
        assert!(a.not_in_list(&[b]));
        assert_eq!(a.to_string(), "#1");
        assert_eq!(record().model(), "Person");
    }
}
