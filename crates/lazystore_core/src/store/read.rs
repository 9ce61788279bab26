//! Field reads and on-demand computation.
//!
//! Every read is recorded in the innermost tracking frame, so a compute or
//! sort comparator depends on exactly the fields it read last time it ran.

use super::write::descriptor;
use super::Store;
use crate::error::{StoreError, StoreResult};
use crate::model::value::Value;
use crate::reactive::{Dependent, FieldKey};
use crate::record::list::RecordList;
use crate::record::{FieldSlot, RecordId, SlotValue};

impl Store {
    /// Reads an attribute.
    ///
    /// # Errors
    /// - `TypeMismatch` for relation fields; use `get_one`/`get_many`.
    pub fn get_value(&mut self, record: RecordId, field: &str) -> StoreResult<Value> {
        let value = match &self.read_slot(record, field)?.value {
            SlotValue::Attr(value) => Some(value.clone()),
            SlotValue::Relation(_) => None,
        };
        value.ok_or_else(|| self.kind_mismatch(record, field, "relation"))
    }

    /// Reads a relation as its single target.
    pub fn get_one(&mut self, record: RecordId, field: &str) -> StoreResult<Option<RecordId>> {
        Ok(self.get_list(record, field)?.one())
    }

    pub fn get_many(&mut self, record: RecordId, field: &str) -> StoreResult<Vec<RecordId>> {
        Ok(self.get_list(record, field)?.ids().to_vec())
    }

    pub fn get_list(&mut self, record: RecordId, field: &str) -> StoreResult<RecordList> {
        let list = match &self.read_slot(record, field)?.value {
            SlotValue::Relation(list) => Some(list.clone()),
            SlotValue::Attr(_) => None,
        };
        list.ok_or_else(|| self.kind_mismatch(record, field, "attribute"))
    }

    pub(crate) fn read_slot(&mut self, record: RecordId, field: &str) -> StoreResult<&FieldSlot> {
        let key = FieldKey::new(record, field);
        self.ensure_fresh(&key)?;
        self.tracker.record(&key);
        let record = self.record(record)?;
        record
            .fields
            .get(field)
            .ok_or_else(|| StoreError::UnknownField {
                model: record.model().to_string(),
                field: field.to_string(),
            })
    }

    /// Computes a stale lazy field before it is read.
    ///
    /// A field read from inside its own computation keeps its cached value.
    fn ensure_fresh(&mut self, key: &FieldKey) -> StoreResult<()> {
        let stale = self
            .record(key.record)?
            .fields
            .get(&key.field)
            .is_some_and(|slot| slot.stale);
        if !stale || self.computing.contains(key) {
            return Ok(());
        }
        self.batch(|store| store.compute_field(key))
    }

    /// Runs the compute function of `key` and stores its result.
    ///
    /// The reads it performed replace the previous dependencies of `key`.
    pub(crate) fn compute_field(&mut self, key: &FieldKey) -> StoreResult<()> {
        let Some(record) = self.records.get(&key.record) else {
            return Ok(());
        };
        if !record.is_active() {
            return Ok(());
        }
        let schema = record.schema.clone();
        let Some(compute) = descriptor(&schema, &key.field)?.compute_fn().cloned() else {
            return Ok(());
        };
        if !self.computing.insert(key.clone()) {
            return Ok(());
        }

        self.tracker.push();
        let result = compute(self, key.record);
        let mut reads = self.tracker.pop();
        self.computing.remove(key);
        let input = result?;

        reads.remove(key);
        self.deps.subscribe(Dependent::compute(key.clone()), reads);
        self.slot_mut(key)?.stale = false;
        self.write_field(key.record, &key.field, input)
    }

    fn kind_mismatch(&self, record: RecordId, field: &str, actual: &str) -> StoreError {
        StoreError::TypeMismatch {
            model: self.model_of(record).unwrap_or_default().to_string(),
            field: field.to_string(),
            message: format!("field is an {actual}"),
        }
    }
}
