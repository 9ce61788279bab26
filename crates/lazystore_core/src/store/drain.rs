//! Effect drain.
//!
//! # Responsibility
//! - Run queued effects pass by pass until every queue is empty.
//! - Perform soft and hard deletes.
//!
//! # Invariants
//! - Within one pass effects run in queue order: recompute, resort, add
//!   hooks, delete hooks, update hooks, observers, soft deletes, hard deletes.
//! - Effects enqueued while a pass runs belong to the next pass.
//! - The number of passes is bounded by `StoreConfig::max_drain_passes`.
//! - A failed drain leaves every effect it did not reach queued.

use super::data::FieldInput;
use super::write::descriptor;
use super::Store;
use crate::error::{StoreError, StoreResult};
use crate::model::field::{FieldDescriptor, RelationField};
use crate::model::value::Value;
use crate::reactive::{Dependent, FieldKey};
use crate::record::{Record, RecordId, RecordState, SlotValue};
use crate::scheduler::{pop_front, Queues};
use log::{debug, error};
use std::time::Instant;

impl Store {
    pub(crate) fn drain(&mut self) -> StoreResult<()> {
        if !self.uow.has_pending() {
            return Ok(());
        }
        let started_at = Instant::now();
        self.uow.begin_drain();
        let result = self.drain_passes();
        self.uow.end_drain();

        match &result {
            Ok((passes, effects)) => debug!(
                "event=drain module=store status=ok store_id={} passes={} effects={} duration_ms={}",
                self.id,
                passes,
                effects,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=drain module=store status=error store_id={} error={} duration_ms={}",
                self.id,
                err,
                started_at.elapsed().as_millis()
            ),
        }
        result.map(|_| ())
    }

    fn drain_passes(&mut self) -> StoreResult<(u32, usize)> {
        let mut passes = 0_u32;
        let mut effects = 0_usize;
        while self.uow.has_pending() {
            if passes >= self.config.max_drain_passes {
                return Err(StoreError::DrainLimitExceeded { passes });
            }
            let Some(mut pass) = self.uow.take_pass() else {
                break;
            };
            passes += 1;
            effects += pass.len();
            if let Err(err) = self.run_pass(&mut pass) {
                self.uow.requeue(pass);
                return Err(err);
            }
        }
        Ok((passes, effects))
    }

    /// Consumes `pass` front to back. On error the failing effect is
    /// dropped and whatever is left stays in `pass`.
    fn run_pass(&mut self, pass: &mut Queues) -> StoreResult<()> {
        while let Some(key) = pop_front(&mut pass.recompute) {
            self.refresh(&key)?;
        }
        while let Some(key) = pop_front(&mut pass.resort) {
            self.resort(&key)?;
        }
        while let Some((key, target)) = pop_front(&mut pass.added) {
            if !self.is_active(key.record) {
                continue;
            }
            let hook = self
                .relation_descriptor(&key)?
                .and_then(|relation| relation.on_add.clone());
            if let Some(hook) = hook {
                hook(self, key.record, target)?;
            }
        }
        while let Some((key, target)) = pop_front(&mut pass.removed) {
            if !self.exists(key.record) {
                continue;
            }
            let hook = self
                .relation_descriptor(&key)?
                .and_then(|relation| relation.on_delete.clone());
            if let Some(hook) = hook {
                hook(self, key.record, target)?;
            }
        }
        while let Some(key) = pop_front(&mut pass.updated) {
            if !self.is_active(key.record) {
                continue;
            }
            let schema = self.record(key.record)?.schema.clone();
            if let Some(hook) = descriptor(&schema, &key.field)?.on_update_hook().cloned() {
                hook(self, key.record)?;
            }
        }
        while let Some(id) = pop_front(&mut pass.observers) {
            let Some((record, callback)) = self.observers.get(id) else {
                continue;
            };
            if self.is_active(record) {
                callback(self, record)?;
            }
        }
        while let Some(record) = pop_front(&mut pass.soft_deletes) {
            self.soft_delete(record)?;
        }
        while let Some(record) = pop_front(&mut pass.hard_deletes) {
            self.hard_delete(record);
        }
        Ok(())
    }

    fn is_active(&self, record: RecordId) -> bool {
        self.records.get(&record).is_some_and(Record::is_active)
    }

    fn relation_descriptor(&self, key: &FieldKey) -> StoreResult<Option<RelationField>> {
        let schema = self.record(key.record)?.schema.clone();
        Ok(descriptor(&schema, &key.field)?.as_relation().cloned())
    }

    /// Recomputes an eager field, or a lazy one still marked stale.
    fn refresh(&mut self, key: &FieldKey) -> StoreResult<()> {
        let Some(record) = self.records.get(&key.record) else {
            return Ok(());
        };
        let eager = record
            .schema
            .field(&key.field)
            .is_some_and(FieldDescriptor::is_eager);
        let stale = record.fields.get(&key.field).is_some_and(|slot| slot.stale);
        if eager || stale {
            self.compute_field(key)?;
        }
        Ok(())
    }

    /// Reorders a sorted field.
    ///
    /// Relation comparators are tracked like computes, so a change to any
    /// field they read queues the relation for another resort.
    fn resort(&mut self, key: &FieldKey) -> StoreResult<()> {
        if !self.is_active(key.record) {
            return Ok(());
        }
        let schema = self.record(key.record)?.schema.clone();
        match descriptor(&schema, &key.field)? {
            FieldDescriptor::Relation(relation) => {
                let Some(order) = relation.sort.clone() else {
                    return Ok(());
                };
                let mut ids = self.relation_ids(key)?;
                self.tracker.push();
                ids.sort_by(|a, b| order(self, *a, *b));
                let reads = self.tracker.pop();
                self.deps.subscribe(Dependent::sort(key.clone()), reads);

                if self.list_mut(key)?.reorder(ids) {
                    self.field_changed(key)?;
                }
            }
            FieldDescriptor::Attr(attr) => {
                let Some(order) = attr.sort.clone() else {
                    return Ok(());
                };
                let changed = match &mut self.slot_mut(key)?.value {
                    SlotValue::Attr(Value::List(items)) => {
                        let before = items.clone();
                        items.sort_by(|a, b| order(a, b));
                        *items != before
                    }
                    _ => false,
                };
                if changed {
                    self.field_changed(key)?;
                }
            }
        }
        Ok(())
    }

    /// Clears every field of `record` and strips it from every relation
    /// that still references it, then queues the hard delete.
    fn soft_delete(&mut self, id: RecordId) -> StoreResult<()> {
        let Some(record) = self.records.get_mut(&id) else {
            return Ok(());
        };
        record.state = RecordState::Deleting;
        let schema = record.schema.clone();

        for (field, descriptor) in schema.fields() {
            let key = FieldKey::new(id, field);
            if descriptor.is_computed() {
                self.deps.unsubscribe(&Dependent::compute(key.clone()));
            }
            if descriptor.has_sort() {
                self.deps.unsubscribe(&Dependent::sort(key));
            }
        }
        for (field, _) in schema.fields() {
            self.write_field(id, field, FieldInput::null())?;
        }

        for (other, field, count) in self.record(id)?.uses_snapshot() {
            let Some(other_schema) = self.records.get(&other).map(|other| other.schema.clone())
            else {
                debug!(
                    "event=inverse_cleanup module=store status=skip store_id={} record={} other={} field={}",
                    self.id, id, other, field
                );
                continue;
            };
            let Some(relation) = descriptor(&other_schema, &field)?.as_relation() else {
                continue;
            };
            for _ in 0..count {
                self.unlink(other, &field, relation, id)?;
            }
        }

        self.uow.queues_mut().hard_deletes.insert(id);
        debug!(
            "event=record_soft_delete module=store status=ok store_id={} record={}",
            self.id, id
        );
        Ok(())
    }

    /// Removes `id` from the arena and from both indices.
    fn hard_delete(&mut self, id: RecordId) {
        let Some(record) = self.records.remove(&id) else {
            return;
        };
        self.unindex_record(record.model(), &record.local_id, record.id);
        self.deps.forget_record(record.id);
        self.observers.forget_record(record.id);
        debug!(
            "event=record_delete module=store status=ok store_id={} model={} record={} local_id={}",
            self.id,
            record.model(),
            record.id,
            record.local_id
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::model::field::{attr, many};
    use crate::model::identity::Identity;
    use crate::model::schema::{ModelSchema, SchemaRegistry};
    use crate::model::value::Value;
    use crate::store::data::Data;
    use crate::store::Store;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                ModelSchema::new("Team")
                    .with_identity(Identity::field("id"))
                    .with_field("id", attr())
                    .with_field(
                        "members",
                        many("Member").sort(|store, a, b| {
                            let left = store.get_value(a, "name").unwrap_or_default();
                            let right = store.get_value(b, "name").unwrap_or_default();
                            left.total_cmp(&right)
                        }),
                    )
                    .with_field("tags", attr().sort(|a, b| a.total_cmp(b))),
            )
            .and_then(|registry| {
                registry.with(
                    ModelSchema::new("Member")
                        .with_identity(Identity::field("id"))
                        .with_field("id", attr())
                        .with_field("name", attr())
                        .with_field(
                            "counter",
                            attr().with_default(0).on_update(|store, member| {
                                let counter = store.get_value(member, "counter")?;
                                store.set(member, "counter", counter.as_i64().unwrap_or(0) + 1)
                            }),
                        ),
                )
            })
            .expect("schemas should register")
    }

    #[test]
    fn sorted_relation_follows_comparator_reads() {
        let mut store = Store::with_defaults(registry()).expect("store");
        let team = store.insert("Team", 1).expect("team");
        let zoe = store
            .insert("Member", Data::new().with("id", 1).with("name", "Zoe"))
            .expect("zoe");
        let amy = store
            .insert("Member", Data::new().with("id", 2).with("name", "Amy"))
            .expect("amy");
        store.set(team, "members", vec![zoe, amy]).expect("members");
        assert_eq!(store.get_many(team, "members").expect("read"), vec![amy, zoe]);

        store.set(amy, "name", "Zura").expect("rename");
        assert_eq!(store.get_many(team, "members").expect("read"), vec![zoe, amy]);
    }

    #[test]
    fn sorted_list_attribute_is_kept_ordered() {
        let mut store = Store::with_defaults(registry()).expect("store");
        let team = store
            .insert(
                "Team",
                Data::new()
                    .with("id", 1)
                    .with("tags", Value::List(vec![Value::from("b"), Value::from("a")])),
            )
            .expect("team");
        assert_eq!(
            store.get_value(team, "tags").expect("read"),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn self_feeding_hook_hits_drain_limit() {
        let config = StoreConfig {
            max_drain_passes: 5,
            ..StoreConfig::default()
        };
        let mut store = Store::new(registry(), config).expect("store");
        let member = store.insert("Member", 1).expect("member");
        let err = store
            .set(member, "counter", 1)
            .expect_err("hook keeps re-queueing itself");
        assert_eq!(err, StoreError::DrainLimitExceeded { passes: 5 });
        assert!(store.exists(member));
        assert!(store.uow.has_pending());
    }
}
