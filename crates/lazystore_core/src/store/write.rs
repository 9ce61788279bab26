//! Field writes.
//!
//! # Responsibility
//! - Coerce attribute writes and drop writes that change nothing.
//! - Link and unlink relation targets while keeping inverses and the
//!   target's `uses` index in step.
//! - Turn every effective change into invalidations and queued effects.
//!
//! # Invariants
//! - A link is mirrored on the inverse field before `link` returns.
//! - Nothing links to or from a record that is being deleted.

use super::data::{FieldInput, Payload, RecordInput, RelationCommand};
use super::Store;
use crate::error::{StoreError, StoreResult};
use crate::model::field::{AttrField, FieldDescriptor, RelationField, RelationKind};
use crate::model::schema::ModelSchema;
use crate::model::value::Value;
use crate::reactive::{DependentKind, FieldKey};
use crate::record::list::RecordList;
use crate::record::{FieldSlot, RecordId, SlotValue};
use log::debug;
use std::rc::Rc;

impl Store {
    pub(crate) fn write_field(
        &mut self,
        record: RecordId,
        field: &str,
        input: FieldInput,
    ) -> StoreResult<()> {
        let schema = self.record(record)?.schema.clone();
        match descriptor(&schema, field)? {
            FieldDescriptor::Attr(attr) => self.write_attr(record, &schema, field, attr, input),
            FieldDescriptor::Relation(relation) => {
                self.write_relation(record, field, relation, input)
            }
        }
    }

    fn write_attr(
        &mut self,
        record: RecordId,
        schema: &ModelSchema,
        field: &str,
        attr: &AttrField,
        input: FieldInput,
    ) -> StoreResult<()> {
        let mismatch = |message: String| StoreError::TypeMismatch {
            model: schema.name().to_string(),
            field: field.to_string(),
            message,
        };
        let FieldInput::Value(mut value) = input else {
            return Err(mismatch("expected a value, got a record reference".to_string()));
        };
        if attr.html {
            value = value.into_html(self.is_trusted());
        }
        if let Some(kind) = attr.coerce {
            value = value.coerce(kind).map_err(mismatch)?;
        }

        let key = FieldKey::new(record, field);
        let slot = self.slot_mut(&key)?;
        if matches!(&slot.value, SlotValue::Attr(current) if *current == value) {
            return Ok(());
        }
        slot.value = SlotValue::Attr(value);
        if attr.sort.is_some() {
            self.uow.queues_mut().resort.insert(key.clone());
        }
        self.field_changed(&key)
    }

    fn write_relation(
        &mut self,
        record: RecordId,
        field: &str,
        relation: &RelationField,
        input: FieldInput,
    ) -> StoreResult<()> {
        let target = self.schema(relation.target())?;
        match input {
            FieldInput::Value(Value::Null) => self.clear_relation(record, field, relation),
            FieldInput::Value(value) => {
                let id = self.resolve_record_input(&target, RecordInput::Key(value))?;
                self.replace_relation(record, field, relation, vec![id])
            }
            FieldInput::Record(input) => {
                let id = self.resolve_record_input(&target, input)?;
                self.replace_relation(record, field, relation, vec![id])
            }
            FieldInput::Records(inputs) => {
                if relation.kind() == RelationKind::One && inputs.len() > 1 {
                    return Err(StoreError::TypeMismatch {
                        model: self.model_of(record)?.to_string(),
                        field: field.to_string(),
                        message: format!("one relation cannot hold {} records", inputs.len()),
                    });
                }
                let ids = self.resolve_all(&target, inputs)?;
                self.replace_relation(record, field, relation, ids)
            }
            FieldInput::Commands(commands) => {
                for command in commands {
                    match command {
                        RelationCommand::Add(inputs) => {
                            for id in self.resolve_all(&target, inputs)? {
                                self.link(record, field, relation, id)?;
                            }
                        }
                        RelationCommand::Delete(inputs) => {
                            for input in inputs {
                                if let Some(id) = self.find_record_input(&target, &input)? {
                                    self.unlink(record, field, relation, id)?;
                                }
                            }
                        }
                        RelationCommand::Clear => self.clear_relation(record, field, relation)?,
                        RelationCommand::Replace(inputs) => {
                            let ids = self.resolve_all(&target, inputs)?;
                            self.replace_relation(record, field, relation, ids)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Turns a record reference into a record of `target`, creating it when
    /// the reference carries data.
    pub(crate) fn resolve_record_input(
        &mut self,
        target: &Rc<ModelSchema>,
        input: RecordInput,
    ) -> StoreResult<RecordId> {
        match input {
            RecordInput::Id(id) => {
                let actual = self.model_of(id)?;
                if actual != target.name() {
                    return Err(StoreError::WrongModel {
                        expected: target.name().to_string(),
                        actual: actual.to_string(),
                    });
                }
                Ok(id)
            }
            RecordInput::Data(data) => self.insert_data(target, data),
            RecordInput::Key(value) => {
                let data = self.payload_data(target, Payload::Scalar(value))?;
                self.insert_data(target, data)
            }
        }
    }

    fn resolve_all(
        &mut self,
        target: &Rc<ModelSchema>,
        inputs: Vec<RecordInput>,
    ) -> StoreResult<Vec<RecordId>> {
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            ids.push(self.resolve_record_input(target, input)?);
        }
        Ok(ids)
    }

    /// Like `resolve_record_input`, without creating anything.
    fn find_record_input(
        &self,
        target: &ModelSchema,
        input: &RecordInput,
    ) -> StoreResult<Option<RecordId>> {
        match input {
            RecordInput::Id(id) => Ok(self.exists(*id).then_some(*id)),
            RecordInput::Data(data) => Ok(self.lookup(target, data)),
            RecordInput::Key(value) => {
                let data = self.payload_data(target, Payload::Scalar(value.clone()))?;
                Ok(self.lookup(target, &data))
            }
        }
    }

    fn replace_relation(
        &mut self,
        record: RecordId,
        field: &str,
        relation: &RelationField,
        targets: Vec<RecordId>,
    ) -> StoreResult<()> {
        let mut wanted = Vec::with_capacity(targets.len());
        for id in targets {
            if id.not_in_list(&wanted) {
                wanted.push(id);
            }
        }

        let key = FieldKey::new(record, field);
        if relation.kind() == RelationKind::One {
            return match wanted.last() {
                Some(id) => self.link(record, field, relation, *id),
                None => self.clear_relation(record, field, relation),
            };
        }

        for id in self.relation_ids(&key)? {
            if id.not_in_list(&wanted) {
                self.unlink(record, field, relation, id)?;
            }
        }
        for id in &wanted {
            self.link(record, field, relation, *id)?;
        }
        if relation.sort.is_some() {
            return Ok(());
        }

        let list = self.list_mut(&key)?;
        let order = wanted
            .into_iter()
            .filter(|id| list.contains(*id))
            .collect::<Vec<_>>();
        if order.len() == list.len() && list.reorder(order) {
            self.field_changed(&key)?;
        }
        Ok(())
    }

    fn clear_relation(
        &mut self,
        record: RecordId,
        field: &str,
        relation: &RelationField,
    ) -> StoreResult<()> {
        for id in self.relation_ids(&FieldKey::new(record, field))? {
            self.unlink(record, field, relation, id)?;
        }
        Ok(())
    }

    /// Adds `target` to `record.field` and mirrors it on the inverse.
    pub(crate) fn link(
        &mut self,
        record: RecordId,
        field: &str,
        relation: &RelationField,
        target: RecordId,
    ) -> StoreResult<()> {
        let key = FieldKey::new(record, field);
        if !self.record(record)?.is_active() || !self.record(target)?.is_active() {
            debug!(
                "event=relation_link module=store status=skip store_id={} field={} target={} reason=deleting",
                self.id, key, target
            );
            return Ok(());
        }
        let current = self.relation_ids(&key)?;
        if target.in_list(&current) {
            return Ok(());
        }
        if relation.kind() == RelationKind::One {
            if let Some(old) = current.first() {
                self.unlink(record, field, relation, *old)?;
            }
        }

        self.list_mut(&key)?.insert(target);
        self.record_mut(target)?.add_use(record, field);
        let queues = self.uow.queues_mut();
        if relation.on_add.is_some() {
            queues.added.insert((key.clone(), target));
        }
        if relation.sort.is_some() {
            queues.resort.insert(key.clone());
        }
        self.field_changed(&key)?;

        if let Some(inverse) = relation.inverse_field() {
            let schema = self.record(target)?.schema.clone();
            if let Some(inverse_relation) = descriptor(&schema, inverse)?.as_relation() {
                self.link(target, inverse, inverse_relation, record)?;
            }
        }
        Ok(())
    }

    /// Removes `target` from `record.field` and mirrors it on the inverse.
    pub(crate) fn unlink(
        &mut self,
        record: RecordId,
        field: &str,
        relation: &RelationField,
        target: RecordId,
    ) -> StoreResult<()> {
        let key = FieldKey::new(record, field);
        if !self.list_mut(&key)?.remove(target) {
            return Ok(());
        }
        if let Some(target_record) = self.records.get_mut(&target) {
            target_record.remove_use(record, field);
        }
        if relation.on_delete.is_some() {
            self.uow.queues_mut().removed.insert((key.clone(), target));
        }
        self.field_changed(&key)?;

        let Some(inverse) = relation.inverse_field() else {
            return Ok(());
        };
        let Some(schema) = self.records.get(&target).map(|target| target.schema.clone()) else {
            return Ok(());
        };
        if let Some(inverse_relation) = descriptor(&schema, inverse)?.as_relation() {
            self.unlink(target, inverse, inverse_relation, record)?;
        }
        Ok(())
    }

    /// Propagates an effective change of `key`.
    pub(crate) fn field_changed(&mut self, key: &FieldKey) -> StoreResult<()> {
        let has_hook = self
            .record(key.record)?
            .schema
            .field(&key.field)
            .and_then(FieldDescriptor::on_update_hook)
            .is_some();
        if has_hook {
            self.uow.queues_mut().updated.insert(key.clone());
        }

        for dependent in self.deps.dependents_of(key) {
            match dependent.kind {
                DependentKind::Compute => self.invalidate(&dependent.key)?,
                DependentKind::Sort => {
                    self.uow.queues_mut().resort.insert(dependent.key);
                }
            }
        }

        let watchers = self.observers.watchers_of(key);
        self.uow.queues_mut().observers.extend(watchers);
        Ok(())
    }

    /// Marks a computed field out of date.
    ///
    /// Eager fields are queued for recompute. Lazy fields only become stale,
    /// unless something observes them, in which case they are queued too.
    fn invalidate(&mut self, key: &FieldKey) -> StoreResult<()> {
        let Some(record) = self.records.get(&key.record) else {
            return Ok(());
        };
        if !record.is_active() {
            return Ok(());
        }
        let Some(descriptor) = record.schema.field(&key.field) else {
            return Ok(());
        };
        let eager = descriptor.is_eager();
        let observed = descriptor.on_update_hook().is_some()
            || self.deps.has_dependents(key)
            || self.observers.has_watchers(key);

        if !eager {
            self.slot_mut(key)?.stale = true;
        }
        if eager || observed {
            self.uow.queues_mut().recompute.insert(key.clone());
        }
        Ok(())
    }

    pub(crate) fn slot_mut(&mut self, key: &FieldKey) -> StoreResult<&mut FieldSlot> {
        let record = self
            .records
            .get_mut(&key.record)
            .ok_or(StoreError::RecordNotFound(key.record))?;
        let model = &record.schema;
        record
            .fields
            .get_mut(&key.field)
            .ok_or_else(|| StoreError::UnknownField {
                model: model.name().to_string(),
                field: key.field.clone(),
            })
    }

    pub(crate) fn list_mut(&mut self, key: &FieldKey) -> StoreResult<&mut RecordList> {
        let model = self.model_of(key.record)?.to_string();
        self.slot_mut(key)?
            .list_mut()
            .ok_or_else(|| not_a_relation(model, &key.field))
    }

    pub(crate) fn relation_ids(&self, key: &FieldKey) -> StoreResult<Vec<RecordId>> {
        let record = self.record(key.record)?;
        record
            .fields
            .get(&key.field)
            .and_then(FieldSlot::list)
            .map(|list| list.ids().to_vec())
            .ok_or_else(|| not_a_relation(record.model().to_string(), &key.field))
    }
}

pub(crate) fn descriptor<'a>(schema: &'a ModelSchema, field: &str) -> StoreResult<&'a FieldDescriptor> {
    schema.field(field).ok_or_else(|| StoreError::UnknownField {
        model: schema.name().to_string(),
        field: field.to_string(),
    })
}

fn not_a_relation(model: String, field: &str) -> StoreError {
    StoreError::TypeMismatch {
        model,
        field: field.to_string(),
        message: "not a relation field".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::model::field::{attr, many, one};
    use crate::model::identity::Identity;
    use crate::model::schema::{ModelSchema, SchemaRegistry};
    use crate::model::value::Value;
    use crate::record::RecordId;
    use crate::store::data::{Data, FieldInput, InsertOptions, RelationCommand};
    use crate::store::Store;

    fn store() -> Store {
        let registry = SchemaRegistry::new()
            .with(
                ModelSchema::new("Person")
                    .with_identity(Identity::field("id"))
                    .with_field("id", attr())
                    .with_field("name", attr())
                    .with_field("bio", attr().html())
                    .with_field("born", attr().date())
                    .with_field("manager", one("Person").inverse("reports"))
                    .with_field("reports", many("Person").inverse("manager"))
                    .with_field("spouse", one("Person").inverse("spouse")),
            )
            .expect("schema should register");
        Store::with_defaults(registry).expect("store should build")
    }

    #[test]
    fn inverse_many_to_one_stays_mirrored() {
        let mut store = store();
        let boss = store.insert("Person", 1).expect("boss");
        let alice = store.insert("Person", 2).expect("alice");
        let bob = store.insert("Person", 3).expect("bob");

        store
            .set(boss, "reports", vec![alice, bob])
            .expect("set reports");
        assert_eq!(store.get_one(alice, "manager").expect("read"), Some(boss));

        store.set(bob, "manager", None::<RecordId>).expect("clear manager");
        assert_eq!(store.get_many(boss, "reports").expect("read"), vec![alice]);
    }

    #[test]
    fn one_to_one_inverse_releases_previous_partner() {
        let mut store = store();
        let a = store.insert("Person", 1).expect("a");
        let b = store.insert("Person", 2).expect("b");
        let c = store.insert("Person", 3).expect("c");

        store.set(a, "spouse", b).expect("a-b");
        store.set(c, "spouse", b).expect("c-b");
        assert_eq!(store.get_one(b, "spouse").expect("read"), Some(c));
        assert_eq!(store.get_one(a, "spouse").expect("read"), None);
    }

    #[test]
    fn replace_keeps_input_order_and_dedupes() {
        let mut store = store();
        let boss = store.insert("Person", 1).expect("boss");
        let a = store.insert("Person", 2).expect("a");
        let b = store.insert("Person", 3).expect("b");

        store
            .set(boss, "reports", vec![b, a, b])
            .expect("replace reports");
        assert_eq!(store.get_many(boss, "reports").expect("read"), vec![b, a]);

        store
            .set(boss, "reports", RelationCommand::delete(b))
            .expect("delete command");
        assert_eq!(store.get_many(boss, "reports").expect("read"), vec![a]);
        assert!(store.exists(b));
    }

    #[test]
    fn nested_data_creates_targets_by_key() {
        let mut store = store();
        let alice = store
            .insert(
                "Person",
                Data::new()
                    .with("id", 1)
                    .with("manager", Data::new().with("id", 9).with("name", "Boss")),
            )
            .expect("insert with nested manager");
        let boss = store.get_one(alice, "manager").expect("read").expect("manager");
        assert_eq!(store.local_id(boss).expect("local id"), "Person,9");
        assert_eq!(
            store.get_value(boss, "name").expect("read"),
            Value::from("Boss")
        );

        store
            .set(alice, "manager", FieldInput::Value(Value::Int(9)))
            .expect("key shorthand");
        assert_eq!(store.get_one(alice, "manager").expect("read"), Some(boss));
    }

    #[test]
    fn html_and_date_fields_are_coerced() {
        let mut store = store();
        let alice = store
            .insert(
                "Person",
                Data::new()
                    .with("id", 1)
                    .with("bio", "<b>hi</b>")
                    .with("born", "1990-04-01"),
            )
            .expect("insert");
        assert_eq!(
            store.get_value(alice, "bio").expect("read"),
            Value::Html("&lt;b&gt;hi&lt;/b&gt;".to_string())
        );
        assert!(matches!(
            store.get_value(alice, "born").expect("read"),
            Value::Date(_)
        ));

        store
            .insert_with(
                "Person",
                Data::new().with("id", 1).with("bio", "<b>hi</b>"),
                InsertOptions::trusted(),
            )
            .expect("trusted update");
        assert_eq!(
            store.get_value(alice, "bio").expect("read"),
            Value::Html("<b>hi</b>".to_string())
        );

        let err = store
            .set(alice, "born", "not a date")
            .expect_err("bad date is rejected");
        assert!(err.to_string().contains("born"));
    }
}
