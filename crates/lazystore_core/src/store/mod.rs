//! Record store: the root of the in-memory object graph.
//!
//! # Responsibility
//! - Own every live model, the record arena and the global local-id index.
//! - Expose insert/preinsert/get/update/delete and the per-field accessors.
//! - Run every mutation inside a unit of work and drain its effects.
//!
//! # Invariants
//! - A model's record dictionary and the global index change together, only
//!   through `index_record`/`unindex_record`.
//! - The maps are only mutated while a batch is open or a drain runs.
//! - A record referenced by a relation exists before the referencing record
//!   is materialized.
//!
//! # See also
//! - `scheduler` for queue semantics, `store::drain` for effect order.

pub mod data;
mod drain;
mod read;
mod serialize;
mod write;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::field::FieldDescriptor;
use crate::model::identity::{local_id, relation_fragment};
use crate::model::schema::{ModelSchema, SchemaRegistry};
use crate::model::value::Value;
use crate::reactive::{DependencyIndex, FieldKey, ObserverId, ObserverRegistry, ReadTracker};
use crate::record::list::RecordList;
use crate::record::{FieldSlot, Record, RecordId, RecordState, SlotValue};
use crate::scheduler::UnitOfWork;
use data::{Data, FieldInput, InsertOptions, Payload, RecordInput, RelationCommand};
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Live registry of one model: its schema and its records by local id.
pub(crate) struct Model {
    pub(crate) schema: Rc<ModelSchema>,
    pub(crate) records: IndexMap<String, RecordId>,
}

/// Root of one independent object graph.
pub struct Store {
    id: Uuid,
    config: StoreConfig,
    models: IndexMap<String, Model>,
    records: HashMap<RecordId, Record>,
    index: HashMap<String, RecordId>,
    next_record: u64,
    next_anonymous: u64,
    uow: UnitOfWork,
    deps: DependencyIndex,
    observers: ObserverRegistry,
    tracker: ReadTracker,
    computing: BTreeSet<FieldKey>,
    trust: Vec<bool>,
}

impl Store {
    /// Builds a store from validated schemas.
    ///
    /// # Errors
    /// - Returns `StoreError::Config` when `config` is invalid.
    /// - Returns `StoreError::Schema` when cross-model validation fails.
    pub fn new(registry: SchemaRegistry, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let schemas = registry.finalize()?;
        let models = schemas
            .into_iter()
            .map(|(name, schema)| {
                (
                    name,
                    Model {
                        schema,
                        records: IndexMap::new(),
                    },
                )
            })
            .collect::<IndexMap<_, _>>();

        let store = Self {
            id: Uuid::new_v4(),
            config,
            models,
            records: HashMap::new(),
            index: HashMap::new(),
            next_record: 0,
            next_anonymous: 0,
            uow: UnitOfWork::new(),
            deps: DependencyIndex::default(),
            observers: ObserverRegistry::default(),
            tracker: ReadTracker::default(),
            computing: BTreeSet::new(),
            trust: Vec::new(),
        };
        info!(
            "event=store_init module=store status=ok store_id={} models={}",
            store.id,
            store.models.len()
        );
        Ok(store)
    }

    pub fn with_defaults(registry: SchemaRegistry) -> StoreResult<Self> {
        Self::new(registry, StoreConfig::default())
    }

    /// Stable id of this store instance, used to correlate log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of live records across all models.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn schema(&self, model: &str) -> StoreResult<Rc<ModelSchema>> {
        Ok(self.model(model)?.schema.clone())
    }

    /// Records of `model` in creation order.
    pub fn records(&self, model: &str) -> StoreResult<Vec<RecordId>> {
        Ok(self.model(model)?.records.values().copied().collect())
    }

    /// True until the record is hard-deleted.
    pub fn exists(&self, record: RecordId) -> bool {
        self.records.contains_key(&record)
    }

    pub fn local_id(&self, record: RecordId) -> StoreResult<&str> {
        Ok(self.record(record)?.local_id.as_str())
    }

    pub fn model_of(&self, record: RecordId) -> StoreResult<&str> {
        Ok(self.record(record)?.model())
    }

    pub fn find_by_local_id(&self, local_id: &str) -> Option<RecordId> {
        self.index.get(local_id).copied()
    }

    /// Runs `f` as one unit of work.
    ///
    /// Batches nest; only the outermost exit drains the effect queues, and
    /// batches opened by hooks during a drain are absorbed into that drain.
    /// The error of `f` wins over a drain error.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> StoreResult<T>) -> StoreResult<T> {
        self.uow.enter();
        let result = f(self);
        if self.uow.exit() {
            if let Err(drain_err) = self.drain() {
                if result.is_ok() {
                    return Err(drain_err);
                }
                warn!(
                    "event=drain module=store status=error store_id={} error={} note=masked_by_batch_error",
                    self.id, drain_err
                );
            }
        }
        result
    }

    /// Looks up a record by the identity carried in `payload`.
    pub fn get(&self, model: &str, payload: impl Into<Payload>) -> StoreResult<Option<RecordId>> {
        let schema = self.schema(model)?;
        let data = self.payload_data(&schema, payload.into())?;
        let Some(local_id) = self.resolve_local_id(&schema, &data) else {
            return Ok(None);
        };
        Ok(self.model(model)?.records.get(local_id.as_str()).copied())
    }

    /// Get-or-create by local id.
    pub fn preinsert(&mut self, model: &str, payload: impl Into<Payload>) -> StoreResult<RecordId> {
        let payload = payload.into();
        if let Some(existing) = self.get(model, payload.clone())? {
            return Ok(existing);
        }
        self.new_record(model, payload)
    }

    /// Creates a record for `payload`.
    ///
    /// Relation components of the identity are created first so the local id
    /// is stable. An existing record with the same local id is returned as is.
    ///
    /// # Errors
    /// - `MissingIdentity` when the payload does not resolve the identity.
    pub fn new_record(&mut self, model: &str, payload: impl Into<Payload>) -> StoreResult<RecordId> {
        let schema = self.schema(model)?;
        let data = self.payload_data(&schema, payload.into())?;
        self.batch(|store| store.create_record(&schema, data))
    }

    /// Inserts or updates one record from `payload`.
    pub fn insert(&mut self, model: &str, payload: impl Into<Payload>) -> StoreResult<RecordId> {
        self.insert_with(model, payload, InsertOptions::default())
    }

    pub fn insert_with(
        &mut self,
        model: &str,
        payload: impl Into<Payload>,
        options: InsertOptions,
    ) -> StoreResult<RecordId> {
        let payload = payload.into();
        self.batch(|store| store.with_trust(options, |store| store.insert_payload(model, payload)))
    }

    /// Inserts several records inside a single batch.
    pub fn insert_many<P: Into<Payload>>(
        &mut self,
        model: &str,
        payloads: impl IntoIterator<Item = P>,
    ) -> StoreResult<Vec<RecordId>> {
        self.insert_many_with(model, payloads, InsertOptions::default())
    }

    pub fn insert_many_with<P: Into<Payload>>(
        &mut self,
        model: &str,
        payloads: impl IntoIterator<Item = P>,
        options: InsertOptions,
    ) -> StoreResult<Vec<RecordId>> {
        let payloads = payloads.into_iter().map(Into::into).collect::<Vec<_>>();
        self.batch(|store| {
            store.with_trust(options, |store| {
                payloads
                    .into_iter()
                    .map(|payload| store.insert_payload(model, payload))
                    .collect()
            })
        })
    }

    /// Applies `payload` to the fields of `record`.
    ///
    /// Writing values equal to the stored ones has no effect.
    pub fn update(&mut self, record: RecordId, payload: impl Into<Payload>) -> StoreResult<()> {
        let schema = self.record(record)?.schema.clone();
        let data = self.payload_data(&schema, payload.into())?;
        self.batch(|store| store.apply_data(record, data))
    }

    /// Per-field accessor; routes through `update`.
    pub fn set(
        &mut self,
        record: RecordId,
        field: &str,
        input: impl Into<FieldInput>,
    ) -> StoreResult<()> {
        self.update(record, Data::new().with(field, input))
    }

    /// Adds `target` to a relation, mirroring the inverse field.
    pub fn add(
        &mut self,
        record: RecordId,
        field: &str,
        target: impl Into<RecordInput>,
    ) -> StoreResult<()> {
        self.set(record, field, RelationCommand::add(target))
    }

    /// Removes `target` from a relation, mirroring the inverse field.
    pub fn remove(
        &mut self,
        record: RecordId,
        field: &str,
        target: impl Into<RecordInput>,
    ) -> StoreResult<()> {
        self.set(record, field, RelationCommand::delete(target))
    }

    /// Queues `record` for deletion; it is gone once the batch drains.
    pub fn delete(&mut self, record: RecordId) -> StoreResult<()> {
        self.record(record)?;
        self.batch(|store| {
            store.record_mut(record)?.state = RecordState::Deleting;
            store.uow.queues_mut().soft_deletes.insert(record);
            Ok(())
        })
    }

    /// Registers `callback` to run after any of `fields` of `record` change.
    ///
    /// Inside a batch the callback is deferred to the drain and runs at most
    /// once per drain pass.
    pub fn on_change(
        &mut self,
        record: RecordId,
        fields: &[&str],
        callback: impl Fn(&mut Store, RecordId) -> StoreResult<()> + 'static,
    ) -> StoreResult<ObserverId> {
        let mut keys = Vec::with_capacity(fields.len());
        for field in fields {
            self.read_slot(record, field)?;
            keys.push(FieldKey::new(record, *field));
        }
        Ok(self.observers.add(record, keys, Rc::new(callback)))
    }

    pub fn remove_observer(&mut self, observer: ObserverId) -> bool {
        self.observers.remove(observer)
    }

    pub(crate) fn model(&self, name: &str) -> StoreResult<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| StoreError::UnknownModel(name.to_string()))
    }

    pub(crate) fn record(&self, id: RecordId) -> StoreResult<&Record> {
        self.records.get(&id).ok_or(StoreError::RecordNotFound(id))
    }

    pub(crate) fn record_mut(&mut self, id: RecordId) -> StoreResult<&mut Record> {
        self.records
            .get_mut(&id)
            .ok_or(StoreError::RecordNotFound(id))
    }

    pub(crate) fn is_trusted(&self) -> bool {
        self.trust
            .last()
            .copied()
            .unwrap_or(self.config.html_trusted_by_default)
    }

    fn with_trust<T>(
        &mut self,
        options: InsertOptions,
        f: impl FnOnce(&mut Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let trusted = options.html_trusted || self.is_trusted();
        self.trust.push(trusted);
        let result = f(self);
        self.trust.pop();
        result
    }

    fn insert_payload(&mut self, model: &str, payload: Payload) -> StoreResult<RecordId> {
        let schema = self.schema(model)?;
        let data = self.payload_data(&schema, payload)?;
        self.insert_data(&schema, data)
    }

    pub(crate) fn insert_data(&mut self, schema: &Rc<ModelSchema>, data: Data) -> StoreResult<RecordId> {
        let record = match self.lookup(schema, &data) {
            Some(existing) => existing,
            None => self.create_record(schema, data.clone())?,
        };
        self.apply_data(record, data)?;
        Ok(record)
    }

    pub(crate) fn apply_data(&mut self, record: RecordId, data: Data) -> StoreResult<()> {
        for (field, input) in data {
            self.write_field(record, &field, input)?;
        }
        Ok(())
    }

    fn lookup(&self, schema: &ModelSchema, data: &Data) -> Option<RecordId> {
        let local_id = self.resolve_local_id(schema, data)?;
        self.models
            .get(schema.name())
            .and_then(|model| model.records.get(local_id.as_str()))
            .copied()
    }

    fn create_record(&mut self, schema: &Rc<ModelSchema>, data: Data) -> StoreResult<RecordId> {
        let identity_fields = schema
            .identity()
            .map(|identity| identity.fields().into_iter().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();

        for field in &identity_fields {
            let (Some(FieldDescriptor::Relation(relation)), Some(input)) =
                (schema.field(field), data.get(field))
            else {
                continue;
            };
            if let Some(record_input) = identity_record_input(input) {
                let target = self.schema(relation.target())?;
                self.resolve_record_input(&target, record_input)?;
            }
        }

        let local_id = match schema.identity() {
            Some(_) => {
                let resolved = self
                    .resolve_local_id(schema, &data)
                    .ok_or_else(|| StoreError::MissingIdentity(schema.name().to_string()))?;
                if let Some(existing) = self.lookup(schema, &data) {
                    return Ok(existing);
                }
                resolved
            }
            None => {
                self.next_anonymous += 1;
                local_id(schema.name(), &format!("#{}", self.next_anonymous))
            }
        };

        self.next_record += 1;
        let id = RecordId::from_raw(self.next_record);
        let mut fields = IndexMap::new();
        for (name, descriptor) in schema.fields() {
            let value = match descriptor {
                FieldDescriptor::Attr(attr) => SlotValue::Attr(attr.default_value().clone()),
                FieldDescriptor::Relation(relation) => {
                    SlotValue::Relation(RecordList::new(relation.kind()))
                }
            };
            let mut slot = FieldSlot::new(value);
            slot.stale = descriptor.is_computed() && !descriptor.is_eager();
            fields.insert(name.to_string(), slot);
        }

        self.records.insert(
            id,
            Record::new(id, schema.clone(), local_id.clone(), fields),
        );
        self.index_record(schema.name(), local_id.clone(), id)?;

        for (name, descriptor) in schema.fields() {
            let key = FieldKey::new(id, name);
            let queues = self.uow.queues_mut();
            if descriptor.is_computed() && descriptor.is_eager() {
                queues.recompute.insert(key.clone());
            }
            if descriptor.has_sort() {
                queues.resort.insert(key);
            }
        }

        debug!(
            "event=record_create module=store status=ok store_id={} model={} record={} local_id={}",
            self.id,
            schema.name(),
            id,
            local_id
        );

        for field in identity_fields {
            if let Some(input) = data.get(&field) {
                self.write_field(id, &field, input.clone())?;
            }
        }
        Ok(id)
    }

    fn index_record(&mut self, model: &str, local_id: String, id: RecordId) -> StoreResult<()> {
        let model = self
            .models
            .get_mut(model)
            .ok_or_else(|| StoreError::UnknownModel(model.to_string()))?;
        model.records.insert(local_id.clone(), id);
        self.index.insert(local_id, id);
        Ok(())
    }

    pub(crate) fn unindex_record(&mut self, model: &str, local_id: &str, id: RecordId) {
        if let Some(model) = self.models.get_mut(model) {
            if model.records.get(local_id) == Some(&id) {
                model.records.shift_remove(local_id);
            }
        }
        if self.index.get(local_id) == Some(&id) {
            self.index.remove(local_id);
        }
    }

    fn payload_data(&self, schema: &ModelSchema, payload: Payload) -> StoreResult<Data> {
        match payload {
            Payload::Data(data) => Ok(data),
            Payload::Scalar(value) => {
                let field = schema
                    .identity()
                    .and_then(|identity| identity.single_field())
                    .ok_or_else(|| StoreError::ScalarIdentityUnsupported(schema.name().to_string()))?;
                Ok(Data::new().with(field, value))
            }
        }
    }

    /// Computes the local id `data` would have, without creating anything.
    pub(crate) fn resolve_local_id(&self, schema: &ModelSchema, data: &Data) -> Option<String> {
        let identity = schema.identity()?;
        let resolved = identity.resolve(&|field: &str| self.identity_component(schema, data, field))?;
        Some(local_id(schema.name(), &resolved))
    }

    fn identity_component(&self, schema: &ModelSchema, data: &Data, field: &str) -> Option<String> {
        let input = data.get(field)?;
        match schema.field(field)? {
            FieldDescriptor::Attr(_) => match input {
                FieldInput::Value(value) => value.identity_fragment(),
                _ => None,
            },
            FieldDescriptor::Relation(relation) => {
                let record_input = identity_record_input(input)?;
                let target_local_id =
                    self.record_input_local_id(relation.target(), &record_input)?;
                Some(relation_fragment(&target_local_id))
            }
        }
    }

    fn record_input_local_id(&self, target: &str, input: &RecordInput) -> Option<String> {
        match input {
            RecordInput::Id(id) => self.records.get(id).map(|record| record.local_id.clone()),
            RecordInput::Data(data) => {
                let schema = self.models.get(target)?.schema.clone();
                self.resolve_local_id(&schema, data)
            }
            RecordInput::Key(value) => {
                let schema = self.models.get(target)?.schema.clone();
                let field = schema.identity()?.single_field()?;
                self.resolve_local_id(&schema, &Data::new().with(field, value.clone()))
            }
        }
    }
}

/// Single record reference carried by an identity component, if any.
///
/// Removal commands leave the component unresolved.
fn identity_record_input(input: &FieldInput) -> Option<RecordInput> {
    match input {
        FieldInput::Value(Value::Null) => None,
        FieldInput::Value(value) => Some(RecordInput::Key(value.clone())),
        FieldInput::Record(record) => Some(record.clone()),
        FieldInput::Records(records) if records.len() == 1 => records.first().cloned(),
        FieldInput::Records(_) => None,
        FieldInput::Commands(commands) => match commands.as_slice() {
            [RelationCommand::Add(records)] | [RelationCommand::Replace(records)]
                if records.len() == 1 =>
            {
                records.first().cloned()
            }
            _ => None,
        },
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("records", &self.records.len())
            .field("observers", &self.observers.len())
            .field("batch_depth", &self.uow.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::data::{Data, RelationCommand};
    use super::Store;
    use crate::error::StoreError;
    use crate::model::field::{attr, one};
    use crate::model::identity::Identity;
    use crate::model::schema::{ModelSchema, SchemaRegistry};

    fn store() -> Store {
        let registry = SchemaRegistry::new()
            .with(
                ModelSchema::new("Thread")
                    .with_identity(Identity::and([Identity::field("model"), Identity::field("id")]))
                    .with_field("model", attr())
                    .with_field("id", attr()),
            )
            .and_then(|registry| {
                registry.with(
                    ModelSchema::new("Message")
                        .with_identity(Identity::field("id"))
                        .with_field("id", attr())
                        .with_field("thread", one("Thread")),
                )
            })
            .and_then(|registry| {
                registry.with(
                    ModelSchema::new("Follower")
                        .with_identity(Identity::and([
                            Identity::field("thread"),
                            Identity::field("partner"),
                        ]))
                        .with_field("thread", one("Thread"))
                        .with_field("partner", attr()),
                )
            })
            .expect("schemas should register");
        Store::with_defaults(registry).expect("store should build")
    }

    #[test]
    fn compound_identity_resolves_relation_components() {
        let mut store = store();
        let thread = Data::new().with("model", "res.partner").with("id", 3);
        let follower = store
            .insert("Follower", Data::new().with("thread", thread.clone()).with("partner", 9))
            .expect("follower insert");

        assert_eq!(
            store.local_id(follower).expect("local id"),
            "Follower,(Thread,res.partner AND 3) AND 9"
        );
        let thread_id = store
            .get("Thread", thread)
            .expect("lookup")
            .expect("thread was pre-created");
        assert_eq!(store.get_one(follower, "thread").expect("read"), Some(thread_id));
    }

    #[test]
    fn model_dictionary_and_global_index_agree() {
        let mut store = store();
        let message = store
            .insert("Message", Data::new().with("id", 1))
            .expect("message insert");
        assert_eq!(store.record(message).expect("live record").id, message);
        assert_eq!(store.find_by_local_id("Message,1"), Some(message));
        assert_eq!(store.records("Message").expect("records"), vec![message]);

        store.delete(message).expect("delete");
        assert_eq!(store.find_by_local_id("Message,1"), None);
        assert!(store.records("Message").expect("records").is_empty());
    }

    #[test]
    fn scalar_payload_requires_single_field_identity() {
        let mut store = store();
        let message = store.insert("Message", 5).expect("scalar insert");
        assert_eq!(store.local_id(message).expect("local id"), "Message,5");

        let err = store
            .insert("Thread", 5)
            .expect_err("compound identity rejects scalar payload");
        assert_eq!(err, StoreError::ScalarIdentityUnsupported("Thread".to_string()));
    }

    #[test]
    fn missing_identity_is_a_configuration_error() {
        let mut store = store();
        let err = store
            .insert("Thread", Data::new().with("model", "res.partner"))
            .expect_err("AND identity needs every operand");
        assert_eq!(err, StoreError::MissingIdentity("Thread".to_string()));
        assert!(store.is_empty());
    }

    #[test]
    fn removal_command_leaves_identity_unresolved() {
        let mut store = store();
        let payload = Data::new()
            .with("thread", RelationCommand::Clear)
            .with("partner", 1);
        assert_eq!(store.get("Follower", payload.clone()).expect("lookup"), None);
        let err = store
            .insert("Follower", payload)
            .expect_err("clear cannot identify a thread");
        assert_eq!(err, StoreError::MissingIdentity("Follower".to_string()));
    }
}
