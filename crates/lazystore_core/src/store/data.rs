//! Input payloads accepted by insert/update.
//!
//! # Responsibility
//! - Describe partial record data and per-field write inputs.
//! - Express relation writes as record references, nested data or commands.
//!
//! # Invariants
//! - `Data` preserves insertion order; fields are written in that order.
//! - `RelationCommand::Delete` unlinks a record from a relation; it never
//!   deletes the record itself.

use crate::model::value::Value;
use crate::record::RecordId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field name → write input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data(IndexMap<String, FieldInput>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`.
    pub fn with(mut self, field: impl Into<String>, input: impl Into<FieldInput>) -> Self {
        self.insert(field, input);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, input: impl Into<FieldInput>) {
        self.0.insert(field.into(), input.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldInput> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldInput)> {
        self.0.iter().map(|(field, input)| (field.as_str(), input))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Data {
    type Item = (String, FieldInput);
    type IntoIter = indexmap::map::IntoIter<String, FieldInput>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Write input for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldInput {
    /// Attribute value. `Value::Null` also clears a relation.
    Value(Value),
    /// Sets a `one` relation, or replaces a `many` relation with one record.
    Record(RecordInput),
    /// Replaces a relation.
    Records(Vec<RecordInput>),
    /// Applies commands to a relation, in order.
    Commands(Vec<RelationCommand>),
}

impl FieldInput {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }
}

/// Reference to a related record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordInput {
    /// Existing record.
    Id(RecordId),
    /// Get-or-create in the target model, then update with the data.
    Data(Data),
    /// Shorthand for a target whose identity is a single field.
    Key(Value),
}

/// Relation mutation command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationCommand {
    Add(Vec<RecordInput>),
    /// Unlinks the records from the relation.
    Delete(Vec<RecordInput>),
    Clear,
    Replace(Vec<RecordInput>),
}

impl RelationCommand {
    pub fn add(record: impl Into<RecordInput>) -> Self {
        Self::Add(vec![record.into()])
    }

    pub fn delete(record: impl Into<RecordInput>) -> Self {
        Self::Delete(vec![record.into()])
    }

    /// True for commands that remove links rather than establish them.
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Delete(_) | Self::Clear)
    }
}

/// Record data given to insert/update/get.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Data(Data),
    /// Value of the single identity field.
    Scalar(Value),
}

/// Options threaded through one insert and every nested insert it causes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Html fields keep written text verbatim instead of escaping it.
    pub html_trusted: bool,
}

impl InsertOptions {
    pub fn trusted() -> Self {
        Self { html_trusted: true }
    }
}

impl From<Data> for Payload {
    fn from(value: Data) -> Self {
        Self::Data(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::Int(value))
    }
}

impl From<i32> for Payload {
    fn from(value: i32) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<Value> for FieldInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for FieldInput {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for FieldInput {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for FieldInput {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

impl From<i32> for FieldInput {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for FieldInput {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<f64> for FieldInput {
    fn from(value: f64) -> Self {
        Self::Value(Value::Float(value))
    }
}

impl From<RecordId> for FieldInput {
    fn from(value: RecordId) -> Self {
        Self::Record(RecordInput::Id(value))
    }
}

impl From<Option<RecordId>> for FieldInput {
    fn from(value: Option<RecordId>) -> Self {
        match value {
            Some(id) => Self::Record(RecordInput::Id(id)),
            None => Self::null(),
        }
    }
}

impl From<Vec<RecordId>> for FieldInput {
    fn from(value: Vec<RecordId>) -> Self {
        Self::Records(value.into_iter().map(RecordInput::Id).collect())
    }
}

impl From<Data> for FieldInput {
    fn from(value: Data) -> Self {
        Self::Record(RecordInput::Data(value))
    }
}

impl From<RecordInput> for FieldInput {
    fn from(value: RecordInput) -> Self {
        Self::Record(value)
    }
}

impl From<RelationCommand> for FieldInput {
    fn from(value: RelationCommand) -> Self {
        Self::Commands(vec![value])
    }
}

impl From<Vec<RelationCommand>> for FieldInput {
    fn from(value: Vec<RelationCommand>) -> Self {
        Self::Commands(value)
    }
}

impl From<RecordId> for RecordInput {
    fn from(value: RecordId) -> Self {
        Self::Id(value)
    }
}

impl From<Data> for RecordInput {
    fn from(value: Data) -> Self {
        Self::Data(value)
    }
}
