//! Record projections back into insertable data and plain JSON.

use super::data::{Data, FieldInput, RecordInput};
use super::Store;
use crate::error::StoreResult;
use crate::model::field::{FieldDescriptor, FieldKind, RelationKind};
use crate::model::value::{Value, DATETIME_FORMAT, DATE_FORMAT};
use crate::record::RecordId;
use serde_json::{Map, Number};

impl Store {
    /// Projects `record` into data that `insert` accepts.
    ///
    /// Related records are reduced to their identity fields. Inserting the
    /// result into an empty store with the same schemas rebuilds the record
    /// and stubs of its targets.
    pub fn to_data(&mut self, record: RecordId) -> StoreResult<Data> {
        let schema = self.record(record)?.schema.clone();
        let mut data = Data::new();
        for (field, descriptor) in schema.fields() {
            let input = match descriptor {
                FieldDescriptor::Attr(_) => FieldInput::Value(self.get_value(record, field)?),
                FieldDescriptor::Relation(_) => {
                    let mut targets = Vec::new();
                    for target in self.get_list(record, field)?.iter() {
                        targets.push(RecordInput::Data(self.to_id_data(target)?));
                    }
                    match descriptor.kind() {
                        FieldKind::One => match targets.pop() {
                            Some(target) => FieldInput::Record(target),
                            None => FieldInput::null(),
                        },
                        _ => FieldInput::Records(targets),
                    }
                }
            };
            data.insert(field, input);
        }
        Ok(data)
    }

    /// Identity fields of `record` only; anonymous records yield no fields.
    pub fn to_id_data(&mut self, record: RecordId) -> StoreResult<Data> {
        let schema = self.record(record)?.schema.clone();
        let mut data = Data::new();
        let Some(identity) = schema.identity() else {
            return Ok(data);
        };
        for field in identity.fields() {
            let input = match schema.field(field) {
                Some(FieldDescriptor::Relation(_)) => match self.get_one(record, field)? {
                    Some(target) => FieldInput::Record(RecordInput::Data(self.to_id_data(target)?)),
                    None => FieldInput::null(),
                },
                _ => FieldInput::Value(self.get_value(record, field)?),
            };
            data.insert(field, input);
        }
        Ok(data)
    }

    /// Plain JSON view of `record`, relations rendered as local ids.
    pub fn to_json(&mut self, record: RecordId) -> StoreResult<serde_json::Value> {
        let schema = self.record(record)?.schema.clone();
        let mut object = Map::new();
        object.insert(
            "local_id".to_string(),
            serde_json::Value::String(self.local_id(record)?.to_string()),
        );
        for (field, descriptor) in schema.fields() {
            let value = match descriptor {
                FieldDescriptor::Attr(_) => value_to_json(&self.get_value(record, field)?),
                FieldDescriptor::Relation(relation) => {
                    let mut local_ids = Vec::new();
                    for target in self.get_list(record, field)?.iter() {
                        local_ids.push(serde_json::Value::String(self.local_id(target)?.to_string()));
                    }
                    match relation.kind() {
                        RelationKind::One => local_ids.pop().unwrap_or(serde_json::Value::Null),
                        RelationKind::Many => serde_json::Value::Array(local_ids),
                    }
                }
            };
            object.insert(field.to_string(), value);
        }
        Ok(serde_json::Value::Object(object))
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(value) => serde_json::Value::Bool(*value),
        Value::Int(value) => serde_json::Value::from(*value),
        Value::Float(value) => Number::from_f64(*value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(text) | Value::Html(text) => serde_json::Value::String(text.clone()),
        Value::Date(date) => serde_json::Value::String(date.format(DATE_FORMAT).to_string()),
        Value::DateTime(at) => serde_json::Value::String(at.format(DATETIME_FORMAT).to_string()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Json(json) => json.clone(),
    }
}
