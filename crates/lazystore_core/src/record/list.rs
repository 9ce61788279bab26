//! Relation container.
//!
//! A `RecordList` is the materialized value of a `one` or `many` field.
//! It only holds ids; inverse mirroring and sorting happen in the store,
//! which owns every record the ids point at.

use crate::model::field::RelationKind;
use crate::record::RecordId;

/// Ordered holder of related record ids.
///
/// A `one` list holds zero or one id; a `many` list never holds an id twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordList {
    kind: RelationKind,
    ids: Vec<RecordId>,
}

impl RecordList {
    pub fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            ids: Vec::new(),
        }
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }

    /// Scalar-like view of a `one` relation.
    pub fn one(&self) -> Option<RecordId> {
        self.ids.first().copied()
    }

    /// Appends `id`; a `one` list is replaced. Returns false if already present.
    pub(crate) fn insert(&mut self, id: RecordId) -> bool {
        if self.contains(id) {
            return false;
        }
        if self.kind == RelationKind::One {
            self.ids.clear();
        }
        self.ids.push(id);
        true
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> bool {
        let Some(position) = self.ids.iter().position(|existing| *existing == id) else {
            return false;
        };
        self.ids.remove(position);
        true
    }

    /// Replaces the order of the held ids. `ids` must be a permutation.
    pub(crate) fn reorder(&mut self, ids: Vec<RecordId>) -> bool {
        debug_assert_eq!(ids.len(), self.ids.len());
        if ids == self.ids {
            return false;
        }
        self.ids = ids;
        true
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = RecordId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, RecordId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}
