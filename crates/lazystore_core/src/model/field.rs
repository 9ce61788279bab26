//! Declarative field descriptors.
//!
//! # Responsibility
//! - Describe scalar (`attr`) and relational (`one`/`many`) fields.
//! - Carry compute functions, laziness, hooks, sort order and inverse links.
//!
//! # Invariants
//! - The discriminant of `FieldDescriptor` is the field kind; options that
//!   make no sense for a kind cannot be expressed on it.
//! - Compute fields are lazy unless `eager()` is requested.

use crate::error::StoreResult;
use crate::model::value::{AttrType, Value};
use crate::record::RecordId;
use crate::store::data::FieldInput;
use crate::store::Store;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Computes the value of a field for one record.
///
/// Every field read through the store while this runs becomes a dependency.
pub type ComputeFn = Rc<dyn Fn(&mut Store, RecordId) -> StoreResult<FieldInput>>;
/// Fired after a field of `record` changed.
pub type UpdateHook = Rc<dyn Fn(&mut Store, RecordId) -> StoreResult<()>>;
/// Fired with `(owner, target)` after a relation gained or lost `target`.
pub type RelationHook = Rc<dyn Fn(&mut Store, RecordId, RecordId) -> StoreResult<()>>;
/// Orders the records of a many relation.
pub type RecordOrder = Rc<dyn Fn(&mut Store, RecordId, RecordId) -> Ordering>;
/// Orders the elements of a list-valued attribute.
pub type ValueOrder = Rc<dyn Fn(&Value, &Value) -> Ordering>;

/// Field kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Attr,
    One,
    Many,
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    One,
    Many,
}

/// Scalar field options.
#[derive(Clone)]
pub struct AttrField {
    pub(crate) default: Value,
    pub(crate) compute: Option<ComputeFn>,
    pub(crate) eager: bool,
    pub(crate) html: bool,
    pub(crate) on_update: Option<UpdateHook>,
    pub(crate) sort: Option<ValueOrder>,
    pub(crate) coerce: Option<AttrType>,
}

/// Relational field options.
#[derive(Clone)]
pub struct RelationField {
    pub(crate) kind: RelationKind,
    pub(crate) target: String,
    pub(crate) compute: Option<ComputeFn>,
    pub(crate) eager: bool,
    pub(crate) inverse: Option<String>,
    pub(crate) on_add: Option<RelationHook>,
    pub(crate) on_delete: Option<RelationHook>,
    pub(crate) on_update: Option<UpdateHook>,
    pub(crate) sort: Option<RecordOrder>,
}

/// Declared field of a model.
#[derive(Clone, Debug)]
pub enum FieldDescriptor {
    Attr(AttrField),
    Relation(RelationField),
}

/// Declares a scalar field with a `Null` default.
pub fn attr() -> AttrField {
    AttrField {
        default: Value::Null,
        compute: None,
        eager: false,
        html: false,
        on_update: None,
        sort: None,
        coerce: None,
    }
}

/// Declares a single-valued relation to `target`.
pub fn one(target: impl Into<String>) -> RelationField {
    RelationField::new(RelationKind::One, target.into())
}

/// Declares a multi-valued relation to `target`.
pub fn many(target: impl Into<String>) -> RelationField {
    RelationField::new(RelationKind::Many, target.into())
}

impl AttrField {
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn compute(
        mut self,
        compute: impl Fn(&mut Store, RecordId) -> StoreResult<FieldInput> + 'static,
    ) -> Self {
        self.compute = Some(Rc::new(compute));
        self
    }

    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Marks the field as markup: untrusted writes are escaped.
    pub fn html(mut self) -> Self {
        self.html = true;
        self
    }

    pub fn on_update(
        mut self,
        hook: impl Fn(&mut Store, RecordId) -> StoreResult<()> + 'static,
    ) -> Self {
        self.on_update = Some(Rc::new(hook));
        self
    }

    /// Keeps list values ordered by `order`.
    pub fn sort(mut self, order: impl Fn(&Value, &Value) -> Ordering + 'static) -> Self {
        self.sort = Some(Rc::new(order));
        self
    }

    pub fn date(mut self) -> Self {
        self.coerce = Some(AttrType::Date);
        self
    }

    pub fn datetime(mut self) -> Self {
        self.coerce = Some(AttrType::DateTime);
        self
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_html(&self) -> bool {
        self.html
    }
}

impl RelationField {
    fn new(kind: RelationKind, target: String) -> Self {
        Self {
            kind,
            target,
            compute: None,
            eager: false,
            inverse: None,
            on_add: None,
            on_delete: None,
            on_update: None,
            sort: None,
        }
    }

    pub fn compute(
        mut self,
        compute: impl Fn(&mut Store, RecordId) -> StoreResult<FieldInput> + 'static,
    ) -> Self {
        self.compute = Some(Rc::new(compute));
        self
    }

    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Names the field on the target model kept consistent with this one.
    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    pub fn on_add(
        mut self,
        hook: impl Fn(&mut Store, RecordId, RecordId) -> StoreResult<()> + 'static,
    ) -> Self {
        self.on_add = Some(Rc::new(hook));
        self
    }

    pub fn on_delete(
        mut self,
        hook: impl Fn(&mut Store, RecordId, RecordId) -> StoreResult<()> + 'static,
    ) -> Self {
        self.on_delete = Some(Rc::new(hook));
        self
    }

    pub fn on_update(
        mut self,
        hook: impl Fn(&mut Store, RecordId) -> StoreResult<()> + 'static,
    ) -> Self {
        self.on_update = Some(Rc::new(hook));
        self
    }

    /// Keeps the relation ordered by `order` after every add/remove and
    /// whenever a field read by `order` changes.
    pub fn sort(
        mut self,
        order: impl Fn(&mut Store, RecordId, RecordId) -> Ordering + 'static,
    ) -> Self {
        self.sort = Some(Rc::new(order));
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn inverse_field(&self) -> Option<&str> {
        self.inverse.as_deref()
    }
}

impl FieldDescriptor {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Attr(_) => FieldKind::Attr,
            Self::Relation(field) => match field.kind {
                RelationKind::One => FieldKind::One,
                RelationKind::Many => FieldKind::Many,
            },
        }
    }

    pub fn compute_fn(&self) -> Option<&ComputeFn> {
        match self {
            Self::Attr(field) => field.compute.as_ref(),
            Self::Relation(field) => field.compute.as_ref(),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.compute_fn().is_some()
    }

    pub fn is_eager(&self) -> bool {
        match self {
            Self::Attr(field) => field.eager,
            Self::Relation(field) => field.eager,
        }
    }

    pub fn on_update_hook(&self) -> Option<&UpdateHook> {
        match self {
            Self::Attr(field) => field.on_update.as_ref(),
            Self::Relation(field) => field.on_update.as_ref(),
        }
    }

    pub fn has_sort(&self) -> bool {
        match self {
            Self::Attr(field) => field.sort.is_some(),
            Self::Relation(field) => field.sort.is_some(),
        }
    }

    pub fn as_relation(&self) -> Option<&RelationField> {
        match self {
            Self::Relation(field) => Some(field),
            Self::Attr(_) => None,
        }
    }

    pub fn as_attr(&self) -> Option<&AttrField> {
        match self {
            Self::Attr(field) => Some(field),
            Self::Relation(_) => None,
        }
    }
}

impl From<AttrField> for FieldDescriptor {
    fn from(value: AttrField) -> Self {
        Self::Attr(value)
    }
}

impl From<RelationField> for FieldDescriptor {
    fn from(value: RelationField) -> Self {
        Self::Relation(value)
    }
}

impl Debug for AttrField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttrField")
            .field("default", &self.default)
            .field("computed", &self.compute.is_some())
            .field("eager", &self.eager)
            .field("html", &self.html)
            .field("on_update", &self.on_update.is_some())
            .field("sorted", &self.sort.is_some())
            .field("coerce", &self.coerce)
            .finish()
    }
}

impl Debug for RelationField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationField")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("computed", &self.compute.is_some())
            .field("eager", &self.eager)
            .field("inverse", &self.inverse)
            .field("on_add", &self.on_add.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("sorted", &self.sort.is_some())
            .finish()
    }
}
