//! Store error taxonomy.
//!
//! # Responsibility
//! - Define every failure the record store can surface to callers.
//! - Classify failures into configuration, consistency and runtime kinds.
//!
//! # Invariants
//! - Configuration and consistency errors propagate to the caller unchanged.
//! - Tolerated inconsistencies (inverse cleanup hitting an already removed
//!   record) never become errors; they are logged and skipped.

use crate::record::RecordId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification of a `StoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema or call-site misuse, raised synchronously at the call site.
    Configuration,
    /// Operation referenced state that does not exist in this store.
    Consistency,
    /// Failure raised while draining effects.
    Runtime,
}

/// Errors raised while validating model schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidModelName(String),
    InvalidFieldName { model: String, field: String },
    DuplicateModel(String),
    DuplicateField { model: String, field: String },
    UnknownIdentityField { model: String, field: String },
    /// Identity components must be single-valued.
    ManyIdentity { model: String, field: String },
    EmptyIdentityGroup(String),
    UnknownTarget { model: String, field: String, target: String },
    UnknownInverse { model: String, field: String, inverse: String },
    InverseNotRelational { model: String, field: String, inverse: String },
    InverseMismatch { model: String, field: String, inverse: String },
    SortOnOne { model: String, field: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidModelName(name) => write!(f, "invalid model name `{name}`"),
            Self::InvalidFieldName { model, field } => {
                write!(f, "invalid field name `{field}` on model `{model}`")
            }
            Self::DuplicateModel(name) => write!(f, "model already registered: {name}"),
            Self::DuplicateField { model, field } => {
                write!(f, "field `{field}` declared twice on model `{model}`")
            }
            Self::UnknownIdentityField { model, field } => write!(
                f,
                "identity of model `{model}` references unknown field `{field}`"
            ),
            Self::ManyIdentity { model, field } => write!(
                f,
                "identity of model `{model}` cannot use many relation `{field}`"
            ),
            Self::EmptyIdentityGroup(model) => {
                write!(f, "identity of model `{model}` has an empty AND/OR group")
            }
            Self::UnknownTarget {
                model,
                field,
                target,
            } => write!(
                f,
                "relation `{model}.{field}` targets unknown model `{target}`"
            ),
            Self::UnknownInverse {
                model,
                field,
                inverse,
            } => write!(
                f,
                "relation `{model}.{field}` declares unknown inverse `{inverse}`"
            ),
            Self::InverseNotRelational {
                model,
                field,
                inverse,
            } => write!(
                f,
                "inverse `{inverse}` of `{model}.{field}` is not a relation back to `{model}`"
            ),
            Self::InverseMismatch {
                model,
                field,
                inverse,
            } => write!(
                f,
                "inverse `{inverse}` of `{model}.{field}` is already paired with another field"
            ),
            Self::SortOnOne { model, field } => {
                write!(f, "sort is only supported on many relations: `{model}.{field}`")
            }
        }
    }
}

impl Error for SchemaError {}

/// Store operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Schema(SchemaError),
    Config(String),
    UnknownModel(String),
    UnknownField { model: String, field: String },
    /// Record handle is hard-deleted or belongs to another store.
    RecordNotFound(RecordId),
    /// Relation received a record of the wrong model.
    WrongModel {
        expected: String,
        actual: String,
    },
    /// Identity fields missing from the payload used to create a record.
    MissingIdentity(String),
    /// A bare scalar payload was given to a model without single-field identity.
    ScalarIdentityUnsupported(String),
    TypeMismatch {
        model: String,
        field: String,
        message: String,
    },
    DrainLimitExceeded { passes: u32 },
    /// Error returned by a user compute, hook or observer.
    Callback(String),
}

impl StoreError {
    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_)
            | Self::Config(_)
            | Self::UnknownModel(_)
            | Self::UnknownField { .. }
            | Self::MissingIdentity(_)
            | Self::ScalarIdentityUnsupported(_)
            | Self::TypeMismatch { .. } => ErrorKind::Configuration,
            Self::RecordNotFound(_) | Self::WrongModel { .. } => ErrorKind::Consistency,
            Self::DrainLimitExceeded { .. } | Self::Callback(_) => ErrorKind::Runtime,
        }
    }

    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::Config(message) => write!(f, "invalid store config: {message}"),
            Self::UnknownModel(name) => write!(f, "model not registered: {name}"),
            Self::UnknownField { model, field } => {
                write!(f, "model `{model}` has no field `{field}`")
            }
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::WrongModel { expected, actual } => write!(
                f,
                "relation expects a `{expected}` record, got `{actual}`"
            ),
            Self::MissingIdentity(model) => {
                write!(f, "payload does not resolve an identity for model `{model}`")
            }
            Self::ScalarIdentityUnsupported(model) => write!(
                f,
                "model `{model}` has no single-field identity; a bare scalar payload is ambiguous"
            ),
            Self::TypeMismatch {
                model,
                field,
                message,
            } => write!(f, "invalid value for `{model}.{field}`: {message}"),
            Self::DrainLimitExceeded { passes } => write!(
                f,
                "effect drain did not reach a fixpoint after {passes} passes"
            ),
            Self::Callback(message) => write!(f, "callback failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
