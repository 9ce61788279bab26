//! Declarative model layer.
//!
//! # Responsibility
//! - Describe models: identity, field descriptors and attribute values.
//! - Validate schemas before a store is built from them.
//!
//! # Invariants
//! - A record's local id is derived only from its model's identity fields.
//! - Schemas are immutable once a store owns them.

pub mod field;
pub mod identity;
pub mod schema;
pub mod value;
