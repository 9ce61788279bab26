//! Reactive in-memory record store.
//!
//! Models are declared as schemas of attribute and relation fields. The
//! [`Store`] materializes records under a stable local id derived from each
//! model's identity, keeps inverse relations consistent, runs computed fields
//! and batches change effects into deterministic drains.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod reactive;
pub mod record;
pub(crate) mod scheduler;
pub mod store;

pub use config::StoreConfig;
pub use error::{ErrorKind, SchemaError, StoreError, StoreResult};
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget, LoggingError,
};
pub use model::field::{attr, many, one, FieldDescriptor, FieldKind, RelationKind};
pub use model::identity::Identity;
pub use model::schema::{ModelSchema, SchemaRegistry};
pub use model::value::Value;
pub use reactive::{FieldKey, ObserverId};
pub use record::list::RecordList;
pub use record::RecordId;
pub use store::data::{Data, FieldInput, InsertOptions, Payload, RecordInput, RelationCommand};
pub use store::Store;

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
