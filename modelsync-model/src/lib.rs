//! Model registry for modelsync.
//!
//! Defines what the sync engine knows about the models it replicates:
//! - [`ModelSchema`]: a model's name, plural list name and declared fields
//! - [`ModelCapabilities`]: the optional well-known fields a model declares,
//!   computed once at registration time
//! - [`SchemaRegistry`]: the set of registered models plus the model-set version
//! - [`QueryPredicate`]: filter expressions sent to the backend and evaluated
//!   against local records
//!
//! Locale overlay models follow the `<Base>Locale` naming convention and are
//! resolved to their base model by the registry.

mod predicate;
mod registry;
mod schema;

pub use predicate::{Operator, QueryPredicate};
pub use registry::SchemaRegistry;
pub use schema::{FieldDef, FieldType, ModelCapabilities, ModelSchema, LOCALE_SUFFIX};

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by schema registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}
