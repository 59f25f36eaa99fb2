//! Storage error types for strata-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the persistence
//! layer: unknown/duplicate repository names, strict-finder misses,
//! optimistic-lock conflicts, coercion failures surfaced from attribute
//! access, and schema violations bubbling up from the core.

use thiserror::Error;

use strata_core::{CoercionError, SchemaError};

/// Errors produced by persistence operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A repository name was requested that was never registered.
    #[error("unknown repository: '{name}'")]
    UnknownRepository { name: String },

    /// A second adapter was registered under an existing repository name.
    #[error("repository already registered: '{name}'")]
    DuplicateRepository { name: String },

    /// A strict key lookup found no matching row.
    #[error("object not found: model={model}, key=({key})")]
    ObjectNotFound { model: String, key: String },

    /// An optimistic-lock update matched zero rows: the shadowed original no
    /// longer matches the stored value. Saves are not retried.
    #[error("stale update rejected: model={model}, key=({key})")]
    StaleObject { model: String, key: String },

    /// A condition, field list, or attribute named an undeclared property.
    #[error("unknown property: model={model}, property={property}")]
    UnknownProperty { model: String, property: String },

    /// A persisted-instance operation was attempted without complete key
    /// values.
    #[error("missing key value(s): model={model}")]
    MissingKey { model: String },

    /// A raw stored value could not be coerced into its declared type.
    /// Surfaced at first access of the attribute, not at fetch time.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// A schema violation (definition-time or discriminator resolution).
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
