//! Core error types for strata-core.
//!
//! [`SchemaError`] covers definition-time violations in model and type
//! declarations plus discriminator resolution failures. [`CoercionError`] is
//! a standalone struct because it travels with the attribute that failed and
//! is surfaced on first access, not at fetch time.

use thiserror::Error;

/// Errors produced while defining models and types, or while resolving a
/// row's concrete model from its discriminator value.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A model with the given name is already defined.
    #[error("duplicate model name: '{name}'")]
    DuplicateModel { name: String },

    /// A property name appears twice on a model, or a subtype redeclares an
    /// inherited property.
    #[error("duplicate property: model={model}, property={property}")]
    DuplicateProperty { model: String, property: String },

    /// Registering a semantic type name that already exists.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// A model was declared without any key property.
    #[error("model has no key property: '{model}'")]
    MissingKey { model: String },

    /// A model declared more than one discriminator property.
    #[error("model has multiple discriminator properties: '{model}'")]
    MultipleDiscriminators { model: String },

    /// A subtype was declared under a parent chain with no discriminator.
    #[error("cannot subtype '{model}': no discriminator property declared")]
    MissingDiscriminator { model: String },

    /// A model configuration names a property that does not exist.
    #[error("unknown property: model={model}, property={property}")]
    UnknownProperty { model: String, property: String },

    /// A stored discriminator value names no defined model.
    #[error("unknown discriminator value {value} on model '{model}'")]
    UnknownDiscriminator { model: String, value: String },

    /// A stored row is discriminated as a type outside the queried hierarchy.
    #[error("row discriminated as '{found}' is not a kind of '{queried}'")]
    DiscriminatorMismatch { queried: String, found: String },
}

/// A raw stored value could not be transformed by the load-transform
/// registered for its declared semantic type.
#[derive(Debug, Clone, Error)]
#[error("cannot coerce {value} into '{type_name}': {reason}")]
pub struct CoercionError {
    /// Name of the semantic type whose load-transform rejected the value.
    pub type_name: String,
    /// Display form of the offending raw value.
    pub value: String,
    /// What the transform expected.
    pub reason: String,
}
