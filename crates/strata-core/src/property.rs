//! Property descriptors: static per-field metadata of a resource model.
//!
//! A [`Property`] is created at model-definition time and immutable
//! thereafter. Subtypes share inherited descriptors by reference
//! (`Arc<Property>` in the merged views held by [`crate::schema::Schema`]).

use serde::{Deserialize, Serialize};

use crate::types::TypeId;
use crate::value::Value;

/// Static metadata for one declared field of a resource model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    /// Property (and storage column) name.
    pub name: String,
    /// Semantic type, resolved through the coercion registry at the
    /// repository boundary.
    pub semantic_type: TypeId,
    /// Part of the primary key.
    pub is_key: bool,
    /// Storage-assigned on insert. Serial implies key.
    pub is_serial: bool,
    /// Protected by optimistic-lock shadowing.
    pub is_locked: bool,
    /// Excluded from mass assignment and the public attribute map.
    pub is_private: bool,
    /// Value reads resolve to when the attribute was never loaded on a new
    /// record.
    pub default: Value,
}

impl Property {
    /// Creates a plain property with no flags and a `Nil` default.
    pub fn new(name: impl Into<String>, semantic_type: TypeId) -> Self {
        Property {
            name: name.into(),
            semantic_type,
            is_key: false,
            is_serial: false,
            is_locked: false,
            is_private: false,
            default: Value::Nil,
        }
    }

    /// Marks the property as part of the primary key.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    /// Marks the property as storage-assigned serial. Serials are keys.
    pub fn serial(mut self) -> Self {
        self.is_serial = true;
        self.is_key = true;
        self
    }

    /// Enables optimistic-lock shadowing for the property.
    pub fn lock(mut self) -> Self {
        self.is_locked = true;
        self
    }

    /// Hides the property from mass assignment and public attribute maps.
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Sets the declared default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }
}
