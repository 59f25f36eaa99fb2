//! Model definitions, the inheritance forest, and discriminator resolution.
//!
//! A [`Schema`] owns every [`ModelDef`] plus the [`TypeRegistry`], and is
//! frozen (shared behind `Arc`) before repositories are set up. Models form
//! a forest: a subtype shares its root's storage name (single-table
//! inheritance) and inherits the merged property list by reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::SchemaError;
use crate::property::Property;
use crate::types::{TypeId, TypeRegistry};
use crate::value::Value;

/// Model identity within a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ordered tuple of key property values identifying one stored row.
/// Almost always a single value, hence the small-vector representation.
pub type Key = SmallVec<[Value; 1]>;

/// Logical-deletion configuration: destroy writes a marker instead of
/// removing the row, and default read scope excludes marked rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParanoidDelete {
    /// Destroy writes `Bool(true)` into the marker property.
    Flag { property: String },
    /// Destroy writes the current UTC time into the marker property.
    Timestamp { property: String },
}

impl ParanoidDelete {
    /// Name of the deleted-marker property.
    pub fn property(&self) -> &str {
        match self {
            ParanoidDelete::Flag { property } => property,
            ParanoidDelete::Timestamp { property } => property,
        }
    }
}

/// A defined resource model: its identity, storage mapping, merged property
/// list, and inheritance links.
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Type identity; stored verbatim in the discriminator column.
    pub name: String,
    /// Backing table name. Subtypes share their root's storage name.
    pub storage_name: String,
    /// Direct supertype, if any.
    pub parent: Option<ModelId>,
    /// Merged property list, ancestors first, insertion ordered. Inherited
    /// descriptors are shared by reference with the supertype.
    properties: IndexMap<String, Arc<Property>>,
    /// Name of the discriminator property, if one is declared on the chain.
    pub discriminator: Option<String>,
    /// Logical-deletion configuration, inherited by subtypes.
    pub paranoid: Option<ParanoidDelete>,
}

impl ModelDef {
    /// The merged property list (ancestors first).
    pub fn properties(&self) -> &IndexMap<String, Arc<Property>> {
        &self.properties
    }

    /// Looks up a property descriptor by name.
    pub fn property(&self, name: &str) -> Option<&Arc<Property>> {
        self.properties.get(name)
    }

    /// The slot index of a property in the merged list.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.properties.get_index_of(name)
    }

    /// The property at a slot index.
    pub fn property_at(&self, slot: usize) -> Option<(&String, &Arc<Property>)> {
        self.properties.get_index(slot)
    }

    /// Key properties with their slot indices, in declaration order.
    pub fn key_properties(&self) -> Vec<(usize, &Arc<Property>)> {
        self.properties
            .values()
            .enumerate()
            .filter(|(_, p)| p.is_key)
            .collect()
    }

    /// The storage-assigned serial property, if declared.
    pub fn serial_property(&self) -> Option<(usize, &Arc<Property>)> {
        self.properties
            .values()
            .enumerate()
            .find(|(_, p)| p.is_serial)
    }
}

/// Declaration of one model, consumed by [`Schema::define`] /
/// [`Schema::define_subtype`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    storage_name: Option<String>,
    properties: Vec<Property>,
    paranoid: Option<ParanoidDelete>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ModelBuilder {
            name: name.into(),
            storage_name: None,
            properties: Vec::new(),
            paranoid: None,
        }
    }

    /// Overrides the backing table name. Defaults to the model name;
    /// ignored on subtypes, which always share their root's table.
    pub fn storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    /// Declares a property.
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Configures flag-style logical deletion on the named property.
    pub fn paranoid_flag(mut self, property: impl Into<String>) -> Self {
        self.paranoid = Some(ParanoidDelete::Flag {
            property: property.into(),
        });
        self
    }

    /// Configures timestamp-style logical deletion on the named property.
    pub fn paranoid_timestamp(mut self, property: impl Into<String>) -> Self {
        self.paranoid = Some(ParanoidDelete::Timestamp {
            property: property.into(),
        });
        self
    }
}

/// Registry of all models and semantic types.
#[derive(Debug, Clone)]
pub struct Schema {
    models: Vec<ModelDef>,
    names: HashMap<String, ModelId>,
    /// Direct subtypes, indexed by ModelId.0, in definition order.
    children: Vec<Vec<ModelId>>,
    /// The semantic type coercion registry.
    pub types: TypeRegistry,
}

impl Schema {
    /// Creates an empty schema with the built-in semantic types.
    pub fn new() -> Self {
        Schema {
            models: Vec::new(),
            names: HashMap::new(),
            children: Vec::new(),
            types: TypeRegistry::new(),
        }
    }

    /// Defines a root model.
    ///
    /// Validates: unique model name, unique property names, at least one key
    /// property, at most one discriminator property, paranoid marker names a
    /// declared property.
    pub fn define(&mut self, builder: ModelBuilder) -> Result<ModelId, SchemaError> {
        if self.names.contains_key(&builder.name) {
            return Err(SchemaError::DuplicateModel { name: builder.name });
        }

        let mut properties: IndexMap<String, Arc<Property>> = IndexMap::new();
        let mut discriminator = None;
        for property in builder.properties {
            if properties.contains_key(&property.name) {
                return Err(SchemaError::DuplicateProperty {
                    model: builder.name,
                    property: property.name,
                });
            }
            if property.semantic_type == TypeId::DISCRIMINATOR {
                if discriminator.is_some() {
                    return Err(SchemaError::MultipleDiscriminators { model: builder.name });
                }
                discriminator = Some(property.name.clone());
            }
            properties.insert(property.name.clone(), Arc::new(property));
        }

        if !properties.values().any(|p| p.is_key) {
            return Err(SchemaError::MissingKey { model: builder.name });
        }
        if let Some(paranoid) = &builder.paranoid {
            if !properties.contains_key(paranoid.property()) {
                return Err(SchemaError::UnknownProperty {
                    model: builder.name,
                    property: paranoid.property().to_string(),
                });
            }
        }

        let storage_name = builder.storage_name.unwrap_or_else(|| builder.name.clone());
        self.insert(ModelDef {
            name: builder.name,
            storage_name,
            parent: None,
            properties,
            discriminator,
            paranoid: builder.paranoid,
        })
    }

    /// Defines a subtype of an existing model.
    ///
    /// The parent chain must carry a discriminator property. The subtype
    /// shares the parent's storage name and inherits its merged property
    /// list by reference; own properties are appended and may not redeclare
    /// inherited names or add a second discriminator.
    pub fn define_subtype(
        &mut self,
        parent: ModelId,
        builder: ModelBuilder,
    ) -> Result<ModelId, SchemaError> {
        if self.names.contains_key(&builder.name) {
            return Err(SchemaError::DuplicateModel { name: builder.name });
        }

        let parent_def = self.model(parent);
        if parent_def.discriminator.is_none() {
            return Err(SchemaError::MissingDiscriminator {
                model: parent_def.name.clone(),
            });
        }

        let storage_name = parent_def.storage_name.clone();
        let discriminator = parent_def.discriminator.clone();
        let parent_paranoid = parent_def.paranoid.clone();
        let mut properties = parent_def.properties.clone();

        for property in builder.properties {
            if properties.contains_key(&property.name) {
                return Err(SchemaError::DuplicateProperty {
                    model: builder.name,
                    property: property.name,
                });
            }
            if property.semantic_type == TypeId::DISCRIMINATOR {
                return Err(SchemaError::MultipleDiscriminators { model: builder.name });
            }
            properties.insert(property.name.clone(), Arc::new(property));
        }

        let paranoid = builder.paranoid.or(parent_paranoid);
        if let Some(p) = &paranoid {
            if !properties.contains_key(p.property()) {
                return Err(SchemaError::UnknownProperty {
                    model: builder.name,
                    property: p.property().to_string(),
                });
            }
        }

        let id = self.insert(ModelDef {
            name: builder.name,
            storage_name,
            parent: Some(parent),
            properties,
            discriminator,
            paranoid,
        })?;
        self.children[parent.0 as usize].push(id);
        Ok(id)
    }

    fn insert(&mut self, def: ModelDef) -> Result<ModelId, SchemaError> {
        let id = ModelId(self.models.len() as u32);
        self.names.insert(def.name.clone(), id);
        self.models.push(def);
        self.children.push(Vec::new());
        Ok(id)
    }

    /// The definition behind a model id.
    ///
    /// Ids are only minted by this schema's `define` methods; passing an id
    /// from another schema is a caller bug and panics.
    pub fn model(&self, id: ModelId) -> &ModelDef {
        &self.models[id.0 as usize]
    }

    /// Looks up a model id by type-identity name.
    pub fn find(&self, name: &str) -> Option<ModelId> {
        self.names.get(name).copied()
    }

    /// Number of defined models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// The ancestry chain of a model, root first, self last.
    pub fn ancestry(&self, id: ModelId) -> Vec<ModelId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.model(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// A model and all its transitive subtypes, in definition order.
    pub fn descendants(&self, id: ModelId) -> Vec<ModelId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            // Reversed so definition order survives the stack.
            for &child in self.children[current.0 as usize].iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Whether `id` is `ancestor` or one of its transitive subtypes.
    pub fn is_kind_of(&self, id: ModelId, ancestor: ModelId) -> bool {
        let mut current = id;
        loop {
            if current == ancestor {
                return true;
            }
            match self.model(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// The discriminator property and the type-identity names a finder on
    /// this model must accept: the model itself plus all descendants.
    ///
    /// `None` when the model declares no discriminator -- the common,
    /// non-polymorphic path, which performs no filtering.
    pub fn discriminator_scope(&self, id: ModelId) -> Option<(String, Vec<String>)> {
        let property = self.model(id).discriminator.clone()?;
        let names = self
            .descendants(id)
            .into_iter()
            .map(|m| self.model(m).name.clone())
            .collect();
        Some((property, names))
    }

    /// Resolves the concrete model of a stored row from its discriminator
    /// value.
    ///
    /// Non-discriminated models resolve to the queried model. A value naming
    /// no defined model, or a model outside the queried hierarchy, is an
    /// error -- corrupt rows are surfaced, not skipped.
    pub fn resolve_row_model(
        &self,
        queried: ModelId,
        raw: &Value,
    ) -> Result<ModelId, SchemaError> {
        let queried_def = self.model(queried);
        if queried_def.discriminator.is_none() {
            return Ok(queried);
        }

        let name = raw.as_text().ok_or_else(|| SchemaError::UnknownDiscriminator {
            model: queried_def.name.clone(),
            value: raw.to_string(),
        })?;
        let found = self
            .find(name)
            .ok_or_else(|| SchemaError::UnknownDiscriminator {
                model: queried_def.name.clone(),
                value: raw.to_string(),
            })?;
        if !self.is_kind_of(found, queried) {
            return Err(SchemaError::DiscriminatorMismatch {
                queried: queried_def.name.clone(),
                found: name.to_string(),
            });
        }
        Ok(found)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
