//! Resource instances: typed attribute access over one backing row.
//!
//! A [`Resource`] combines a model's property descriptors with an
//! [`AttributeTracker`] and a reference to its owning repository. Reads of
//! attributes that were never fetched materialize lazily through the
//! repository; writes shadow lock-protected originals for optimistic
//! concurrency; saves move only what is dirty.
//!
//! Coercion failures found while merging a fetched row are deferred per
//! attribute and surfaced on first access, so one bad column never fails a
//! whole finder call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;

use strata_core::{
    AttributeTracker, CoercionError, Key, ModelDef, ModelId, ParanoidDelete, Schema, Value,
};

use crate::adapter::RawRow;
use crate::error::StorageError;
use crate::hooks::{HookEvent, Hooks};
use crate::repository::{display_key, Repository};

/// One in-memory entity backed by (at most) one stored row.
pub struct Resource {
    repository: Arc<Repository>,
    model: ModelId,
    /// Slot-aligned with the model's merged property list.
    values: Vec<Value>,
    tracker: AttributeTracker,
    /// Coercion failures deferred to first access of the attribute.
    failures: HashMap<usize, CoercionError>,
    new_record: bool,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("model", &self.model_name())
            .field("new_record", &self.new_record)
            .field("key", &self.key())
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Builds a new, unsaved resource.
    ///
    /// Key and private properties in the bulk attribute list are silently
    /// skipped (mass-assignment protection); they remain settable through
    /// [`set`](Self::set) and
    /// [`set_attributes_privileged`](Self::set_attributes_privileged).
    /// Every accepted attribute becomes loaded and dirty. The discriminator,
    /// when declared, is set to the concrete model's own type identity.
    pub(crate) fn new(
        repository: Arc<Repository>,
        model: ModelId,
        attributes: Vec<(&str, Value)>,
    ) -> Result<Self, StorageError> {
        let schema = Arc::clone(repository.schema());
        let def = schema.model(model);
        let mut resource = Resource {
            values: vec![Value::Nil; def.properties().len()],
            tracker: AttributeTracker::new(),
            failures: HashMap::new(),
            new_record: true,
            model,
            repository,
        };
        if let Some(column) = &def.discriminator {
            if let Some(slot) = def.slot(column) {
                resource.write_slot(slot, false, Value::Text(def.name.clone()));
            }
        }
        resource.assign(attributes, false)?;
        Ok(resource)
    }

    /// Materializes a resource from a fetched row. Only fetched columns are
    /// marked loaded and nothing is dirty; with `full` set, the row stands
    /// for the complete backing record and absent columns load as `Nil`.
    pub(crate) fn from_row(
        repository: Arc<Repository>,
        model: ModelId,
        row: RawRow,
        full: bool,
    ) -> Result<Self, StorageError> {
        let schema = Arc::clone(repository.schema());
        let def = schema.model(model);
        let mut resource = Resource {
            values: vec![Value::Nil; def.properties().len()],
            tracker: AttributeTracker::new(),
            failures: HashMap::new(),
            new_record: false,
            model,
            repository,
        };
        resource.merge_row(&schema, def, &row, full);
        Ok(resource)
    }

    // -------------------------------------------------------------------
    // Attribute access
    // -------------------------------------------------------------------

    /// Typed read of one attribute.
    ///
    /// Unloaded attributes on a persisted instance trigger a full-row fetch
    /// through the owning repository; unloaded attributes on a new record
    /// resolve to the declared default without storage access and without
    /// becoming loaded.
    pub fn get(&mut self, name: &str) -> Result<Value, StorageError> {
        let schema = Arc::clone(self.repository.schema());
        let def = schema.model(self.model);
        let slot = def
            .slot(name)
            .ok_or_else(|| unknown_property(def, name))?;

        if !self.tracker.is_loaded(slot) {
            if self.new_record {
                return Ok(def.properties()[slot].default.clone());
            }
            self.lazy_load(&schema, def)?;
        }
        if let Some(failure) = self.failures.get(&slot) {
            return Err(failure.clone().into());
        }
        Ok(self.values[slot].clone())
    }

    /// Privileged single-property setter: also writes key and private
    /// properties. Captures the shadow of a lock-protected property the
    /// first time a loaded value is overwritten.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StorageError> {
        let schema = Arc::clone(self.repository.schema());
        let def = schema.model(self.model);
        let slot = def
            .slot(name)
            .ok_or_else(|| unknown_property(def, name))?;
        let locked = def.properties()[slot].is_locked;
        self.write_slot(slot, locked, value.into());
        Ok(())
    }

    /// Protected bulk setter: key and private properties are skipped.
    pub fn set_attributes(&mut self, attributes: Vec<(&str, Value)>) -> Result<(), StorageError> {
        self.assign(attributes, false)
    }

    /// Privileged bulk setter: assigns every named property.
    pub fn set_attributes_privileged(
        &mut self,
        attributes: Vec<(&str, Value)>,
    ) -> Result<(), StorageError> {
        self.assign(attributes, true)
    }

    /// The public attribute map: every non-private property and its current
    /// value, reading through the normal (lazily loading) path.
    pub fn attributes(&mut self) -> Result<IndexMap<String, Value>, StorageError> {
        let schema = Arc::clone(self.repository.schema());
        let def = schema.model(self.model);
        let names: Vec<String> = def
            .properties()
            .values()
            .filter(|p| !p.is_private)
            .map(|p| p.name.clone())
            .collect();

        let mut out = IndexMap::with_capacity(names.len());
        for name in names {
            let value = self.get(&name)?;
            out.insert(name, value);
        }
        Ok(out)
    }

    fn assign(
        &mut self,
        attributes: Vec<(&str, Value)>,
        privileged: bool,
    ) -> Result<(), StorageError> {
        let schema = Arc::clone(self.repository.schema());
        let def = schema.model(self.model);
        for (name, value) in attributes {
            let slot = def
                .slot(name)
                .ok_or_else(|| unknown_property(def, name))?;
            let property = &def.properties()[slot];
            if !privileged && (property.is_key || property.is_private) {
                continue;
            }
            let locked = property.is_locked;
            self.write_slot(slot, locked, value);
        }
        Ok(())
    }

    fn write_slot(&mut self, slot: usize, locked: bool, value: Value) {
        if locked && self.tracker.is_loaded(slot) && !self.tracker.has_shadow(slot) {
            self.tracker.capture_shadow(slot, self.values[slot].clone());
        }
        self.values[slot] = value;
        self.tracker.mark_dirty(slot);
        self.failures.remove(&slot);
    }

    /// Merges a fetched row into this instance, load-coercing each column.
    /// Already-loaded slots (including dirty ones) are never overwritten;
    /// coercion failures are recorded per slot for first-access surfacing.
    fn merge_row(&mut self, schema: &Schema, def: &ModelDef, row: &RawRow, full: bool) {
        for (slot, (name, property)) in def.properties().iter().enumerate() {
            if self.tracker.is_loaded(slot) {
                continue;
            }
            if !full && !row.contains_key(name) {
                continue;
            }
            let raw = row.get(name).cloned().unwrap_or(Value::Nil);
            match schema.types.load(property.semantic_type, raw) {
                Ok(value) => {
                    self.values[slot] = value;
                }
                Err(failure) => {
                    self.values[slot] = Value::Nil;
                    self.failures.insert(slot, failure);
                }
            }
            self.tracker.mark_loaded(slot);
        }
    }

    fn lazy_load(&mut self, schema: &Schema, def: &ModelDef) -> Result<(), StorageError> {
        let key = self.key_values(def)?;
        let row = self
            .repository
            .read_row_by_key(self.model, &key)?
            .ok_or_else(|| StorageError::ObjectNotFound {
                model: def.name.clone(),
                key: display_key(&key),
            })?;
        self.merge_row(schema, def, &row, true);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Persistence lifecycle
    // -------------------------------------------------------------------

    /// Saves the instance: an insert of all loaded properties for a new
    /// record, an update of dirty properties otherwise.
    ///
    /// Updates match on the primary key plus the shadowed originals of
    /// lock-protected properties. Zero affected rows under lock conditions
    /// is a [`StorageError::StaleObject`]; zero affected rows without them
    /// returns `Ok(false)`. On success, dirty and shadow state are cleared
    /// and the instance is no longer a new record.
    pub fn save(&mut self) -> Result<bool, StorageError> {
        let schema = Arc::clone(self.repository.schema());
        let hooks = Arc::clone(self.repository.hooks());
        hooks.run(&schema, self.model, HookEvent::BeforeSave, self)?;
        if self.new_record {
            self.insert(&schema, &hooks)
        } else {
            self.update(&schema, &hooks)
        }
    }

    fn insert(&mut self, schema: &Schema, hooks: &Hooks) -> Result<bool, StorageError> {
        hooks.run(schema, self.model, HookEvent::BeforeCreate, self)?;
        let def = schema.model(self.model);

        let mut row = RawRow::new();
        for (slot, (name, property)) in def.properties().iter().enumerate() {
            if self.tracker.is_loaded(slot) {
                // Unassigned serials are left to the storage to fill in.
                if property.is_serial && self.values[slot].is_nil() {
                    continue;
                }
            } else if !property.default.is_nil() {
                // Declared defaults are written for attributes never
                // assigned, and from here on reflect storage.
                self.values[slot] = property.default.clone();
                self.tracker.mark_loaded(slot);
            } else {
                continue;
            }
            row.insert(
                name.clone(),
                schema.types.dump(property.semantic_type, self.values[slot].clone()),
            );
        }

        let assigned = self.repository.insert_row(def, &row)?;
        if let Some(value) = assigned {
            if let Some((slot, _)) = def.serial_property() {
                self.values[slot] = value;
                self.tracker.mark_loaded(slot);
            }
        }
        self.new_record = false;
        self.tracker.clear_changes();
        hooks.run(schema, self.model, HookEvent::AfterCreate, self)?;
        hooks.run(schema, self.model, HookEvent::AfterSave, self)?;
        Ok(true)
    }

    fn update(&mut self, schema: &Schema, hooks: &Hooks) -> Result<bool, StorageError> {
        if self.tracker.dirty_slots().is_empty() {
            return Ok(true);
        }
        hooks.run(schema, self.model, HookEvent::BeforeUpdate, self)?;
        let def = schema.model(self.model);

        let mut changes = RawRow::new();
        for slot in self.tracker.dirty_slots() {
            let Some((name, property)) = def.property_at(slot) else {
                continue;
            };
            changes.insert(
                name.clone(),
                schema.types.dump(property.semantic_type, self.values[slot].clone()),
            );
        }

        // Key match uses the shadowed original when the key itself was
        // mutated under lock.
        let mut key_conditions = Vec::new();
        for (slot, property) in def.key_properties() {
            let current = self.tracker.shadow(slot).unwrap_or(&self.values[slot]);
            if !self.tracker.is_loaded(slot) || current.is_nil() {
                return Err(StorageError::MissingKey {
                    model: def.name.clone(),
                });
            }
            key_conditions.push((
                property.name.clone(),
                schema.types.dump(property.semantic_type, current.clone()),
            ));
        }

        let mut shadow_conditions = Vec::new();
        let mut locked = false;
        for (slot, (name, property)) in def.properties().iter().enumerate() {
            if let Some(original) = self.tracker.shadow(slot) {
                locked = true;
                if !property.is_key {
                    shadow_conditions.push((
                        name.clone(),
                        schema.types.dump(property.semantic_type, original.clone()),
                    ));
                }
            }
        }

        let affected =
            self.repository
                .update_rows(def, &key_conditions, &shadow_conditions, &changes)?;
        if affected == 0 {
            if locked {
                return Err(StorageError::StaleObject {
                    model: def.name.clone(),
                    key: display_key(&self.key()),
                });
            }
            return Ok(false);
        }
        self.tracker.clear_changes();
        hooks.run(schema, self.model, HookEvent::AfterUpdate, self)?;
        hooks.run(schema, self.model, HookEvent::AfterSave, self)?;
        Ok(true)
    }

    /// Destroys the instance: a physical delete keyed by the primary key,
    /// or -- for paranoid models -- a marker write that removes the row from
    /// default finder scope while keeping it materialized.
    pub fn destroy(&mut self) -> Result<bool, StorageError> {
        if self.new_record {
            return Ok(false);
        }
        let schema = Arc::clone(self.repository.schema());
        let paranoid = schema.model(self.model).paranoid.clone();
        match paranoid {
            Some(ParanoidDelete::Flag { property }) => {
                self.set(&property, Value::Bool(true))?;
                self.save()
            }
            Some(ParanoidDelete::Timestamp { property }) => {
                self.set(&property, Value::DateTime(Utc::now()))?;
                self.save()
            }
            None => {
                let def = schema.model(self.model);
                let key_conditions = self.key_conditions(&schema, def)?;
                self.repository.delete_rows(def, &key_conditions)
            }
        }
    }

    /// Re-fetches the full backing row and resets all attribute state.
    /// A no-op on a new (unsaved) record.
    pub fn reload(&mut self) -> Result<(), StorageError> {
        if self.new_record {
            return Ok(());
        }
        let schema = Arc::clone(self.repository.schema());
        let def = schema.model(self.model);
        let key = self.key_values(def)?;
        let row = self
            .repository
            .read_row_by_key(self.model, &key)?
            .ok_or_else(|| StorageError::ObjectNotFound {
                model: def.name.clone(),
                key: display_key(&key),
            })?;
        self.tracker.reset();
        self.failures.clear();
        for value in &mut self.values {
            *value = Value::Nil;
        }
        self.merge_row(&schema, def, &row, true);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------

    /// The ordered tuple of key property values (`Nil` where unloaded).
    pub fn key(&self) -> Key {
        let def = self.repository.schema().model(self.model);
        def.key_properties()
            .iter()
            .map(|(slot, _)| self.values[*slot].clone())
            .collect()
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    /// The concrete type identity of this instance.
    pub fn model_name(&self) -> &str {
        &self.repository.schema().model(self.model).name
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn attribute_loaded(&self, name: &str) -> bool {
        let def = self.repository.schema().model(self.model);
        def.slot(name)
            .is_some_and(|slot| self.tracker.is_loaded(slot))
    }

    pub fn attribute_dirty(&self, name: &str) -> bool {
        let def = self.repository.schema().model(self.model);
        def.slot(name).is_some_and(|slot| self.tracker.is_dirty(slot))
    }

    /// The shadowed pre-mutation original of a lock-protected attribute, if
    /// one was captured this save cycle.
    pub fn shadow_attribute(&self, name: &str) -> Option<&Value> {
        let def = self.repository.schema().model(self.model);
        self.tracker.shadow(def.slot(name)?)
    }

    /// Names of the attributes assigned since the last load/save.
    pub fn dirty_attributes(&self) -> Vec<String> {
        let def = self.repository.schema().model(self.model);
        self.tracker
            .dirty_slots()
            .into_iter()
            .filter_map(|slot| def.property_at(slot).map(|(name, _)| name.clone()))
            .collect()
    }

    // -------------------------------------------------------------------
    // Key helpers
    // -------------------------------------------------------------------

    fn key_values(&self, def: &ModelDef) -> Result<Key, StorageError> {
        let mut key = Key::new();
        for (slot, _) in def.key_properties() {
            if !self.tracker.is_loaded(slot) || self.values[slot].is_nil() {
                return Err(StorageError::MissingKey {
                    model: def.name.clone(),
                });
            }
            key.push(self.values[slot].clone());
        }
        Ok(key)
    }

    fn key_conditions(
        &self,
        schema: &Schema,
        def: &ModelDef,
    ) -> Result<Vec<(String, Value)>, StorageError> {
        let key = self.key_values(def)?;
        Ok(def
            .key_properties()
            .iter()
            .zip(key)
            .map(|((_, property), value)| {
                (
                    property.name.clone(),
                    schema.types.dump(property.semantic_type, value),
                )
            })
            .collect())
    }
}

fn unknown_property(def: &ModelDef, name: &str) -> StorageError {
    StorageError::UnknownProperty {
        model: def.name.clone(),
        property: name.to_string(),
    }
}
