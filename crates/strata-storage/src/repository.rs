//! Named repository sessions and their registry.
//!
//! A [`Repository`] binds one name to one backing [`Adapter`] and
//! orchestrates every read and write: finder queries run through the
//! condition translator, raw rows come back through discriminator resolution
//! and materialization, and row mutations dump-coerce values on the way out.
//!
//! [`RepositorySet`] is the explicit registry (no process globals): exactly
//! one repository may exist per name, registered once at setup time and
//! reused for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use strata_core::{ModelDef, ModelId, Schema, Value};

use crate::adapter::{Adapter, RawRow};
use crate::error::StorageError;
use crate::hooks::Hooks;
use crate::query::{translate, translate_unscoped, Projection, Query};
use crate::resource::Resource;

/// A named session bound to one backing adapter.
pub struct Repository {
    name: String,
    schema: Arc<Schema>,
    hooks: Arc<Hooks>,
    adapter: Mutex<Box<dyn Adapter>>,
    /// Back-reference to the owning `Arc`, so resources can hold their
    /// repository. Always upgradable while a method runs.
    this: Weak<Repository>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub(crate) fn new(
        name: String,
        schema: Arc<Schema>,
        hooks: Arc<Hooks>,
        adapter: Box<dyn Adapter>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Repository {
            name,
            schema,
            hooks,
            adapter: Mutex::new(adapter),
            this: this.clone(),
        })
    }

    /// The owning `Arc` handle. Repositories only ever live inside the `Arc`
    /// built by [`Repository::new`], so the upgrade cannot fail while a
    /// borrow of `self` exists.
    pub(crate) fn handle(&self) -> Arc<Repository> {
        self.this.upgrade().expect("repository is always Arc-owned")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    // -------------------------------------------------------------------
    // Finder surface
    // -------------------------------------------------------------------

    /// Returns every resource matching the query, in adapter order, each
    /// instantiated as its row's concrete type.
    pub fn all(&self, model: ModelId, query: Query) -> Result<Vec<Resource>, StorageError> {
        let plan = translate(&self.schema, model, &query)?;
        tracing::debug!("read {} with {} clause(s)", plan.storage, plan.clauses.len());
        let rows = self
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(&plan)?;
        let full = matches!(plan.projection, Projection::All);
        rows.into_iter()
            .map(|row| self.materialize(model, row, full))
            .collect()
    }

    /// Returns the first resource matching the query, if any.
    pub fn first(
        &self,
        model: ModelId,
        query: Query,
    ) -> Result<Option<Resource>, StorageError> {
        Ok(self.all(model, query.limit(1))?.into_iter().next())
    }

    /// Looks up a resource by its key values, within default scope.
    pub fn get(
        &self,
        model: ModelId,
        key: &[Value],
    ) -> Result<Option<Resource>, StorageError> {
        let def = self.schema.model(model);
        let query = key_query(def, key)?;
        self.first(model, query)
    }

    /// Strict key lookup: absence is an [`StorageError::ObjectNotFound`],
    /// never silently substituted.
    pub fn fetch(&self, model: ModelId, key: &[Value]) -> Result<Resource, StorageError> {
        let def = self.schema.model(model);
        self.get(model, key)?.ok_or_else(|| StorageError::ObjectNotFound {
            model: def.name.clone(),
            key: display_key(key),
        })
    }

    // -------------------------------------------------------------------
    // CRUD entry points
    // -------------------------------------------------------------------

    /// Builds a new, unsaved resource. Key and private properties in the
    /// attribute list are skipped (mass-assignment protection).
    pub fn build(
        &self,
        model: ModelId,
        attributes: Vec<(&str, Value)>,
    ) -> Result<Resource, StorageError> {
        Resource::new(self.handle(), model, attributes)
    }

    /// Builds and immediately saves a resource.
    pub fn create(
        &self,
        model: ModelId,
        attributes: Vec<(&str, Value)>,
    ) -> Result<Resource, StorageError> {
        let mut resource = self.build(model, attributes)?;
        resource.save()?;
        Ok(resource)
    }

    // -------------------------------------------------------------------
    // Row operations used by the resource lifecycle
    // -------------------------------------------------------------------

    /// Fetches the full backing row for a key, outside default scope.
    /// Identity lookups (reload, lazy load) address rows by key alone.
    pub(crate) fn read_row_by_key(
        &self,
        model: ModelId,
        key: &[Value],
    ) -> Result<Option<RawRow>, StorageError> {
        let def = self.schema.model(model);
        let query = key_query(def, key)?.limit(1);
        let plan = translate_unscoped(&self.schema, model, &query)?;
        let rows = self
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(&plan)?;
        Ok(rows.into_iter().next())
    }

    pub(crate) fn insert_row(
        &self,
        def: &ModelDef,
        values: &RawRow,
    ) -> Result<Option<Value>, StorageError> {
        tracing::debug!("insert into {} ({} column(s))", def.storage_name, values.len());
        let serial = def.serial_property().map(|(_, p)| p.name.clone());
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .create(&def.storage_name, values, serial.as_deref())
    }

    pub(crate) fn update_rows(
        &self,
        def: &ModelDef,
        key: &[(String, Value)],
        shadow: &[(String, Value)],
        changes: &RawRow,
    ) -> Result<usize, StorageError> {
        tracing::debug!("update {} ({} change(s))", def.storage_name, changes.len());
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&def.storage_name, key, shadow, changes)
    }

    pub(crate) fn delete_rows(
        &self,
        def: &ModelDef,
        key: &[(String, Value)],
    ) -> Result<bool, StorageError> {
        tracing::debug!("delete from {}", def.storage_name);
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .delete(&def.storage_name, key)
    }

    /// Turns one raw row into a resource of its concrete type: the
    /// discriminator picks the model to instantiate, and only fetched
    /// columns are marked loaded.
    fn materialize(
        &self,
        queried: ModelId,
        row: RawRow,
        full: bool,
    ) -> Result<Resource, StorageError> {
        let def = self.schema.model(queried);
        let concrete = match &def.discriminator {
            Some(column) => {
                let raw = row.get(column).cloned().unwrap_or(Value::Nil);
                self.schema.resolve_row_model(queried, &raw)?
            }
            None => queried,
        };
        Resource::from_row(self.handle(), concrete, row, full)
    }
}

/// Builds the key-equality query for a key tuple, checking arity.
fn key_query(def: &ModelDef, key: &[Value]) -> Result<Query, StorageError> {
    let key_properties = def.key_properties();
    if key.is_empty() || key_properties.len() != key.len() {
        return Err(StorageError::MissingKey {
            model: def.name.clone(),
        });
    }
    let mut query = Query::new();
    for ((_, property), value) in key_properties.iter().zip(key) {
        query = query.eq(property.name.clone(), value.clone());
    }
    Ok(query)
}

pub(crate) fn display_key(key: &[Value]) -> String {
    key.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Registry of named repositories sharing one schema and hook set.
///
/// At most one adapter per name; lookups of never-registered names fail.
#[derive(Debug)]
pub struct RepositorySet {
    schema: Arc<Schema>,
    hooks: Arc<Hooks>,
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
}

impl RepositorySet {
    /// Freezes the schema and creates an empty registry.
    pub fn new(schema: Schema) -> Self {
        RepositorySet {
            schema: Arc::new(schema),
            hooks: Arc::new(Hooks::new()),
            repositories: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The hook registry shared by every repository of this set.
    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    /// Registers a repository under a name, binding it to the adapter.
    ///
    /// Returns [`StorageError::DuplicateRepository`] if the name is taken.
    pub fn setup(
        &self,
        name: &str,
        adapter: Box<dyn Adapter>,
    ) -> Result<Arc<Repository>, StorageError> {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if repositories.contains_key(name) {
            return Err(StorageError::DuplicateRepository {
                name: name.to_string(),
            });
        }
        let repository = Repository::new(
            name.to_string(),
            Arc::clone(&self.schema),
            Arc::clone(&self.hooks),
            adapter,
        );
        repositories.insert(name.to_string(), Arc::clone(&repository));
        tracing::debug!("repository '{}' registered", name);
        Ok(repository)
    }

    /// Looks up a registered repository by name.
    ///
    /// Returns [`StorageError::UnknownRepository`] for names never set up.
    pub fn repository(&self, name: &str) -> Result<Arc<Repository>, StorageError> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownRepository {
                name: name.to_string(),
            })
    }
}
