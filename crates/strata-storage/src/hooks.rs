//! Ordered lifecycle callbacks per model and event.
//!
//! Hook registration and semantics are an external capability the resource
//! lifecycle calls into: the save path invokes before/after callbacks
//! synchronously, ancestors first, in registration order within a model.
//! A failing callback aborts the operation.

use std::collections::HashMap;
use std::sync::RwLock;

use strata_core::{ModelId, Schema};

use crate::error::StorageError;
use crate::resource::Resource;

/// Lifecycle events the save path dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    AfterSave,
    AfterCreate,
    AfterUpdate,
}

type HookFn = Box<dyn Fn(&mut Resource) -> Result<(), StorageError> + Send + Sync>;

/// Registry of lifecycle callbacks, shared by all repositories of a set.
#[derive(Default)]
pub struct Hooks {
    registered: RwLock<HashMap<(ModelId, HookEvent), Vec<HookFn>>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for a model and event. Callbacks registered on a
    /// supertype also run for its subtypes' instances.
    pub fn register<F>(&self, model: ModelId, event: HookEvent, hook: F)
    where
        F: Fn(&mut Resource) -> Result<(), StorageError> + Send + Sync + 'static,
    {
        let mut registered = self
            .registered
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registered
            .entry((model, event))
            .or_default()
            .push(Box::new(hook));
    }

    /// Runs every callback for the event along the model's ancestry chain,
    /// root first, registration order within each model.
    pub(crate) fn run(
        &self,
        schema: &Schema,
        model: ModelId,
        event: HookEvent,
        resource: &mut Resource,
    ) -> Result<(), StorageError> {
        let registered = self
            .registered
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for ancestor in schema.ancestry(model) {
            if let Some(hooks) = registered.get(&(ancestor, event)) {
                for hook in hooks {
                    hook(resource)?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .registered
            .read()
            .map(|map| map.values().map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        f.debug_struct("Hooks").field("registered", &count).finish()
    }
}
