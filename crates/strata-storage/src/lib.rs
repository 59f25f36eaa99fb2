//! Persistence orchestration for strata resources.
//!
//! Coordinates reads and writes between in-memory [`Resource`] instances and
//! a backing [`Adapter`], through named [`Repository`] sessions. The adapter
//! is the external-collaborator boundary: real SQL dialects and I/O live
//! behind it, while this crate owns query translation, polymorphic
//! materialization, lazy attribute loading, and optimistic locking.
//!
//! # Modules
//!
//! - [`adapter`]: the [`Adapter`] trait and [`RawRow`] boundary types
//! - [`memory`]: [`MemoryAdapter`], a first-class in-memory backend
//! - [`query`]: symbolic [`Query`] conditions and [`QueryPlan`] translation
//! - [`repository`]: [`Repository`] and the [`RepositorySet`] name registry
//! - [`context`]: the scoped ambient-repository context
//! - [`resource`]: [`Resource`] instances and their attribute lifecycle
//! - [`hooks`]: ordered lifecycle callbacks per model and event
//! - [`error`]: [`StorageError`] with all failure modes

pub mod adapter;
pub mod context;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod query;
pub mod repository;
pub mod resource;

// Re-export key types for ergonomic use.
pub use adapter::{Adapter, RawRow};
pub use context::{with_repository, ContextGuard};
pub use error::StorageError;
pub use hooks::{HookEvent, Hooks};
pub use memory::MemoryAdapter;
pub use query::{Clause, Comparator, Condition, Projection, Query, QueryPlan};
pub use repository::{Repository, RepositorySet};
pub use resource::Resource;
