//! The [`Adapter`] trait defining the backing-store contract.
//!
//! Everything below this boundary -- SQL dialect generation, wire protocols,
//! real I/O -- is an external collaborator. The core hands an adapter a
//! translated [`QueryPlan`] or raw column/value pairs and consumes raw rows
//! back; all typing and coercion happen above the boundary.
//!
//! The trait is synchronous: single-repository operations are blocking calls
//! by design, and concurrency is expected across repositories, not within
//! one.

use indexmap::IndexMap;

use strata_core::Value;

use crate::error::StorageError;
use crate::query::QueryPlan;

/// One raw storage row: column name to raw (uncoerced) value, in stable
/// column order. A column that was never written reads back as `Nil`.
pub type RawRow = IndexMap<String, Value>;

/// The backing-store contract.
///
/// Implementations execute query plans and row mutations against one
/// connection. `MemoryAdapter` is the in-tree backend; SQL adapters live
/// outside this crate.
pub trait Adapter: Send {
    /// Executes a query plan, returning matching raw rows in backend order.
    fn read(&self, plan: &QueryPlan) -> Result<Vec<RawRow>, StorageError>;

    /// Inserts one row. When `serial` names a column absent (or `Nil`) in
    /// `values`, the adapter assigns it and returns the assigned key.
    fn create(
        &mut self,
        storage: &str,
        values: &RawRow,
        serial: Option<&str>,
    ) -> Result<Option<Value>, StorageError>;

    /// Updates rows matching `key` and every `shadow` condition with the
    /// given changes, returning the number of affected rows. Zero affected
    /// rows under shadow conditions is how optimistic-lock conflicts
    /// surface.
    fn update(
        &mut self,
        storage: &str,
        key: &[(String, Value)],
        shadow: &[(String, Value)],
        changes: &RawRow,
    ) -> Result<usize, StorageError>;

    /// Deletes rows matching `key`. Returns whether anything was removed.
    fn delete(&mut self, storage: &str, key: &[(String, Value)]) -> Result<bool, StorageError>;
}
