//! In-memory implementation of [`Adapter`].
//!
//! [`MemoryAdapter`] is a first-class backend for tests, ephemeral sessions,
//! and anywhere real persistence isn't needed. Rows live in per-table
//! vectors in insertion order, which is also the order reads return them in,
//! so limit/offset windows are stable.

use std::cmp::Ordering;
use std::collections::HashMap;

use strata_core::Value;

use crate::adapter::{Adapter, RawRow};
use crate::error::StorageError;
use crate::query::{Clause, Comparator, Projection, QueryPlan};

/// Rows stored for one table.
#[derive(Debug, Default)]
struct Table {
    rows: Vec<RawRow>,
    next_serial: i64,
}

impl Table {
    fn new() -> Self {
        Table {
            rows: Vec::new(),
            next_serial: 1,
        }
    }
}

/// In-memory [`Adapter`] keeping all data in per-table row vectors.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: HashMap<String, Table>,
}

impl MemoryAdapter {
    /// Creates a new empty adapter.
    pub fn new() -> Self {
        MemoryAdapter {
            tables: HashMap::new(),
        }
    }

    fn table_mut(&mut self, storage: &str) -> &mut Table {
        self.tables
            .entry(storage.to_string())
            .or_insert_with(Table::new)
    }

    /// Raw row count of a table, for tests and diagnostics.
    pub fn row_count(&self, storage: &str) -> usize {
        self.tables.get(storage).map_or(0, |t| t.rows.len())
    }
}

/// Whether a row satisfies one clause. Absent columns read as `Nil`.
fn matches(row: &RawRow, clause: &Clause) -> bool {
    let value = row.get(&clause.column).unwrap_or(&Value::Nil);
    match &clause.cmp {
        Comparator::Eq(want) => value == want,
        Comparator::Ne(want) => value != want,
        Comparator::Gt(want) => value.compare(want) == Some(Ordering::Greater),
        Comparator::Gte(want) => {
            matches!(value.compare(want), Some(Ordering::Greater | Ordering::Equal))
        }
        Comparator::Lt(want) => value.compare(want) == Some(Ordering::Less),
        Comparator::Lte(want) => {
            matches!(value.compare(want), Some(Ordering::Less | Ordering::Equal))
        }
        Comparator::Between(low, high) => {
            matches!(value.compare(low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(value.compare(high), Some(Ordering::Less | Ordering::Equal))
        }
        Comparator::In(want) => want.contains(value),
    }
}

fn matches_pairs(row: &RawRow, pairs: &[(String, Value)]) -> bool {
    pairs
        .iter()
        .all(|(column, want)| row.get(column).unwrap_or(&Value::Nil) == want)
}

fn project(row: &RawRow, projection: &Projection) -> RawRow {
    match projection {
        Projection::All => row.clone(),
        Projection::Columns(columns) => columns
            .iter()
            .map(|c| {
                let value = row.get(c).cloned().unwrap_or(Value::Nil);
                (c.clone(), value)
            })
            .collect(),
    }
}

impl Adapter for MemoryAdapter {
    fn read(&self, plan: &QueryPlan) -> Result<Vec<RawRow>, StorageError> {
        let Some(table) = self.tables.get(&plan.storage) else {
            return Ok(Vec::new());
        };
        let rows = table
            .rows
            .iter()
            .filter(|row| plan.clauses.iter().all(|clause| matches(row, clause)))
            .skip(plan.offset.unwrap_or(0))
            .take(plan.limit.unwrap_or(usize::MAX))
            .map(|row| project(row, &plan.projection))
            .collect();
        Ok(rows)
    }

    fn create(
        &mut self,
        storage: &str,
        values: &RawRow,
        serial: Option<&str>,
    ) -> Result<Option<Value>, StorageError> {
        let table = self.table_mut(storage);
        let mut row = values.clone();
        let mut assigned = None;

        if let Some(column) = serial {
            match row.get(column) {
                None | Some(Value::Nil) => {
                    let value = Value::Int(table.next_serial);
                    table.next_serial += 1;
                    row.insert(column.to_string(), value.clone());
                    assigned = Some(value);
                }
                Some(Value::Int(given)) => {
                    // Keep the counter ahead of explicitly supplied keys.
                    table.next_serial = table.next_serial.max(given + 1);
                }
                Some(_) => {}
            }
        }

        table.rows.push(row);
        Ok(assigned)
    }

    fn update(
        &mut self,
        storage: &str,
        key: &[(String, Value)],
        shadow: &[(String, Value)],
        changes: &RawRow,
    ) -> Result<usize, StorageError> {
        let table = self.table_mut(storage);
        let mut affected = 0;
        for row in &mut table.rows {
            if matches_pairs(row, key) && matches_pairs(row, shadow) {
                for (column, value) in changes {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&mut self, storage: &str, key: &[(String, Value)]) -> Result<bool, StorageError> {
        let table = self.table_mut(storage);
        let before = table.rows.len();
        table.rows.retain(|row| !matches_pairs(row, key));
        Ok(table.rows.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn row(pairs: &[(&str, Value)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn plan(clauses: Vec<Clause>) -> QueryPlan {
        QueryPlan {
            storage: "things".to_string(),
            clauses,
            projection: Projection::All,
            limit: None,
            offset: None,
        }
    }

    fn seeded() -> MemoryAdapter {
        let mut adapter = MemoryAdapter::new();
        for i in 1..=5i64 {
            adapter
                .create(
                    "things",
                    &row(&[("name", Value::Text(format!("thing-{}", i)))]),
                    Some("id"),
                )
                .unwrap();
        }
        adapter
    }

    #[test]
    fn serial_keys_are_assigned_in_sequence() {
        let mut adapter = MemoryAdapter::new();
        let first = adapter.create("things", &IndexMap::new(), Some("id")).unwrap();
        let second = adapter.create("things", &IndexMap::new(), Some("id")).unwrap();
        assert_eq!(first, Some(Value::Int(1)));
        assert_eq!(second, Some(Value::Int(2)));
    }

    #[test]
    fn explicit_serial_advances_the_counter() {
        let mut adapter = MemoryAdapter::new();
        adapter
            .create("things", &row(&[("id", Value::Int(41))]), Some("id"))
            .unwrap();
        let assigned = adapter.create("things", &IndexMap::new(), Some("id")).unwrap();
        assert_eq!(assigned, Some(Value::Int(42)));
    }

    #[test]
    fn read_preserves_insertion_order() {
        let adapter = seeded();
        let rows = adapter.read(&plan(vec![])).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[4].get("id"), Some(&Value::Int(5)));
    }

    #[test]
    fn offset_then_limit() {
        let adapter = seeded();
        let mut p = plan(vec![]);
        p.offset = Some(2);
        p.limit = Some(2);
        let rows = adapter.read(&p).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(3)));
        assert_eq!(rows[1].get("id"), Some(&Value::Int(4)));
    }

    #[test]
    fn clause_evaluation() {
        let adapter = seeded();
        let rows = adapter
            .read(&plan(vec![Clause {
                column: "id".to_string(),
                cmp: Comparator::In(vec![Value::Int(2), Value::Int(4)]),
            }]))
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = adapter
            .read(&plan(vec![Clause {
                column: "id".to_string(),
                cmp: Comparator::Between(Value::Int(2), Value::Int(4)),
            }]))
            .unwrap();
        assert_eq!(rows.len(), 3);

        let rows = adapter
            .read(&plan(vec![Clause {
                column: "id".to_string(),
                cmp: Comparator::Gt(Value::Int(4)),
            }]))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn absent_columns_read_as_nil() {
        let adapter = seeded();
        let rows = adapter
            .read(&plan(vec![Clause {
                column: "color".to_string(),
                cmp: Comparator::Eq(Value::Nil),
            }]))
            .unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn projection_fills_missing_columns_with_nil() {
        let adapter = seeded();
        let mut p = plan(vec![]);
        p.projection = Projection::Columns(vec!["name".to_string(), "color".to_string()]);
        let rows = adapter.read(&p).unwrap();
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].get("color"), Some(&Value::Nil));
    }

    #[test]
    fn conditional_update_counts_affected_rows() {
        let mut adapter = seeded();
        let affected = adapter
            .update(
                "things",
                &[("id".to_string(), Value::Int(3))],
                &[],
                &row(&[("name", Value::Text("renamed".into()))]),
            )
            .unwrap();
        assert_eq!(affected, 1);

        // A failed shadow condition matches nothing.
        let affected = adapter
            .update(
                "things",
                &[("id".to_string(), Value::Int(3))],
                &[("name".to_string(), Value::Text("thing-3".into()))],
                &row(&[("name", Value::Text("again".into()))]),
            )
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn delete_by_key() {
        let mut adapter = seeded();
        assert!(adapter
            .delete("things", &[("id".to_string(), Value::Int(2))])
            .unwrap());
        assert_eq!(adapter.row_count("things"), 4);
        assert!(!adapter
            .delete("things", &[("id".to_string(), Value::Int(2))])
            .unwrap());
    }

    #[test]
    fn read_of_unknown_table_is_empty() {
        let adapter = MemoryAdapter::new();
        let mut p = plan(vec![]);
        p.storage = "nowhere".to_string();
        assert!(adapter.read(&p).unwrap().is_empty());
    }
}
