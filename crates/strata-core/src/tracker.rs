//! Per-instance attribute state tracking.
//!
//! [`AttributeTracker`] records which property slots are loaded, which are
//! dirty, and the shadowed originals of lock-protected properties. Slots are
//! positions in a model's merged property list, so the tracker stays free of
//! names and types. It is passive: lazy-load orchestration belongs to the
//! resource that owns it.

use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// Loaded/dirty/shadow state for one resource instance.
///
/// Invariant: a dirty slot is always loaded. [`mark_dirty`](Self::mark_dirty)
/// enforces this by marking the slot loaded first.
#[derive(Debug, Clone, Default)]
pub struct AttributeTracker {
    /// Slots whose current value reflects storage or explicit assignment.
    loaded: HashSet<usize>,
    /// Slots assigned since the last load/save.
    dirty: HashSet<usize>,
    /// Pre-mutation originals of lock-protected slots, captured at most once
    /// per save cycle.
    shadow: HashMap<usize, Value>,
}

impl AttributeTracker {
    /// Creates an empty tracker (nothing loaded, nothing dirty).
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a slot as loaded. Idempotent.
    pub fn mark_loaded(&mut self, slot: usize) {
        self.loaded.insert(slot);
    }

    /// Marks a slot as dirty (and therefore loaded).
    pub fn mark_dirty(&mut self, slot: usize) {
        self.loaded.insert(slot);
        self.dirty.insert(slot);
    }

    /// Captures the pre-mutation original of a lock-protected slot.
    /// Later captures for the same slot are ignored; the shadow always holds
    /// the value the slot had when the save cycle began.
    pub fn capture_shadow(&mut self, slot: usize, original: Value) {
        self.shadow.entry(slot).or_insert(original);
    }

    pub fn is_loaded(&self, slot: usize) -> bool {
        self.loaded.contains(&slot)
    }

    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.contains(&slot)
    }

    /// The shadowed original of a slot, if one was captured this cycle.
    pub fn shadow(&self, slot: usize) -> Option<&Value> {
        self.shadow.get(&slot)
    }

    pub fn has_shadow(&self, slot: usize) -> bool {
        self.shadow.contains_key(&slot)
    }

    /// Dirty slots in ascending order.
    pub fn dirty_slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self.dirty.iter().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Loaded slots in ascending order.
    pub fn loaded_slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self.loaded.iter().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Called after a successful save: clears dirty and shadow state, keeps
    /// loaded intact.
    pub fn clear_changes(&mut self) {
        self.dirty.clear();
        self.shadow.clear();
    }

    /// Called before a full reload: clears everything. The caller re-marks
    /// loaded from the full set of columns the backing row exposes.
    pub fn reset(&mut self) {
        self.loaded.clear();
        self.dirty.clear();
        self.shadow.clear();
    }
}
