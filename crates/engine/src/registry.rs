//! Table component registry.
//!
//! Table widgets register their capability set on mount and remove it on
//! unmount. The coordinator consults the registry for focus validation and
//! navigation bounds; the command layer forwards shape mutations through
//! it. Unknown ids report `false`/`None`, never panic.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use gridpen_core::{GridPos, TableId};

/// Shared reference to one table's capability set.
pub type SharedTableOps = Rc<RefCell<dyn TableOps>>;

/// Partial table-data update: new markup per cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDataPatch {
    pub cells: Vec<(GridPos, String)>,
}

impl TableDataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, pos: GridPos, content: impl Into<String>) -> Self {
        self.cells.push((pos, content.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Capability set one table widget exposes.
///
/// Shape mutations report `false` when the index is out of range. Counts
/// cover body rows only; the header row is not part of the bounds.
pub trait TableOps {
    fn add_row(&mut self, index: usize) -> bool;
    fn remove_row(&mut self, index: usize) -> bool;
    fn add_column(&mut self, index: usize) -> bool;
    fn remove_column(&mut self, index: usize) -> bool;

    /// Apply a partial data update.
    fn update_data(&mut self, patch: &TableDataPatch) -> bool;

    /// The widget's own notion of the current cell, if it tracks one.
    fn current_position(&self) -> Option<GridPos>;

    /// Number of body rows.
    fn row_count(&self) -> usize;

    /// Number of columns.
    fn column_count(&self) -> usize;
}

/// Table id -> capability set lookup.
#[derive(Default)]
pub struct TableRegistry {
    tables: FxHashMap<TableId, SharedTableOps>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's capability set, replacing any previous entry.
    pub fn register(&mut self, table: TableId, ops: SharedTableOps) {
        if self.tables.insert(table, ops).is_some() {
            log::debug!("Replaced capability set for table {}", table);
        }
    }

    /// Remove a table's registration. Returns false if it was unknown.
    pub fn unregister(&mut self, table: &TableId) -> bool {
        self.tables.remove(table).is_some()
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.tables.contains_key(table)
    }

    /// Look up a table's capability set.
    pub fn ops(&self, table: &TableId) -> Option<SharedTableOps> {
        self.tables.get(table).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    // ------------------------------------------------------------------
    // Command layer passthroughs
    // ------------------------------------------------------------------

    /// Insert a row at `index` in the given table.
    pub fn add_row(&self, table: &TableId, index: usize) -> bool {
        match self.tables.get(table) {
            Some(ops) => ops.borrow_mut().add_row(index),
            None => false,
        }
    }

    /// Remove the row at `index` in the given table.
    pub fn remove_row(&self, table: &TableId, index: usize) -> bool {
        match self.tables.get(table) {
            Some(ops) => ops.borrow_mut().remove_row(index),
            None => false,
        }
    }

    /// Insert a column at `index` in the given table.
    pub fn add_column(&self, table: &TableId, index: usize) -> bool {
        match self.tables.get(table) {
            Some(ops) => ops.borrow_mut().add_column(index),
            None => false,
        }
    }

    /// Remove the column at `index` in the given table.
    pub fn remove_column(&self, table: &TableId, index: usize) -> bool {
        match self.tables.get(table) {
            Some(ops) => ops.borrow_mut().remove_column(index),
            None => false,
        }
    }

    /// Apply a partial data update to the given table.
    pub fn update_data(&self, table: &TableId, patch: &TableDataPatch) -> bool {
        match self.tables.get(table) {
            Some(ops) => ops.borrow_mut().update_data(patch),
            None => false,
        }
    }

    /// The given table's current cell, if it tracks one.
    pub fn current_position(&self, table: &TableId) -> Option<GridPos> {
        self.tables
            .get(table)
            .and_then(|ops| ops.borrow().current_position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::ScriptedTable;

    #[test]
    fn test_register_lookup_unregister() {
        let mut registry = TableRegistry::new();
        let table = TableId(1);
        assert!(registry.is_empty());

        registry.register(table, ScriptedTable::shared(3, 4));
        assert!(registry.contains(&table));
        assert_eq!(registry.len(), 1);
        assert!(registry.ops(&table).is_some());

        assert!(registry.unregister(&table));
        assert!(!registry.unregister(&table)); // already gone
        assert!(registry.ops(&table).is_none());
    }

    #[test]
    fn test_passthroughs_forward() {
        let mut registry = TableRegistry::new();
        let table = TableId(7);
        let ops = ScriptedTable::shared(2, 2);
        registry.register(table, ops.clone());

        assert!(registry.add_row(&table, 1));
        assert_eq!(ops.borrow().row_count(), 3);

        assert!(registry.remove_column(&table, 0));
        assert_eq!(ops.borrow().column_count(), 1);

        let patch = TableDataPatch::new().set(GridPos::new(0, 0), "<p>hi</p>");
        assert!(registry.update_data(&table, &patch));
    }

    #[test]
    fn test_unknown_table_reports_false() {
        let registry = TableRegistry::new();
        let missing = TableId(99);

        assert!(!registry.add_row(&missing, 0));
        assert!(!registry.remove_row(&missing, 0));
        assert!(!registry.update_data(&missing, &TableDataPatch::new()));
        assert_eq!(registry.current_position(&missing), None);
    }
}
