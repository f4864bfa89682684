//! Cell identity across tables.
//!
//! A `CellKey` uniquely identifies one editable cell in the whole
//! document: which table it belongs to plus its position in that table.
//! Keys are the map keys of the session cache and the payload of every
//! selection event, so they are small, `Copy`, and hashable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pos::GridPos;

/// Stable identifier for a table widget (never reused after removal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl TableId {
    /// The raw numeric id.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Rebuild an id from its raw value, e.g. when parsed from a report.
    #[inline]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Unique identifier for a cell across all tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    /// The table this cell belongs to
    pub table: TableId,
    /// Position within the table
    pub pos: GridPos,
}

impl CellKey {
    /// Create a new key.
    #[inline]
    pub fn new(table: TableId, pos: GridPos) -> Self {
        Self { table, pos }
    }

    /// Key of a header cell in the given column.
    #[inline]
    pub fn header(table: TableId, col: i32) -> Self {
        Self {
            table,
            pos: GridPos::header(col),
        }
    }

    /// True if this key addresses a header cell.
    #[inline]
    pub fn is_header(&self) -> bool {
        self.pos.is_header()
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.is_header() {
            write!(f, "{}:h{}", self.table, self.pos.col)
        } else {
            write!(f, "{}:r{}c{}", self.table, self.pos.row, self.pos.col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality() {
        let a = CellKey::new(TableId(1), GridPos::new(0, 0));
        let b = CellKey::new(TableId(1), GridPos::new(0, 0));
        let c = CellKey::new(TableId(2), GridPos::new(0, 0));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_table_id_raw_round_trip() {
        let id = TableId::from_raw(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id, TableId(42));
    }

    #[test]
    fn test_key_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(CellKey::new(TableId(1), GridPos::new(0, 0)));
        set.insert(CellKey::new(TableId(1), GridPos::new(0, 0))); // duplicate
        set.insert(CellKey::new(TableId(1), GridPos::new(1, 0)));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        let body = CellKey::new(TableId(3), GridPos::new(2, 7));
        assert_eq!(format!("{}", body), "t3:r2c7");

        let header = CellKey::header(TableId(3), 7);
        assert_eq!(format!("{}", header), "t3:h7");
    }

    #[test]
    fn test_key_ordering() {
        // Ordered by table, then row, then column
        let mut keys = vec![
            CellKey::new(TableId(2), GridPos::new(0, 0)),
            CellKey::new(TableId(1), GridPos::new(1, 0)),
            CellKey::new(TableId(1), GridPos::new(0, 1)),
            CellKey::new(TableId(1), GridPos::new(0, 0)),
        ];
        keys.sort();
        assert_eq!(keys[0], CellKey::new(TableId(1), GridPos::new(0, 0)));
        assert_eq!(keys[3], CellKey::new(TableId(2), GridPos::new(0, 0)));
    }
}
