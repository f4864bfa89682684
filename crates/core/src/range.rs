//! Rectangular cell ranges.

use serde::{Deserialize, Serialize};

use crate::pos::GridPos;

/// A rectangular range of cells, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: i32,
    pub start_col: i32,
    pub end_row: i32,
    pub end_col: i32,
}

impl CellRange {
    /// Create a new range, automatically normalizing so start <= end.
    pub fn new(r1: i32, c1: i32, r2: i32, c2: i32) -> Self {
        Self {
            start_row: r1.min(r2),
            start_col: c1.min(c2),
            end_row: r1.max(r2),
            end_col: c1.max(c2),
        }
    }

    /// Create a range spanning two corner positions, in either order.
    pub fn from_corners(a: GridPos, b: GridPos) -> Self {
        Self::new(a.row, a.col, b.row, b.col)
    }

    /// Create a single-cell range.
    pub fn single(pos: GridPos) -> Self {
        Self {
            start_row: pos.row,
            start_col: pos.col,
            end_row: pos.row,
            end_col: pos.col,
        }
    }

    /// Check if this range contains a position.
    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row >= self.start_row
            && pos.row <= self.end_row
            && pos.col >= self.start_col
            && pos.col <= self.end_col
    }

    /// Number of cells in this range.
    pub fn cell_count(&self) -> usize {
        let rows = (self.end_row - self.start_row + 1) as usize;
        let cols = (self.end_col - self.start_col + 1) as usize;
        rows * cols
    }

    /// Iterate over all cells in this range (row-major order).
    pub fn cells(&self) -> impl Iterator<Item = GridPos> {
        let start_row = self.start_row;
        let end_row = self.end_row;
        let start_col = self.start_col;
        let end_col = self.end_col;

        (start_row..=end_row)
            .flat_map(move |r| (start_col..=end_col).map(move |c| GridPos::new(r, c)))
    }

    /// Check if this is a single cell.
    pub fn is_single(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }
}
