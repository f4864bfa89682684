//! Row/column coordinates within a single table.
//!
//! Body rows are 0-based. The header row sits above the body at the
//! sentinel row `HEADER_ROW` (-1) so header cells share the same
//! coordinate type as body cells without a separate address space.

use serde::{Deserialize, Serialize};

/// Sentinel row index for header cells.
pub const HEADER_ROW: i32 = -1;

/// A cell position inside one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    /// Row index (0-based body row, or `HEADER_ROW` for the header)
    pub row: i32,
    /// Column index (0-based)
    pub col: i32,
}

impl GridPos {
    /// Create a new position.
    #[inline]
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Position of a header cell in the given column.
    #[inline]
    pub fn header(col: i32) -> Self {
        Self { row: HEADER_ROW, col }
    }

    /// True if this position addresses the header row.
    #[inline]
    pub fn is_header(&self) -> bool {
        self.row == HEADER_ROW
    }

    /// The position offset by the given row/column deltas.
    #[inline]
    pub fn shifted(&self, d_row: i32, d_col: i32) -> Self {
        Self {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }
}

/// Direction of a keyboard-driven cell move.
///
/// `Tab` and `Enter` are kept distinct from `Right` and `Down` so event
/// subscribers can tell a tab-advance apart from a plain arrow move, even
/// though they produce the same coordinate delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavDirection {
    Up,
    Down,
    Left,
    Right,
    Tab,
    Enter,
}

impl NavDirection {
    /// The (row, col) delta this direction applies to a position.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            NavDirection::Up => (-1, 0),
            NavDirection::Down => (1, 0),
            NavDirection::Left => (0, -1),
            NavDirection::Right => (0, 1),
            NavDirection::Tab => (0, 1),
            NavDirection::Enter => (1, 0),
        }
    }
}
