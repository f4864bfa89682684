//! Core types shared by the gridpen crates.
//!
//! Cell addressing (`TableId`, `GridPos`, `CellKey`), rectangular ranges,
//! and navigation directions. Everything here is plain data: no I/O, no
//! timers, no editor engine types.

pub mod key;
pub mod pos;
pub mod range;

pub use key::{CellKey, TableId};
pub use pos::{GridPos, NavDirection, HEADER_ROW};
pub use range::CellRange;
