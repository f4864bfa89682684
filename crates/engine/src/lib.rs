//! gridpen engine: editing-session cache and selection coordination.
//!
//! Two services make up the engine. `SessionManager` is a resource cache
//! of live rich-text editing sessions keyed by cell, with priority-based
//! eviction and a debounced commit protocol. `SelectionCoordinator` is the
//! focus/navigation/range-selection state machine that decides which cell
//! owns keyboard focus, with lock and timed-release semantics.
//!
//! Both services are single-threaded and cooperative: the host calls
//! `tick()` from its frame or timer loop to fire due deadlines. All time
//! goes through the `Clock` trait so tests and scripted runs are
//! deterministic.

pub mod clock;
pub mod coordinator;
pub mod editor;
pub mod events;
pub mod harness;
pub mod keymap;
pub mod manager;
pub mod registry;
pub mod state;
