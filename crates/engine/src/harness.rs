//! Test harness for session and selection behavior.
//!
//! This module provides scripted stand-ins for the host pieces the engine
//! talks to:
//! - `ScriptedEditor` / `ScriptedFactory`: an editing-engine double that
//!   records every call and can be told to fail on demand
//! - `ScriptedTable`: a table widget double backing `TableOps`
//! - `SessionHarness`: manager, coordinator, and registry wired together
//!   on a `ManualClock`, with event tracking
//!
//! The harness drives both timer protocols deterministically, so tests
//! and the CLI smoke scenario exercise debounce and clear-delay behavior
//! without waiting on wall time.

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use gridpen_core::{CellKey, GridPos, TableId};
use rustc_hash::FxHashMap;

use crate::clock::{ManualClock, RealClock};
use crate::coordinator::SelectionCoordinator;
use crate::editor::{
    EditorFactory, EditorSession, SessionError, SessionHandle, SessionNotifier, TypographyOp,
};
use crate::events::EventCollector;
use crate::manager::{ManagerConfig, SessionManager, SessionOptions};
use crate::registry::{TableDataPatch, TableOps, TableRegistry};

/// One call observed on a `ScriptedEditor`.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCall {
    SetContent(String),
    Focus,
    Blur,
    SelectAll,
    Typography(TypographyOp),
    Destroy,
}

/// Editing-engine double. Records calls, reports user activity through
/// its notifier, and fails on command.
pub struct ScriptedEditor {
    key: CellKey,
    content: String,
    focused: bool,
    destroyed: bool,
    fail_destroy: bool,
    fail_typography: bool,
    notifier: SessionNotifier,
    calls: Vec<EditorCall>,
}

impl ScriptedEditor {
    pub fn new(key: CellKey, initial_content: &str, notifier: SessionNotifier) -> Self {
        Self {
            key,
            content: initial_content.to_string(),
            focused: false,
            destroyed: false,
            fail_destroy: false,
            fail_typography: false,
            notifier,
            calls: Vec::new(),
        }
    }

    /// Detached editor with its own signal queue, for coordinator-only
    /// tests where no manager is listening.
    pub fn standalone(key: CellKey, initial_content: &str) -> Rc<RefCell<ScriptedEditor>> {
        let signals = Rc::new(RefCell::new(VecDeque::new()));
        let notifier = SessionNotifier::new(key, signals, Rc::new(RealClock));
        Rc::new(RefCell::new(Self::new(key, initial_content, notifier)))
    }

    /// Simulate the user typing: appends and reports an edit.
    pub fn type_text(&mut self, text: &str) {
        self.content.push_str(text);
        self.notifier.content_changed();
    }

    /// Simulate the engine tearing the instance down on its own.
    pub fn simulate_external_destroy(&mut self) {
        self.destroyed = true;
        self.notifier.destroyed();
    }

    pub fn set_fail_destroy(&mut self, fail: bool) {
        self.fail_destroy = fail;
    }

    pub fn set_fail_typography(&mut self, fail: bool) {
        self.fail_typography = fail;
    }

    pub fn content_str(&self) -> &str {
        &self.content
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn calls(&self) -> &[EditorCall] {
        &self.calls
    }
}

impl EditorSession for ScriptedEditor {
    fn content(&self) -> String {
        self.content.clone()
    }

    fn set_content(&mut self, content: &str) {
        self.content = content.to_string();
        self.calls.push(EditorCall::SetContent(content.to_string()));
    }

    fn focus(&mut self) {
        self.focused = true;
        self.calls.push(EditorCall::Focus);
        self.notifier.focused();
    }

    fn blur(&mut self) {
        self.focused = false;
        self.calls.push(EditorCall::Blur);
        self.notifier.blurred();
    }

    fn select_all(&mut self) {
        self.calls.push(EditorCall::SelectAll);
    }

    fn apply_typography(&mut self, op: &TypographyOp) -> Result<(), SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed { key: self.key });
        }
        if self.fail_typography {
            return Err(SessionError::Capability {
                reason: "scripted typography failure".to_string(),
            });
        }
        self.calls.push(EditorCall::Typography(op.clone()));
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SessionError> {
        self.calls.push(EditorCall::Destroy);
        if self.fail_destroy {
            return Err(SessionError::Capability {
                reason: "scripted destroy failure".to_string(),
            });
        }
        self.destroyed = true;
        Ok(())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Factory double. Clones share the created-editor list, so tests keep a
/// clone and reach any editor the manager created.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    created: Rc<RefCell<Vec<(CellKey, Rc<RefCell<ScriptedEditor>>)>>>,
    fail_next: Rc<Cell<bool>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail.
    pub fn fail_next_create(&self) {
        self.fail_next.set(true);
    }

    /// The most recently created editor for a cell, if any.
    pub fn editor(&self, key: &CellKey) -> Option<Rc<RefCell<ScriptedEditor>>> {
        self.created
            .borrow()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, editor)| editor.clone())
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }
}

impl EditorFactory for ScriptedFactory {
    fn create(
        &mut self,
        key: CellKey,
        initial_content: &str,
        notifier: SessionNotifier,
    ) -> Result<SessionHandle, SessionError> {
        if self.fail_next.take() {
            return Err(SessionError::Create {
                key,
                reason: "scripted create failure".to_string(),
            });
        }
        let editor = Rc::new(RefCell::new(ScriptedEditor::new(
            key,
            initial_content,
            notifier,
        )));
        self.created.borrow_mut().push((key, editor.clone()));
        Ok(editor)
    }
}

/// Table widget double. Tracks dimensions, the host cursor, and the cell
/// contents committed through `update_data`.
pub struct ScriptedTable {
    rows: usize,
    cols: usize,
    current: Option<GridPos>,
    cells: FxHashMap<GridPos, String>,
}

impl ScriptedTable {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            current: None,
            cells: FxHashMap::default(),
        }
    }

    /// Shared handle ready to register.
    pub fn shared(rows: usize, cols: usize) -> Rc<RefCell<ScriptedTable>> {
        Rc::new(RefCell::new(Self::new(rows, cols)))
    }

    pub fn set_current(&mut self, pos: Option<GridPos>) {
        self.current = pos;
    }

    /// Content committed to a cell, if any.
    pub fn cell(&self, pos: &GridPos) -> Option<&str> {
        self.cells.get(pos).map(String::as_str)
    }
}

impl TableOps for ScriptedTable {
    fn add_row(&mut self, index: usize) -> bool {
        if index > self.rows {
            return false;
        }
        self.rows += 1;
        true
    }

    fn remove_row(&mut self, index: usize) -> bool {
        if index >= self.rows {
            return false;
        }
        self.rows -= 1;
        true
    }

    fn add_column(&mut self, index: usize) -> bool {
        if index > self.cols {
            return false;
        }
        self.cols += 1;
        true
    }

    fn remove_column(&mut self, index: usize) -> bool {
        if index >= self.cols {
            return false;
        }
        self.cols -= 1;
        true
    }

    fn update_data(&mut self, patch: &TableDataPatch) -> bool {
        for (pos, content) in &patch.cells {
            self.cells.insert(*pos, content.clone());
        }
        true
    }

    fn current_position(&self) -> Option<GridPos> {
        self.current
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column_count(&self) -> usize {
        self.cols
    }
}

/// Manager, coordinator, and registry on one manual clock, with the
/// coordinator's events collected.
///
/// The coordinator resolves handles through the manager, so a plain
/// `focus_cell` picks up whatever session was acquired for that cell.
pub struct SessionHarness {
    pub clock: ManualClock,
    pub factory: ScriptedFactory,
    pub manager: Rc<RefCell<SessionManager<ManualClock>>>,
    pub registry: Rc<RefCell<TableRegistry>>,
    pub coordinator: SelectionCoordinator<ManualClock>,
    events: Rc<RefCell<EventCollector>>,
}

impl SessionHarness {
    pub fn new(config: ManagerConfig) -> Self {
        let clock = ManualClock::new();
        let factory = ScriptedFactory::new();
        let manager = Rc::new(RefCell::new(SessionManager::with_clock(
            Box::new(factory.clone()),
            config,
            clock.clone(),
        )));
        let registry = Rc::new(RefCell::new(TableRegistry::new()));
        let mut coordinator = SelectionCoordinator::with_clock(registry.clone(), clock.clone());

        let lookup = manager.clone();
        coordinator.set_session_lookup(move |key| lookup.borrow().handle(key));

        let events = Rc::new(RefCell::new(EventCollector::new()));
        let sink = events.clone();
        coordinator.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        Self {
            clock,
            factory,
            manager,
            registry,
            coordinator,
            events,
        }
    }

    /// Register a fresh scripted table and return it.
    pub fn add_table(&mut self, table: TableId, rows: usize, cols: usize) -> Rc<RefCell<ScriptedTable>> {
        let ops = ScriptedTable::shared(rows, cols);
        self.registry.borrow_mut().register(table, ops.clone());
        ops
    }

    /// Acquire a session through the manager.
    pub fn acquire(
        &mut self,
        key: CellKey,
        options: SessionOptions,
    ) -> Result<SessionHandle, SessionError> {
        self.manager.borrow_mut().acquire(key, options)
    }

    /// The scripted editor behind a cell's session, if one was created.
    pub fn editor(&self, key: &CellKey) -> Option<Rc<RefCell<ScriptedEditor>>> {
        self.factory.editor(key)
    }

    /// Simulate typing into a cell's editor. False when the cell has no
    /// editor.
    pub fn type_text(&mut self, key: &CellKey, text: &str) -> bool {
        match self.factory.editor(key) {
            Some(editor) => {
                editor.borrow_mut().type_text(text);
                true
            }
            None => false,
        }
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.clock.advance_ms(ms);
    }

    /// Pump both timer loops once.
    pub fn tick(&mut self) {
        self.manager.borrow_mut().tick();
        self.coordinator.tick();
    }

    /// Collected coordinator events.
    pub fn events(&self) -> Ref<'_, EventCollector> {
        self.events.borrow()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Default for SessionHarness {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}
