//! Selection coordination across table widgets.
//!
//! One coordinator owns the document-wide selection: which cell has
//! focus, which cells are range-selected, and what the toolbar may do
//! about it. State is swapped whole on every transition and a snapshot
//! goes out on the event bus, so listeners never observe a half-updated
//! selection.
//!
//! Two timers soften the raw DOM-ish edges:
//! - a non-forced clear is delayed 300 ms, so a click that lands on
//!   another cell can cancel it before anything flickers
//! - closing a toolbar interaction keeps the toolbar protective for a
//!   100 ms grace window, so the click that closed it cannot clear the
//!   selection it was operating on
//!
//! Both timers fire from `tick`, driven by the injected clock. Event
//! subscribers are called synchronously and must not re-enter the
//! coordinator.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use gridpen_core::{CellKey, CellRange, GridPos, NavDirection, TableId};

use crate::clock::{Clock, RealClock};
use crate::editor::{SessionHandle, TypographyOp};
use crate::events::{
    CellBlurEvent, CellFocusEvent, CellNavigationEvent, EventBus, SelectionEvent, SubscriptionId,
};
use crate::keymap::{KeyInput, Keymap, SelectionCommand};
use crate::registry::TableRegistry;
use crate::state::{
    ActiveTable, FocusedCell, LockReason, LockState, SelectedCell, SelectionContext,
    SelectionSnapshot, SelectionState,
};

/// Delay before a non-forced clear actually empties the selection.
pub const CLEAR_DELAY: Duration = Duration::from_millis(300);

/// Grace window after a toolbar interaction ends.
pub const TOOLBAR_GRACE: Duration = Duration::from_millis(100);

/// Resolver for the editing handle of a cell, usually backed by the
/// session cache.
pub type SessionLookup = Box<dyn Fn(&CellKey) -> Option<SessionHandle>>;

/// Options for `SelectionCoordinator::focus_cell`.
#[derive(Default)]
pub struct FocusOptions {
    /// Editing handle to attach. When absent the coordinator asks its
    /// session lookup.
    pub handle: Option<SessionHandle>,
    /// Select the cell's whole content after focusing the handle.
    pub select_content: bool,
    /// Ask the host to scroll the cell into view.
    pub scroll_into_view: bool,
    /// Blur the previously focused cell first.
    pub clear_previous: bool,
}

/// What `clear_selection` decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The selection was cleared immediately (or was already empty).
    Cleared,
    /// The clear was scheduled to fire after `CLEAR_DELAY`.
    Scheduled,
    /// The lock swallowed the request; nothing is scheduled.
    Deferred,
}

/// The selection state machine. See the module docs.
pub struct SelectionCoordinator<C: Clock = RealClock> {
    registry: Rc<RefCell<TableRegistry>>,
    clock: C,
    keymap: Keymap,
    state: SelectionState,
    bus: EventBus,
    session_lookup: Option<SessionLookup>,
    /// Set by the host while the user is actively working in a cell.
    interaction_active: bool,
    /// True from toolbar open until the grace window closes.
    toolbar_active: bool,
    pending_clear: Option<Instant>,
    toolbar_cooldown: Option<Instant>,
}

impl SelectionCoordinator<RealClock> {
    /// Create a coordinator on the real clock.
    pub fn new(registry: Rc<RefCell<TableRegistry>>) -> Self {
        Self::with_clock(registry, RealClock)
    }
}

impl<C: Clock> SelectionCoordinator<C> {
    /// Create a coordinator with a custom clock.
    pub fn with_clock(registry: Rc<RefCell<TableRegistry>>, clock: C) -> Self {
        Self {
            registry,
            clock,
            keymap: Keymap::default(),
            state: SelectionState::empty(),
            bus: EventBus::new(),
            session_lookup: None,
            interaction_active: false,
            toolbar_active: false,
            pending_clear: None,
            toolbar_cooldown: None,
        }
    }

    /// Wire the handle resolver used when `FocusOptions::handle` is not
    /// given.
    pub fn set_session_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&CellKey) -> Option<SessionHandle> + 'static,
    {
        self.session_lookup = Some(Box::new(lookup));
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&SelectionEvent) + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.state.snapshot()
    }

    pub fn context(&self) -> SelectionContext {
        self.state.context
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock.held
    }

    pub fn is_toolbar_active(&self) -> bool {
        self.toolbar_active
    }

    pub fn has_pending_clear(&self) -> bool {
        self.pending_clear.is_some()
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut Keymap {
        &mut self.keymap
    }

    /// Focus one cell for editing.
    ///
    /// Fails when the table is not registered. On success the new state
    /// carries exactly this cell as focused and selected, the lock is
    /// held for `CellFocused`, and any scheduled clear is cancelled.
    pub fn focus_cell(&mut self, table: TableId, pos: GridPos, options: FocusOptions) -> bool {
        let ops = match self.registry.borrow().ops(&table) {
            Some(ops) => ops,
            None => {
                log::debug!("Focus rejected, table {} not registered", table);
                return false;
            }
        };
        let key = CellKey::new(table, pos);

        if options.clear_previous {
            if let Some(prior) = self.state.focused.clone() {
                if let Some(handle) = &prior.handle {
                    handle.borrow_mut().blur();
                }
                self.bus
                    .emit(&SelectionEvent::CellBlur(CellBlurEvent { key: prior.key }));
            }
        }

        let handle = options.handle.or_else(|| self.lookup_session(&key));
        if let Some(h) = &handle {
            h.borrow_mut().focus();
            if options.select_content {
                h.borrow_mut().select_all();
            }
        }

        let mut next = SelectionState {
            has_selection: true,
            active_table: Some(ActiveTable { id: table, ops }),
            focused: Some(FocusedCell {
                key,
                handle: handle.clone(),
                wants_scroll: options.scroll_into_view,
            }),
            selected: vec![SelectedCell {
                key,
                handle: handle.clone(),
            }],
            context: SelectionContext::default(),
            lock: LockState::held_for(LockReason::CellFocused),
        };
        next.context = next.derive_context();

        // A clear scheduled before this focus must not wipe it later
        self.pending_clear = None;
        self.commit_state(next);
        self.bus.emit(&SelectionEvent::CellFocus(CellFocusEvent {
            key,
            is_header: key.is_header(),
            has_handle: handle.is_some(),
        }));
        log::debug!("Focused {}", key);
        true
    }

    /// Drop focus from the focused cell, keeping the surrounding
    /// selection.
    ///
    /// The context resets to empty rather than being re-derived: a cell
    /// that just lost focus must not keep offering editing commands
    /// through the still-selected range.
    pub fn blur_cell(&mut self) {
        let focused = match self.state.focused.clone() {
            Some(focused) => focused,
            None => return,
        };
        if let Some(handle) = &focused.handle {
            handle.borrow_mut().blur();
        }
        self.bus
            .emit(&SelectionEvent::CellBlur(CellBlurEvent { key: focused.key }));

        let mut next = self.state.clone();
        next.focused = None;
        next.context = SelectionContext::default();
        self.commit_state(next);
        log::debug!("Blurred {}", focused.key);
    }

    /// Move focus one step from the focused cell.
    ///
    /// Fails without side effects when no cell is focused or the step
    /// would leave the table body. Emits `CellNavigation` before the
    /// focus change it describes.
    pub fn navigate_cell(&mut self, direction: NavDirection) -> bool {
        let (table, from, rows, cols) = match (&self.state.active_table, &self.state.focused) {
            (Some(active), Some(focused)) => {
                let ops = active.ops.borrow();
                (
                    active.id,
                    focused.key.pos,
                    ops.row_count() as i32,
                    ops.column_count() as i32,
                )
            }
            _ => return false,
        };

        let (d_row, d_col) = direction.delta();
        let to = from.shifted(d_row, d_col);
        if to.row < 0 || to.row >= rows || to.col < 0 || to.col >= cols {
            log::debug!("Navigation {:?} out of bounds from {:?}", direction, from);
            return false;
        }

        self.bus
            .emit(&SelectionEvent::CellNavigation(CellNavigationEvent {
                table,
                from,
                to,
                direction,
            }));
        self.focus_cell(
            table,
            to,
            FocusOptions {
                clear_previous: true,
                ..Default::default()
            },
        )
    }

    /// Replace the selection with a rectangular range. The range carries
    /// no focused cell; per-cell handles come from the session lookup.
    /// The lock is left untouched.
    pub fn select_cell_range(&mut self, table: TableId, start: GridPos, end: GridPos) -> bool {
        let ops = match self.registry.borrow().ops(&table) {
            Some(ops) => ops,
            None => {
                log::debug!("Range selection rejected, table {} not registered", table);
                return false;
            }
        };

        if let Some(prior) = self.state.focused.clone() {
            if let Some(handle) = &prior.handle {
                handle.borrow_mut().blur();
            }
            self.bus
                .emit(&SelectionEvent::CellBlur(CellBlurEvent { key: prior.key }));
        }

        let range = CellRange::from_corners(start, end);
        let selected: Vec<SelectedCell> = range
            .cells()
            .map(|pos| {
                let key = CellKey::new(table, pos);
                let handle = self.lookup_session(&key);
                SelectedCell { key, handle }
            })
            .collect();

        let mut next = SelectionState {
            has_selection: true,
            active_table: Some(ActiveTable { id: table, ops }),
            focused: None,
            selected,
            context: SelectionContext::default(),
            lock: self.state.lock,
        };
        next.context = next.derive_context();
        self.commit_state(next);
        log::debug!("Selected {} cell(s) in {}", range.cell_count(), table);
        true
    }

    /// Clear the selection, honoring the lock.
    ///
    /// Forced clears always run immediately. Unforced clears are
    /// swallowed while the lock is held (unless the toolbar is keeping
    /// the selection alive, which downgrades them to scheduled), and
    /// otherwise fire after `CLEAR_DELAY`.
    pub fn clear_selection(&mut self, force: bool) -> ClearOutcome {
        if force {
            self.pending_clear = None;
            self.clear_now(false);
            return ClearOutcome::Cleared;
        }

        if self.state.lock.held && !self.toolbar_active {
            self.pending_clear = None;
            log::debug!("Selection clear deferred, lock held");
            return ClearOutcome::Deferred;
        }

        if self.state.has_selection {
            self.pending_clear = Some(self.clock.now() + CLEAR_DELAY);
            return ClearOutcome::Scheduled;
        }

        self.pending_clear = None;
        ClearOutcome::Cleared
    }

    /// Apply typography operations to the current selection.
    ///
    /// Focused cell: true only when every operation succeeded. Range:
    /// true when at least one cell accepted all operations; cells
    /// without handles are skipped.
    pub fn apply_typography(&mut self, ops: &[TypographyOp]) -> bool {
        if ops.is_empty() || !self.state.has_selection {
            return false;
        }

        if let Some(focused) = &self.state.focused {
            let handle = match &focused.handle {
                Some(handle) => handle,
                None => {
                    log::debug!("Typography skipped, {} has no handle", focused.key);
                    return false;
                }
            };
            return apply_ops(focused.key, handle, ops);
        }

        let mut any = false;
        for cell in &self.state.selected {
            if let Some(handle) = &cell.handle {
                if apply_ops(cell.key, handle, ops) {
                    any = true;
                }
            }
        }
        any
    }

    /// Mark the user as actively working inside the selected cell.
    /// Cleared again by `unlock_selection` and by leaving the table.
    pub fn activate_cell_interaction(&mut self) {
        self.interaction_active = true;
    }

    /// Take the explicit interaction lock. Requires a live selection and
    /// an active interaction; returns whether the lock was taken.
    pub fn lock_selection(&mut self) -> bool {
        if !self.state.has_selection || !self.interaction_active {
            return false;
        }
        let lock = LockState::held_for(LockReason::Interaction);
        if self.state.lock != lock {
            let mut next = self.state.clone();
            next.lock = lock;
            self.commit_state(next);
        }
        true
    }

    /// Release the lock and end the interaction.
    pub fn unlock_selection(&mut self) {
        self.interaction_active = false;
        if self.state.lock.held {
            let mut next = self.state.clone();
            next.lock = LockState::released();
            self.commit_state(next);
        }
    }

    /// A toolbar tied to the selection opened. Cancels any scheduled
    /// clear so the toolbar's own click cannot lose the selection it
    /// operates on.
    pub fn start_toolbar_interaction(&mut self) {
        self.pending_clear = None;
        self.toolbar_cooldown = None;
        self.toolbar_active = true;
    }

    /// The toolbar interaction finished. Protection stays up for
    /// `TOOLBAR_GRACE` and drops on the first tick past it.
    pub fn end_toolbar_interaction(&mut self) {
        if self.toolbar_active {
            self.toolbar_cooldown = Some(self.clock.now() + TOOLBAR_GRACE);
        }
    }

    /// The user selected something outside every table. Clears
    /// everything immediately, releases the lock, and ends any
    /// interaction.
    pub fn handle_non_table_selection(&mut self) {
        self.pending_clear = None;
        self.interaction_active = false;
        self.clear_now(true);
    }

    /// Route one key press through the keymap. Returns whether the key
    /// was consumed.
    pub fn handle_key(&mut self, input: &KeyInput) -> bool {
        match self.keymap.resolve(input) {
            Some(SelectionCommand::Navigate(direction)) => self.navigate_cell(direction),
            Some(SelectionCommand::ClearSelection) => {
                self.clear_selection(false);
                true
            }
            None => false,
        }
    }

    /// Fire due timers. Host calls this from the same loop that ticks
    /// the session manager.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        if let Some(deadline) = self.toolbar_cooldown {
            if now >= deadline {
                self.toolbar_cooldown = None;
                self.toolbar_active = false;
            }
        }

        if let Some(deadline) = self.pending_clear {
            if now >= deadline {
                self.pending_clear = None;
                self.clear_now(false);
            }
        }
    }

    fn lookup_session(&self, key: &CellKey) -> Option<SessionHandle> {
        self.session_lookup.as_ref().and_then(|lookup| lookup(key))
    }

    /// Empty the selection now. The lock survives unless
    /// `release_lock` is set; only `handle_non_table_selection` releases
    /// it this way.
    fn clear_now(&mut self, release_lock: bool) {
        if let Some(focused) = self.state.focused.clone() {
            if let Some(handle) = &focused.handle {
                handle.borrow_mut().blur();
            }
            self.bus
                .emit(&SelectionEvent::CellBlur(CellBlurEvent { key: focused.key }));
        }

        let next = SelectionState {
            lock: if release_lock {
                LockState::released()
            } else {
                self.state.lock
            },
            ..SelectionState::empty()
        };
        if next.snapshot() != self.state.snapshot() {
            self.commit_state(next);
        }
    }

    /// Swap in the next state and publish it. `ContextChange` goes out
    /// only when the context's shape changed, never for a mere retarget
    /// of the same capabilities.
    fn commit_state(&mut self, next: SelectionState) {
        let context_changed = context_shape_changed(&self.state.context, &next.context);
        self.state = next;
        self.bus
            .emit(&SelectionEvent::CellSelection(self.state.snapshot()));
        if context_changed {
            self.bus
                .emit(&SelectionEvent::ContextChange(self.state.context));
        }
    }
}

/// Structural comparison of contexts: the capability flags and whether a
/// command target exists, never which cell it is.
fn context_shape_changed(a: &SelectionContext, b: &SelectionContext) -> bool {
    a.can_apply_typography != b.can_apply_typography
        || a.can_navigate != b.can_navigate
        || a.can_edit != b.can_edit
        || a.command_target.is_some() != b.command_target.is_some()
}

fn apply_ops(key: CellKey, handle: &SessionHandle, ops: &[TypographyOp]) -> bool {
    let mut all_ok = true;
    for op in ops {
        if let Err(e) = handle.borrow_mut().apply_typography(op) {
            log::warn!("Typography failed for {}: {}", key, e);
            all_ok = false;
        }
    }
    all_ok
}
