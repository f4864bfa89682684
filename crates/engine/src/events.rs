//! Event types for selection change notifications.
//!
//! The coordinator emits these so cooperating UI surfaces (toolbar,
//! shortcut layer, scroll host) can react without polling. Payloads are
//! plain data: keys, positions, and derived flags, never live handles.

use serde::Serialize;

use gridpen_core::{CellKey, GridPos, NavDirection, TableId};

use crate::state::{SelectionContext, SelectionSnapshot};

/// Events emitted by the selection coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    /// Selection state changed. Fires on every committed state swap and
    /// carries a complete snapshot.
    CellSelection(SelectionSnapshot),

    /// A cell received focus.
    CellFocus(CellFocusEvent),

    /// The focused cell lost focus.
    CellBlur(CellBlurEvent),

    /// The derived command context changed shape.
    /// Emitted only when the derived flags actually differ.
    ContextChange(SelectionContext),

    /// Keyboard navigation moved focus between cells.
    CellNavigation(CellNavigationEvent),
}

/// Emitted when a cell receives focus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFocusEvent {
    pub key: CellKey,
    /// True when the focused cell is in the header row.
    pub is_header: bool,
    /// True when the focus carried a live editing handle.
    pub has_handle: bool,
}

/// Emitted when the focused cell loses focus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellBlurEvent {
    pub key: CellKey,
}

/// Emitted for each keyboard-driven focus move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellNavigationEvent {
    pub table: TableId,
    pub from: GridPos,
    pub to: GridPos,
    pub direction: NavDirection,
}

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback type for receiving selection events.
pub type EventCallback = Box<dyn FnMut(&SelectionEvent)>;

/// Typed pub/sub fan-out with synchronous delivery.
///
/// Subscribers run in subscription order on the caller's stack; they must
/// not call back into the coordinator while handling an event.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, EventCallback)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Returns its id for `unsubscribe`.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&SelectionEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Deliver an event to every subscriber, in subscription order.
    pub fn emit(&mut self, event: &SelectionEvent) {
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Simple event collector for tests and scenario assertions.
#[derive(Default)]
pub struct EventCollector {
    events: Vec<SelectionEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: SelectionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SelectionEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to only CellSelection snapshots.
    pub fn cell_selection(&self) -> Vec<&SelectionSnapshot> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SelectionEvent::CellSelection(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellFocus events.
    pub fn cell_focus(&self) -> Vec<&CellFocusEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SelectionEvent::CellFocus(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellBlur events.
    pub fn cell_blur(&self) -> Vec<&CellBlurEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SelectionEvent::CellBlur(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Filter to only ContextChange events.
    pub fn context_change(&self) -> Vec<&SelectionContext> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SelectionEvent::ContextChange(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellNavigation events.
    pub fn cell_navigation(&self) -> Vec<&CellNavigationEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SelectionEvent::CellNavigation(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Per-kind event counts: (selection, focus, blur, context, navigation).
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.cell_selection().len(),
            self.cell_focus().len(),
            self.cell_blur().len(),
            self.context_change().len(),
            self.cell_navigation().len(),
        )
    }
}
