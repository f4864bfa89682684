//! Selection state model.
//!
//! The coordinator never mutates this state in place: every operation
//! builds a complete next state and swaps it in whole, so subscribers can
//! never observe a half-updated selection. `SelectionSnapshot` is the
//! plain-data image of the state used as event payload and for JSON
//! output; it carries keys and flags, never live handles.

use serde::Serialize;

use gridpen_core::{CellKey, TableId};

use crate::editor::SessionHandle;
use crate::registry::SharedTableOps;

/// The table currently hosting the selection.
#[derive(Clone)]
pub struct ActiveTable {
    pub id: TableId,
    /// Capability set captured at focus time, used for navigation bounds.
    pub ops: SharedTableOps,
}

/// The single cell holding keyboard focus.
#[derive(Clone)]
pub struct FocusedCell {
    pub key: CellKey,
    /// Live editing handle, when one was attached at focus time.
    pub handle: Option<SessionHandle>,
    /// The host should scroll this cell into view on the next frame.
    pub wants_scroll: bool,
}

/// One member of the current selection set.
#[derive(Clone)]
pub struct SelectedCell {
    pub key: CellKey,
    pub handle: Option<SessionHandle>,
}

/// Why the selection lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    /// A cell holds focus; set automatically by `focus_cell`.
    CellFocused,
    /// Explicit lock taken during an active interaction.
    Interaction,
}

/// Selection lock. While held, non-forced clears are deferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockState {
    pub held: bool,
    pub reason: Option<LockReason>,
}

impl LockState {
    pub fn held_for(reason: LockReason) -> Self {
        Self { held: true, reason: Some(reason) }
    }

    pub fn released() -> Self {
        Self::default()
    }
}

/// Derived command context. Never set directly; recomputed from the
/// selection shape on every transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionContext {
    pub can_apply_typography: bool,
    pub can_navigate: bool,
    pub can_edit: bool,
    /// The cell whose handle commands would address. Only present when
    /// exactly one cell with a live handle is focused.
    pub command_target: Option<CellKey>,
}

/// Complete selection state. Swapped whole on every transition.
#[derive(Clone, Default)]
pub struct SelectionState {
    pub has_selection: bool,
    pub active_table: Option<ActiveTable>,
    pub focused: Option<FocusedCell>,
    pub selected: Vec<SelectedCell>,
    pub context: SelectionContext,
    pub lock: LockState,
}

impl SelectionState {
    /// The empty state: nothing selected, lock released.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute the command context this selection shape implies.
    ///
    /// Single focused cell with a live handle: everything enabled and the
    /// cell is the command target. Focused without a handle: navigation
    /// only. Range selection: typography only (handles are looked up per
    /// cell at apply time). Empty: all false.
    pub fn derive_context(&self) -> SelectionContext {
        if let Some(focused) = &self.focused {
            let has_handle = focused.handle.is_some();
            return SelectionContext {
                can_apply_typography: has_handle,
                can_navigate: true,
                can_edit: has_handle,
                command_target: if has_handle { Some(focused.key) } else { None },
            };
        }
        if !self.selected.is_empty() {
            return SelectionContext {
                can_apply_typography: true,
                can_navigate: false,
                can_edit: false,
                command_target: None,
            };
        }
        SelectionContext::default()
    }

    /// Plain-data image of this state.
    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            has_selection: self.has_selection,
            table: self.active_table.as_ref().map(|t| t.id),
            focused: self.focused.as_ref().map(|f| FocusSnapshot {
                key: f.key,
                is_header: f.key.is_header(),
                has_handle: f.handle.is_some(),
                wants_scroll: f.wants_scroll,
            }),
            selected: self.selected.iter().map(|c| c.key).collect(),
            context: self.context,
            lock: self.lock,
        }
    }
}

/// Serializable image of the focused cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub key: CellKey,
    pub is_header: bool,
    pub has_handle: bool,
    pub wants_scroll: bool,
}

/// Serializable image of the whole selection state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    pub has_selection: bool,
    pub table: Option<TableId>,
    pub focused: Option<FocusSnapshot>,
    pub selected: Vec<CellKey>,
    pub context: SelectionContext,
    pub lock: LockState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::ScriptedTable;
    use gridpen_core::GridPos;

    fn key(row: i32, col: i32) -> CellKey {
        CellKey::new(TableId(1), GridPos::new(row, col))
    }

    fn handleless_focus(state: &mut SelectionState, key: CellKey) {
        state.has_selection = true;
        state.focused = Some(FocusedCell { key, handle: None, wants_scroll: false });
        state.selected = vec![SelectedCell { key, handle: None }];
    }

    #[test]
    fn test_empty_context_all_false() {
        let state = SelectionState::empty();
        assert_eq!(state.derive_context(), SelectionContext::default());
    }

    #[test]
    fn test_focus_without_handle_navigates_only() {
        let mut state = SelectionState::empty();
        handleless_focus(&mut state, key(0, 0));

        let context = state.derive_context();
        assert!(!context.can_apply_typography);
        assert!(context.can_navigate);
        assert!(!context.can_edit);
        assert_eq!(context.command_target, None);
    }

    #[test]
    fn test_range_context_typography_only() {
        let mut state = SelectionState::empty();
        state.has_selection = true;
        state.selected = vec![
            SelectedCell { key: key(0, 0), handle: None },
            SelectedCell { key: key(0, 1), handle: None },
        ];

        let context = state.derive_context();
        assert!(context.can_apply_typography);
        assert!(!context.can_navigate);
        assert!(!context.can_edit);
        assert_eq!(context.command_target, None);
    }

    #[test]
    fn test_snapshot_is_plain_data() {
        let mut state = SelectionState::empty();
        handleless_focus(&mut state, key(2, 3));
        state.active_table = Some(ActiveTable {
            id: TableId(1),
            ops: ScriptedTable::shared(4, 4),
        });
        state.context = state.derive_context();
        state.lock = LockState::held_for(LockReason::CellFocused);

        let snapshot = state.snapshot();
        assert!(snapshot.has_selection);
        assert_eq!(snapshot.table, Some(TableId(1)));
        assert_eq!(snapshot.selected, vec![key(2, 3)]);
        let focused = snapshot.focused.unwrap();
        assert_eq!(focused.key, key(2, 3));
        assert!(!focused.has_handle);
        assert!(snapshot.lock.held);
        assert_eq!(snapshot.lock.reason, Some(LockReason::CellFocused));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut state = SelectionState::empty();
        handleless_focus(&mut state, key(2, 3));
        state.active_table = Some(ActiveTable {
            id: TableId(1),
            ops: ScriptedTable::shared(4, 4),
        });
        state.context = state.derive_context();
        state.lock = LockState::held_for(LockReason::CellFocused);

        // Hosts read snapshots as JSON; keys are camelCase, ids are bare
        // numbers, lock reasons snake_case.
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["hasSelection"], true);
        assert_eq!(json["table"], 1);
        assert_eq!(json["focused"]["key"]["pos"]["row"], 2);
        assert_eq!(json["focused"]["key"]["pos"]["col"], 3);
        assert_eq!(json["focused"]["isHeader"], false);
        assert_eq!(json["focused"]["hasHandle"], false);
        assert_eq!(json["context"]["canNavigate"], true);
        assert_eq!(json["context"]["canEdit"], false);
        assert!(json["context"]["commandTarget"].is_null());
        assert_eq!(json["lock"]["held"], true);
        assert_eq!(json["lock"]["reason"], "cell_focused");
    }
}
