//! Keyboard bindings for selection commands.
//!
//! A small remappable table from key chords to coordinator commands. The
//! default table is the shipped behavior: Ctrl+Arrows move focus between
//! cells, Tab/Shift+Tab advance forward/backward, Ctrl+Enter moves down a
//! row, Escape requests a (soft) selection clear.

use rustc_hash::FxHashMap;

use gridpen_core::NavDirection;

/// Keys the selection layer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Tab,
    Enter,
    Escape,
}

/// One key chord: key plus modifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInput {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyInput {
    /// Chord with no modifiers.
    pub fn plain(key: Key) -> Self {
        Self { key, ctrl: false, shift: false }
    }

    /// Chord with Ctrl held.
    pub fn ctrl(key: Key) -> Self {
        Self { key, ctrl: true, shift: false }
    }

    /// Chord with Shift held.
    pub fn shift(key: Key) -> Self {
        Self { key, ctrl: false, shift: true }
    }
}

/// Command a key chord resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCommand {
    Navigate(NavDirection),
    ClearSelection,
}

/// Remappable chord -> command table.
#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: FxHashMap<KeyInput, SelectionCommand>,
}

impl Keymap {
    /// Empty keymap with no bindings.
    pub fn empty() -> Self {
        Self { bindings: FxHashMap::default() }
    }

    /// Bind a chord to a command, replacing any previous binding.
    pub fn bind(&mut self, input: KeyInput, command: SelectionCommand) {
        self.bindings.insert(input, command);
    }

    /// Remove a binding. Returns false if the chord was unbound.
    pub fn unbind(&mut self, input: &KeyInput) -> bool {
        self.bindings.remove(input).is_some()
    }

    /// Resolve a chord to its command, if bound.
    pub fn resolve(&self, input: &KeyInput) -> Option<SelectionCommand> {
        self.bindings.get(input).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Keymap {
    /// The shipped binding table.
    fn default() -> Self {
        let mut map = Self::empty();
        map.bind(
            KeyInput::ctrl(Key::ArrowUp),
            SelectionCommand::Navigate(NavDirection::Up),
        );
        map.bind(
            KeyInput::ctrl(Key::ArrowDown),
            SelectionCommand::Navigate(NavDirection::Down),
        );
        map.bind(
            KeyInput::ctrl(Key::ArrowLeft),
            SelectionCommand::Navigate(NavDirection::Left),
        );
        map.bind(
            KeyInput::ctrl(Key::ArrowRight),
            SelectionCommand::Navigate(NavDirection::Right),
        );
        map.bind(
            KeyInput::plain(Key::Tab),
            SelectionCommand::Navigate(NavDirection::Tab),
        );
        // Backward tab moves left; the event reports direction `left`.
        map.bind(
            KeyInput::shift(Key::Tab),
            SelectionCommand::Navigate(NavDirection::Left),
        );
        map.bind(
            KeyInput::ctrl(Key::Enter),
            SelectionCommand::Navigate(NavDirection::Enter),
        );
        map.bind(KeyInput::plain(Key::Escape), SelectionCommand::ClearSelection);
        map
    }
}
