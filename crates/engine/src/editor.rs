//! The editing capability consumed by the session cache.
//!
//! The rich-text engine itself lives outside this crate. The manager sees
//! it only through `EditorSession` (one live per-cell instance) and
//! `EditorFactory` (creates instances on cache miss). Engine adapters
//! report edits and focus flips back through the `SessionNotifier` they
//! receive at creation; the manager turns those signals into debounced
//! commits and activity bookkeeping.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;

use gridpen_core::CellKey;

use crate::clock::Clock;

/// Shared owning reference to one cell's live editing session.
pub type SessionHandle = Rc<RefCell<dyn EditorSession>>;

/// Errors surfaced by the editing capability.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create editing session for {key}: {reason}")]
    Create { key: CellKey, reason: String },

    #[error("editing session for {key} is destroyed")]
    Destroyed { key: CellKey },

    #[error("editor capability fault: {reason}")]
    Capability { reason: String },
}

/// One typography property change. `None` clears the property.
#[derive(Debug, Clone, PartialEq)]
pub enum TypographyOp {
    FontFamily(Option<String>),
    FontSize(Option<f32>),
    FontWeight(Option<u16>),
    TextColor(Option<String>),
    Background(Option<String>),
}

/// One cell's live rich-text engine instance.
///
/// Content is opaque markup; the cache never interprets it. Focus and
/// selection primitives are fire-and-forget, while typography and destroy
/// can fail and report `SessionError`.
pub trait EditorSession {
    /// Current content as markup.
    fn content(&self) -> String;

    /// Replace the content wholesale (host-initiated, not a user edit).
    fn set_content(&mut self, content: &str);

    /// Give this session keyboard focus.
    fn focus(&mut self);

    /// Drop keyboard focus.
    fn blur(&mut self);

    /// Select the entire content.
    fn select_all(&mut self);

    /// Apply one typography change to the current selection.
    fn apply_typography(&mut self, op: &TypographyOp) -> Result<(), SessionError>;

    /// Tear down the engine instance. After a successful destroy the
    /// session must report `is_destroyed` and reject further typography.
    fn destroy(&mut self) -> Result<(), SessionError>;

    /// True once the engine instance has been torn down.
    fn is_destroyed(&self) -> bool;
}

/// Creates editing sessions on cache miss.
///
/// Implementations wire the engine's change/focus/blur/destroy signals to
/// the given notifier before returning the handle.
pub trait EditorFactory {
    fn create(
        &mut self,
        key: CellKey,
        initial_content: &str,
        notifier: SessionNotifier,
    ) -> Result<SessionHandle, SessionError>;
}

/// Signal reported by an engine adapter, drained by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionSignal {
    /// User edit; `at` stamps when the engine reported it, which is when
    /// the debounce window starts.
    Edited { key: CellKey, at: Instant },
    Focused { key: CellKey },
    Blurred { key: CellKey },
    /// The engine instance was torn down externally.
    Destroyed { key: CellKey },
}

/// Queue shared between the manager and every notifier it hands out.
pub(crate) type SignalQueue = Rc<RefCell<VecDeque<SessionSignal>>>;

/// Reports one session's engine signals back into the manager.
///
/// Cheap to clone; an adapter may keep one clone per engine signal wire.
/// Signals are applied in arrival order before any timer fires, so a blur
/// reported here always beats the commit deadline it races.
#[derive(Clone)]
pub struct SessionNotifier {
    key: CellKey,
    signals: SignalQueue,
    clock: Rc<dyn Clock>,
}

impl SessionNotifier {
    pub(crate) fn new(key: CellKey, signals: SignalQueue, clock: Rc<dyn Clock>) -> Self {
        Self { key, signals, clock }
    }

    /// The cell this notifier reports for.
    pub fn key(&self) -> CellKey {
        self.key
    }

    /// The session's content changed through user editing.
    pub fn content_changed(&self) {
        let at = self.clock.now();
        self.signals
            .borrow_mut()
            .push_back(SessionSignal::Edited { key: self.key, at });
    }

    /// The session gained keyboard focus.
    pub fn focused(&self) {
        self.signals
            .borrow_mut()
            .push_back(SessionSignal::Focused { key: self.key });
    }

    /// The session lost keyboard focus.
    pub fn blurred(&self) {
        self.signals
            .borrow_mut()
            .push_back(SessionSignal::Blurred { key: self.key });
    }

    /// The engine instance was destroyed outside the manager.
    pub fn destroyed(&self) {
        self.signals
            .borrow_mut()
            .push_back(SessionSignal::Destroyed { key: self.key });
    }
}
