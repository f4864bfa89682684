//! Editing-session resource cache.
//!
//! Keeps one metadata record per live editing session, keyed by cell.
//! Responsibilities:
//! - create sessions on demand through the host's `EditorFactory`, serve
//!   cached handles on repeat access
//! - bound live sessions by count and estimated memory, evicting by
//!   priority (expired and inactive records go first)
//! - own the debounced commit protocol: an edit arms a fresh 150 ms
//!   deadline for its cell, a blur cancels it, and a deadline that fires
//!   against an inactive record is skipped
//!
//! Engine adapters report edits and focus flips through `SessionNotifier`;
//! those signals are applied in arrival order at the start of `acquire`,
//! `release`, and every `tick`, before any deadline fires. A blur signal
//! therefore always cancels ahead of the commit it races. Callbacks stored
//! on records must not call back into the manager.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::Serialize;

use gridpen_core::CellKey;

use crate::clock::{Clock, RealClock};
use crate::editor::{
    EditorFactory, SessionError, SessionHandle, SessionNotifier, SessionSignal, SignalQueue,
};

/// Debounce window between a content edit and its commit.
pub const COMMIT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Memory estimate for a live session before counting its content.
const SESSION_BASE_MB: f64 = 0.5;

/// Commit sink: receives the cell and its content after the debounce
/// window closes.
pub type CommitFn = Box<dyn FnMut(&CellKey, &str)>;

/// Focus/blur hook attached at acquire time.
pub type FocusHook = Box<dyn FnMut(&CellKey)>;

/// Options for `SessionManager::acquire`.
///
/// Callbacks are wired at creation; on a cache hit the stored ones stay in
/// place. `initial_content` is pushed into an existing handle only when it
/// differs from the handle's current content.
#[derive(Default)]
pub struct SessionOptions {
    pub initial_content: Option<String>,
    pub on_content_changed: Option<CommitFn>,
    pub on_focus: Option<FocusHook>,
    pub on_blur: Option<FocusHook>,
}

/// Session cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Record count ceiling; eviction trims to 80% of this.
    pub max_active_sessions: usize,
    /// Estimated total memory ceiling in MB.
    pub max_memory_mb: f64,
    /// Inactivity span after which a record counts as expired.
    pub session_ttl: Duration,
    /// Period of the unconditional eviction sweep.
    pub cleanup_interval: Duration,
    /// Update hit/miss/latency counters.
    pub enable_metrics: bool,
    /// Include content size in memory estimates.
    pub enable_memory_tracking: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: 50,
            max_memory_mb: 100.0,
            session_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(30),
            enable_metrics: true,
            enable_memory_tracking: true,
        }
    }
}

/// Cache effectiveness counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Running average of factory create latency, in milliseconds.
    pub avg_create_latency_ms: f64,
}

/// Structural counts over the current records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub avg_access_count: f64,
    /// Age of the oldest record since creation, in seconds.
    pub oldest_age_secs: f64,
    pub total_memory_mb: f64,
}

/// Per-session bookkeeping. Exists iff the handle is live.
struct SessionRecord {
    handle: SessionHandle,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    is_active: bool,
    memory_estimate_mb: f64,
    /// Deadline of the outstanding debounced commit; restart = overwrite.
    pending_commit: Option<Instant>,
    on_content_changed: Option<CommitFn>,
    on_focus: Option<FocusHook>,
    on_blur: Option<FocusHook>,
}

/// The session cache. See the module docs for the protocol.
pub struct SessionManager<C: Clock = RealClock> {
    config: ManagerConfig,
    factory: Box<dyn EditorFactory>,
    clock: Rc<C>,
    records: FxHashMap<CellKey, SessionRecord>,
    signals: SignalQueue,
    metrics: CacheMetrics,
    next_sweep: Instant,
}

impl SessionManager<RealClock> {
    /// Create a manager on the real clock.
    pub fn new(factory: Box<dyn EditorFactory>, config: ManagerConfig) -> Self {
        Self::with_clock(factory, config, RealClock)
    }
}

impl<C: Clock + 'static> SessionManager<C> {
    /// Create a manager with a custom clock.
    pub fn with_clock(factory: Box<dyn EditorFactory>, config: ManagerConfig, clock: C) -> Self {
        let clock = Rc::new(clock);
        let now = clock.now();
        Self {
            config,
            factory,
            clock,
            records: FxHashMap::default(),
            signals: Rc::new(RefCell::new(VecDeque::new())),
            metrics: CacheMetrics::default(),
            next_sweep: now + config.cleanup_interval,
        }
    }

    /// Get or create the editing session for a cell.
    ///
    /// Hit: bumps access metadata, marks the record active, pushes
    /// `initial_content` if it differs, returns the existing handle.
    /// Miss: runs the capacity check, creates through the factory, wires
    /// the notifier, stores a fresh record.
    pub fn acquire(
        &mut self,
        key: CellKey,
        options: SessionOptions,
    ) -> Result<SessionHandle, SessionError> {
        self.apply_signals();
        let now = self.clock.now();

        if let Some(record) = self.records.get_mut(&key) {
            record.last_accessed = now;
            record.access_count += 1;
            record.is_active = true;
            if let Some(content) = &options.initial_content {
                let current = record.handle.borrow().content();
                if *content != current {
                    // Host push of fresh table data, not a user edit: no
                    // debounce deadline is armed.
                    record.handle.borrow_mut().set_content(content);
                    record.memory_estimate_mb = estimate_memory(&self.config, content);
                }
            }
            if self.config.enable_metrics {
                self.metrics.hits += 1;
            }
            log::debug!("Session cache hit for {}", key);
            return Ok(record.handle.clone());
        }

        self.capacity_check();

        let started = self.clock.now();
        let notifier = SessionNotifier::new(key, Rc::clone(&self.signals), self.clock.clone());
        let initial = options.initial_content.as_deref().unwrap_or("");
        let handle = self.factory.create(key, initial, notifier)?;
        let create_latency = self.clock.now().saturating_duration_since(started);

        if self.config.enable_metrics {
            self.metrics.misses += 1;
            let sample_ms = create_latency.as_secs_f64() * 1000.0;
            let n = self.metrics.misses as f64;
            self.metrics.avg_create_latency_ms +=
                (sample_ms - self.metrics.avg_create_latency_ms) / n;
        }

        let memory_estimate_mb = estimate_memory(&self.config, initial);
        log::debug!(
            "Created session for {} ({:.2} MB estimated)",
            key,
            memory_estimate_mb
        );

        self.records.insert(
            key,
            SessionRecord {
                handle: handle.clone(),
                created_at: now,
                last_accessed: now,
                access_count: 1,
                is_active: true,
                memory_estimate_mb,
                pending_commit: None,
                on_content_changed: options.on_content_changed,
                on_focus: options.on_focus,
                on_blur: options.on_blur,
            },
        );
        Ok(handle)
    }

    /// Destroy a cell's session and forget its record.
    ///
    /// Idempotent: returns false when no record exists. The record is
    /// removed even when the destroy attempt fails, so no unreachable
    /// record can leak.
    pub fn release(&mut self, key: &CellKey) -> bool {
        self.apply_signals();
        self.remove_record(key, "released")
    }

    /// Trim the cache to 80% of `max_active_sessions`, highest eviction
    /// priority first. Returns the number of records removed.
    pub fn evict(&mut self) -> usize {
        let target = self.config.max_active_sessions * 4 / 5;
        if self.records.len() <= target {
            return 0;
        }

        let now = self.clock.now();
        let mut scored: Vec<(f64, CellKey)> = self
            .records
            .iter()
            .map(|(key, record)| (eviction_priority(&self.config, record, now), *key))
            .collect();
        // Highest priority first; ties broken by key for determinism
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        let mut removed = 0;
        for (_, key) in scored {
            if self.records.len() <= target {
                break;
            }
            if self.remove_record(&key, "evicted") {
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!("Evicted {} session(s), {} remain", removed, self.records.len());
        }
        removed
    }

    /// Structural counts over the current records.
    pub fn stats(&self) -> ManagerStats {
        let now = self.clock.now();
        let total = self.records.len();
        let active = self.records.values().filter(|r| r.is_active).count();
        let access_sum: u64 = self.records.values().map(|r| r.access_count).sum();
        let oldest_age_secs = self
            .records
            .values()
            .map(|r| now.saturating_duration_since(r.created_at).as_secs_f64())
            .fold(0.0, f64::max);
        let total_memory_mb = self.records.values().map(|r| r.memory_estimate_mb).sum();

        ManagerStats {
            total,
            active,
            inactive: total - active,
            avg_access_count: if total == 0 {
                0.0
            } else {
                access_sum as f64 / total as f64
            },
            oldest_age_secs,
            total_memory_mb,
        }
    }

    /// Cache effectiveness counters.
    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    /// Cancel all pending commits and destroy every session. Safe to call
    /// multiple times.
    pub fn shutdown(&mut self) {
        self.signals.borrow_mut().clear();
        if self.records.is_empty() {
            return;
        }
        let keys: Vec<CellKey> = self.records.keys().copied().collect();
        let count = keys.len();
        for key in &keys {
            self.remove_record(key, "shutdown");
        }
        log::info!("Session manager shut down, {} session(s) destroyed", count);
    }

    /// Apply queued signals, fire due commit deadlines, and run the
    /// periodic sweep when its interval elapsed. Host calls this from its
    /// frame or timer loop.
    pub fn tick(&mut self) {
        self.apply_signals();
        self.fire_due_commits();

        let now = self.clock.now();
        if now >= self.next_sweep {
            self.evict();
            self.next_sweep = now + self.config.cleanup_interval;
        }
    }

    /// Peek at a cached handle without touching access metadata.
    pub fn handle(&self, key: &CellKey) -> Option<SessionHandle> {
        self.records.get(key).map(|r| r.handle.clone())
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.records.contains_key(key)
    }

    /// Whether the cell's record is currently marked active.
    pub fn is_active(&self, key: &CellKey) -> bool {
        self.records.get(key).map(|r| r.is_active).unwrap_or(false)
    }

    /// Whether the cell has an outstanding debounced commit.
    pub fn has_pending_commit(&self, key: &CellKey) -> bool {
        self.records
            .get(key)
            .map(|r| r.pending_commit.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Drain notifier signals in arrival order.
    fn apply_signals(&mut self) {
        loop {
            // One at a time: a hook may enqueue further signals
            let signal = match self.signals.borrow_mut().pop_front() {
                Some(signal) => signal,
                None => break,
            };
            match signal {
                SessionSignal::Edited { key, at } => {
                    if let Some(record) = self.records.get_mut(&key) {
                        record.pending_commit = Some(at + COMMIT_DEBOUNCE);
                    }
                }
                SessionSignal::Focused { key } => {
                    let now = self.clock.now();
                    if let Some(record) = self.records.get_mut(&key) {
                        record.is_active = true;
                        record.last_accessed = now;
                        if let Some(hook) = record.on_focus.as_mut() {
                            hook(&key);
                        }
                    }
                }
                SessionSignal::Blurred { key } => {
                    if let Some(record) = self.records.get_mut(&key) {
                        // Cancel before anything else; the pending edit
                        // must not outlive the focus that produced it
                        record.pending_commit = None;
                        record.is_active = false;
                        if let Some(hook) = record.on_blur.as_mut() {
                            hook(&key);
                        }
                    }
                }
                SessionSignal::Destroyed { key } => {
                    // The engine tore the instance down itself
                    if self.records.remove(&key).is_some() {
                        log::debug!("Session for {} destroyed externally", key);
                    }
                }
            }
        }
    }

    /// Fire every due commit deadline, oldest first, ties by cell key.
    fn fire_due_commits(&mut self) {
        let now = self.clock.now();
        let mut due: Vec<(Instant, CellKey)> = self
            .records
            .iter()
            .filter_map(|(key, record)| {
                record
                    .pending_commit
                    .filter(|deadline| *deadline <= now)
                    .map(|deadline| (deadline, *key))
            })
            .collect();
        if due.is_empty() {
            return;
        }
        due.sort();

        for (_, key) in due {
            let record = match self.records.get_mut(&key) {
                Some(record) => record,
                None => continue,
            };
            record.pending_commit = None;
            if !record.is_active {
                // The cell went inactive while the timer was pending; a
                // trailing edit must not overwrite the newly focused cell
                log::debug!("Skipped stale commit for {}", key);
                continue;
            }
            let content = record.handle.borrow().content();
            record.memory_estimate_mb = estimate_memory(&self.config, &content);
            if let Some(commit) = record.on_content_changed.as_mut() {
                commit(&key, &content);
            }
        }
    }

    /// Evict ahead of a miss-creation when count or memory is at the
    /// ceiling.
    fn capacity_check(&mut self) {
        let total_memory: f64 = self.records.values().map(|r| r.memory_estimate_mb).sum();
        let over_memory = total_memory > self.config.max_memory_mb;
        let over_count = self.records.len() >= self.config.max_active_sessions;
        if over_memory || over_count {
            log::debug!(
                "Capacity pressure before create ({} records, {:.1} MB), evicting",
                self.records.len(),
                total_memory
            );
            self.evict();
        }
    }

    /// Destroy one session and drop its record. Taking the record out of
    /// the map unschedules its pending commit before the destroy attempt.
    fn remove_record(&mut self, key: &CellKey, cause: &str) -> bool {
        let record = match self.records.remove(key) {
            Some(record) => record,
            None => return false,
        };
        if let Err(e) = record.handle.borrow_mut().destroy() {
            log::warn!("Destroy failed for {} ({}): {}", key, cause, e);
        }
        log::debug!("Removed session for {} ({})", key, cause);
        true
    }
}

fn estimate_memory(config: &ManagerConfig, content: &str) -> f64 {
    if config.enable_memory_tracking {
        SESSION_BASE_MB + content.len() as f64 / (1024.0 * 1024.0)
    } else {
        SESSION_BASE_MB
    }
}

/// Eviction priority. Expired and inactive records lead, then idle time,
/// memory weight, and rarely-accessed records.
fn eviction_priority(config: &ManagerConfig, record: &SessionRecord, now: Instant) -> f64 {
    let idle = now.saturating_duration_since(record.last_accessed);
    let mut priority = 0.0;
    if idle > config.session_ttl {
        priority += 50.0;
    }
    if !record.is_active {
        priority += 30.0;
    }
    priority += idle.as_secs_f64();
    priority += record.memory_estimate_mb / 10.0;
    priority += (10.0 - record.access_count as f64).max(0.0);
    priority
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::editor::EditorSession;
    use crate::harness::{EditorCall, ScriptedFactory};
    use gridpen_core::{GridPos, TableId};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn key(row: i32, col: i32) -> CellKey {
        CellKey::new(TableId(1), GridPos::new(row, col))
    }

    fn manager_with(
        config: ManagerConfig,
    ) -> (SessionManager<ManualClock>, ScriptedFactory, ManualClock) {
        let clock = ManualClock::new();
        let factory = ScriptedFactory::new();
        let manager =
            SessionManager::with_clock(Box::new(factory.clone()), config, clock.clone());
        (manager, factory, clock)
    }

    /// Commit sink recording (key, content) pairs.
    fn commit_log() -> (Rc<RefCell<Vec<(CellKey, String)>>>, CommitFn) {
        let log: Rc<RefCell<Vec<(CellKey, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let commit: CommitFn =
            Box::new(move |key, content| sink.borrow_mut().push((*key, content.to_string())));
        (log, commit)
    }

    fn opts(content: &str) -> SessionOptions {
        SessionOptions {
            initial_content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_acquire_hit_returns_same_handle() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        let first = manager.acquire(k, opts("<p>a</p>")).unwrap();
        let second = manager.acquire(k, opts("<p>a</p>")).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(factory.created_count(), 1);
        let metrics = manager.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 1);
    }

    #[test]
    fn test_acquire_hit_pushes_changed_content_only() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        manager.acquire(k, opts("<p>a</p>")).unwrap();
        // Same content: no push
        manager.acquire(k, opts("<p>a</p>")).unwrap();
        let editor = factory.editor(&k).unwrap();
        assert!(!editor
            .borrow()
            .calls()
            .iter()
            .any(|c| matches!(c, EditorCall::SetContent(_))));

        // Changed content: pushed, but no debounce armed (host push)
        manager.acquire(k, opts("<p>b</p>")).unwrap();
        assert!(editor
            .borrow()
            .calls()
            .iter()
            .any(|c| *c == EditorCall::SetContent("<p>b</p>".to_string())));
        assert!(!manager.has_pending_commit(&k));
    }

    #[test]
    fn test_acquire_without_content_leaves_handle_alone() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        manager.acquire(k, opts("<p>a</p>")).unwrap();
        manager.acquire(k, SessionOptions::default()).unwrap();

        let editor = factory.editor(&k).unwrap();
        assert_eq!(editor.borrow().content_str(), "<p>a</p>");
        assert!(!editor
            .borrow()
            .calls()
            .iter()
            .any(|c| matches!(c, EditorCall::SetContent(_))));
    }

    #[test]
    fn test_release_idempotent_and_destroys() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        manager.acquire(k, opts("x")).unwrap();
        assert!(manager.release(&k));
        assert!(!manager.release(&k));
        assert!(!manager.contains(&k));
        assert!(factory.editor(&k).unwrap().borrow().is_destroyed());
    }

    #[test]
    fn test_destroy_failure_still_removes_record() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        manager.acquire(k, opts("x")).unwrap();
        factory.editor(&k).unwrap().borrow_mut().set_fail_destroy(true);

        assert!(manager.release(&k));
        assert!(!manager.contains(&k));
        // The destroy attempt failed, so the editor never flipped
        assert!(!factory.editor(&k).unwrap().borrow().is_destroyed());
    }

    #[test]
    fn test_create_failure_propagates() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        factory.fail_next_create();

        let result = manager.acquire(key(0, 0), opts("x"));
        assert!(matches!(result, Err(SessionError::Create { .. })));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_debounce_coalesces_rapid_edits() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let (log, commit) = commit_log();

        manager
            .acquire(
                k,
                SessionOptions {
                    initial_content: Some("a".into()),
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        let editor = factory.editor(&k).unwrap();

        editor.borrow_mut().type_text("b");
        clock.advance_ms(40);
        editor.borrow_mut().type_text("c");
        clock.advance_ms(40);
        editor.borrow_mut().type_text("d");

        // Window still open from the last edit
        clock.advance_ms(100);
        manager.tick();
        assert!(log.borrow().is_empty());

        clock.advance_ms(50);
        manager.tick();
        let committed = log.borrow();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0], (k, "abcd".to_string()));
    }

    #[test]
    fn test_debounce_fires_once_per_window() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let (log, commit) = commit_log();

        manager
            .acquire(
                k,
                SessionOptions {
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        let editor = factory.editor(&k).unwrap();

        editor.borrow_mut().type_text("x");
        clock.advance_ms(150);
        manager.tick();
        assert_eq!(log.borrow().len(), 1);

        // No further edits: later ticks stay quiet
        clock.advance_ms(500);
        manager.tick();
        assert_eq!(log.borrow().len(), 1);

        editor.borrow_mut().type_text("y");
        clock.advance_ms(150);
        manager.tick();
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[1].1, "xy");
    }

    #[test]
    fn test_blur_cancels_pending_commit() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let (log, commit) = commit_log();

        manager
            .acquire(
                k,
                SessionOptions {
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        let editor = factory.editor(&k).unwrap();

        editor.borrow_mut().type_text("x");
        editor.borrow_mut().blur();
        clock.advance_ms(300);
        manager.tick();

        assert!(log.borrow().is_empty());
        assert!(!manager.is_active(&k));
    }

    #[test]
    fn test_stale_commit_skipped_for_inactive_record() {
        // A trailing edit that lands after the blur re-arms the deadline;
        // the is_active check at fire time is what suppresses it.
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let (log, commit) = commit_log();

        manager
            .acquire(
                k,
                SessionOptions {
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        let editor = factory.editor(&k).unwrap();

        editor.borrow_mut().type_text("x");
        editor.borrow_mut().blur();
        editor.borrow_mut().type_text("y");

        clock.advance_ms(300);
        manager.tick();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_two_cells_only_active_commit_fires() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let a = key(0, 0);
        let b = key(0, 1);
        let (log, commit_a) = commit_log();
        let sink = log.clone();
        let commit_b: CommitFn =
            Box::new(move |key, content| sink.borrow_mut().push((*key, content.to_string())));

        manager
            .acquire(
                a,
                SessionOptions {
                    on_content_changed: Some(commit_a),
                    ..Default::default()
                },
            )
            .unwrap();
        manager
            .acquire(
                b,
                SessionOptions {
                    on_content_changed: Some(commit_b),
                    ..Default::default()
                },
            )
            .unwrap();

        // Edit a, leave it, move to b and edit there
        factory.editor(&a).unwrap().borrow_mut().focus();
        factory.editor(&a).unwrap().borrow_mut().type_text("stale");
        factory.editor(&a).unwrap().borrow_mut().blur();
        factory.editor(&b).unwrap().borrow_mut().focus();
        factory.editor(&b).unwrap().borrow_mut().type_text("fresh");

        clock.advance_ms(200);
        manager.tick();

        let committed = log.borrow();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0], (b, "fresh".to_string()));
    }

    #[test]
    fn test_release_cancels_pending_commit() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let (log, commit) = commit_log();

        manager
            .acquire(
                k,
                SessionOptions {
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        factory.editor(&k).unwrap().borrow_mut().type_text("x");
        assert!(manager.release(&k));

        clock.advance_ms(300);
        manager.tick();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_focus_blur_hooks_run() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);
        let trace: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let on_focus = trace.clone();
        let on_blur = trace.clone();

        manager
            .acquire(
                k,
                SessionOptions {
                    on_focus: Some(Box::new(move |_| on_focus.borrow_mut().push("focus"))),
                    on_blur: Some(Box::new(move |_| on_blur.borrow_mut().push("blur"))),
                    ..Default::default()
                },
            )
            .unwrap();

        let editor = factory.editor(&k).unwrap();
        editor.borrow_mut().focus();
        editor.borrow_mut().blur();
        manager.tick();

        assert_eq!(*trace.borrow(), vec!["focus", "blur"]);
        assert!(!manager.is_active(&k));
    }

    #[test]
    fn test_external_destroy_forgets_record() {
        let (mut manager, factory, _clock) = manager_with(ManagerConfig::default());
        let k = key(0, 0);

        manager.acquire(k, opts("x")).unwrap();
        factory.editor(&k).unwrap().borrow_mut().simulate_external_destroy();
        manager.tick();

        assert!(!manager.contains(&k));
        // Forgotten, not destroyed a second time
        let calls = factory.editor(&k).unwrap().borrow().calls().to_vec();
        assert!(!calls.contains(&EditorCall::Destroy));
    }

    #[test]
    fn test_eviction_trims_to_80_percent() {
        let config = ManagerConfig {
            max_active_sessions: 10,
            ..Default::default()
        };
        let (mut manager, factory, _clock) = manager_with(config);

        for col in 0..10 {
            manager.acquire(key(0, col), opts("x")).unwrap();
            // Only the latest acquired cell stays active
            if col > 0 {
                factory
                    .editor(&key(0, col - 1))
                    .unwrap()
                    .borrow_mut()
                    .blur();
            }
        }

        let removed = manager.evict();
        assert_eq!(removed, 2);
        assert_eq!(manager.stats().total, 8);
    }

    #[test]
    fn test_eviction_prefers_idle_inactive_records() {
        let config = ManagerConfig {
            max_active_sessions: 2,
            ..Default::default()
        };
        let (mut manager, factory, clock) = manager_with(config);
        let a = key(0, 0);
        let b = key(0, 1);
        let c = key(0, 2);

        manager.acquire(a, opts("a")).unwrap();
        factory.editor(&a).unwrap().borrow_mut().blur();
        clock.advance_ms(5_000);
        manager.acquire(b, opts("b")).unwrap();

        // Third acquire trips the capacity check; idle inactive a goes
        manager.acquire(c, opts("c")).unwrap();

        assert!(manager.stats().total <= 2);
        assert!(!manager.contains(&a));
        assert!(manager.contains(&b));
        assert!(manager.contains(&c));
    }

    #[test]
    fn test_periodic_sweep_runs_without_pressure() {
        let config = ManagerConfig {
            max_active_sessions: 5,
            cleanup_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let (mut manager, factory, clock) = manager_with(config);

        for col in 0..5 {
            manager.acquire(key(0, col), opts("x")).unwrap();
            factory.editor(&key(0, col)).unwrap().borrow_mut().blur();
        }
        assert_eq!(manager.stats().total, 5);

        // No acquire happens, but the sweep still trims to 80%
        clock.advance(Duration::from_secs(31));
        manager.tick();
        assert_eq!(manager.stats().total, 4);
    }

    #[test]
    fn test_stats_counts() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());

        manager.acquire(key(0, 0), opts("aaaa")).unwrap();
        manager.acquire(key(0, 1), opts("bb")).unwrap();
        factory.editor(&key(0, 1)).unwrap().borrow_mut().blur();
        clock.advance(Duration::from_secs(2));
        manager.tick();

        let stats = manager.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.inactive, 1);
        assert!((stats.avg_access_count - 1.0).abs() < f64::EPSILON);
        assert!(stats.oldest_age_secs >= 2.0);
        assert!(stats.total_memory_mb > 1.0); // two sessions, base 0.5 each
    }

    #[test]
    fn test_memory_tracking_disabled_uses_flat_estimate() {
        let config = ManagerConfig {
            enable_memory_tracking: false,
            ..Default::default()
        };
        let (mut manager, _factory, _clock) = manager_with(config);

        let big = "x".repeat(4 * 1024 * 1024);
        manager.acquire(key(0, 0), opts(&big)).unwrap();
        let stats = manager.stats();
        assert!((stats.total_memory_mb - SESSION_BASE_MB).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_disabled_freezes_counters() {
        let config = ManagerConfig {
            enable_metrics: false,
            ..Default::default()
        };
        let (mut manager, _factory, _clock) = manager_with(config);

        manager.acquire(key(0, 0), opts("x")).unwrap();
        manager.acquire(key(0, 0), opts("x")).unwrap();
        assert_eq!(manager.metrics(), CacheMetrics::default());
    }

    #[test]
    fn test_shutdown_destroys_all_and_is_idempotent() {
        let (mut manager, factory, clock) = manager_with(ManagerConfig::default());
        let (log, commit) = commit_log();

        manager
            .acquire(
                key(0, 0),
                SessionOptions {
                    on_content_changed: Some(commit),
                    ..Default::default()
                },
            )
            .unwrap();
        manager.acquire(key(0, 1), opts("y")).unwrap();
        factory.editor(&key(0, 0)).unwrap().borrow_mut().type_text("z");

        manager.shutdown();
        manager.shutdown();

        assert!(manager.is_empty());
        assert!(factory.editor(&key(0, 0)).unwrap().borrow().is_destroyed());
        assert!(factory.editor(&key(0, 1)).unwrap().borrow().is_destroyed());

        // The pending commit died with the records
        clock.advance_ms(300);
        manager.tick();
        assert!(log.borrow().is_empty());
    }
}
