//! gpen smoke: release gate and demo harness for the session engine.
//!
//! Proves end-to-end, against a scripted editor backend on a manual
//! clock: cache identity -> focus context -> debounced commit ->
//! stale-commit suppression -> navigation bounds -> lock semantics ->
//! range selection -> leaving the table -> eviction under pressure ->
//! shutdown. No widget toolkit, no wall-clock waits.
//!
//! Exit codes:
//!   0 - all steps passed
//!   1 - a step failed (clean error message printed)
//!
//! Usage:
//!   gpen smoke
//!   gpen smoke --json
//!   gpen smoke --max-sessions 4 --verbose

use std::cell::{Cell, RefCell};
use std::process::ExitCode;
use std::rc::Rc;

use chrono::Utc;
use serde::Serialize;

use gridpen_core::{CellKey, GridPos, NavDirection, TableId};
use gridpen_engine::coordinator::{ClearOutcome, FocusOptions};
use gridpen_engine::editor::{EditorSession, TypographyOp};
use gridpen_engine::harness::{EditorCall, ScriptedTable, SessionHarness};
use gridpen_engine::manager::{CommitFn, ManagerConfig, ManagerStats, SessionOptions};
use gridpen_engine::registry::{TableDataPatch, TableRegistry};

use crate::{EXIT_ERROR, EXIT_SUCCESS};

/// CLI arguments for `gpen smoke`.
#[derive(clap::Args, Debug)]
pub struct SmokeArgs {
    /// Session ceiling for the eviction scenario
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(2..=12))]
    pub max_sessions: u64,

    /// Emit a JSON report instead of step lines
    #[arg(long)]
    pub json: bool,

    /// Verbose output (metrics and event tallies on stderr)
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepReport {
    step: String,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTally {
    selection: usize,
    focus: usize,
    blur: usize,
    context: usize,
    navigation: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmokeReport {
    started_at: String,
    max_sessions: u64,
    steps: Vec<StepReport>,
    /// Cache shape after the eviction step, before shutdown.
    stats: Option<ManagerStats>,
    events: EventTally,
    passed: bool,
}

/// Commit sink: counts commits and forwards content into the table
/// widget, the way a host would wire its data store.
fn commit_into(registry: Rc<RefCell<TableRegistry>>, commits: Rc<Cell<usize>>) -> CommitFn {
    Box::new(move |key, content| {
        commits.set(commits.get() + 1);
        let patch = TableDataPatch::new().set(key.pos, content);
        registry.borrow().update_data(&key.table, &patch);
    })
}

struct SmokeRunner {
    json: bool,
    verbose: bool,
    ceiling: usize,
    rows: usize,
    cols: usize,
    table: TableId,
    h: SessionHarness,
    widget: Rc<RefCell<ScriptedTable>>,
    commits: Rc<Cell<usize>>,
    steps: Vec<StepReport>,
    /// Stats captured after the eviction step.
    stats: Option<ManagerStats>,
}

impl SmokeRunner {
    fn new(args: &SmokeArgs) -> Self {
        let ceiling = args.max_sessions as usize;
        let rows = 4;
        // Wide enough that the eviction fill fits inside the table
        let cols = (ceiling + 2).max(4);

        let config = ManagerConfig {
            max_active_sessions: ceiling,
            ..Default::default()
        };
        let mut h = SessionHarness::new(config);
        let table = TableId::from_raw(1);
        let widget = h.add_table(table, rows, cols);

        Self {
            json: args.json,
            verbose: args.verbose,
            ceiling,
            rows,
            cols,
            table,
            h,
            widget,
            commits: Rc::new(Cell::new(0)),
            steps: Vec::new(),
            stats: None,
        }
    }

    fn key(&self, row: i32, col: i32) -> CellKey {
        CellKey::new(self.table, GridPos::new(row, col))
    }

    fn acquire(&mut self, key: CellKey, content: &str) -> Result<(), String> {
        let options = SessionOptions {
            initial_content: Some(content.to_string()),
            on_content_changed: Some(commit_into(self.h.registry.clone(), self.commits.clone())),
            ..Default::default()
        };
        self.h
            .acquire(key, options)
            .map(|_| ())
            .map_err(|e| format!("acquire {}: {}", key, e))
    }

    fn focused_pos(&self) -> Option<GridPos> {
        self.h
            .coordinator
            .state()
            .focused
            .as_ref()
            .map(|f| f.key.pos)
    }

    fn print_step(&self, step: &str, status: &str, detail: &str) {
        if !self.json {
            println!("{} step={} {}", status, step, detail);
        }
    }

    fn run_step<F>(&mut self, name: &str, f: F) -> Result<(), String>
    where
        F: FnOnce(&mut Self) -> Result<String, String>,
    {
        match f(self) {
            Ok(detail) => {
                self.print_step(name, "OK", &detail);
                self.steps.push(StepReport {
                    step: name.to_string(),
                    status: "OK",
                    detail,
                });
                Ok(())
            }
            Err(e) => {
                self.print_step(name, "FAIL", &e);
                self.steps.push(StepReport {
                    step: name.to_string(),
                    status: "FAIL",
                    detail: e.clone(),
                });
                Err(e)
            }
        }
    }

    // ========================================================================
    // Step: sessions - cache identity and hit/miss accounting
    // ========================================================================

    fn step_sessions(&mut self) -> Result<String, String> {
        let a = self.key(0, 0);
        let b = self.key(0, 1);

        self.acquire(a, "<p>alpha</p>")?;
        let first = self
            .h
            .manager
            .borrow()
            .handle(&a)
            .ok_or("session for a missing after acquire")?;

        // Repeat acquire with unchanged content: same handle, tallied hit
        self.acquire(a, "<p>alpha</p>")?;
        let second = self
            .h
            .manager
            .borrow()
            .handle(&a)
            .ok_or("session for a missing after repeat acquire")?;
        if !Rc::ptr_eq(&first, &second) {
            return Err("repeat acquire returned a different handle".to_string());
        }

        self.acquire(b, "<p>beta</p>")?;

        let metrics = self.h.manager.borrow().metrics();
        if metrics.hits != 1 || metrics.misses != 2 {
            return Err(format!(
                "expected hits=1 misses=2, got hits={} misses={}",
                metrics.hits, metrics.misses
            ));
        }
        if self.verbose {
            eprintln!("[smoke] avg create latency {:.3}ms", metrics.avg_create_latency_ms);
        }
        Ok(format!("hits={} misses={}", metrics.hits, metrics.misses))
    }

    // ========================================================================
    // Step: focus - coordinator resolves the cached session
    // ========================================================================

    fn step_focus(&mut self) -> Result<String, String> {
        let a = self.key(0, 0);
        if !self
            .h
            .coordinator
            .focus_cell(self.table, a.pos, FocusOptions::default())
        {
            return Err("focus_cell on a registered table failed".to_string());
        }

        let context = self.h.coordinator.context();
        if !context.can_edit {
            return Err("focused cell with a cached session should be editable".to_string());
        }
        if context.command_target != Some(a) {
            return Err(format!("command target should be {}", a));
        }
        let state = self.h.coordinator.state();
        if !state.lock.held {
            return Err("focus should take the selection lock".to_string());
        }
        if state.selected.len() != 1 {
            return Err(format!("single focus selected {} cells", state.selected.len()));
        }
        Ok(format!("cell={} can_edit=true lock=held", a))
    }

    // ========================================================================
    // Step: commit - rapid edits coalesce into one commit
    // ========================================================================

    fn step_commit(&mut self) -> Result<String, String> {
        let a = self.key(0, 0);

        self.h.type_text(&a, "<p>one</p>");
        self.h.advance_ms(40);
        self.h.type_text(&a, "<p>two</p>");
        self.h.advance_ms(40);
        self.h.type_text(&a, "<p>three</p>");

        // Window still open from the last edit
        self.h.advance_ms(100);
        self.h.tick();
        if self.commits.get() != 0 {
            return Err("commit fired before the debounce window closed".to_string());
        }

        self.h.advance_ms(50);
        self.h.tick();
        if self.commits.get() != 1 {
            return Err(format!(
                "expected exactly one coalesced commit, got {}",
                self.commits.get()
            ));
        }

        let expected = "<p>alpha</p><p>one</p><p>two</p><p>three</p>";
        let committed = self.widget.borrow().cell(&a.pos).map(str::to_string);
        if committed.as_deref() != Some(expected) {
            return Err(format!("table holds {:?}, expected the final content", committed));
        }
        Ok(format!("commits=1 content_len={}", expected.len()))
    }

    // ========================================================================
    // Step: stale_commit - navigating away suppresses the trailing edit
    // ========================================================================

    fn step_stale_commit(&mut self) -> Result<String, String> {
        let a = self.key(0, 0);
        let b = self.key(0, 1);
        let a_before = self.widget.borrow().cell(&a.pos).map(str::to_string);

        self.h.type_text(&a, "<p>stale</p>");
        self.h.advance_ms(10);

        // Tab advances to b; the blur it causes must cancel a's commit
        if !self.h.coordinator.navigate_cell(NavDirection::Tab) {
            return Err("tab navigation from a to b failed".to_string());
        }
        self.h.type_text(&b, "<p>fresh</p>");

        self.h.advance_ms(200);
        self.h.tick();

        if self.commits.get() != 2 {
            return Err(format!(
                "expected one further commit for b, got {} total",
                self.commits.get()
            ));
        }
        let b_content = self.widget.borrow().cell(&b.pos).map(str::to_string);
        if b_content.as_deref() != Some("<p>beta</p><p>fresh</p>") {
            return Err(format!("b committed {:?}", b_content));
        }
        let a_after = self.widget.borrow().cell(&a.pos).map(str::to_string);
        if a_after != a_before {
            return Err(format!("stale edit leaked into a: {:?}", a_after));
        }
        Ok(format!("suppressed={} committed={}", a, b))
    }

    // ========================================================================
    // Step: navigation - no out-of-bounds position is reachable
    // ========================================================================

    fn step_navigation(&mut self) -> Result<String, String> {
        // Focused at b = (0, 1) after the tab in the previous step
        if self.h.coordinator.navigate_cell(NavDirection::Up) {
            return Err("navigation above row 0 should be rejected".to_string());
        }
        if self.focused_pos() != Some(GridPos::new(0, 1)) {
            return Err("rejected navigation moved the focus".to_string());
        }

        let mut tabs = 0;
        while self.h.coordinator.navigate_cell(NavDirection::Tab) {
            tabs += 1;
            if tabs > self.cols {
                return Err("tab walk did not stop at the last column".to_string());
            }
        }
        if self.focused_pos() != Some(GridPos::new(0, self.cols as i32 - 1)) {
            return Err(format!("tab walk ended at {:?}", self.focused_pos()));
        }

        let mut enters = 0;
        while self.h.coordinator.navigate_cell(NavDirection::Enter) {
            enters += 1;
            if enters > self.rows {
                return Err("enter walk did not stop at the last row".to_string());
            }
        }
        let corner = GridPos::new(self.rows as i32 - 1, self.cols as i32 - 1);
        if self.focused_pos() != Some(corner) {
            return Err(format!("enter walk ended at {:?}", self.focused_pos()));
        }
        Ok(format!("edges rejected at r0/c{}/r{}", self.cols - 1, self.rows - 1))
    }

    // ========================================================================
    // Step: lock - a held lock defers soft clears, force always wins
    // ========================================================================

    fn step_lock(&mut self) -> Result<String, String> {
        if !self.h.coordinator.is_locked() {
            return Err("focus should have left the lock held".to_string());
        }

        if self.h.coordinator.clear_selection(false) != ClearOutcome::Deferred {
            return Err("soft clear under lock should be deferred".to_string());
        }
        self.h.advance_ms(1_000);
        self.h.tick();
        if !self.h.coordinator.state().has_selection {
            return Err("deferred clear must never fire".to_string());
        }

        if self.h.coordinator.clear_selection(true) != ClearOutcome::Cleared {
            return Err("forced clear should clear immediately".to_string());
        }
        if self.h.coordinator.state().has_selection {
            return Err("selection survives a forced clear".to_string());
        }
        Ok("soft=deferred forced=cleared".to_string())
    }

    // ========================================================================
    // Step: range - cartesian selection, typography where handles exist
    // ========================================================================

    fn step_range(&mut self) -> Result<String, String> {
        // Covers a and b (cached sessions) plus two handle-less cells
        if !self
            .h
            .coordinator
            .select_cell_range(self.table, GridPos::new(0, 0), GridPos::new(1, 1))
        {
            return Err("range selection on a registered table failed".to_string());
        }

        let state = self.h.coordinator.state();
        if state.selected.len() != 4 {
            return Err(format!("2x2 range selected {} cells", state.selected.len()));
        }
        if state.focused.is_some() {
            return Err("range selection should not carry a focused cell".to_string());
        }
        let context = state.context;
        if !context.can_apply_typography || context.can_edit || context.can_navigate {
            return Err(format!("range context has the wrong shape: {:?}", context));
        }

        if !self
            .h
            .coordinator
            .apply_typography(&[TypographyOp::FontWeight(Some(700))])
        {
            return Err("typography over a range with live handles failed".to_string());
        }
        let mut styled = 0;
        for key in [self.key(0, 0), self.key(0, 1)] {
            let editor = self.h.editor(&key).ok_or("scripted editor missing")?;
            let got = editor
                .borrow()
                .calls()
                .iter()
                .any(|c| matches!(c, EditorCall::Typography(_)));
            if got {
                styled += 1;
            }
        }
        if styled != 2 {
            return Err(format!("expected typography on 2 cells, got {}", styled));
        }
        Ok(format!("cells=4 typography={}", styled))
    }

    // ========================================================================
    // Step: non_table - leaving the table beats every lock
    // ========================================================================

    fn step_non_table(&mut self) -> Result<String, String> {
        self.h.coordinator.handle_non_table_selection();

        let state = self.h.coordinator.state();
        if state.has_selection {
            return Err("selection survived a non-table selection".to_string());
        }
        if state.lock.held {
            return Err("lock survived a non-table selection".to_string());
        }
        Ok("cleared=true unlocked=true".to_string())
    }

    // ========================================================================
    // Step: eviction - ceiling holds and the idle LRU goes first
    // ========================================================================

    fn step_eviction(&mut self) -> Result<String, String> {
        let a = self.key(0, 0);
        let b = self.key(0, 1);

        // The user comes back to b; its recency now far outweighs a's
        self.h
            .acquire(b, SessionOptions::default())
            .map_err(|e| format!("re-acquire {}: {}", b, e))?;

        // Fill the cache up to the ceiling with fresh sessions in row 3
        for i in 0..(self.ceiling.saturating_sub(2)) {
            self.acquire(self.key(3, i as i32), "<p>fill</p>")?;
            self.h.advance_ms(5);
        }

        // One more acquire trips the capacity check
        let trip = self.key(3, self.ceiling.saturating_sub(2) as i32);
        self.acquire(trip, "<p>trip</p>")?;

        let stats = self.h.manager.borrow().stats();
        // Trim lands on 80% of the ceiling, then the new session joins
        let expected = self.ceiling * 4 / 5 + 1;
        if stats.total != expected {
            return Err(format!(
                "cache holds {} records, expected {} under ceiling {}",
                stats.total, expected, self.ceiling
            ));
        }
        if self.h.manager.borrow().contains(&a) {
            return Err("idle LRU cell a should have been evicted first".to_string());
        }
        if !self.h.manager.borrow().contains(&b) {
            return Err("recently touched b must outlive the idle a".to_string());
        }
        if !self.h.manager.borrow().contains(&trip) {
            return Err("the newest session must never be evicted".to_string());
        }

        self.stats = Some(stats);
        Ok(format!(
            "total={} ceiling={} evicted_lru={}",
            stats.total, self.ceiling, a
        ))
    }

    // ========================================================================
    // Step: shutdown - everything destroyed, idempotent
    // ========================================================================

    fn step_shutdown(&mut self) -> Result<String, String> {
        let created = self.h.factory.created_count();
        self.h.manager.borrow_mut().shutdown();
        self.h.manager.borrow_mut().shutdown();

        if !self.h.manager.borrow().is_empty() {
            return Err("records remain after shutdown".to_string());
        }
        for col in 0..2 {
            let key = self.key(0, col);
            let editor = self.h.editor(&key).ok_or("scripted editor missing")?;
            if !editor.borrow().is_destroyed() {
                return Err(format!("editor for {} was not destroyed", key));
            }
        }
        Ok(format!("created={} remaining=0", created))
    }

    // ========================================================================
    // Main run
    // ========================================================================

    fn run_all(&mut self) -> Result<(), String> {
        self.run_step("sessions", |s| s.step_sessions())?;
        self.run_step("focus", |s| s.step_focus())?;
        self.run_step("commit", |s| s.step_commit())?;
        self.run_step("stale_commit", |s| s.step_stale_commit())?;
        self.run_step("navigation", |s| s.step_navigation())?;
        self.run_step("lock", |s| s.step_lock())?;
        self.run_step("range", |s| s.step_range())?;
        self.run_step("non_table", |s| s.step_non_table())?;
        self.run_step("eviction", |s| s.step_eviction())?;
        self.run_step("shutdown", |s| s.step_shutdown())?;
        Ok(())
    }

    fn event_tally(&self) -> EventTally {
        let (selection, focus, blur, context, navigation) = self.h.events().counts();
        EventTally {
            selection,
            focus,
            blur,
            context,
            navigation,
        }
    }
}

pub fn run(args: &SmokeArgs) -> ExitCode {
    let started_at = Utc::now().to_rfc3339();
    let mut runner = SmokeRunner::new(args);
    let passed = runner.run_all().is_ok();

    let tally = runner.event_tally();
    if runner.verbose {
        eprintln!(
            "[smoke] events: selection={} focus={} blur={} context={} navigation={}",
            tally.selection, tally.focus, tally.blur, tally.context, tally.navigation
        );
    }

    if args.json {
        let report = SmokeReport {
            started_at,
            max_sessions: args.max_sessions,
            steps: runner.steps,
            stats: runner.stats,
            events: tally,
            passed,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: failed to serialize smoke report: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else if passed {
        println!("All steps passed ({}).", runner.steps.len());
    }

    if passed {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
