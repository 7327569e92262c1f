//! End-to-end scenarios over the real dispatch path with the mock kernel.
//!
//! Each scenario drives a [`ScriptSession`] the way the editor UI would and
//! checks the model tree, the debug pauses and the viewer traffic.

use script_runtime::DebugMode;
use shape_kernel::{Bounds, Kernel};
use test_harness::assertions::*;
use test_harness::helpers::*;
use test_harness::{ScriptSession, ViewerCall};

fn tree_content(s: &ScriptSession) -> Vec<(String, Option<Bounds>)> {
    let kernel = s.kernel().lock();
    s.reconciler()
        .tree()
        .entries()
        .map(|e| (e.name.clone(), Kernel::bounds(&*kernel, &e.shape)))
        .collect()
}

// ── Scenario 1: Re-running is idempotent ────────────────────────────────

#[test]
fn rerun_without_preservation_is_idempotent() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "base = box(4, 4, 1)",
        "post = cylinder(0.5, 3).translate(2, 2, 1)",
        "part = base.union(post)",
    ]));

    s.run().unwrap();
    let first = tree_content(&s);
    let shown_first = s.viewer().shown_names().len();

    s.run().unwrap();
    assert_eq!(tree_content(&s), first);
    assert_eq!(s.viewer().shown_names().len(), shown_first);
    assert_tree_names(&s, &["base", "post", "part"], "after second run").unwrap();
    assert_viewer_in_sync(&s, "after second run").unwrap();
}

// ── Scenario 2: Properties survive a re-run ─────────────────────────────

#[test]
fn preserved_properties_survive_rerun() {
    let mut s = ScriptSession::preserving();
    s.source("part = box(2, 2, 2)\n");
    s.run().unwrap();
    s.set_visible("part", false).unwrap();
    s.engine_mut().set_alpha("part", 0.5).unwrap();

    s.run().unwrap();

    let part = s.entry("part").unwrap();
    assert!(!part.visible);
    assert_eq!(part.transparency, 0.5);
    assert!(s.viewer().shown_names().is_empty());
}

#[test]
fn without_preservation_properties_reset() {
    let mut s = ScriptSession::new();
    s.source("part = box(2, 2, 2)\n");
    s.run().unwrap();
    s.set_visible("part", false).unwrap();

    s.run().unwrap();
    assert!(s.entry("part").unwrap().visible);
}

// ── Scenario 3: Empty results are never shown ───────────────────────────

#[test]
fn empty_results_produce_no_entries() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "a = box(1, 1, 1)",
        "b = box(1, 1, 1).translate(5, 0, 0)",
        "show_object(a.intersect(b), name='overlap')",
    ]));
    s.run().unwrap();

    assert!(s.tree_names().is_empty());
    assert_viewer_counts(&s, 0, 0, 0, "empty run").unwrap();
}

// ── Scenario 4: Explicit publication beats discovery ────────────────────

#[test]
fn explicit_publication_overrides_discovery() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "a = box(1, 1, 1)",
        "b = box(2, 2, 2)",
        "c = sphere(1)",
        "show_object(b)",
    ]));
    s.run().unwrap();
    assert_tree_names(&s, &["b"], "explicit only").unwrap();
}

#[test]
fn last_publish_wins_for_a_name() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "show_object(box(1, 1, 1), name='x')",
        "show_object(sphere(2), name='y')",
        "show_object(box(3, 3, 3), name='x')",
    ]));
    s.run().unwrap();
    assert_tree_names(&s, &["x", "y"], "overwrite").unwrap();
    let kernel = s.kernel().lock();
    let x = s.entry("x").unwrap();
    assert_eq!(Kernel::bounds(&*kernel, &x.shape).unwrap().max, [3.0, 3.0, 3.0]);
}

// ── Scenario 5: Step discipline ─────────────────────────────────────────

#[test]
fn three_steps_for_three_statements() {
    let mut s = ScriptSession::new();
    s.source(&script(&["a = 1", "b = 2", "c = 3"]));

    s.start_debug(DebugMode::Step).unwrap();
    assert_paused_at(&s, 1, "start").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 2, "step 1").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 3, "step 2").unwrap();
    s.step_over().unwrap();

    assert_eq!(session_end(s.last_events()), Some("finished"));
    assert_eq!(pause_count(s.history()), 3);
}

#[test]
fn continue_runs_to_the_end() {
    let mut s = ScriptSession::new();
    s.source(&script(&["a = 1", "b = 2", "c = 3"]));

    s.start_debug(DebugMode::Step).unwrap();
    s.continue_().unwrap();

    assert_eq!(pause_count(s.last_events()), 0);
    assert_eq!(session_end(s.last_events()), Some("finished"));
    assert!(!s.engine().is_debugging());
}

#[test]
fn step_in_enters_script_functions() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "def make(w):",
        "    b = box(w, 1, 1)",
        "    return b",
        "part = make(2)",
        "show_object(part, name='part')",
    ]));

    s.start_debug(DebugMode::Step).unwrap();
    assert_paused_at(&s, 1, "def").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 4, "call site").unwrap();
    s.step_in().unwrap();
    assert_paused_at(&s, 2, "inside make").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 3, "return").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 5, "back at module level").unwrap();
    s.continue_().unwrap();

    assert_eq!(session_end(s.last_events()), Some("finished"));
    assert_tree_names(&s, &["part"], "after debug run").unwrap();
}

#[test]
fn step_over_skips_function_bodies() {
    let mut s = ScriptSession::new();
    s.source(&script(&[
        "def make(w):",
        "    return box(w, 1, 1)",
        "part = make(2)",
        "done = True",
    ]));

    s.start_debug(DebugMode::Step).unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 3, "call site").unwrap();
    s.step_over().unwrap();
    assert_paused_at(&s, 4, "next statement").unwrap();
    s.stop_debug().unwrap();
}

// ── Scenario 6: Breakpoints beat continue ───────────────────────────────

#[test]
fn breakpoint_pauses_a_continue_session_once() {
    let mut s = ScriptSession::new();
    s.source(&script(&["a = 1", "b = 2", "c = 3", "d = 4", "e = 5"]))
        .breakpoint(3);

    s.start_debug(DebugMode::Continue).unwrap();
    assert_paused_at(&s, 3, "breakpoint").unwrap();
    s.continue_().unwrap();

    assert_eq!(pause_count(s.history()), 1);
    assert_eq!(session_end(s.last_events()), Some("finished"));
}

#[test]
fn breakpoint_inside_a_loop_fires_each_pass() {
    let mut s = ScriptSession::new();
    s.source(&script(&["total = 0", "for i in range(3):", "    total += i", "end = total"]))
        .breakpoint(3);

    s.start_debug(DebugMode::Continue).unwrap();
    for _ in 0..3 {
        assert_paused_at(&s, 3, "loop body").unwrap();
        s.continue_().unwrap();
    }
    assert_eq!(session_end(s.last_events()), Some("finished"));
}

// ── Scenario 7: End to end run ──────────────────────────────────────────

#[test]
fn end_to_end_run_and_rerun() {
    let mut s = ScriptSession::new();
    s.source("result = box(3, 3, 0.5)\nshow_object(result, name='x')");

    s.run().unwrap();
    assert_tree_names(&s, &["x"], "first run").unwrap();
    assert_viewer_counts(&s, 1, 0, 1, "first run").unwrap();

    s.reset_viewer();
    s.run().unwrap();
    assert_tree_names(&s, &["x"], "second run").unwrap();
    assert_viewer_counts(&s, 1, 1, 0, "second run").unwrap();
    assert!(matches!(s.viewer().calls()[0], ViewerCall::Remove { .. }));
    assert!(matches!(s.viewer().calls()[1], ViewerCall::Display { .. }));
}

// ── Scenario 8: Stash round trip ────────────────────────────────────────

#[test]
fn cancelled_debug_session_restores_the_tree() {
    let mut s = ScriptSession::new();
    s.source("a = box(1, 1, 1)\nb = sphere(1)\n");
    s.run().unwrap();
    s.engine_mut().set_alpha("a", 0.3).unwrap();
    let before = s.reconciler().tree().clone();
    s.reset_viewer();

    s.start_debug(DebugMode::Step).unwrap();
    assert!(s.viewer().shown_names().is_empty());
    s.stop_debug().unwrap();

    assert_eq!(session_end(s.last_events()), Some("cancelled"));
    assert_eq!(s.reconciler().tree(), &before);
    assert_viewer_counts(&s, 2, 2, 0, "hide and show").unwrap();
    let restored: Vec<_> = s
        .viewer()
        .calls()
        .iter()
        .filter_map(|c| match c {
            ViewerCall::Display { id, .. } => Some(*id),
            _ => None,
        })
        .collect();
    let original: Vec<_> = before.entries().map(|e| e.renderable).collect();
    assert_eq!(restored, original);
    assert_viewer_in_sync(&s, "after stop").unwrap();
}

#[test]
fn pause_shows_only_debug_shapes() {
    let mut s = ScriptSession::new();
    s.source("old = sphere(3)\n");
    s.run().unwrap();

    s.source(&script(&["a = box(1, 1, 1)", "b = box(2, 2, 2)", "c = 0"]));
    s.start_debug(DebugMode::Step).unwrap();
    s.step_over().unwrap();
    s.step_over().unwrap();

    assert_eq!(s.viewer().shown_names(), vec!["a", "b"]);
    assert_viewer_in_sync(&s, "paused").unwrap();

    s.continue_().unwrap();
    assert_tree_names(&s, &["a", "b"], "debug results replace the old run").unwrap();
    assert!(s.reconciler().ephemeral().is_empty());
    assert_viewer_in_sync(&s, "ended").unwrap();
}

#[test]
fn debug_run_without_shapes_keeps_the_restored_tree() {
    let mut s = ScriptSession::new();
    s.source("show_object(box(1, 1, 1), name='part')\n").run().unwrap();
    let before = s.reconciler().tree().clone();

    s.source("a = 1\nb = 2\n");
    s.start_debug(DebugMode::Continue).unwrap();

    assert_eq!(session_end(s.last_events()), Some("finished"));
    assert_eq!(s.reconciler().tree(), &before);
    assert_eq!(s.viewer().shown_names(), vec!["part"]);
    assert_viewer_in_sync(&s, "after a shapeless debug run").unwrap();
}

// ── Failures ────────────────────────────────────────────────────────────

#[test]
fn failure_in_debug_keeps_last_good_tree() {
    let mut s = ScriptSession::new();
    s.source("good = box(1, 1, 1)\n");
    s.run().unwrap();

    s.source(&script(&["def f(x):", "    return x / 0", "a = f(1)"]));
    s.start_debug(DebugMode::Continue).unwrap();

    assert_eq!(session_end(s.last_events()), Some("failed"));
    let trace = last_failure(s.last_events()).unwrap();
    assert_eq!(trace.summary.kind, "ZeroDivisionError");
    let lines: Vec<u32> = trace.frames.iter().map(|f| f.line).collect();
    assert_eq!(lines, vec![3, 2]);
    assert_tree_names(&s, &["good"], "stale geometry stays").unwrap();
}

#[test]
fn cancellation_runs_finally_blocks() {
    let mut s = ScriptSession::new();
    s.source(&script(&["try:", "    a = 1", "    b = 2", "finally:", "    log('cleanup')"]));

    s.start_debug(DebugMode::Step).unwrap();
    s.step_over().unwrap();
    s.stop_debug().unwrap();

    assert_eq!(log_lines(s.last_events()), vec!["cleanup"]);
    assert_eq!(session_end(s.last_events()), Some("cancelled"));
}

// ── Modules ─────────────────────────────────────────────────────────────

#[test]
fn edited_helper_module_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let helper = dir.path().join("helper.cad");
    std::fs::write(&helper, "def make():\n    return box(1, 1, 1)\n").unwrap();

    let mut s = ScriptSession::new();
    s.source("import helper\nshow_object(helper.make(), name='h')\n")
        .saved_at(dir.path().join("main.cad"));
    s.run().unwrap();
    let first = tree_content(&s);

    std::fs::write(&helper, "def make():\n    return box(2, 2, 2)\n").unwrap();
    s.run().unwrap();
    let second = tree_content(&s);

    assert_eq!(first[0].1.unwrap().max, [1.0, 1.0, 1.0]);
    assert_eq!(second[0].1.unwrap().max, [2.0, 2.0, 2.0]);
    assert!(!s.engine().modules().lock().is_loaded("helper"));
}

// ── Console ─────────────────────────────────────────────────────────────

#[test]
fn console_publishes_into_the_tree() {
    let mut s = ScriptSession::new();
    s.source("base = box(2, 2, 2)\n");
    s.run().unwrap();

    s.console("extra = base.translate(0, 0, 5)").unwrap();
    s.console("show_object(extra)").unwrap();

    assert_tree_names(&s, &["base", "extra"], "console publish").unwrap();
    assert_viewer_in_sync(&s, "console publish").unwrap();
}
