//! Assertion helpers with diagnostic output.
//!
//! Every failure names the context and includes the current scene report.

use crate::helpers::HarnessError;
use crate::report::SceneReport;
use crate::workflow::ScriptSession;

/// Assert the persistent tree holds exactly `expected`, in order.
pub fn assert_tree_names(
    session: &ScriptSession,
    expected: &[&str],
    ctx: &str,
) -> Result<(), HarnessError> {
    let actual = session.tree_names();
    if actual == expected {
        return Ok(());
    }
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] expected tree {:?}, got {:?}\n{}",
            ctx,
            expected,
            actual,
            SceneReport::capture(session)
        ),
    })
}

/// Assert the viewer call counts since the last reset.
pub fn assert_viewer_counts(
    session: &ScriptSession,
    displays: usize,
    removes: usize,
    fits: usize,
    ctx: &str,
) -> Result<(), HarnessError> {
    let viewer = session.viewer();
    let actual = (
        viewer.display_count(),
        viewer.remove_count(),
        viewer.fit_count(),
    );
    if actual == (displays, removes, fits) {
        return Ok(());
    }
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] expected display={} remove={} auto_fit={}, got display={} remove={} auto_fit={}\ncalls: {:?}",
            ctx, displays, removes, fits, actual.0, actual.1, actual.2,
            viewer.calls()
        ),
    })
}

/// Assert every visible tree entry is on screen and nothing else is.
pub fn assert_viewer_in_sync(session: &ScriptSession, ctx: &str) -> Result<(), HarnessError> {
    let reconciler = session.reconciler();
    let mut expected: Vec<String> = reconciler
        .tree()
        .entries()
        .chain(reconciler.ephemeral().entries())
        .filter(|e| e.visible)
        .map(|e| e.name.clone())
        .collect();
    expected.sort();
    let shown = session.viewer().shown_names();
    if shown == expected {
        return Ok(());
    }
    Err(HarnessError::AssertionFailed {
        detail: format!("[{}] viewer shows {:?}, tree has {:?}", ctx, shown, expected),
    })
}

pub fn assert_paused_at(session: &ScriptSession, line: u32, ctx: &str) -> Result<(), HarnessError> {
    let actual = session.paused_line()?;
    if actual == line {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected pause at line {}, got {}", ctx, line, actual),
        })
    }
}
