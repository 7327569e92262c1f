//! Working-directory scoping. Kept in its own test binary because the
//! working directory is process-wide.

use std::sync::Mutex;

use script_runtime::*;
use shape_kernel::{shared, MockKernel};

static CWD: Mutex<()> = Mutex::new(());

#[test]
fn working_directory_is_restored_on_success_and_failure() {
    let _cwd = CWD.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("part.cad");
    let before = std::env::current_dir().unwrap();
    let options = RunOptions {
        isolation: IsolationOptions {
            change_working_dir: true,
            script_path: Some(script),
            ..Default::default()
        },
        ..Default::default()
    };

    for source in ["a = 1\n", "a = 1 / 0\n"] {
        let execution = execute_source(
            source,
            &options,
            shared(MockKernel::new()),
            ModuleRegistry::default().shared(),
            Box::new(|_| {}),
        )
        .unwrap();
        assert_ne!(execution.report.status, RunStatus::Cancelled);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

#[test]
fn working_directory_is_restored_after_cancel() {
    let _cwd = CWD.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let before = std::env::current_dir().unwrap();
    let options = RunOptions {
        isolation: IsolationOptions {
            change_working_dir: true,
            script_path: Some(dir.path().join("part.cad")),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = DebugSession::start(
        script_lang::compile("a = 1\nb = 2\n").unwrap(),
        options,
        Default::default(),
        DebugMode::Step,
        shared(MockKernel::new()),
        ModuleRegistry::default().shared(),
    )
    .unwrap();

    loop {
        match session.next_event().unwrap() {
            DebugEvent::Paused(_) => {
                session.cancel().unwrap();
            }
            DebugEvent::Ended(report) => {
                assert_eq!(report.status, RunStatus::Cancelled);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(std::env::current_dir().unwrap(), before);
}
