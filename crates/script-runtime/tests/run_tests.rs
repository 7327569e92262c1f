use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use cad_types::{DisplayOptions, ShapeKind};
use script_runtime::*;
use shape_kernel::{shared, MockKernel};

struct Outcome {
    report: RunReport,
    log: Vec<String>,
}

fn run_with(source: &str, options: &RunOptions, modules: SharedModules) -> Outcome {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let execution = execute_source(
        source,
        options,
        shared(MockKernel::new()),
        modules,
        Box::new(move |line| sink.borrow_mut().push(line.to_string())),
    )
    .unwrap();
    let log = log.borrow().clone();
    Outcome {
        report: execution.report,
        log,
    }
}

fn run(source: &str) -> Outcome {
    run_with(source, &RunOptions::default(), ModuleRegistry::default().shared())
}

fn runtime_error(outcome: &Outcome) -> &ScriptError {
    match &outcome.report.status {
        RunStatus::Failed(RunFailure::Runtime(e)) => e,
        other => panic!("expected a runtime failure, got {other:?}"),
    }
}

fn write_module(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(format!("{name}.{MODULE_EXTENSION}")), body).unwrap();
}

#[test]
fn functions_loops_and_containers() {
    let out = run("\
def area(w, h=2):
    return w * h
total = 0
for i in range(4):
    if i == 2:
        continue
    total += area(i)
items = [1, 2]
items.append(3)
d = {'a': 1}
d['b'] = 2
label = 'x' + str(total)
log(total, len(items), d.get('b'), d.get('z', 9), label)
");
    assert_eq!(out.report.status, RunStatus::Finished);
    assert_eq!(out.log, vec!["8 3 2 9 x8".to_string()]);
    let total = out
        .report
        .variables
        .iter()
        .find(|v| v.name == "total")
        .unwrap();
    assert_eq!(total.value, "8");
    assert_eq!(total.type_name, "int");
}

#[test]
fn while_break_and_chained_comparisons() {
    let out = run("\
n = 0
while True:
    n += 1
    if n >= 5:
        break
print(0 < n <= 5, n in [5, 6], 'a' not in 'xyz')
");
    assert_eq!(out.log, vec!["True True True".to_string()]);
}

#[test]
fn errors_are_caught_by_kind() {
    let out = run("\
caught = []
try:
    x = 1 / 0
except KeyError:
    caught.append('key')
except ZeroDivisionError as e:
    caught.append(e.message)
try:
    raise ValueError('bad')
except Exception as e:
    caught.append(e.kind)
finally:
    caught.append('done')
print(caught)
");
    assert_eq!(
        out.log,
        vec!["['division by zero', 'ValueError', 'done']".to_string()]
    );
}

#[test]
fn uncaught_errors_carry_the_call_chain() {
    let source = "\
def inner():
    raise ValueError('bad input')
def outer():
    inner()
outer()
";
    let out = run(source);
    let err = runtime_error(&out);
    assert_eq!(err.kind, ErrorKind::ValueError);
    let functions: Vec<_> = err.frames.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(functions, vec!["<module>", "outer", "inner"]);

    let failure = out.report.status.failure().unwrap();
    let trace = report(failure, source);
    let lines: Vec<_> = trace.frames.iter().map(|f| f.line).collect();
    assert_eq!(lines, vec![5, 4, 2]);
    assert_eq!(trace.frames[2].code, "raise ValueError('bad input')");
    assert_eq!(trace.failing_line(), Some(2));
}

#[test]
fn module_frames_are_hidden_from_the_trace() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "helpers",
        "WIDTH = 4\ndef fail():\n    raise KeyError('nope')\n",
    );
    let modules = ModuleRegistry::new([dir.path().to_path_buf()]).shared();
    let source = "\
import helpers
from helpers import WIDTH
import math
w = WIDTH * 2
r = math.sqrt(16)
helpers.fail()
";
    let out = run_with(source, &RunOptions::default(), modules);
    let err = runtime_error(&out);
    assert_eq!(err.kind, ErrorKind::KeyError);
    assert_eq!(err.frames.len(), 2);

    let trace = report(out.report.status.failure().unwrap(), source);
    assert_eq!(trace.frames.len(), 1);
    assert_eq!(trace.frames[0].line, 6);

    let r = out.report.variables.iter().find(|v| v.name == "r").unwrap();
    assert_eq!(r.value, "4.0");
}

#[test]
fn missing_modules_are_import_errors() {
    let out = run("import nowhere\n");
    assert_eq!(runtime_error(&out).kind, ErrorKind::ImportError);
}

#[test]
fn reload_policy_picks_up_edited_modules() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "params", "SIZE = 1\n");
    let modules = ModuleRegistry::new([dir.path().to_path_buf()]).shared();
    let source = "from params import SIZE\nlog(SIZE)\n";

    let cached = RunOptions::default();
    assert_eq!(run_with(source, &cached, modules.clone()).log, vec!["1"]);
    write_module(dir.path(), "params", "SIZE = 2\n");
    assert_eq!(run_with(source, &cached, modules.clone()).log, vec!["1"]);
    assert!(modules.lock().is_loaded("params"));

    // Drop the stale copy, then run twice with the reload policy on.
    modules.lock().evict("params");
    let reloading = RunOptions {
        isolation: IsolationOptions {
            reload_imported_modules: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(run_with(source, &reloading, modules.clone()).log, vec!["2"]);
    write_module(dir.path(), "params", "SIZE = 3\n");
    assert_eq!(run_with(source, &reloading, modules.clone()).log, vec!["3"]);
    assert!(!modules.lock().is_loaded("params"));
}

#[test]
fn script_directory_is_importable_only_during_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "sibling", "VALUE = 5\n");
    let script = dir.path().join("main.cad");
    let modules = ModuleRegistry::default().shared();
    let source = "import sibling\nlog(sibling.VALUE)\n";

    let without = RunOptions {
        isolation: IsolationOptions {
            script_path: Some(script.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    let out = run_with(source, &without, modules.clone());
    assert_eq!(runtime_error(&out).kind, ErrorKind::ImportError);

    let with = RunOptions {
        isolation: IsolationOptions {
            add_script_dir_to_path: true,
            script_path: Some(script),
            ..Default::default()
        },
        ..Default::default()
    };
    let out = run_with(source, &with, modules.clone());
    assert_eq!(out.log, vec!["5"]);
    assert!(modules.lock().search_paths().is_empty());
}

#[test]
fn runaway_recursion_is_a_runtime_error() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let out = run("def f(n):\n    return f(n + 1)\nf(0)\n");
            let err = runtime_error(&out).clone();
            (err.kind, err.message, err.frames.len())
        })
        .unwrap();
    let (kind, message, depth) = handle.join().unwrap();
    assert_eq!(kind, ErrorKind::RuntimeError);
    assert!(message.contains("maximum recursion depth"));
    assert_eq!(depth, MAX_CALL_DEPTH);
}

#[test]
fn anonymous_publications_are_named_after_their_binding() {
    let out = run("\
part = box(1, 1, 1)
alias = part
show_object(part)
show_object(box(2, 2, 2))
");
    let names: Vec<_> = out.report.publications.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["part", "obj_2"]);
}

#[test]
fn lists_are_published_as_one_compound() {
    let out = run("show_object([box(1, 1, 1), sphere(1)], name='group')\n");
    assert_eq!(out.report.publications.len(), 1);
    assert_eq!(out.report.publications[0].shape.kind, ShapeKind::Compound);
}

#[test]
fn display_options_and_debug_flagging() {
    let out = run("\
show_object(box(1, 1, 1), name='tinted', options={'color': 'blue', 'alpha': 0.5})
debug(box(1, 1, 1), name='probe')
");
    let tinted = &out.report.publications[0];
    assert!(tinted.options.color.is_some());
    assert_eq!(tinted.options.alpha, Some(0.5));
    assert_eq!(out.report.publications[1].options, DisplayOptions::flagged());
}

#[test]
fn invalid_options_fail_inside_the_script() {
    let out = run("show_object(box(1, 1, 1), options={'alpha': 3})\n");
    assert_eq!(runtime_error(&out).kind, ErrorKind::ValueError);
}

#[test]
fn kernel_failures_surface_as_kernel_errors() {
    let out = run("b = box(-1, 1, 1)\n");
    assert_eq!(runtime_error(&out).kind, ErrorKind::KernelError);

    let out = run("\
try:
    b = box(-1, 1, 1)
except KernelError:
    b = box(1, 1, 1)
");
    assert_eq!(out.report.status, RunStatus::Finished);
    assert_eq!(out.report.publications.len(), 1);
}

#[test]
fn publishable_kinds_control_discovery() {
    let source = "tip = point(0, 0, 0)\nbody = box(1, 1, 1)\n";
    assert_eq!(run(source).report.publications.len(), 1);

    let options = RunOptions {
        publishable_kinds: cad_types::PublishableKinds::new([ShapeKind::Vertex]),
        ..Default::default()
    };
    let out = run_with(source, &options, ModuleRegistry::default().shared());
    assert_eq!(out.report.publications[0].name, "tip");
}

#[test]
fn math_module_trigonometry() {
    let execution = execute_source(
        "import math\ns = math.sin(math.radians(30))\na = math.degrees(math.atan2(1, 1))\n",
        &RunOptions::default(),
        shared(MockKernel::new()),
        ModuleRegistry::default().shared(),
        Box::new(|_| {}),
    )
    .unwrap();
    let float = |name: &str| match execution.bindings.get(name) {
        Some(Value::Float(x)) => *x,
        other => panic!("{name} is {other:?}"),
    };
    approx::assert_relative_eq!(float("s"), 0.5, epsilon = 1e-12);
    approx::assert_relative_eq!(float("a"), 45.0, epsilon = 1e-9);
}
