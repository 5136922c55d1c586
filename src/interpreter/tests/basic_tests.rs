//! Assignment, output, selection, and run bookkeeping

use super::helpers::{interpreter, particle_host, run_on, run_script, script};
use crate::config::InterpreterSettings;
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::Value;
use crate::interpreter::vm::{Interpreter, RunOptions, RunStatus};
use crate::interpreter::{CommandRegistry, ErrorKind, FunctionRegistry, MemoryHost, ScriptError};
use std::sync::Arc;

#[test]
fn test_assignment_precedence() {
    let (_, _, result) = run_script(&["x = 2 + 3 * 4"]);
    let report = result.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.bindings.get("x"), Some(&Value::Int(14)));
}

#[test]
fn test_select_by_property() {
    let (host, _, result) = run_script(&["select (.id < 5)"]);
    result.unwrap();

    let selected = host.selection().unwrap();
    assert_eq!(selected.indices().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_eq!(selected.flavor(), SetFlavor::Particle);
}

#[test]
fn test_select_nothing_selects_all() {
    let (host, _, result) = run_script(&["select"]);
    result.unwrap();

    assert_eq!(host.selection().unwrap().count(), 10);
}

#[test]
fn test_define_named_set() {
    let (host, _, result) = run_script(&[
        "define oxygens (.elem == \"O\")",
        "n = oxygens.size",
        "select oxygens",
    ]);
    let report = result.unwrap();

    assert_eq!(report.bindings.get("n"), Some(&Value::Int(5)));
    assert_eq!(host.selection().unwrap().indices().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
}

#[test]
fn test_set_and_var_forms() {
    let (_, _, result) = run_script(&["set a = 1", "set b 2", "var c = a + b, d"]);
    let report = result.unwrap();

    assert_eq!(report.bindings.get("a"), Some(&Value::Int(1)));
    assert_eq!(report.bindings.get("b"), Some(&Value::Int(2)));
    assert_eq!(report.bindings.get("c"), Some(&Value::Int(3)));
    assert_eq!(report.bindings.get("d"), Some(&Value::empty()));
}

#[test]
fn test_print_and_echo() {
    let (host, _, result) = run_script(&["print 1 + 1", "echo hello \"big\" world"]);
    result.unwrap();

    assert_eq!(host.output_lines(), vec!["2", "hello big world"]);
}

#[test]
fn test_index_assignment_grows_list() {
    let (_, _, result) = run_script(&["a = [1, 2]", "a[4] = 9", "first = a[1]", "last = a[0]"]);
    let report = result.unwrap();

    let Some(Value::List(items)) = report.bindings.get("a") else {
        unreachable!("a should be a list")
    };
    assert_eq!(items.len(), 4);
    assert_eq!(items[2], Value::empty());
    assert_eq!(report.bindings.get("first"), Some(&Value::Int(1)));
    assert_eq!(report.bindings.get("last"), Some(&Value::Int(9)));
}

#[test]
fn test_far_negative_index_reads_empty() {
    let (host, _, result) = run_script(&[
        "x = \"\"",
        "print x[-10000000000000000000000.0]",
        "a = []",
        "print a[-10000000000000000000000.0] + \"|\"",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["", "|"]);
}

#[test]
fn test_far_negative_index_assignment_rejected() {
    let (_, _, result) = run_script(&["a = []", "a[-10000000000000000000000.0] = 1"]);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_substitution() {
    let (host, _, result) = run_script(&["name = \"carbon\"", "print @name"]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["carbon"]);
}

#[test]
fn test_host_command_receives_arguments() {
    let host = Arc::new(particle_host(3));
    let mut commands = CommandRegistry::new();
    commands.register_fn("spin", |ctx| {
        let args = ctx.eval_args()?;
        ctx.print(&format!("spin {}", args.len()));
        Ok(())
    });
    let mut interp = Interpreter::builder(host.clone())
        .functions(Arc::new(FunctionRegistry::new()))
        .commands(commands)
        .build();

    interp
        .run(script("t", &["spin 1, 2, 3"]), RunOptions::default())
        .unwrap();
    assert_eq!(host.output_lines(), vec!["spin 3"]);
}

#[test]
fn test_capture_output() {
    let host = Arc::new(particle_host(3));
    let mut interp = interpreter(&host);
    let report = interp
        .run(
            script("t", &["print \"captured\""]),
            RunOptions {
                capture_output: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(report.output, vec!["captured"]);
    assert!(host.output_lines().is_empty());
}

#[test]
fn test_completion_marker_and_redraw() {
    let (host, _, result) = run_script(&["x = 1"]);
    result.unwrap();

    assert_eq!(host.status_messages(), vec!["Script completed"]);
    assert_eq!(host.redraw_counts(), (1, 1));
}

#[test]
fn test_redraw_released_on_error() {
    let (host, _, result) = run_script(&["foobar"]);
    assert!(result.is_err());
    assert_eq!(host.redraw_counts(), (1, 1));
    assert!(!host.status_messages().contains(&"Script completed".to_string()));
}

#[test]
fn test_echo_commands() {
    let host = Arc::new(particle_host(1));
    let settings = InterpreterSettings {
        echo_commands: true,
        ..Default::default()
    };
    let mut interp = Interpreter::builder(host.clone())
        .functions(Arc::new(FunctionRegistry::new()))
        .settings(settings)
        .build();
    interp.run(script("t", &["x = 1", "print x"]), RunOptions::default()).unwrap();

    assert_eq!(host.status_messages(), vec!["x = 1", "print x", "Script completed"]);
}

#[test]
fn test_history_records_statements() {
    let (_, interp, result) = run_script(&["x = 1", "print x", "print x"]);
    result.unwrap();

    let entries: Vec<&str> = interp.history().entries().collect();
    assert_eq!(entries, vec!["x = 1", "print x"]);
}

#[test]
fn test_history_skips_flow_statements() {
    let (_, interp, result) = run_script(&[
        "for (i = 1; i <= 3; i = i + 1)",
        "if (i > 1)",
        "y = 2",
        "endif",
        "end for",
        "function f()",
        "return 1",
        "end function",
        "print f()",
    ]);
    result.unwrap();

    let entries: Vec<&str> = interp.history().entries().collect();
    assert_eq!(entries, vec!["y = 2", "function f()", "print f()"]);
}

#[test]
fn test_history_can_be_disabled() {
    let host = Arc::new(MemoryHost::new());
    let settings = InterpreterSettings {
        history_enabled: false,
        ..Default::default()
    };
    let mut interp = Interpreter::builder(host).settings(settings).build();
    interp.run(script("t", &["x = 1"]), RunOptions::default()).unwrap();

    assert!(interp.history().is_empty());
}

#[test]
fn test_bindings_persist_between_runs() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    interp.run(script("first", &["shared = 41"]), RunOptions::default()).unwrap();
    interp.run(script("second", &["print shared + 1"]), RunOptions::default()).unwrap();

    assert_eq!(host.output_lines(), vec!["42"]);
}

#[test]
fn test_runs_are_deterministic() {
    let lines = [
        "total = 0",
        "for (i = 1; i <= 4; i = i + 1)",
        "total = total + i * 1.5",
        "end for",
        "print total",
        "print (.id > 7)",
    ];
    let (host_a, _, a) = run_on(Arc::new(particle_host(10)), &lines);
    let (host_b, _, b) = run_on(Arc::new(particle_host(10)), &lines);

    assert_eq!(a.unwrap().bindings, b.unwrap().bindings);
    assert_eq!(host_a.output_lines(), host_b.output_lines());
}

#[test]
fn test_stack_discipline_nested_ifs() {
    let (host, interp, result) = run_script(&[
        "if (true)",
        "if (true)",
        "if (true)",
        "print \"deep\"",
        "endif",
        "endif",
        "endif",
    ]);
    result.unwrap();

    let stats = interp.stack_stats();
    assert_eq!(host.output_lines(), vec!["deep"]);
    assert_eq!(stats.pushes, 4);
    assert_eq!(stats.pops, stats.pushes);
}

#[test]
fn test_stack_discipline_on_error() {
    let (_, interp, result) = run_script(&["if (true)", "while (true)", "foobar", "end while", "endif"]);
    assert!(result.is_err());

    let stats = interp.stack_stats();
    assert_eq!(stats.pushes, 3);
    assert_eq!(stats.pops, stats.pushes);
}

#[test]
fn test_selection_laws() {
    let a = SelectionSet::from_indices(SetFlavor::Particle, 8, [0, 2, 5]);
    let b = SelectionSet::from_indices(SetFlavor::Particle, 8, [2, 3, 7]);

    assert_eq!(a.union(&b).unwrap(), b.union(&a).unwrap());
    assert_eq!(a.intersection(&a).unwrap(), a);
    assert_eq!(a.complement().complement(), a);
}

#[test]
fn test_numeric_round_trip() {
    let (_, _, result) = run_script(&[
        "a = 1234.5678",
        "b = 0.000321",
        "c = (a + b) - b",
        "i = 7",
        "j = (i + 3) - 3",
    ]);
    let report = result.unwrap();

    let Some(Value::Float(c)) = report.bindings.get("c") else {
        unreachable!("c should be a float")
    };
    assert!((c - 1234.5678).abs() < 1e-6);
    assert_eq!(report.bindings.get("j"), Some(&Value::Int(7)));
}

#[test]
fn test_error_reported_to_host() {
    let (host, _, result) = run_script(&["foobar 1 2 3"]);
    let err: ScriptError = result.unwrap_err();

    assert_eq!(host.reported_errors(), vec![err]);
}
