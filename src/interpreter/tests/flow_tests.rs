//! Branches, loops, and goto

use super::helpers::{particle_host, run_script, script};
use crate::config::InterpreterSettings;
use crate::interpreter::types::Value;
use crate::interpreter::vm::{Interpreter, RunOptions};
use crate::interpreter::{ErrorKind, FunctionRegistry, RunReport, RunStatus, ScriptResult};
use std::sync::Arc;

fn run_with_goto_strict(strict: bool, lines: &[&str]) -> (Vec<String>, ScriptResult<RunReport>) {
    let host = Arc::new(particle_host(1));
    let settings = InterpreterSettings {
        goto_strict: strict,
        ..Default::default()
    };
    let mut interp = Interpreter::builder(host.clone())
        .functions(Arc::new(FunctionRegistry::new()))
        .settings(settings)
        .build();
    let result = interp.run(script("goto", lines), RunOptions::default());
    (host.output_lines(), result)
}

#[test]
fn test_if_else_takes_true_branch() {
    let (_, _, result) = run_script(&["if (1 < 2)", "a = 1", "else", "a = 2", "endif"]);
    assert_eq!(result.unwrap().bindings.get("a"), Some(&Value::Int(1)));
}

#[test]
fn test_if_else_takes_false_branch() {
    let (_, _, result) = run_script(&["if (1 > 2)", "a = 1", "else", "a = 2", "end if"]);
    assert_eq!(result.unwrap().bindings.get("a"), Some(&Value::Int(2)));
}

#[test]
fn test_elseif_chain() {
    let lines = |x: &'static str| {
        vec![
            x,
            "if (x < 3)",
            "print \"small\"",
            "elseif (x < 10)",
            "print \"medium\"",
            "else",
            "print \"large\"",
            "endif",
        ]
    };
    for (init, expected) in [("x = 1", "small"), ("x = 5", "medium"), ("x = 50", "large")] {
        let (host, _, result) = run_script(&lines(init));
        result.unwrap();
        assert_eq!(host.output_lines(), vec![expected], "{}", init);
    }
}

#[test]
fn test_if_inside_loop_reevaluates() {
    let (host, _, result) = run_script(&[
        "for (i = 1; i <= 3; i = i + 1)",
        "if (i == 2)",
        "print \"two\"",
        "else",
        "print i",
        "endif",
        "end for",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["1", "two", "3"]);
}

#[test]
fn test_for_loop_runs_five_times() {
    let (_, _, result) = run_script(&[
        "count = 0",
        "for (i = 0; i < 5; i = i + 1)",
        "count = count + 1",
        "end for",
    ]);
    let report = result.unwrap();

    assert_eq!(report.bindings.get("count"), Some(&Value::Int(5)));
    assert_eq!(report.bindings.get("i"), Some(&Value::Int(5)));
}

#[test]
fn test_for_var_is_local_to_loop() {
    let (_, _, result) = run_script(&[
        "n = 0",
        "for (var k = 0; k < 3; k = k + 1)",
        "n = n + k",
        "end for",
    ]);
    let report = result.unwrap();

    assert_eq!(report.bindings.get("n"), Some(&Value::Int(3)));
    assert!(report.bindings.get("k").is_none());
}

#[test]
fn test_for_in_list() {
    let (_, _, result) = run_script(&["sum = 0", "for (v in [1, 2, 3])", "sum = sum + v", "end for"]);
    assert_eq!(result.unwrap().bindings.get("sum"), Some(&Value::Int(6)));
}

#[test]
fn test_for_in_set_visits_members() {
    let (_, _, result) = run_script(&[
        "n = 0",
        "for (var a in (.elem == \"C\"))",
        "n = n + a.size",
        "end for",
    ]);
    assert_eq!(result.unwrap().bindings.get("n"), Some(&Value::Int(5)));
}

#[test]
fn test_while_loop() {
    let (host, _, result) = run_script(&["k = 0", "while (k < 3)", "k = k + 1", "end while", "print k"]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["3"]);
}

#[test]
fn test_break_leaves_loop() {
    let (host, _, result) = run_script(&[
        "for (i = 1; i <= 10; i = i + 1)",
        "if (i == 3)",
        "break",
        "endif",
        "end for",
        "print i",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["3"]);
}

#[test]
fn test_break_two_levels() {
    let (host, _, result) = run_script(&[
        "for (i = 1; i <= 3; i = i + 1)",
        "for (j = 1; j <= 3; j = j + 1)",
        "if (j == 2)",
        "break 2",
        "endif",
        "end for",
        "end for",
        "print \"\" + i + \",\" + j",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["1,2"]);
}

#[test]
fn test_continue_skips_rest_of_body() {
    let (host, _, result) = run_script(&[
        "n = 0",
        "for (i = 1; i <= 5; i = i + 1)",
        "if (i % 2 == 0)",
        "continue",
        "endif",
        "n = n + i",
        "end for",
        "print n",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["9"]);
}

#[test]
fn test_continue_inside_try_goes_to_loop_head() {
    let (host, _, result) = run_script(&[
        "for (i = 0; i < 3; i = i + 1)",
        "try",
        "continue",
        "end try",
        "print \"after try \" + i",
        "end for",
    ]);
    let report = result.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(host.output_lines().is_empty());
    assert_eq!(report.bindings.get("i"), Some(&Value::Int(3)));
}

#[test]
fn test_break_inside_try_leaves_loop() {
    let (host, _, result) = run_script(&[
        "for (i = 0; i < 3; i = i + 1)",
        "try",
        "break",
        "end try",
        "print \"after try \" + i",
        "end for",
        "print i",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["0"]);
}

#[test]
fn test_continue_two_levels_through_try() {
    let (host, _, result) = run_script(&[
        "n = 0",
        "for (i = 1; i <= 3; i = i + 1)",
        "for (j = 1; j <= 3; j = j + 1)",
        "try",
        "if (j == 2)",
        "continue 2",
        "endif",
        "end try",
        "n = n + 1",
        "end for",
        "end for",
        "print n",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["3"]);
}

#[test]
fn test_break_two_levels_through_try() {
    let (host, _, result) = run_script(&[
        "for (i = 1; i <= 3; i = i + 1)",
        "for (j = 1; j <= 3; j = j + 1)",
        "try",
        "if (j == 2)",
        "break 2",
        "endif",
        "end try",
        "end for",
        "end for",
        "print \"\" + i + \",\" + j",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["1,2"]);
}

#[test]
fn test_continue_in_try_without_loop_is_bad_context() {
    let (host, _, result) = run_script(&["try", "continue", "end try", "print \"after\""]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::BadContext);
    assert!(host.output_lines().is_empty());
}

#[test]
fn test_break_outside_loop_is_bad_context() {
    let (_, _, result) = run_script(&["break"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::BadContext);
}

#[test]
fn test_goto_out_of_block_rejected() {
    let (output, result) = run_with_goto_strict(
        false,
        &["n = 1", "if (n < 3)", "goto skip", "endif", "label skip", "print n"],
    );
    assert_eq!(result.unwrap_err().kind, ErrorKind::BadContext);
    assert!(output.is_empty());
}

#[test]
fn test_goto_forward_skips_statements() {
    let (output, result) = run_with_goto_strict(true, &["print 1", "goto done", "print 2", "label done", "print 3"]);
    result.unwrap();
    assert_eq!(output, vec!["1", "3"]);
}

#[test]
fn test_goto_backward_loop() {
    for strict in [false, true] {
        let (output, result) = run_with_goto_strict(
            strict,
            &["n = 0", "label again", "n = n + 1", "print n", "if (n == 3)", "exit", "endif", "goto again"],
        );
        assert_eq!(result.unwrap().status, RunStatus::Exited);
        assert_eq!(output, vec!["1", "2", "3"]);
    }
}

#[test]
fn test_goto_unknown_label() {
    let (_, result) = run_with_goto_strict(false, &["goto nowhere"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidArgument);
}

const SIBLING_GOTO: &[&str] = &[
    "for (i = 0; i < 1; i = i + 1)",
    "goto inner",
    "end for",
    "for (j = 0; j < 1; j = j + 1)",
    "label inner",
    "print \"in second\"",
    "end for",
];

#[test]
fn test_goto_between_sibling_blocks_lenient() {
    let (output, result) = run_with_goto_strict(false, SIBLING_GOTO);
    result.unwrap();
    assert_eq!(output.first().map(String::as_str), Some("in second"));
}

#[test]
fn test_goto_between_sibling_blocks_strict() {
    let (output, result) = run_with_goto_strict(true, SIBLING_GOTO);
    assert_eq!(result.unwrap_err().kind, ErrorKind::BadContext);
    assert!(output.is_empty());
}

#[test]
fn test_missing_end_fails_at_load() {
    let (host, _, result) = run_script(&["print \"never\"", "for (i = 0; i < 2; i = i + 1)", "print i"]);

    assert_eq!(result.unwrap_err().kind, ErrorKind::MissingEnd);
    assert!(host.output_lines().is_empty());
}

#[test]
fn test_exit_stops_run() {
    let (host, _, result) = run_script(&["print \"a\"", "exit", "print \"b\""]);
    let report = result.unwrap();

    assert_eq!(report.status, RunStatus::Exited);
    assert_eq!(host.output_lines(), vec!["a"]);
}
