//! Error propagation, traces, try/catch, checking, and script inclusion

use super::helpers::{interpreter, particle_host, run_on, run_script, script};
use crate::config::InterpreterSettings;
use crate::interpreter::host::{CompileFlags, Compiler};
use crate::interpreter::types::{CompiledScript, Value};
use crate::interpreter::vm::{Interpreter, RunOptions, RunStatus};
use crate::interpreter::{ErrorKind, FunctionRegistry, MemoryHost, ScriptResult};
use std::sync::Arc;

/// Compiles one statement per line with the test assembler
struct LineCompiler;

impl Compiler for LineCompiler {
    fn compile(&self, name: &str, text: &str, _flags: CompileFlags) -> ScriptResult<CompiledScript> {
        let lines: Vec<&str> = text.lines().collect();
        Ok(script(name, &lines))
    }
}

#[test]
fn test_unrecognized_command_halts() {
    let (host, _, result) = run_script(&["foobar 1 2 3", "print \"after\""]);
    let err = result.unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnrecognizedCommand);
    assert_eq!(err.detail.as_deref(), Some("foobar"));
    assert!(host.output_lines().is_empty());
}

#[test]
fn test_trace_has_every_frame() {
    let (_, _, result) = run_script(&[
        "function f1()",
        "f2()",
        "end function",
        "function f2()",
        "f3()",
        "end function",
        "function f3()",
        "foobar",
        "end function",
        "f1()",
    ]);
    let err = result.unwrap_err();

    assert_eq!(err.trace.len(), 4);
    let functions: Vec<Option<&str>> = err.trace.iter().map(|f| f.function.as_deref()).collect();
    assert_eq!(functions, vec![Some("f3"), Some("f2"), Some("f1"), None]);

    let innermost = &err.trace[0];
    assert_eq!(innermost.line, 8);
    assert_eq!(innermost.text, "foobar");
    assert_eq!(err.trace[3].text, "f1()");
    assert_eq!(err.line(), Some(8));
}

#[test]
fn test_full_message_lists_frames() {
    let (_, _, result) = run_script(&["x = 1", "foobar"]);
    let err = result.unwrap_err();
    let message = err.full_message();

    assert!(message.starts_with(&err.message));
    assert!(message.contains("----line 2 command 2 of file test:"));
    assert!(message.ends_with("foobar"));
}

#[test]
fn test_message_localized_by_host() {
    let host = Arc::new(
        particle_host(1).with_translation("unrecognized command", "commande inconnue"),
    );
    let (_, _, result) = run_on(host, &["foobar"]);
    let err = result.unwrap_err();

    assert!(err.message.starts_with("commande inconnue"));
    assert!(err.untranslated.starts_with("unrecognized command"));
}

#[test]
fn test_too_many_script_levels() {
    let (_, interp, result) = run_script(&["function r()", "r()", "end function", "r()"]);

    assert_eq!(result.unwrap_err().kind, ErrorKind::TooManyScriptLevels);
    let stats = interp.stack_stats();
    assert_eq!(stats.pops, stats.pushes);
    assert_eq!(stats.max_frames, InterpreterSettings::default().max_script_levels);
}

#[test]
fn test_undefined_substitution() {
    let (_, _, result) = run_script(&["print @missing"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_integer_division_by_zero() {
    let (_, _, result) = run_script(&["x = 7 \\ 0"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidArgument);
}

/* ===================== Try / Catch ===================== */

#[test]
fn test_catch_receives_message() {
    let (host, _, result) = run_script(&[
        "try",
        "foobar",
        "print \"skipped\"",
        "end try",
        "catch (e)",
        "print \"caught: \" + e",
        "end catch",
        "print \"after\"",
    ]);
    let report = result.unwrap();

    assert_eq!(host.output_lines(), vec!["caught: unrecognized command: foobar", "after"]);
    assert!(report.bindings.get("e").is_none());
}

#[test]
fn test_catch_skipped_on_success() {
    let (host, _, result) = run_script(&[
        "try",
        "print \"ok\"",
        "end try",
        "catch (e)",
        "print \"caught\"",
        "end catch",
        "print \"after\"",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["ok", "after"]);
}

#[test]
fn test_try_without_catch_continues() {
    let (host, _, result) = run_script(&["try", "foobar", "end try", "print \"after\""]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["after"]);
}

#[test]
fn test_return_inside_try() {
    let (host, _, result) = run_script(&[
        "function f()",
        "try",
        "return 5",
        "end try",
        "return 0",
        "end function",
        "print f()",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["5"]);
}

#[test]
fn test_break_inside_try_leaves_loop() {
    let (host, _, result) = run_script(&[
        "for (i = 1; i <= 5; i = i + 1)",
        "try",
        "if (i == 2)",
        "break",
        "endif",
        "end try",
        "end for",
        "print i",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["2"]);
}

/* ===================== Check Mode ===================== */

#[test]
fn test_check_has_no_side_effects() {
    let host = Arc::new(particle_host(5));
    let mut interp = interpreter(&host);
    let report = interp
        .check(script(
            "t",
            &[
                "x = 1",
                "if (x > 0)",
                "print \"positive\"",
                "else",
                "print \"negative\"",
                "endif",
                "select (.id < 3)",
                "function f(n)",
                "return n + 1",
                "end function",
                "print f(2)",
            ],
        ))
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(host.output_lines().is_empty());
    assert!(host.selection().is_none());
    assert!(host.status_messages().is_empty());
    assert!(interp.history().is_empty());
}

#[test]
fn test_check_finds_unknown_label() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    let err = interp.check(script("t", &["print 1", "goto nowhere"])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_check_finds_missing_end() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    let err = interp.check(script("t", &["while (true)", "print 1"])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingEnd);
}

/* ===================== Script Inclusion ===================== */

fn include_host() -> Arc<MemoryHost> {
    Arc::new(
        particle_host(2)
            .with_script("inc", "print \"included\"\nlocal = 7")
            .with_script("loop", "script \"loop\""),
    )
}

fn include_interpreter(host: &Arc<MemoryHost>) -> Interpreter {
    Interpreter::builder(host.clone())
        .functions(Arc::new(FunctionRegistry::new()))
        .compiler(Arc::new(LineCompiler))
        .build()
}

#[test]
fn test_include_script() {
    let host = include_host();
    let mut interp = include_interpreter(&host);
    let report = interp
        .run(script("main", &["script \"inc\"", "print \"back\""]), RunOptions::default())
        .unwrap();

    assert_eq!(host.output_lines(), vec!["included", "back"]);
    // the included script's own variables went with its frame
    assert!(report.bindings.get("local").is_none());
}

#[test]
fn test_include_missing_file() {
    let host = include_host();
    let mut interp = include_interpreter(&host);
    let err = interp
        .run(script("main", &["script \"absent\""]), RunOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::FileNotFound);
}

#[test]
fn test_include_recursion_hits_level_limit() {
    let host = include_host();
    let mut interp = include_interpreter(&host);
    let err = interp
        .run(script("main", &["script \"loop\""]), RunOptions::default())
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::TooManyScriptLevels);
    assert_eq!(err.trace.len(), InterpreterSettings::default().max_script_levels);
}

#[test]
fn test_include_without_compiler() {
    let host = include_host();
    let mut interp = interpreter(&host);
    let err = interp
        .run(script("main", &["script \"inc\""]), RunOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Evaluation);
}

#[test]
fn test_value_of_caught_error_is_string() {
    let (_, _, result) = run_script(&[
        "msg = \"\"",
        "try",
        "x = 1 \\ 0",
        "end try",
        "catch (e)",
        "msg = e",
        "end catch",
    ]);
    let report = result.unwrap();
    let Some(Value::Str(msg)) = report.bindings.get("msg") else {
        unreachable!("msg should hold the error text")
    };
    assert!(msg.contains("division by zero"));
}
