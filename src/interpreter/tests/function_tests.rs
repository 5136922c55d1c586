//! User-defined functions

use super::helpers::{particle_host, run_script, script};
use crate::interpreter::types::Value;
use crate::interpreter::vm::{Interpreter, RunOptions};
use crate::interpreter::{ErrorKind, FunctionRegistry, MemoryHost, RunStatus};
use std::sync::Arc;

#[test]
fn test_function_return_value() {
    let (host, _, result) = run_script(&["function f(n)", "return n * 2", "end function", "print f(21)"]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["42"]);
}

#[test]
fn test_function_called_as_statement() {
    let (host, _, result) = run_script(&[
        "function greet(who)",
        "print \"hello \" + who",
        "end function",
        "greet(\"world\")",
        "greet \"again\"",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["hello world", "hello again"]);
}

#[test]
fn test_missing_arguments_are_empty() {
    let (host, _, result) = run_script(&[
        "function f(a, b)",
        "print \"[\" + b + \"]\"",
        "print _arguments.size",
        "end function",
        "f(1)",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["[]", "1"]);
}

#[test]
fn test_recursion() {
    let (host, _, result) = run_script(&[
        "function fact(n)",
        "if (n <= 1)",
        "return 1",
        "endif",
        "return n * fact(n - 1)",
        "end function",
        "print fact(5)",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["120"]);
}

#[test]
fn test_function_locals_do_not_leak() {
    let (_, _, result) = run_script(&[
        "g = 1",
        "function bump()",
        "tmp = 5",
        "g = g + 1",
        "end function",
        "bump()",
        "bump()",
    ]);
    let report = result.unwrap();

    assert_eq!(report.bindings.get("g"), Some(&Value::Int(3)));
    assert!(report.bindings.get("tmp").is_none());
}

#[test]
fn test_function_without_return_yields_empty() {
    let (host, _, result) = run_script(&["function f()", "x = 1", "end function", "print \"<\" + f() + \">\""]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["<>"]);
}

#[test]
fn test_redefinition_replaces() {
    let (host, _, result) = run_script(&[
        "function f()",
        "return 1",
        "end function",
        "print f()",
        "function f()",
        "return 2",
        "end function",
        "print f()",
    ]);
    result.unwrap();
    assert_eq!(host.output_lines(), vec!["1", "2"]);
}

#[test]
fn test_functions_survive_between_runs() {
    let host = Arc::new(particle_host(1));
    let registry = Arc::new(FunctionRegistry::new());
    let mut first = Interpreter::builder(host.clone()).functions(registry.clone()).build();
    first
        .run(script("define", &["function twice(v)", "return v * 2", "end function"]), RunOptions::default())
        .unwrap();

    let mut second = Interpreter::builder(host.clone()).functions(registry.clone()).build();
    second.run(script("use", &["print twice(4)"]), RunOptions::default()).unwrap();

    assert!(registry.contains("TWICE"));
    assert_eq!(host.output_lines(), vec!["8"]);
}

#[test]
fn test_global_registry_is_shared() {
    let define = Arc::new(MemoryHost::new());
    let mut first = Interpreter::builder(define.clone())
        .functions(FunctionRegistry::global())
        .build();
    first
        .run(
            script("define", &["function global_registry_probe()", "return \"shared\"", "end function"]),
            RunOptions::default(),
        )
        .unwrap();

    assert!(FunctionRegistry::global().contains("global_registry_probe"));
    FunctionRegistry::global().remove("global_registry_probe");
}

#[test]
fn test_unknown_function_in_expression() {
    let (_, _, result) = run_script(&["print nosuch(1)"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::UnrecognizedExpression);
}

#[test]
fn test_break_in_function_is_bad_context() {
    let (_, _, result) = run_script(&["function f()", "break", "end function", "f()"]);
    assert_eq!(result.unwrap_err().kind, ErrorKind::BadContext);
}

#[test]
fn test_exit_inside_called_function_stops_statement() {
    let (host, _, result) = run_script(&[
        "function f()",
        "exit",
        "end function",
        "print f()",
        "x = f()",
        "print \"unreached\"",
    ]);
    let report = result.unwrap();

    assert_eq!(report.status, RunStatus::Exited);
    assert!(host.output_lines().is_empty());
    assert!(report.bindings.get("x").is_none());
}
