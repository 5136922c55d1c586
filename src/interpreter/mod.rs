//! Script interpreter
//!
//! Executes scripts already compiled into statement arrays of typed tokens.
//! The pieces, roughly in the order a statement meets them:
//!
//! - [`jumps`]: block pairing and labels, computed once per loaded script
//! - [`exec_loop`]: the per-frame dispatch loop
//! - [`statements`], [`flow`], [`commands`]: statement handlers
//! - [`expressions`]: the operator-precedence evaluator and property lookups
//! - [`context`]: frames, scopes, and variable resolution
//! - [`fork`]: deferred fork blocks and the executors that run them
//! - [`errors`]: error kinds, messages, and call-stack traces
//!
//! ## Example
//!
//! ```no_run
//! use molscript_core::interpreter::{Interpreter, MemoryHost, RunOptions};
//! use molscript_core::interpreter::types::{CompiledScript, Keyword, Statement, Token};
//! use std::sync::Arc;
//!
//! let host = Arc::new(MemoryHost::new());
//! let mut interp = Interpreter::builder(host.clone()).build();
//! let script = CompiledScript::new(
//!     "hello",
//!     vec![Statement::new(vec![Token::keyword(Keyword::Print), Token::literal("hello")])],
//! );
//! interp.run(script, RunOptions::default())?;
//! assert_eq!(host.output_lines(), vec!["hello"]);
//! # Ok::<(), molscript_core::interpreter::ScriptError>(())
//! ```

pub mod commands;
pub mod context;
pub mod errors;
mod exec_loop;
pub mod expressions;
mod flow;
pub mod fork;
pub mod functions;
pub mod history;
pub mod host;
pub mod jumps;
pub mod selection;
mod statements;
pub mod stdlib;
pub mod suspend;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

pub use commands::{CommandContext, CommandHandler, CommandRegistry};
pub use errors::{ErrorKind, ScriptError, ScriptResult, TraceFrame};
pub use fork::{ForkOutcome, ParallelExecutor, SequentialExecutor, SubContext, TokioExecutor};
pub use functions::{FunctionRegistry, UserFunction};
pub use history::CommandHistory;
pub use host::{CompileFlags, Compiler, GlobalParameters, Host, MemoryHost, ParameterStore};
pub use jumps::Program;
pub use selection::{SelectionSet, SetFlavor};
pub use stdlib::BuiltinTable;
pub use suspend::ScriptControl;
pub use vm::{Interpreter, InterpreterBuilder, RunOptions, RunReport, RunStatus, Runtime};
