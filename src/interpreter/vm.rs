//! Interpreter state and run API
//!
//! An [`Interpreter`] owns one context stack and executes one script at a
//! time. Everything it shares with other interpreters (host, registries,
//! parameter store, fork executor, control handle) lives in [`Runtime`],
//! which is cloned into fork workers.
//!
//! ## Run lifecycle
//!
//! 1. Load the script into a [`Program`] (block pairing happens here)
//! 2. Hold host redraws, push the root script frame
//! 3. Dispatch until the frame ends, returns, exits, or fails
//! 4. Join outstanding forks, pop the root frame, flush its variables to the
//!    parameter store
//! 5. Release redraws, clear control flags, report the outcome to the host

use crate::config::InterpreterSettings;
use crate::interpreter::commands::CommandRegistry;
use crate::interpreter::context::{ContextId, ContextStack, Frame, FrameKind, StackStats};
use crate::interpreter::errors::{ScriptError, ScriptResult};
use crate::interpreter::fork::{ParallelExecutor, SequentialExecutor};
use crate::interpreter::functions::FunctionRegistry;
use crate::interpreter::history::CommandHistory;
use crate::interpreter::host::{Compiler, GlobalParameters, Host, ParameterStore};
use crate::interpreter::jumps::Program;
use crate::interpreter::stdlib::BuiltinTable;
use crate::interpreter::suspend::ScriptControl;
use crate::interpreter::types::{CompiledScript, ControlSignal, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/* ===================== Runtime ===================== */

/// Capabilities shared by an interpreter and its fork workers
#[derive(Clone)]
pub struct Runtime {
    pub host: Arc<dyn Host>,
    pub settings: InterpreterSettings,
    pub functions: Arc<FunctionRegistry>,
    pub builtins: Arc<BuiltinTable>,
    pub commands: Arc<CommandRegistry>,
    pub parameters: Arc<dyn ParameterStore>,
    pub compiler: Option<Arc<dyn Compiler>>,
    pub executor: Arc<dyn ParallelExecutor>,
    pub control: ScriptControl,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .field("functions", &self.functions.names())
            .field("builtins", &self.builtins)
            .field("commands", &self.commands)
            .field("compiler", &self.compiler.is_some())
            .finish()
    }
}

/* ===================== Run Options ===================== */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Validate without side effects on the host
    pub check_only: bool,
    /// Collect `print`/`echo` output into the report instead of the host
    pub capture_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    /// Stopped by `exit`/`quit`
    Exited,
    /// Stopped through [`ScriptControl::cancel`]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub output: Vec<String>,
    /// Top-level variables at the end of the run
    pub bindings: HashMap<String, Value>,
}

/* ===================== Interpreter ===================== */

pub struct Interpreter {
    pub(crate) runtime: Runtime,
    pub(crate) stack: ContextStack,
    pub(crate) history: CommandHistory,
    pub(crate) check_only: bool,
    pub(crate) halted: bool,
    /// Set while an interrupt script runs on top of a suspended one
    pub(crate) in_interrupt: bool,
    pub(crate) fork_seq: usize,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("runtime", &self.runtime)
            .field("depth", &self.stack.depth())
            .field("check_only", &self.check_only)
            .finish()
    }
}

impl Interpreter {
    pub fn builder(host: Arc<dyn Host>) -> InterpreterBuilder {
        InterpreterBuilder::new(host)
    }

    pub(crate) fn from_runtime(runtime: Runtime) -> Self {
        let settings = &runtime.settings;
        Interpreter {
            stack: ContextStack::new(settings.max_script_levels),
            history: CommandHistory::new(settings.history_max),
            check_only: false,
            halted: false,
            in_interrupt: false,
            fork_seq: 0,
            runtime,
        }
    }

    pub fn control(&self) -> ScriptControl {
        self.runtime.control.clone()
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.runtime.functions
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn stack_stats(&self) -> StackStats {
        self.stack.stats()
    }

    /* ===================== Running ===================== */

    /// Load and run a compiled script
    pub fn run(&mut self, script: CompiledScript, options: RunOptions) -> ScriptResult<RunReport> {
        let program = match Program::load(script) {
            Ok(program) => program,
            Err(err) => return Err(self.report_failure(err)),
        };
        self.run_program(program, options)
    }

    /// Syntax-check a script: every statement is visited, nothing touches the host
    pub fn check(&mut self, script: CompiledScript) -> ScriptResult<RunReport> {
        self.run(
            script,
            RunOptions {
                check_only: true,
                capture_output: true,
            },
        )
    }

    pub fn run_program(&mut self, program: Arc<Program>, options: RunOptions) -> ScriptResult<RunReport> {
        if !self.stack.is_empty() {
            return Err(ScriptError::bad_context("run while another script is running"));
        }
        self.check_only = options.check_only;
        self.halted = false;

        let host = self.runtime.host.clone();
        host.hold_redraw();
        let mut root = Frame::whole(FrameKind::Script, program.clone()).parallel(true);
        if options.capture_output {
            root = root.capture_output();
        }
        let result = self.run_root(root);
        host.release_redraw();

        let check_only = std::mem::replace(&mut self.check_only, false);
        let cancelled = self.runtime.control.is_cancelled();
        self.runtime.control.reset();

        match result {
            Ok(mut report) => {
                if cancelled {
                    report.status = RunStatus::Cancelled;
                }
                info!(script = %program.name(), status = ?report.status, check_only, "script finished");
                if report.status == RunStatus::Completed && !check_only {
                    host.status("Script completed");
                }
                Ok(report)
            }
            Err(err) => Err(self.report_failure(err)),
        }
    }

    fn run_root(&mut self, frame: Frame) -> ScriptResult<RunReport> {
        let root = self.stack.push_frame(frame, self.check_only)?;
        let outcome = self.dispatch();
        let outcome = match outcome {
            Ok(signal) => self.join_pending(root).map(|_| signal),
            Err(err) => Err(err),
        };

        self.stack.unwind_scopes(root);
        let Some(ctx) = self.stack.pop(false) else {
            return Err(ScriptError::bad_context("root frame missing at end of run"));
        };
        let output = ctx
            .frame
            .as_ref()
            .and_then(|f| f.output.clone())
            .unwrap_or_default();
        let bindings = ctx.into_vars();
        if !self.check_only {
            for (name, value) in &bindings {
                self.runtime.parameters.set(name, value.clone());
            }
        }

        let signal = outcome?;
        let status = if self.halted || signal == ControlSignal::Exit {
            RunStatus::Exited
        } else {
            RunStatus::Completed
        };
        Ok(RunReport {
            status,
            output,
            bindings,
        })
    }

    fn report_failure(&mut self, mut err: ScriptError) -> ScriptError {
        if !err.is_traced() {
            err.localize(self.runtime.host.as_ref());
        }
        error!(kind = %err.kind, trace_frames = err.trace.len(), "{}", err.message);
        self.runtime.host.report_error(&err);
        self.halted = false;
        self.check_only = false;
        err
    }

    /* ===================== Variables ===================== */

    /// Context chain first, then the parameter store
    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        self.stack
            .lookup(name)
            .cloned()
            .or_else(|| self.runtime.parameters.get(&name.to_lowercase()))
    }

    pub(crate) fn assign_variable(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        self.stack.assign(name, value)
    }

    pub(crate) fn declare_variable(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        self.stack.declare(name, value)
    }

    /* ===================== Output ===================== */

    /// Innermost capturing frame, else the host
    pub(crate) fn emit_output(&mut self, text: &str) {
        if self.check_only {
            return;
        }
        let sink = self.capture_sink();
        match sink.and_then(|id| self.stack.frame_mut(id)).and_then(|f| f.output.as_mut()) {
            Some(buffer) => buffer.push(text.to_string()),
            None => self.runtime.host.output(text),
        }
    }

    fn capture_sink(&self) -> Option<ContextId> {
        self.stack
            .chain()
            .find(|c| c.frame.as_ref().is_some_and(|f| f.output.is_some()))
            .map(|c| c.id)
    }

    /// Whether output currently lands in a capture buffer
    pub(crate) fn is_capturing(&self) -> bool {
        self.capture_sink().is_some()
    }

    /* ===================== Diagnostics ===================== */

    /// Attach the active frames, innermost first, and localize the message
    pub(crate) fn attach_trace(&self, err: &mut ScriptError) {
        err.trace = self.stack.frames().map(|f| f.snapshot()).collect();
        err.localize(self.runtime.host.as_ref());
    }
}

/* ===================== Builder ===================== */

pub struct InterpreterBuilder {
    host: Arc<dyn Host>,
    settings: InterpreterSettings,
    functions: Option<Arc<FunctionRegistry>>,
    builtins: Option<BuiltinTable>,
    commands: CommandRegistry,
    parameters: Option<Arc<dyn ParameterStore>>,
    compiler: Option<Arc<dyn Compiler>>,
    executor: Option<Arc<dyn ParallelExecutor>>,
    control: Option<ScriptControl>,
}

impl InterpreterBuilder {
    fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            settings: InterpreterSettings::default(),
            functions: None,
            builtins: None,
            commands: CommandRegistry::new(),
            parameters: None,
            compiler: None,
            executor: None,
            control: None,
        }
    }

    pub fn settings(mut self, settings: InterpreterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a function registry, e.g. [`FunctionRegistry::global`]
    pub fn functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn builtins(mut self, builtins: BuiltinTable) -> Self {
        self.builtins = Some(builtins);
        self
    }

    pub fn commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    pub fn parameters(mut self, parameters: Arc<dyn ParameterStore>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Executor for fork batches of parallel functions and top-level scripts
    pub fn executor(mut self, executor: Arc<dyn ParallelExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn control(mut self, control: ScriptControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn build(self) -> Interpreter {
        Interpreter::from_runtime(Runtime {
            host: self.host,
            settings: self.settings,
            functions: self
                .functions
                .unwrap_or_else(|| Arc::new(FunctionRegistry::new())),
            builtins: Arc::new(self.builtins.unwrap_or_else(BuiltinTable::with_defaults)),
            commands: Arc::new(self.commands),
            parameters: self
                .parameters
                .unwrap_or_else(|| Arc::new(GlobalParameters::new())),
            compiler: self.compiler,
            executor: self.executor.unwrap_or_else(|| Arc::new(SequentialExecutor)),
            control: self.control.unwrap_or_default(),
        })
    }
}
