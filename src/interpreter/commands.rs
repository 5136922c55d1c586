//! Host command registry
//!
//! Statements that start with a command word the interpreter does not know
//! itself are routed here. Hosts register [`CommandHandler`]s by name; a
//! handler receives a [`CommandContext`] with the argument tokens and helpers
//! to evaluate them in the caller's scope.

use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::expressions::split_top_level;
use crate::interpreter::host::Host;
use crate::interpreter::types::{Statement, Token, Value};
use crate::interpreter::vm::Interpreter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Context handed to a command handler
pub struct CommandContext<'a> {
    interp: &'a mut Interpreter,
    name: &'a str,
    args: &'a [Token],
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(interp: &'a mut Interpreter, name: &'a str, statement: &'a Statement) -> Self {
        let args = statement.tokens().get(1..).unwrap_or_default();
        Self { interp, name, args }
    }

    /// Command word as written
    pub fn name(&self) -> &str {
        self.name
    }

    /// Argument tokens after the command word
    pub fn args(&self) -> &[Token] {
        self.args
    }

    /// Syntax-check mode: handlers must not touch the host
    pub fn check_only(&self) -> bool {
        self.interp.check_only
    }

    pub fn host(&self) -> &dyn Host {
        self.interp.runtime.host.as_ref()
    }

    /// Evaluate every comma-separated argument
    pub fn eval_args(&mut self) -> ScriptResult<Vec<Value>> {
        split_top_level(self.args)
            .into_iter()
            .map(|part| self.interp.evaluate(part))
            .collect()
    }

    /// Evaluate the whole argument window as one expression
    pub fn eval_all(&mut self) -> ScriptResult<Value> {
        self.interp.evaluate(self.args)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.interp.lookup_variable(name)
    }

    pub fn assign(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        self.interp.assign_variable(name, value)
    }

    /// Write to the current output sink
    pub fn print(&mut self, text: &str) {
        self.interp.emit_output(text);
    }
}

/// A host command
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> ScriptResult<()>;
}

/// Handler backed by a closure
struct FnCommand<F> {
    name: String,
    func: F,
}

impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(&mut CommandContext<'_>) -> ScriptResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> ScriptResult<()> {
        (self.func)(ctx)
    }
}

#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: CommandHandler + 'static>(&mut self, command: C) {
        self.register_arc(Arc::new(command));
    }

    pub fn register_arc(&mut self, command: Arc<dyn CommandHandler>) {
        for alias in command.aliases() {
            self.commands.insert(alias.to_lowercase(), command.clone());
        }
        self.commands.insert(command.name().to_lowercase(), command);
    }

    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut CommandContext<'_>) -> ScriptResult<()> + Send + Sync + 'static,
    {
        self.register(FnCommand {
            name: name.to_string(),
            func,
        });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl Interpreter {
    /// Route a statement to a registered host command
    pub(crate) fn execute_host_command(&mut self, name: &str, statement: &Statement) -> ScriptResult<()> {
        let Some(handler) = self.runtime.commands.get(name) else {
            return Err(ScriptError::new(ErrorKind::UnrecognizedCommand).detail(name));
        };
        let mut ctx = CommandContext::new(self, name, statement);
        handler.execute(&mut ctx)
    }
}
