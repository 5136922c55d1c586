//! Statement dispatch loop
//!
//! [`Interpreter::dispatch`] drives the innermost frame until its statement
//! range ends or a control signal leaves it. Per statement it:
//!
//! 1. Stops on cancellation or a halted run
//! 2. Waits while paused, running interrupt scripts that arrive meanwhile
//! 3. Resolves `@` substitutions
//! 4. Executes, records non-flow statements in the history, and applies the
//!    returned [`ControlSignal`]
//!
//! Errors get their trace attached here, at the innermost loop that sees
//! them, while every frame that was active is still on the stack.

use crate::interpreter::context::{ContextId, Frame, FrameKind, ScopeKind};
use crate::interpreter::errors::{ScriptError, ScriptResult};
use crate::interpreter::jumps::Program;
use crate::interpreter::suspend::Wake;
use crate::interpreter::types::{
    CompiledScript, ControlSignal, Keyword, Statement, Token, TokenKind, TokenValue, Value,
};
use crate::interpreter::vm::Interpreter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Where a `break` lands
enum BreakTarget {
    /// Resume the current frame at this statement
    Resume(usize),
    /// Leave this frame and keep breaking `n` more loops outside it
    Escape(usize),
}

impl Interpreter {
    /// Run the innermost frame; its scopes are unwound on every exit path
    pub(crate) fn dispatch(&mut self) -> ScriptResult<ControlSignal> {
        let Some(frame_id) = self.stack.current_frame_id() else {
            return Err(ScriptError::bad_context("dispatch without a frame"));
        };
        let result = self.dispatch_frame(frame_id);
        self.stack.unwind_scopes(frame_id);
        result
    }

    fn dispatch_frame(&mut self, frame_id: ContextId) -> ScriptResult<ControlSignal> {
        loop {
            if self.should_stop() {
                return Ok(ControlSignal::Exit);
            }
            // interrupt scripts run while the script under them is paused
            if !self.in_interrupt && self.runtime.control.is_paused() {
                self.suspend(None);
                if self.should_stop() {
                    return Ok(ControlSignal::Exit);
                }
            }

            let Some((program, pc, end)) = self
                .stack
                .frame(frame_id)
                .map(|f| (f.program.clone(), f.pc, f.end))
            else {
                return Err(ScriptError::bad_context("frame vanished during dispatch"));
            };
            if pc >= end {
                self.join_pending(frame_id)?;
                return Ok(ControlSignal::Continue);
            }

            let signal = match self.step_statement(&program, pc) {
                Ok(signal) => signal,
                Err(mut err) => {
                    if !err.is_traced() {
                        self.attach_trace(&mut err);
                    }
                    return Err(err);
                }
            };

            let next = match signal {
                ControlSignal::Continue => pc + 1,
                ControlSignal::Goto(target) => target,
                ControlSignal::Break(n) => match self.resolve_break(frame_id, n) {
                    Ok(BreakTarget::Resume(target)) => target,
                    Ok(BreakTarget::Escape(left)) => return Ok(ControlSignal::Break(left)),
                    Err(mut err) => {
                        self.attach_trace(&mut err);
                        return Err(err);
                    }
                },
                ControlSignal::ContinueLoop(n) => match self.continue_loop(frame_id, n) {
                    Ok(ControlSignal::Goto(target)) => target,
                    Ok(signal) => return Ok(signal),
                    Err(mut err) => {
                        self.attach_trace(&mut err);
                        return Err(err);
                    }
                },
                ControlSignal::Return(value) => {
                    self.join_pending(frame_id)?;
                    if let Some(frame) = self.stack.frame_mut(frame_id) {
                        frame.return_slot = Some(value.clone());
                    }
                    return Ok(ControlSignal::Return(value));
                }
                ControlSignal::Exit => {
                    self.halted = true;
                    return Ok(ControlSignal::Exit);
                }
            };
            if let Some(frame) = self.stack.frame_mut(frame_id) {
                frame.pc = next;
            }
            if !self.in_interrupt && self.runtime.control.is_stepping() {
                self.runtime.control.pause_after_step();
            }
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.halted || self.runtime.control.is_cancelled()
    }

    fn step_statement(&mut self, program: &Arc<Program>, pc: usize) -> ScriptResult<ControlSignal> {
        let Some(original) = program.script.statement(pc) else {
            return Ok(ControlSignal::Continue);
        };
        let substituted;
        let statement = if original.has_substitution() {
            match self.substitute(original)? {
                Some(resolved) => {
                    substituted = resolved;
                    &substituted
                }
                None => {
                    debug!(pc, "statement with substitution skipped in check mode");
                    return Ok(ControlSignal::Continue);
                }
            }
        } else {
            original
        };

        let text = program.script.text(pc);
        trace!(script = %program.name(), pc, "{}", text);
        if self.runtime.settings.echo_commands && !self.check_only {
            self.runtime.host.status(&text);
        }

        let signal = self.execute_statement(program, pc, statement)?;

        if self.runtime.settings.history_enabled && !self.check_only && records_history(statement) {
            self.history.push(&text);
        }
        Ok(signal)
    }

    /// Replace `@name` and `@{expr}` tokens with literal values
    ///
    /// Returns `None` in check mode, where the values cannot be known.
    fn substitute(&mut self, statement: &Statement) -> ScriptResult<Option<Statement>> {
        if self.check_only {
            return Ok(None);
        }
        let mut tokens = Vec::with_capacity(statement.len());
        for (i, token) in statement.tokens().iter().enumerate() {
            if token.kind != TokenKind::Substitution {
                tokens.push(token.clone());
                continue;
            }
            let value = match &token.value {
                Some(TokenValue::Name(name)) => self.lookup_variable(name).ok_or_else(|| {
                    ScriptError::invalid_argument(format!("@{} is not defined", name))
                })?,
                Some(TokenValue::Tokens(inner)) => self.evaluate(inner)?,
                _ => return Err(ScriptError::invalid_argument("empty substitution")),
            };
            tokens.push(match value {
                // a substituted command word
                Value::Str(word) if i == 0 => Token::ident(word),
                other => Token::literal(other),
            });
        }
        Ok(Some(Statement::new(tokens)))
    }

    /* ===================== Break ===================== */

    /// Pop `n` loop scopes of this frame and find where execution resumes
    fn resolve_break(&mut self, frame_id: ContextId, n: usize) -> ScriptResult<BreakTarget> {
        let mut target = None;
        for done in 0..n {
            let Some(scope) = self.stack.innermost_scope(frame_id, ScopeKind::Loop) else {
                let kind = self.stack.frame(frame_id).map(|f| f.kind);
                return match kind {
                    Some(FrameKind::Try) => Ok(BreakTarget::Escape(n - done)),
                    _ => Err(ScriptError::bad_context("break")),
                };
            };
            let head = self.stack.get(scope).and_then(|c| c.head).unwrap_or_default();
            self.stack.truncate_through(scope);
            target = self
                .stack
                .frame(frame_id)
                .and_then(|f| f.program.jumps.get(head))
                .map(|j| j.end + 1);
        }
        target
            .map(BreakTarget::Resume)
            .ok_or_else(|| ScriptError::bad_context("break"))
    }

    /* ===================== Suspension ===================== */

    /// Wait while paused (no deadline) or until `deadline`, running interrupts
    pub(crate) fn suspend(&mut self, deadline: Option<Instant>) {
        let poll = Duration::from_millis(self.runtime.settings.pause_poll_ms.max(1));
        let host = self.runtime.host.clone();
        self.set_paused_flag(deadline.is_none());
        loop {
            match self.runtime.control.wait(deadline, poll) {
                Wake::Resumed => {
                    host.status("script execution resumed");
                    break;
                }
                Wake::TimedOut => break,
                Wake::Cancelled => {
                    host.status("script execution interrupted");
                    break;
                }
                Wake::Interrupt(script) => self.run_interrupt(script),
            }
        }
        self.set_paused_flag(false);
    }

    fn set_paused_flag(&mut self, paused: bool) {
        let stepping = self.runtime.control.is_stepping();
        if let Some(ctx) = self.stack.current_mut() {
            ctx.flags.paused = paused;
            ctx.flags.stepping = stepping;
        }
    }

    /// Run a queued interrupt script on top of the suspended one
    pub(crate) fn run_interrupt(&mut self, script: CompiledScript) {
        let name = script.name.clone();
        debug!(script = %name, "running interrupt script");
        let outer = std::mem::replace(&mut self.in_interrupt, true);
        let result = Program::load(script).and_then(|program| {
            self.stack
                .push_frame(Frame::whole(FrameKind::Interrupt, program), self.check_only)?;
            let outcome = self.dispatch();
            self.stack.pop(false);
            outcome
        });
        self.in_interrupt = outer;
        // an interrupt's exit ends the interrupt, not the suspended script
        self.halted = false;
        if let Err(err) = result {
            warn!(script = %name, "interrupt script failed: {}", err);
            self.runtime.host.report_error(&err);
        }
    }
}

/// Flow statements stay out of the history, except function definitions
fn records_history(statement: &Statement) -> bool {
    match statement.get(0).map(|t| &t.kind) {
        Some(TokenKind::Keyword(kw)) if kw.is_flow() => {
            matches!(kw, Keyword::Function | Keyword::Parallel)
        }
        _ => true,
    }
}
