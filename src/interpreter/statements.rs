//! Statement execution
//!
//! The first token decides how a statement runs:
//!
//! - flow keywords go to the control-flow handlers in `flow.rs`
//! - core keywords (`set`, `var`, `print`, `select`, ...) run here
//! - an identifier is an assignment, a user-function call, or a host command
//! - a command token is always a host command

use crate::interpreter::context::{Frame, FrameKind};
use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::expressions::{matching_close, split_top_level};
use crate::interpreter::host::CompileFlags;
use crate::interpreter::jumps::Program;
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::{
    ControlSignal, Keyword, Op, Statement, Structural, Token, TokenKind, TokenValue, Value,
};
use crate::interpreter::vm::Interpreter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

impl Interpreter {
    pub(crate) fn execute_statement(
        &mut self,
        program: &Arc<Program>,
        pc: usize,
        statement: &Statement,
    ) -> ScriptResult<ControlSignal> {
        let Some(first) = statement.get(0) else {
            return Ok(ControlSignal::Continue);
        };
        match first.kind {
            TokenKind::Keyword(kw) if kw.is_flow() => self.execute_flow(program, pc, kw, statement),
            TokenKind::Keyword(kw) => self.execute_core(kw, statement),
            TokenKind::Identifier => self.execute_identifier(statement),
            TokenKind::Command => {
                let name = first.name().unwrap_or_default().to_string();
                self.execute_host_command(&name, statement)?;
                Ok(ControlSignal::Continue)
            }
            _ => Err(ScriptError::new(ErrorKind::CommandExpected).detail(first.to_string())),
        }
    }

    /* ===================== Identifier Statements ===================== */

    fn execute_identifier(&mut self, statement: &Statement) -> ScriptResult<ControlSignal> {
        let tokens = statement.tokens();
        let name = tokens[0].name().unwrap_or_default().to_string();

        if let Some((target, value_at)) = assignment_split(tokens) {
            return self.assign_target(&name, &tokens[1..target], &tokens[value_at..]);
        }

        if self.runtime.functions.contains(&name) {
            let rest = &tokens[1..];
            let window = match rest.first() {
                Some(t) if t.is_structural(Structural::LeftParen)
                    && matching_close(rest, 0) == Some(rest.len() - 1) =>
                {
                    &rest[1..rest.len() - 1]
                }
                _ => rest,
            };
            let args = self.evaluate_list(window)?;
            self.call_function(&name, args)?;
            return Ok(if self.halted {
                ControlSignal::Exit
            } else {
                ControlSignal::Continue
            });
        }

        self.execute_host_command(&name, statement)?;
        Ok(ControlSignal::Continue)
    }

    /// `name = expr` or `name[index] = expr`
    fn assign_target(&mut self, name: &str, index: &[Token], expr: &[Token]) -> ScriptResult<ControlSignal> {
        let value = self.evaluate(expr)?;
        if self.should_stop() {
            return Ok(ControlSignal::Exit);
        }
        if index.is_empty() {
            self.assign_variable(name, value)?;
            return Ok(ControlSignal::Continue);
        }
        let idx = self.evaluate(&index[1..index.len() - 1])?;
        if self.should_stop() {
            return Ok(ControlSignal::Exit);
        }
        let current = self.lookup_variable(name).unwrap_or_else(|| Value::List(Vec::new()));
        let Value::List(mut items) = current else {
            return Err(ScriptError::invalid_argument(format!(
                "{} is a {}, not an array",
                name,
                current.type_name()
            )));
        };
        let Some(i) = idx.as_int() else {
            return Err(ScriptError::new(ErrorKind::IntegerExpected).detail(idx.to_string()));
        };
        let len = items.len() as i64;
        let pos = if i > 0 {
            i - 1
        } else {
            (len - 1).checked_add(i).unwrap_or(-1)
        };
        if pos < 0 {
            return Err(ScriptError::invalid_argument(format!(
                "index {} is before the start of {}",
                i, name
            )));
        }
        let pos = pos as usize;
        if pos >= items.len() {
            items.resize(pos + 1, Value::empty());
        }
        items[pos] = value;
        self.assign_variable(name, Value::List(items))?;
        Ok(ControlSignal::Continue)
    }

    /* ===================== Core Commands ===================== */

    fn execute_core(&mut self, kw: Keyword, statement: &Statement) -> ScriptResult<ControlSignal> {
        let tokens = statement.tokens();
        let args = &tokens[1..];
        match kw {
            Keyword::Set => {
                let Some(name) = args.first().and_then(|t| t.name()).map(str::to_string) else {
                    return Err(ScriptError::with_params(ErrorKind::UnrecognizedParameter, ["SET"]));
                };
                let expr = match args.get(1) {
                    Some(t) if t.is_op(Op::Assign) => &args[2..],
                    _ => &args[1..],
                };
                let value = self.evaluate(expr)?;
                if self.should_stop() {
                    return Ok(ControlSignal::Exit);
                }
                self.assign_variable(&name, value)?;
            }
            Keyword::Var => {
                for decl in split_top_level(args) {
                    let Some(name) = decl.first().and_then(|t| t.name()).map(str::to_string) else {
                        return Err(ScriptError::new(ErrorKind::StringOrIdentifierExpected));
                    };
                    let value = match decl.get(1) {
                        Some(t) if t.is_op(Op::Assign) => self.evaluate(&decl[2..])?,
                        Some(_) => return Err(ScriptError::invalid_argument(format!("var {}", name))),
                        None => Value::empty(),
                    };
                    if self.should_stop() {
                        return Ok(ControlSignal::Exit);
                    }
                    self.declare_variable(&name, value)?;
                }
            }
            Keyword::Print => {
                let value = if args.is_empty() {
                    Value::empty()
                } else {
                    self.evaluate(args)?
                };
                // a function called by the expression may have ended the run
                if self.should_stop() {
                    return Ok(ControlSignal::Exit);
                }
                self.emit_output(&value.to_string());
            }
            Keyword::Echo => {
                let words: Vec<String> = args
                    .iter()
                    .map(|t| match t.literal_value() {
                        Some(Value::Str(s)) => s.clone(),
                        _ => t.to_string(),
                    })
                    .collect();
                self.emit_output(&words.join(" "));
            }
            Keyword::Select => {
                let set = if args.is_empty() {
                    SelectionSet::all(SetFlavor::Particle, self.runtime.host.particle_count())
                } else {
                    self.evaluate_set(args)?
                };
                if self.should_stop() {
                    return Ok(ControlSignal::Exit);
                }
                if !self.check_only {
                    debug!(selected = set.count(), "selection changed");
                    self.runtime.host.set_selection(&set);
                }
            }
            Keyword::Define => {
                let Some(name) = args.first().and_then(token_word) else {
                    return Err(ScriptError::new(ErrorKind::ObjectNameExpected));
                };
                let set = self.evaluate_set(&args[1..])?;
                if self.should_stop() {
                    return Ok(ControlSignal::Exit);
                }
                if !self.check_only {
                    self.runtime.host.define_set(&name.to_lowercase(), set);
                }
            }
            Keyword::Pause => {
                if !self.check_only {
                    self.runtime.control.pause();
                    let message = args
                        .first()
                        .map(|_| args.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" "));
                    info!(message = ?message, "script paused");
                    self.runtime.host.status("script execution paused");
                }
            }
            Keyword::Resume => {
                if !self.check_only {
                    self.runtime.control.resume();
                }
            }
            Keyword::Delay => {
                let seconds = if args.is_empty() {
                    1.0
                } else {
                    self.evaluate(args)?
                        .as_f64()
                        .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected).detail("delay"))?
                };
                if !self.check_only && seconds > 0.0 {
                    let deadline = Instant::now() + Duration::from_secs_f64(seconds.min(86_400.0));
                    self.suspend(Some(deadline));
                    if self.should_stop() {
                        return Ok(ControlSignal::Exit);
                    }
                }
            }
            Keyword::Script => return self.include_script(args),
            other => {
                return Err(ScriptError::new(ErrorKind::UnrecognizedCommand).detail(other.name()));
            }
        }
        Ok(ControlSignal::Continue)
    }

    /// Evaluate a window that must produce a particle or bond set
    fn evaluate_set(&mut self, tokens: &[Token]) -> ScriptResult<SelectionSet> {
        let n = self.runtime.host.particle_count();
        match self.evaluate(tokens)? {
            Value::Set(set) => Ok(set),
            Value::Bool(true) => Ok(SelectionSet::all(SetFlavor::Particle, n)),
            Value::Bool(false) => Ok(SelectionSet::empty(SetFlavor::Particle, n)),
            other => {
                Err(ScriptError::new(ErrorKind::ExpressionExpected).detail(other.type_name()))
            }
        }
    }

    /// `script "name"`: compile a host-provided script and run it as a nested level
    fn include_script(&mut self, args: &[Token]) -> ScriptResult<ControlSignal> {
        let Some(name) = args.first().and_then(token_word) else {
            return Err(ScriptError::new(ErrorKind::FilenameExpected));
        };
        let Some(text) = self.runtime.host.read_script(&name) else {
            return Err(ScriptError::new(ErrorKind::FileNotFound).detail(name));
        };
        let Some(compiler) = self.runtime.compiler.clone() else {
            return Err(ScriptError::evaluation(format!(
                "no compiler available to load {}",
                name
            )));
        };
        let compiled = compiler.compile(
            &name,
            &text,
            CompileFlags {
                check_only: self.check_only,
            },
        )?;
        let program = Program::load(compiled)?;
        let parallel = self
            .stack
            .current_frame_id()
            .and_then(|id| self.stack.frame(id))
            .is_some_and(|f| f.parallel);

        self.stack.push_frame(
            Frame::whole(FrameKind::Script, program).parallel(parallel),
            self.check_only,
        )?;
        let outcome = self.dispatch();
        self.stack.pop(false);
        match outcome? {
            ControlSignal::Exit => Ok(ControlSignal::Exit),
            _ => Ok(ControlSignal::Continue),
        }
    }

    /* ===================== Function Calls ===================== */

    /// Call a user function: bind parameters in a new frame, run, read the return slot
    pub(crate) fn call_function(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let Some(func) = self.runtime.functions.get(name) else {
            return Err(ScriptError::new(ErrorKind::UnrecognizedExpression).detail(format!("{}()", name)));
        };
        if self.check_only {
            return Ok(Value::empty());
        }

        let frame = Frame::whole(FrameKind::Function, func.program.clone())
            .function(func.name.clone())
            .parallel(func.parallel);
        let frame_id = self.stack.push_frame(frame, self.check_only)?;
        for (i, param) in func.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_else(Value::empty);
            self.declare_variable(param, value)?;
        }
        self.declare_variable("_arguments", Value::List(args))?;

        let outcome = self.dispatch();
        let returned = self
            .stack
            .frame_mut(frame_id)
            .and_then(|f| f.return_slot.take());
        self.stack.pop(false);

        match outcome? {
            ControlSignal::Break(_) => Err(ScriptError::bad_context("break")),
            ControlSignal::ContinueLoop(_) => Err(ScriptError::bad_context("continue")),
            _ => Ok(returned.unwrap_or_else(Value::empty)),
        }
    }
}

/// Position of the target end and value start of a statement-level assignment
fn assignment_split(tokens: &[Token]) -> Option<(usize, usize)> {
    match tokens.get(1) {
        Some(t) if t.is_op(Op::Assign) => Some((1, 2)),
        Some(t) if t.is_structural(Structural::LeftBracket) => {
            let close = matching_close(tokens, 1)?;
            tokens
                .get(close + 1)
                .filter(|t| t.is_op(Op::Assign))
                .map(|_| (close + 1, close + 2))
        }
        _ => None,
    }
}

/// Bare word from an identifier, string literal, or selector token
pub(crate) fn token_word(token: &Token) -> Option<String> {
    match (&token.kind, &token.value) {
        (_, Some(TokenValue::Name(name))) => Some(name.clone()),
        (TokenKind::Literal, Some(TokenValue::Literal(Value::Str(s)))) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_split() {
        let plain = vec![Token::ident("x"), Token::op(Op::Assign), Token::literal(1i64)];
        assert_eq!(assignment_split(&plain), Some((1, 2)));

        let indexed = vec![
            Token::ident("x"),
            Token::structural(Structural::LeftBracket),
            Token::literal(2i64),
            Token::structural(Structural::RightBracket),
            Token::op(Op::Assign),
            Token::literal(5i64),
        ];
        assert_eq!(assignment_split(&indexed), Some((4, 5)));

        let call = vec![Token::ident("f"), Token::literal(1i64)];
        assert_eq!(assignment_split(&call), None);
    }
}
