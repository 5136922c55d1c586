//! Control-flow statements
//!
//! Block statements consult the load-time jump table and the context stack;
//! they never rescan the script. Conventions:
//!
//! - A taken `if`/`elseif`/`else` branch pushes an if-scope and marks the
//!   chain head as taken. Reaching a later branch of a taken chain pops the
//!   scope and jumps to the terminator.
//! - A loop statement re-entered from its `end` finds its own loop scope on
//!   top of the stack; that is how the first pass is told from later ones.
//! - `try` runs its body as a nested frame so a failure unwinds cleanly.

use crate::interpreter::context::{ContextId, Frame, FrameKind, LoopIter, ScopeKind};
use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::expressions::{matching_close, split_top_level};
use crate::interpreter::fork::SubContext;
use crate::interpreter::functions::UserFunction;
use crate::interpreter::jumps::{BlockKind, Jump, Program};
use crate::interpreter::selection::SelectionSet;
use crate::interpreter::statements::token_word;
use crate::interpreter::types::{
    ControlSignal, Keyword, Op, Statement, Structural, Token, TokenKind, Value,
};
use crate::interpreter::vm::Interpreter;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Parsed header of a `for` statement
enum ForClause<'a> {
    Counted {
        init: &'a [Token],
        cond: &'a [Token],
        step: &'a [Token],
    },
    Each {
        local: bool,
        var: String,
        source: &'a [Token],
    },
}

impl Interpreter {
    pub(crate) fn execute_flow(
        &mut self,
        program: &Arc<Program>,
        pc: usize,
        kw: Keyword,
        statement: &Statement,
    ) -> ScriptResult<ControlSignal> {
        let args = &statement.tokens()[1..];
        if self.check_only {
            return self.check_flow(program, pc, kw, args);
        }
        let Some(frame_id) = self.stack.current_frame_id() else {
            return Err(ScriptError::bad_context(kw.name()));
        };

        match kw {
            Keyword::If => {
                let jump = jump_at(program, pc, kw)?;
                // a loop may come back to a chain left by break or continue
                if let Some(frame) = self.stack.frame_mut(frame_id) {
                    frame.set_taken(pc, false);
                }
                self.enter_branch(frame_id, pc, Some(args), jump)
            }
            Keyword::ElseIf => {
                let jump = jump_at(program, pc, kw)?;
                self.enter_branch(frame_id, jump.head, Some(args), jump)
            }
            Keyword::Else => {
                let jump = jump_at(program, pc, kw)?;
                self.enter_branch(frame_id, jump.head, None, jump)
            }
            Keyword::EndIf => {
                let jump = jump_at(program, pc, kw)?;
                self.close_if(frame_id, jump.head);
                Ok(ControlSignal::Continue)
            }
            Keyword::For => {
                let jump = jump_at(program, pc, kw)?;
                self.flow_for(pc, jump, for_clause(args)?)
            }
            Keyword::While => {
                let jump = jump_at(program, pc, kw)?;
                if !self.stack.top_is_scope(ScopeKind::Loop, pc) {
                    self.stack.push_scope(ScopeKind::Loop, pc)?;
                }
                self.loop_test(args, jump)
            }
            Keyword::End => {
                let jump = jump_at(program, pc, kw)?;
                Ok(match jump.block {
                    BlockKind::For | BlockKind::While => ControlSignal::Goto(jump.head),
                    BlockKind::If => {
                        self.close_if(frame_id, jump.head);
                        ControlSignal::Continue
                    }
                    BlockKind::Catch => {
                        if self.stack.top_is_scope(ScopeKind::Catch, jump.head) {
                            self.stack.pop(true);
                        }
                        ControlSignal::Continue
                    }
                    BlockKind::Function | BlockKind::Fork | BlockKind::Try => ControlSignal::Continue,
                })
            }
            Keyword::Break => Ok(ControlSignal::Break(self.loop_count(args)?)),
            Keyword::Continue => Ok(ControlSignal::ContinueLoop(self.loop_count(args)?)),
            Keyword::Goto => self.flow_goto(program, pc, args),
            Keyword::Label => Ok(ControlSignal::Continue),
            Keyword::Function | Keyword::Parallel => {
                let jump = jump_at(program, pc, kw)?;
                self.define_function(program, pc, jump, kw == Keyword::Parallel, args)
            }
            Keyword::Return => {
                let value = if args.is_empty() {
                    Value::empty()
                } else {
                    self.evaluate(args)?
                };
                Ok(ControlSignal::Return(value))
            }
            Keyword::Fork => {
                let jump = jump_at(program, pc, kw)?;
                self.queue_fork(program, frame_id, pc, jump, args);
                Ok(ControlSignal::Goto(jump.end + 1))
            }
            Keyword::Join => {
                self.join_pending(frame_id)?;
                Ok(ControlSignal::Continue)
            }
            Keyword::Try => {
                let jump = jump_at(program, pc, kw)?;
                self.flow_try(program, frame_id, pc, jump)
            }
            Keyword::Catch => {
                // reached without an error: the try body succeeded
                let jump = jump_at(program, pc, kw)?;
                Ok(ControlSignal::Goto(jump.end + 1))
            }
            Keyword::Exit | Keyword::Quit => Ok(ControlSignal::Exit),
            other => Err(ScriptError::new(ErrorKind::UnrecognizedCommand).detail(other.name())),
        }
    }

    /* ===================== If Chains ===================== */

    /// Evaluate one branch of an if-chain whose head is `head`
    fn enter_branch(
        &mut self,
        frame_id: ContextId,
        head: usize,
        cond: Option<&[Token]>,
        jump: Jump,
    ) -> ScriptResult<ControlSignal> {
        if self.stack.frame(frame_id).is_some_and(|f| f.is_taken(head)) {
            // an earlier branch ran; leave the chain
            self.close_if(frame_id, head);
            return Ok(ControlSignal::Goto(jump.end));
        }

        let taken = match cond {
            Some([]) => return Err(ScriptError::new(ErrorKind::ExpressionExpected).detail("if")),
            Some(tokens) => self.evaluate_condition(tokens)?,
            None => true,
        };
        if !taken {
            return Ok(ControlSignal::Goto(jump.next.unwrap_or(jump.end)));
        }
        if let Some(frame) = self.stack.frame_mut(frame_id) {
            frame.set_taken(head, true);
        }
        self.stack.push_scope(ScopeKind::If, head)?;
        Ok(ControlSignal::Continue)
    }

    fn close_if(&mut self, frame_id: ContextId, head: usize) {
        if self.stack.top_is_scope(ScopeKind::If, head) {
            self.stack.pop(true);
        }
        if let Some(frame) = self.stack.frame_mut(frame_id) {
            frame.set_taken(head, false);
        }
    }

    /* ===================== Loops ===================== */

    fn flow_for(&mut self, pc: usize, jump: Jump, clause: ForClause<'_>) -> ScriptResult<ControlSignal> {
        let reentry = self.stack.top_is_scope(ScopeKind::Loop, pc);
        match clause {
            ForClause::Counted { init, cond, step } => {
                if reentry {
                    self.run_clause(step)?;
                } else {
                    self.stack.push_scope(ScopeKind::Loop, pc)?;
                    self.run_clause(init)?;
                }
                self.loop_test(cond, jump)
            }
            ForClause::Each { local, var, source } => {
                if !reentry {
                    let items = self.iteration_items(source)?;
                    let scope = self.stack.push_scope(ScopeKind::Loop, pc)?;
                    if let Some(ctx) = self.stack.get_mut(scope) {
                        ctx.loop_iter = Some(LoopIter { var, local, items });
                    }
                }
                self.advance_each(jump)
            }
        }
    }

    /// Evaluate a loop condition; a false result leaves the loop
    fn loop_test(&mut self, cond: &[Token], jump: Jump) -> ScriptResult<ControlSignal> {
        if self.evaluate_condition(cond)? {
            return Ok(ControlSignal::Continue);
        }
        self.stack.pop(true);
        Ok(ControlSignal::Goto(jump.end + 1))
    }

    fn advance_each(&mut self, jump: Jump) -> ScriptResult<ControlSignal> {
        let next = self.stack.current_mut().and_then(|ctx| {
            let iter = ctx.loop_iter.as_mut()?;
            let item = iter.items.pop_front()?;
            Some((iter.var.clone(), iter.local, item))
        });
        match next {
            Some((var, true, item)) => self.declare_variable(&var, item)?,
            Some((var, false, item)) => self.assign_variable(&var, item)?,
            None => {
                self.stack.pop(true);
                return Ok(ControlSignal::Goto(jump.end + 1));
            }
        }
        Ok(ControlSignal::Continue)
    }

    /// Members of a set (as single-member sets) or elements of a list
    fn iteration_items(&mut self, source: &[Token]) -> ScriptResult<VecDeque<Value>> {
        match self.evaluate(source)? {
            Value::Set(set) => Ok(set
                .indices()
                .map(|idx| Value::Set(SelectionSet::from_indices(set.flavor(), set.universe_len(), [idx])))
                .collect()),
            Value::List(items) => Ok(items.into()),
            other => Err(ScriptError::invalid_argument(format!(
                "cannot iterate over {}",
                other.type_name()
            ))),
        }
    }

    /// Run a `for` init or step clause: `var x = e`, `x = e`, or a bare expression
    fn run_clause(&mut self, tokens: &[Token]) -> ScriptResult<()> {
        let Some(first) = tokens.first() else {
            return Ok(());
        };
        let (declare, rest) = if first.is_keyword(Keyword::Var) {
            (true, &tokens[1..])
        } else {
            (false, tokens)
        };
        let name = rest.first().filter(|t| t.kind == TokenKind::Identifier).and_then(|t| t.name());
        match (name, rest.get(1)) {
            (Some(name), Some(eq)) if eq.is_op(Op::Assign) => {
                let name = name.to_string();
                let value = self.evaluate(&rest[2..])?;
                if declare {
                    self.declare_variable(&name, value)
                } else {
                    self.assign_variable(&name, value)
                }
            }
            (Some(name), None) if declare => {
                let name = name.to_string();
                self.declare_variable(&name, Value::empty())
            }
            _ => self.evaluate(rest).map(|_| ()),
        }
    }

    fn loop_count(&mut self, args: &[Token]) -> ScriptResult<usize> {
        if args.is_empty() {
            return Ok(1);
        }
        match self.evaluate(args)?.as_int() {
            Some(n) if n >= 1 => Ok(n as usize),
            _ => Err(ScriptError::new(ErrorKind::IntegerExpected).detail("loop count must be 1 or more")),
        }
    }

    /// Pop to the `n`th loop scope of this frame and go back to its head
    ///
    /// A try frame without enough loops hands the remaining count to the
    /// frame around it.
    pub(crate) fn continue_loop(&mut self, frame_id: ContextId, n: usize) -> ScriptResult<ControlSignal> {
        for remaining in (1..=n).rev() {
            let Some(scope) = self.stack.innermost_scope(frame_id, ScopeKind::Loop) else {
                return match self.stack.frame(frame_id).map(|f| f.kind) {
                    Some(FrameKind::Try) => Ok(ControlSignal::ContinueLoop(remaining)),
                    _ => Err(ScriptError::bad_context("continue")),
                };
            };
            if remaining > 1 {
                self.stack.truncate_through(scope);
                continue;
            }
            let head = self.stack.get(scope).and_then(|c| c.head);
            while self.stack.depth() > scope + 1 {
                self.stack.pop(true);
            }
            if let Some(head) = head {
                return Ok(ControlSignal::Goto(head));
            }
        }
        Err(ScriptError::bad_context("continue"))
    }

    /* ===================== Goto ===================== */

    fn flow_goto(&mut self, program: &Arc<Program>, pc: usize, args: &[Token]) -> ScriptResult<ControlSignal> {
        let Some(label) = args.first().and_then(token_word) else {
            return Err(ScriptError::new(ErrorKind::StringOrIdentifierExpected).detail("goto"));
        };
        let Some(target) = program.jumps.label(&label) else {
            return Err(ScriptError::invalid_argument(format!("label {} not found", label)));
        };
        if !program
            .jumps
            .goto_allowed(pc, target, self.runtime.settings.goto_strict)
        {
            return Err(ScriptError::bad_context("goto").detail(format!("label {} is in another block", label)));
        }
        Ok(ControlSignal::Goto(target))
    }

    /* ===================== Functions ===================== */

    fn define_function(
        &mut self,
        program: &Arc<Program>,
        pc: usize,
        jump: Jump,
        parallel: bool,
        args: &[Token],
    ) -> ScriptResult<ControlSignal> {
        let Some(name) = args.first().and_then(token_word) else {
            return Err(ScriptError::new(ErrorKind::StringOrIdentifierExpected).detail("function"));
        };
        let params = function_params(&args[1..])?;
        let body = program.script.slice(name.clone(), pc + 1, jump.end);
        let body = Program::load(body)?;
        self.runtime.functions.define(UserFunction {
            name,
            params,
            parallel,
            program: body,
        });
        Ok(ControlSignal::Goto(jump.end + 1))
    }

    /* ===================== Fork ===================== */

    fn queue_fork(&mut self, program: &Arc<Program>, frame_id: ContextId, pc: usize, jump: Jump, args: &[Token]) {
        let name = args.first().and_then(token_word).unwrap_or_else(|| {
            self.fork_seq += 1;
            format!("p{}", self.fork_seq)
        });
        let sub = SubContext::new(
            name,
            self.runtime.clone(),
            program.clone(),
            pc + 1,
            jump.end,
            self.stack.visible_bindings(),
        )
        .capture_output(self.is_capturing());
        debug!(fork = %sub.name, start = pc + 1, end = jump.end, "fork queued");
        if let Some(frame) = self.stack.frame_mut(frame_id) {
            frame.pending_forks.push(sub);
        }
    }

    /* ===================== Try / Catch ===================== */

    fn flow_try(
        &mut self,
        program: &Arc<Program>,
        frame_id: ContextId,
        pc: usize,
        jump: Jump,
    ) -> ScriptResult<ControlSignal> {
        let after = jump.end + 1;
        let catch = program
            .script
            .statement(after)
            .filter(|s| s.keyword() == Some(Keyword::Catch))
            .and_then(|_| program.jumps.get(after).copied());
        let parallel = self.stack.frame(frame_id).is_some_and(|f| f.parallel);

        let frame = Frame::new(FrameKind::Try, program.clone(), pc + 1, jump.end).parallel(parallel);
        self.stack.push_frame(frame, self.check_only)?;
        let outcome = self.dispatch();
        self.stack.pop(false);

        let err = match outcome {
            Ok(ControlSignal::Continue) | Ok(ControlSignal::Goto(_)) => {
                let resume = catch.map(|c| c.end + 1).unwrap_or(after);
                return Ok(ControlSignal::Goto(resume));
            }
            Ok(signal) => return Ok(signal),
            Err(err) => err,
        };
        if self.should_stop() {
            return Err(err);
        }

        warn!(kind = %err.kind, "caught script error: {}", err.message);
        let Some(catch) = catch else {
            return Ok(ControlSignal::Goto(after));
        };
        self.stack.push_scope(ScopeKind::Catch, catch.head)?;
        let var = program
            .script
            .statement(catch.head)
            .and_then(|s| s.tokens()[1..].iter().find(|t| t.kind == TokenKind::Identifier))
            .and_then(|t| t.name())
            .map(str::to_string);
        if let Some(var) = var {
            self.declare_variable(&var, Value::Str(err.message.clone()))?;
        }
        Ok(ControlSignal::Goto(catch.head + 1))
    }

    /* ===================== Syntax Check ===================== */

    /// Check mode walks every statement in order; flow statements only
    /// validate the expressions they carry
    fn check_flow(
        &mut self,
        program: &Arc<Program>,
        pc: usize,
        kw: Keyword,
        args: &[Token],
    ) -> ScriptResult<ControlSignal> {
        match kw {
            Keyword::If | Keyword::ElseIf | Keyword::While => {
                if args.is_empty() {
                    return Err(ScriptError::new(ErrorKind::ExpressionExpected).detail(kw.name()));
                }
                self.evaluate(args)?;
            }
            Keyword::For => match for_clause(args)? {
                ForClause::Counted { init, cond, step } => {
                    self.run_clause(init)?;
                    self.evaluate_condition(cond)?;
                    self.run_clause(step)?;
                }
                ForClause::Each { source, .. } => {
                    self.evaluate(source)?;
                }
            },
            Keyword::Return | Keyword::Break | Keyword::Continue if !args.is_empty() => {
                self.evaluate(args)?;
            }
            Keyword::Goto => {
                let label = args.first().and_then(token_word).unwrap_or_default();
                if program.jumps.label(&label).is_none() {
                    return Err(ScriptError::invalid_argument(format!("label {} not found", label)));
                }
            }
            Keyword::Function | Keyword::Parallel => {
                // registered so later calls resolve; the body is still walked
                let jump = jump_at(program, pc, kw)?;
                self.define_function(program, pc, jump, kw == Keyword::Parallel, args)?;
            }
            _ => {}
        }
        Ok(ControlSignal::Continue)
    }
}

fn jump_at(program: &Program, pc: usize, kw: Keyword) -> ScriptResult<Jump> {
    program
        .jumps
        .get(pc)
        .copied()
        .ok_or_else(|| ScriptError::with_params(ErrorKind::MissingEnd, [kw.name()]))
}

/// `(a, b, c)` after a function name
fn function_params(tokens: &[Token]) -> ScriptResult<Vec<String>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let inner = strip_parens(tokens).ok_or_else(|| {
        ScriptError::invalid_argument("function parameters must be in parentheses")
    })?;
    split_top_level(inner)
        .into_iter()
        .map(|param| match param {
            [t] if t.kind == TokenKind::Identifier => Ok(t.name().unwrap_or_default().to_lowercase()),
            _ => Err(ScriptError::new(ErrorKind::StringOrIdentifierExpected).detail("parameter name")),
        })
        .collect()
}

fn strip_parens(tokens: &[Token]) -> Option<&[Token]> {
    let first = tokens.first()?;
    if first.is_structural(Structural::LeftParen) && matching_close(tokens, 0) == Some(tokens.len() - 1) {
        Some(&tokens[1..tokens.len() - 1])
    } else {
        None
    }
}

fn for_clause(args: &[Token]) -> ScriptResult<ForClause<'_>> {
    let inner = strip_parens(args).unwrap_or(args);

    let mut parts: Vec<&[Token]> = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in inner.iter().enumerate() {
        match token.kind {
            TokenKind::Structural(Structural::LeftParen | Structural::LeftBracket | Structural::LeftBrace) => depth += 1,
            TokenKind::Structural(Structural::RightParen | Structural::RightBracket | Structural::RightBrace) => depth -= 1,
            TokenKind::Structural(Structural::Semicolon) if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !parts.is_empty() {
        parts.push(&inner[start..]);
        let [init, cond, step] = parts[..] else {
            return Err(ScriptError::invalid_argument("for needs init; condition; step"));
        };
        return Ok(ForClause::Counted { init, cond, step });
    }

    let Some(in_at) = inner.iter().position(|t| t.is_keyword(Keyword::In)) else {
        return Err(ScriptError::invalid_argument("for needs ; clauses or in"));
    };
    let (local, target) = match &inner[..in_at] {
        [v, t] if v.is_keyword(Keyword::Var) => (true, t),
        [t] => (false, t),
        _ => return Err(ScriptError::invalid_argument("for ... in needs one variable")),
    };
    let Some(var) = target.name().filter(|_| target.kind == TokenKind::Identifier) else {
        return Err(ScriptError::new(ErrorKind::StringOrIdentifierExpected).detail("for"));
    };
    Ok(ForClause::Each {
        local,
        var: var.to_string(),
        source: &inner[in_at + 1..],
    })
}
