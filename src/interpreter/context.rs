//! Execution contexts
//!
//! Contexts live in an arena ([`ContextStack`]) and refer to their parent by
//! index. Two shapes share the arena:
//!
//! - **Frames** (script, function, try, fork, interrupt) own a statement
//!   array and a program counter.
//! - **Scopes** (if, loop, catch) only hold variables and loop state; they
//!   run on the program counter of the frame that owns them.
//!
//! Variable lookup walks the parent chain innermost first. The depth limit
//! counts frames only, so deeply nested blocks never trip it.

use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult, TraceFrame};
use crate::interpreter::fork::SubContext;
use crate::interpreter::jumps::Program;
use crate::interpreter::types::Value;
use bitvec::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Index of a context inside the arena
pub type ContextId = usize;

/* ===================== Kinds ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Script,
    Function,
    Try,
    Fork,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    If,
    Loop,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Frame(FrameKind),
    Scope(ScopeKind),
}

/// Diagnostic flags mirrored onto each context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    pub check_only: bool,
    pub paused: bool,
    pub stepping: bool,
}

/* ===================== Frame ===================== */

/// Position data owned by a frame context
#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub program: Arc<Program>,
    pub pc: usize,
    pub start: usize,
    /// Exclusive end of the statement range this frame runs
    pub end: usize,
    /// Branch-taken mark per if-chain head
    pub taken: BitVec<u64, Lsb0>,
    pub return_slot: Option<Value>,
    /// Captured output; `None` forwards to the enclosing sink or the host
    pub output: Option<Vec<String>>,
    pub function: Option<String>,
    /// Whether fork batches from this frame go to the parallel executor
    pub parallel: bool,
    pub pending_forks: Vec<SubContext>,
}

impl Frame {
    pub fn new(kind: FrameKind, program: Arc<Program>, start: usize, end: usize) -> Self {
        let len = program.len();
        Frame {
            kind,
            program,
            pc: start,
            start,
            end: end.min(len),
            taken: bitvec![u64, Lsb0; 0; len],
            return_slot: None,
            output: None,
            function: None,
            parallel: false,
            pending_forks: Vec::new(),
        }
    }

    /// Frame spanning a whole program
    pub fn whole(kind: FrameKind, program: Arc<Program>) -> Self {
        let len = program.len();
        Self::new(kind, program, 0, len)
    }

    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn capture_output(mut self) -> Self {
        self.output = Some(Vec::new());
        self
    }

    pub fn is_taken(&self, head: usize) -> bool {
        self.taken.get(head).map(|b| *b).unwrap_or(false)
    }

    pub fn set_taken(&mut self, head: usize, taken: bool) {
        if head < self.taken.len() {
            self.taken.set(head, taken);
        }
    }

    /// Diagnostic snapshot of the active statement
    pub fn snapshot(&self) -> TraceFrame {
        let script = &self.program.script;
        let pc = self.pc.min(script.len().saturating_sub(1));
        TraceFrame {
            function: self.function.clone(),
            file: (!script.name.is_empty()).then(|| script.name.clone()),
            line: script.line(pc),
            command: pc + 1,
            text: script.text(pc),
        }
    }
}

/* ===================== Loop State ===================== */

/// Remaining items of a set or list iteration
#[derive(Debug, Clone, PartialEq)]
pub struct LoopIter {
    pub var: String,
    /// Declare the variable in the loop scope instead of assigning it
    pub local: bool,
    pub items: VecDeque<Value>,
}

/* ===================== Execution Context ===================== */

#[derive(Debug)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    /// Frame whose program counter this context runs on
    pub frame_id: ContextId,
    pub kind: ContextKind,
    vars: HashMap<String, Value>,
    pub frame: Option<Frame>,
    /// Statement that opened a scope
    pub head: Option<usize>,
    pub loop_iter: Option<LoopIter>,
    pub flags: ContextFlags,
}

impl ExecutionContext {
    pub fn is_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub fn is_scope(&self, kind: ScopeKind) -> bool {
        self.kind == ContextKind::Scope(kind)
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn into_vars(self) -> HashMap<String, Value> {
        self.vars
    }
}

/* ===================== Context Stack ===================== */

/// Push/pop counters, used to verify stack discipline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackStats {
    pub pushes: usize,
    pub pops: usize,
    pub max_frames: usize,
}

#[derive(Debug)]
pub struct ContextStack {
    contexts: Vec<ExecutionContext>,
    max_frames: usize,
    frames: usize,
    stats: StackStats,
}

impl ContextStack {
    pub fn new(max_frames: usize) -> Self {
        ContextStack {
            contexts: Vec::new(),
            max_frames: max_frames.max(1),
            frames: 0,
            stats: StackStats::default(),
        }
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// Number of frames (script levels) on the stack
    pub fn frame_depth(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn stats(&self) -> StackStats {
        self.stats
    }

    pub fn push_frame(&mut self, frame: Frame, check_only: bool) -> ScriptResult<ContextId> {
        if self.frames >= self.max_frames {
            return Err(ScriptError::new(ErrorKind::TooManyScriptLevels)
                .detail(format!("limit is {}", self.max_frames)));
        }
        let id = self.contexts.len();
        debug!(id, kind = ?frame.kind, function = ?frame.function, "push frame");
        self.contexts.push(ExecutionContext {
            id,
            parent: id.checked_sub(1),
            frame_id: id,
            kind: ContextKind::Frame(frame.kind),
            vars: HashMap::new(),
            frame: Some(frame),
            head: None,
            loop_iter: None,
            flags: ContextFlags {
                check_only,
                ..Default::default()
            },
        });
        self.frames += 1;
        self.stats.pushes += 1;
        self.stats.max_frames = self.stats.max_frames.max(self.frames);
        Ok(id)
    }

    /// Open a block scope on the current frame
    pub fn push_scope(&mut self, kind: ScopeKind, head: usize) -> ScriptResult<ContextId> {
        let Some(top) = self.contexts.last() else {
            return Err(ScriptError::bad_context("block outside of a script"));
        };
        let id = self.contexts.len();
        let (frame_id, flags) = (top.frame_id, top.flags);
        self.contexts.push(ExecutionContext {
            id,
            parent: Some(id - 1),
            frame_id,
            kind: ContextKind::Scope(kind),
            vars: HashMap::new(),
            frame: None,
            head: Some(head),
            loop_iter: None,
            flags,
        });
        self.stats.pushes += 1;
        Ok(id)
    }

    /// Pop the top context; with `scoped_only` a frame is left in place
    pub fn pop(&mut self, scoped_only: bool) -> Option<ExecutionContext> {
        if scoped_only && self.contexts.last().is_some_and(|c| c.is_frame()) {
            return None;
        }
        let ctx = self.contexts.pop()?;
        if ctx.is_frame() {
            self.frames -= 1;
            debug!(id = ctx.id, kind = ?ctx.kind, "pop frame");
        }
        self.stats.pops += 1;
        Some(ctx)
    }

    /// Pop every scope above `frame_id`
    pub fn unwind_scopes(&mut self, frame_id: ContextId) {
        while self.contexts.len() > frame_id + 1 {
            if self.pop(true).is_none() {
                break;
            }
        }
    }

    /// Pop contexts down to and including `id`
    pub fn truncate_through(&mut self, id: ContextId) {
        while self.contexts.len() > id {
            if self.pop(false).is_none() {
                break;
            }
        }
    }

    pub fn current(&self) -> Option<&ExecutionContext> {
        self.contexts.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.contexts.last_mut()
    }

    pub fn current_frame_id(&self) -> Option<ContextId> {
        self.contexts.last().map(|c| c.frame_id)
    }

    pub fn get(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.contexts.get(id)
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut ExecutionContext> {
        self.contexts.get_mut(id)
    }

    pub fn frame(&self, id: ContextId) -> Option<&Frame> {
        self.contexts.get(id).and_then(|c| c.frame.as_ref())
    }

    pub fn frame_mut(&mut self, id: ContextId) -> Option<&mut Frame> {
        self.contexts.get_mut(id).and_then(|c| c.frame.as_mut())
    }

    /// Contexts from innermost to outermost, following parent links
    pub fn chain(&self) -> impl Iterator<Item = &ExecutionContext> + '_ {
        let mut next = self.contexts.len().checked_sub(1);
        std::iter::from_fn(move || {
            let ctx = self.contexts.get(next?)?;
            next = ctx.parent;
            Some(ctx)
        })
    }

    /// Frames from innermost to outermost
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.chain().filter_map(|c| c.frame.as_ref())
    }

    /// Innermost scope of `kind` that belongs to `frame_id`
    pub fn innermost_scope(&self, frame_id: ContextId, kind: ScopeKind) -> Option<ContextId> {
        self.chain()
            .take_while(|c| c.id > frame_id)
            .find(|c| c.is_scope(kind))
            .map(|c| c.id)
    }

    /// Top context is a scope of `kind` opened at `head`
    pub fn top_is_scope(&self, kind: ScopeKind, head: usize) -> bool {
        self.contexts
            .last()
            .is_some_and(|c| c.is_scope(kind) && c.head == Some(head))
    }

    /* ===================== Variables ===================== */

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let key = name.to_lowercase();
        self.chain().find_map(|c| c.vars.get(&key))
    }

    /// Write to the innermost context that already binds `name`, otherwise
    /// create it in the innermost frame
    pub fn assign(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        let key = name.to_lowercase();
        let owner = self
            .chain()
            .find(|c| c.vars.contains_key(&key))
            .or_else(|| self.chain().find(|c| c.is_frame()))
            .map(|c| c.id);
        let Some(ctx) = owner.and_then(|id| self.contexts.get_mut(id)) else {
            return Err(ScriptError::bad_context("assignment outside of a script"));
        };
        ctx.vars.insert(key, value);
        Ok(())
    }

    /// Create `name` in the innermost context, shadowing outer bindings
    pub fn declare(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        let Some(ctx) = self.contexts.last_mut() else {
            return Err(ScriptError::bad_context("var outside of a script"));
        };
        ctx.vars.insert(name.to_lowercase(), value);
        Ok(())
    }

    /// Every visible binding, inner bindings shadowing outer ones
    pub fn visible_bindings(&self) -> HashMap<String, Value> {
        let chain: Vec<&ExecutionContext> = self.chain().collect();
        let mut out = HashMap::new();
        for ctx in chain.into_iter().rev() {
            for (k, v) in &ctx.vars {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}
