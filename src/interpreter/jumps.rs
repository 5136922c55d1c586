//! Load-time jump table
//!
//! Block keywords are paired once, when a script is loaded, into an immutable
//! [`JumpTable`]. The table answers "where is the matching terminator", "which
//! branch comes next in this if-chain", and "may a goto travel from here to
//! there". Compiled scripts are never touched afterwards, so one [`Program`]
//! can be shared by any number of runs and threads.

use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::types::{CompiledScript, Keyword, Statement, TokenKind, TokenValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/* ===================== Block Kinds ===================== */

/// Kind of block a keyword opens or closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    If,
    For,
    While,
    Function,
    Fork,
    Try,
    Catch,
}

impl BlockKind {
    fn opened_by(kw: Keyword) -> Option<BlockKind> {
        match kw {
            Keyword::If => Some(BlockKind::If),
            Keyword::For => Some(BlockKind::For),
            Keyword::While => Some(BlockKind::While),
            Keyword::Function | Keyword::Parallel => Some(BlockKind::Function),
            Keyword::Fork => Some(BlockKind::Fork),
            Keyword::Try => Some(BlockKind::Try),
            Keyword::Catch => Some(BlockKind::Catch),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
            BlockKind::While => "while",
            BlockKind::Function => "function",
            BlockKind::Fork => "fork",
            BlockKind::Try => "try",
            BlockKind::Catch => "catch",
        }
    }

    pub fn is_loop(self) -> bool {
        matches!(self, BlockKind::For | BlockKind::While)
    }
}

/// Jump data for one block statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jump {
    pub block: BlockKind,
    /// Index of the statement that opened the block (the `if` of a chain)
    pub head: usize,
    /// Next branch of an if-chain (`elseif`, `else`, or the terminator)
    pub next: Option<usize>,
    /// Index of the matching terminator
    pub end: usize,
}

/// How a statement changes block nesting, used by the goto balance check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Flat,
    Open,
    /// `elseif`/`else`: closes one branch and opens the next
    Middle,
    Close,
}

/* ===================== Jump Table ===================== */

#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    jumps: Vec<Option<Jump>>,
    nesting: Vec<Nesting>,
    labels: HashMap<String, usize>,
}

struct OpenBlock {
    block: BlockKind,
    head: usize,
    branches: Vec<usize>,
    seen_else: bool,
}

impl JumpTable {
    /// Pair every block keyword of `script` with its terminator
    pub fn build(script: &CompiledScript) -> ScriptResult<Self> {
        let len = script.len();
        let mut table = JumpTable {
            jumps: vec![None; len],
            nesting: vec![Nesting::Flat; len],
            labels: HashMap::new(),
        };
        let mut open: Vec<OpenBlock> = Vec::new();

        for (pc, stmt) in script.statements.iter().enumerate() {
            let Some(kw) = stmt.keyword() else { continue };
            match kw {
                Keyword::ElseIf | Keyword::Else => {
                    let Some(top) = open.last_mut().filter(|b| b.block == BlockKind::If) else {
                        return Err(ScriptError::bad_context(kw.name()).detail(script.text(pc)));
                    };
                    if top.seen_else {
                        return Err(ScriptError::bad_context(kw.name()).detail(script.text(pc)));
                    }
                    top.seen_else = kw == Keyword::Else;
                    top.branches.push(pc);
                    table.nesting[pc] = Nesting::Middle;
                }
                Keyword::EndIf => {
                    table.close(&mut open, BlockKind::If, pc, script)?;
                }
                Keyword::End => {
                    let closes = stmt
                        .get(1)
                        .and_then(|t| t.as_keyword())
                        .and_then(BlockKind::opened_by);
                    let Some(block) = closes.or_else(|| open.last().map(|b| b.block)) else {
                        return Err(ScriptError::bad_context("end").detail(script.text(pc)));
                    };
                    table.close(&mut open, block, pc, script)?;
                }
                Keyword::Label => {
                    if let Some(name) = label_name(stmt) {
                        table.labels.entry(name.to_lowercase()).or_insert(pc);
                    }
                }
                other => {
                    if let Some(block) = BlockKind::opened_by(other) {
                        open.push(OpenBlock {
                            block,
                            head: pc,
                            branches: Vec::new(),
                            seen_else: false,
                        });
                        table.nesting[pc] = Nesting::Open;
                    }
                }
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(ScriptError::with_params(
                ErrorKind::MissingEnd,
                [unclosed.block.name()],
            )
            .detail(script.text(unclosed.head)));
        }
        Ok(table)
    }

    fn close(
        &mut self,
        open: &mut Vec<OpenBlock>,
        block: BlockKind,
        end: usize,
        script: &CompiledScript,
    ) -> ScriptResult<()> {
        let Some(top) = open.pop() else {
            return Err(ScriptError::bad_context("end").detail(script.text(end)));
        };
        if top.block != block {
            return Err(
                ScriptError::with_params(ErrorKind::MissingEnd, [top.block.name()])
                    .detail(script.text(top.head)),
            );
        }

        check_compiler_target(script, top.head, end);

        let mut chain = vec![top.head];
        chain.extend(top.branches.iter().copied());
        for (i, &at) in chain.iter().enumerate() {
            let next = chain.get(i + 1).copied().unwrap_or(end);
            self.jumps[at] = Some(Jump {
                block,
                head: top.head,
                next: (block == BlockKind::If).then_some(next),
                end,
            });
        }
        self.jumps[end] = Some(Jump {
            block,
            head: top.head,
            next: None,
            end,
        });
        self.nesting[end] = Nesting::Close;
        Ok(())
    }

    pub fn get(&self, pc: usize) -> Option<&Jump> {
        self.jumps.get(pc).and_then(|j| j.as_ref())
    }

    /// Statement index of a label, case-insensitive
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_lowercase()).copied()
    }

    /// Whether a goto from `from` to `to` keeps block nesting balanced
    ///
    /// The net opener/closer delta along the path must be zero. With `strict`
    /// the path may also never leave the block the goto starts in, which
    /// rules out jumps between sibling blocks.
    pub fn goto_allowed(&self, from: usize, to: usize, strict: bool) -> bool {
        let mut depth: i32 = 0;
        let mut lowest: i32 = 0;
        let mut visit = |n: Nesting, forward: bool| {
            let (enter, leave) = if forward { (1, -1) } else { (-1, 1) };
            match n {
                Nesting::Flat => {}
                Nesting::Open => depth += enter,
                Nesting::Close => depth += leave,
                Nesting::Middle => {
                    depth -= 1;
                    lowest = lowest.min(depth);
                    depth += 1;
                }
            }
            lowest = lowest.min(depth);
        };

        if to > from {
            for pc in from + 1..to {
                visit(self.nesting[pc], true);
            }
        } else {
            for pc in (to..from).rev() {
                visit(self.nesting[pc], false);
            }
        }
        depth == 0 && (!strict || lowest >= 0)
    }
}

fn label_name(stmt: &Statement) -> Option<String> {
    let token = stmt.get(1)?;
    match (&token.kind, &token.value) {
        (TokenKind::Identifier, Some(TokenValue::Name(name))) => Some(name.clone()),
        (TokenKind::Literal, Some(TokenValue::Literal(value))) => Some(value.to_string()),
        _ => None,
    }
}

/// Compiler payloads are informational; the structural pairing wins
fn check_compiler_target(script: &CompiledScript, head: usize, end: usize) {
    let payload = script
        .statement(head)
        .and_then(|s| s.get(0))
        .and_then(|t| t.int_value);
    if let Some(target) = payload {
        if target.unsigned_abs() as usize != end {
            warn!(
                script = %script.name,
                head,
                end,
                target,
                "compiler jump target disagrees with block structure"
            );
        }
    }
}

/* ===================== Program ===================== */

/// A compiled script paired with its jump table
#[derive(Debug)]
pub struct Program {
    pub script: CompiledScript,
    pub jumps: JumpTable,
}

impl Program {
    pub fn load(script: CompiledScript) -> ScriptResult<Arc<Program>> {
        let jumps = JumpTable::build(&script)?;
        Ok(Arc::new(Program { script, jumps }))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.script.name
    }
}
