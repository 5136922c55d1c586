//! Compiled script representation
//!
//! The compiler hands the interpreter a [`CompiledScript`]: statements made of
//! [`Token`]s plus line and source-offset maps. Nothing here is mutated after
//! load; per-run state (branch-taken marks, loop iterators) lives in the
//! execution contexts.

use super::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/* ===================== Token Kinds ===================== */

/// Expression and statement operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// `=`: assignment at statement level, equality inside expressions
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    /// `\`: integer division
    IntDiv,
    Mod,
    Pow,
    Neg,
    Not,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Assign => "=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::IntDiv => "\\",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::Neg => "-",
            Op::Not => "!",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Assign
        )
    }
}

/// Command and control-flow keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    If,
    ElseIf,
    Else,
    EndIf,
    For,
    In,
    While,
    End,
    Break,
    Continue,
    Goto,
    Label,
    Function,
    Parallel,
    Return,
    Fork,
    Join,
    Try,
    Catch,
    Exit,
    Quit,
    Set,
    Var,
    Print,
    Echo,
    Select,
    Define,
    Pause,
    Resume,
    Delay,
    Script,
}

impl Keyword {
    pub fn name(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::ElseIf => "elseif",
            Keyword::Else => "else",
            Keyword::EndIf => "endif",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::While => "while",
            Keyword::End => "end",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Goto => "goto",
            Keyword::Label => "label",
            Keyword::Function => "function",
            Keyword::Parallel => "parallel",
            Keyword::Return => "return",
            Keyword::Fork => "fork",
            Keyword::Join => "join",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Exit => "exit",
            Keyword::Quit => "quit",
            Keyword::Set => "set",
            Keyword::Var => "var",
            Keyword::Print => "print",
            Keyword::Echo => "echo",
            Keyword::Select => "select",
            Keyword::Define => "define",
            Keyword::Pause => "pause",
            Keyword::Resume => "resume",
            Keyword::Delay => "delay",
            Keyword::Script => "script",
        }
    }

    /// Keywords handled by the control-flow manager
    pub fn is_flow(self) -> bool {
        matches!(
            self,
            Keyword::If
                | Keyword::ElseIf
                | Keyword::Else
                | Keyword::EndIf
                | Keyword::For
                | Keyword::While
                | Keyword::End
                | Keyword::Break
                | Keyword::Continue
                | Keyword::Goto
                | Keyword::Label
                | Keyword::Function
                | Keyword::Parallel
                | Keyword::Return
                | Keyword::Fork
                | Keyword::Join
                | Keyword::Try
                | Keyword::Catch
                | Keyword::Exit
                | Keyword::Quit
        )
    }
}

/// Punctuation tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Structural {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    /// `{`: opens a selection expression
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
}

impl Structural {
    pub fn symbol(self) -> &'static str {
        match self {
            Structural::LeftParen => "(",
            Structural::RightParen => ")",
            Structural::LeftBracket => "[",
            Structural::RightBracket => "]",
            Structural::LeftBrace => "{",
            Structural::RightBrace => "}",
            Structural::Comma => ",",
            Structural::Semicolon => ";",
        }
    }
}

bitflags::bitflags! {
    /// Aggregation modifiers carried by a property token
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyModifiers: u32 {
        const MIN = 1 << 0;
        const MAX = 1 << 1;
        const SUM = 1 << 2;
        const STDDEV = 1 << 3;
        const AVERAGE = 1 << 4;
        /// Per-item list instead of an aggregate
        const ALL = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum TokenKind {
    Literal,
    Identifier,
    Operator(Op),
    Keyword(Keyword),
    /// Host command word
    Command,
    /// Particle or bond property; the integer payload holds modifier bits
    Property,
    /// `all`, `none`, or a named set
    Selector,
    Structural(Structural),
    /// `@name` or `@{expr}`
    Substitution,
}

/// Object payload of a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum TokenValue {
    Literal(Value),
    Name(String),
    Tokens(Vec<Token>),
}

/* ===================== Token ===================== */

/// One compiled unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Compile-time jump target for block keywords, modifier bits for properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TokenValue>,
}

impl Token {
    fn bare(kind: TokenKind) -> Self {
        Token {
            kind,
            int_value: None,
            value: None,
        }
    }

    fn named(kind: TokenKind, name: impl Into<String>) -> Self {
        Token {
            kind,
            int_value: None,
            value: Some(TokenValue::Name(name.into())),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Token {
            kind: TokenKind::Literal,
            int_value: None,
            value: Some(TokenValue::Literal(value.into())),
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::named(TokenKind::Identifier, name)
    }

    pub fn op(op: Op) -> Self {
        Self::bare(TokenKind::Operator(op))
    }

    pub fn keyword(kw: Keyword) -> Self {
        Self::bare(TokenKind::Keyword(kw))
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::named(TokenKind::Command, name)
    }

    pub fn property(name: impl Into<String>, modifiers: PropertyModifiers) -> Self {
        let mut token = Self::named(TokenKind::Property, name);
        if !modifiers.is_empty() {
            token.int_value = Some(modifiers.bits() as i32);
        }
        token
    }

    pub fn selector(name: impl Into<String>) -> Self {
        Self::named(TokenKind::Selector, name)
    }

    pub fn structural(s: Structural) -> Self {
        Self::bare(TokenKind::Structural(s))
    }

    pub fn substitute_name(name: impl Into<String>) -> Self {
        Self::named(TokenKind::Substitution, name)
    }

    pub fn substitute_expr(tokens: Vec<Token>) -> Self {
        Token {
            kind: TokenKind::Substitution,
            int_value: None,
            value: Some(TokenValue::Tokens(tokens)),
        }
    }

    /// Attach a compiler-provided jump target
    pub fn with_jump(mut self, target: i32) -> Self {
        self.int_value = Some(target);
        self
    }

    pub fn name(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn literal_value(&self) -> Option<&Value> {
        match &self.value {
            Some(TokenValue::Literal(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }

    pub fn is_structural(&self, s: Structural) -> bool {
        self.kind == TokenKind::Structural(s)
    }

    pub fn is_op(&self, op: Op) -> bool {
        self.kind == TokenKind::Operator(op)
    }

    pub fn modifiers(&self) -> PropertyModifiers {
        match (self.kind, self.int_value) {
            (TokenKind::Property, Some(bits)) => PropertyModifiers::from_bits_truncate(bits as u32),
            _ => PropertyModifiers::empty(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Literal => match self.literal_value() {
                Some(Value::Str(s)) => write!(f, "\"{}\"", s),
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
            TokenKind::Operator(op) => write!(f, "{}", op.symbol()),
            TokenKind::Keyword(kw) => write!(f, "{}", kw.name()),
            TokenKind::Structural(s) => write!(f, "{}", s.symbol()),
            TokenKind::Property => {
                write!(f, "{}", self.name().unwrap_or_default())?;
                for (name, _) in self.modifiers().iter_names() {
                    write!(f, ".{}", name.to_lowercase())?;
                }
                Ok(())
            }
            TokenKind::Substitution => match &self.value {
                Some(TokenValue::Tokens(tokens)) => {
                    let inner: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
                    write!(f, "@{{{}}}", inner.join(" "))
                }
                _ => write!(f, "@{}", self.name().unwrap_or_default()),
            },
            TokenKind::Identifier | TokenKind::Command | TokenKind::Selector => {
                write!(f, "{}", self.name().unwrap_or_default())
            }
        }
    }
}

/* ===================== Statements ===================== */

/// Ordered tokens of one command; the first token is the command word
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statement {
    tokens: Vec<Token>,
}

impl Statement {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx)
    }

    pub fn keyword(&self) -> Option<Keyword> {
        self.tokens.first().and_then(Token::as_keyword)
    }

    pub fn has_substitution(&self) -> bool {
        self.tokens.iter().any(|t| t.kind == TokenKind::Substitution)
    }

    /// Copy with the leading keyword's jump payload shifted down by `offset`
    fn rebased(&self, offset: usize) -> Statement {
        let mut copy = self.clone();
        if let Some(first) = copy.tokens.first_mut() {
            if let (TokenKind::Keyword(_), Some(target)) = (first.kind, first.int_value) {
                let shifted = (target.unsigned_abs() as usize).saturating_sub(offset) as i32;
                first.int_value = Some(if target < 0 { -shifted } else { shifted });
            }
        }
        copy
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.tokens.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Compiler output: statements plus line and source-offset maps
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompiledScript {
    /// File or function name, used in diagnostics
    pub name: String,
    #[serde(default)]
    pub source: String,
    pub statements: Vec<Statement>,
    /// 1-based source line per statement
    #[serde(default)]
    pub lines: Vec<u32>,
    /// `[start, end)` byte span of each statement in `source`
    #[serde(default)]
    pub offsets: Vec<(usize, usize)>,
}

impl CompiledScript {
    pub fn new(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            statements,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, idx: usize) -> Option<&Statement> {
        self.statements.get(idx)
    }

    pub fn line(&self, idx: usize) -> u32 {
        self.lines.get(idx).copied().unwrap_or(idx as u32 + 1)
    }

    /// Source text of a statement, falling back to its tokens
    pub fn text(&self, idx: usize) -> String {
        if let Some(text) = self
            .offsets
            .get(idx)
            .and_then(|&(start, end)| self.source.get(start..end))
        {
            return text.trim().to_string();
        }
        self.statement(idx).map(|s| s.to_string()).unwrap_or_default()
    }

    /// Copy statements `[start, end)` into a standalone script
    pub fn slice(&self, name: impl Into<String>, start: usize, end: usize) -> CompiledScript {
        let end = end.min(self.statements.len());
        let start = start.min(end);
        let pick = |v: &[u32]| v.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        CompiledScript {
            name: name.into(),
            source: self.source.clone(),
            statements: self.statements[start..end]
                .iter()
                .map(|s| s.rebased(start))
                .collect(),
            lines: pick(&self.lines),
            offsets: self
                .offsets
                .get(start..end)
                .map(|s| s.to_vec())
                .unwrap_or_default(),
        }
    }
}
