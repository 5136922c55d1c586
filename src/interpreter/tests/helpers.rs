//! Test helpers for interpreter tests
//!
//! Scripts are written one statement per line and assembled into tokens by a
//! small word splitter. It only knows what the tests need:
//!
//! - `"text"` string literals, integer and float literals, `true`/`false`
//! - `.name` is a particle property; `.name.max` adds modifiers
//! - `@name` is a substitution
//! - keywords are recognized as the first word, after `end`, and for `in`/`var`
//! - `all`/`none` are selectors; any other word is an identifier

use crate::interpreter::host::memory::PropertyRow;
use crate::interpreter::types::{
    CompiledScript, Keyword, Op, PropertyModifiers, Statement, Structural, Token, Value,
};
use crate::interpreter::vm::{Interpreter, RunOptions, RunReport};
use crate::interpreter::{FunctionRegistry, MemoryHost, ScriptResult};
use maplit::hashmap;
use std::sync::Arc;

const KEYWORDS: &[Keyword] = &[
    Keyword::If,
    Keyword::ElseIf,
    Keyword::Else,
    Keyword::EndIf,
    Keyword::For,
    Keyword::In,
    Keyword::While,
    Keyword::End,
    Keyword::Break,
    Keyword::Continue,
    Keyword::Goto,
    Keyword::Label,
    Keyword::Function,
    Keyword::Parallel,
    Keyword::Return,
    Keyword::Fork,
    Keyword::Join,
    Keyword::Try,
    Keyword::Catch,
    Keyword::Exit,
    Keyword::Quit,
    Keyword::Set,
    Keyword::Var,
    Keyword::Print,
    Keyword::Echo,
    Keyword::Select,
    Keyword::Define,
    Keyword::Pause,
    Keyword::Resume,
    Keyword::Delay,
    Keyword::Script,
];

fn keyword(word: &str) -> Option<Keyword> {
    KEYWORDS.iter().copied().find(|k| k.name() == word)
}

fn modifier(word: &str) -> PropertyModifiers {
    match word {
        "min" => PropertyModifiers::MIN,
        "max" => PropertyModifiers::MAX,
        "sum" => PropertyModifiers::SUM,
        "stddev" => PropertyModifiers::STDDEV,
        "average" => PropertyModifiers::AVERAGE,
        "all" => PropertyModifiers::ALL,
        other => panic!("unknown modifier {}", other),
    }
}

fn operator(text: &str) -> Option<Op> {
    Some(match text {
        "=" => Op::Assign,
        "==" => Op::Eq,
        "!=" => Op::Ne,
        "<" => Op::Lt,
        "<=" => Op::Le,
        ">" => Op::Gt,
        ">=" => Op::Ge,
        "+" => Op::Add,
        "-" => Op::Sub,
        "*" => Op::Mul,
        "/" => Op::Div,
        "\\" => Op::IntDiv,
        "%" => Op::Mod,
        "^" => Op::Pow,
        "!" | "not" => Op::Not,
        "&&" | "and" => Op::And,
        "||" | "or" => Op::Or,
        "xor" => Op::Xor,
        _ => return None,
    })
}

fn structural(c: char) -> Option<Structural> {
    Some(match c {
        '(' => Structural::LeftParen,
        ')' => Structural::RightParen,
        '[' => Structural::LeftBracket,
        ']' => Structural::RightBracket,
        '{' => Structural::LeftBrace,
        '}' => Structural::RightBrace,
        ',' => Structural::Comma,
        ';' => Structural::Semicolon,
        _ => return None,
    })
}

/// Assemble one statement from its source line
pub fn statement(line: &str) -> Statement {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let end = (i + 1..chars.len()).find(|&j| chars[j] == '"').expect("unterminated string");
            tokens.push(Token::literal(chars[i + 1..end].iter().collect::<String>()));
            i = end + 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || (chars[i] == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(match text.parse::<i64>() {
                Ok(n) => Token::literal(n),
                Err(_) => Token::literal(text.parse::<f64>().expect("number")),
            });
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '.' || c == '@' {
            let start = i;
            i += 1;
            // a dot ends an identifier and starts a property
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || (c == '.' && chars[i] == '.')) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(word_token(&text, &tokens));
            continue;
        }
        if let Some(s) = structural(c) {
            tokens.push(Token::structural(s));
            i += 1;
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(op) = operator(&two).filter(|_| two.len() == 2) {
            tokens.push(Token::op(op));
            i += 2;
            continue;
        }
        let op = operator(&c.to_string()).unwrap_or_else(|| panic!("unexpected character {:?} in {:?}", c, line));
        tokens.push(Token::op(op));
        i += 1;
    }
    Statement::new(tokens)
}

fn word_token(text: &str, before: &[Token]) -> Token {
    if let Some(rest) = text.strip_prefix('@') {
        return Token::substitute_name(rest);
    }
    if let Some(rest) = text.strip_prefix('.') {
        let mut parts = rest.split('.');
        let name = parts.next().unwrap_or_default();
        let modifiers = parts.fold(PropertyModifiers::empty(), |m, p| m | modifier(p));
        return Token::property(name, modifiers);
    }
    let after_end = before.len() == 1 && before[0].is_keyword(Keyword::End);
    if before.is_empty() || after_end || text == "in" || text == "var" {
        if let Some(kw) = keyword(text) {
            return Token::keyword(kw);
        }
    }
    if let Some(op) = operator(text) {
        return Token::op(op);
    }
    match text {
        "true" => Token::literal(true),
        "false" => Token::literal(false),
        "all" | "none" => Token::selector(text),
        _ => Token::ident(text),
    }
}

/// Assemble a script with line numbers and source offsets
pub fn script(name: &str, lines: &[&str]) -> CompiledScript {
    let mut compiled = CompiledScript::new(name, lines.iter().map(|l| statement(l)).collect());
    let mut offset = 0;
    for (n, line) in lines.iter().enumerate() {
        compiled.lines.push(n as u32 + 1);
        compiled.offsets.push((offset, offset + line.len()));
        offset += line.len() + 1;
    }
    compiled.source = lines.join("\n");
    compiled
}

/// Particles with ids 1..=n laid out along x, alternating C and O
pub fn particle_host(n: usize) -> MemoryHost {
    let rows: Vec<PropertyRow> = (0..n)
        .map(|i| {
            hashmap! {
                "id".to_string() => Value::Int(i as i64 + 1),
                "elem".to_string() => Value::Str(if i % 2 == 0 { "C" } else { "O" }.to_string()),
                "charge".to_string() => Value::Float(i as f64 * 0.5),
                "x".to_string() => Value::Float(i as f64),
                "y".to_string() => Value::Float(0.0),
                "z".to_string() => Value::Float(0.0),
            }
        })
        .collect();
    MemoryHost::new().with_particles(rows)
}

/// Interpreter over `host` with a private function registry
pub fn interpreter(host: &Arc<MemoryHost>) -> Interpreter {
    Interpreter::builder(host.clone())
        .functions(Arc::new(FunctionRegistry::new()))
        .build()
}

/// Run `lines` on a fresh interpreter and host with 10 particles
pub fn run_script(lines: &[&str]) -> (Arc<MemoryHost>, Interpreter, ScriptResult<RunReport>) {
    run_on(Arc::new(particle_host(10)), lines)
}

pub fn run_on(host: Arc<MemoryHost>, lines: &[&str]) -> (Arc<MemoryHost>, Interpreter, ScriptResult<RunReport>) {
    let mut interp = interpreter(&host);
    let result = interp.run(script("test", lines), RunOptions::default());
    (host, interp, result)
}
