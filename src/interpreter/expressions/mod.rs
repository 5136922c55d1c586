//! Expression evaluation
//!
//! Token windows are evaluated with an operator-precedence (shunting-yard)
//! pass. Operands are either finished [`Value`]s or unresolved property
//! references; a property only becomes a value when it meets a comparison
//! (yielding the set of matching particles) or follows another operand as a
//! member access (`{set}.x`, `list.size`).
//!
//! ## Markers
//!
//! Grouping constructs push a marker that records the operand-stack height at
//! the point they opened:
//!
//! - `(` for grouping and `name(` for calls
//! - `[` for list literals, or indexing when it follows an operand
//! - `{` for selection expressions, which coerce their result to a set

pub mod operators;

use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::{Op, PropertyModifiers, Structural, Token, TokenKind, Value};
use crate::interpreter::vm::Interpreter;
use tracing::trace;

/* ===================== Operands ===================== */

#[derive(Debug, Clone)]
enum Operand {
    Value(Value),
    Property {
        name: String,
        modifiers: PropertyModifiers,
    },
}

#[derive(Debug)]
enum Pending {
    Unary(Op),
    Binary(Op),
    Paren { base: usize },
    Call { name: String, base: usize },
    List { base: usize },
    Index { base: usize },
    Brace { base: usize },
}

impl Pending {
    fn is_marker(&self) -> bool {
        !matches!(self, Pending::Unary(_) | Pending::Binary(_))
    }
}

fn underflow() -> ScriptError {
    ScriptError::new(ErrorKind::EndOfStatementUnexpected)
}

/// Split a token window on commas at nesting depth zero
pub(crate) fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Structural(
                Structural::LeftParen | Structural::LeftBracket | Structural::LeftBrace,
            ) => depth += 1,
            TokenKind::Structural(
                Structural::RightParen | Structural::RightBracket | Structural::RightBrace,
            ) => depth -= 1,
            TokenKind::Structural(Structural::Comma) if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() || !parts.is_empty() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// Index of the token closing the group opened at `open`
pub(crate) fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Structural(
                Structural::LeftParen | Structural::LeftBracket | Structural::LeftBrace,
            ) => depth += 1,
            TokenKind::Structural(
                Structural::RightParen | Structural::RightBracket | Structural::RightBrace,
            ) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/* ===================== Evaluator ===================== */

impl Interpreter {
    /// Evaluate a token window to a single value
    pub fn evaluate(&mut self, tokens: &[Token]) -> ScriptResult<Value> {
        let mut operands: Vec<Operand> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();
        let mut expect_operand = true;
        let mut i = 0;

        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                TokenKind::Literal => {
                    let value = token.literal_value().cloned().unwrap_or_else(Value::empty);
                    push_operand(&mut operands, &mut expect_operand, Operand::Value(value))?;
                }
                TokenKind::Selector => {
                    let value = self.resolve_selector(token.name().unwrap_or_default())?;
                    push_operand(&mut operands, &mut expect_operand, Operand::Value(value))?;
                }
                TokenKind::Identifier => {
                    let name = token.name().unwrap_or_default().to_string();
                    let opens_call = tokens
                        .get(i + 1)
                        .is_some_and(|t| t.is_structural(Structural::LeftParen));
                    if opens_call {
                        if !expect_operand {
                            return Err(ScriptError::invalid_argument(format!(
                                "missing operator before {}",
                                name
                            )));
                        }
                        pending.push(Pending::Call {
                            name,
                            base: operands.len(),
                        });
                        i += 2;
                        continue;
                    }
                    let value = self.resolve_identifier(&name)?;
                    push_operand(&mut operands, &mut expect_operand, Operand::Value(value))?;
                }
                TokenKind::Property => {
                    let name = token.name().unwrap_or_default().to_string();
                    let modifiers = token.modifiers();
                    if expect_operand {
                        operands.push(Operand::Property { name, modifiers });
                        expect_operand = false;
                    } else {
                        let target = pop_value(&mut operands)?;
                        operands.push(Operand::Value(self.member(target, &name, modifiers)?));
                    }
                }
                TokenKind::Operator(op) => {
                    if expect_operand {
                        match op {
                            Op::Sub | Op::Neg => pending.push(Pending::Unary(Op::Neg)),
                            Op::Not => pending.push(Pending::Unary(Op::Not)),
                            Op::Add => {}
                            other => {
                                return Err(ScriptError::invalid_argument(format!(
                                    "operand expected before {}",
                                    other.symbol()
                                )))
                            }
                        }
                    } else {
                        let op = if op == Op::Assign { Op::Eq } else { op };
                        self.reduce_while(&mut operands, &mut pending, |top| {
                            let (p, q) = (operators::precedence(top), operators::precedence(op));
                            p > q || (p == q && !operators::is_right_assoc(op))
                        })?;
                        pending.push(Pending::Binary(op));
                        expect_operand = true;
                    }
                }
                TokenKind::Structural(s) => {
                    self.structural(s, &mut operands, &mut pending, &mut expect_operand)?;
                }
                TokenKind::Substitution => {
                    return Err(ScriptError::invalid_argument(format!(
                        "unresolved substitution {}",
                        token
                    )));
                }
                TokenKind::Keyword(_) | TokenKind::Command => {
                    return Err(ScriptError::invalid_argument(format!(
                        "unexpected {} in expression",
                        token
                    )));
                }
            }
            i += 1;
        }

        self.reduce_while(&mut operands, &mut pending, |_| true)?;
        if pending.iter().any(Pending::is_marker) {
            return Err(underflow().detail("unclosed group"));
        }
        match operands.len() {
            0 => Err(underflow()),
            1 => match operands.pop() {
                Some(Operand::Value(v)) => Ok(v),
                Some(Operand::Property { name, .. }) => Err(ScriptError::invalid_argument(
                    format!("property {} needs a comparison", name),
                )),
                None => Err(underflow()),
            },
            n => Err(ScriptError::invalid_argument(format!(
                "{} values left after evaluation",
                n
            ))),
        }
    }

    /// Evaluate and test truthiness
    pub fn evaluate_condition(&mut self, tokens: &[Token]) -> ScriptResult<bool> {
        if tokens.is_empty() {
            return Ok(true);
        }
        Ok(self.evaluate(tokens)?.is_truthy())
    }

    /// Evaluate each comma-separated expression of a window
    pub fn evaluate_list(&mut self, tokens: &[Token]) -> ScriptResult<Vec<Value>> {
        split_top_level(tokens)
            .into_iter()
            .map(|part| self.evaluate(part))
            .collect()
    }

    /* ===================== Reduction ===================== */

    fn reduce_while(
        &mut self,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
        mut keep_going: impl FnMut(Op) -> bool,
    ) -> ScriptResult<()> {
        while let Some(top) = pending.last() {
            let op = match top {
                Pending::Unary(op) | Pending::Binary(op) => *op,
                _ => break,
            };
            if !keep_going(op) {
                break;
            }
            let Some(entry) = pending.pop() else { break };
            self.apply(entry, operands)?;
        }
        Ok(())
    }

    fn apply(&mut self, entry: Pending, operands: &mut Vec<Operand>) -> ScriptResult<()> {
        match entry {
            Pending::Unary(op) => {
                let value = pop_value(operands)?;
                operands.push(Operand::Value(operators::unary(op, &value)?));
            }
            Pending::Binary(op) => {
                let rhs = operands.pop().ok_or_else(underflow)?;
                let lhs = operands.pop().ok_or_else(underflow)?;
                let result = match (lhs, rhs) {
                    (Operand::Value(a), Operand::Value(b)) => operators::binary(op, &a, &b)?,
                    (Operand::Property { name, modifiers }, Operand::Value(v)) if op.is_comparison() => {
                        self.property_match(&name, modifiers, op, &v)?
                    }
                    (Operand::Value(v), Operand::Property { name, modifiers }) if op.is_comparison() => {
                        self.property_match(&name, modifiers, flip(op), &v)?
                    }
                    _ => {
                        return Err(ScriptError::invalid_argument(format!(
                            "property used with {}",
                            op.symbol()
                        )))
                    }
                };
                operands.push(Operand::Value(result));
            }
            marker => {
                return Err(ScriptError::invalid_argument(format!("unbalanced {:?}", marker)));
            }
        }
        Ok(())
    }

    fn structural(
        &mut self,
        s: Structural,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
        expect_operand: &mut bool,
    ) -> ScriptResult<()> {
        match s {
            Structural::LeftParen => {
                if !*expect_operand {
                    return Err(ScriptError::invalid_argument("missing operator before ("));
                }
                pending.push(Pending::Paren {
                    base: operands.len(),
                });
            }
            Structural::LeftBracket => {
                if *expect_operand {
                    pending.push(Pending::List {
                        base: operands.len(),
                    });
                } else {
                    // postfix binds tighter than any pending operator
                    pending.push(Pending::Index {
                        base: operands.len(),
                    });
                    *expect_operand = true;
                }
            }
            Structural::LeftBrace => {
                if !*expect_operand {
                    return Err(ScriptError::invalid_argument("missing operator before {"));
                }
                pending.push(Pending::Brace {
                    base: operands.len(),
                });
            }
            Structural::Comma => {
                self.reduce_while(operands, pending, |_| true)?;
                match pending.last() {
                    Some(Pending::Call { .. } | Pending::List { .. }) => {}
                    _ => return Err(ScriptError::invalid_argument("unexpected ,")),
                }
                *expect_operand = true;
            }
            Structural::RightParen | Structural::RightBracket | Structural::RightBrace => {
                self.reduce_while(operands, pending, |_| true)?;
                let marker = pending.pop().ok_or_else(|| {
                    ScriptError::invalid_argument(format!("unbalanced {}", s.symbol()))
                })?;
                let value = self.close_group(s, marker, operands)?;
                operands.push(Operand::Value(value));
                *expect_operand = false;
            }
            Structural::Semicolon => {
                return Err(ScriptError::invalid_argument("unexpected ;"));
            }
        }
        Ok(())
    }

    fn close_group(
        &mut self,
        close: Structural,
        marker: Pending,
        operands: &mut Vec<Operand>,
    ) -> ScriptResult<Value> {
        match (close, marker) {
            (Structural::RightParen, Pending::Paren { base }) => single_above(operands, base),
            (Structural::RightParen, Pending::Call { name, base }) => {
                let args = values_above(operands, base)?;
                self.call(&name, args)
            }
            (Structural::RightBracket, Pending::List { base }) => {
                Ok(Value::List(values_above(operands, base)?))
            }
            (Structural::RightBracket, Pending::Index { base }) => {
                let idx = single_above(operands, base)?;
                let target = pop_value(operands)?;
                operators::index(&target, &idx)
            }
            (Structural::RightBrace, Pending::Brace { base }) => {
                let value = single_above(operands, base)?;
                self.coerce_to_set(value)
            }
            (close, marker) => Err(ScriptError::invalid_argument(format!(
                "{} does not close {:?}",
                close.symbol(),
                marker
            ))),
        }
    }

    /* ===================== Resolution ===================== */

    /// Variable, then zero-argument function, then named set, then ""
    fn resolve_identifier(&mut self, name: &str) -> ScriptResult<Value> {
        if let Some(value) = self.lookup_variable(name) {
            return Ok(value);
        }
        if self.runtime.functions.contains(name) || self.runtime.builtins.contains(name) {
            return self.call(name, Vec::new());
        }
        if let Some(set) = self.runtime.host.named_set(name) {
            return Ok(Value::Set(set));
        }
        trace!(identifier = name, "unbound identifier evaluates to empty");
        Ok(Value::empty())
    }

    fn resolve_selector(&self, name: &str) -> ScriptResult<Value> {
        let host = &self.runtime.host;
        let n = host.particle_count();
        match name.to_lowercase().as_str() {
            "all" => Ok(Value::Set(SelectionSet::all(SetFlavor::Particle, n))),
            "none" => Ok(Value::Set(SelectionSet::empty(SetFlavor::Particle, n))),
            other => host
                .named_set(other)
                .map(Value::Set)
                .ok_or_else(|| ScriptError::new(ErrorKind::ExpressionExpected).detail(name)),
        }
    }

    /// User function first, then builtin
    fn call(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        if self.runtime.functions.contains(name) {
            return self.call_function(name, args);
        }
        if let Some(builtin) = self.runtime.builtins.get(name) {
            return builtin(&args, self.runtime.host.as_ref());
        }
        Err(ScriptError::new(ErrorKind::UnrecognizedExpression).detail(format!("{}()", name)))
    }

    fn coerce_to_set(&self, value: Value) -> ScriptResult<Value> {
        let n = self.runtime.host.particle_count();
        match value {
            Value::Set(set) => Ok(Value::Set(set)),
            Value::Bool(true) => Ok(Value::Set(SelectionSet::all(SetFlavor::Particle, n))),
            Value::Bool(false) => Ok(Value::Set(SelectionSet::empty(SetFlavor::Particle, n))),
            Value::Int(i) if i >= 0 && (i as usize) < n => Ok(Value::Set(
                SelectionSet::from_indices(SetFlavor::Particle, n, [i as usize]),
            )),
            other => Ok(other),
        }
    }

    /* ===================== Properties ===================== */

    /// Particles whose property compares true against `value`
    fn property_match(
        &self,
        name: &str,
        modifiers: PropertyModifiers,
        op: Op,
        value: &Value,
    ) -> ScriptResult<Value> {
        let host = self.runtime.host.as_ref();
        let flavor = SetFlavor::Particle;
        if !modifiers.is_empty() {
            return Err(ScriptError::invalid_argument(format!(
                "modifiers are not allowed in a comparison on {}",
                name
            )));
        }
        if !host.prepare_property(flavor, name) {
            return Err(unknown_property(flavor, name));
        }
        let n = host.universe_len(flavor);
        let set = SelectionSet::matching(flavor, n, |idx| {
            host.property(flavor, idx, name)
                .is_some_and(|pv| operators::compare(op, &pv, value))
        });
        Ok(Value::Set(set))
    }

    /// `target.name` member access
    fn member(&self, target: Value, name: &str, modifiers: PropertyModifiers) -> ScriptResult<Value> {
        match (name.to_lowercase().as_str(), &target) {
            ("size" | "count" | "length", _) => target
                .size()
                .map(|n| Value::Int(n as i64))
                .ok_or_else(|| {
                    ScriptError::invalid_argument(format!("{} has no size", target.type_name()))
                }),
            ("type", _) => Ok(Value::from(target.type_name())),
            ("x", Value::Point(p)) => Ok(Value::Float(p.x)),
            ("y", Value::Point(p)) => Ok(Value::Float(p.y)),
            ("z", Value::Point(p)) => Ok(Value::Float(p.z)),
            (_, Value::Set(set)) => self.aggregate(set, name, modifiers),
            _ => Err(ScriptError::invalid_argument(format!(
                "{} has no property {}",
                target.type_name(),
                name
            ))),
        }
    }

    fn aggregate(
        &self,
        set: &SelectionSet,
        name: &str,
        modifiers: PropertyModifiers,
    ) -> ScriptResult<Value> {
        let host = self.runtime.host.as_ref();
        let flavor = set.flavor();
        if !host.prepare_property(flavor, name) {
            return Err(unknown_property(flavor, name));
        }
        let raw: Vec<Value> = set
            .indices()
            .filter_map(|idx| host.property(flavor, idx, name))
            .collect();

        if modifiers.contains(PropertyModifiers::ALL) {
            return Ok(Value::List(raw));
        }
        if raw.is_empty() {
            return Ok(Value::empty());
        }
        if modifiers.is_empty() && raw.len() == 1 {
            return Ok(raw.into_iter().next().unwrap_or_else(Value::empty));
        }

        let all_int = raw.iter().all(|v| matches!(v, Value::Int(_)));
        let nums: Vec<f64> = raw.iter().filter_map(Value::as_f64).collect();
        if nums.is_empty() {
            return Ok(Value::empty());
        }
        let n = nums.len() as f64;
        let sum: f64 = nums.iter().sum();
        let pick = |f: f64| if all_int { Value::Int(f as i64) } else { Value::Float(f) };

        Ok(if modifiers.contains(PropertyModifiers::MIN) {
            pick(nums.iter().copied().fold(f64::INFINITY, f64::min))
        } else if modifiers.contains(PropertyModifiers::MAX) {
            pick(nums.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        } else if modifiers.contains(PropertyModifiers::SUM) {
            pick(sum)
        } else if modifiers.contains(PropertyModifiers::STDDEV) {
            let mean = sum / n;
            let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            Value::Float(var.sqrt())
        } else {
            Value::Float(sum / n)
        })
    }
}

fn unknown_property(flavor: SetFlavor, name: &str) -> ScriptError {
    let kind = match flavor {
        SetFlavor::Particle => ErrorKind::UnrecognizedAtomProperty,
        SetFlavor::Bond => ErrorKind::UnrecognizedBondProperty,
    };
    ScriptError::new(kind).detail(name)
}

fn flip(op: Op) -> Op {
    match op {
        Op::Lt => Op::Gt,
        Op::Le => Op::Ge,
        Op::Gt => Op::Lt,
        Op::Ge => Op::Le,
        other => other,
    }
}

fn push_operand(
    operands: &mut Vec<Operand>,
    expect_operand: &mut bool,
    operand: Operand,
) -> ScriptResult<()> {
    if !*expect_operand {
        return Err(ScriptError::invalid_argument("missing operator between values"));
    }
    operands.push(operand);
    *expect_operand = false;
    Ok(())
}

fn pop_value(operands: &mut Vec<Operand>) -> ScriptResult<Value> {
    match operands.pop() {
        Some(Operand::Value(v)) => Ok(v),
        Some(Operand::Property { name, .. }) => Err(ScriptError::invalid_argument(format!(
            "property {} needs a comparison",
            name
        ))),
        None => Err(underflow()),
    }
}

fn single_above(operands: &mut Vec<Operand>, base: usize) -> ScriptResult<Value> {
    if operands.len() != base + 1 {
        return Err(if operands.len() <= base {
            underflow()
        } else {
            ScriptError::invalid_argument("more than one value in group")
        });
    }
    pop_value(operands)
}

fn values_above(operands: &mut Vec<Operand>, base: usize) -> ScriptResult<Vec<Value>> {
    if operands.len() < base {
        return Err(underflow());
    }
    operands
        .split_off(base)
        .into_iter()
        .map(|op| match op {
            Operand::Value(v) => Ok(v),
            Operand::Property { name, .. } => Err(ScriptError::invalid_argument(format!(
                "property {} needs a comparison",
                name
            ))),
        })
        .collect()
}
