//! Operator semantics over [`Value`]s
//!
//! Numeric rules: integer arithmetic is checked and falls back to decimals on
//! overflow, `/` always yields a decimal, `\` is integer division. Strings on
//! the left of `+` concatenate. Sets combine with the logical operators.

use crate::interpreter::errors::{ScriptError, ScriptResult};
use crate::interpreter::selection::SelectionSet;
use crate::interpreter::types::{Op, Point3, Value};
use std::cmp::Ordering;

/* ===================== Precedence ===================== */

pub fn precedence(op: Op) -> u8 {
    match op {
        Op::Or | Op::Xor => 1,
        Op::And => 2,
        Op::Not => 3,
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Assign => 4,
        Op::Add | Op::Sub => 5,
        Op::Mul | Op::Div | Op::IntDiv | Op::Mod => 6,
        Op::Pow => 7,
        Op::Neg => 8,
    }
}

pub fn is_right_assoc(op: Op) -> bool {
    matches!(op, Op::Pow | Op::Not | Op::Neg)
}

/* ===================== Numbers ===================== */

#[derive(Debug, Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Int(i) => Some(Num::I(*i)),
            Value::Float(f) => Some(Num::F(*f)),
            Value::Bool(b) => Some(Num::I(*b as i64)),
            Value::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Num::I)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(Num::F))
            }
            _ => None,
        }
    }

    fn f(self) -> f64 {
        match self {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }
}

fn arith(
    op: Op,
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> ScriptResult<Value> {
    if let (Num::I(x), Num::I(y)) = (a, b) {
        if let Some(v) = int_op(x, y) {
            return Ok(Value::Int(v));
        }
        if matches!(op, Op::IntDiv | Op::Mod) && y == 0 {
            return Err(ScriptError::invalid_argument("division by zero"));
        }
    }
    Ok(Value::Float(float_op(a.f(), b.f())))
}

fn numeric(op: Op, a: &Value, b: &Value) -> ScriptResult<Value> {
    let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) else {
        return Err(type_mismatch(op, a, b));
    };
    match op {
        Op::Add => arith(op, x, y, i64::checked_add, |a, b| a + b),
        Op::Sub => arith(op, x, y, i64::checked_sub, |a, b| a - b),
        Op::Mul => arith(op, x, y, i64::checked_mul, |a, b| a * b),
        Op::Div => Ok(Value::Float(x.f() / y.f())),
        Op::IntDiv => {
            if let (Num::I(_), Num::I(_)) = (x, y) {
                return arith(op, x, y, i64::checked_div, |a, b| (a / b).trunc());
            }
            if y.f() == 0.0 {
                return Err(ScriptError::invalid_argument("division by zero"));
            }
            Ok(Value::Int((x.f() / y.f()).trunc() as i64))
        }
        Op::Mod => arith(op, x, y, i64::checked_rem, |a, b| a % b),
        Op::Pow => {
            if let (Num::I(base), Num::I(exp)) = (x, y) {
                if let Some(v) = u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)) {
                    return Ok(Value::Int(v));
                }
            }
            Ok(Value::Float(x.f().powf(y.f())))
        }
        _ => Err(type_mismatch(op, a, b)),
    }
}

fn type_mismatch(op: Op, a: &Value, b: &Value) -> ScriptError {
    ScriptError::invalid_argument(format!(
        "{} {} {}",
        a.type_name(),
        op.symbol(),
        b.type_name()
    ))
}

/* ===================== Binary ===================== */

pub fn binary(op: Op, a: &Value, b: &Value) -> ScriptResult<Value> {
    match op {
        Op::Add => add(a, b),
        Op::Sub => sub(a, b),
        Op::Mul => mul(a, b),
        Op::Div => match (a, b) {
            (Value::Point(p), n) if Num::of(n).is_some() => Ok(scale(p, 1.0 / as_num(n))),
            _ => numeric(op, a, b),
        },
        Op::IntDiv | Op::Mod | Op::Pow => numeric(op, a, b),
        Op::And | Op::Or | Op::Xor => logical(op, a, b),
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Assign => {
            Ok(Value::Bool(compare(op, a, b)))
        }
        Op::Neg | Op::Not => Err(ScriptError::invalid_argument(format!(
            "{} is not a binary operator",
            op.symbol()
        ))),
    }
}

fn as_num(v: &Value) -> f64 {
    Num::of(v).map(Num::f).unwrap_or(0.0)
}

fn scale(p: &Point3, k: f64) -> Value {
    Value::Point(Point3::new(p.x * k, p.y * k, p.z * k))
}

fn zip_points(a: &Point3, b: &Point3, f: fn(f64, f64) -> f64) -> Value {
    Value::Point(Point3::new(f(a.x, b.x), f(a.y, b.y), f(a.z, b.z)))
}

fn add(a: &Value, b: &Value) -> ScriptResult<Value> {
    match (a, b) {
        (Value::Str(s), _) => Ok(Value::Str(format!("{}{}", s, b))),
        (Value::List(items), Value::List(more)) => {
            Ok(Value::List(items.iter().chain(more).cloned().collect()))
        }
        (Value::List(items), other) => {
            let mut items = items.clone();
            items.push(other.clone());
            Ok(Value::List(items))
        }
        (Value::Point(p), Value::Point(q)) => Ok(zip_points(p, q, |x, y| x + y)),
        (Value::Point(p), n) if Num::of(n).is_some() => {
            let k = as_num(n);
            Ok(Value::Point(Point3::new(p.x + k, p.y + k, p.z + k)))
        }
        (n, Value::Str(s)) if Num::of(b).is_none() && a.is_numeric() => {
            Ok(Value::Str(format!("{}{}", n, s)))
        }
        _ => numeric(Op::Add, a, b),
    }
}

fn sub(a: &Value, b: &Value) -> ScriptResult<Value> {
    match (a, b) {
        (Value::Point(p), Value::Point(q)) => Ok(zip_points(p, q, |x, y| x - y)),
        (Value::Point(p), n) if Num::of(n).is_some() => {
            let k = as_num(n);
            Ok(Value::Point(Point3::new(p.x - k, p.y - k, p.z - k)))
        }
        (Value::Set(x), Value::Set(y)) => Ok(Value::Set(x.difference(y)?)),
        _ => numeric(Op::Sub, a, b),
    }
}

fn mul(a: &Value, b: &Value) -> ScriptResult<Value> {
    match (a, b) {
        (Value::Point(p), Value::Point(q)) => Ok(Value::Float(p.dot(q))),
        (Value::Point(p), n) if Num::of(n).is_some() && !matches!(n, Value::Str(_)) => {
            Ok(scale(p, as_num(n)))
        }
        (n, Value::Point(p)) if Num::of(n).is_some() && !matches!(n, Value::Str(_)) => {
            Ok(scale(p, as_num(n)))
        }
        (Value::Matrix3(m), Value::Point(p)) => {
            let row = |r: &[f64; 3]| r[0] * p.x + r[1] * p.y + r[2] * p.z;
            Ok(Value::Point(Point3::new(row(&m[0]), row(&m[1]), row(&m[2]))))
        }
        (Value::Matrix3(m), Value::Matrix3(n)) => {
            let mut out = [[0.0; 3]; 3];
            for (i, row) in out.iter_mut().enumerate() {
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell = (0..3).map(|k| m[i][k] * n[k][j]).sum();
                }
            }
            Ok(Value::Matrix3(out))
        }
        (Value::Matrix4(m), Value::Matrix4(n)) => {
            let mut out = [[0.0; 4]; 4];
            for (i, row) in out.iter_mut().enumerate() {
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell = (0..4).map(|k| m[i][k] * n[k][j]).sum();
                }
            }
            Ok(Value::Matrix4(out))
        }
        _ => numeric(Op::Mul, a, b),
    }
}

fn logical(op: Op, a: &Value, b: &Value) -> ScriptResult<Value> {
    if let (Value::Set(x), Value::Set(y)) = (a, b) {
        let set = match op {
            Op::And => x.intersection(y)?,
            Op::Or => x.union(y)?,
            _ => x.symmetric_difference(y)?,
        };
        return Ok(Value::Set(set));
    }
    let (x, y) = (a.is_truthy(), b.is_truthy());
    Ok(Value::Bool(match op {
        Op::And => x && y,
        Op::Or => x || y,
        _ => x ^ y,
    }))
}

/* ===================== Unary ===================== */

pub fn unary(op: Op, a: &Value) -> ScriptResult<Value> {
    match op {
        Op::Not => Ok(match a {
            Value::Set(set) => Value::Set(set.complement()),
            other => Value::Bool(!other.is_truthy()),
        }),
        Op::Neg => match a {
            Value::Point(p) => Ok(scale(p, -1.0)),
            _ => match Num::of(a) {
                Some(Num::I(i)) => Ok(i
                    .checked_neg()
                    .map(Value::Int)
                    .unwrap_or(Value::Float(-(i as f64)))),
                Some(Num::F(f)) => Ok(Value::Float(-f)),
                None => Err(ScriptError::invalid_argument(format!("-{}", a.type_name()))),
            },
        },
        _ => Err(ScriptError::invalid_argument(format!(
            "{} is not a unary operator",
            op.symbol()
        ))),
    }
}

/* ===================== Comparison ===================== */

/// Compare two values; strings compare case-insensitively
pub fn compare(op: Op, a: &Value, b: &Value) -> bool {
    match op {
        Op::Eq | Op::Assign => equals(a, b),
        Op::Ne => !equals(a, b),
        _ => match ordering(a, b) {
            Some(ord) => match op {
                Op::Lt => ord == Ordering::Less,
                Op::Le => ord != Ordering::Greater,
                Op::Gt => ord == Ordering::Greater,
                Op::Ge => ord != Ordering::Less,
                _ => false,
            },
            None => false,
        },
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.eq_ignore_ascii_case(y),
        (Value::Set(x), Value::Set(y)) => {
            x.flavor() == y.flavor() && x.indices().eq(y.indices())
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| equals(p, q))
        }
        (Value::Point(_), _)
        | (Value::Plane(_), _)
        | (Value::Matrix3(_), _)
        | (Value::Matrix4(_), _)
        | (Value::Function(_), _) => a == b,
        _ => match (Num::of(a), Num::of(b)) {
            (Some(x), Some(y)) => x.f() == y.f(),
            _ => false,
        },
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        if Num::of(a).is_none() || Num::of(b).is_none() {
            return Some(x.to_lowercase().cmp(&y.to_lowercase()));
        }
    }
    match (Num::of(a), Num::of(b)) {
        (Some(x), Some(y)) => x.f().partial_cmp(&y.f()),
        _ => None,
    }
}

/* ===================== Indexing ===================== */

/// 1-based element access; 0 is the last item and negatives count back from it
pub fn index(target: &Value, idx: &Value) -> ScriptResult<Value> {
    let Some(i) = idx.as_int() else {
        return Err(ScriptError::invalid_argument(format!(
            "index must be an integer, got {}",
            idx.type_name()
        )));
    };
    let resolve = |len: usize| -> Option<usize> {
        let len = len as i64;
        let pos = if i > 0 { i - 1 } else { (len - 1).checked_add(i)? };
        (0..len).contains(&pos).then_some(pos as usize)
    };
    Ok(match target {
        Value::List(items) => resolve(items.len())
            .map(|p| items[p].clone())
            .unwrap_or_else(Value::empty),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|p| Value::Str(chars[p].to_string()))
                .unwrap_or_else(Value::empty)
        }
        Value::Set(set) => Value::Set(
            resolve(set.count())
                .and_then(|p| set.nth_member(p))
                .unwrap_or_else(|| SelectionSet::empty(set.flavor(), set.universe_len())),
        ),
        Value::Point(p) => resolve(3)
            .and_then(|k| p.component(k))
            .map(Value::Float)
            .unwrap_or_else(Value::empty),
        Value::Plane(p) => resolve(4).map(|k| Value::Float(p[k])).unwrap_or_else(Value::empty),
        Value::Matrix3(m) => resolve(3)
            .map(|k| Value::Point(Point3::from_array(m[k])))
            .unwrap_or_else(Value::empty),
        Value::Matrix4(m) => resolve(4).map(|k| Value::Plane(m[k])).unwrap_or_else(Value::empty),
        other => {
            return Err(ScriptError::invalid_argument(format!(
                "{} cannot be indexed",
                other.type_name()
            )))
        }
    })
}
