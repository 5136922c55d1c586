//! Numeric builtins; trigonometry works in degrees

use super::{expect_args, number_arg, BuiltinTable};
use crate::interpreter::errors::ScriptResult;
use crate::interpreter::types::Value;

pub(super) fn register(table: &mut BuiltinTable) {
    table.register("abs", |args, _| {
        expect_args("abs", args, 1, 1)?;
        Ok(match &args[0] {
            Value::Int(i) => i.checked_abs().map(Value::Int).unwrap_or(Value::Float((*i as f64).abs())),
            _ => Value::Float(number_arg("abs", args, 0)?.abs()),
        })
    });
    table.register("sqrt", |args, _| unary("sqrt", args, f64::sqrt));
    table.register("sin", |args, _| unary("sin", args, |d| d.to_radians().sin()));
    table.register("cos", |args, _| unary("cos", args, |d| d.to_radians().cos()));
    table.register("tan", |args, _| unary("tan", args, |d| d.to_radians().tan()));
    table.register("acos", |args, _| unary("acos", args, |x| x.acos().to_degrees()));
    table.register("floor", |args, _| rounding("floor", args, f64::floor));
    table.register("ceil", |args, _| rounding("ceil", args, f64::ceil));
    table.register("round", |args, _| {
        expect_args("round", args, 1, 2)?;
        let x = number_arg("round", args, 0)?;
        if args.len() == 2 {
            let places = number_arg("round", args, 1)?.max(0.0).min(15.0) as i32;
            let scale = 10f64.powi(places);
            return Ok(Value::Float((x * scale).round() / scale));
        }
        Ok(to_int(x.round()))
    });
    table.register("pow", |args, _| {
        expect_args("pow", args, 2, 2)?;
        Ok(Value::Float(
            number_arg("pow", args, 0)?.powf(number_arg("pow", args, 1)?),
        ))
    });
}

fn unary(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> ScriptResult<Value> {
    expect_args(name, args, 1, 1)?;
    Ok(Value::Float(f(number_arg(name, args, 0)?)))
}

fn rounding(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> ScriptResult<Value> {
    expect_args(name, args, 1, 1)?;
    if let Value::Int(i) = args[0] {
        return Ok(Value::Int(i));
    }
    Ok(to_int(f(number_arg(name, args, 0)?)))
}

fn to_int(x: f64) -> Value {
    if x.is_finite() && x.abs() < i64::MAX as f64 {
        Value::Int(x as i64)
    } else {
        Value::Float(x)
    }
}
