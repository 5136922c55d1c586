//! Conversion builtins

use super::{expect_args, BuiltinTable};
use crate::interpreter::errors::{ErrorKind, ScriptError};
use crate::interpreter::types::Value;

pub(super) fn register(table: &mut BuiltinTable) {
    table.register("count", |args, _| {
        expect_args("count", args, 1, 1)?;
        args[0]
            .size()
            .map(|n| Value::Int(n as i64))
            .ok_or_else(|| ScriptError::invalid_argument(format!("count() of {}", args[0].type_name())))
    });
    table.register("string", |args, _| {
        expect_args("string", args, 1, 1)?;
        Ok(Value::Str(args[0].to_string()))
    });
    table.register("int", |args, _| {
        expect_args("int", args, 1, 1)?;
        args[0]
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::new(ErrorKind::IntegerExpected).detail(args[0].to_string()))
    });
    table.register("float", |args, _| {
        expect_args("float", args, 1, 1)?;
        args[0]
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected).detail(args[0].to_string()))
    });
}
