//! Built-in functions
//!
//! Builtins are plain closures over already-evaluated arguments, stored by
//! lowercase name in a [`BuiltinTable`]. Hosts extend the table before the
//! interpreter is built; user functions with the same name take precedence.
//!
//! - math: abs, sqrt, sin, cos, tan, acos, floor, ceil, round, pow
//! - geometry: point, plane, distance, within
//! - convert: count, string, int, float

pub mod convert;
pub mod geometry;
pub mod math;

use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::host::Host;
use crate::interpreter::types::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a builtin
pub type BuiltinFn = Arc<dyn Fn(&[Value], &dyn Host) -> ScriptResult<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct BuiltinTable {
    funcs: HashMap<String, BuiltinFn>,
}

impl BuiltinTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with every standard builtin
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        math::register(&mut table);
        geometry::register(&mut table);
        convert::register(&mut table);
        table
    }

    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value], &dyn Host) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        self.funcs.insert(name.to_lowercase(), Arc::new(func));
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.funcs.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.funcs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for BuiltinTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinTable")
            .field("funcs", &self.names())
            .finish()
    }
}

/* ===================== Argument Helpers ===================== */

pub(crate) fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::new(ErrorKind::BadArgumentCount).detail(format!(
            "{}() takes {} argument(s), got {}",
            name,
            if min == max {
                min.to_string()
            } else {
                format!("{}-{}", min, max)
            },
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn number_arg(name: &str, args: &[Value], idx: usize) -> ScriptResult<f64> {
    args.get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected).detail(format!("{}()", name)))
}
