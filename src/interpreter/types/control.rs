//! Control signals
//!
//! Non-local control flow never travels through errors. Each statement step
//! returns a [`ControlSignal`] and the dispatch loop consumes it.

use super::values::Value;
use serde::{Deserialize, Serialize};

/// Outcome of executing one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ControlSignal {
    /// Proceed with the next statement
    Continue,
    /// Leave `n` enclosing loops
    Break(usize),
    /// Start the next pass of the `n`th enclosing loop
    ContinueLoop(usize),
    /// Leave the current function or script with a value
    Return(Value),
    /// Resume at a statement index of the current frame
    Goto(usize),
    /// Stop the whole run without error
    Exit,
}

impl ControlSignal {
    pub fn is_continue(&self) -> bool {
        matches!(self, ControlSignal::Continue)
    }
}
