//! Host capabilities consumed by the interpreter
//!
//! The interpreter never owns the molecular model, the renderer, or the
//! compiler. It reaches them through the traits in this module:
//!
//! - [`Host`]: particle universe, property reads, named sets, redraw hold,
//!   message translation, and the status/output streams
//! - [`Compiler`]: turns script text into a [`CompiledScript`]
//! - [`ParameterStore`]: process-wide named variables that outlive a run
//!
//! Hosts are shared with fork sub-contexts running on other threads, so every
//! method takes `&self`; implementations synchronize their own state.

pub mod memory;

use crate::interpreter::errors::{ScriptError, ScriptResult};
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::{CompiledScript, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use memory::MemoryHost;

/* ===================== Host ===================== */

/// Model/render layer capability
pub trait Host: Send + Sync {
    /// Number of particles in the current universe
    fn particle_count(&self) -> usize;

    /// Number of bonds in the current universe
    fn bond_count(&self) -> usize {
        0
    }

    /// Make sure per-item data for `name` is available
    ///
    /// Called once per property read before any item is read, so hosts can
    /// compute derived data lazily. Returns false for unknown properties.
    fn prepare_property(&self, flavor: SetFlavor, name: &str) -> bool;

    /// Read one property value of one particle or bond
    fn property(&self, flavor: SetFlavor, index: usize, name: &str) -> Option<Value>;

    /// Resolve a named or defined set
    fn named_set(&self, _name: &str) -> Option<SelectionSet> {
        None
    }

    /// Store a defined set under `name`
    fn define_set(&self, _name: &str, _set: SelectionSet) {}

    /// Replace the current selection
    fn set_selection(&self, _set: &SelectionSet) {}

    fn hold_redraw(&self) {}

    fn release_redraw(&self) {}

    /// Translate an English message template, `None` to keep it
    fn translate(&self, _template: &str) -> Option<String> {
        None
    }

    /// Script output (print, echo)
    fn output(&self, text: &str);

    /// Status stream (command echo, warnings, completion marker)
    fn status(&self, _text: &str) {}

    /// Composite diagnostic of an unrecovered error
    fn report_error(&self, _error: &ScriptError) {}

    /// Source text of an included script
    fn read_script(&self, _name: &str) -> Option<String> {
        None
    }

    /// Number of items in the universe of `flavor`
    fn universe_len(&self, flavor: SetFlavor) -> usize {
        match flavor {
            SetFlavor::Particle => self.particle_count(),
            SetFlavor::Bond => self.bond_count(),
        }
    }
}

/* ===================== Compiler ===================== */

/// Flags passed through to the compiler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileFlags {
    pub check_only: bool,
}

/// External script compiler
pub trait Compiler: Send + Sync {
    fn compile(&self, name: &str, text: &str, flags: CompileFlags) -> ScriptResult<CompiledScript>;
}

/* ===================== Parameter Store ===================== */

/// Process-wide named variables
///
/// Names are case-insensitive; implementations receive lowercased keys.
pub trait ParameterStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&self, name: &str, value: Value);
    fn names(&self) -> Vec<String>;
}

/// In-memory parameter store
#[derive(Debug, Default)]
pub struct GlobalParameters {
    values: RwLock<HashMap<String, Value>>,
}

static SHARED_PARAMETERS: OnceLock<Arc<GlobalParameters>> = OnceLock::new();

impl GlobalParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by every interpreter in the process
    pub fn shared() -> Arc<GlobalParameters> {
        SHARED_PARAMETERS
            .get_or_init(|| Arc::new(GlobalParameters::new()))
            .clone()
    }
}

impl ParameterStore for GlobalParameters {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.values.write().insert(name.to_string(), value);
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.read().keys().cloned().collect();
        names.sort();
        names
    }
}
