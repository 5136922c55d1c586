//! User-defined functions
//!
//! A `function` (or `parallel`) block is sliced out of its script when the
//! definition statement runs, loaded into its own [`Program`], and stored in
//! a [`FunctionRegistry`]. Registries are shared by every interpreter built
//! from the same handle, including fork workers.

use crate::interpreter::jumps::Program;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Fork batches inside this function go to the parallel executor
    pub parallel: bool,
    pub program: Arc<Program>,
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<UserFunction>>>,
}

static GLOBAL_FUNCTIONS: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process
    pub fn global() -> Arc<FunctionRegistry> {
        GLOBAL_FUNCTIONS
            .get_or_init(|| Arc::new(FunctionRegistry::new()))
            .clone()
    }

    /// Register `func`, replacing any earlier definition with the same name
    pub fn define(&self, func: UserFunction) -> Arc<UserFunction> {
        let key = func.name.to_lowercase();
        let func = Arc::new(func);
        let previous = self.functions.write().insert(key, func.clone());
        debug!(
            function = %func.name,
            params = func.params.len(),
            parallel = func.parallel,
            replaced = previous.is_some(),
            "function defined"
        );
        func
    }

    pub fn get(&self, name: &str) -> Option<Arc<UserFunction>> {
        self.functions.read().get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(&name.to_lowercase())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<UserFunction>> {
        self.functions.write().remove(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}
