//! In-memory host
//!
//! A [`Host`] backed by plain property tables. The CLI runs scripts against
//! it, and the interpreter tests use it to observe output, status messages,
//! selections, and redraw notifications.

use super::Host;
use crate::interpreter::errors::ScriptError;
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Property table for one particle or bond
pub type PropertyRow = HashMap<String, Value>;

/// Derived property computed on first use: the item's own index
const INDEX_PROPERTY: &str = "index";

#[derive(Debug, Default)]
pub struct MemoryHost {
    particles: Vec<PropertyRow>,
    bonds: Vec<PropertyRow>,
    scripts: HashMap<String, String>,
    translations: HashMap<String, String>,
    state: Mutex<HostState>,
}

#[derive(Debug, Default)]
struct HostState {
    named_sets: HashMap<String, SelectionSet>,
    selection: Option<SelectionSet>,
    output: Vec<String>,
    status: Vec<String>,
    errors: Vec<ScriptError>,
    holds: usize,
    releases: usize,
    derived: HashSet<(SetFlavor, String)>,
    preparations: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_particles(mut self, particles: Vec<PropertyRow>) -> Self {
        self.particles = particles;
        self
    }

    pub fn with_bonds(mut self, bonds: Vec<PropertyRow>) -> Self {
        self.bonds = bonds;
        self
    }

    pub fn with_named_set(self, name: impl Into<String>, set: SelectionSet) -> Self {
        self.state.lock().named_sets.insert(name.into().to_lowercase(), set);
        self
    }

    /// Script text returned by [`Host::read_script`]
    pub fn with_script(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), text.into());
        self
    }

    /// Translation for one English template
    pub fn with_translation(mut self, template: impl Into<String>, localized: impl Into<String>) -> Self {
        self.translations.insert(template.into(), localized.into());
        self
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.state.lock().output.clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.state.lock().status.clone()
    }

    pub fn reported_errors(&self) -> Vec<ScriptError> {
        self.state.lock().errors.clone()
    }

    pub fn selection(&self) -> Option<SelectionSet> {
        self.state.lock().selection.clone()
    }

    /// Number of (hold, release) redraw notifications received
    pub fn redraw_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.holds, state.releases)
    }

    /// Number of times derived data had to be computed
    pub fn derived_computations(&self) -> usize {
        self.state.lock().preparations
    }

    fn rows(&self, flavor: SetFlavor) -> &[PropertyRow] {
        match flavor {
            SetFlavor::Particle => &self.particles,
            SetFlavor::Bond => &self.bonds,
        }
    }
}

impl Host for MemoryHost {
    fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    fn prepare_property(&self, flavor: SetFlavor, name: &str) -> bool {
        if name == INDEX_PROPERTY {
            let mut state = self.state.lock();
            if state.derived.insert((flavor, name.to_string())) {
                state.preparations += 1;
            }
            return true;
        }
        self.rows(flavor).iter().any(|row| row.contains_key(name))
    }

    fn property(&self, flavor: SetFlavor, index: usize, name: &str) -> Option<Value> {
        let row = self.rows(flavor).get(index)?;
        if name == INDEX_PROPERTY {
            return Some(Value::Int(index as i64));
        }
        row.get(name).cloned()
    }

    fn named_set(&self, name: &str) -> Option<SelectionSet> {
        self.state.lock().named_sets.get(&name.to_lowercase()).cloned()
    }

    fn define_set(&self, name: &str, set: SelectionSet) {
        self.state.lock().named_sets.insert(name.to_lowercase(), set);
    }

    fn set_selection(&self, set: &SelectionSet) {
        self.state.lock().selection = Some(set.clone());
    }

    fn hold_redraw(&self) {
        self.state.lock().holds += 1;
    }

    fn release_redraw(&self) {
        self.state.lock().releases += 1;
    }

    fn translate(&self, template: &str) -> Option<String> {
        self.translations.get(template).cloned()
    }

    fn output(&self, text: &str) {
        self.state.lock().output.push(text.to_string());
    }

    fn status(&self, text: &str) {
        self.state.lock().status.push(text.to_string());
    }

    fn report_error(&self, error: &ScriptError) {
        self.state.lock().errors.push(error.clone());
    }

    fn read_script(&self, name: &str) -> Option<String> {
        self.scripts.get(name).cloned()
    }
}
