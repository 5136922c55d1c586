//! Selection-set algebra
//!
//! A selection set is a bit vector over the indices of a particle universe,
//! tagged at construction as either a particle set or a bond set. Sets are
//! sized to the universe they were built against; binary operations reject
//! operands of a different flavor or size instead of padding them.

use crate::interpreter::errors::{ScriptError, ScriptResult};
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a selection set indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SetFlavor {
    #[default]
    Particle,
    Bond,
}

/// Bit vector over particle or bond indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SetRepr", try_from = "SetRepr")]
pub struct SelectionSet {
    flavor: SetFlavor,
    bits: BitVec<u64, Lsb0>,
}

impl SelectionSet {
    /// Create an empty set over a universe of `len` items
    pub fn empty(flavor: SetFlavor, len: usize) -> Self {
        Self {
            flavor,
            bits: bitvec![u64, Lsb0; 0; len],
        }
    }

    /// Create a set containing every item of the universe
    pub fn all(flavor: SetFlavor, len: usize) -> Self {
        Self {
            flavor,
            bits: bitvec![u64, Lsb0; 1; len],
        }
    }

    /// Create a set from member indices; indices outside the universe are dropped
    pub fn from_indices(flavor: SetFlavor, len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::empty(flavor, len);
        for idx in indices {
            set.insert(idx);
        }
        set
    }

    /// Build a set by testing every index of the universe
    pub fn matching(flavor: SetFlavor, len: usize, mut pred: impl FnMut(usize) -> bool) -> Self {
        let mut set = Self::empty(flavor, len);
        for idx in 0..len {
            if pred(idx) {
                set.bits.set(idx, true);
            }
        }
        set
    }

    pub fn flavor(&self) -> SetFlavor {
        self.flavor
    }

    /// Size of the universe this set was built against
    pub fn universe_len(&self) -> usize {
        self.bits.len()
    }

    /// Number of members
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.bits.get(idx).map(|b| *b).unwrap_or(false)
    }

    pub fn insert(&mut self, idx: usize) {
        if idx < self.bits.len() {
            self.bits.set(idx, true);
        }
    }

    pub fn remove(&mut self, idx: usize) {
        if idx < self.bits.len() {
            self.bits.set(idx, false);
        }
    }

    /// Member indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn first(&self) -> Option<usize> {
        self.bits.first_one()
    }

    /// The `n`th member (0-based) as a single-member set
    pub fn nth_member(&self, n: usize) -> Option<SelectionSet> {
        self.indices()
            .nth(n)
            .map(|idx| Self::from_indices(self.flavor, self.universe_len(), [idx]))
    }

    /* ===================== Algebra ===================== */

    pub fn union(&self, other: &Self) -> ScriptResult<Self> {
        self.check_compatible(other)?;
        let mut result = self.clone();
        result.bits |= &other.bits;
        Ok(result)
    }

    pub fn intersection(&self, other: &Self) -> ScriptResult<Self> {
        self.check_compatible(other)?;
        let mut result = self.clone();
        result.bits &= &other.bits;
        Ok(result)
    }

    pub fn difference(&self, other: &Self) -> ScriptResult<Self> {
        self.check_compatible(other)?;
        let mut result = self.clone();
        for idx in other.bits.iter_ones() {
            result.bits.set(idx, false);
        }
        Ok(result)
    }

    pub fn symmetric_difference(&self, other: &Self) -> ScriptResult<Self> {
        self.check_compatible(other)?;
        let mut result = self.clone();
        result.bits ^= &other.bits;
        Ok(result)
    }

    pub fn complement(&self) -> Self {
        Self {
            flavor: self.flavor,
            bits: !self.bits.clone(),
        }
    }

    /// Resize to a live universe of `len` items, dropping members past the end
    ///
    /// Sets captured before particles were added or deleted must pass through
    /// here before they are combined with freshly built sets.
    pub fn restrict_to_universe(&self, len: usize) -> Self {
        let mut bits = self.bits.clone();
        bits.resize(len, false);
        Self {
            flavor: self.flavor,
            bits,
        }
    }

    fn check_compatible(&self, other: &Self) -> ScriptResult<()> {
        if self.flavor != other.flavor {
            return Err(ScriptError::invalid_argument(format!(
                "cannot combine {:?} and {:?} sets",
                self.flavor, other.flavor
            )));
        }
        if self.bits.len() != other.bits.len() {
            return Err(ScriptError::invalid_argument(format!(
                "set sizes differ ({} vs {})",
                self.bits.len(),
                other.bits.len()
            )));
        }
        Ok(())
    }
}

/// Sets print as ranges of member indices: `({0:3 7})`
impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let mut run: Option<(usize, usize)> = None;
        for idx in self.indices() {
            run = match run {
                Some((start, end)) if end + 1 == idx => Some((start, idx)),
                Some(done) => {
                    parts.push(done);
                    Some((idx, idx))
                }
                None => Some((idx, idx)),
            };
        }
        parts.extend(run);

        let body: Vec<String> = parts
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{}:{}", start, end)
                }
            })
            .collect();
        match self.flavor {
            SetFlavor::Particle => write!(f, "({{{}}})", body.join(" ")),
            SetFlavor::Bond => write!(f, "[{{{}}}]", body.join(" ")),
        }
    }
}

/* ===================== Serialization ===================== */

#[derive(Serialize, Deserialize)]
struct SetRepr {
    flavor: SetFlavor,
    len: usize,
    indices: Vec<usize>,
}

impl From<SelectionSet> for SetRepr {
    fn from(set: SelectionSet) -> Self {
        SetRepr {
            flavor: set.flavor,
            len: set.universe_len(),
            indices: set.indices().collect(),
        }
    }
}

impl TryFrom<SetRepr> for SelectionSet {
    type Error = String;

    fn try_from(repr: SetRepr) -> Result<Self, Self::Error> {
        if let Some(bad) = repr.indices.iter().find(|&&i| i >= repr.len) {
            return Err(format!("set index {} outside universe of {}", bad, repr.len));
        }
        Ok(SelectionSet::from_indices(repr.flavor, repr.len, repr.indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(indices: &[usize]) -> SelectionSet {
        SelectionSet::from_indices(SetFlavor::Particle, 10, indices.iter().copied())
    }

    #[test]
    fn test_empty_and_all() {
        let empty = SelectionSet::empty(SetFlavor::Particle, 8);
        let all = SelectionSet::all(SetFlavor::Particle, 8);
        assert!(empty.is_empty());
        assert_eq!(all.count(), 8);
        assert_eq!(all.universe_len(), 8);
    }

    #[test]
    fn test_insert_ignores_out_of_range() {
        let mut s = SelectionSet::empty(SetFlavor::Particle, 4);
        s.insert(2);
        s.insert(99);
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![2]);
        s.remove(2);
        assert!(s.is_empty());
    }

    #[test]
    fn test_union_commutes() {
        let a = set(&[0, 2, 4]);
        let b = set(&[1, 2, 9]);
        assert_eq!(a.union(&b).unwrap(), b.union(&a).unwrap());
        assert_eq!(a.union(&b).unwrap().count(), 5);
    }

    #[test]
    fn test_intersection_is_idempotent() {
        let a = set(&[1, 3, 5, 7]);
        assert_eq!(a.intersection(&a).unwrap(), a);
    }

    #[test]
    fn test_double_complement_is_identity() {
        let a = set(&[0, 9]);
        let c = a.complement();
        assert_eq!(c.count(), 8);
        assert_eq!(c.complement(), a);
    }

    #[test]
    fn test_difference_and_symmetric_difference() {
        let a = set(&[1, 2, 3]);
        let b = set(&[3, 4]);
        assert_eq!(a.difference(&b).unwrap(), set(&[1, 2]));
        assert_eq!(a.symmetric_difference(&b).unwrap(), set(&[1, 2, 4]));
    }

    #[test]
    fn test_mismatched_operands_are_rejected() {
        let particles = set(&[1]);
        let bonds = SelectionSet::from_indices(SetFlavor::Bond, 10, [1]);
        let shorter = SelectionSet::from_indices(SetFlavor::Particle, 5, [1]);
        assert!(particles.union(&bonds).is_err());
        assert!(particles.intersection(&shorter).is_err());
    }

    #[test]
    fn test_restrict_to_universe() {
        let a = set(&[1, 8]);
        let shrunk = a.restrict_to_universe(5);
        assert_eq!(shrunk.indices().collect::<Vec<_>>(), vec![1]);
        let grown = a.restrict_to_universe(12);
        assert_eq!(grown.universe_len(), 12);
        assert_eq!(grown.count(), 2);
    }

    #[test]
    fn test_matching_and_nth_member() {
        let evens = SelectionSet::matching(SetFlavor::Particle, 7, |i| i % 2 == 0);
        assert_eq!(evens.indices().collect::<Vec<_>>(), vec![0, 2, 4, 6]);
        assert_eq!(evens.nth_member(2).unwrap().first(), Some(4));
        assert!(evens.nth_member(9).is_none());
    }

    #[test]
    fn test_display_compresses_runs() {
        assert_eq!(set(&[0, 1, 2, 3, 7]).to_string(), "({0:3 7})");
        assert_eq!(set(&[]).to_string(), "({})");
        let bonds = SelectionSet::from_indices(SetFlavor::Bond, 4, [2]);
        assert_eq!(bonds.to_string(), "[{2}]");
    }

    #[test]
    fn test_serde_keeps_members() {
        let a = set(&[2, 5]);
        let json = serde_json::to_string(&a).unwrap();
        let back: SelectionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);

        let bad = r#"{"flavor":"Particle","len":3,"indices":[4]}"#;
        assert!(serde_json::from_str::<SelectionSet>(bad).is_err());
    }
}
