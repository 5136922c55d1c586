//! Executed-statement history

use std::collections::VecDeque;

/// Bounded log of executed statement texts (oldest first)
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    max_entries: usize,
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a statement; blank text and repeats of the last entry are skipped
    pub fn push(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.entries.back().is_some_and(|last| last == text) {
            return;
        }
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(text.to_string());
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.as_str())
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}
