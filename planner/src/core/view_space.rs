//! Candidate view collection with feasibility flags.

use crate::core::types::{View, ViewId};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    view: View,
    bad: bool,
}

/// Ordered candidate views, each flagged good or bad.
///
/// A view marked bad stays excluded until the whole space is replaced; there is
/// no way to clear a single flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSpace {
    entries: Vec<Entry>,
}

impl ViewSpace {
    /// Build a space where every view starts out good.
    pub fn new(views: Vec<View>) -> Self {
        Self {
            entries: views
                .into_iter()
                .map(|view| Entry { view, bad: false })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn view(&self, index: usize) -> Option<&View> {
        self.entries.get(index).map(|entry| &entry.view)
    }

    /// Indices of views not marked bad, in space order.
    pub fn good_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.bad)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn good_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.bad).count()
    }

    pub fn is_bad(&self, id: ViewId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.view.id == id && entry.bad)
    }

    /// Mark every view with `id` bad. Returns false if no such view exists.
    pub fn mark_bad(&mut self, id: ViewId) -> bool {
        let mut found = false;
        for entry in &mut self.entries {
            if entry.view.id == id {
                entry.bad = true;
                found = true;
            }
        }
        found
    }

    /// Replace the whole space; all flags reset to good.
    pub fn replace(&mut self, other: ViewSpace) {
        *self = other;
    }
}
