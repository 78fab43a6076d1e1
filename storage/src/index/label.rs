//! Label index: label -> set of item ids, with a reverse map for removal.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct LabelIndex {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, label: &str) {
        self.forward.entry(label.to_string()).or_default().insert(id.to_string());
        self.reverse.entry(id.to_string()).or_default().insert(label.to_string());
    }

    pub fn query(&self, label: &str) -> HashSet<String> {
        self.forward.get(label).cloned().unwrap_or_default()
    }

    /// Removes `id` from every label it was indexed under.
    pub fn remove(&mut self, id: &str) {
        if let Some(labels) = self.reverse.remove(id) {
            for label in labels {
                if let Some(set) = self.forward.get_mut(&label) {
                    set.remove(id);
                    if set.is_empty() {
                        self.forward.remove(&label);
                    }
                }
            }
        }
    }
}
