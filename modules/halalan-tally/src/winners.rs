use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerCount {
    pub name: String,
    pub count: u64,
}

/// How many areas each name topped during one run. Feeds the legend.
#[derive(Debug, Default)]
pub struct WinnerTracker {
    index: HashMap<String, usize>,
    counts: Vec<WinnerCount>,
}

impl WinnerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more area won by `name`. Empty names are ignored.
    pub fn update(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        match self.index.get(name) {
            Some(&i) => self.counts[i].count += 1,
            None => {
                self.index.insert(name.to_string(), self.counts.len());
                self.counts.push(WinnerCount {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Counts sorted descending; equal counts stay in first-seen order.
    pub fn snapshot(&self) -> Vec<WinnerCount> {
        let mut snapshot = self.counts.clone();
        snapshot.sort_by(|a, b| b.count.cmp(&a.count));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
