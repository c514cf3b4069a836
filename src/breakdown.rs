use crate::schema::ProjectId;
use crate::utils::round2;
use serde::Serialize;
use std::collections::HashMap;

pub const UNASSIGNED_LABEL: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub project_id: Option<ProjectId>,
    pub project: String,
    pub amount: f64,
}

/// Per-project running sums for one bucket. Amounts that reached no project
/// are kept under [`UNASSIGNED_LABEL`] so the entries add up to the bucket.
#[derive(Debug, Clone, Default)]
pub struct BreakdownBuilder {
    entries: Vec<BreakdownEntry>,
    index: HashMap<Option<ProjectId>, usize>,
}

impl BreakdownBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, project_id: Option<ProjectId>, name: Option<&str>, amount: f64) {
        match self.index.get(&project_id) {
            Some(&i) => self.entries[i].amount += amount,
            None => {
                self.index.insert(project_id, self.entries.len());
                self.entries.push(BreakdownEntry {
                    project_id,
                    project: name.unwrap_or(UNASSIGNED_LABEL).to_string(),
                    amount,
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by amount, largest first, with zero entries dropped.
    pub fn finish(&self) -> Vec<BreakdownEntry> {
        let mut entries: Vec<BreakdownEntry> = self
            .entries
            .iter()
            .map(|e| BreakdownEntry {
                amount: round2(e.amount),
                ..e.clone()
            })
            .filter(|e| e.amount != 0.0)
            .collect();

        entries.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        entries
    }
}
