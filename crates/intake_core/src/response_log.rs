//! Append-only record of accepted answers for one assessment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{FunctionalModule, Response};

/// Ordered answer history. Entries are appended on accept and never
/// mutated or removed, so every derived metric can be recomputed from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseLog {
    entries: Vec<Response>,
    #[serde(skip)]
    answered: HashSet<String>,
}

impl ResponseLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the answered-id index after deserialization.
    pub fn from_entries(entries: Vec<Response>) -> Self {
        let answered = entries.iter().map(|r| r.question_id.clone()).collect();
        Self { entries, answered }
    }

    pub fn append(&mut self, response: Response) {
        self.answered.insert(response.question_id.clone());
        self.entries.push(response);
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.answered.contains(question_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Response] {
        &self.entries
    }

    pub fn for_module(&self, module: FunctionalModule) -> Vec<&Response> {
        self.entries.iter().filter(|r| r.module == module).collect()
    }

    /// Last `n` answers, oldest first. Used for advisor context.
    pub fn recent(&self, n: usize) -> &[Response] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }
}
