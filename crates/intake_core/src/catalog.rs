//! Question catalog: read-only lookup over the static bank.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{FunctionalModule, Question};

/// Read-only question lookup. The engine never mutates the catalog.
pub trait QuestionCatalog: Send + Sync {
    /// Questions of one module, in bank order.
    fn by_module(&self, module: FunctionalModule) -> Vec<&Question>;
    fn by_id(&self, id: &str) -> Option<&Question>;
    /// All questions tagged relevant to dietary-oil metrics.
    fn seed_oil_questions(&self) -> Vec<&Question>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory catalog backed by a flat question list.
pub struct StaticCatalog {
    questions: Vec<Question>,
    by_id: HashMap<String, usize>,
}

impl StaticCatalog {
    pub fn new(questions: Vec<Question>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(questions.len());
        for (idx, question) in questions.iter().enumerate() {
            if by_id.insert(question.id.clone(), idx).is_some() {
                return Err(anyhow!("duplicate question id in bank: {}", question.id));
            }
        }
        Ok(Self { questions, by_id })
    }

    /// Load a bank from a JSON document: either a bare array of questions
    /// or an object with a top-level `questions` array.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read question bank: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed to parse question bank: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct Bank {
            questions: Vec<Question>,
        }

        let questions = match serde_json::from_str::<Vec<Question>>(content) {
            Ok(list) => list,
            Err(_) => serde_json::from_str::<Bank>(content)?.questions,
        };
        Self::new(questions)
    }
}

impl QuestionCatalog for StaticCatalog {
    fn by_module(&self, module: FunctionalModule) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.module == module).collect()
    }

    fn by_id(&self, id: &str) -> Option<&Question> {
        self.by_id.get(id).map(|&idx| &self.questions[idx])
    }

    fn seed_oil_questions(&self) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.is_seed_oil()).collect()
    }

    fn len(&self) -> usize {
        self.questions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> StaticCatalog {
        StaticCatalog::from_json(
            r#"[
                {"id": "SCR001", "module": "SCREENING", "text": "Energy level?", "type": "LIKERT_SCALE"},
                {"id": "SCR_SO01", "module": "SCREENING", "text": "Fried food?", "type": "FREQUENCY",
                 "category": "SEED_OIL", "seedOilRelevant": true},
                {"id": "ASM001", "module": "ASSIMILATION", "text": "Bloating?", "type": "FREQUENCY"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_module_preserves_bank_order() {
        let catalog = bank();
        let screening = catalog.by_module(FunctionalModule::Screening);
        assert_eq!(screening.len(), 2);
        assert_eq!(screening[0].id, "SCR001");
        assert_eq!(screening[1].id, "SCR_SO01");
    }

    #[test]
    fn test_lookup_by_id() {
        let catalog = bank();
        assert!(catalog.by_id("ASM001").is_some());
        assert!(catalog.by_id("NOPE").is_none());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_seed_oil_filter() {
        let catalog = bank();
        let seed = catalog.seed_oil_questions();
        assert_eq!(seed.len(), 1);
        assert_eq!(seed[0].id, "SCR_SO01");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = StaticCatalog::from_json(
            r#"[
                {"id": "A", "module": "SCREENING", "text": "x", "type": "YES_NO"},
                {"id": "A", "module": "SCREENING", "text": "y", "type": "YES_NO"}
            ]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_wrapped_bank_object() {
        let catalog = StaticCatalog::from_json(
            r#"{"questions": [{"id": "A", "module": "ENERGY", "text": "x", "type": "YES_NO"}]}"#,
        )
        .unwrap();
        assert_eq!(catalog.by_module(FunctionalModule::Energy).len(), 1);
    }
}
