//! Symptom-cluster detection over the response history.
//!
//! Clusters are recomputed from scratch after every answer, so they always
//! reflect the current history rather than an incremental approximation.

use std::collections::{HashMap, HashSet};

use crate::catalog::QuestionCatalog;
use crate::config::PatternDefinition;
use crate::response_log::ResponseLog;
use crate::types::{FunctionalModule, ResponseClass, Severity, SymptomCluster};

/// Confidence above which a cluster is trusted enough to make its
/// `skip_if_clear` questions redundant.
pub const SKIP_CONFIDENCE_FLOOR: f64 = 0.7;

/// Match each response history against the configured pattern library.
///
/// A cluster's confidence is the fraction of its key symptoms confirmed by
/// a positively-classified answer. Severity buckets the average score of
/// the cluster's related modules. Clusters with no evidence are dropped.
pub fn detect(
    patterns: &[PatternDefinition],
    catalog: &dyn QuestionCatalog,
    log: &ResponseLog,
    raw_module_scores: &HashMap<FunctionalModule, f64>,
) -> Vec<SymptomCluster> {
    let confirmed = confirmed_tags(catalog, log);

    let mut clusters = Vec::new();
    for pattern in patterns {
        if pattern.key_symptoms.is_empty() {
            continue;
        }
        let matched = pattern
            .key_symptoms
            .iter()
            .filter(|tag| confirmed.contains(tag.as_str()))
            .count();
        if matched == 0 {
            continue;
        }

        let confidence = matched as f64 / pattern.key_symptoms.len() as f64;
        clusters.push(SymptomCluster {
            name: pattern.name.clone(),
            confidence,
            severity: severity_for(pattern, raw_module_scores),
            related_modules: pattern.related_modules.clone(),
            key_symptoms: pattern.key_symptoms.clone(),
        });
    }

    // Strongest evidence first, so summaries and prompts lead with it.
    clusters.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    clusters
}

/// Clinical-relevance tags confirmed by a positive answer.
fn confirmed_tags(catalog: &dyn QuestionCatalog, log: &ResponseLog) -> HashSet<String> {
    let mut tags = HashSet::new();
    for response in log.entries() {
        if response.classification != ResponseClass::Positive {
            continue;
        }
        if let Some(question) = catalog.by_id(&response.question_id) {
            for tag in &question.clinical_relevance {
                tags.insert(tag.clone());
            }
        }
    }
    tags
}

fn severity_for(
    pattern: &PatternDefinition,
    raw_module_scores: &HashMap<FunctionalModule, f64>,
) -> Severity {
    if pattern.related_modules.is_empty() {
        return Severity::Low;
    }
    let sum: f64 = pattern
        .related_modules
        .iter()
        .map(|m| raw_module_scores.get(m).copied().unwrap_or(0.0))
        .sum();
    let avg = sum / pattern.related_modules.len() as f64;

    if avg >= 75.0 {
        Severity::Critical
    } else if avg >= 50.0 {
        Severity::High
    } else if avg >= 25.0 {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

/// Union of `skip_if_clear` tags across clusters confident enough to make
/// their covered questions redundant.
pub fn skip_tags<'a>(
    patterns: &'a [PatternDefinition],
    clusters: &[SymptomCluster],
) -> HashSet<&'a str> {
    let mut tags = HashSet::new();
    for cluster in clusters {
        if cluster.confidence <= SKIP_CONFIDENCE_FLOOR {
            continue;
        }
        if let Some(pattern) = patterns.iter().find(|p| p.name == cluster.name) {
            for tag in &pattern.skip_if_clear {
                tags.insert(tag.as_str());
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::scoring::classify;
    use crate::types::{Question, Response, ResponseValue};
    use chrono::Utc;

    fn catalog() -> StaticCatalog {
        StaticCatalog::from_json(
            r#"[
                {"id": "E1", "module": "ENERGY", "text": "Fatigue?", "type": "YES_NO",
                 "clinicalRelevance": ["fatigue"]},
                {"id": "E2", "module": "ENERGY", "text": "Brain fog?", "type": "YES_NO",
                 "clinicalRelevance": ["brain_fog"]},
                {"id": "E3", "module": "ENERGY", "text": "Exercise intolerance?", "type": "YES_NO",
                 "clinicalRelevance": ["exercise_intolerance"]},
                {"id": "E4", "module": "ENERGY", "text": "Crashes?", "type": "YES_NO",
                 "clinicalRelevance": ["mitochondrial_function"]}
            ]"#,
        )
        .unwrap()
    }

    fn mito_pattern() -> PatternDefinition {
        PatternDefinition {
            name: "mitochondrial_dysfunction".into(),
            related_modules: vec![FunctionalModule::Energy],
            key_symptoms: vec![
                "fatigue".into(),
                "brain_fog".into(),
                "exercise_intolerance".into(),
                "mitochondrial_function".into(),
            ],
            skip_if_clear: vec!["general_energy_screening".into()],
        }
    }

    fn answer(catalog: &StaticCatalog, log: &mut ResponseLog, id: &str, text: &str) {
        let q: &Question = catalog.by_id(id).unwrap();
        let value = ResponseValue::Text(text.into());
        log.append(Response {
            question_id: q.id.clone(),
            module: q.module,
            question_type: q.question_type,
            question_text: q.text.clone(),
            classification: classify(q, &value),
            value,
            answered_at: Utc::now(),
        });
    }

    #[test]
    fn test_confidence_is_fraction_of_confirmed_symptoms() {
        let catalog = catalog();
        let patterns = vec![mito_pattern()];
        let mut log = ResponseLog::new();
        answer(&catalog, &mut log, "E1", "yes");
        answer(&catalog, &mut log, "E2", "yes");
        answer(&catalog, &mut log, "E3", "no"); // negative: not confirmed

        let scores = HashMap::from([(FunctionalModule::Energy, 60.0)]);
        let clusters = detect(&patterns, &catalog, &log, &scores);
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].confidence - 0.5).abs() < 1e-9);
        assert_eq!(clusters[0].severity, Severity::High);
    }

    #[test]
    fn test_no_evidence_no_cluster() {
        let catalog = catalog();
        let patterns = vec![mito_pattern()];
        let mut log = ResponseLog::new();
        answer(&catalog, &mut log, "E1", "no");

        let clusters = detect(&patterns, &catalog, &log, &HashMap::new());
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_severity_buckets() {
        let catalog = catalog();
        let patterns = vec![mito_pattern()];
        let mut log = ResponseLog::new();
        answer(&catalog, &mut log, "E1", "yes");

        for (score, expected) in [
            (10.0, Severity::Low),
            (30.0, Severity::Moderate),
            (55.0, Severity::High),
            (80.0, Severity::Critical),
        ] {
            let scores = HashMap::from([(FunctionalModule::Energy, score)]);
            let clusters = detect(&patterns, &catalog, &log, &scores);
            assert_eq!(clusters[0].severity, expected, "score {score}");
        }
    }

    #[test]
    fn test_skip_tags_require_confident_cluster() {
        let patterns = vec![mito_pattern()];
        let mut cluster = SymptomCluster {
            name: "mitochondrial_dysfunction".into(),
            confidence: 0.5,
            severity: Severity::Moderate,
            related_modules: vec![FunctionalModule::Energy],
            key_symptoms: Vec::new(),
        };
        assert!(skip_tags(&patterns, std::slice::from_ref(&cluster)).is_empty());

        cluster.confidence = 0.75;
        let tags = skip_tags(&patterns, std::slice::from_ref(&cluster));
        assert!(tags.contains("general_energy_screening"));
    }
}
