//! Global readiness estimate and termination policy.
//!
//! Termination rules are evaluated in a fixed priority order and the first
//! match supplies the audit reason recorded on the completed assessment.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::types::{
    CompletionPrediction, CompletionStatus, FunctionalModule, ModuleScore, SymptomCluster,
};

/// Cluster confidence counting toward the clear-pattern termination rule.
const STRONG_CLUSTER_CONFIDENCE: f64 = 0.8;

/// Strong clusters needed for the clear-pattern termination rule.
const STRONG_CLUSTERS_FOR_EXIT: usize = 2;

/// Recompute the completion prediction from the module table.
pub fn predict(
    config: &EngineConfig,
    table: &BTreeMap<FunctionalModule, ModuleScore>,
) -> CompletionPrediction {
    let missing_critical_areas: Vec<FunctionalModule> = table
        .values()
        .filter(|m| m.priority >= 7.0 && m.completion_status == CompletionStatus::NotStarted)
        .map(|m| m.module)
        .collect();

    let estimated_questions_remaining: usize = table
        .values()
        .filter(|m| {
            matches!(
                m.completion_status,
                CompletionStatus::NotStarted | CompletionStatus::InProgress
            )
        })
        .map(|m| {
            config
                .module_policy(m.module)
                .min_questions
                .saturating_sub(m.questions_answered)
        })
        .sum();

    let activated = table.values().filter(|m| m.activated).count();
    let sufficient = sufficient_count(table);
    let confidence = if activated > 0 {
        (sufficient as f64 / activated as f64).min(0.95)
    } else {
        0.0
    };

    CompletionPrediction {
        estimated_questions_remaining,
        confidence,
        ready_for_analysis: sufficient >= 3
            && screening_complete(table)
            && missing_critical_areas.is_empty(),
        missing_critical_areas,
    }
}

/// First matching termination rule, or `None` to keep going.
pub fn termination_reason(
    config: &EngineConfig,
    questions_asked: usize,
    table: &BTreeMap<FunctionalModule, ModuleScore>,
    clusters: &[SymptomCluster],
    prediction: &CompletionPrediction,
) -> Option<String> {
    if questions_asked >= config.target_max_questions {
        return Some("Maximum question limit reached".to_string());
    }

    if questions_asked >= config.target_min_questions
        && average_score(table) < config.low_risk_score_ceiling
    {
        return Some("Low symptom burden across all modules".to_string());
    }

    let strong_clusters = clusters
        .iter()
        .filter(|c| c.confidence > STRONG_CLUSTER_CONFIDENCE)
        .count();
    if questions_asked >= config.pattern_exit_floor && strong_clusters >= STRONG_CLUSTERS_FOR_EXIT {
        return Some("Clear symptom patterns identified".to_string());
    }

    if questions_asked >= config.target_min_questions
        && sufficient_count(table) >= 3
        && screening_complete(table)
        && prediction.missing_critical_areas.is_empty()
    {
        return Some("Sufficient data collected for analysis".to_string());
    }

    None
}

pub fn average_score(table: &BTreeMap<FunctionalModule, ModuleScore>) -> f64 {
    if table.is_empty() {
        return 0.0;
    }
    table.values().map(|m| m.score).sum::<f64>() / table.len() as f64
}

fn sufficient_count(table: &BTreeMap<FunctionalModule, ModuleScore>) -> usize {
    table
        .values()
        .filter(|m| m.completion_status >= CompletionStatus::Sufficient)
        .count()
}

fn screening_complete(table: &BTreeMap<FunctionalModule, ModuleScore>) -> bool {
    table
        .get(&FunctionalModule::Screening)
        .map(|m| m.completion_status == CompletionStatus::Complete)
        .unwrap_or(false)
}
