//! Per-module activation, completion, and priority tracking.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::EngineConfig;
use crate::response_log::ResponseLog;
use crate::types::{
    CompletionStatus, FunctionalModule, ModuleScore, SeedMetrics, SymptomCluster, MODULE_SEQUENCE,
};

/// Recompute the per-module state table.
///
/// Two facts are sticky across turns and taken from the previous table:
/// `activated` only ever flips false to true, and `completion_status` never
/// regresses even if a later config swap lowers the thresholds.
pub fn recompute(
    config: &EngineConfig,
    raw_scores: &HashMap<FunctionalModule, f64>,
    log: &ResponseLog,
    clusters: &[SymptomCluster],
    seed_metrics: &SeedMetrics,
    forced_active: &BTreeSet<FunctionalModule>,
    previous: &BTreeMap<FunctionalModule, ModuleScore>,
) -> BTreeMap<FunctionalModule, ModuleScore> {
    let mut table = BTreeMap::new();

    for module in MODULE_SEQUENCE {
        let policy = config.module_policy(module);
        let score = raw_scores.get(&module).copied().unwrap_or(0.0);
        let answered = log.for_module(module).len();
        let prev = previous.get(&module);

        let activated = prev.map(|p| p.activated).unwrap_or(false)
            || forced_active.contains(&module)
            || score >= policy.activation_threshold
            || module == FunctionalModule::Screening;

        let computed_status = if answered == 0 {
            CompletionStatus::NotStarted
        } else if answered >= policy.max_questions {
            CompletionStatus::Complete
        } else if answered >= policy.min_questions {
            CompletionStatus::Sufficient
        } else {
            CompletionStatus::InProgress
        };
        let completion_status = prev
            .map(|p| p.completion_status.max(computed_status))
            .unwrap_or(computed_status);

        table.insert(
            module,
            ModuleScore {
                module,
                score,
                questions_answered: answered,
                activated,
                priority: priority_for(module, score, clusters, seed_metrics),
                completion_status,
            },
        );
    }

    table
}

/// 0-10 ordering key: score-driven, boosted by detected clusters and by
/// high dietary-oil exposure for the modules it implicates.
fn priority_for(
    module: FunctionalModule,
    score: f64,
    clusters: &[SymptomCluster],
    seed_metrics: &SeedMetrics,
) -> f64 {
    let mut priority = (score / 10.0).min(10.0);

    if clusters.iter().any(|c| c.related_modules.contains(&module)) {
        priority += 2.0;
    }

    let seed_implicated = matches!(
        module,
        FunctionalModule::Energy | FunctionalModule::Biotransformation
    );
    if seed_implicated && seed_metrics.exposure_level > 5.0 {
        priority += 1.0;
    }

    priority.clamp(0.0, 10.0)
}
