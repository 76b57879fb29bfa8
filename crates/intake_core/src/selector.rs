//! Next-question selection.
//!
//! Tier A deterministically filters the module's catalog down to applicable
//! candidates. Tier B asks the advisor to pick among them. Tier C is the
//! deterministic fallback used whenever the advisor is absent or its advice
//! is unusable. Every turn resolves through one of these tiers; advisor
//! trouble is absorbed here and never propagates.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::advisor::{Advisor, AdvisorContext};
use crate::catalog::QuestionCatalog;
use crate::config::ModulePolicy;
use crate::response_log::ResponseLog;
use crate::types::{CompletionStatus, FunctionalModule, Gender, ModuleScore, Question, MODULE_SEQUENCE};

/// Selection confidence bounds (observability only).
const BASE_CONFIDENCE: f64 = 0.7;
const MAX_CONFIDENCE: f64 = 0.95;

/// Seed-oil questions the fallback front-loads per module.
const SEED_OIL_QUOTA: usize = 2;

/// Tier A output: the ordered candidate pool plus the ids it excluded as
/// provably redundant (these feed the questions-saved counter).
#[derive(Debug, Default)]
pub struct CandidatePool<'a> {
    pub candidates: Vec<&'a Question>,
    pub skipped: Vec<String>,
}

/// The chosen question with its audit trail.
#[derive(Debug, Clone)]
pub struct Selection {
    pub question: Question,
    pub reasoning: String,
    /// 0.7-0.95, for observability only.
    pub confidence: f64,
    pub via_advisor: bool,
    /// Ids Tier A excluded this turn as redundant.
    pub skipped: Vec<String>,
}

/// Tier A: filter the module's catalog down to askable questions.
///
/// Order matters: injected follow-ups first, then unanswered gateway
/// questions, then the rest in catalog order.
pub fn candidate_pool<'a>(
    catalog: &'a dyn QuestionCatalog,
    module: FunctionalModule,
    policy: &ModulePolicy,
    log: &ResponseLog,
    conditional_skips: &HashSet<String>,
    cluster_skip_tags: &HashSet<&str>,
    gender: Option<Gender>,
    injected: &[String],
) -> CandidatePool<'a> {
    let mut pool = CandidatePool::default();
    let mut seen: HashSet<&str> = HashSet::new();

    let askable = |q: &Question, pool: &mut CandidatePool| -> bool {
        if log.contains(&q.id) {
            return false;
        }
        if conditional_skips.contains(&q.id) {
            pool.skipped.push(q.id.clone());
            return false;
        }
        if q.clinical_relevance.iter().any(|t| cluster_skip_tags.contains(t.as_str())) {
            pool.skipped.push(q.id.clone());
            return false;
        }
        if !q.applies_to(gender) {
            return false;
        }
        true
    };

    // Injected follow-ups jump the queue, regardless of module.
    for id in injected {
        if let Some(q) = catalog.by_id(id) {
            if seen.insert(&q.id) && askable(q, &mut pool) {
                pool.candidates.push(q);
            }
        }
    }

    let module_questions = catalog.by_module(module);
    for id in &policy.critical_questions {
        if let Some(q) = module_questions.iter().copied().find(|q| &q.id == id) {
            if seen.insert(&q.id) && askable(q, &mut pool) {
                pool.candidates.push(q);
            }
        }
    }
    for q in module_questions {
        if seen.insert(&q.id) && askable(q, &mut pool) {
            pool.candidates.push(q);
        }
    }

    pool
}

/// Tiers B and C over a non-empty pool.
pub async fn select(
    advisor: Option<&dyn Advisor>,
    candidate_limit: usize,
    pool: CandidatePool<'_>,
    context: &AdvisorContext,
    catalog: &dyn QuestionCatalog,
    log: &ResponseLog,
) -> Option<Selection> {
    if pool.candidates.is_empty() {
        return None;
    }

    let offered: Vec<&Question> = pool.candidates.iter().take(candidate_limit).copied().collect();

    if let Some(advisor) = advisor {
        match advisor.propose(&offered, context).await {
            Ok(suggestion) => {
                // Untrusted advice: the id must come from the offered set.
                if let Some(q) = offered.iter().find(|q| q.id == suggestion.question_id) {
                    return Some(Selection {
                        confidence: selection_confidence(q, context),
                        question: (*q).clone(),
                        reasoning: if suggestion.reasoning.is_empty() {
                            "Advisor selection".to_string()
                        } else {
                            suggestion.reasoning
                        },
                        via_advisor: true,
                        skipped: pool.skipped,
                    });
                }
                debug!(
                    suggested = %suggestion.question_id,
                    "advisor suggested a question outside the candidate set, falling back"
                );
            }
            Err(e) => {
                debug!("advisor unavailable, falling back: {e}");
            }
        }
    }

    let chosen = fallback_choice(&pool.candidates, context.module, catalog, log);
    Some(Selection {
        confidence: selection_confidence(chosen, context),
        question: chosen.clone(),
        reasoning: "Deterministic fallback selection".to_string(),
        via_advisor: false,
        skipped: pool.skipped,
    })
}

/// Tier C: front-load seed-oil questions until the module has asked its
/// quota, then take the first candidate in catalog order.
fn fallback_choice<'a>(
    candidates: &[&'a Question],
    module: FunctionalModule,
    catalog: &dyn QuestionCatalog,
    log: &ResponseLog,
) -> &'a Question {
    let seed_oil_asked = log
        .for_module(module)
        .iter()
        .filter(|r| catalog.by_id(&r.question_id).map(|q| q.is_seed_oil()).unwrap_or(false))
        .count();

    if seed_oil_asked < SEED_OIL_QUOTA {
        if let Some(q) = candidates.iter().find(|q| q.is_seed_oil()) {
            return q;
        }
    }
    candidates[0]
}

fn selection_confidence(question: &Question, context: &AdvisorContext) -> f64 {
    let matched_cluster = context
        .clusters
        .iter()
        .filter(|c| {
            question
                .clinical_relevance
                .iter()
                .any(|tag| c.key_symptoms.contains(tag))
        })
        .map(|c| c.confidence)
        .fold(0.0, f64::max);

    (BASE_CONFIDENCE + 0.1 * matched_cluster + 0.05 * question.scoring_weight).min(MAX_CONFIDENCE)
}

/// Pick the module to move to once the current one is exhausted or exited.
///
/// Highest-priority activated module still needing answers wins; with none
/// left, fall back to the first never-activated module in catalog order.
/// `None` means the assessment has nowhere left to go.
pub fn next_module(
    table: &BTreeMap<FunctionalModule, ModuleScore>,
    exclude: &BTreeSet<FunctionalModule>,
) -> Option<FunctionalModule> {
    let best = table
        .values()
        .filter(|m| {
            m.activated
                && m.completion_status < CompletionStatus::Sufficient
                && !exclude.contains(&m.module)
        })
        .max_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                // Stable: earlier catalog order wins ties.
                .then_with(|| b.module.cmp(&a.module))
        });
    if let Some(m) = best {
        return Some(m.module);
    }

    MODULE_SEQUENCE.into_iter().find(|m| {
        !exclude.contains(m) && table.get(m).map(|s| !s.activated).unwrap_or(true)
    })
}
