//! Dietary-oil exposure/damage rollup.

use crate::catalog::QuestionCatalog;
use crate::response_log::ResponseLog;
use crate::scoring;
use crate::types::SeedMetrics;

/// Relevance tag feeding the exposure score.
pub const EXPOSURE_TAG: &str = "seed_oil_exposure";

/// Relevance tag feeding the damage score.
pub const DAMAGE_TAG: &str = "oxidative_damage";

/// Normalized score at or above which a finding is worth surfacing.
const CRITICAL_FINDING_FLOOR: f64 = 3.0;

/// Recompute seed metrics from the seed-oil-relevant slice of the history.
pub fn aggregate(catalog: &dyn QuestionCatalog, log: &ResponseLog) -> SeedMetrics {
    let mut exposure_score = 0.0;
    let mut damage_score = 0.0;
    let mut questions_asked = 0;
    let mut critical_findings = Vec::new();

    for response in log.entries() {
        let Some(question) = catalog.by_id(&response.question_id) else {
            continue;
        };
        if !question.is_seed_oil() {
            continue;
        }
        questions_asked += 1;

        let score = scoring::normalize(question, &response.value);
        if question.clinical_relevance.iter().any(|t| t == EXPOSURE_TAG) {
            exposure_score += score;
        }
        if question.clinical_relevance.iter().any(|t| t == DAMAGE_TAG) {
            damage_score += score;
        }
        if score >= CRITICAL_FINDING_FLOOR {
            critical_findings.push(question.text.clone());
        }
    }

    let damage_indicators = damage_score.min(10.0);
    SeedMetrics {
        exposure_level: exposure_score.min(10.0),
        damage_indicators,
        recovery_potential: (10.0 - damage_indicators).max(0.0),
        questions_asked,
        critical_findings,
    }
}
