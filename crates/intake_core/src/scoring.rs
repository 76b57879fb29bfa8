//! Response normalization and weighted module scoring.
//!
//! Scores are pure functions of the response history: every turn recomputes
//! from scratch instead of patching increments, trading a bounded O(n) walk
//! (the hard cap is 250 answers) for drift-free numbers.

use crate::catalog::QuestionCatalog;
use crate::types::{Question, QuestionType, Response, ResponseClass, ResponseValue};

/// Default upper bound for Likert normalization when the question carries
/// no explicit scale.
pub const DEFAULT_LIKERT_MAX: f64 = 10.0;

/// Five-point thresholds for answer classification. The exit policy reads
/// severity on the bank's native 5-point scale.
const LIKERT_NEGATIVE_CEILING: f64 = 2.0;
const LIKERT_POSITIVE_FLOOR: f64 = 4.0;

/// Normalize a raw answer into the question's score contribution.
///
/// Malformed metadata (missing options, absent scores, non-numeric Likert
/// answers) degrades to 0 rather than failing: one bad catalog entry must
/// never block an assessment.
pub fn normalize(question: &Question, value: &ResponseValue) -> f64 {
    match question.question_type {
        QuestionType::LikertScale => {
            let max = question.scale.map(|s| s.max).unwrap_or(DEFAULT_LIKERT_MAX);
            if max <= 0.0 {
                return 0.0;
            }
            value.as_number().map(|n| n / max).unwrap_or(0.0)
        }
        _ => option_score(question, value),
    }
}

fn option_score(question: &Question, value: &ResponseValue) -> f64 {
    if question.options.is_empty() {
        return 0.0;
    }
    match value {
        ResponseValue::Multi(items) => items
            .iter()
            .map(|item| {
                let item_value = ResponseValue::Text(item.clone());
                question
                    .options
                    .iter()
                    .find(|o| o.value.matches(&item_value))
                    .and_then(|o| o.score)
                    .unwrap_or(0.0)
            })
            .sum(),
        single => question
            .options
            .iter()
            .find(|o| o.value.matches(single))
            .and_then(|o| o.score)
            .unwrap_or(0.0),
    }
}

/// Classify an answer as positive (symptom present), negative (symptom
/// absent), or neutral. Computed once at accept time; downstream policies
/// read the stored class instead of re-parsing raw values.
pub fn classify(question: &Question, value: &ResponseValue) -> ResponseClass {
    match question.question_type {
        QuestionType::YesNo => match value.as_text().map(str::to_ascii_lowercase).as_deref() {
            Some("no") | Some("unsure") => ResponseClass::Negative,
            Some("yes") => ResponseClass::Positive,
            _ => ResponseClass::Neutral,
        },
        QuestionType::Frequency => match value {
            ResponseValue::Text(s) => {
                let s = s.to_ascii_lowercase();
                if s == "never" || s == "rarely" {
                    ResponseClass::Negative
                } else {
                    ResponseClass::Positive
                }
            }
            // Numeric frequency banks use 0=never, 1=rarely.
            ResponseValue::Number(n) => {
                if *n <= 1.0 {
                    ResponseClass::Negative
                } else {
                    ResponseClass::Positive
                }
            }
            ResponseValue::Multi(_) => ResponseClass::Neutral,
        },
        QuestionType::MultipleChoice => match value.as_text() {
            Some(s) if denies(s) => ResponseClass::Negative,
            Some(_) => ResponseClass::Positive,
            None => ResponseClass::Neutral,
        },
        QuestionType::LikertScale => match value.as_number() {
            Some(n) if n <= LIKERT_NEGATIVE_CEILING => ResponseClass::Negative,
            Some(n) if n >= LIKERT_POSITIVE_FLOOR => ResponseClass::Positive,
            Some(_) => ResponseClass::Neutral,
            None => ResponseClass::Neutral,
        },
        _ => ResponseClass::Neutral,
    }
}

/// Whole-token check for denial answers ("no", "none", "never"), replacing
/// the substring heuristics the bank format grew up with.
fn denies(text: &str) -> bool {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| matches!(token, "no" | "none" | "never"))
}

/// Weighted 0-100 score for one module's response subset.
///
/// `sum(normalize * weight) / sum(weight) * 20`. Responses whose question
/// is no longer in the catalog are skipped.
pub fn module_score(catalog: &dyn QuestionCatalog, responses: &[&Response]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }

    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    for response in responses {
        let Some(question) = catalog.by_id(&response.question_id) else {
            continue;
        };
        total_score += normalize(question, &response.value) * question.scoring_weight;
        total_weight += question.scoring_weight;
    }

    if total_weight > 0.0 {
        (total_score / total_weight) * 20.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::types::ResponseClass;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn question(json: &str) -> Question {
        serde_json::from_str(json).unwrap()
    }

    fn likert(id: &str, max: Option<f64>) -> Question {
        let scale = max
            .map(|m| format!(r#", "scale": {{"max": {m}}}"#))
            .unwrap_or_default();
        question(&format!(
            r#"{{"id": "{id}", "module": "SCREENING", "text": "t", "type": "LIKERT_SCALE"{scale}}}"#
        ))
    }

    #[test]
    fn test_normalize_likert_default_scale() {
        let q = likert("L1", None);
        assert_relative_eq!(normalize(&q, &ResponseValue::Number(7.0)), 0.7);
    }

    #[test]
    fn test_normalize_likert_custom_scale() {
        let q = likert("L1", Some(5.0));
        assert_relative_eq!(normalize(&q, &ResponseValue::Number(4.0)), 0.8);
    }

    #[test]
    fn test_normalize_option_match_and_miss() {
        let q = question(
            r#"{"id": "F1", "module": "SCREENING", "text": "t", "type": "FREQUENCY",
                "options": [
                    {"value": "never", "label": "Never", "score": 0},
                    {"value": "daily", "label": "Daily", "score": 4}
                ]}"#,
        );
        assert_relative_eq!(normalize(&q, &ResponseValue::Text("daily".into())), 4.0);
        // No matching option never raises; it contributes nothing.
        assert_relative_eq!(normalize(&q, &ResponseValue::Text("sometimes".into())), 0.0);
    }

    #[test]
    fn test_normalize_missing_metadata_degrades_to_zero() {
        let q = question(r#"{"id": "M1", "module": "SCREENING", "text": "t", "type": "MULTIPLE_CHOICE"}"#);
        assert_relative_eq!(normalize(&q, &ResponseValue::Text("anything".into())), 0.0);

        let q = likert("L1", None);
        assert_relative_eq!(normalize(&q, &ResponseValue::Text("not a number".into())), 0.0);
    }

    #[test]
    fn test_multi_select_sums_matched_options() {
        let q = question(
            r#"{"id": "MS1", "module": "SCREENING", "text": "t", "type": "MULTI_SELECT",
                "options": [
                    {"value": "canola", "label": "Canola", "score": 2},
                    {"value": "soybean", "label": "Soybean", "score": 3},
                    {"value": "olive", "label": "Olive", "score": 0}
                ]}"#,
        );
        let picked = ResponseValue::Multi(vec!["canola".into(), "soybean".into()]);
        assert_relative_eq!(normalize(&q, &picked), 5.0);
    }

    #[test]
    fn test_classify_yes_no() {
        let q = question(r#"{"id": "Y1", "module": "SCREENING", "text": "t", "type": "YES_NO"}"#);
        assert_eq!(classify(&q, &ResponseValue::Text("no".into())), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Text("unsure".into())), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Text("yes".into())), ResponseClass::Positive);
    }

    #[test]
    fn test_classify_frequency_text_and_numeric() {
        let q = question(r#"{"id": "F1", "module": "SCREENING", "text": "t", "type": "FREQUENCY"}"#);
        assert_eq!(classify(&q, &ResponseValue::Text("never".into())), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Text("rarely".into())), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Text("daily".into())), ResponseClass::Positive);
        assert_eq!(classify(&q, &ResponseValue::Number(1.0)), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Number(3.0)), ResponseClass::Positive);
    }

    #[test]
    fn test_classify_multiple_choice_denial_tokens() {
        let q = question(r#"{"id": "M1", "module": "SCREENING", "text": "t", "type": "MULTIPLE_CHOICE"}"#);
        assert_eq!(
            classify(&q, &ResponseValue::Text("none of these".into())),
            ResponseClass::Negative
        );
        assert_eq!(
            classify(&q, &ResponseValue::Text("no_symptoms".into())),
            ResponseClass::Negative
        );
        // "normal" contains "no" as a substring but is not a denial.
        assert_eq!(
            classify(&q, &ResponseValue::Text("normal appetite".into())),
            ResponseClass::Positive
        );
    }

    #[test]
    fn test_classify_likert_five_point() {
        let q = likert("L1", Some(5.0));
        assert_eq!(classify(&q, &ResponseValue::Number(2.0)), ResponseClass::Negative);
        assert_eq!(classify(&q, &ResponseValue::Number(3.0)), ResponseClass::Neutral);
        assert_eq!(classify(&q, &ResponseValue::Number(4.0)), ResponseClass::Positive);
    }

    fn response_for(q: &Question, value: ResponseValue) -> Response {
        Response {
            question_id: q.id.clone(),
            module: q.module,
            question_type: q.question_type,
            question_text: q.text.clone(),
            classification: classify(q, &value),
            value,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn test_module_score_weighted_and_idempotent() {
        let catalog = StaticCatalog::from_json(
            r#"[
                {"id": "A", "module": "ENERGY", "text": "a", "type": "LIKERT_SCALE",
                 "scoringWeight": 2.0},
                {"id": "B", "module": "ENERGY", "text": "b", "type": "FREQUENCY",
                 "scoringWeight": 1.0,
                 "options": [{"value": "daily", "label": "Daily", "score": 4}]}
            ]"#,
        )
        .unwrap();

        let ra = response_for(catalog.by_id("A").unwrap(), ResponseValue::Number(5.0));
        let rb = response_for(catalog.by_id("B").unwrap(), ResponseValue::Text("daily".into()));
        let responses = vec![&ra, &rb];

        // (0.5*2 + 4*1) / 3 * 20 = 33.33...
        let score = module_score(&catalog, &responses);
        assert_relative_eq!(score, 100.0 / 3.0, epsilon = 1e-9);

        // Unchanged history yields an identical value.
        assert_relative_eq!(score, module_score(&catalog, &responses), epsilon = 1e-12);
    }

    #[test]
    fn test_module_score_empty_is_zero() {
        let catalog = StaticCatalog::new(Vec::new()).unwrap();
        assert_relative_eq!(module_score(&catalog, &[]), 0.0);
    }
}
