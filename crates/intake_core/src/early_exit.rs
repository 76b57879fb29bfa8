//! Per-module early-exit policy.
//!
//! Decides when further questions in a module stop earning their keep:
//! mostly-negative answers, consistently low severity, or a clean sweep of
//! negatives all end the module early.

use serde::{Deserialize, Serialize};

use crate::config::ModulePolicy;
use crate::response_log::ResponseLog;
use crate::types::{FunctionalModule, QuestionType, ResponseClass};

/// Minimum answers before any exit rule may fire.
const MIN_ANSWERS_FOR_EXIT: usize = 3;

/// Answers needed before the low-severity rule applies.
const MIN_ANSWERS_FOR_SEVERITY_EXIT: usize = 4;

/// Average severity (5-point scale) below which a module reads as clean.
const LOW_SEVERITY_CEILING: f64 = 1.5;

/// Tallied answer directions for one module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleTally {
    pub module: Option<FunctionalModule>,
    pub answered: usize,
    pub negative: usize,
    pub positive: usize,
    severity_sum: f64,
    severity_count: usize,
}

impl ModuleTally {
    /// Build the tally from the module's slice of the history, reading the
    /// classification stored at accept time.
    pub fn from_log(module: FunctionalModule, log: &ResponseLog) -> Self {
        let mut tally = ModuleTally {
            module: Some(module),
            ..Default::default()
        };
        for response in log.for_module(module) {
            tally.answered += 1;
            match response.classification {
                ResponseClass::Negative => tally.negative += 1,
                ResponseClass::Positive => tally.positive += 1,
                ResponseClass::Neutral => {}
            }
            if response.question_type == QuestionType::LikertScale {
                if let Some(n) = response.value.as_number() {
                    tally.severity_sum += n;
                    tally.severity_count += 1;
                }
            }
        }
        tally
    }

    pub fn average_severity(&self) -> f64 {
        if self.severity_count > 0 {
            self.severity_sum / self.severity_count as f64
        } else {
            0.0
        }
    }

    pub fn negative_percentage(&self) -> f64 {
        if self.answered > 0 {
            self.negative as f64 / self.answered as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Verdict for one module after the latest answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitDecision {
    pub should_exit: bool,
    pub reason: String,
    pub questions_remaining: usize,
}

/// Evaluate the module's exit rules in order; the first match wins.
pub fn should_exit(tally: &ModuleTally, policy: &ModulePolicy) -> ExitDecision {
    let remaining = policy.max_questions_no_issues.saturating_sub(tally.answered);

    if tally.answered < MIN_ANSWERS_FOR_EXIT {
        return ExitDecision {
            should_exit: false,
            reason: "Too few questions asked".to_string(),
            questions_remaining: remaining,
        };
    }

    // Mostly negative after the no-issue budget.
    if tally.answered >= policy.max_questions_no_issues {
        let negative_ratio = tally.negative as f64 / tally.answered as f64;
        if negative_ratio >= policy.exit_threshold {
            return ExitDecision {
                should_exit: true,
                reason: format!(
                    "{}% negative responses - no issues detected",
                    tally.negative_percentage().round() as i64
                ),
                questions_remaining: 0,
            };
        }
    }

    // Consistently trivial severity. Requires actual Likert data; a module
    // with no scale answers has nothing to read severity from.
    let avg = tally.average_severity();
    if tally.answered >= MIN_ANSWERS_FOR_SEVERITY_EXIT
        && tally.severity_count > 0
        && avg < LOW_SEVERITY_CEILING
    {
        return ExitDecision {
            should_exit: true,
            reason: format!("Very low severity ({avg:.1}/5) - minimal issues"),
            questions_remaining: 0,
        };
    }

    // Clean sweep of negatives.
    if tally.negative_percentage() >= 100.0 {
        return ExitDecision {
            should_exit: true,
            reason: "All responses negative - no issues in this module".to_string(),
            questions_remaining: 0,
        };
    }

    ExitDecision {
        should_exit: false,
        reason: format!("Continue assessment ({} positive indicators)", tally.positive),
        questions_remaining: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseValue};
    use chrono::Utc;

    fn policy() -> ModulePolicy {
        ModulePolicy {
            activation_threshold: 30.0,
            min_questions: 20,
            max_questions: 40,
            max_questions_no_issues: 6,
            exit_threshold: 0.75,
            critical_questions: Vec::new(),
        }
    }

    fn push(
        log: &mut ResponseLog,
        i: usize,
        question_type: QuestionType,
        value: ResponseValue,
        classification: ResponseClass,
    ) {
        log.append(Response {
            question_id: format!("Q{i}"),
            module: FunctionalModule::Energy,
            question_type,
            question_text: format!("q{i}"),
            value,
            classification,
            answered_at: Utc::now(),
        });
    }

    #[test]
    fn test_no_exit_before_three_answers() {
        let mut log = ResponseLog::new();
        push(&mut log, 0, QuestionType::YesNo, ResponseValue::Text("no".into()), ResponseClass::Negative);
        push(&mut log, 1, QuestionType::YesNo, ResponseValue::Text("no".into()), ResponseClass::Negative);

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        let decision = should_exit(&tally, &policy());
        assert!(!decision.should_exit);
        assert_eq!(decision.questions_remaining, 4);
    }

    #[test]
    fn test_exit_on_negative_ratio_after_budget() {
        // Six answers, five negative: 83% >= 75% threshold.
        let mut log = ResponseLog::new();
        for i in 0..5 {
            push(&mut log, i, QuestionType::YesNo, ResponseValue::Text("no".into()), ResponseClass::Negative);
        }
        push(&mut log, 5, QuestionType::YesNo, ResponseValue::Text("yes".into()), ResponseClass::Positive);

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        let decision = should_exit(&tally, &policy());
        assert!(decision.should_exit);
        assert!(decision.reason.contains("negative responses"));
    }

    #[test]
    fn test_all_negative_exit_fires_at_three() {
        let mut log = ResponseLog::new();
        for i in 0..3 {
            push(&mut log, i, QuestionType::Frequency, ResponseValue::Text("never".into()), ResponseClass::Negative);
        }

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        assert!((tally.negative_percentage() - 100.0).abs() < 1e-9);

        let decision = should_exit(&tally, &policy());
        assert!(decision.should_exit);
        assert_eq!(decision.reason, "All responses negative - no issues in this module");
    }

    #[test]
    fn test_six_never_responses_exit_with_full_negative_percentage() {
        let mut log = ResponseLog::new();
        for i in 0..6 {
            let value = if i % 2 == 0 { "never" } else { "no" };
            let qt = if i % 2 == 0 { QuestionType::Frequency } else { QuestionType::YesNo };
            push(&mut log, i, qt, ResponseValue::Text(value.into()), ResponseClass::Negative);
        }

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        let decision = should_exit(&tally, &policy());
        assert!(decision.should_exit);
        assert!((tally.negative_percentage() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_severity_exit_after_four_likert_answers() {
        // [1, 1, 2, 1] averages 1.25 < 1.5.
        let mut log = ResponseLog::new();
        for (i, v) in [1.0, 1.0, 2.0, 1.0].into_iter().enumerate() {
            push(&mut log, i, QuestionType::LikertScale, ResponseValue::Number(v), ResponseClass::Negative);
        }

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        assert!((tally.average_severity() - 1.25).abs() < 1e-9);

        let decision = should_exit(&tally, &policy());
        assert!(decision.should_exit);
        assert!(decision.reason.contains("low severity"));
    }

    #[test]
    fn test_no_severity_exit_without_likert_data() {
        // Four answers, three negative one positive, no Likert: severity
        // rule must not read an empty average as "clean".
        let mut log = ResponseLog::new();
        for i in 0..3 {
            push(&mut log, i, QuestionType::YesNo, ResponseValue::Text("no".into()), ResponseClass::Negative);
        }
        push(&mut log, 3, QuestionType::YesNo, ResponseValue::Text("yes".into()), ResponseClass::Positive);

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        let decision = should_exit(&tally, &policy());
        assert!(!decision.should_exit);
    }

    #[test]
    fn test_symptomatic_module_continues() {
        let mut log = ResponseLog::new();
        for i in 0..6 {
            push(&mut log, i, QuestionType::YesNo, ResponseValue::Text("yes".into()), ResponseClass::Positive);
        }

        let tally = ModuleTally::from_log(FunctionalModule::Energy, &log);
        let decision = should_exit(&tally, &policy());
        assert!(!decision.should_exit);
        assert!(decision.reason.contains("6 positive"));
    }
}
