//! Urgent-finding detection: the red-flag table and per-question triggers.
//!
//! Red flags are recorded for practitioner attention and never redirect the
//! flow. Trigger conditions, by contrast, feed straight back into selection:
//! forced module activation and injected follow-ups apply before the next
//! question is chosen.

use chrono::Utc;
use tracing::info;

use crate::config::EngineConfig;
use crate::types::{
    AlertLevel, FunctionalModule, Question, RedFlagEvent, ResponseValue, TriggerCondition,
    TriggerOperator,
};

/// Check an accepted answer against the configured red-flag table.
pub fn check_red_flag(
    config: &EngineConfig,
    question_id: &str,
    value: &ResponseValue,
) -> Option<RedFlagEvent> {
    let rule = config.red_flags.get(question_id)?;
    let numeric = value.as_number()?;
    if numeric < rule.threshold {
        return None;
    }
    info!(question_id, value = numeric, "red flag recorded: {}", rule.message);
    Some(RedFlagEvent {
        question_id: question_id.to_string(),
        message: rule.message.clone(),
        value: numeric,
        timestamp: Utc::now(),
    })
}

/// Effects of a question's trigger conditions against the just-given answer.
#[derive(Debug, Clone, Default)]
pub struct TriggerEffects {
    pub activate_modules: Vec<FunctionalModule>,
    pub inject_questions: Vec<String>,
    pub alerts: Vec<(AlertLevel, bool)>,
}

impl TriggerEffects {
    pub fn is_empty(&self) -> bool {
        self.activate_modules.is_empty() && self.inject_questions.is_empty() && self.alerts.is_empty()
    }
}

/// Evaluate every trigger condition the question carries.
pub fn evaluate_triggers(question: &Question, value: &ResponseValue) -> TriggerEffects {
    let mut effects = TriggerEffects::default();

    for condition in &question.trigger_conditions {
        if !condition_met(condition, value) {
            continue;
        }
        if let Some(module) = condition.triggers_module {
            info!(question_id = %question.id, %module, "trigger: force-activating module");
            effects.activate_modules.push(module);
        }
        if !condition.inject_questions.is_empty() {
            effects.inject_questions.extend(condition.inject_questions.iter().cloned());
        }
        if let Some(level) = condition.alert_level {
            effects.alerts.push((level, condition.requires_followup));
        }
    }

    effects
}

fn condition_met(condition: &TriggerCondition, value: &ResponseValue) -> bool {
    match condition.operator {
        TriggerOperator::Eq => value.matches(&condition.threshold),
        TriggerOperator::Contains => contains(value, &condition.threshold),
        TriggerOperator::Gt => numeric(condition, value, |v, t| v > t),
        TriggerOperator::Gte => numeric(condition, value, |v, t| v >= t),
        TriggerOperator::Lt => numeric(condition, value, |v, t| v < t),
        TriggerOperator::Lte => numeric(condition, value, |v, t| v <= t),
    }
}

/// Ordering comparisons need both sides numeric; anything else never fires.
fn numeric(condition: &TriggerCondition, value: &ResponseValue, cmp: fn(f64, f64) -> bool) -> bool {
    match (value.as_number(), condition.threshold.as_number()) {
        (Some(v), Some(t)) => cmp(v, t),
        _ => false,
    }
}

fn contains(value: &ResponseValue, needle: &ResponseValue) -> bool {
    match (value, needle) {
        (ResponseValue::Text(haystack), ResponseValue::Text(n)) => {
            haystack.to_ascii_lowercase().contains(&n.to_ascii_lowercase())
        }
        (ResponseValue::Multi(items), n) => {
            items.iter().any(|item| ResponseValue::Text(item.clone()).matches(n))
        }
        _ => false,
    }
}
