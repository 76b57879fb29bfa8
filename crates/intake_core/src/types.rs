//! Core data model for the adaptive assessment engine.
//!
//! Question bank entries are deserialized from camelCase JSON documents
//! (the bank format predates this engine), everything the engine owns is
//! snake_case serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ============================================================================
// Functional modules
// ============================================================================

/// Body-system grouping of questions. Assessments always begin in SCREENING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionalModule {
    Screening,
    Assimilation,
    DefenseRepair,
    Energy,
    Biotransformation,
    Transport,
    Communication,
    Structural,
}

/// Fixed catalog order, used when priority-based module advance has no
/// candidate left.
pub const MODULE_SEQUENCE: [FunctionalModule; 8] = [
    FunctionalModule::Screening,
    FunctionalModule::Assimilation,
    FunctionalModule::DefenseRepair,
    FunctionalModule::Energy,
    FunctionalModule::Biotransformation,
    FunctionalModule::Transport,
    FunctionalModule::Communication,
    FunctionalModule::Structural,
];

impl FunctionalModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionalModule::Screening => "SCREENING",
            FunctionalModule::Assimilation => "ASSIMILATION",
            FunctionalModule::DefenseRepair => "DEFENSE_REPAIR",
            FunctionalModule::Energy => "ENERGY",
            FunctionalModule::Biotransformation => "BIOTRANSFORMATION",
            FunctionalModule::Transport => "TRANSPORT",
            FunctionalModule::Communication => "COMMUNICATION",
            FunctionalModule::Structural => "STRUCTURAL",
        }
    }
}

impl std::fmt::Display for FunctionalModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Questions
// ============================================================================

/// Question presentation/scoring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    LikertScale,
    MultipleChoice,
    YesNo,
    Frequency,
    Duration,
    MultiSelect,
    Text,
    Number,
}

/// Gender a question applies to, when it is not universal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// A raw answer value as submitted by the client.
///
/// Untagged so bank option values (`3`, `"never"`) and submitted answers
/// share one representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Number(f64),
    Text(String),
    Multi(Vec<String>),
}

impl ResponseValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResponseValue::Number(n) => Some(*n),
            ResponseValue::Text(s) => s.trim().parse().ok(),
            ResponseValue::Multi(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Loose equality used to match a submitted answer against a bank
    /// option value: numbers compare numerically, text case-insensitively.
    pub fn matches(&self, other: &ResponseValue) -> bool {
        match (self, other) {
            (ResponseValue::Number(a), ResponseValue::Number(b)) => (a - b).abs() < f64::EPSILON,
            (ResponseValue::Text(a), ResponseValue::Text(b)) => a.eq_ignore_ascii_case(b),
            (ResponseValue::Number(a), ResponseValue::Text(b))
            | (ResponseValue::Text(b), ResponseValue::Number(a)) => {
                b.trim().parse::<f64>().map(|n| (n - a).abs() < f64::EPSILON).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Human-readable rendering for prompts and summaries.
    pub fn display(&self) -> String {
        match self {
            ResponseValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            ResponseValue::Text(s) => s.clone(),
            ResponseValue::Multi(items) => items.join(", "),
        }
    }
}

/// One selectable option on an option-bearing question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub value: ResponseValue,
    pub label: String,
    /// Clinical score contribution. Absent in older bank entries; treated
    /// as 0 so a sparse catalog entry can never fail scoring.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Likert scale bounds, when a question overrides the defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LikertScale {
    #[serde(default = "default_scale_min")]
    pub min: f64,
    pub max: f64,
}

fn default_scale_min() -> f64 {
    1.0
}

/// Comparison operator for trigger conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Contains,
}

/// Urgency attached to a triggered alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Moderate,
    High,
    Critical,
}

/// Bank-declared reaction to a specific answer, evaluated immediately after
/// the answer is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    pub operator: TriggerOperator,
    pub threshold: ResponseValue,
    /// Force-activate a module regardless of its score.
    #[serde(default)]
    pub triggers_module: Option<FunctionalModule>,
    /// Follow-up question ids pushed to the head of the candidate pool.
    #[serde(default)]
    pub inject_questions: Vec<String>,
    #[serde(default)]
    pub alert_level: Option<AlertLevel>,
    #[serde(default)]
    pub requires_followup: bool,
}

/// Action a conditional rule can take. Only `skip` exists in the bank today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionalAction {
    Skip,
}

/// Skip rule carried by a question: when this question is answered with
/// `condition`, the listed questions are removed from the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    pub condition: ResponseValue,
    pub action: ConditionalAction,
    #[serde(default)]
    pub skip_questions: Vec<String>,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub module: FunctionalModule,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    #[serde(default = "default_scoring_weight")]
    pub scoring_weight: f64,
    #[serde(default)]
    pub clinical_relevance: Vec<String>,
    #[serde(default)]
    pub trigger_conditions: Vec<TriggerCondition>,
    #[serde(default)]
    pub conditional_logic: Vec<ConditionalRule>,
    #[serde(default)]
    pub seed_oil_relevant: bool,
    #[serde(default)]
    pub gender_specific: Option<Gender>,
    #[serde(default)]
    pub scale: Option<LikertScale>,
}

fn default_scoring_weight() -> f64 {
    1.0
}

/// Category tag marking dietary-oil questions in the bank.
pub const SEED_OIL_CATEGORY: &str = "SEED_OIL";

impl Question {
    /// A question counts toward seed-oil metrics if explicitly tagged or
    /// filed under the seed-oil category.
    pub fn is_seed_oil(&self) -> bool {
        self.seed_oil_relevant
            || self.category.as_deref() == Some(SEED_OIL_CATEGORY)
    }

    /// True when the question applies to a client of the given gender.
    pub fn applies_to(&self, gender: Option<Gender>) -> bool {
        match (self.gender_specific, gender) {
            (Some(required), Some(actual)) => required == actual,
            // Unknown client gender: ask everything rather than guess.
            _ => true,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Direction of an answer, computed once at accept time so downstream
/// policies never re-parse raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseClass {
    Positive,
    Negative,
    Neutral,
}

/// One accepted answer. Appended to the log, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub question_id: String,
    pub module: FunctionalModule,
    pub question_type: QuestionType,
    pub question_text: String,
    pub value: ResponseValue,
    pub classification: ResponseClass,
    pub answered_at: DateTime<Utc>,
}

// ============================================================================
// Per-module state
// ============================================================================

/// How far along a module is. Ordered so state can only advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Sufficient,
    Complete,
}

/// Rolling score/priority state for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleScore {
    pub module: FunctionalModule,
    /// 0-100 weighted symptom burden.
    pub score: f64,
    pub questions_answered: usize,
    /// One-way flag: once a module activates it stays active.
    pub activated: bool,
    /// 0-10 ordering key for module advance.
    pub priority: f64,
    pub completion_status: CompletionStatus,
}

// ============================================================================
// Patterns, seed metrics, completion
// ============================================================================

/// Severity bucket for a detected cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

/// A named symptom grouping with evidence so far. Recomputed from the full
/// response history every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomCluster {
    pub name: String,
    /// Fraction of the cluster's key symptoms confirmed, 0-1.
    pub confidence: f64,
    pub severity: Severity,
    pub related_modules: Vec<FunctionalModule>,
    pub key_symptoms: Vec<String>,
}

/// Dietary-oil exposure/damage rollup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedMetrics {
    /// 0-10.
    pub exposure_level: f64,
    /// 0-10.
    pub damage_indicators: f64,
    /// 0-10, inverse of damage.
    pub recovery_potential: f64,
    pub questions_asked: usize,
    pub critical_findings: Vec<String>,
}

/// Global readiness estimate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionPrediction {
    pub estimated_questions_remaining: usize,
    /// 0-0.95.
    pub confidence: f64,
    pub ready_for_analysis: bool,
    pub missing_critical_areas: Vec<FunctionalModule>,
}

// ============================================================================
// Red flags and alerts
// ============================================================================

/// A response that crossed a configured clinical threshold. Recorded for
/// practitioner attention; never alters the question flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagEvent {
    pub question_id: String,
    pub message: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// An alert raised by a question's own trigger conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAlert {
    pub question_id: String,
    pub level: AlertLevel,
    pub requires_followup: bool,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Assessment aggregate
// ============================================================================

/// Lifecycle of one assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

/// Demographics the selector filters on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age: Option<u32>,
}

/// The aggregate root: everything derived from the response history plus
/// the turn-level bookkeeping that is not derivable (injections, forced
/// activations, saved-question accounting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentContext {
    pub id: Uuid,
    pub status: AssessmentStatus,
    pub current_module: FunctionalModule,
    pub client: ClientProfile,
    pub module_scores: BTreeMap<FunctionalModule, ModuleScore>,
    pub clusters: Vec<SymptomCluster>,
    pub seed_metrics: SeedMetrics,
    pub completion: CompletionPrediction,
    pub questions_asked: usize,
    pub questions_saved: usize,
    pub red_flags: Vec<RedFlagEvent>,
    pub alerts: Vec<TriggerAlert>,
    /// Modules force-activated by trigger conditions.
    pub forced_active: BTreeSet<FunctionalModule>,
    /// Follow-up ids injected by trigger conditions, served ahead of the
    /// regular pool.
    pub injected_questions: Vec<String>,
    /// Question ids already counted toward `questions_saved`, so a skip is
    /// never billed twice across turns.
    pub counted_saved: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
}

impl AssessmentContext {
    pub fn new(client: ClientProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AssessmentStatus::NotStarted,
            current_module: FunctionalModule::Screening,
            client,
            module_scores: BTreeMap::new(),
            clusters: Vec::new(),
            seed_metrics: SeedMetrics::default(),
            completion: CompletionPrediction::default(),
            questions_asked: 0,
            questions_saved: 0,
            red_flags: Vec::new(),
            alerts: Vec::new(),
            forced_active: BTreeSet::new(),
            injected_questions: Vec::new(),
            counted_saved: BTreeSet::new(),
            started_at: Utc::now(),
            completed_at: None,
            termination_reason: None,
        }
    }

    pub fn module_score(&self, module: FunctionalModule) -> Option<&ModuleScore> {
        self.module_scores.get(&module)
    }
}

// ============================================================================
// Summary export
// ============================================================================

/// Overall risk stratification for the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Point-in-time export of everything a practitioner-facing surface needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub assessment_id: Uuid,
    pub status: AssessmentStatus,
    pub questions_asked: usize,
    pub questions_saved: usize,
    pub module_scores: Vec<ModuleScore>,
    pub clusters: Vec<SymptomCluster>,
    pub seed_metrics: SeedMetrics,
    pub completion: CompletionPrediction,
    pub red_flags: Vec<RedFlagEvent>,
    pub alerts: Vec<TriggerAlert>,
    pub overall_risk: RiskLevel,
    pub estimated_minutes_remaining: u64,
    pub termination_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_serde_wire_format() {
        let json = serde_json::to_string(&FunctionalModule::DefenseRepair).unwrap();
        assert_eq!(json, "\"DEFENSE_REPAIR\"");

        let parsed: FunctionalModule = serde_json::from_str("\"SCREENING\"").unwrap();
        assert_eq!(parsed, FunctionalModule::Screening);
    }

    #[test]
    fn test_completion_status_ordering() {
        assert!(CompletionStatus::NotStarted < CompletionStatus::InProgress);
        assert!(CompletionStatus::InProgress < CompletionStatus::Sufficient);
        assert!(CompletionStatus::Sufficient < CompletionStatus::Complete);
    }

    #[test]
    fn test_response_value_matching() {
        let three = ResponseValue::Number(3.0);
        assert!(three.matches(&ResponseValue::Number(3.0)));
        assert!(three.matches(&ResponseValue::Text("3".into())));
        assert!(!three.matches(&ResponseValue::Number(4.0)));

        let never = ResponseValue::Text("never".into());
        assert!(never.matches(&ResponseValue::Text("Never".into())));
        assert!(!never.matches(&ResponseValue::Text("rarely".into())));
    }

    #[test]
    fn test_question_bank_json_shape() {
        // Matches the camelCase shape the bank files use.
        let json = r#"{
            "id": "SCR002",
            "module": "SCREENING",
            "text": "How often do you experience bloating?",
            "type": "FREQUENCY",
            "category": "DIGESTIVE",
            "options": [
                { "value": 0, "label": "Never", "score": 0 },
                { "value": 4, "label": "Daily", "score": 4 }
            ],
            "scoringWeight": 1.4,
            "clinicalRelevance": ["dysbiosis", "SIBO"],
            "triggerConditions": [
                { "operator": "gte", "threshold": 3, "triggersModule": "ASSIMILATION" }
            ]
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.module, FunctionalModule::Screening);
        assert_eq!(q.question_type, QuestionType::Frequency);
        assert_eq!(q.options.len(), 2);
        assert!((q.scoring_weight - 1.4).abs() < 1e-9);
        assert_eq!(
            q.trigger_conditions[0].triggers_module,
            Some(FunctionalModule::Assimilation)
        );
        assert!(!q.is_seed_oil());
    }

    #[test]
    fn test_gender_applicability() {
        let mut q: Question = serde_json::from_str(
            r#"{"id":"X","module":"SCREENING","text":"t","type":"YES_NO"}"#,
        )
        .unwrap();
        assert!(q.applies_to(Some(Gender::Male)));
        assert!(q.applies_to(None));

        q.gender_specific = Some(Gender::Female);
        assert!(!q.applies_to(Some(Gender::Male)));
        assert!(q.applies_to(Some(Gender::Female)));
        // Unknown gender: never filter.
        assert!(q.applies_to(None));
    }
}
