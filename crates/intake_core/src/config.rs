//! Engine configuration: threshold tables, pattern library, red-flag table.
//!
//! All rule tables are injected at engine construction as one immutable
//! value, so alternative rule-set versions and isolated unit tests never
//! touch globals. `EngineConfig::default()` carries the canonical tables;
//! a TOML file can replace any of them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::types::{FunctionalModule, MODULE_SEQUENCE};

/// Soft floor: below this many answers the assessment never terminates on
/// risk/pattern grounds.
pub const TARGET_MIN_QUESTIONS: usize = 200;

/// Hard cap: no code path emits a question beyond this.
pub const TARGET_MAX_QUESTIONS: usize = 250;

/// Pattern-based termination becomes possible from here.
pub const PATTERN_EXIT_FLOOR: usize = 225;

/// Average module score below which a run counts as low risk.
pub const LOW_RISK_SCORE_CEILING: f64 = 30.0;

/// Assumed answering pace, for the minutes-remaining estimate.
pub const SECONDS_PER_QUESTION: u64 = 15;

/// Per-module questioning policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulePolicy {
    /// Module score at which the module self-activates.
    pub activation_threshold: f64,
    /// Answers needed before the module counts as sufficient.
    pub min_questions: usize,
    /// Answers at which the module counts as complete.
    pub max_questions: usize,
    /// Answers after which a mostly-negative module is abandoned.
    pub max_questions_no_issues: usize,
    /// Negative-answer ratio that justifies abandoning the module.
    pub exit_threshold: f64,
    /// Gateway questions the selector always surfaces before anything else,
    /// so an early exit is never decided on low-signal answers alone.
    #[serde(default)]
    pub critical_questions: Vec<String>,
}

/// A named symptom cluster the detector watches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub name: String,
    pub related_modules: Vec<FunctionalModule>,
    /// clinicalRelevance tags that confirm the cluster.
    pub key_symptoms: Vec<String>,
    /// Tags whose questions become redundant once the cluster is confident.
    #[serde(default)]
    pub skip_if_clear: Vec<String>,
}

/// Threshold entry in the red-flag table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagRule {
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_target_min")]
    pub target_min_questions: usize,
    #[serde(default = "default_target_max")]
    pub target_max_questions: usize,
    #[serde(default = "default_pattern_floor")]
    pub pattern_exit_floor: usize,
    #[serde(default = "default_low_risk_ceiling")]
    pub low_risk_score_ceiling: f64,
    /// Advisor time budget; the selector falls back when it elapses.
    #[serde(default = "default_advisor_budget")]
    pub advisor_budget_ms: u64,
    /// How many candidates the advisor is shown.
    #[serde(default = "default_candidate_limit")]
    pub advisor_candidate_limit: usize,
    #[serde(default = "default_module_policies")]
    pub modules: BTreeMap<FunctionalModule, ModulePolicy>,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<PatternDefinition>,
    #[serde(default = "default_red_flags")]
    pub red_flags: BTreeMap<String, RedFlagRule>,
}

fn default_target_min() -> usize {
    TARGET_MIN_QUESTIONS
}

fn default_target_max() -> usize {
    TARGET_MAX_QUESTIONS
}

fn default_pattern_floor() -> usize {
    PATTERN_EXIT_FLOOR
}

fn default_low_risk_ceiling() -> f64 {
    LOW_RISK_SCORE_CEILING
}

fn default_advisor_budget() -> u64 {
    3000
}

fn default_candidate_limit() -> usize {
    20
}

fn default_module_policies() -> BTreeMap<FunctionalModule, ModulePolicy> {
    let mut policies = BTreeMap::new();
    for module in MODULE_SEQUENCE {
        let policy = match module {
            // Screening always runs and runs longest.
            FunctionalModule::Screening => ModulePolicy {
                activation_threshold: 0.0,
                min_questions: 15,
                max_questions: 30,
                max_questions_no_issues: 8,
                exit_threshold: 0.70,
                critical_questions: vec![
                    "SCR001".into(),
                    "SCR002".into(),
                    "SCR003".into(),
                ],
            },
            FunctionalModule::Assimilation => ModulePolicy {
                activation_threshold: 30.0,
                min_questions: 25,
                max_questions: 45,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: vec!["ASM001".into(), "ASM012".into()],
            },
            FunctionalModule::DefenseRepair => ModulePolicy {
                activation_threshold: 30.0,
                min_questions: 25,
                max_questions: 40,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: Vec::new(),
            },
            FunctionalModule::Energy => ModulePolicy {
                activation_threshold: 25.0,
                min_questions: 25,
                max_questions: 40,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: Vec::new(),
            },
            FunctionalModule::Biotransformation => ModulePolicy {
                activation_threshold: 30.0,
                min_questions: 20,
                max_questions: 35,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: Vec::new(),
            },
            // Cardiovascular/structural systems exit faster on clean answers.
            FunctionalModule::Transport => ModulePolicy {
                activation_threshold: 35.0,
                min_questions: 20,
                max_questions: 35,
                max_questions_no_issues: 5,
                exit_threshold: 0.80,
                critical_questions: Vec::new(),
            },
            FunctionalModule::Communication => ModulePolicy {
                activation_threshold: 30.0,
                min_questions: 25,
                max_questions: 40,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: Vec::new(),
            },
            FunctionalModule::Structural => ModulePolicy {
                activation_threshold: 35.0,
                min_questions: 15,
                max_questions: 30,
                max_questions_no_issues: 5,
                exit_threshold: 0.80,
                critical_questions: Vec::new(),
            },
        };
        policies.insert(module, policy);
    }
    policies
}

fn default_patterns() -> Vec<PatternDefinition> {
    vec![
        PatternDefinition {
            name: "mitochondrial_dysfunction".into(),
            related_modules: vec![FunctionalModule::Energy, FunctionalModule::Biotransformation],
            key_symptoms: vec![
                "mitochondrial_function".into(),
                "fatigue".into(),
                "exercise_intolerance".into(),
                "brain_fog".into(),
            ],
            skip_if_clear: vec!["general_energy_screening".into()],
        },
        PatternDefinition {
            name: "gut_dysbiosis".into(),
            related_modules: vec![FunctionalModule::Assimilation],
            key_symptoms: vec![
                "dysbiosis".into(),
                "SIBO".into(),
                "food_sensitivities".into(),
                "bloating".into(),
            ],
            skip_if_clear: vec!["general_digestive_screening".into()],
        },
        PatternDefinition {
            name: "systemic_inflammation".into(),
            related_modules: vec![
                FunctionalModule::DefenseRepair,
                FunctionalModule::Transport,
                FunctionalModule::Structural,
            ],
            key_symptoms: vec![
                "inflammation".into(),
                "joint_pain".into(),
                "oxidative_damage".into(),
                "skin_issues".into(),
            ],
            skip_if_clear: vec!["general_inflammation_screening".into()],
        },
        PatternDefinition {
            name: "hpa_axis_dysregulation".into(),
            related_modules: vec![FunctionalModule::Communication, FunctionalModule::Energy],
            key_symptoms: vec![
                "HPA_axis".into(),
                "circadian_rhythm".into(),
                "adrenal_health".into(),
                "mood_instability".into(),
            ],
            skip_if_clear: vec!["general_sleep_screening".into()],
        },
        PatternDefinition {
            name: "seed_oil_damage".into(),
            related_modules: vec![FunctionalModule::Energy, FunctionalModule::DefenseRepair],
            key_symptoms: vec![
                "seed_oil_exposure".into(),
                "oxidative_damage".into(),
                "inflammation".into(),
            ],
            skip_if_clear: Vec::new(),
        },
    ]
}

fn default_red_flags() -> BTreeMap<String, RedFlagRule> {
    // Illustrative entries; the clinical table is swappable configuration.
    let mut flags = BTreeMap::new();
    flags.insert(
        "SCR001".to_string(),
        RedFlagRule {
            threshold: 2.0,
            message: "Severe fatigue reported".to_string(),
        },
    );
    flags.insert(
        "SCR_SO01".to_string(),
        RedFlagRule {
            threshold: 4.0,
            message: "Daily fried food consumption".to_string(),
        },
    );
    flags
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_min_questions: default_target_min(),
            target_max_questions: default_target_max(),
            pattern_exit_floor: default_pattern_floor(),
            low_risk_score_ceiling: default_low_risk_ceiling(),
            advisor_budget_ms: default_advisor_budget(),
            advisor_candidate_limit: default_candidate_limit(),
            modules: default_module_policies(),
            patterns: default_patterns(),
            red_flags: default_red_flags(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults for absent sections.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse engine config: {}", path.display()))?;
        Ok(config)
    }

    pub fn module_policy(&self, module: FunctionalModule) -> &ModulePolicy {
        // Every module has a default policy; a partial TOML override that
        // drops one falls back to the built-in table.
        self.modules.get(&module).unwrap_or_else(|| {
            static FALLBACK: std::sync::OnceLock<ModulePolicy> = std::sync::OnceLock::new();
            FALLBACK.get_or_init(|| ModulePolicy {
                activation_threshold: 30.0,
                min_questions: 20,
                max_questions: 40,
                max_questions_no_issues: 6,
                exit_threshold: 0.75,
                critical_questions: Vec::new(),
            })
        })
    }
}
