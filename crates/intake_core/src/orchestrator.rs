//! Turn-by-turn assessment state machine.
//!
//! `AssessmentEngine` composes the scoring, activation, pattern, seed-metric,
//! exit, red-flag, completion, and selection layers into two operations:
//! `submit_response` and `next_question`. Turns are atomic: a call either
//! rejects before touching state or applies in full.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::activation;
use crate::advisor::{Advisor, AdvisorContext, TimedAdvisor};
use crate::catalog::QuestionCatalog;
use crate::completion;
use crate::config::{EngineConfig, SECONDS_PER_QUESTION};
use crate::early_exit::{self, ModuleTally};
use crate::error::EngineError;
use crate::patterns;
use crate::red_flags;
use crate::response_log::ResponseLog;
use crate::scoring;
use crate::seed_metrics;
use crate::selector;
use crate::types::{
    AssessmentContext, AssessmentStatus, AssessmentSummary, ClientProfile, CompletionStatus,
    ConditionalAction, FunctionalModule, Question, Response, ResponseValue, RiskLevel, Severity,
    TriggerAlert, MODULE_SEQUENCE,
};

/// Result of a `next_question` turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Turn {
    Question {
        question: Question,
        reasoning: String,
        /// 0.7-0.95 selection confidence, observability only.
        confidence: f64,
    },
    Done {
        reason: String,
    },
}

/// Serializable engine state for persistence between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentState {
    pub context: AssessmentContext,
    pub responses: Vec<Response>,
    pub conditional_skips: BTreeSet<String>,
    pub exhausted_modules: BTreeSet<FunctionalModule>,
}

pub struct AssessmentEngine {
    config: EngineConfig,
    catalog: Arc<dyn QuestionCatalog>,
    advisor: Option<Arc<dyn Advisor>>,
    context: AssessmentContext,
    log: ResponseLog,
    /// Ids removed from the pool by answered conditional-logic rules.
    conditional_skips: BTreeSet<String>,
    /// Modules that exited early or ran out of applicable questions.
    exhausted: BTreeSet<FunctionalModule>,
}

impl AssessmentEngine {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn QuestionCatalog>,
        advisor: Option<Arc<dyn Advisor>>,
        client: ClientProfile,
    ) -> Self {
        Self {
            config,
            catalog,
            advisor,
            context: AssessmentContext::new(client),
            log: ResponseLog::new(),
            conditional_skips: BTreeSet::new(),
            exhausted: BTreeSet::new(),
        }
    }

    /// Rehydrate an engine from persisted state.
    pub fn from_state(
        config: EngineConfig,
        catalog: Arc<dyn QuestionCatalog>,
        advisor: Option<Arc<dyn Advisor>>,
        state: AssessmentState,
    ) -> Self {
        Self {
            config,
            catalog,
            advisor,
            context: state.context,
            log: ResponseLog::from_entries(state.responses),
            conditional_skips: state.conditional_skips,
            exhausted: state.exhausted_modules,
        }
    }

    /// Snapshot for persistence.
    pub fn state(&self) -> AssessmentState {
        AssessmentState {
            context: self.context.clone(),
            responses: self.log.entries().to_vec(),
            conditional_skips: self.conditional_skips.clone(),
            exhausted_modules: self.exhausted.clone(),
        }
    }

    pub fn context(&self) -> &AssessmentContext {
        &self.context
    }

    pub fn log(&self) -> &ResponseLog {
        &self.log
    }

    // ========================================================================
    // Turn protocol
    // ========================================================================

    /// Accept one answer. Rejects before any mutation on unknown ids,
    /// duplicates, or a status that forbids answering.
    pub fn submit_response(
        &mut self,
        question_id: &str,
        value: ResponseValue,
    ) -> Result<(), EngineError> {
        match self.context.status {
            AssessmentStatus::Paused => return Err(EngineError::AssessmentPaused),
            AssessmentStatus::Completed => return Err(EngineError::AssessmentAlreadyCompleted),
            _ => {}
        }
        let question = self
            .catalog
            .by_id(question_id)
            .ok_or_else(|| EngineError::QuestionNotFound(question_id.to_string()))?
            .clone();
        if self.log.contains(question_id) {
            return Err(EngineError::DuplicateResponse(question_id.to_string()));
        }

        // Validated; everything below applies unconditionally.
        if self.context.status == AssessmentStatus::NotStarted {
            self.context.status = AssessmentStatus::InProgress;
        }

        let classification = scoring::classify(&question, &value);
        self.log.append(Response {
            question_id: question.id.clone(),
            module: question.module,
            question_type: question.question_type,
            question_text: question.text.clone(),
            value: value.clone(),
            classification,
            answered_at: Utc::now(),
        });

        self.apply_conditional_logic(&question, &value);
        self.apply_triggers(&question, &value);
        if let Some(flag) = red_flags::check_red_flag(&self.config, &question.id, &value) {
            self.context.red_flags.push(flag);
        }

        self.recompute_derived();
        Ok(())
    }

    /// Produce the next question, or the completion verdict.
    pub async fn next_question(&mut self) -> Result<Turn, EngineError> {
        match self.context.status {
            AssessmentStatus::Paused => return Err(EngineError::AssessmentPaused),
            AssessmentStatus::Completed => {
                let reason = self
                    .context
                    .termination_reason
                    .clone()
                    .unwrap_or_else(|| "Assessment completed".to_string());
                return Ok(Turn::Done { reason });
            }
            AssessmentStatus::NotStarted => {
                self.context.status = AssessmentStatus::InProgress;
            }
            AssessmentStatus::InProgress => {}
        }

        if let Some(reason) = completion::termination_reason(
            &self.config,
            self.context.questions_asked,
            &self.context.module_scores,
            &self.context.clusters,
            &self.context.completion,
        ) {
            self.finalize(reason.clone());
            return Ok(Turn::Done { reason });
        }

        // Bounded module-advance loop: each iteration either emits a question
        // or retires the current module, so it cannot spin.
        for _ in 0..=MODULE_SEQUENCE.len() {
            let module = self.context.current_module;
            let policy = self.config.module_policy(module).clone();

            let tally = ModuleTally::from_log(module, &self.log);
            let decision = early_exit::should_exit(&tally, &policy);
            if decision.should_exit && self.gateway_satisfied(&policy) {
                info!(%module, reason = %decision.reason, "module exited early");
                self.retire_module(module);
                if !self.advance_module() {
                    let reason = "No applicable questions remaining".to_string();
                    self.finalize(reason.clone());
                    return Ok(Turn::Done { reason });
                }
                continue;
            }

            let skip_tags = patterns::skip_tags(&self.config.patterns, &self.context.clusters);
            let conditional: HashSet<String> = self.conditional_skips.iter().cloned().collect();
            let pool = selector::candidate_pool(
                self.catalog.as_ref(),
                module,
                &policy,
                &self.log,
                &conditional,
                &skip_tags,
                self.context.client.gender,
                &self.context.injected_questions,
            );

            if pool.candidates.is_empty() {
                let skipped = pool.skipped;
                self.bill_saved(skipped);
                debug!(%module, "no applicable questions left in module");
                self.retire_module(module);
                if !self.advance_module() {
                    let reason = "No applicable questions remaining".to_string();
                    self.finalize(reason.clone());
                    return Ok(Turn::Done { reason });
                }
                continue;
            }

            let advisor_context = AdvisorContext {
                module,
                recent_responses: self
                    .log
                    .recent(10)
                    .iter()
                    .map(|r| (r.question_text.clone(), r.value.display()))
                    .collect(),
                clusters: self.context.clusters.clone(),
                module_scores: self
                    .context
                    .module_scores
                    .values()
                    .map(|m| (m.module, m.score))
                    .collect(),
                seed_metrics: self.context.seed_metrics.clone(),
                questions_asked: self.context.questions_asked,
                budget_remaining: self
                    .config
                    .target_max_questions
                    .saturating_sub(self.context.questions_asked),
                negative_percentage: tally.negative_percentage(),
                average_severity: tally.average_severity(),
                questions_before_exit: decision.questions_remaining,
            };

            let timed = self.advisor.clone().map(|a| {
                TimedAdvisor::new(a, Duration::from_millis(self.config.advisor_budget_ms))
            });
            let selection = selector::select(
                timed.as_ref().map(|t| t as &dyn Advisor),
                self.config.advisor_candidate_limit,
                pool,
                &advisor_context,
                self.catalog.as_ref(),
                &self.log,
            )
            .await;

            if let Some(selection) = selection {
                self.bill_saved(selection.skipped);
                return Ok(Turn::Question {
                    question: selection.question,
                    reasoning: selection.reasoning,
                    confidence: selection.confidence,
                });
            }
        }

        let reason = "No applicable questions remaining".to_string();
        self.finalize(reason.clone());
        Ok(Turn::Done { reason })
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.context.status == AssessmentStatus::Completed {
            return Err(EngineError::AssessmentAlreadyCompleted);
        }
        self.context.status = AssessmentStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.context.status == AssessmentStatus::Completed {
            return Err(EngineError::AssessmentAlreadyCompleted);
        }
        if self.context.status == AssessmentStatus::Paused {
            self.context.status = AssessmentStatus::InProgress;
        }
        Ok(())
    }

    // ========================================================================
    // Summary
    // ========================================================================

    pub fn summary(&self) -> AssessmentSummary {
        let remaining = self
            .context
            .completion
            .estimated_questions_remaining
            .min(
                self.config
                    .target_max_questions
                    .saturating_sub(self.context.questions_asked),
            );
        AssessmentSummary {
            assessment_id: self.context.id,
            status: self.context.status,
            questions_asked: self.context.questions_asked,
            questions_saved: self.context.questions_saved,
            module_scores: self.context.module_scores.values().cloned().collect(),
            clusters: self.context.clusters.clone(),
            seed_metrics: self.context.seed_metrics.clone(),
            completion: self.context.completion.clone(),
            red_flags: self.context.red_flags.clone(),
            alerts: self.context.alerts.clone(),
            overall_risk: self.overall_risk(),
            estimated_minutes_remaining: remaining as u64 * SECONDS_PER_QUESTION / 60,
            termination_reason: self.context.termination_reason.clone(),
        }
    }

    fn overall_risk(&self) -> RiskLevel {
        let avg = completion::average_score(&self.context.module_scores);
        let mut risk = if avg >= 70.0 {
            RiskLevel::Critical
        } else if avg >= 50.0 {
            RiskLevel::High
        } else if avg >= 30.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };

        let critical_cluster = self
            .context
            .clusters
            .iter()
            .any(|c| c.severity == Severity::Critical && c.confidence > 0.7);
        if critical_cluster {
            risk = risk.max(RiskLevel::High);
        }
        if !self.context.red_flags.is_empty() {
            risk = risk.max(RiskLevel::Moderate);
        }
        risk
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn apply_conditional_logic(&mut self, question: &Question, value: &ResponseValue) {
        for rule in &question.conditional_logic {
            if rule.action != ConditionalAction::Skip || !value.matches(&rule.condition) {
                continue;
            }
            for id in &rule.skip_questions {
                if !self.log.contains(id) {
                    self.conditional_skips.insert(id.clone());
                }
            }
        }
    }

    fn apply_triggers(&mut self, question: &Question, value: &ResponseValue) {
        let effects = red_flags::evaluate_triggers(question, value);
        for module in effects.activate_modules {
            self.context.forced_active.insert(module);
            // A forced module may have been retired in a previous pass.
            self.exhausted.remove(&module);
        }
        for id in effects.inject_questions {
            if !self.log.contains(&id) && !self.context.injected_questions.contains(&id) {
                self.context.injected_questions.push(id);
            }
        }
        for (level, requires_followup) in effects.alerts {
            self.context.alerts.push(TriggerAlert {
                question_id: question.id.clone(),
                level,
                requires_followup,
                timestamp: Utc::now(),
            });
        }
        // Drop served injections.
        let log = &self.log;
        self.context.injected_questions.retain(|id| !log.contains(id));
    }

    /// Recompute every derived layer from the full history.
    fn recompute_derived(&mut self) {
        let mut raw_scores = HashMap::new();
        for module in MODULE_SEQUENCE {
            let responses = self.log.for_module(module);
            raw_scores.insert(module, scoring::module_score(self.catalog.as_ref(), &responses));
        }

        let clusters = patterns::detect(
            &self.config.patterns,
            self.catalog.as_ref(),
            &self.log,
            &raw_scores,
        );
        let seed = seed_metrics::aggregate(self.catalog.as_ref(), &self.log);
        let table = activation::recompute(
            &self.config,
            &raw_scores,
            &self.log,
            &clusters,
            &seed,
            &self.context.forced_active,
            &self.context.module_scores,
        );

        self.context.completion = completion::predict(&self.config, &table);
        self.context.module_scores = table;
        self.context.clusters = clusters;
        self.context.seed_metrics = seed;
        self.context.questions_asked = self.log.len();
    }

    /// Early exit is only trusted once the module's gateway questions have
    /// been answered or made redundant.
    fn gateway_satisfied(&self, policy: &crate::config::ModulePolicy) -> bool {
        policy.critical_questions.iter().all(|id| {
            self.log.contains(id)
                || self.conditional_skips.contains(id)
                || self.catalog.by_id(id).is_none()
        })
    }

    fn retire_module(&mut self, module: FunctionalModule) {
        self.exhausted.insert(module);
        if let Some(entry) = self.context.module_scores.get_mut(&module) {
            entry.completion_status = entry.completion_status.max(CompletionStatus::Sufficient);
        }
    }

    /// Move to the next module, returning false when none remain.
    fn advance_module(&mut self) -> bool {
        match selector::next_module(&self.context.module_scores, &self.exhausted) {
            Some(next) => {
                info!(from = %self.context.current_module, to = %next, "advancing module");
                self.context.current_module = next;
                true
            }
            None => false,
        }
    }

    fn bill_saved(&mut self, skipped: Vec<String>) {
        for id in skipped {
            if self.context.counted_saved.insert(id) {
                self.context.questions_saved += 1;
            }
        }
    }

    fn finalize(&mut self, reason: String) {
        info!(questions_asked = self.context.questions_asked, reason = %reason, "assessment completed");
        self.context.status = AssessmentStatus::Completed;
        self.context.completed_at = Some(Utc::now());
        self.context.termination_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;

    fn bank() -> Arc<StaticCatalog> {
        Arc::new(
            StaticCatalog::from_json(
                r#"[
                    {"id": "SCR001", "module": "SCREENING", "text": "Energy level?",
                     "type": "LIKERT_SCALE", "clinicalRelevance": ["fatigue"]},
                    {"id": "SCR002", "module": "SCREENING", "text": "Bloating?",
                     "type": "FREQUENCY",
                     "options": [
                        {"value": "never", "label": "Never", "score": 0},
                        {"value": "daily", "label": "Daily", "score": 4}
                     ],
                     "triggerConditions": [
                        {"operator": "eq", "threshold": "daily",
                         "triggersModule": "ASSIMILATION",
                         "injectQuestions": ["ASM001"]}
                     ]},
                    {"id": "SCR003", "module": "SCREENING", "text": "Sleep quality?",
                     "type": "LIKERT_SCALE"},
                    {"id": "SCR004", "module": "SCREENING", "text": "Headaches?",
                     "type": "YES_NO",
                     "conditionalLogic": [
                        {"condition": "no", "action": "skip", "skipQuestions": ["SCR005"]}
                     ]},
                    {"id": "SCR005", "module": "SCREENING", "text": "Headache frequency?",
                     "type": "FREQUENCY"},
                    {"id": "ASM001", "module": "ASSIMILATION", "text": "Stool form?",
                     "type": "MULTIPLE_CHOICE"}
                ]"#,
            )
            .unwrap(),
        )
    }

    fn engine() -> AssessmentEngine {
        let mut config = EngineConfig::default();
        // The test bank is tiny; keep gateway lists inside it.
        if let Some(policy) = config.modules.get_mut(&FunctionalModule::Screening) {
            policy.critical_questions = vec!["SCR001".into(), "SCR002".into()];
        }
        AssessmentEngine::new(config, bank(), None, ClientProfile::default())
    }

    #[test]
    fn test_submit_rejects_unknown_and_duplicate() {
        let mut engine = engine();
        let err = engine
            .submit_response("NOPE", ResponseValue::Number(3.0))
            .unwrap_err();
        assert_eq!(err, EngineError::QuestionNotFound("NOPE".into()));

        engine.submit_response("SCR001", ResponseValue::Number(3.0)).unwrap();
        let err = engine
            .submit_response("SCR001", ResponseValue::Number(4.0))
            .unwrap_err();
        assert_eq!(err, EngineError::DuplicateResponse("SCR001".into()));

        // The rejected turns left no trace.
        assert_eq!(engine.context().questions_asked, 1);
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_questions_asked_tracks_log() {
        let mut engine = engine();
        engine.submit_response("SCR001", ResponseValue::Number(3.0)).unwrap();
        engine.submit_response("SCR003", ResponseValue::Number(2.0)).unwrap();
        assert_eq!(engine.context().questions_asked, engine.log().len());
    }

    #[test]
    fn test_paused_refuses_both_operations() {
        let mut engine = engine();
        engine.submit_response("SCR001", ResponseValue::Number(3.0)).unwrap();
        engine.pause().unwrap();

        let err = engine
            .submit_response("SCR003", ResponseValue::Number(2.0))
            .unwrap_err();
        assert_eq!(err, EngineError::AssessmentPaused);

        engine.resume().unwrap();
        assert_eq!(engine.context().status, AssessmentStatus::InProgress);
        engine.submit_response("SCR003", ResponseValue::Number(2.0)).unwrap();
    }

    #[tokio::test]
    async fn test_paused_next_question_refuses() {
        let mut engine = engine();
        engine.pause().unwrap();
        let err = engine.next_question().await.unwrap_err();
        assert_eq!(err, EngineError::AssessmentPaused);
    }

    #[tokio::test]
    async fn test_gateway_question_served_first() {
        let mut engine = engine();
        match engine.next_question().await.unwrap() {
            Turn::Question { question, .. } => assert_eq!(question.id, "SCR001"),
            Turn::Done { reason } => panic!("expected a question, got done: {reason}"),
        }
    }

    #[test]
    fn test_trigger_forces_activation_and_injection() {
        let mut engine = engine();
        engine
            .submit_response("SCR002", ResponseValue::Text("daily".into()))
            .unwrap();

        let ctx = engine.context();
        assert!(ctx.forced_active.contains(&FunctionalModule::Assimilation));
        assert!(ctx.injected_questions.contains(&"ASM001".to_string()));
        assert!(ctx.module_scores[&FunctionalModule::Assimilation].activated);
    }

    #[tokio::test]
    async fn test_injected_question_jumps_queue() {
        let mut engine = engine();
        engine.submit_response("SCR001", ResponseValue::Number(3.0)).unwrap();
        engine
            .submit_response("SCR002", ResponseValue::Text("daily".into()))
            .unwrap();

        match engine.next_question().await.unwrap() {
            Turn::Question { question, .. } => assert_eq!(question.id, "ASM001"),
            Turn::Done { reason } => panic!("expected a question, got done: {reason}"),
        }
    }

    #[test]
    fn test_conditional_skip_recorded() {
        let mut engine = engine();
        engine
            .submit_response("SCR004", ResponseValue::Text("no".into()))
            .unwrap();
        assert!(engine.conditional_skips.contains("SCR005"));
    }

    #[test]
    fn test_red_flag_recorded_without_halting() {
        let mut engine = engine();
        // SCR001 carries a default red-flag threshold of 2.
        engine.submit_response("SCR001", ResponseValue::Number(5.0)).unwrap();

        let ctx = engine.context();
        assert_eq!(ctx.red_flags.len(), 1);
        assert_eq!(ctx.status, AssessmentStatus::InProgress);

        let summary = engine.summary();
        assert_eq!(summary.red_flags.len(), 1);
        assert!(summary.overall_risk >= RiskLevel::Moderate);
    }

    #[test]
    fn test_state_round_trip() {
        let mut engine = engine();
        engine.submit_response("SCR001", ResponseValue::Number(3.0)).unwrap();
        engine
            .submit_response("SCR004", ResponseValue::Text("no".into()))
            .unwrap();

        let json = serde_json::to_string(&engine.state()).unwrap();
        let state: AssessmentState = serde_json::from_str(&json).unwrap();
        let restored = AssessmentEngine::from_state(
            EngineConfig::default(),
            bank(),
            None,
            state,
        );

        assert_eq!(restored.context().questions_asked, 2);
        assert!(restored.log().contains("SCR001"));
        assert!(restored.conditional_skips.contains("SCR005"));
    }

    #[tokio::test]
    async fn test_completed_next_question_repeats_reason() {
        let mut engine = engine();
        engine.finalize("Maximum question limit reached".to_string());
        match engine.next_question().await.unwrap() {
            Turn::Done { reason } => assert_eq!(reason, "Maximum question limit reached"),
            Turn::Question { .. } => panic!("expected done"),
        }
    }
}
