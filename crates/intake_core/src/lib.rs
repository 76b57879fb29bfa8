//! Adaptive health-questionnaire engine.
//!
//! Drives a multi-module intake assessment turn by turn: scores each answer,
//! activates and retires body-system modules, watches for symptom clusters
//! and red flags, and picks the next question through an advisor with a
//! deterministic fallback, keeping the whole run inside a 200-250 question
//! budget.

pub mod activation;
pub mod advisor;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod early_exit;
pub mod error;
pub mod orchestrator;
pub mod patterns;
pub mod red_flags;
pub mod response_log;
pub mod scoring;
pub mod seed_metrics;
pub mod selector;
pub mod types;

pub use advisor::{Advisor, AdvisorConfig, AdvisorError, FakeAdvisor, HttpAdvisor, TimedAdvisor};
pub use catalog::{QuestionCatalog, StaticCatalog};
pub use config::EngineConfig;
pub use error::EngineError;
pub use orchestrator::{AssessmentEngine, AssessmentState, Turn};
pub use response_log::ResponseLog;
pub use types::{
    AssessmentContext, AssessmentStatus, AssessmentSummary, ClientProfile, FunctionalModule,
    Question, QuestionType, Response, ResponseValue, RiskLevel,
};
