//! Command handlers for intakectl.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::Term;
use owo_colors::OwoColorize;

use intake_core::advisor::{Advisor, AdvisorConfig, HttpAdvisor};
use intake_core::types::{Gender, RiskLevel};
use intake_core::{
    AssessmentEngine, AssessmentSummary, ClientProfile, EngineConfig, Question, QuestionCatalog,
    ResponseValue, StaticCatalog, Turn,
};

use crate::state;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Question bank JSON file
    #[arg(long)]
    pub bank: PathBuf,

    /// Engine configuration TOML (defaults used when absent)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// State file for persistence between sessions
    #[arg(long, default_value = "assessment.json")]
    pub state: PathBuf,

    /// Scripted answers JSON file (question id to value); interactive if absent
    #[arg(long)]
    pub answers: Option<PathBuf>,

    /// Client gender (male/female), used for question applicability
    #[arg(long)]
    pub gender: Option<String>,

    /// Client age
    #[arg(long)]
    pub age: Option<u32>,

    /// Advisor endpoint (Ollama or OpenAI-compatible); fallback-only if absent
    #[arg(long)]
    pub advisor_endpoint: Option<String>,

    /// Advisor model name
    #[arg(long, default_value = "llama3.2:3b")]
    pub advisor_model: String,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    #[arg(long)]
    pub bank: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "assessment.json")]
    pub state: PathBuf,

    #[arg(long)]
    pub answers: Option<PathBuf>,

    #[arg(long)]
    pub advisor_endpoint: Option<String>,

    #[arg(long, default_value = "llama3.2:3b")]
    pub advisor_model: String,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[arg(long)]
    pub bank: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "assessment.json")]
    pub state: PathBuf,
}

#[derive(Args, Debug)]
pub struct BankArgs {
    /// Question bank JSON file
    #[arg(long)]
    pub bank: PathBuf,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let catalog = Arc::new(StaticCatalog::from_json_file(&args.bank)?);
    let config = load_config(args.config.as_deref())?;
    let advisor = build_advisor(args.advisor_endpoint, args.advisor_model)?;
    let client = ClientProfile {
        gender: parse_gender(args.gender.as_deref())?,
        age: args.age,
    };

    let mut engine = AssessmentEngine::new(config, catalog, advisor, client);
    let script = load_script(args.answers.as_deref())?;
    drive(&mut engine, &args.state, script).await
}

pub async fn resume(args: ResumeArgs) -> Result<()> {
    let catalog = Arc::new(StaticCatalog::from_json_file(&args.bank)?);
    let config = load_config(args.config.as_deref())?;
    let advisor = build_advisor(args.advisor_endpoint, args.advisor_model)?;

    let snapshot = state::load(&args.state)?;
    let mut engine = AssessmentEngine::from_state(config, catalog, advisor, snapshot);
    engine.resume()?;

    let script = load_script(args.answers.as_deref())?;
    drive(&mut engine, &args.state, script).await
}

pub fn summary(args: SummaryArgs) -> Result<()> {
    let catalog = Arc::new(StaticCatalog::from_json_file(&args.bank)?);
    let config = load_config(args.config.as_deref())?;
    let snapshot = state::load(&args.state)?;

    let engine = AssessmentEngine::from_state(config, catalog, None, snapshot);
    print_summary(&engine.summary());
    Ok(())
}

pub fn bank(args: BankArgs) -> Result<()> {
    let catalog = StaticCatalog::from_json_file(&args.bank)?;

    println!("{}", "Question bank".bold());
    println!("  total questions: {}", catalog.len());
    println!("  seed-oil tagged: {}", catalog.seed_oil_questions().len());
    println!();
    for module in intake_core::types::MODULE_SEQUENCE {
        println!("  {:<20} {}", module.to_string(), catalog.by_module(module).len());
    }
    Ok(())
}

// ============================================================================
// Turn loop
// ============================================================================

enum AnswerInput {
    Value(ResponseValue),
    Pause,
}

async fn drive(
    engine: &mut AssessmentEngine,
    state_path: &Path,
    script: Option<HashMap<String, ResponseValue>>,
) -> Result<()> {
    let term = Term::stdout();

    loop {
        match engine.next_question().await? {
            Turn::Done { reason } => {
                state::save(state_path, &engine.state())?;
                println!();
                println!("{} {}", "Assessment complete:".green().bold(), reason);
                println!();
                print_summary(&engine.summary());
                return Ok(());
            }
            Turn::Question { question, reasoning, .. } => {
                let input = match &script {
                    Some(answers) => match answers.get(&question.id) {
                        Some(value) => AnswerInput::Value(value.clone()),
                        // Script exhausted; park the assessment for later.
                        None => AnswerInput::Pause,
                    },
                    None => prompt(&term, &question, &reasoning)?,
                };

                match input {
                    AnswerInput::Value(value) => {
                        engine.submit_response(&question.id, value)?;
                        state::save(state_path, &engine.state())?;
                    }
                    AnswerInput::Pause => {
                        engine.pause()?;
                        state::save(state_path, &engine.state())?;
                        println!();
                        println!(
                            "{} state saved to {}",
                            "Assessment paused,".yellow(),
                            state_path.display()
                        );
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn prompt(term: &Term, question: &Question, reasoning: &str) -> Result<AnswerInput> {
    println!();
    println!(
        "{} {} {}",
        format!("[{}]", question.module).dimmed(),
        question.id.dimmed(),
        question.text.bold()
    );
    if !reasoning.is_empty() {
        println!("  {}", reasoning.dimmed());
    }
    for option in &question.options {
        println!("    {} - {}", option.value.display().cyan(), option.label);
    }
    print!("  answer (or 'pause'): ");
    use std::io::Write;
    std::io::stdout().flush().ok();

    let line = term.read_line().context("failed to read answer")?;
    let line = line.trim();
    if line.eq_ignore_ascii_case("pause") || line.eq_ignore_ascii_case("quit") {
        return Ok(AnswerInput::Pause);
    }
    Ok(AnswerInput::Value(parse_value(line)))
}

/// Raw input to answer value: numeric if it parses, comma-separated lists to
/// multi-select, everything else as text.
fn parse_value(input: &str) -> ResponseValue {
    if let Ok(n) = input.parse::<f64>() {
        return ResponseValue::Number(n);
    }
    if input.contains(',') {
        return ResponseValue::Multi(
            input.split(',').map(|s| s.trim().to_string()).collect(),
        );
    }
    ResponseValue::Text(input.to_string())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn build_advisor(
    endpoint: Option<String>,
    model: String,
) -> Result<Option<Arc<dyn Advisor>>> {
    let Some(endpoint) = endpoint else {
        return Ok(None);
    };
    let advisor = HttpAdvisor::new(AdvisorConfig {
        enabled: true,
        endpoint,
        model,
        api_key: std::env::var("INTAKE_API_KEY").ok(),
    })?;
    Ok(Some(Arc::new(advisor)))
}

fn parse_gender(input: Option<&str>) -> Result<Option<Gender>> {
    match input.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("male") => Ok(Some(Gender::Male)),
        Some("female") => Ok(Some(Gender::Female)),
        Some(other) => bail!("unrecognized gender '{other}' (expected male or female)"),
    }
}

fn load_script(path: Option<&Path>) -> Result<Option<HashMap<String, ResponseValue>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answers file: {}", path.display()))?;
    let script = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse answers file: {}", path.display()))?;
    Ok(Some(script))
}

fn print_summary(summary: &AssessmentSummary) {
    println!("{}", "Assessment summary".bold());
    println!("  id:               {}", summary.assessment_id);
    println!("  status:           {:?}", summary.status);
    println!("  questions asked:  {}", summary.questions_asked);
    println!("  questions saved:  {}", summary.questions_saved);

    let risk = summary.overall_risk.as_str();
    let risk = match summary.overall_risk {
        RiskLevel::Low => risk.green().to_string(),
        RiskLevel::Moderate => risk.yellow().to_string(),
        RiskLevel::High | RiskLevel::Critical => risk.red().bold().to_string(),
    };
    println!("  overall risk:     {risk}");
    println!("  minutes left:     ~{}", summary.estimated_minutes_remaining);
    if let Some(reason) = &summary.termination_reason {
        println!("  stopped because:  {reason}");
    }

    println!();
    println!("{}", "Module scores".bold());
    for m in &summary.module_scores {
        println!(
            "  {:<20} {:>5.1}  answered {:>3}  {}{:?}",
            m.module.to_string(),
            m.score,
            m.questions_answered,
            if m.activated { "" } else { "inactive, " },
            m.completion_status,
        );
    }

    if !summary.clusters.is_empty() {
        println!();
        println!("{}", "Symptom clusters".bold());
        for c in &summary.clusters {
            println!(
                "  {:<28} confidence {:.2}  severity {:?}",
                c.name, c.confidence, c.severity
            );
        }
    }

    println!();
    println!("{}", "Dietary oil metrics".bold());
    println!("  exposure:  {:.1}/10", summary.seed_metrics.exposure_level);
    println!("  damage:    {:.1}/10", summary.seed_metrics.damage_indicators);
    println!("  recovery:  {:.1}/10", summary.seed_metrics.recovery_potential);
    for finding in &summary.seed_metrics.critical_findings {
        println!("  {} {}", "!".red(), finding);
    }

    if !summary.red_flags.is_empty() {
        println!();
        println!("{}", "Red flags".red().bold());
        for flag in &summary.red_flags {
            println!("  {} ({} = {})", flag.message, flag.question_id, flag.value);
        }
    }
    if !summary.alerts.is_empty() {
        println!();
        println!("{}", "Alerts".yellow().bold());
        for alert in &summary.alerts {
            println!(
                "  {:?} on {}{}",
                alert.level,
                alert.question_id,
                if alert.requires_followup { " (follow-up required)" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_shapes() {
        assert_eq!(parse_value("3"), ResponseValue::Number(3.0));
        assert_eq!(parse_value("never"), ResponseValue::Text("never".into()));
        assert_eq!(
            parse_value("canola, olive"),
            ResponseValue::Multi(vec!["canola".into(), "olive".into()])
        );
    }

    #[test]
    fn test_parse_gender() {
        assert_eq!(parse_gender(Some("Female")).unwrap(), Some(Gender::Female));
        assert_eq!(parse_gender(None).unwrap(), None);
        assert!(parse_gender(Some("other")).is_err());
    }
}
