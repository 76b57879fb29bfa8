//! JSON state-file persistence for in-flight assessments.

use anyhow::{Context, Result};
use std::path::Path;

use intake_core::AssessmentState;

/// Save a snapshot, replacing any previous one atomically.
pub fn save(path: &Path, state: &AssessmentState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write state file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace state file: {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<AssessmentState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state file: {}", path.display()))
}
