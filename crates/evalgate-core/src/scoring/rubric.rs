//! Optional rubric scoring.
//!
//! Rubric scores are opaque pass-through objects on the result row; nothing
//! downstream interprets them and they never fail a case. The default
//! implementation is a deterministic placeholder so CI stays reproducible;
//! an LLM-judged scorer can be plugged in behind the same trait.

use anyhow::Context;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

pub trait RubricScorer: Send + Sync {
    fn score(&self, answer: &str, rubric_path: &Path) -> anyhow::Result<Value>;
}

/// Deterministic placeholder: every criterion scores 3 when an answer exists,
/// 1 otherwise.
#[derive(Debug, Default)]
pub struct PlaceholderRubric;

impl RubricScorer for PlaceholderRubric {
    fn score(&self, answer: &str, rubric_path: &Path) -> anyhow::Result<Value> {
        let text = fs::read_to_string(rubric_path)
            .with_context(|| format!("failed to read rubric {}", rubric_path.display()))?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid rubric YAML at {}", rubric_path.display()))?;
        let rubric = serde_json::to_value(yaml)?;

        let name = rubric
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let base = if answer.trim().is_empty() { 1 } else { 3 };
        let mut scores = Map::new();
        if let Some(criteria) = rubric.get("criteria").and_then(Value::as_array) {
            for (idx, criterion) in criteria.iter().enumerate() {
                let id = criterion
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("c{idx}"));
                scores.insert(id, json!(base));
            }
        }
        Ok(json!({"rubric": name, "scores": scores}))
    }
}

/// Scores `answer` against the case's rubric, if it declares one. Rubric
/// problems are logged and skipped, never turned into case failures.
pub fn maybe_rubric_score(
    scorer: &dyn RubricScorer,
    answer: &str,
    rubric_path: Option<&Path>,
) -> Option<Value> {
    let path = rubric_path?;
    match scorer.score(answer, path) {
        Ok(score) => Some(score),
        Err(err) => {
            warn!("rubric scoring skipped for {}: {err:#}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn placeholder_scores_every_criterion() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "name: support-quality\ncriteria:\n  - id: clarity\n  - id: accuracy\n  - description: unnamed"
        )
        .unwrap();

        let score = maybe_rubric_score(&PlaceholderRubric, "an answer", Some(file.path())).unwrap();
        assert_eq!(score["rubric"], "support-quality");
        assert_eq!(score["scores"]["clarity"], 3);
        assert_eq!(score["scores"]["accuracy"], 3);
        assert_eq!(score["scores"]["c2"], 3);

        let empty = maybe_rubric_score(&PlaceholderRubric, "   ", Some(file.path())).unwrap();
        assert_eq!(empty["scores"]["clarity"], 1);
    }

    #[test]
    fn missing_rubric_is_skipped() {
        assert!(maybe_rubric_score(&PlaceholderRubric, "x", None).is_none());
        assert!(maybe_rubric_score(
            &PlaceholderRubric,
            "x",
            Some(Path::new("/nonexistent/rubric.yaml"))
        )
        .is_none());
    }
}
