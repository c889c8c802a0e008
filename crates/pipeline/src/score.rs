use serde_json::{json, Value};
use testu_core::collaborators::Scorer;
use testu_core::error::CoreError;
use testu_core::report::Report;

/// Identifier written into `score.scoreProcID`.
pub const TALLY_PROC_ID: &str = "tally";

/// Records how many acts the agent performed, and how many were tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TallyScorer;

impl Scorer for TallyScorer {
    fn score(&self, report: &mut Report) -> Result<(), CoreError> {
        let acts = report
            .get("acts")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::Internal("report acts are not an array".to_string()))?;
        let tests = acts
            .iter()
            .filter(|act| act.get("type").and_then(Value::as_str) == Some("test"))
            .count();
        let total = acts.len();

        report.insert(
            "score",
            json!({
                "scoreProcID": TALLY_PROC_ID,
                "summary": {
                    "acts": total,
                    "tests": tests,
                },
            }),
        );
        Ok(())
    }
}
