use async_trait::async_trait;
use serde_json::Value;
use testu_core::collaborators::Digester;
use testu_core::error::CoreError;
use testu_core::report::Report;

/// Renders a one-page HTML summary of a scored report.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryDigester;

#[async_trait]
impl Digester for SummaryDigester {
    async fn digest(&self, report: &Report) -> Result<String, CoreError> {
        let score = report
            .get("score")
            .ok_or_else(|| CoreError::Internal("report has not been scored".to_string()))?;

        let target = report.get("sources").and_then(|s| s.get("target"));
        let what = text(target.and_then(|t| t.get("what")));
        let which = text(target.and_then(|t| t.get("which")));
        let summary = serde_json::to_string_pretty(score.get("summary").unwrap_or(score))
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        Ok(format!(
            "<!DOCTYPE html>\n\
             <html lang=\"en-US\">\n\
             <head><meta charset=\"utf-8\"><title>Digest of {id}</title></head>\n\
             <body>\n\
             <h1>Accessibility digest</h1>\n\
             <p>Report {id}: {what} (<a href=\"{which}\">{which}</a>)</p>\n\
             <p>Tested by {agent}.</p>\n\
             <pre>{summary}</pre>\n\
             </body>\n\
             </html>\n",
            id = escape(&report.id()),
            what = escape(&what),
            which = escape(&which),
            agent = escape(report.agent().unwrap_or("an unknown agent")),
            summary = escape(&summary),
        ))
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
