use std::fmt::Write as _;

use agent_stream::FinalResult;
use serde_json::Value;

/// Plain-text summary of a final result, one section per present field.
pub fn summary(result: &FinalResult) -> String {
    let mut out = String::new();
    if let Some(error) = result.error_message() {
        if result.pattern().is_some() || result.archetype().is_some() {
            let _ = writeln!(
                out,
                "Pattern: {}, archetype: {}",
                result.pattern().unwrap_or("N/A"),
                result.archetype().unwrap_or("N/A")
            );
        }
        let _ = writeln!(out, "Error: {error}");
        return out;
    }

    if let Some(rows) = result.rows() {
        let columns = result.columns();
        let _ = writeln!(out, "{}", columns.join("\t"));
        for row in rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|col| row.get(*col).map(cell_text).unwrap_or_default())
                .collect();
            let _ = writeln!(out, "{}", cells.join("\t"));
        }
    }
    if let Some(insight) = result.insight() {
        let _ = writeln!(out, "Insight: {insight}");
    }
    if let Some(url) = result.html_url() {
        let _ = writeln!(out, "Chart: {url}");
    }
    if let Some(link) = result.link_power_bi() {
        let _ = writeln!(out, "Power BI: {link}");
    }

    if out.is_empty() {
        let text = serde_json::to_string_pretty(result.as_value()).unwrap_or_default();
        let _ = writeln!(out, "{text}");
    }
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
