use serde_json::{Map, Value};

use crate::classify::classify;
use crate::event::{RawEvent, StepCategory};
use crate::payload::StepPayload;

const OTHER_STEP_LINE: &str = "Agent performed an additional processing step.";

/// Builds the narrative line for one event, if it warrants one.
///
/// Frames without any step identifier (keepalives, bare acknowledgements)
/// produce no line.
pub fn narrate(category: StepCategory, payload: &Map<String, Value>) -> Option<String> {
    if category == StepCategory::Other && !has_identifier(payload) {
        return None;
    }
    Some(render(&StepPayload::extract(category, payload)))
}

/// Classifies and narrates an event in one step.
pub fn narrate_event(event: &RawEvent) -> Option<String> {
    narrate(classify(event), &event.payload)
}

/// Renders a typed payload into its human-readable sentence.
pub fn render(payload: &StepPayload) -> String {
    match payload {
        StepPayload::Triage {
            classification,
            reasoning,
        } => {
            let mut line = match classification {
                Some(c) => format!("Classified the query as {}.", clause(c)),
                None => "Classified the query.".to_string(),
            };
            if let Some(r) = reasoning {
                line.push_str(&format!(" Detail: {r}"));
            }
            line
        }
        StepPayload::Intent {
            intent,
            pattern,
            archetype,
            rationale,
        } => {
            let labelled = [
                ("intent", intent),
                ("pattern", pattern),
                ("archetype", archetype),
            ];
            let named: Vec<String> = labelled
                .into_iter()
                .filter_map(|(label, value)| {
                    value.as_deref().map(|v| format!("{label} {}", clause(v)))
                })
                .collect();
            let mut line = if named.is_empty() {
                "Identified the query intent.".to_string()
            } else {
                format!("Identified {}.", named.join(" and "))
            };
            if let Some(r) = rationale {
                line.push_str(&format!(" Rationale: {r}"));
            }
            line
        }
        StepPayload::Schema { tables } if !tables.is_empty() => {
            format!("Prioritized tables: {}.", tables.join(", "))
        }
        StepPayload::Schema { .. } => "Prioritized relevant tables.".to_string(),
        StepPayload::SqlGeneration { sql: Some(sql) } => format!("Generated SQL: {sql}"),
        StepPayload::SqlGeneration { sql: None } => {
            "Generated SQL to answer the question.".to_string()
        }
        StepPayload::Verification { success: true, .. } => "Verified successfully.".to_string(),
        StepPayload::Verification {
            message: Some(message),
            ..
        } => format!("Verification found issues: {}.", clause(message)),
        StepPayload::Verification { .. } => "Verification performed.".to_string(),
        StepPayload::SqlExecution {
            success: true,
            row_count,
            ..
        } => match row_count {
            Some(1) => "Execution succeeded. Returned 1 row.".to_string(),
            Some(n) => format!("Execution succeeded. Returned {n} rows."),
            None => "Execution succeeded.".to_string(),
        },
        StepPayload::SqlExecution {
            error: Some(message),
            ..
        } => format!("Execution failed: {}.", clause(message)),
        StepPayload::SqlExecution { .. } => {
            "Execution completed with no further detail.".to_string()
        }
        StepPayload::Visualization {
            chart_type: Some(kind),
        } => format!("Generated a {} visualization.", clause(kind)),
        StepPayload::Visualization { chart_type: None } => {
            "Generated a visualization of the results.".to_string()
        }
        StepPayload::Unknown(_) => OTHER_STEP_LINE.to_string(),
    }
}

/// Strips trailing periods so interpolated values don't double the stop.
fn clause(text: &str) -> &str {
    text.trim_end_matches('.')
}

fn has_identifier(payload: &Map<String, Value>) -> bool {
    ["step", "type", "name"].iter().any(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    })
}
