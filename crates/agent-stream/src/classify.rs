use serde_json::Value;

use crate::event::{RawEvent, StepCategory};

/// Keyword table checked in priority order; the first category with a
/// keyword contained in the step identifier wins.
const KEYWORDS: &[(StepCategory, &[&str])] = &[
    (StepCategory::Triage, &["triage"]),
    (StepCategory::Intent, &["intent"]),
    (StepCategory::Schema, &["schema"]),
    (
        StepCategory::SqlGeneration,
        &["sql_generation", "sql_gen", "generate_sql", "generation"],
    ),
    (
        StepCategory::Verification,
        &["verification", "verify", "verifier"],
    ),
    (
        StepCategory::SqlExecution,
        &["sql_execution", "execute_sql", "execution"],
    ),
    (StepCategory::Visualization, &["viz", "visualization", "graph"]),
];

/// Lower-cased `step`, `type` and `name` values joined by spaces.
pub fn step_identifier(event: &RawEvent) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    if let Some(step) = event.step() {
        parts.push(step.trim().to_lowercase());
    }
    for key in ["type", "name"] {
        if let Some(text) = event.payload.get(key).and_then(Value::as_str) {
            parts.push(text.trim().to_lowercase());
        }
    }
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

/// Maps an event to its canonical step category. Total and deterministic.
pub fn classify(event: &RawEvent) -> StepCategory {
    classify_identifier(&step_identifier(event))
}

pub(crate) fn classify_identifier(identifier: &str) -> StepCategory {
    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| identifier.contains(kw)))
        .map(|(category, _)| *category)
        .unwrap_or(StepCategory::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> RawEvent {
        RawEvent::from_value(value).expect("object")
    }

    #[test]
    fn classifies_each_pipeline_step() {
        let cases = [
            ("triage", StepCategory::Triage),
            ("intent", StepCategory::Intent),
            ("schema", StepCategory::Schema),
            ("sql_generation", StepCategory::SqlGeneration),
            ("verification", StepCategory::Verification),
            ("sql_execution", StepCategory::SqlExecution),
            ("visualization", StepCategory::Visualization),
            ("graph", StepCategory::Visualization),
            ("viz_builder", StepCategory::Visualization),
            ("format", StepCategory::Other),
            ("complete", StepCategory::Other),
        ];
        for (step, expected) in cases {
            assert_eq!(classify(&event(json!({ "step": step }))), expected, "{step}");
        }
    }

    #[test]
    fn identifier_includes_type_and_name_and_is_normalized() {
        let e = event(json!({"step": "  Agent_Update ", "type": "INTENT", "name": "detector"}));
        assert_eq!(step_identifier(&e), "agent_update intent detector");
        assert_eq!(classify(&e), StepCategory::Intent);
    }

    #[test]
    fn priority_order_breaks_ties() {
        let e = event(json!({"step": "schema", "name": "triage_followup"}));
        assert_eq!(classify(&e), StepCategory::Triage);
    }

    #[test]
    fn missing_identifier_is_other() {
        assert_eq!(classify(&event(json!({"foo": 1}))), StepCategory::Other);
    }

    #[test]
    fn classification_is_deterministic() {
        let e = event(json!({"step": "sql_execution", "type": "node"}));
        assert_eq!(classify(&e), classify(&e));
    }
}
