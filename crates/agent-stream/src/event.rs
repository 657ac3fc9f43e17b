use std::fmt;

use serde_json::{Map, Value};

/// One decoded frame of the pipeline stream, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    /// Value of the frame's `step` field, when it is a string.
    pub step: Option<String>,
    /// The complete parsed JSON object.
    pub payload: Map<String, Value>,
}

impl RawEvent {
    /// Builds an event from a parsed frame object.
    pub fn from_object(payload: Map<String, Value>) -> Self {
        let step = payload
            .get("step")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        Self { step, payload }
    }

    /// Builds an event from any JSON value, returning `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from_object(map)),
            _ => None,
        }
    }

    /// Returns the raw step string, if any.
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }
}

/// Canonical pipeline step derived from a `RawEvent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Triage,
    Intent,
    Schema,
    SqlGeneration,
    Verification,
    SqlExecution,
    Visualization,
    Other,
}

impl StepCategory {
    /// Snake-case label, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Intent => "intent",
            Self::Schema => "schema",
            Self::SqlGeneration => "sql_generation",
            Self::Verification => "verification",
            Self::SqlExecution => "sql_execution",
            Self::Visualization => "visualization",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_is_read_from_payload() {
        let event = RawEvent::from_value(json!({"step": "triage", "category": "ventas"}))
            .expect("object");
        assert_eq!(event.step(), Some("triage"));
        assert_eq!(event.payload.get("category"), Some(&json!("ventas")));
    }

    #[test]
    fn non_string_step_is_treated_as_missing() {
        let event = RawEvent::from_value(json!({"step": 3})).expect("object");
        assert_eq!(event.step(), None);
    }

    #[test]
    fn non_object_values_are_rejected() {
        assert!(RawEvent::from_value(json!([1, 2])).is_none());
        assert!(RawEvent::from_value(json!("complete")).is_none());
    }

    #[test]
    fn category_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(StepCategory::SqlGeneration).expect("serialize"),
            json!("sql_generation")
        );
        assert_eq!(StepCategory::SqlExecution.to_string(), "sql_execution");
    }
}
