use serde_json::{Map, Value, json};

use crate::event::RawEvent;

/// Final structured answer of a session.
///
/// Either `{ "error": "..." }` or the backend's formatted response, which may
/// carry `datos` rows, an `insight`, a chart `html_url` and a
/// `link_power_bi` report link.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FinalResult(Value);

impl FinalResult {
    /// Wraps a resolved backend value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self(json!({ "error": message.into() }))
    }

    /// The underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Error text, when the result is a failure.
    pub fn error_message(&self) -> Option<&str> {
        self.str_field("error")
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Result rows from `datos`, when present and non-empty.
    pub fn rows(&self) -> Option<&[Value]> {
        self.0
            .get("datos")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .filter(|rows| !rows.is_empty())
    }

    /// Column names taken from the first row, in wire order.
    pub fn columns(&self) -> Vec<&str> {
        self.rows()
            .and_then(|rows| rows.first())
            .and_then(Value::as_object)
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn insight(&self) -> Option<&str> {
        self.str_field("insight")
    }

    /// URL of the rendered chart page.
    pub fn html_url(&self) -> Option<&str> {
        self.str_field("html_url")
    }

    pub fn link_power_bi(&self) -> Option<&str> {
        self.str_field("link_power_bi")
    }

    /// Query pattern label (`patron`); `None` when absent or `NA`.
    pub fn pattern(&self) -> Option<&str> {
        self.label_field("patron")
    }

    /// Query archetype label (`arquetipo`); `None` when absent or `NA`.
    pub fn archetype(&self) -> Option<&str> {
        self.label_field("arquetipo")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn label_field(&self, key: &str) -> Option<&str> {
        self.str_field(key).filter(|s| !s.eq_ignore_ascii_case("na"))
    }
}

impl From<Value> for FinalResult {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Resolves the final answer from the event history.
///
/// The first `complete` event is consulted first, then the last event.
/// Returns `None` when neither yields a value; the caller then reports
/// that the stream ended without a final response.
pub fn resolve(events: &[RawEvent]) -> Option<FinalResult> {
    let terminal = events.iter().find(|e| e.step() == Some("complete"));
    terminal
        .and_then(|e| extract_answer(&e.payload))
        .or_else(|| events.last().and_then(|e| extract_answer(&e.payload)))
        .map(FinalResult::new)
}

/// Applies the answer fallback chain to one raw payload.
pub fn extract_answer(payload: &Map<String, Value>) -> Option<Value> {
    let result = payload.get("result");
    let candidates = [
        result.and_then(|r| r.get("formatted_response")),
        result.and_then(|r| r.get("formattedResponse")),
        result,
        payload.get("payload"),
        payload.get("response"),
        payload.get("message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_null())
        .cloned()
}
