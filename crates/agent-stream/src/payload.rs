//! Typed views over step payloads.
//!
//! Backend steps name the same datum differently across versions (Spanish
//! and English keys, nested containers). Each field is therefore read through
//! an ordered fallback chain: the first present, non-empty value wins.

use serde_json::{Map, Value};

use crate::event::StepCategory;

pub(crate) const CLASSIFICATION_KEYS: &[&str] =
    &["query_type", "category", "categoria", "domain", "area"];
pub(crate) const TRIAGE_REASONING_KEYS: &[&str] = &["reasoning", "resumen", "summary", "detalle"];
pub(crate) const INTENT_KEYS: &[&str] = &["intent", "intention", "objetivo"];
pub(crate) const PATTERN_KEYS: &[&str] = &["tipo_patron", "patron", "pattern", "tipo"];
pub(crate) const ARCHETYPE_KEYS: &[&str] = &["arquetipo", "archetype"];
pub(crate) const INTENT_RATIONALE_KEYS: &[&str] = &["razon", "reasoning", "resumen", "detalle"];
pub(crate) const TABLE_LIST_KEYS: &[&str] = &[
    "tablas_priorizadas",
    "tablas",
    "tables",
    "prioritized_tables",
    "tablas_prioritizadas",
];
pub(crate) const SQL_KEYS: &[&str] = &["sql", "query", "consulta", "generated_sql", "sql_query"];
pub(crate) const SUCCESS_FLAG_KEYS: &[&str] = &["success", "ok", "status"];
pub(crate) const VERIFICATION_MESSAGE_KEYS: &[&str] =
    &["message", "detalle", "descripcion", "reason", "resumen"];
pub(crate) const EXECUTION_STATUS_TEXT_KEYS: &[&str] = &["message", "resumen", "summary", "status"];
pub(crate) const ROW_COUNT_KEYS: &[&str] =
    &["total_filas", "total_rows", "row_count", "count", "num_rows"];
pub(crate) const EXECUTION_ERROR_KEYS: &[&str] =
    &["error", "errorMessage", "descripcion", "detalle", "reason"];
pub(crate) const CHART_TYPE_KEYS: &[&str] =
    &["tipo_grafico", "chart_type", "visual_hint", "graph_type", "viz_type"];

/// Status words treated as success by flag fields.
pub(crate) const SUCCESS_WORDS: &[&str] = &["ok", "success", "completed", "done", "true"];
/// Substrings that mark a free-text execution status as successful.
const EXECUTION_SUCCESS_MARKERS: &[&str] = &["exito", "éxito", "success", "ok"];
/// Keys naming a table when schema lists carry objects instead of strings.
const TABLE_NAME_KEYS: &[&str] = &["name", "table", "tabla", "nombre"];

/// Per-category payload shape extracted from a raw event.
#[derive(Clone, Debug, PartialEq)]
pub enum StepPayload {
    Triage {
        classification: Option<String>,
        reasoning: Option<String>,
    },
    Intent {
        intent: Option<String>,
        pattern: Option<String>,
        archetype: Option<String>,
        rationale: Option<String>,
    },
    Schema {
        tables: Vec<String>,
    },
    SqlGeneration {
        sql: Option<String>,
    },
    Verification {
        success: bool,
        message: Option<String>,
    },
    SqlExecution {
        success: bool,
        row_count: Option<u64>,
        error: Option<String>,
    },
    Visualization {
        chart_type: Option<String>,
    },
    /// Payload of a step without a dedicated shape.
    Unknown(Value),
}

impl StepPayload {
    /// Extracts the shape for `category` from a raw frame payload.
    ///
    /// The payload is unwrapped first (see [`effective_payload`]).
    pub fn extract(category: StepCategory, payload: &Map<String, Value>) -> Self {
        let p = effective_payload(payload);
        match category {
            StepCategory::Triage => Self::Triage {
                classification: first_text(p, CLASSIFICATION_KEYS),
                reasoning: first_text(p, TRIAGE_REASONING_KEYS),
            },
            StepCategory::Intent => Self::Intent {
                intent: first_text(p, INTENT_KEYS),
                pattern: first_text(p, PATTERN_KEYS),
                archetype: first_text(p, ARCHETYPE_KEYS),
                rationale: first_text(p, INTENT_RATIONALE_KEYS),
            },
            StepCategory::Schema => Self::Schema {
                tables: first_list(p, TABLE_LIST_KEYS).unwrap_or_default(),
            },
            StepCategory::SqlGeneration => Self::SqlGeneration {
                sql: first_text(p, SQL_KEYS),
            },
            StepCategory::Verification => Self::Verification {
                success: success_flag(p, SUCCESS_FLAG_KEYS).unwrap_or(false),
                message: first_text(p, VERIFICATION_MESSAGE_KEYS),
            },
            StepCategory::SqlExecution => Self::SqlExecution {
                success: success_flag(p, SUCCESS_FLAG_KEYS).unwrap_or(false)
                    || execution_text_signals_success(p),
                row_count: first_count(p, ROW_COUNT_KEYS),
                error: first_text(p, EXECUTION_ERROR_KEYS),
            },
            StepCategory::Visualization => Self::Visualization {
                chart_type: first_text(p, CHART_TYPE_KEYS),
            },
            StepCategory::Other => Self::Unknown(Value::Object(p.clone())),
        }
    }
}

/// Returns the object that carries a step's fields: `result`, else `payload`,
/// else the frame itself. Only nested objects are unwrapped.
pub fn effective_payload(payload: &Map<String, Value>) -> &Map<String, Value> {
    ["result", "payload"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_object))
        .unwrap_or(payload)
}

/// Yields `status` and `state.status` from `map`, when they are strings.
pub(crate) fn status_texts(map: &Map<String, Value>) -> impl Iterator<Item = &str> {
    let direct = map.get("status").and_then(Value::as_str);
    let nested = map
        .get("state")
        .and_then(|state| state.get("status"))
        .and_then(Value::as_str);
    direct.into_iter().chain(nested)
}

/// First non-empty string (trimmed) or number among `keys`.
pub(crate) fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-negative integer among `keys`; numeric strings are accepted.
pub(crate) fn first_count(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// First non-empty array among `keys`, rendered as display names.
pub(crate) fn first_list(map: &Map<String, Value>, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|key| {
        let items = map.get(*key)?.as_array()?;
        let names: Vec<String> = items.iter().filter_map(list_item_name).collect();
        (!names.is_empty()).then_some(names)
    })
}

fn list_item_name(item: &Value) -> Option<String> {
    match item {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => first_text(obj, TABLE_NAME_KEYS),
        _ => None,
    }
}

/// The first present flag among `keys` decides: `true`, or a success word.
pub(crate) fn success_flag(map: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(is_success_word(s)),
        _ => Some(false),
    })
}

pub(crate) fn is_success_word(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    SUCCESS_WORDS.contains(&lowered.as_str())
}

fn execution_text_signals_success(map: &Map<String, Value>) -> bool {
    let nested_status = map
        .get("state")
        .and_then(|state| state.get("status"))
        .and_then(Value::as_str);
    let texts = EXECUTION_STATUS_TEXT_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .chain(nested_status);
    texts.map(str::to_lowercase).any(|text| {
        EXECUTION_SUCCESS_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    })
}
