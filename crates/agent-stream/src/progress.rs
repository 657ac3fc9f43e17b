use crate::event::RawEvent;

/// Ordered step tokens the backend emits over a full run.
pub const REFERENCE_STEPS: [&str; 10] = [
    "triage",
    "intent",
    "schema",
    "sql_generation",
    "verification",
    "sql_execution",
    "visualization",
    "graph",
    "format",
    "complete",
];

/// Distinct known steps observed so far and the derived completion share.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressState {
    /// Known steps seen, in reference order.
    pub seen_steps: Vec<String>,
    /// `round(100 * seen / REFERENCE_STEPS.len())`, within `0..=100`.
    pub percentage: u8,
}

/// Recomputes progress from the full event history.
///
/// Matches raw `step` strings exactly; classifier aliases do not count.
pub fn progress(events: &[RawEvent]) -> ProgressState {
    let seen_steps: Vec<String> = REFERENCE_STEPS
        .iter()
        .filter(|step| events.iter().any(|e| e.step() == Some(**step)))
        .map(|step| step.to_string())
        .collect();
    let total = REFERENCE_STEPS.len() as f64;
    let percentage = (100.0 * seen_steps.len() as f64 / total).round().clamp(0.0, 100.0) as u8;
    ProgressState {
        seen_steps,
        percentage,
    }
}
