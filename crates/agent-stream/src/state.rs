use tracing::debug;

use crate::completion::is_complete;
use crate::errors::NO_FINAL_RESPONSE;
use crate::event::RawEvent;
use crate::frame::FrameDecoder;
use crate::narrative::narrate_event;
use crate::progress::{ProgressState, progress};
use crate::result::{FinalResult, resolve};

/// Point-in-time view of a session, as handed to consumers.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    /// One line per narrated event, in arrival order.
    pub narrative: Vec<String>,
    pub progress: ProgressState,
    pub is_complete: bool,
    /// Set exactly once, when the session ends.
    pub final_result: Option<FinalResult>,
    /// Number of decoded events so far.
    pub event_count: usize,
}

/// Mutable state of one stream session.
///
/// Owned by a single session task; every derived field is recomputed from
/// the ordered event history as frames arrive.
#[derive(Debug, Default)]
pub struct StreamSessionState {
    decoder: FrameDecoder,
    events: Vec<RawEvent>,
    narrative: Vec<String>,
    progress: ProgressState,
    complete: bool,
    final_result: Option<FinalResult>,
}

impl StreamSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a transport chunk and applies every completed event.
    ///
    /// Returns the events that were appended. Chunks arriving after the
    /// session finished are ignored.
    pub fn ingest_chunk(&mut self, chunk: &[u8]) -> &[RawEvent] {
        if self.is_finished() {
            return &[];
        }
        let start = self.events.len();
        for event in self.decoder.push_chunk(chunk) {
            self.apply_event(event);
        }
        &self.events[start..]
    }

    /// Appends one decoded event and refreshes derived state.
    pub fn apply_event(&mut self, event: RawEvent) {
        debug!(step = ?event.step(), index = self.events.len(), "applying stream event");
        if let Some(line) = narrate_event(&event) {
            self.narrative.push(line);
        }
        self.events.push(event);
        self.progress = progress(&self.events);
        self.complete = is_complete(&self.events);
    }

    /// Ends the session normally, resolving the final answer.
    ///
    /// Any incomplete trailing frame is discarded unparsed.
    pub fn finish(&mut self) -> &FinalResult {
        self.discard_partial();
        let resolved =
            resolve(&self.events).unwrap_or_else(|| FinalResult::error(NO_FINAL_RESPONSE));
        self.final_result.get_or_insert(resolved)
    }

    /// Ends the session with an error result.
    pub fn fail(&mut self, message: impl Into<String>) -> &FinalResult {
        self.discard_partial();
        self.final_result.get_or_insert_with(|| FinalResult::error(message))
    }

    fn discard_partial(&mut self) {
        let dropped = self.decoder.discard_pending();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding incomplete trailing frame");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.final_result.is_some()
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn narrative(&self) -> &[String] {
        &self.narrative
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn final_result(&self) -> Option<&FinalResult> {
        self.final_result.as_ref()
    }

    /// Copies the consumer-facing fields into a snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            narrative: self.narrative.clone(),
            progress: self.progress.clone(),
            is_complete: self.complete,
            final_result: self.final_result.clone(),
            event_count: self.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TRIAGE: &str = "data: {\"step\":\"triage\",\"category\":\"ventas\"}\n\n";
    const COMPLETE: &str =
        "data: {\"step\":\"complete\",\"result\":{\"formatted_response\":{\"insight\":\"ok\"}}}\n\n";

    #[test]
    fn triage_then_complete_in_one_chunk() {
        let mut state = StreamSessionState::new();
        let appended = state.ingest_chunk(format!("{TRIAGE}{COMPLETE}").as_bytes()).len();
        assert_eq!(appended, 2);
        assert!(state.narrative().iter().any(|line| line.contains("ventas")));
        assert!(state.is_complete());
        assert_eq!(state.progress().percentage, 20);

        let result = state.finish().clone();
        assert_eq!(result, FinalResult::new(json!({"insight": "ok"})));
    }

    #[test]
    fn empty_stream_reports_missing_final_response() {
        let mut state = StreamSessionState::new();
        assert_eq!(state.finish().error_message(), Some(NO_FINAL_RESPONSE));
        assert!(!state.is_complete());
        assert_eq!(state.snapshot().event_count, 0);
    }

    #[test]
    fn partial_frame_is_not_parsed_on_finish() {
        let mut state = StreamSessionState::new();
        state.ingest_chunk(b"data: {\"step\":\"complete\",\"result\":{\"insight\":\"x\"}}");
        assert!(state.events().is_empty());
        assert_eq!(state.finish().error_message(), Some(NO_FINAL_RESPONSE));
    }

    #[test]
    fn final_result_is_set_once() {
        let mut state = StreamSessionState::new();
        state.ingest_chunk(COMPLETE.as_bytes());
        state.finish();
        state.fail("late failure");
        state.ingest_chunk(TRIAGE.as_bytes());
        assert_eq!(state.events().len(), 1);
        assert_eq!(state.final_result().and_then(FinalResult::insight), Some("ok"));
    }

    #[test]
    fn narrative_only_grows_in_arrival_order() {
        let mut state = StreamSessionState::new();
        state.ingest_chunk(TRIAGE.as_bytes());
        let first = state.narrative().to_vec();
        state.ingest_chunk(b"data: {\"step\":\"sql_execution\",\"success\":true,\"total_filas\":12}\n\n");
        assert_eq!(&state.narrative()[..first.len()], first.as_slice());
        assert_eq!(
            state.narrative().last().map(String::as_str),
            Some("Execution succeeded. Returned 12 rows.")
        );
    }
}
