use crate::event::RawEvent;
use crate::payload::{effective_payload, status_texts};

/// Step or status words that mark the pipeline as finished.
pub const TERMINAL_WORDS: &[&str] = &["complete", "completed", "done", "finished", "success", "ok"];

/// True once any event in the history signals completion.
pub fn is_complete(events: &[RawEvent]) -> bool {
    events.iter().any(is_terminal_event)
}

/// True when the event's step, or its unwrapped `status` / `state.status`,
/// is a terminal word.
pub fn is_terminal_event(event: &RawEvent) -> bool {
    if event.step().is_some_and(is_terminal_word) {
        return true;
    }
    status_texts(effective_payload(&event.payload)).any(is_terminal_word)
}

fn is_terminal_word(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    TERMINAL_WORDS.contains(&lowered.as_str())
}
