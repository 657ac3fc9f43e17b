use tracing::debug;

use crate::event::RawEvent;

/// Incremental decoder for the `data:` framed pipeline stream.
///
/// Bytes are buffered until a blank-line separator arrives, so frames may be
/// split at any byte offset (including inside a multi-byte character or the
/// separator itself). After every `push_chunk` the buffer holds at most one
/// incomplete trailing frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Appends a chunk and returns every event completed by it, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(event) = parse_frame(&frame_bytes) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes of the incomplete trailing frame, if any.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drops the incomplete trailing frame without parsing it.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_frame(bytes: &[u8]) -> Option<RawEvent> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(rest) = trimmed.strip_prefix("data:") else {
        debug!(len = trimmed.len(), "ignoring non-data frame");
        return None;
    };
    let value: serde_json::Value = match serde_json::from_str(rest.trim_start()) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "dropping malformed data frame");
            return None;
        }
    };
    let event = RawEvent::from_value(value);
    if event.is_none() {
        debug!("dropping data frame that is not a JSON object");
    }
    event
}
