use crate::util::audit_preview;

use super::types::TraceEvent;

/// Longest event line accepted before the rest of it is discarded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental JSONL decoder for a session's event stream.
///
/// Bytes arrive in arbitrary chunks; complete lines are decoded as they
/// appear and a trailing unterminated line is decoded by [`finish`]. A line
/// longer than the configured cap is counted as malformed and skipped up to
/// its newline, so a peer that never sends one cannot grow the buffer.
///
/// [`finish`]: EventStreamDecoder::finish
#[derive(Debug)]
pub struct EventStreamDecoder {
    line_buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
    malformed: u64,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            line_buf: Vec::new(),
            max_line,
            discarding: false,
            malformed: 0,
        }
    }

    /// Lines that failed to decode so far, oversized ones included.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<TraceEvent> {
        let mut out = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos + 1);
            rest = tail;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.line_buf.extend_from_slice(head);
            let mut one = std::mem::take(&mut self.line_buf);
            trim_newline(&mut one);
            if one.len() > self.max_line {
                self.reject_oversized(one.len());
                continue;
            }
            if let Some(ev) = self.decode_line(&one) {
                out.push(ev);
            }
        }

        if !rest.is_empty() && !self.discarding {
            self.line_buf.extend_from_slice(rest);
            if self.line_buf.len() > self.max_line {
                self.reject_oversized(self.line_buf.len());
                self.line_buf = Vec::new();
                self.discarding = true;
            }
        }
        out
    }

    /// EOF flush: decode the last partial line if it doesn't end with '\n'.
    pub fn finish(&mut self) -> Option<TraceEvent> {
        self.discarding = false;
        if self.line_buf.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.line_buf);
        trim_newline(&mut rest);
        self.decode_line(&rest)
    }

    fn reject_oversized(&mut self, len: usize) {
        self.malformed += 1;
        tracing::warn!(len, max = self.max_line, "dropping oversized event line");
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<TraceEvent> {
        let line = String::from_utf8_lossy(raw);
        let s = line.trim();
        if s.is_empty() {
            return None;
        }
        match serde_json::from_str::<TraceEvent>(s) {
            Ok(ev) => Some(ev),
            Err(e) => {
                self.malformed += 1;
                tracing::warn!(
                    error = %e,
                    preview = %audit_preview(s, 160),
                    "skipping malformed event line"
                );
                None
            }
        }
    }
}

/// Encodes one event as a wire line, newline included.
pub fn encode_event_line(ev: &TraceEvent) -> String {
    let mut line = serde_json::to_string(ev).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    line
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
