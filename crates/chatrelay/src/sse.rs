//! Incremental decoding of `text/event-stream` bodies.
//!
//! Only `data:` lines carry frames. Everything else (blank separators, `event:` and
//! `id:` fields, `:` comments) is dropped. Bytes are buffered until a full line is
//! available, so frames and multi-byte characters may be split across reads.

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// The frame that closes a stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The trimmed payload of a `data:` line
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and collect every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(frame) = parse_line(&line[..newline]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was never terminated by a newline
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<Frame> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload.is_empty() {
        None
    } else if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_string()))
    }
}

/// Encode a payload as a single event-stream frame
pub fn data_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}
