//! Server-Sent Events (SSE) utilities
//!
//! Incremental decoding of a `text/event-stream` body into frames. The
//! decoder accepts arbitrary byte chunks as they come off the wire, so a
//! frame (or a UTF-8 sequence) split across chunks is reassembled.

/// One dispatched SSE frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field (None means the default `message` type)
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`
    pub data: String,
    /// Last `id:` field seen in the frame
    pub id: Option<String>,
}

impl SseFrame {
    /// Event name, defaulting to `message`
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Streaming SSE decoder
///
/// # Example
/// ```
/// use fbk_common::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"event: UPDATE\nda").is_empty());
/// let frames = decoder.push(b"ta: {}\n\n");
/// assert_eq!(frames[0].event_name(), "UPDATE");
/// assert_eq!(frames[0].data, "{}");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.handle_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn handle_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment (heartbeats are sent this way)
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            self.id = None;
            return None;
        }

        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: UPDATE\ndata: {\"table\":\"feedback\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("UPDATE"));
        assert_eq!(frames[0].data, "{\"table\":\"feedback\"}");
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: INS").is_empty());
        assert!(decoder.push(b"ERT\r\ndata: a\r\n").is_empty());
        let frames = decoder.push(b"\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "INSERT");
        assert_eq!(frames[0].data, "a");
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: one\ndata: two\n\n");
        assert_eq!(frames[0].data, "one\ntwo");
        assert_eq!(frames[0].event_name(), "message");
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": heartbeat\n\n\n: keep-alive\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(
            b"event: ConnectionStatus\ndata: connected\n\nid: 7\nevent: UPDATE\ndata: x\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name(), "ConnectionStatus");
        assert_eq!(frames[1].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "caf\u{e9}");
    }
}
