//! Incremental parser for `text/event-stream` framing.
//!
//! Chunks come off the wire at arbitrary boundaries; this parser buffers
//! them and yields complete frames once their terminating blank line has
//! been seen. Field handling follows EventSource framing rules: `event:`
//! names the frame, successive `data:` lines are joined with newlines,
//! comment lines (leading `:`) and `id:`/`retry:` fields are skipped.

/// One complete wire frame: an event name plus its raw data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line) = self.take_line() {
            self.apply_line(&line, &mut frames);
        }
        frames
    }

    /// Pop one `\n`-terminated line off the buffer. Bytes after the last
    /// newline stay buffered, so a frame split mid-line (or mid-codepoint)
    /// is picked up by a later chunk.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn apply_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            self.flush_into(frames);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` have no use here; reconnection is not ours.
            _ => {}
        }
    }

    /// Blank line: dispatch the buffered frame, if any, and reset.
    fn flush_into(&mut self, frames: &mut Vec<SseFrame>) {
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        frames.push(SseFrame { event, data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn parses_a_single_frame() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: token\ndata: {\"x\":1}\n\n");
        assert_eq!(frames, vec![frame("token", "{\"x\":1}")]);
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: tok").is_empty());
        assert!(parser.feed(b"en\ndata: {}").is_empty());
        let frames = parser.feed(b"\n\n");
        assert_eq!(frames, vec![frame("token", "{}")]);
    }

    #[test]
    fn split_inside_multibyte_codepoint() {
        let mut parser = SseParser::new();
        let payload = "data: đoàn kết\n\n".as_bytes();
        // Cut inside the two-byte "đ".
        assert!(parser.feed(&payload[..7]).is_empty());
        let frames = parser.feed(&payload[7..]);
        assert_eq!(frames, vec![frame("message", "đoàn kết")]);
    }

    #[test]
    fn crlf_line_endings() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: done\r\ndata: {}\r\n\r\n");
        assert_eq!(frames, vec![frame("done", "{}")]);
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: first\ndata: second\n\n");
        assert_eq!(frames, vec![frame("message", "first\nsecond")]);
    }

    #[test]
    fn default_event_name_is_message() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: hello\n\n");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn comments_and_ids_are_skipped() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b": keep-alive\nid: 42\nretry: 1000\nevent: token\ndata: x\n\n");
        assert_eq!(frames, vec![frame("token", "x")]);
    }

    #[test]
    fn no_space_after_colon() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event:token\ndata:x\n\n");
        assert_eq!(frames, vec![frame("token", "x")]);
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"\n\nevent: token\n\n").is_empty());
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
        assert_eq!(frames, vec![frame("a", "1"), frame("b", "2")]);
    }

    #[test]
    fn event_name_does_not_leak_into_next_frame() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: token\ndata: 1\n\ndata: 2\n\n");
        assert_eq!(frames, vec![frame("token", "1"), frame("message", "2")]);
    }
}
