//! Incremental decoder for `data: ...` event streams.
//!
//! Frames are separated by a blank line. Network chunks can split a frame
//! (or a multi-byte UTF-8 sequence) anywhere, so bytes are buffered until a
//! full frame is available.

use tracing::warn;

const FRAME_DELIMITER: &[u8] = b"\n\n";

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the end of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one network chunk and returns the `data` payload of every frame
    /// it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_delimiter(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + FRAME_DELIMITER.len()).collect();
            if let Some(payload) = parse_frame(&frame[..end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a final frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::mem::take(&mut self.buffer);
        if frame.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        parse_frame(&frame)
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

/// Joins the frame's `data:` lines. Comments and other fields are ignored.
fn parse_frame(frame: &[u8]) -> Option<String> {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Dropping event-stream frame with invalid UTF-8");
            return None;
        }
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();
    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_frames_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_holds_back_incomplete_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"ch").is_empty());
        assert!(decoder.push(b"unk\"}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: x"), vec![r#"{"type":"chunk"}"#]);
        assert_eq!(decoder.pending(), "data: x".len());
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let frame = "data: {\"content\":\"こんにちは\"}\n\n".as_bytes();
        let (a, b) = frame.split_at(20);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec![r#"{"content":"こんにちは"}"#]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata: hello\r\n\r\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: one\ndata:two\n\n"), vec!["one\ntwo"]);
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: last").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("last"));
        assert_eq!(decoder.finish(), None);

        decoder.push(b"\n");
        assert_eq!(decoder.finish(), None);
    }
}
