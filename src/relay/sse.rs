use serde::Deserialize;
use serde_json::Value;

pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of the provider's event stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderFrame {
    Content(String),
    Done,
    Failure(String),
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for `data:` lines of a chat-completion event stream.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences split across network chunks are reassembled. Lines that are not
/// valid UTF-8 or whose JSON cannot be parsed are dropped and counted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    dropped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames discarded as malformed so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Feed one network chunk and return every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProviderFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Vec<ProviderFrame> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<ProviderFrame> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(_) => {
                self.drop_frame("invalid UTF-8");
                return None;
            }
        };

        // Blank lines separate events, ':' starts a comment/keep-alive
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        // Only data lines carry payloads; event/id/retry fields are ignored
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        if data == DONE_SENTINEL {
            return Some(ProviderFrame::Done);
        }

        match serde_json::from_str::<ChunkPayload>(data) {
            Ok(payload) => {
                if let Some(error) = payload.error {
                    return Some(ProviderFrame::Failure(error_message(&error)));
                }
                // Role-only and finish_reason deltas carry no text
                payload
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta)
                    .and_then(|delta| delta.content)
                    .filter(|content| !content.is_empty())
                    .map(ProviderFrame::Content)
            }
            Err(e) => {
                self.drop_frame(&e.to_string());
                None
            }
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped += 1;
        tracing::debug!(dropped = self.dropped, "Dropping malformed provider frame: {}", reason);
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "Provider reported an error".to_string()),
        _ => "Provider reported an error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}, "index": 0}]})
        )
    }

    #[test]
    fn test_decodes_content_and_done() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n\n", content_line("Hello"), content_line(" world"));

        let frames = decoder.push(input.as_bytes());
        assert_eq!(
            frames,
            vec![
                ProviderFrame::Content("Hello".to_string()),
                ProviderFrame::Content(" world".to_string()),
                ProviderFrame::Done,
            ]
        );
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = content_line("split");
        let (a, b) = line.as_bytes().split_at(17);

        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec![ProviderFrame::Content("split".to_string())]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = content_line("héllo ✓");
        let bytes = line.as_bytes();
        // Cut inside the three-byte check mark
        let cut = line.find('✓').unwrap() + 1;

        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(
            decoder.push(&bytes[cut..]),
            vec![ProviderFrame::Content("héllo ✓".to_string())]
        );
    }

    #[test]
    fn test_crlf_comments_and_role_deltas() {
        let mut decoder = SseDecoder::new();
        let input = concat!(
            ": keep-alive\r\n",
            "\r\n",
            "event: message\r\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n",
            "\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n",
            "\r\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\r\n",
            "data:[DONE]\r\n",
        );

        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![ProviderFrame::Content("ok".to_string()), ProviderFrame::Done]
        );
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let mut decoder = SseDecoder::new();
        let mut input = Vec::new();
        input.extend_from_slice(b"data: {\"choices\": [\n");
        input.extend_from_slice(b"data: \xff\xfe\n");
        input.extend_from_slice(content_line("after").as_bytes());

        assert_eq!(
            decoder.push(&input),
            vec![ProviderFrame::Content("after".to_string())]
        );
        assert_eq!(decoder.dropped(), 2);
    }

    #[test]
    fn test_error_object_becomes_failure() {
        let mut decoder = SseDecoder::new();
        let input = "data: {\"error\":{\"message\":\"Rate limit reached\",\"type\":\"requests\"}}\n\n";

        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![ProviderFrame::Failure("Rate limit reached".to_string())]
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![ProviderFrame::Done]);
        assert!(decoder.finish().is_empty());
    }
}
