//! Incremental decoder for streamed generation responses.
//!
//! Responses arrive as server-sent events: lines of the form `data: <payload>`
//! where the payload is either a JSON object carrying a text fragment or the
//! `[DONE]` sentinel. Fragments are concatenated into one buffer which, once
//! the stream ends, must hold a JSON document (optionally wrapped in a
//! markdown code fence).

use std::time::Duration;

use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::AIError;
use crate::core::AiConfig;

/// Sentinel payload marking the end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// How much of unparseable output is kept in a [`AIError::Parse`].
pub const EXCERPT_LEN: usize = 500;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*)```").expect("code fence pattern is valid")
});

/// Limits applied while decoding a stream.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Output shorter than this (after trimming) counts as no content
    pub min_content_len: usize,

    /// Bound on the whole stream, first chunk to last
    pub timeout: Duration,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { min_content_len: 5, timeout: Duration::from_secs(120) }
    }
}

impl DecodeOptions {
    pub fn from_config(config: &AiConfig) -> Self {
        Self { min_content_len: config.min_content_len, timeout: config.timeout() }
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// Push-based decoder. Feed it chunks with [`push`](Self::push), then call
/// [`finish`](Self::finish).
pub struct StreamDecoder<'a> {
    text: String,
    carry: Vec<u8>,
    done: bool,
    min_content_len: usize,
    on_progress: Option<ProgressFn<'a>>,
}

impl std::fmt::Debug for StreamDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("text_len", &self.text.len())
            .field("carry_len", &self.carry.len())
            .field("done", &self.done)
            .finish()
    }
}

impl Default for StreamDecoder<'_> {
    fn default() -> Self {
        Self::new(DecodeOptions::default().min_content_len)
    }
}

impl<'a> StreamDecoder<'a> {
    pub fn new(min_content_len: usize) -> Self {
        Self {
            text: String::new(),
            carry: Vec::new(),
            done: false,
            min_content_len,
            on_progress: None,
        }
    }

    /// Called with the whole accumulated text after every fragment.
    pub fn on_progress(mut self, callback: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one chunk of the response body.
    ///
    /// A line split across chunks is carried over. A carried line that
    /// already forms a complete frame is processed at the chunk boundary
    /// instead of waiting for its newline.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), AIError> {
        if self.done {
            return Ok(());
        }
        self.carry.extend_from_slice(chunk);

        while let Some(end) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=end).collect();
            self.process_line(&String::from_utf8_lossy(&line))?;
            if self.done {
                self.carry.clear();
                return Ok(());
            }
        }

        if let Some(line) = self.complete_carried_frame() {
            self.carry.clear();
            self.process_line(&line)?;
        }
        Ok(())
    }

    /// End the stream and parse the accumulated text as JSON.
    pub fn finish(mut self) -> Result<Value, AIError> {
        if !self.done && !self.carry.is_empty() {
            let line = String::from_utf8_lossy(&self.carry).into_owned();
            self.carry.clear();
            self.process_line(&line)?;
        }

        if self.text.trim().chars().count() < self.min_content_len {
            return Err(AIError::NoContent);
        }
        extract_json(&self.text)
    }

    fn complete_carried_frame(&self) -> Option<String> {
        let line = std::str::from_utf8(&self.carry).ok()?;
        let payload = data_payload(line)?;
        let complete =
            payload == DONE_SENTINEL || serde_json::from_str::<Value>(payload).is_ok();
        complete.then(|| line.to_string())
    }

    fn process_line(&mut self, line: &str) -> Result<(), AIError> {
        let Some(payload) = data_payload(line) else {
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }
        if payload == DONE_SENTINEL {
            self.done = true;
            return Ok(());
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable stream payload");
                return Ok(());
            }
        };

        if let Some(message) = error_message(&value) {
            return Err(AIError::Stream(message));
        }

        if let Some(fragment) = text_fragment(&value) {
            self.text.push_str(fragment);
            if let Some(callback) = self.on_progress.as_mut() {
                callback(&self.text);
            }
        }
        Ok(())
    }
}

/// Payload of a `data:` line, or `None` for any other line.
fn data_payload(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n']).strip_prefix("data:").map(str::trim)
}

/// Text carried by one event.
///
/// Accepts `{"delta": "..."}`, `{"delta": {"text": "..."}}` and
/// `{"choices": [{"delta": {"content": "..."}}]}`.
fn text_fragment(value: &Value) -> Option<&str> {
    match value.get("delta") {
        Some(Value::String(text)) => return Some(text.as_str()),
        Some(delta) => {
            if let Some(text) = delta.get("text").and_then(Value::as_str) {
                return Some(text);
            }
        }
        None => {}
    }
    value.pointer("/choices/0/delta/content").and_then(Value::as_str)
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error").filter(|e| !e.is_null());
    let is_error_event = value.get("type").and_then(Value::as_str) == Some("error");
    if error.is_none() && !is_error_event {
        return None;
    }

    let message = error
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .map_or_else(|| value.to_string(), str::to_string);
    Some(message)
}

/// Parse model output as JSON, stripping a surrounding markdown code fence.
///
/// Output that already parses is returned as is, so fenced blocks inside
/// string values are never mistaken for the wrapper. The fence match runs
/// from the first opening fence to the last closing one.
pub fn extract_json(text: &str) -> Result<Value, AIError> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    let body = CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim();

    serde_json::from_str(body).map_err(|e| AIError::Parse {
        message: e.to_string(),
        excerpt: text.chars().take(EXCERPT_LEN).collect(),
    })
}

/// Drive a chunk stream through a decoder under an overall timeout.
pub async fn decode_stream<S, B>(
    mut stream: S,
    options: &DecodeOptions,
    on_progress: impl FnMut(&str) + Send,
) -> Result<Value, AIError>
where
    S: Stream<Item = Result<B, AIError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = StreamDecoder::new(options.min_content_len).on_progress(on_progress);

    let drive = async {
        while let Some(chunk) = stream.next().await {
            decoder.push(chunk?.as_ref())?;
            if decoder.is_done() {
                break;
            }
        }
        Ok::<_, AIError>(())
    };

    tokio::time::timeout(options.timeout, drive)
        .await
        .map_err(|_| AIError::Timeout(options.timeout))??;

    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn decode_all(chunks: &[&str]) -> Result<Value, AIError> {
        let mut decoder = StreamDecoder::default();
        for chunk in chunks {
            decoder.push(chunk.as_bytes())?;
        }
        decoder.finish()
    }

    #[test]
    fn test_delta_string_then_done() {
        let value =
            decode_all(&["data: {\"delta\":\"{\\\"a\\\":1}\"}\n", "data: [DONE]\n"]).unwrap();
        assert_eq!(value, serde_json::json!({ "a": 1 }));
    }

    #[test]
    fn test_line_split_across_chunks() {
        let value = decode_all(&[
            "data: {\"delta\":{\"te",
            "xt\":\"{\\\"ok\\\": true}\"}}\n",
            "data: [DONE]\n",
        ])
        .unwrap();
        assert_eq!(value, serde_json::json!({ "ok": true }));
    }

    #[test]
    fn test_complete_frame_without_newline_is_flushed() {
        let mut decoder = StreamDecoder::default();
        decoder.push(b"data: {\"delta\":\"{\\\"n\\\":\"}").unwrap();
        assert_eq!(decoder.text(), "{\"n\":");

        decoder.push(b"\ndata: {\"delta\":\"2}\"}").unwrap();
        assert_eq!(decoder.text(), "{\"n\":2}");
    }

    #[test]
    fn test_openai_style_fragments() {
        let value = decode_all(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"[1,\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" 2]\"}}]}\n",
        ])
        .unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_content_after_done_is_ignored() {
        let value = decode_all(&[
            "data: {\"delta\":\"{\\\"a\\\":1}\"}\ndata: [DONE]\ndata: {\"delta\":\"junk\"}\n",
        ])
        .unwrap();
        assert_eq!(value, serde_json::json!({ "a": 1 }));
    }

    #[test]
    fn test_invalid_payloads_and_other_lines_skipped() {
        let value = decode_all(&[
            "event: content_block_delta\n",
            ": keep-alive\n",
            "data: {not json\n",
            "data: {\"type\":\"message_start\"}\n",
            "data: {\"delta\":\"{\\\"a\\\":2}\"}\n",
        ])
        .unwrap();
        assert_eq!(value, serde_json::json!({ "a": 2 }));
    }

    #[test]
    fn test_error_event_is_fatal() {
        let err = decode_all(&[
            "data: {\"type\":\"error\",\"error\":{\"message\":\"overloaded\"}}\n",
        ])
        .unwrap_err();
        assert!(matches!(err, AIError::Stream(ref m) if m == "overloaded"));
    }

    #[test]
    fn test_short_output_is_no_content() {
        assert!(matches!(decode_all(&[]), Err(AIError::NoContent)));
        assert!(matches!(decode_all(&["data: {\"delta\":\"{}\"}\n"]), Err(AIError::NoContent)));
    }

    #[test]
    fn test_parse_error_keeps_excerpt() {
        let long = "x".repeat(800);
        let chunk = format!("data: {{\"delta\":\"{long}\"}}\n");
        match decode_all(&[&chunk]) {
            Err(AIError::Parse { excerpt, .. }) => assert_eq!(excerpt.len(), EXCERPT_LEN),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_json_strips_fence() {
        let text = "Here you go:\n```json\n{\"title\": \"PRD\"}\n```\n";
        assert_eq!(extract_json(text).unwrap(), serde_json::json!({ "title": "PRD" }));
        assert_eq!(extract_json("  {\"a\": 1} ").unwrap(), serde_json::json!({ "a": 1 }));
    }

    #[test]
    fn test_extract_json_keeps_inner_fences() {
        let bare = r#"{"title":"Tech","overview":"Run:\n```sql\nSELECT 1;\n```\nthen deploy"}"#;
        let expected = serde_json::json!({
            "title": "Tech",
            "overview": "Run:\n```sql\nSELECT 1;\n```\nthen deploy"
        });
        assert_eq!(extract_json(bare).unwrap(), expected);

        let wrapped = format!("```json\n{bare}\n```");
        assert_eq!(extract_json(&wrapped).unwrap(), expected);
    }

    #[test]
    fn test_progress_sees_whole_buffer_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut decoder = StreamDecoder::new(1)
            .on_progress(move |text| sink.lock().unwrap().push(text.to_string()));

        decoder.push(b"data: {\"delta\":\"[1\"}\ndata: {\"delta\":\"]\"}\n").unwrap();
        decoder.finish().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["[1".to_string(), "[1]".to_string()]);
    }

    #[tokio::test]
    async fn test_decode_stream_times_out() {
        let options = DecodeOptions { timeout: Duration::from_millis(20), ..Default::default() };
        let stream = futures::stream::pending::<Result<Vec<u8>, AIError>>();

        let err = decode_stream(stream, &options, |_| {}).await.unwrap_err();
        assert!(matches!(err, AIError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_decode_stream_stops_at_sentinel() {
        let chunks: Vec<Result<&[u8], AIError>> = vec![
            Ok(b"data: {\"delta\":\"{\\\"a\\\":1}\"}\n".as_slice()),
            Ok(b"data: [DONE]\n".as_slice()),
            Err(AIError::Stream("never read".into())),
        ];
        let value = decode_stream(futures::stream::iter(chunks), &DecodeOptions::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({ "a": 1 }));
    }
}
