//! Decoding of `text/event-stream` bodies into [`StreamEvent`]s.
//!
//! OpenAI-compatible endpoints stream one JSON chunk per `data:` field and
//! finish with `data: [DONE]`:
//!
//! ```text
//! data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"index":0,"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Network reads do not respect line or even UTF-8 boundaries, so
//! [`SseDecoder`] buffers raw bytes and only decodes complete lines.

use crate::error::{ApiError, Result};
use crate::wire::{CompletionChunk, StreamEvent};

const DONE: &str = "[DONE]";

/// Decode one SSE line.
///
/// Blank lines, comments (`:`) and fields other than `data` yield
/// `Ok(None)`.
///
/// # Errors
///
/// [`ApiError::MalformedResponse`] when a `data:` payload is neither
/// `[DONE]` nor a chunk object.
pub fn decode_line(line: &str) -> Result<Option<StreamEvent>> {
    let Some(payload) = line.trim_end().strip_prefix("data:") else {
        return Ok(None);
    };
    match payload.trim_start() {
        "" => Ok(None),
        DONE => Ok(Some(StreamEvent::Done)),
        json => serde_json::from_str::<CompletionChunk>(json)
            .map(|chunk| Some(StreamEvent::Chunk(chunk)))
            .map_err(|e| ApiError::MalformedResponse(format!("bad stream chunk: {e}"))),
    }
}

/// Incremental line splitter for an SSE body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the decode result of every line they
    /// completed, in order. Each line is decoded on its own, so one bad
    /// line does not hide the ones after it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent>> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(event) = decode_bytes(&line).transpose() {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the body has ended. Servers may omit
    /// the final newline.
    pub fn finish(mut self) -> Option<Result<StreamEvent>> {
        let rest = std::mem::take(&mut self.pending);
        decode_bytes(&rest).transpose()
    }
}

fn decode_bytes(line: &[u8]) -> Result<Option<StreamEvent>> {
    let line = std::str::from_utf8(line)
        .map_err(|e| ApiError::MalformedResponse(format!("stream is not UTF-8: {e}")))?;
    decode_line(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(event: &StreamEvent) -> Option<&str> {
        match event {
            StreamEvent::Chunk(chunk) => chunk.choices.first()?.delta.content.as_deref(),
            StreamEvent::Done => None,
        }
    }

    #[test]
    fn ignores_non_data_lines() {
        for line in ["", "   ", ": keep-alive", "event: message", "id: 7", "retry: 1000", "data:", "data: "] {
            assert!(decode_line(line).unwrap().is_none(), "{line:?}");
        }
    }

    #[test]
    fn done_with_and_without_space() {
        assert_eq!(decode_line("data: [DONE]").unwrap(), Some(StreamEvent::Done));
        assert_eq!(decode_line("data:[DONE]\r\n").unwrap(), Some(StreamEvent::Done));
    }

    #[test]
    fn decodes_chunk_fields() {
        let event = decode_line(
            r#"data: {"id":"chatcmpl-1","model":"gpt-3.5-turbo","choices":[{"index":1,"delta":{},"finish_reason":"length"}]}"#,
        )
        .unwrap()
        .unwrap();
        let StreamEvent::Chunk(chunk) = event else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.model, "gpt-3.5-turbo");
        assert_eq!(chunk.choices[0].index, 1);
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("length"));
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn usage_only_chunk() {
        let event = decode_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )
        .unwrap()
        .unwrap();
        let StreamEvent::Chunk(chunk) = event else {
            panic!("expected a chunk");
        };
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(5));
    }

    #[test]
    fn bad_payload_is_malformed() {
        let err = decode_line("data: {not json}").unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[test]
    fn decoder_joins_lines_split_across_reads() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"choices\":[{\"delta\":").is_empty());
        let events = decoder.feed(b"{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(content(events[0].as_ref().unwrap()), Some("Hi"));
        assert_eq!(*events[1].as_ref().unwrap(), StreamEvent::Done);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_keeps_multibyte_characters_intact() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        let events = decoder.feed(&line[split..]);
        assert_eq!(content(events[0].as_ref().unwrap()), Some("héllo"));
    }

    #[test]
    fn decoder_reports_bad_lines_individually() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            b"data: {broken\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(events.len(), 2);
        assert!(events[0].is_err());
        assert_eq!(content(events[1].as_ref().unwrap()), Some("ok"));
    }

    #[test]
    fn finish_decodes_unterminated_last_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().unwrap().unwrap(), StreamEvent::Done);
    }
}
