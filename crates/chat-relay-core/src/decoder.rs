//! Line-framed stream decoder shared by the relay server and its clients.
//!
//! Network reads split records at arbitrary byte offsets. [`FrameDecoder`]
//! keeps the unterminated tail of the last read and only ever decodes
//! complete `\n`-terminated lines, so the frames produced for a byte
//! sequence do not depend on where the reads were split. A tail still
//! pending when the stream ends is discarded, never decoded.
//!
//! Decoding never fails: malformed lines are skipped, and in
//! [`FramingMode::Ndjson`] a line that is not valid JSON gets one more
//! best-effort pass that extracts a `"response":"…"` substring.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::{Context, Poll};

use futures::Stream;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::frame::{FramingMode, StreamFrame};

/// Prefix of an SSE data line; any other line is ignored in SSE mode.
pub const SSE_DATA_PREFIX: &str = "data: ";

static RESPONSE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""response":"([^"]*)""#).expect("static regex is valid"));

/// Decode one complete line (without its `\n`) into at most one frame.
pub fn decode_line(mode: FramingMode, line: &str) -> Option<StreamFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    match mode {
        FramingMode::Ndjson => decode_ndjson_line(line),
        FramingMode::Sse => decode_sse_line(line),
    }
}

fn decode_ndjson_line(line: &str) -> Option<StreamFrame> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => value
            .get("response")
            .and_then(Value::as_str)
            .filter(|delta| !delta.is_empty())
            .map(StreamFrame::chunk),
        Err(e) => {
            let delta = RESPONSE_FIELD
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
                .filter(|delta| !delta.is_empty());
            trace!(error = %e, recovered = delta.is_some(), "malformed ndjson line");
            delta.map(StreamFrame::chunk)
        }
    }
}

fn decode_sse_line(line: &str) -> Option<StreamFrame> {
    let payload = line.strip_prefix(SSE_DATA_PREFIX)?;
    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            debug!(error = %e, "skipping undecodable sse data line");
            None
        }
    }
}

/// Longest line the decoder will hold while waiting for its `\n`.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental decoder holding the per-stream raw buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FramingMode,
    buffer: Vec<u8>,
    max_line: usize,
    /// Set while the rest of an over-long line is being skipped.
    overflowed: bool,
}

impl FrameDecoder {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            max_line: MAX_LINE_BYTES,
            overflowed: false,
        }
    }

    /// Append `chunk` and decode every line it completes.
    ///
    /// Lines are split at byte level, so a multi-byte character split across
    /// two reads is reassembled before the line is decoded. A line longer
    /// than [`MAX_LINE_BYTES`] is dropped whole.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        // The retained tail never contains a newline.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0usize;
        while let Some(offset) = memchr::memchr(b'\n', &self.buffer[search_from..]) {
            let end = search_from + offset;
            if self.overflowed {
                self.overflowed = false;
            } else {
                let line = String::from_utf8_lossy(&self.buffer[start..end]);
                if let Some(frame) = decode_line(self.mode, &line) {
                    frames.push(frame);
                }
            }
            start = end + 1;
            search_from = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        if self.buffer.len() > self.max_line {
            warn!(mode = %self.mode, bytes = self.buffer.len(), "line exceeds maximum length; skipping it");
            self.buffer.clear();
            self.overflowed = true;
        }
        frames
    }

    /// The unterminated tail retained from previous reads.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// End of stream: drop the unterminated tail. Returns its length.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            debug!(mode = %self.mode, bytes = discarded, "discarding unterminated tail at end of stream");
        }
        self.buffer.clear();
        self.overflowed = false;
        discarded
    }
}

/// Adapts a byte stream into a lazy stream of decoded frames.
///
/// A transport error is yielded once and ends the stream.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    ready: VecDeque<StreamFrame>,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S, mode: FramingMode) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(mode),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<StreamFrame, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(frame) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let frames = this.decoder.feed(bytes.as_ref());
                    this.ready.extend(frames);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    this.decoder.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{ChatExchange, Message};
    use futures::{StreamExt, stream};
    use proptest::prelude::*;
    use std::convert::Infallible;
    use tracing_test::traced_test;

    fn decode_all(mode: FramingMode, input: &[u8]) -> Vec<StreamFrame> {
        let mut decoder = FrameDecoder::new(mode);
        let mut frames = decoder.feed(input);
        frames.extend(decoder.feed(&[]));
        frames
    }

    fn decode_split(mode: FramingMode, input: &[u8], cuts: &[usize]) -> Vec<StreamFrame> {
        let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (input.len() + 1)).collect();
        cuts.sort_unstable();
        let mut decoder = FrameDecoder::new(mode);
        let mut frames = Vec::new();
        let mut prev = 0;
        for cut in cuts {
            frames.extend(decoder.feed(&input[prev..cut]));
            prev = cut;
        }
        frames.extend(decoder.feed(&input[prev..]));
        frames
    }

    fn contents(frames: &[StreamFrame]) -> Vec<&str> {
        frames
            .iter()
            .filter_map(|f| match f {
                StreamFrame::Chunk { content } => Some(content.as_str()),
                StreamFrame::Complete(_) => None,
            })
            .collect()
    }

    #[test]
    fn ndjson_deltas_in_order() {
        let frames = decode_all(
            FramingMode::Ndjson,
            b"{\"response\":\"He\"}\n{\"response\":\"llo\"}\n",
        );
        assert_eq!(contents(&frames), vec!["He", "llo"]);
    }

    #[test]
    fn ndjson_skips_empty_and_missing_response() {
        let frames = decode_all(
            FramingMode::Ndjson,
            b"{\"response\":\"\"}\n{\"done\":true}\n\n   \n{\"response\":\"x\",\"done\":false}\n",
        );
        assert_eq!(contents(&frames), vec!["x"]);
    }

    #[test]
    fn ndjson_malformed_line_falls_back_to_regex() {
        let frames = decode_all(
            FramingMode::Ndjson,
            b"{\"model\":\"tinyllama\",\"response\":\"ok\",\"done\":\n",
        );
        assert_eq!(contents(&frames), vec!["ok"]);
    }

    #[test]
    fn ndjson_garbage_never_panics() {
        let frames = decode_all(FramingMode::Ndjson, b"not json\n\"response\":\n{]\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn sse_chunk_then_complete() {
        let user = Message::user("U");
        let ai = Message::assistant("A", Some(3), None);
        let complete = serde_json::json!({
            "type": "complete",
            "userMessage": user,
            "aiMessage": ai,
        });
        let input = format!(
            "data: {{\"type\":\"chunk\",\"content\":\"Hi\"}}\n\ndata: {complete}\n\n"
        );
        let frames = decode_all(FramingMode::Sse, input.as_bytes());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::chunk("Hi"));
        assert_eq!(
            frames[1],
            StreamFrame::Complete(ChatExchange {
                user_message: user,
                ai_message: ai,
            })
        );
    }

    #[test]
    fn sse_ignores_other_lines_and_bad_payloads() {
        let input = b": keep-alive\nevent: message\ndata: {oops\ndata: {\"type\":\"other\"}\ndata:{\"type\":\"chunk\",\"content\":\"no space\"}\ndata: {\"type\":\"chunk\",\"content\":\"ok\"}\n";
        let frames = decode_all(FramingMode::Sse, input);
        assert_eq!(contents(&frames), vec!["ok"]);
    }

    #[test]
    fn crlf_lines_decode_like_lf() {
        let frames = decode_all(
            FramingMode::Sse,
            b"data: {\"type\":\"chunk\",\"content\":\"a\"}\r\n\r\n",
        );
        assert_eq!(contents(&frames), vec!["a"]);
    }

    #[test]
    #[traced_test]
    fn unterminated_tail_is_held_then_discarded() {
        let mut decoder = FrameDecoder::new(FramingMode::Ndjson);
        let frames = decoder.feed(b"{\"response\":\"a\"}\n{\"response\":\"b\"}");
        assert_eq!(contents(&frames), vec!["a"]);
        assert_eq!(decoder.pending(), b"{\"response\":\"b\"}");
        assert_eq!(decoder.finish(), 16);
        assert!(decoder.pending().is_empty());
        assert!(logs_contain("discarding unterminated tail"));
    }

    #[test]
    #[traced_test]
    fn over_long_line_is_skipped_whole() {
        let mut decoder = FrameDecoder::new(FramingMode::Ndjson);
        decoder.max_line = 16;
        assert!(decoder.feed(b"{\"response\":\"aaaaaaaa").is_empty());
        assert!(decoder.pending().is_empty());
        assert!(logs_contain("line exceeds maximum length"));

        // The rest of the long line is dropped; the next line decodes.
        let frames = decoder.feed(b"aaaa\"}\n{\"response\":\"b\"}\n");
        assert_eq!(contents(&frames), vec!["b"]);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn long_line_fed_byte_by_byte() {
        let line = format!("{}\n", serde_json::json!({ "response": "x".repeat(4096) }));
        let mut decoder = FrameDecoder::new(FramingMode::Ndjson);
        let mut frames = Vec::new();
        for byte in line.as_bytes() {
            frames.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![StreamFrame::chunk("x".repeat(4096))]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let input = "{\"response\":\"héllo ✓\"}\n".as_bytes();
        // Cut inside the three-byte check mark.
        let cut = input.len() - 4;
        let mut decoder = FrameDecoder::new(FramingMode::Ndjson);
        assert!(decoder.feed(&input[..cut]).is_empty());
        let frames = decoder.feed(&input[cut..]);
        assert_eq!(contents(&frames), vec!["héllo ✓"]);
    }

    #[tokio::test]
    async fn frame_stream_yields_frames_lazily_and_drops_tail() {
        let reads: Vec<Result<&'static [u8], Infallible>> = vec![
            Ok(b"{\"resp"),
            Ok(b"onse\":\"one\"}\n{\"response\":"),
            Ok(b"\"two\"}\n{\"response\":\"tail\"}"),
        ];
        let frames: Vec<StreamFrame> = FrameStream::new(stream::iter(reads), FramingMode::Ndjson)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(contents(&frames), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn frame_stream_yields_error_once_then_ends() {
        let reads: Vec<Result<&'static [u8], &'static str>> = vec![
            Ok(b"{\"response\":\"a\"}\n"),
            Err("connection reset"),
            Ok(b"{\"response\":\"b\"}\n"),
        ];
        let mut frames = FrameStream::new(stream::iter(reads), FramingMode::Ndjson);
        assert_eq!(frames.next().await, Some(Ok(StreamFrame::chunk("a"))));
        assert_eq!(frames.next().await, Some(Err("connection reset")));
        assert_eq!(frames.next().await, None);
    }

    fn ndjson_body() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                "[ -~]{0,12}".prop_map(|s| serde_json::json!({ "response": s }).to_string()),
                Just("{\"done\":true}".to_owned()),
                Just(String::new()),
                "[a-z ]{0,8}".prop_map(|s| format!("{{\"response\":\"{s}\"")),
            ],
            0..12,
        )
        .prop_map(|lines| lines.join("\n"))
    }

    fn sse_body() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                "[ -~]{0,12}".prop_map(|s| {
                    format!("data: {}\n", serde_json::to_string(&StreamFrame::chunk(s)).unwrap())
                }),
                Just(": ping\n".to_owned()),
                Just("data: {broken\n".to_owned()),
            ],
            0..12,
        )
        .prop_map(|events| events.join("\n"))
    }

    proptest! {
        #[test]
        fn ndjson_decoding_is_split_invariant(
            body in ndjson_body(),
            cuts in prop::collection::vec(any::<usize>(), 0..8),
        ) {
            let whole = decode_all(FramingMode::Ndjson, body.as_bytes());
            let split = decode_split(FramingMode::Ndjson, body.as_bytes(), &cuts);
            prop_assert_eq!(whole, split);
        }

        #[test]
        fn sse_decoding_is_split_invariant(
            body in sse_body(),
            cuts in prop::collection::vec(any::<usize>(), 0..8),
        ) {
            let whole = decode_all(FramingMode::Sse, body.as_bytes());
            let split = decode_split(FramingMode::Sse, body.as_bytes(), &cuts);
            prop_assert_eq!(whole, split);
        }

        #[test]
        fn unterminated_final_line_is_never_emitted(text in "[a-z]{1,10}") {
            let body = format!("{{\"response\":\"{text}\"}}");
            prop_assert!(decode_all(FramingMode::Ndjson, body.as_bytes()).is_empty());
        }
    }
}
