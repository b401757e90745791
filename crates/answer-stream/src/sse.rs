//! Server-Sent Events transport.
//!
//! Issues a streaming HTTP request and turns the response body into a lazy
//! sequence of [`SseFrame`]s. Frames are reassembled from arbitrary network
//! chunking and yielded strictly in arrival order.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt as _, stream};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::StreamError;

/// One complete SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, when present.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Lazy sequence of frames read from one response body.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send + 'static>>;

/// Incremental frame decoder.
///
/// Buffers raw bytes so multi-byte characters and frame delimiters may be
/// split across chunks without affecting the decoded frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    // Bytes of `buf` already searched for a blank line.
    scanned: usize,
    // Start of the line containing `buf[scanned]`.
    line_start: usize,
}

impl SseDecoder {
    /// Appends a chunk and returns every frame it completed.
    ///
    /// Fails if a completed event is not valid UTF-8.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, StreamError> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((frame_end, consumed)) = self.next_boundary() {
            let frame_bytes: Vec<u8> = self.buf.drain(..consumed).take(frame_end).collect();
            let text = String::from_utf8(frame_bytes)
                .map_err(|e| StreamError::read(format!("invalid UTF-8 in event stream: {e}")))?;
            if let Some(frame) = parse_sse_frame(&text) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Returns `true` if an unterminated event is buffered.
    pub fn has_pending(&self) -> bool {
        self.buf.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Finds the first blank line. Returns the length of the event text
    /// before it and the number of bytes to consume including the blank line.
    ///
    /// Lines end in `\n` or `\r\n`. Resumes where the previous call stopped,
    /// so each byte is searched once.
    fn next_boundary(&mut self) -> Option<(usize, usize)> {
        while self.scanned < self.buf.len() {
            let i = self.scanned;
            self.scanned += 1;
            if self.buf[i] != b'\n' {
                continue;
            }
            let line_end = if i > self.line_start && self.buf[i - 1] == b'\r' {
                i - 1
            } else {
                i
            };
            if line_end == self.line_start {
                let boundary = (self.line_start, i + 1);
                self.scanned = 0;
                self.line_start = 0;
                return Some(boundary);
            }
            self.line_start = i + 1;
        }
        None
    }
}

fn parse_sse_frame(text: &str) -> Option<SseFrame> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(strip_field_space(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(strip_field_space(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

fn strip_field_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

/// A streaming HTTP request. Immutable once issued.
#[derive(Clone, Debug)]
pub struct SseRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl SseRequest {
    /// Creates a `POST` request with the given body and no headers.
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::POST,
            url: url.into(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn header_map(&self) -> Result<HeaderMap, StreamError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::setup(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::setup(format!("invalid value for header {name}: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

const UNREADABLE_BODY: &str = "<unreadable body>";

/// Opens SSE streams over a shared HTTP client.
#[derive(Clone, Debug)]
pub struct SseTransport {
    client: reqwest::Client,
    idle_timeout: Option<Duration>,
}

impl SseTransport {
    /// Creates a transport without an idle timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            idle_timeout: None,
        }
    }

    /// Fails the call if the server goes quiet for `timeout`, whether it is
    /// holding back the response headers or the body.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Issues `request` and returns its frame stream once headers arrived.
    ///
    /// A token that is already cancelled fails with `StreamError::Cancelled`
    /// before any network I/O.
    pub async fn open(
        &self,
        request: SseRequest,
        cancel: CancellationToken,
    ) -> Result<FrameStream, StreamError> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if request.url.trim().is_empty() {
            return Err(StreamError::setup("request url must not be empty"));
        }
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| StreamError::setup(format!("invalid request url {:?}: {e}", request.url)))?;
        let headers = request.header_map()?;

        debug!(method = %request.method, url = %url, "opening event stream");
        let send = self
            .client
            .request(request.method, url)
            .headers(headers)
            .body(request.body)
            .send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::Cancelled),
            sent = within(self.idle_timeout, send) => match sent {
                Ok(sent) => sent.map_err(|e| StreamError::read(format!("request failed: {e}")))?,
                Err(elapsed) => {
                    return Err(StreamError::read(format!("no response received: {elapsed}")));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(StreamError::Cancelled),
                body = within(self.idle_timeout, response.text()) => match body {
                    Ok(Ok(body)) => body,
                    Ok(Err(e)) => {
                        debug!(status = status.as_u16(), error = %e, "failed reading error body");
                        UNREADABLE_BODY.to_string()
                    }
                    Err(_) => {
                        debug!(status = status.as_u16(), "error body stalled");
                        UNREADABLE_BODY.to_string()
                    }
                },
            };
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(frame_stream(
            response.bytes_stream(),
            cancel,
            self.idle_timeout,
        ))
    }
}

/// Decodes a byte stream into frames, observing `cancel` between reads.
pub fn frame_stream<S, E>(
    bytes: S,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
) -> FrameStream
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        bytes: Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<SseFrame>,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
        finished: bool,
    }

    let state = State {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        cancel,
        idle_timeout,
        finished: false,
    };

    let frames = stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if state.cancel.is_cancelled() {
                state.finished = true;
                state.pending.clear();
                return Some((Err(StreamError::Cancelled), state));
            }
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }

            let read = within(state.idle_timeout, state.bytes.next());
            let next = tokio::select! {
                biased;
                () = state.cancel.cancelled() => continue,
                next = read => next,
            };

            match next {
                Ok(Some(Ok(chunk))) => match state.decoder.push_chunk(&chunk) {
                    Ok(frames) => state.pending.extend(frames),
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                },
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    return Some((
                        Err(StreamError::read(format!("failed reading response body: {e}"))),
                        state,
                    ));
                }
                Ok(None) => {
                    if state.decoder.has_pending() {
                        debug!("discarding unterminated frame at end of stream");
                    }
                    state.finished = true;
                    return None;
                }
                Err(elapsed) => {
                    state.finished = true;
                    return Some((
                        Err(StreamError::read(format!("no data received: {elapsed}"))),
                        state,
                    ));
                }
            }
        }
    });
    Box::pin(frames.fuse())
}

async fn within<F>(
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, tokio::time::error::Elapsed>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt as _;

    const WIRE: &str = concat!(
        "data: {\"id\":\"m1\",\"choices\":[{\"delta\":{\"content\":\"h\u{e9}\"}}]}\n\n",
        ": keep-alive\n\n",
        "event: message\r\ndata: second\r\n\r\n",
        "data: line1\ndata: line2\n\n",
        "data: [DONE]\n\n",
    );

    fn payloads(frames: &[SseFrame]) -> Vec<&str> {
        frames.iter().map(|f| f.data.as_str()).collect()
    }

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let owned: Vec<Result<Bytes, String>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    #[test]
    fn decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let frames1 = decoder
            .push_chunk(b"data: {\"choices\":[{\"delta\":{\"content\":\"hel")
            .expect("decode");
        assert!(frames1.is_empty());
        assert!(decoder.has_pending());
        let frames2 = decoder.push_chunk(b"lo\"}}]}\n\n").expect("decode");
        assert_eq!(frames2.len(), 1);
        assert!(frames2[0].data.ends_with("\"hello\"}}]}"));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn decoder_parses_comments_event_names_and_multiline_data() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(WIRE.as_bytes()).expect("decode");
        assert_eq!(
            payloads(&frames),
            vec![
                "{\"id\":\"m1\",\"choices\":[{\"delta\":{\"content\":\"h\u{e9}\"}}]}",
                "second",
                "line1\nline2",
                "[DONE]",
            ]
        );
        assert_eq!(frames[1].event.as_deref(), Some("message"));
    }

    #[test]
    fn frame_extraction_is_independent_of_chunk_boundaries() {
        let bytes = WIRE.as_bytes();
        let expected = SseDecoder::default().push_chunk(bytes).expect("decode");

        for split in 0..=bytes.len() {
            let mut decoder = SseDecoder::default();
            let mut frames = decoder.push_chunk(&bytes[..split]).expect("head");
            frames.extend(decoder.push_chunk(&bytes[split..]).expect("tail"));
            assert_eq!(frames, expected, "split at byte {split}");
        }

        let mut decoder = SseDecoder::default();
        let mut frames = Vec::new();
        for byte in bytes {
            frames.extend(decoder.push_chunk(std::slice::from_ref(byte)).expect("byte"));
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn large_frame_in_small_chunks_decodes_once() {
        let payload = "x".repeat(64 * 1024);
        let wire = format!("data: {payload}\r\n\r\ndata: next\n\n");
        let mut decoder = SseDecoder::default();
        let mut frames = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            frames.extend(decoder.push_chunk(chunk).expect("chunk"));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data.len(), payload.len());
        assert_eq!(frames[1].data, "next");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn invalid_utf8_is_a_read_error() {
        let mut decoder = SseDecoder::default();
        let err = decoder.push_chunk(b"data: \xff\xfe\n\n").expect_err("bad utf8");
        assert!(matches!(err, StreamError::StreamRead(msg) if msg.contains("UTF-8")));
    }

    #[test]
    fn empty_data_field_yields_empty_payload() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b"data:\n\n").expect("decode");
        assert_eq!(payloads(&frames), vec![""]);
    }

    #[tokio::test]
    async fn frame_stream_discards_dangling_partial_frame() {
        let frames: Vec<_> = frame_stream(
            chunks(&[b"data: one\n\nda", b"ta: tw"]),
            CancellationToken::new(),
            None,
        )
        .collect()
        .await;
        assert_eq!(
            frames,
            vec![Ok(SseFrame {
                event: None,
                data: "one".into()
            })]
        );
    }

    #[tokio::test]
    async fn frame_stream_surfaces_body_errors_once() {
        let parts: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("connection reset".into()),
            Ok(Bytes::from_static(b"data: b\n\n")),
        ];
        let frames: Vec<_> = frame_stream(stream::iter(parts), CancellationToken::new(), None)
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(
            matches!(&frames[1], Err(StreamError::StreamRead(msg)) if msg.contains("connection reset"))
        );
    }

    #[tokio::test]
    async fn cancellation_mid_stream_stops_reading() {
        let cancel = CancellationToken::new();
        let body = chunks(&[b"data: first\n\ndata: second\n\n"]).chain(stream::pending());
        let mut frames = frame_stream(body, cancel.clone(), None);

        let first = frames.next().await.expect("first").expect("frame");
        assert_eq!(first.data, "first");
        cancel.cancel();
        assert_eq!(frames.next().await, Some(Err(StreamError::Cancelled)));
        assert_eq!(frames.next().await, None);
        assert_eq!(frames.next().await, None);
    }

    #[tokio::test]
    async fn frame_stream_can_be_polled_after_it_ended() {
        let mut frames = frame_stream(
            chunks(&[b"data: only\n\n"]),
            CancellationToken::new(),
            None,
        );
        assert!(matches!(frames.next().await, Some(Ok(_))));
        assert_eq!(frames.next().await, None);
        assert_eq!(frames.next().await, None);
    }

    #[tokio::test]
    async fn cancellation_while_waiting_for_bytes_wakes_the_reader() {
        let cancel = CancellationToken::new();
        let mut frames = frame_stream(
            stream::pending::<Result<Bytes, String>>(),
            cancel.clone(),
            None,
        );
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert_eq!(frames.next().await, Some(Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn idle_timeout_fails_a_stalled_stream() {
        let body = chunks(&[b"data: first\n\n"]).chain(stream::pending());
        let frames: Vec<_> = frame_stream(
            body,
            CancellationToken::new(),
            Some(Duration::from_millis(30)),
        )
        .collect()
        .await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[1], Err(StreamError::StreamRead(msg)) if msg.contains("no data")));
    }

    #[test]
    fn invalid_header_name_is_a_setup_error() {
        let request = SseRequest::post("http://localhost/x", "{}").header("bad header", "v");
        assert!(matches!(
            request.header_map(),
            Err(StreamError::RequestSetup(msg)) if msg.contains("invalid header name")
        ));
    }

    #[tokio::test]
    async fn pre_cancelled_token_fails_before_any_io() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = SseTransport::new(reqwest::Client::new());
        let result = transport
            .open(SseRequest::post("http://127.0.0.1:9/never", "{}"), cancel)
            .await;
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    /// Serves `head` to the first connection, then keeps it open without
    /// sending anything else.
    async fn stalling_server(head: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(head).await.expect("write");
            std::future::pending::<()>().await;
        });
        format!("http://{addr}/v1/stream")
    }

    const STALLED_ERROR_BODY: &[u8] =
        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial";

    #[tokio::test]
    async fn cancellation_while_reading_an_error_body_returns_promptly() {
        let url = stalling_server(STALLED_ERROR_BODY).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let transport = SseTransport::new(reqwest::Client::new());
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            transport.open(SseRequest::post(url, "{}"), cancel),
        )
        .await
        .expect("open returned");
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn stalled_error_body_is_reported_as_unreadable() {
        let url = stalling_server(STALLED_ERROR_BODY).await;
        let transport = SseTransport::new(reqwest::Client::new())
            .idle_timeout(Some(Duration::from_millis(100)));
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            transport.open(SseRequest::post(url, "{}"), CancellationToken::new()),
        )
        .await
        .expect("open returned");
        assert!(matches!(
            result,
            Err(StreamError::Http { status: 500, body }) if body == UNREADABLE_BODY
        ));
    }

    #[tokio::test]
    async fn idle_timeout_covers_the_wait_for_headers() {
        let url = stalling_server(b"").await;
        let transport = SseTransport::new(reqwest::Client::new())
            .idle_timeout(Some(Duration::from_millis(100)));
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            transport.open(SseRequest::post(url, "{}"), CancellationToken::new()),
        )
        .await
        .expect("open returned");
        assert!(matches!(
            result,
            Err(StreamError::StreamRead(msg)) if msg.contains("no response received")
        ));
    }

    #[tokio::test]
    async fn malformed_url_is_a_setup_error() {
        let transport = SseTransport::new(reqwest::Client::new());
        let result = transport
            .open(SseRequest::post("not a url", "{}"), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StreamError::RequestSetup(_))));
    }
}
