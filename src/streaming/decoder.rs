//! Incremental event-stream decoder.
//!
//! Pulls bytes from a response body only when the caller asks for the next
//! chunk. Events that decompose into several chunks are queued and drained in
//! field order before more bytes are read. The stream always ends with exactly
//! one terminal chunk (`done = true`) carrying the latest usage and the last
//! finish reason, whether the provider sent an end sentinel or simply closed
//! the connection.

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::pin::Pin;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use super::ChunkStream;
use super::dialect::{DecodeContext, Dialect, DialectDecoder, Framing, StreamMeta};
use crate::defaults::streaming::{DONE_SENTINEL, SSE_DATA_PREFIX};
use crate::error::LlmError;
use crate::transport::{ByteStream, HttpTransportResponse};
use crate::types::{Chunk, FinishReason, Usage};
use crate::utils::cancel::CancelHandle;

/// Per-request decoder options.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Extract reasoning deltas. When `false`, reasoning fields are ignored.
    pub reasoning: bool,
    /// Label used in logs and surfaced on the final result.
    pub provider_id: String,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            reasoning: true,
            provider_id: "unknown".to_string(),
        }
    }
}

impl DecoderOptions {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    /// The terminal chunk is queued.
    Terminating,
    Finished,
}

type IoByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// `\n` / `\r\n` delimited lines of the response body. A line still open
/// when the body ends is yielded as the last frame.
type LineFrames = FramedRead<StreamReader<IoByteStream, Bytes>, LinesCodec>;

fn line_frames(body: ByteStream) -> LineFrames {
    // Transport errors ride through the reader as `io::Error` and are
    // recovered in `frame_error`.
    let body: IoByteStream = Box::pin(body.map_err(std::io::Error::other));
    FramedRead::new(StreamReader::new(body), LinesCodec::new())
}

pub struct EventStreamDecoder {
    /// `None` once the byte stream has been released.
    lines: Option<LineFrames>,
    pending: VecDeque<Chunk>,
    meta: StreamMeta,
    dialect: Dialect,
    inner: Box<dyn DialectDecoder>,
    options: DecoderOptions,
    event: Option<String>,
    last_event_id: Option<String>,
    cancel: Option<CancelHandle>,
    phase: Phase,
}

impl std::fmt::Debug for EventStreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamDecoder")
            .field("dialect", &self.dialect)
            .field("options", &self.options)
            .field("phase", &self.phase)
            .field("pending", &self.pending.len())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl EventStreamDecoder {
    pub fn new(body: ByteStream, dialect: Dialect, options: DecoderOptions) -> Self {
        tracing::trace!(provider = %options.provider_id, %dialect, "decoder started");
        Self {
            lines: Some(line_frames(body)),
            pending: VecDeque::new(),
            meta: StreamMeta::default(),
            dialect,
            inner: dialect.decoder(),
            options,
            event: None,
            last_event_id: None,
            cancel: None,
            phase: Phase::Streaming,
        }
    }

    /// Decode the body of a successful response.
    pub fn from_response(
        response: HttpTransportResponse,
        dialect: Dialect,
        options: DecoderOptions,
    ) -> Self {
        Self::new(response.into_byte_stream(), dialect, options)
    }

    /// Observe `cancel` while waiting for bytes.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn provider_id(&self) -> &str {
        &self.options.provider_id
    }

    pub fn model(&self) -> Option<&str> {
        self.meta.model.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.meta.response_id.as_deref()
    }

    /// Latest usage snapshot seen so far.
    pub fn usage(&self) -> Option<&Usage> {
        self.meta.usage.as_ref()
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.meta.finish_reason.as_ref()
    }

    /// Value of the most recent SSE `id:` field.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Next chunk, `Ok(None)` once the terminal chunk has been returned.
    ///
    /// After an error the decoder is finished and the byte stream released.
    pub async fn next(&mut self) -> Result<Option<Chunk>, LlmError> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                if chunk.is_terminal() {
                    self.finish();
                }
                return Ok(Some(chunk));
            }

            match self.phase {
                Phase::Finished | Phase::Terminating => return Ok(None),
                _ if self.meta.ended => {
                    self.queue_terminal();
                    continue;
                }
                _ => {}
            }

            let Some(lines) = self.lines.as_mut() else {
                self.queue_terminal();
                continue;
            };
            let read = match &self.cancel {
                Some(cancel) => cancel.run(async { Ok(lines.next().await) }).await,
                None => Ok(lines.next().await),
            };
            match read {
                Ok(Some(Ok(line))) => self.handle_line_or_fail(&line)?,
                Ok(None) => {
                    tracing::trace!(provider = %self.options.provider_id, "byte stream ended");
                    self.queue_terminal();
                }
                Ok(Some(Err(e))) => {
                    self.fail();
                    return Err(frame_error(e));
                }
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
    }

    /// Adapt into a `futures::Stream`. The stream ends after the terminal
    /// chunk or the first error.
    pub fn into_stream(self) -> ChunkStream {
        let mut decoder = self;
        Box::pin(async_stream::stream! {
            loop {
                match decoder.next().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }

    fn handle_line_or_fail(&mut self, line: &str) -> Result<(), LlmError> {
        if let Err(e) = self.handle_line(line) {
            self.fail();
            return Err(e);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<(), LlmError> {
        let line = line.trim_end();
        if line.trim_start().is_empty() {
            // Blank line dispatches the SSE event; its name does not carry over.
            self.event = None;
            return Ok(());
        }
        if line.starts_with(':') {
            return Ok(());
        }

        match self.dialect.framing() {
            Framing::Ndjson => self.handle_payload(line.trim()),
            Framing::Sse => {
                if let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) {
                    return self.handle_payload(data.trim());
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => (field, value.trim()),
                    None => (line, ""),
                };
                match field {
                    "event" => self.event = (!value.is_empty()).then(|| value.to_string()),
                    "id" => self.last_event_id = Some(value.to_string()),
                    "retry" => {}
                    _ => tracing::debug!(
                        provider = %self.options.provider_id,
                        line = %preview(line),
                        "skipping non-SSE line"
                    ),
                }
                Ok(())
            }
        }
    }

    fn handle_payload(&mut self, payload: &str) -> Result<(), LlmError> {
        if payload.is_empty() {
            return Ok(());
        }
        if payload == DONE_SENTINEL {
            self.meta.ended = true;
            return Ok(());
        }
        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(
                    provider = %self.options.provider_id,
                    error = %e,
                    data_preview = %preview(payload),
                    "skipping non-JSON payload"
                );
                return Ok(());
            }
        };
        let queued = self.pending.len();
        let mut cx = DecodeContext::new(&mut self.pending, &mut self.meta, self.options.reasoning);
        let result = self.inner.decode(self.event.as_deref(), &value, &mut cx);
        if result.is_err() {
            self.pending.truncate(queued);
        }
        result
    }

    fn queue_terminal(&mut self) {
        self.pending.push_back(Chunk::terminal(
            self.meta.usage.clone(),
            self.meta.finish_reason.clone(),
        ));
        self.phase = Phase::Terminating;
        self.lines = None;
    }

    fn finish(&mut self) {
        tracing::trace!(
            provider = %self.options.provider_id,
            finish_reason = ?self.meta.finish_reason,
            "decoder finished"
        );
        self.phase = Phase::Finished;
        self.lines = None;
    }

    fn fail(&mut self) {
        self.pending.clear();
        self.phase = Phase::Finished;
        self.lines = None;
    }
}

fn frame_error(err: LinesCodecError) -> LlmError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            LlmError::ParseError("event stream line exceeds the maximum length".to_string())
        }
        LinesCodecError::Io(io) => {
            let kind = io.kind();
            let message = io.to_string();
            match io.into_inner().map(|inner| inner.downcast::<LlmError>()) {
                Some(Ok(transport)) => *transport,
                _ if kind == ErrorKind::InvalidData => {
                    LlmError::ParseError(format!("event stream is not valid UTF-8: {message}"))
                }
                _ => LlmError::StreamError(message),
            }
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
