//! SSE plumbing for streaming completions.
//!
//! Bytes flow through three stages: [`SseTokenizer`] cuts the raw body into
//! frames, a dialect parser (`openai`, `anthropic`, `gemini`) turns each frame
//! into [`FrameEvent`]s, and [`StreamDecoder`] folds those into text deltas
//! plus the final aggregate. [`CompletionStream`] drives the pipeline off a
//! live response body.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use super::provider::{Provider, WireFormat};
use super::types::{FinishReason, StreamChunk, Usage};
use super::{anthropic, gemini, openai};
use crate::interaction::{Interaction, InteractionLogger};

/// Max size of a single unterminated line (1MB) before it is discarded
const MAX_LINE_SIZE: usize = 1_048_576;

/// One server-sent event: optional `event:` type plus its joined `data:` lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE frame splitter.
///
/// Buffers bytes (not chars) so multi-byte UTF-8 sequences split across
/// reads survive intact; lines are only decoded once complete.
#[derive(Debug, Default)]
pub struct SseTokenizer {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    /// Dropping the tail of an oversized line until its `\n`
    discarding: bool,
}

impl SseTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning every frame completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let bytes = if self.discarding {
            match bytes.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    &bytes[pos + 1..]
                }
                None => return Vec::new(),
            }
        } else {
            bytes
        };
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let line_bytes = &self.buffer[consumed..end];
            let line_bytes = line_bytes.strip_suffix(b"\r").unwrap_or(line_bytes);
            let line = String::from_utf8_lossy(line_bytes).into_owned();
            consumed = end + 1;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > MAX_LINE_SIZE {
            tracing::warn!(
                bytes = self.buffer.len(),
                "SSE line exceeded {}B limit, discarding it",
                MAX_LINE_SIZE
            );
            self.buffer.clear();
            self.discarding = true;
        }

        frames
    }

    /// Flush whatever is pending at end of stream (a last frame may lack its blank line).
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.discarding {
            self.discarding = false;
        } else if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = rest.strip_suffix(b"\r").unwrap_or(&rest);
            let line = String::from_utf8_lossy(rest).into_owned();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {} // id, retry and unknown fields
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// What a dialect parser extracted from one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Text(String),
    InputTokens(u32),
    OutputTokens(u32),
    Finish(FinishReason),
    /// In-band provider error; ends the stream
    Failed(String),
    /// Explicit end-of-stream sentinel
    Terminate,
}

impl WireFormat {
    pub fn parse_frame(&self, frame: &SseFrame) -> Vec<FrameEvent> {
        match self {
            WireFormat::OpenAICompatible => openai::parse_frame(frame),
            WireFormat::Anthropic => anthropic::parse_frame(frame),
            WireFormat::Gemini => gemini::parse_frame(frame),
        }
    }
}

/// Output of [`StreamDecoder::feed`]
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Delta(String),
    Failed(String),
}

/// Aggregate of everything a decoder saw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedCompletion {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
}

/// Tokenizer plus dialect adapter with running totals.
#[derive(Debug)]
pub struct StreamDecoder {
    format: WireFormat,
    tokenizer: SseTokenizer,
    text: String,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    finish_reason: Option<FinishReason>,
    terminated: bool,
}

impl StreamDecoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            tokenizer: SseTokenizer::new(),
            text: String::new(),
            input_tokens: None,
            output_tokens: None,
            finish_reason: None,
            terminated: false,
        }
    }

    /// True once the dialect's end sentinel (or an in-band error) was seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        let frames = self.tokenizer.feed(bytes);
        let mut out = Vec::new();
        for frame in frames {
            self.apply(&frame, &mut out);
        }
        out
    }

    /// Flush the tokenizer and return the aggregate.
    pub fn finish(&mut self) -> (Vec<Decoded>, DecodedCompletion) {
        let mut out = Vec::new();
        if let Some(frame) = self.tokenizer.finish() {
            self.apply(&frame, &mut out);
        }
        let completion = DecodedCompletion {
            text: std::mem::take(&mut self.text),
            usage: Usage::reported(self.input_tokens, self.output_tokens),
            finish_reason: self.finish_reason.take(),
        };
        (out, completion)
    }

    fn apply(&mut self, frame: &SseFrame, out: &mut Vec<Decoded>) {
        if self.terminated {
            return;
        }
        for event in self.format.parse_frame(frame) {
            match event {
                FrameEvent::Text(text) => {
                    self.text.push_str(&text);
                    out.push(Decoded::Delta(text));
                }
                FrameEvent::InputTokens(n) => self.input_tokens = Some(n),
                FrameEvent::OutputTokens(n) => self.output_tokens = Some(n),
                FrameEvent::Finish(reason) => self.finish_reason = Some(reason),
                FrameEvent::Failed(message) => {
                    self.terminated = true;
                    out.push(Decoded::Failed(message));
                    return;
                }
                FrameEvent::Terminate => {
                    self.terminated = true;
                    return;
                }
            }
        }
    }
}

pin_project! {
    /// Single-pass stream of canonical chunks over one HTTP response.
    ///
    /// Yields zero or more `TextDelta`s then exactly one terminal `Done` or
    /// `Error`, after which it only returns `None`. The response body is
    /// dropped as soon as the stream terminates, or when the stream itself
    /// is dropped.
    pub struct CompletionStream<S> {
        #[pin]
        body: Option<S>,
        decoder: StreamDecoder,
        pending: VecDeque<StreamChunk>,
        provider: Provider,
        model: String,
        started: Instant,
        logger: Option<Arc<dyn InteractionLogger>>,
        finished: bool,
    }
}

impl<S> CompletionStream<S> {
    pub fn new(body: S, provider: Provider, model: String, started: Instant) -> Self {
        Self {
            body: Some(body),
            decoder: StreamDecoder::new(provider.format()),
            pending: VecDeque::new(),
            provider,
            model,
            started,
            logger: None,
            finished: false,
        }
    }

    pub fn with_logger(mut self, logger: Option<Arc<dyn InteractionLogger>>) -> Self {
        self.logger = logger;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl<S, E> Stream for CompletionStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamChunk>> {
        let mut this = self.project();

        loop {
            if let Some(chunk) = this.pending.pop_front() {
                return Poll::Ready(Some(chunk));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            let polled = match this.body.as_mut().as_pin_mut() {
                Some(body) => body.poll_next(cx),
                None => Poll::Ready(None),
            };

            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => {
                    let decoded = this.decoder.feed(&bytes);
                    let failed = queue_decoded(this.pending, decoded);
                    if failed || this.decoder.is_terminated() {
                        // Release the connection before handing out the terminal chunk
                        this.body.set(None);
                        *this.finished = true;
                        if !failed {
                            let done = finalize(
                                this.decoder,
                                *this.provider,
                                this.model,
                                *this.started,
                                this.logger.as_ref(),
                            );
                            this.pending.extend(done);
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(provider = %this.provider, error = %e, "SSE read error");
                    this.body.set(None);
                    *this.finished = true;
                    this.pending.push_back(StreamChunk::Error {
                        message: format!("{} stream read error: {}", this.provider, e),
                    });
                }
                Poll::Ready(None) => {
                    this.body.set(None);
                    *this.finished = true;
                    let done = finalize(
                        this.decoder,
                        *this.provider,
                        this.model,
                        *this.started,
                        this.logger.as_ref(),
                    );
                    this.pending.extend(done);
                }
            }
        }
    }
}

/// Queue decoded events as chunks; returns true when an in-band error ended the stream
fn queue_decoded(pending: &mut VecDeque<StreamChunk>, decoded: Vec<Decoded>) -> bool {
    for item in decoded {
        match item {
            Decoded::Delta(content) => pending.push_back(StreamChunk::TextDelta { content }),
            Decoded::Failed(message) => {
                pending.push_back(StreamChunk::Error { message });
                return true;
            }
        }
    }
    false
}

/// Flush the decoder and build the terminal chunk(s)
fn finalize(
    decoder: &mut StreamDecoder,
    provider: Provider,
    model: &str,
    started: Instant,
    logger: Option<&Arc<dyn InteractionLogger>>,
) -> Vec<StreamChunk> {
    let (tail, completion) = decoder.finish();
    let mut chunks = VecDeque::new();
    if queue_decoded(&mut chunks, tail) {
        return chunks.into();
    }

    let latency_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        provider = %provider,
        model,
        latency_ms,
        chars = completion.text.len(),
        output_tokens = completion.usage.and_then(|u| u.output_tokens),
        "Stream completed"
    );

    if let Some(logger) = logger {
        crate::interaction::dispatch(
            logger,
            Interaction::new(provider, model, &completion.text, completion.usage, latency_ms, true),
        );
    }

    chunks.push_back(StreamChunk::Done {
        content: completion.text,
        provider: provider.id().to_string(),
        model: model.to_string(),
        latency_ms,
        usage: completion.usage,
        finish_reason: completion.finish_reason,
    });
    chunks.into()
}
