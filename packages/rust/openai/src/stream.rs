//! Streamed runs: SSE framing, provider events, and the handler-facing event enum.
//!
//! Three layers, each testable on its own:
//! 1. [`SseDecoder`] turns raw bytes into `event:`/`data:` frames.
//! 2. [`StreamEvent::from_frame`] turns a frame into a typed provider event.
//! 3. [`EventDecoder`] turns provider events into [`RunEvent`]s, synthesizing
//!    the "created" events the first time a text block or tool call shows up.

use std::collections::{HashSet, VecDeque};

use futures::StreamExt;
use futures::stream::{BoxStream, Fuse};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use sowscribe_shared::{Result, SowscribeError};

use crate::client::OpenAiClient;
use crate::events::{
    Message, MessageDelta, MessageDeltaContent, RunStepDelta, StepDetailsDelta, ToolCallDelta,
    ToolKind,
};

// ---------------------------------------------------------------------------
// SSE framing
// ---------------------------------------------------------------------------

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser; bytes may be split anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }

    /// Flush a frame left pending when the connection closed without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let mut rest = std::mem::take(&mut self.buffer);
            rest.push(b'\n');
            let mut frames = self.push(&rest);
            if let Some(frame) = frames.pop() {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

// ---------------------------------------------------------------------------
// Provider events
// ---------------------------------------------------------------------------

/// The provider events this client cares about.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageDelta(MessageDelta),
    MessageCompleted(Message),
    RunStepDelta(RunStepDelta),
    RunCompleted,
    /// Run ended as failed, cancelled, or expired.
    RunFailed(String),
    Error(String),
    Done,
    /// Lifecycle events with nothing to render.
    Other(String),
}

impl StreamEvent {
    /// Decode one SSE frame.
    pub fn from_frame(frame: &SseFrame) -> Result<Self> {
        let name = frame.event.as_deref().unwrap_or("");
        let event = match name {
            "thread.message.delta" => Self::MessageDelta(parse_data(name, &frame.data)?),
            "thread.message.completed" => Self::MessageCompleted(parse_data(name, &frame.data)?),
            "thread.run.step.delta" => Self::RunStepDelta(parse_data(name, &frame.data)?),
            "thread.run.completed" => Self::RunCompleted,
            "thread.run.failed" | "thread.run.cancelled" | "thread.run.expired" => {
                let value: serde_json::Value = parse_data(name, &frame.data)?;
                let reason = value
                    .pointer("/last_error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or(name)
                    .to_string();
                Self::RunFailed(reason)
            }
            "error" => Self::Error(crate::client::error_message(&frame.data)),
            "done" => Self::Done,
            _ if frame.data == "[DONE]" => Self::Done,
            other => Self::Other(other.to_string()),
        };
        Ok(event)
    }

    /// Whether the run is over after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted | Self::RunFailed(_) | Self::Error(_) | Self::Done
        )
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T> {
    serde_json::from_str(data)
        .map_err(|e| SowscribeError::parse(format!("malformed '{event}' event: {e}")))
}

// ---------------------------------------------------------------------------
// Handler-facing events
// ---------------------------------------------------------------------------

/// What the response handler reacts to, in arrival order.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A new text block started.
    TextCreated,
    /// More text for the current block.
    TextDelta(String),
    /// The model invoked a tool.
    ToolCallCreated(ToolKind),
    /// More of a tool call: code input fragments and/or outputs.
    ToolCallDelta(ToolCallDelta),
    /// A message finished, with its final text and annotations.
    MessageDone(Message),
}

/// Turns provider events into [`RunEvent`]s for one run.
#[derive(Debug, Default)]
pub struct EventDecoder {
    seen_text: HashSet<(String, usize)>,
    seen_tool_calls: HashSet<(String, usize)>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one provider event. Failures reported by the run become errors.
    pub fn decode(&mut self, event: StreamEvent) -> Result<Vec<RunEvent>> {
        let mut out = Vec::new();
        match event {
            StreamEvent::MessageDelta(delta) => {
                for content in delta.delta.content {
                    let MessageDeltaContent::Text { index, text } = content else {
                        continue;
                    };
                    if self.seen_text.insert((delta.id.clone(), index)) {
                        out.push(RunEvent::TextCreated);
                    }
                    if let Some(value) = text.and_then(|t| t.value) {
                        out.push(RunEvent::TextDelta(value));
                    }
                }
            }
            StreamEvent::RunStepDelta(delta) => {
                if let Some(StepDetailsDelta::ToolCalls { tool_calls }) = delta.delta.step_details {
                    for call in tool_calls {
                        if self.seen_tool_calls.insert((delta.id.clone(), call.index)) {
                            out.push(RunEvent::ToolCallCreated(call.kind()));
                        }
                        out.push(RunEvent::ToolCallDelta(call));
                    }
                }
            }
            StreamEvent::MessageCompleted(message) => out.push(RunEvent::MessageDone(message)),
            StreamEvent::RunFailed(reason) => {
                return Err(SowscribeError::Stream(format!("run failed: {reason}")));
            }
            StreamEvent::Error(message) => return Err(SowscribeError::Stream(message)),
            StreamEvent::RunCompleted | StreamEvent::Done => {}
            StreamEvent::Other(name) => debug!(event = %name, "ignoring stream event"),
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// RunStream
// ---------------------------------------------------------------------------

/// Body of `POST /threads/{id}/runs` with streaming on.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub assistant_id: String,
    pub instructions: String,
    pub truncation_strategy: TruncationStrategy,
    pub stream: bool,
}

impl RunRequest {
    pub fn streaming(assistant_id: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            instructions: instructions.into(),
            truncation_strategy: TruncationStrategy::auto(),
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TruncationStrategy {
    #[serde(rename = "type")]
    pub kind: String,
}

impl TruncationStrategy {
    pub fn auto() -> Self {
        Self { kind: "auto".into() }
    }
}

/// An open event stream for one run.
pub struct RunStream {
    body: Fuse<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    finished: bool,
}

impl RunStream {
    pub(crate) fn from_body(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            body: body.fuse(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next provider event, or `None` once the stream ended.
    ///
    /// After a terminal event (see [`StreamEvent::is_terminal`]) this returns `None`.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(frame) = self.pending.pop_front() {
                let event = StreamEvent::from_frame(&frame)?;
                if event.is_terminal() {
                    self.finished = true;
                }
                return Ok(Some(event));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)),
                Some(Err(e)) => {
                    return Err(SowscribeError::Network(format!("run stream broke off: {e}")));
                }
                None => match self.decoder.finish() {
                    Some(frame) => self.pending.push_back(frame),
                    None => {
                        warn!("run stream closed without a terminal event");
                        self.finished = true;
                    }
                },
            }
        }
    }
}

impl OpenAiClient {
    /// Open a streamed run on `thread_id`.
    #[instrument(skip(self, request), fields(assistant_id = %request.assistant_id))]
    pub async fn stream_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunStream> {
        let path = format!("/threads/{thread_id}/runs");
        let response = self
            .send(
                self.request(reqwest::Method::POST, &path)
                    .header("Accept", "text/event-stream")
                    .json(request),
                &path,
            )
            .await?;

        Ok(RunStream::from_body(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
        ))
    }
}
