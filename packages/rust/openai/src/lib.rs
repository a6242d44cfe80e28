//! Client for the hosted LLM provider.
//!
//! Covers the two surfaces SowScribe needs: stateless chat completions used to
//! summarize wiki pages, and the assistants API (assistants, vector stores,
//! files, threads, streamed runs) behind the interactive session.

mod client;

pub mod assistants;
pub mod chat;
pub mod events;
pub mod stream;

pub use assistants::{
    Assistant, FileBatch, FileCounts, FileObject, MessageRef, NewAssistant, Thread, ToolSpec,
    VectorStore,
};
pub use chat::{ChatMessage, ChatRequest};
pub use client::OpenAiClient;
pub use events::{Annotation, Message, TextContent, ToolCallDelta, ToolKind};
pub use stream::{EventDecoder, RunEvent, RunRequest, RunStream, StreamEvent};
