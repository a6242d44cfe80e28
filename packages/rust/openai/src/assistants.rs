//! Stateful assistant resources: assistants, vector stores, files, threads, messages.
//!
//! The local process only ever holds identifiers; every object here is a thin
//! view of what the provider returned.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use sowscribe_shared::{Result, SowscribeError};

use crate::client::OpenAiClient;

// ---------------------------------------------------------------------------
// Assistants
// ---------------------------------------------------------------------------

/// A tool enabled on an assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    FileSearch,
    CodeInterpreter,
    #[serde(other)]
    Other,
}

/// An assistant as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub tool_resources: Option<serde_json::Value>,
}

/// Body of `POST /assistants`.
#[derive(Debug, Clone, Serialize)]
pub struct NewAssistant {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<ToolSpec>,
}

// ---------------------------------------------------------------------------
// Vector stores and files
// ---------------------------------------------------------------------------

/// A hosted retrieval index.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// An uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Per-outcome file counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub total: u64,
}

impl fmt::Display for FileCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed={} failed={} cancelled={} in_progress={} total={}",
            self.completed, self.failed, self.cancelled, self.in_progress, self.total
        )
    }
}

/// A batch of files being ingested into a vector store.
#[derive(Debug, Clone, Deserialize)]
pub struct FileBatch {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

impl FileBatch {
    pub fn is_in_progress(&self) -> bool {
        self.status == "in_progress"
    }
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

/// A hosted conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// The id of a posted message; content is not needed locally.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

impl OpenAiClient {
    /// `POST /assistants`.
    #[instrument(skip_all, fields(name = %new.name, model = %new.model))]
    pub async fn create_assistant(&self, new: &NewAssistant) -> Result<Assistant> {
        let assistant: Assistant = self.post_json("/assistants", new).await?;
        info!(assistant_id = %assistant.id, "assistant created");
        Ok(assistant)
    }

    /// `GET /assistants/{id}`.
    pub async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        self.get_json(&format!("/assistants/{assistant_id}")).await
    }

    /// Point the assistant's file search tool at `vector_store_id`.
    #[instrument(skip(self))]
    pub async fn attach_vector_store(
        &self,
        assistant_id: &str,
        vector_store_id: &str,
    ) -> Result<Assistant> {
        let body = serde_json::json!({
            "tool_resources": { "file_search": { "vector_store_ids": [vector_store_id] } }
        });
        self.post_json(&format!("/assistants/{assistant_id}"), &body).await
    }

    /// `POST /vector_stores`, expiring `expiry_days` after last activity.
    #[instrument(skip(self))]
    pub async fn create_vector_store(&self, name: &str, expiry_days: u32) -> Result<VectorStore> {
        let body = serde_json::json!({
            "name": name,
            "expires_after": { "anchor": "last_active_at", "days": expiry_days },
        });
        let store: VectorStore = self.post_json("/vector_stores", &body).await?;
        info!(vector_store_id = %store.id, "vector store created");
        Ok(store)
    }

    /// Upload a local file for assistant use (`POST /files`, purpose `assistants`).
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload_file(&self, path: &Path) -> Result<FileObject> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SowscribeError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                SowscribeError::validation(format!("not a file path: {}", path.display()))
            })?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .send(
                self.request(reqwest::Method::POST, "/files").multipart(form),
                "/files",
            )
            .await?;
        let file: FileObject = response
            .json()
            .await
            .map_err(|e| SowscribeError::parse(format!("/files: unexpected response shape: {e}")))?;
        debug!(file_id = %file.id, filename = %file.filename, "file uploaded");
        Ok(file)
    }

    /// `GET /files/{id}`.
    pub async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.get_json(&format!("/files/{file_id}")).await
    }

    /// `POST /vector_stores/{id}/file_batches`.
    pub async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch> {
        let body = serde_json::json!({ "file_ids": file_ids });
        self.post_json(&format!("/vector_stores/{vector_store_id}/file_batches"), &body)
            .await
    }

    /// `GET /vector_stores/{id}/file_batches/{batch_id}`.
    pub async fn retrieve_file_batch(
        &self,
        vector_store_id: &str,
        batch_id: &str,
    ) -> Result<FileBatch> {
        self.get_json(&format!(
            "/vector_stores/{vector_store_id}/file_batches/{batch_id}"
        ))
        .await
    }

    /// Upload every path, add them to the store as one batch, and poll until
    /// ingestion leaves `in_progress`.
    #[instrument(skip(self, paths), fields(files = paths.len()))]
    pub async fn upload_and_poll<P: AsRef<Path>>(
        &self,
        vector_store_id: &str,
        paths: &[P],
        poll_interval: Duration,
    ) -> Result<FileBatch> {
        let mut file_ids = Vec::with_capacity(paths.len());
        for path in paths {
            file_ids.push(self.upload_file(path.as_ref()).await?.id);
        }

        let mut batch = self.create_file_batch(vector_store_id, &file_ids).await?;
        while batch.is_in_progress() {
            debug!(batch_id = %batch.id, counts = %batch.file_counts, "file batch still ingesting");
            tokio::time::sleep(poll_interval).await;
            batch = self.retrieve_file_batch(vector_store_id, &batch.id).await?;
        }

        info!(
            batch_id = %batch.id,
            status = %batch.status,
            counts = %batch.file_counts,
            "file batch finished"
        );
        Ok(batch)
    }

    /// `POST /threads` with no initial messages.
    pub async fn create_thread(&self) -> Result<Thread> {
        let body = serde_json::json!({ "messages": [] });
        let thread: Thread = self.post_json("/threads", &body).await?;
        info!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    /// `GET /threads/{id}`.
    pub async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread> {
        self.get_json(&format!("/threads/{thread_id}")).await
    }

    /// Append a user message to a thread.
    pub async fn create_message(&self, thread_id: &str, content: &str) -> Result<MessageRef> {
        let body = serde_json::json!({ "role": "user", "content": content });
        self.post_json(&format!("/threads/{thread_id}/messages"), &body)
            .await
    }
}
