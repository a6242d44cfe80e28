//! Interactive assistant session: set up an assistant, an optional retrieval
//! index and a thread, then chat until the user quits.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

use sowscribe_openai::{
    Assistant, NewAssistant, OpenAiClient, RunRequest, Thread, ToolSpec, VectorStore,
};
use sowscribe_shared::{AssistantConfig, Result, SowscribeError};

use crate::console::Console;
use crate::render::{StreamRenderer, render_run};

const ASSISTANT_ID_PROMPT: &str =
    "Enter the assistant ID to use (press enter to create a new assistant): ";
const THREAD_ID_PROMPT: &str = "Enter the thread ID to use (press enter to create a new thread): ";

/// Input that ends the chat loop, compared case-insensitively.
pub const QUIT_COMMAND: &str = "quit";

/// State of one interactive session.
pub struct AssistantSession<R, W> {
    client: OpenAiClient,
    config: AssistantConfig,
    console: Console<R, W>,
    assistant: Option<Assistant>,
    vector_store: Option<VectorStore>,
    thread: Option<Thread>,
}

impl<R: BufRead, W: Write> AssistantSession<R, W> {
    pub fn new(client: OpenAiClient, config: AssistantConfig, console: Console<R, W>) -> Self {
        Self {
            client,
            config,
            console,
            assistant: None,
            vector_store: None,
            thread: None,
        }
    }

    pub fn assistant(&self) -> Option<&Assistant> {
        self.assistant.as_ref()
    }

    pub fn vector_store(&self) -> Option<&VectorStore> {
        self.vector_store.as_ref()
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    pub fn into_console(self) -> Console<R, W> {
        self.console
    }

    /// Full startup flow followed by the chat loop.
    ///
    /// Ids passed in skip their prompt. A fresh vector store is built from
    /// the source directory only when both ids end up blank.
    #[instrument(skip_all)]
    pub async fn run_chat(
        &mut self,
        assistant_id: Option<String>,
        thread_id: Option<String>,
    ) -> Result<()> {
        let assistant_id = match assistant_id {
            Some(id) => id,
            None => self.console.ask(ASSISTANT_ID_PROMPT)?.unwrap_or_default(),
        };
        let thread_id = match thread_id {
            Some(id) => id,
            None => self.console.ask(THREAD_ID_PROMPT)?.unwrap_or_default(),
        };
        let assistant_id = non_blank(&assistant_id);
        let thread_id = non_blank(&thread_id);

        self.setup_assistant(assistant_id).await?;

        if assistant_id.is_none() && thread_id.is_none() {
            let source_dir = self.config.source_dir.clone();
            let files = list_source_files(&source_dir)?;
            if files.is_empty() {
                self.console.say(format!(
                    "No files found in the '{}' folder.",
                    source_dir.display()
                ))?;
            } else {
                self.setup_vector_store().await?;
                self.upload_files(&files).await?;
                self.link_vector_store().await?;
            }
        }

        self.setup_thread(thread_id).await?;
        self.chat_loop().await
    }

    /// Reattach to `existing_id`, or prompt for a name and instructions and
    /// create a new assistant with file search and code interpreter.
    pub async fn setup_assistant(&mut self, existing_id: Option<&str>) -> Result<()> {
        let assistant = match existing_id {
            Some(id) => {
                self.console.say("Retrieving assistant...")?;
                self.client.retrieve_assistant(id).await?
            }
            None => {
                self.console.say("Creating assistant...")?;
                let name = self.require("Enter the name of the assistant: ")?;
                let instructions = self.require("Enter the instructions for the assistant: ")?;
                self.client
                    .create_assistant(&NewAssistant {
                        name,
                        instructions,
                        model: self.config.model.clone(),
                        tools: vec![ToolSpec::FileSearch, ToolSpec::CodeInterpreter],
                    })
                    .await?
            }
        };
        info!(assistant_id = %assistant.id, "assistant ready");
        self.assistant = Some(assistant);
        Ok(())
    }

    /// Prompt for a name and create an expiring vector store.
    pub async fn setup_vector_store(&mut self) -> Result<()> {
        self.console.say("Creating vector store...")?;
        let name = self.require("Enter the name of the vector store: ")?;
        let store = self
            .client
            .create_vector_store(&name, self.config.vector_store_expiry_days)
            .await?;
        self.vector_store = Some(store);
        Ok(())
    }

    /// Upload `paths` into the session's vector store and wait for ingestion.
    pub async fn upload_files(&mut self, paths: &[PathBuf]) -> Result<()> {
        let store_id = self.vector_store_id()?;
        self.console.say("Uploading files to vector store...")?;
        let batch = self
            .client
            .upload_and_poll(
                &store_id,
                paths,
                Duration::from_millis(self.config.poll_interval_ms),
            )
            .await?;
        self.console.say(&batch.status)?;
        self.console.say(batch.file_counts)?;
        Ok(())
    }

    /// Point the assistant's file search at the session's vector store.
    pub async fn link_vector_store(&mut self) -> Result<()> {
        let store_id = self.vector_store_id()?;
        let assistant_id = self.assistant_id()?;
        self.console.say("Updating assistant...")?;
        let assistant = self
            .client
            .attach_vector_store(&assistant_id, &store_id)
            .await?;
        self.assistant = Some(assistant);
        Ok(())
    }

    /// Reattach to `existing_id`, or create an empty thread.
    pub async fn setup_thread(&mut self, existing_id: Option<&str>) -> Result<()> {
        let thread = match existing_id {
            Some(id) => {
                self.console.say("Retrieving thread...")?;
                self.client.retrieve_thread(id).await?
            }
            None => {
                self.console.say("Creating thread...")?;
                self.client.create_thread().await?
            }
        };
        info!(thread_id = %thread.id, "thread ready");
        self.thread = Some(thread);
        Ok(())
    }

    /// Read user input until `quit` or end of input, running one streamed
    /// turn per line.
    pub async fn chat_loop(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.console.ask_user()? else {
                info!("input closed, leaving chat");
                break;
            };
            if line.eq_ignore_ascii_case(QUIT_COMMAND) {
                break;
            }
            self.send_turn(&line).await?;
        }
        Ok(())
    }

    /// Post `content` to the thread and render the streamed run.
    #[instrument(skip_all, fields(chars = content.len()))]
    pub async fn send_turn(&mut self, content: &str) -> Result<()> {
        let thread_id = self.thread_id()?;
        let assistant_id = self.assistant_id()?;

        self.client.create_message(&thread_id, content).await?;

        let request = RunRequest::streaming(assistant_id, self.config.run_instructions.clone());
        let mut stream = self.client.stream_run(&thread_id, &request).await?;
        let mut renderer = StreamRenderer::new(&self.config.code_mirror_path);
        render_run(&mut stream, &mut renderer, self.console.writer(), &self.client).await
    }

    fn require(&mut self, prompt: &str) -> Result<String> {
        self.console
            .ask(prompt)?
            .ok_or_else(|| SowscribeError::validation("input closed during setup"))
    }

    fn assistant_id(&self) -> Result<String> {
        self.assistant
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or_else(|| SowscribeError::validation("no assistant set up"))
    }

    fn thread_id(&self) -> Result<String> {
        self.thread
            .as_ref()
            .map(|t| t.id.clone())
            .ok_or_else(|| SowscribeError::validation("no thread set up"))
    }

    fn vector_store_id(&self) -> Result<String> {
        self.vector_store
            .as_ref()
            .map(|v| v.id.clone())
            .ok_or_else(|| SowscribeError::validation("no vector store set up"))
    }
}

fn non_blank(id: &str) -> Option<&str> {
    let id = id.trim();
    (!id.is_empty()).then_some(id)
}

/// Regular files directly under `dir`, sorted. A missing directory has none.
pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "source directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SowscribeError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SowscribeError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
