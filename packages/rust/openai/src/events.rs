//! Wire types carried by streamed run events.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Finished messages
// ---------------------------------------------------------------------------

/// A complete thread message (`thread.message.completed`).
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl Message {
    /// The first text block, which carries the answer and its annotations.
    pub fn first_text(&self) -> Option<&TextContent> {
        self.content.iter().find_map(|c| match c {
            MessageContent::Text { text } => Some(text),
            MessageContent::Other => None,
        })
    }
}

/// One content block of a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

/// Text plus the annotations pointing into it.
#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A file reference inside an annotation.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

/// A span of message text that refers to a file.
///
/// `start_index`/`end_index` are character offsets into [`TextContent::value`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    FileCitation {
        text: String,
        #[serde(default)]
        start_index: Option<usize>,
        #[serde(default)]
        end_index: Option<usize>,
        file_citation: FileRef,
    },
    FilePath {
        text: String,
        #[serde(default)]
        start_index: Option<usize>,
        #[serde(default)]
        end_index: Option<usize>,
        file_path: FileRef,
    },
}

impl Annotation {
    /// The literal text being annotated, e.g. `【4:0†source】`.
    pub fn text(&self) -> &str {
        match self {
            Self::FileCitation { text, .. } | Self::FilePath { text, .. } => text,
        }
    }

    /// Character span, when the provider sent one.
    pub fn span(&self) -> Option<(usize, usize)> {
        match self {
            Self::FileCitation {
                start_index: Some(s),
                end_index: Some(e),
                ..
            }
            | Self::FilePath {
                start_index: Some(s),
                end_index: Some(e),
                ..
            } => Some((*s, *e)),
            _ => None,
        }
    }

    /// The referenced file.
    pub fn file_id(&self) -> &str {
        match self {
            Self::FileCitation { file_citation, .. } => &file_citation.file_id,
            Self::FilePath { file_path, .. } => &file_path.file_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Message deltas
// ---------------------------------------------------------------------------

/// `thread.message.delta` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelta {
    pub id: String,
    pub delta: MessageDeltaBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<MessageDeltaContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageDeltaContent {
    Text {
        index: usize,
        #[serde(default)]
        text: Option<TextDelta>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextDelta {
    #[serde(default)]
    pub value: Option<String>,
}

// ---------------------------------------------------------------------------
// Run step deltas (tool calls)
// ---------------------------------------------------------------------------

/// `thread.run.step.delta` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RunStepDelta {
    pub id: String,
    pub delta: RunStepDeltaBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStepDeltaBody {
    #[serde(default)]
    pub step_details: Option<StepDetailsDelta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetailsDelta {
    ToolCalls {
        #[serde(default)]
        tool_calls: Vec<ToolCallDelta>,
    },
    #[serde(other)]
    Other,
}

/// Which tool a call belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    CodeInterpreter,
    FileSearch,
    Function,
    Other(String),
}

impl ToolKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CodeInterpreter => "code_interpreter",
            Self::FileSearch => "file_search",
            Self::Function => "function",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ToolKind {
    fn from(s: &str) -> Self {
        match s {
            "code_interpreter" => Self::CodeInterpreter,
            "file_search" => Self::FileSearch,
            "function" => Self::Function,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incremental fragment of one tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind_name: String,
    #[serde(default)]
    pub code_interpreter: Option<CodeInterpreterDelta>,
}

impl ToolCallDelta {
    pub fn kind(&self) -> ToolKind {
        ToolKind::from(self.kind_name.as_str())
    }
}

/// Code interpreter input fragment and/or outputs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeInterpreterDelta {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub outputs: Option<Vec<CodeOutput>>,
}

/// One code interpreter output; only `logs` outputs carry text.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeOutput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub logs: Option<String>,
}
