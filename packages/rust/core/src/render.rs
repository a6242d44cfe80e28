//! Terminal rendering of a streamed assistant run.
//!
//! [`render_run`] pulls provider events off a [`RunStream`], decodes them into
//! [`RunEvent`]s and hands each one to a [`StreamRenderer`].

use std::io::Write;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;
use tracing::{debug, instrument};

use sowscribe_openai::{EventDecoder, OpenAiClient, RunEvent, RunStream, TextContent, ToolKind};
use sowscribe_shared::{Citation, Result, SowscribeError};

use crate::console::console_err;

/// Looks up display names for cited files.
pub trait FileResolver {
    fn filename(&self, file_id: &str) -> impl Future<Output = Result<String>>;
}

impl FileResolver for OpenAiClient {
    async fn filename(&self, file_id: &str) -> Result<String> {
        Ok(self.retrieve_file(file_id).await?.filename)
    }
}

/// Replace each annotation's text with its `[i]` marker.
///
/// Annotation offsets are used when they point at the annotation text;
/// otherwise the first unclaimed occurrence of that text is replaced.
/// Returns the new text and one citation per annotation, in order.
pub fn substitute_citations(content: &TextContent) -> (String, Vec<Citation>) {
    let value = content.value.as_str();
    // Byte offset of every char boundary, including the end.
    let boundaries: Vec<usize> = value
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(value.len()))
        .collect();

    let mut claimed: Vec<(usize, usize, usize)> = Vec::new();
    let mut citations = Vec::with_capacity(content.annotations.len());

    for (index, annotation) in content.annotations.iter().enumerate() {
        citations.push(Citation {
            index,
            file_id: annotation.file_id().to_string(),
            filename: None,
        });

        let needle = annotation.text();
        if needle.is_empty() {
            continue;
        }

        let by_offset = annotation.span().and_then(|(start, end)| {
            let (start, end) = (*boundaries.get(start)?, *boundaries.get(end)?);
            (start < end && &value[start..end] == needle).then_some((start, end))
        });

        let span = by_offset
            .filter(|span| is_free(&claimed, *span))
            .or_else(|| {
                value
                    .match_indices(needle)
                    .map(|(start, m)| (start, start + m.len()))
                    .find(|span| is_free(&claimed, *span))
            });

        if let Some((start, end)) = span {
            claimed.push((start, end, index));
        }
    }

    claimed.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    for (start, end, index) in claimed {
        out.push_str(&value[cursor..start]);
        out.push_str(&format!("[{index}]"));
        cursor = end;
    }
    out.push_str(&value[cursor..]);

    (out, citations)
}

fn is_free(claimed: &[(usize, usize, usize)], (start, end): (usize, usize)) -> bool {
    claimed.iter().all(|(s, e, _)| end <= *s || start >= *e)
}

/// Per-run rendering state.
#[derive(Debug)]
pub struct StreamRenderer {
    code_buffer: String,
    mirror_path: PathBuf,
}

impl StreamRenderer {
    /// `mirror_path` receives the code interpreter input whenever it produces output.
    pub fn new(mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            code_buffer: String::new(),
            mirror_path: mirror_path.into(),
        }
    }

    pub fn code_buffer(&self) -> &str {
        &self.code_buffer
    }

    /// Render one event.
    pub async fn handle<W: Write, F: FileResolver>(
        &mut self,
        event: RunEvent,
        out: &mut W,
        files: &F,
    ) -> Result<()> {
        match event {
            RunEvent::TextCreated => write!(out, "\nassistant › ").map_err(console_err)?,
            RunEvent::TextDelta(text) => write!(out, "{}", text.cyan()).map_err(console_err)?,
            RunEvent::ToolCallCreated(kind) => {
                let line = format!("\nassistant > {kind}\n");
                if kind == ToolKind::CodeInterpreter {
                    self.code_buffer.clear();
                    writeln!(out, "{}", line.magenta()).map_err(console_err)?;
                } else {
                    writeln!(out, "{line}").map_err(console_err)?;
                }
            }
            RunEvent::ToolCallDelta(delta) => {
                if delta.kind() != ToolKind::CodeInterpreter {
                    return Ok(());
                }
                let Some(code) = delta.code_interpreter else {
                    return Ok(());
                };
                if let Some(input) = code.input.filter(|i| !i.is_empty()) {
                    self.code_buffer.push_str(&input);
                    write!(out, "{input}").map_err(console_err)?;
                }
                if let Some(outputs) = code.outputs.filter(|o| !o.is_empty()) {
                    self.write_mirror()?;
                    writeln!(out, "{}", "\n\noutput ›".yellow()).map_err(console_err)?;
                    for output in outputs.iter().filter(|o| o.kind == "logs") {
                        if let Some(logs) = &output.logs {
                            writeln!(out, "{}", format!("\n{logs}").red()).map_err(console_err)?;
                        }
                    }
                }
            }
            RunEvent::MessageDone(message) => {
                let Some(content) = message.first_text() else {
                    return Ok(());
                };
                let (text, mut citations) = substitute_citations(content);
                debug!(
                    message_id = %message.id,
                    citations = citations.len(),
                    %text,
                    "message done"
                );

                for citation in &mut citations {
                    citation.filename = Some(files.filename(&citation.file_id).await?);
                }

                writeln!(out, "\n").map_err(console_err)?;
                if !citations.is_empty() {
                    let lines: Vec<String> = citations.iter().map(|c| c.to_string()).collect();
                    writeln!(out, "{}", lines.join("\n").red()).map_err(console_err)?;
                }
            }
        }
        out.flush().map_err(console_err)
    }

    fn write_mirror(&self) -> Result<()> {
        let path: &Path = &self.mirror_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SowscribeError::io(parent, e))?;
        }
        std::fs::write(path, &self.code_buffer).map_err(|e| SowscribeError::io(path, e))?;
        debug!(
            path = %path.display(),
            bytes = self.code_buffer.len(),
            "mirrored code interpreter input"
        );
        Ok(())
    }
}

/// Drive one streamed run to completion, rendering as events arrive.
#[instrument(skip_all)]
pub async fn render_run<W: Write, F: FileResolver>(
    stream: &mut RunStream,
    renderer: &mut StreamRenderer,
    out: &mut W,
    files: &F,
) -> Result<()> {
    let mut decoder = EventDecoder::new();
    while let Some(event) = stream.next_event().await? {
        for run_event in decoder.decode(event)? {
            renderer.handle(run_event, out, files).await?;
        }
    }
    writeln!(out).map_err(console_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use sowscribe_openai::{Message, ToolCallDelta};

    struct Names(HashMap<&'static str, &'static str>);

    impl FileResolver for Names {
        async fn filename(&self, file_id: &str) -> Result<String> {
            self.0
                .get(file_id)
                .map(|n| n.to_string())
                .ok_or_else(|| SowscribeError::validation(format!("unknown file {file_id}")))
        }
    }

    fn text_content(json: serde_json::Value) -> TextContent {
        serde_json::from_value(json).unwrap()
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sowscribe-render-test-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn citations_replaced_by_offset_in_order() {
        let value = "ACME【4:0†a】 pays 10k【4:1†b】 yearly【4:0†a】.";
        let content = text_content(serde_json::json!({
            "value": value,
            "annotations": [
                { "type": "file_citation", "text": "【4:0†a】", "start_index": 4, "end_index": 11, "file_citation": { "file_id": "f1" } },
                { "type": "file_citation", "text": "【4:1†b】", "start_index": 20, "end_index": 27, "file_citation": { "file_id": "f2" } },
                { "type": "file_citation", "text": "【4:0†a】", "start_index": 34, "end_index": 41, "file_citation": { "file_id": "f1" } }
            ]
        }));

        let (text, citations) = substitute_citations(&content);
        assert_eq!(text, "ACME[0] pays 10k[1] yearly[2].");
        assert_eq!(citations.len(), 3);
        let ids: Vec<_> = citations.iter().map(|c| (c.index, c.file_id.as_str())).collect();
        assert_eq!(ids, [(0, "f1"), (1, "f2"), (2, "f1")]);
    }

    #[test]
    fn citations_fall_back_to_first_unclaimed_occurrence() {
        let content = text_content(serde_json::json!({
            "value": "x【s】 y【s】",
            "annotations": [
                { "type": "file_citation", "text": "【s】", "file_citation": { "file_id": "f1" } },
                { "type": "file_citation", "text": "【s】", "start_index": 99, "end_index": 120, "file_citation": { "file_id": "f2" } }
            ]
        }));

        let (text, citations) = substitute_citations(&content);
        assert_eq!(text, "x[0] y[1]");
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn text_without_annotations_is_unchanged() {
        let content =
            text_content(serde_json::json!({ "value": "plain answer", "annotations": [] }));
        let (text, citations) = substitute_citations(&content);
        assert_eq!(text, "plain answer");
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn message_done_prints_resolved_citations() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "content": [{ "type": "text", "text": {
                "value": "ACME【1】 and Globex【2】",
                "annotations": [
                    { "type": "file_citation", "text": "【1】", "start_index": 4, "end_index": 7, "file_citation": { "file_id": "f1" } },
                    { "type": "file_citation", "text": "【2】", "start_index": 18, "end_index": 21, "file_citation": { "file_id": "f2" } }
                ]
            } }]
        }))
        .unwrap();
        let names = Names(HashMap::from([("f1", "MSA_2023.txt"), ("f2", "SOW__1.txt")]));

        let mut out = Vec::new();
        StreamRenderer::new(temp_dir().join("mirror.py"))
            .handle(RunEvent::MessageDone(message), &mut out, &names)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("[0] MSA_2023.txt"));
        assert!(out.contains("[1] SOW__1.txt"));
    }

    #[tokio::test]
    async fn code_interpreter_input_is_mirrored_on_output() {
        let dir = temp_dir();
        let mirror = dir.join("code_interpreter").join("code_interpreter.py");
        let mut renderer = StreamRenderer::new(&mirror);
        let names = Names(HashMap::new());
        let mut out = Vec::new();

        let delta =
            |json: serde_json::Value| -> ToolCallDelta { serde_json::from_value(json).unwrap() };

        renderer
            .handle(RunEvent::ToolCallCreated(ToolKind::CodeInterpreter), &mut out, &names)
            .await
            .unwrap();
        for input in ["total = 120 * 95\n", "print(total)"] {
            renderer
                .handle(
                    RunEvent::ToolCallDelta(delta(serde_json::json!({
                        "index": 0, "type": "code_interpreter",
                        "code_interpreter": { "input": input }
                    }))),
                    &mut out,
                    &names,
                )
                .await
                .unwrap();
        }
        assert!(!mirror.exists());

        renderer
            .handle(
                RunEvent::ToolCallDelta(delta(serde_json::json!({
                    "index": 0, "type": "code_interpreter",
                    "code_interpreter": { "outputs": [{ "type": "logs", "logs": "11400" }] }
                }))),
                &mut out,
                &names,
            )
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&mirror).unwrap(),
            "total = 120 * 95\nprint(total)"
        );
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("code_interpreter"));
        assert!(out.contains("print(total)"));
        assert!(out.contains("output ›"));
        assert!(out.contains("11400"));

        // A new code interpreter call starts from an empty buffer.
        renderer
            .handle(RunEvent::ToolCallCreated(ToolKind::CodeInterpreter), &mut Vec::new(), &names)
            .await
            .unwrap();
        assert_eq!(renderer.code_buffer(), "");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn text_events_render_marker_and_deltas() {
        let names = Names(HashMap::new());
        let mut renderer = StreamRenderer::new(temp_dir().join("unused.py"));
        let mut out = Vec::new();

        for event in [
            RunEvent::TextCreated,
            RunEvent::TextDelta("Hel".into()),
            RunEvent::TextDelta("lo".into()),
        ] {
            renderer.handle(event, &mut out, &names).await.unwrap();
        }

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("\nassistant › "));
        assert!(out.contains("Hel"));
        assert!(out.contains("lo"));
    }
}
