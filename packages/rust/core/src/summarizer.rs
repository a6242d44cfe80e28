//! Contract summaries via a deterministic chat completion.

use tracing::{error, instrument};

use sowscribe_openai::{ChatMessage, ChatRequest, OpenAiClient};

/// Instruction listing the contract fields to extract.
pub const SUMMARY_PROMPT: &str = "Read this page and provide me the details of the contract. Should have: \n\n\
- Customer \n \
- VDX Number and the status of the VDX \n \
- Project Type: Ex: ITSM Solution Design, Service Now to JSM Migration (please mention multiple, if it applies) \n \
- Hours \n \
- Year \n \
- Costs \n \
- Term Length \n \
- Client Responsibilities \n \
- In Scope and Out of Scope \n\
- Total FTE \n \
- Scope Type: LOE (Level of Effort), Time and Materials, Fixed Scope or anything else \n \
- Deliverables (list) \n\n \
Just give me the data. Don't write anything else";

/// Asks the model for the structured contract summary of one page.
#[derive(Debug, Clone)]
pub struct Summarizer {
    client: OpenAiClient,
    model: String,
}

impl Summarizer {
    pub fn new(client: OpenAiClient) -> Self {
        let model = client.model().to_string();
        Self { client, model }
    }

    /// The three-message conversation sent for `text`.
    pub fn request_for(&self, text: &str) -> ChatRequest {
        ChatRequest::deterministic(
            self.model.clone(),
            vec![
                ChatMessage::user(SUMMARY_PROMPT),
                ChatMessage::assistant("Ok"),
                ChatMessage::user(text),
            ],
        )
    }

    /// Summarize `text`. Provider failures are logged and yield `None`.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn summarize(&self, text: &str) -> Option<String> {
        match self.client.chat_completion(&self.request_for(text)).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "summarization failed");
                None
            }
        }
    }
}
