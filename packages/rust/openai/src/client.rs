//! HTTP plumbing shared by every endpoint group.

use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use sowscribe_shared::{OpenAiConfig, Result, SowscribeError};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("SowScribe/", env!("CARGO_PKG_VERSION"));

/// Header opting into the v2 assistants API.
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Authenticated client for the hosted LLM provider.
///
/// Endpoint groups live in sibling modules as further `impl OpenAiClient` blocks.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    pub(crate) config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a client for the configured provider.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SowscribeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Default model from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(reqwest::Method::GET, path), path).await?;
        read_json(response, path).await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .send(self.request(reqwest::Method::POST, path).json(body), path)
            .await?;
        read_json(response, path).await
    }

    /// Send a request and turn non-success statuses into [`SowscribeError::Api`].
    pub(crate) async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        debug!(path, "provider request");
        let response = request
            .send()
            .await
            .map_err(|e| SowscribeError::Network(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SowscribeError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| SowscribeError::Network(format!("{path}: failed to read body: {e}")))?;

    serde_json::from_str(&body)
        .map_err(|e| SowscribeError::parse(format!("{path}: unexpected response shape: {e}")))
}

/// Pull `error.message` out of a provider error body, or fall back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_provider_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
