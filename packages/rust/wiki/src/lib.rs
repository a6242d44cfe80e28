//! Confluence REST client used by the harvester.
//!
//! Two endpoints are needed: the paginated child-page listing of a root page,
//! and the storage-format body of a single page. Every request carries the
//! bearer token from [`WikiConfig`]. Failures here are not recovered locally;
//! they propagate and end the harvest.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use sowscribe_shared::{Result, SowscribeError, WikiConfig, WikiPage};

/// User-Agent string for wiki requests.
const USER_AGENT: &str = concat!("SowScribe/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One page of `GET /rest/api/content/{id}/child/page`.
#[derive(Debug, Deserialize)]
struct ChildPageListing {
    results: Vec<ContentSummary>,
    #[serde(rename = "_links", default)]
    links: ListingLinks,
}

#[derive(Debug, Default, Deserialize)]
struct ListingLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentSummary {
    id: String,
    title: String,
}

/// `GET /rest/api/content/{id}?expand=body.storage`.
#[derive(Debug, Deserialize)]
struct ContentWithBody {
    body: ContentBody,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    storage: StorageValue,
}

#[derive(Debug, Deserialize)]
struct StorageValue {
    value: String,
}

// ---------------------------------------------------------------------------
// WikiClient
// ---------------------------------------------------------------------------

/// Authenticated client for one wiki instance.
#[derive(Debug, Clone)]
pub struct WikiClient {
    config: WikiConfig,
    client: Client,
}

impl WikiClient {
    /// Create a client for the configured wiki.
    pub fn new(config: WikiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| SowscribeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// List the child pages of `parent_id`, following `_links.next` until the
    /// listing ends or `max_pages` entries have been collected.
    ///
    /// The returned list never holds more than `max_pages` entries.
    #[instrument(skip(self), fields(base = %self.config.base_url))]
    pub async fn list_child_pages(
        &self,
        parent_id: &str,
        max_pages: usize,
    ) -> Result<Vec<WikiPage>> {
        let mut next_url = Some(self.api_url(&format!("/rest/api/content/{parent_id}/child/page")));
        let mut pages: Vec<WikiPage> = Vec::new();

        while let Some(url) = next_url.take() {
            if pages.len() >= max_pages {
                break;
            }

            debug!(%url, fetched = pages.len(), "fetching child page listing");
            let listing: ChildPageListing = self.get_json(&url).await?;

            pages.extend(listing.results.into_iter().map(|c| WikiPage {
                id: c.id,
                title: c.title,
                parent_id: Some(parent_id.to_string()),
            }));

            next_url = listing.links.next.map(|next| self.resolve_link(&next));
        }

        pages.truncate(max_pages);
        info!(count = pages.len(), "total child pages fetched");
        Ok(pages)
    }

    /// Fetch the raw storage-format markup of a page.
    #[instrument(skip(self))]
    pub async fn fetch_storage_format(&self, page_id: &str) -> Result<String> {
        let url = self.api_url(&format!("/rest/api/content/{page_id}?expand=body.storage"));
        let content: ContentWithBody = self.get_json(&url).await?;
        Ok(content.body.storage.value)
    }

    /// Join an absolute API path onto the base URL, keeping any context path.
    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.as_str().trim_end_matches('/'))
    }

    /// `next` links come back relative to the base URL.
    fn resolve_link(&self, link: &str) -> String {
        if link.starts_with("http") {
            link.to_string()
        } else {
            self.api_url(link)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| SowscribeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(api_error(status, url, &message));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SowscribeError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_str(&body)
            .map_err(|e| SowscribeError::parse(format!("{url}: unexpected response shape: {e}")))
    }
}

fn api_error(status: StatusCode, url: &str, body: &str) -> SowscribeError {
    let detail = if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.chars().take(200).collect()
    };
    SowscribeError::Api {
        status: status.as_u16(),
        message: format!("{url}: {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WikiClient {
        let config = WikiConfig::new(&server.uri(), "test-token").unwrap();
        WikiClient::new(config).unwrap()
    }

    fn listing(ids: &[(&str, &str)], next: Option<&str>) -> serde_json::Value {
        let results: Vec<_> = ids
            .iter()
            .map(|(id, title)| serde_json::json!({ "id": id, "type": "page", "title": title }))
            .collect();
        let mut links = serde_json::json!({ "base": "https://codex.example.com", "context": "" });
        if let Some(next) = next {
            links["next"] = serde_json::Value::String(next.to_string());
        }
        serde_json::json!({ "results": results, "start": 0, "size": ids.len(), "_links": links })
    }

    #[tokio::test]
    async fn follows_relative_next_links() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/100/child/page"))
            .and(query_param_is_missing("start"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(
                &[("1", "MSA 2023"), ("2", "SOW #1")],
                Some("/rest/api/content/100/child/page?start=2"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/100/child/page"))
            .and(query_param("start", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(listing(&[("3", "SOW #2")], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pages = client_for(&server).list_child_pages("100", 300).await.unwrap();

        let titles: Vec<_> = pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["MSA 2023", "SOW #1", "SOW #2"]);
        assert!(pages.iter().all(|p| p.parent_id.as_deref() == Some("100")));
    }

    #[tokio::test]
    async fn stops_at_cap_and_truncates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/7/child/page"))
            .and(query_param_is_missing("start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(
                &[("1", "a"), ("2", "b"), ("3", "c")],
                Some("/rest/api/content/7/child/page?start=3"),
            )))
            .mount(&server)
            .await;

        // The cap is reached after the first listing page, so this is never requested.
        Mock::given(method("GET"))
            .and(path("/rest/api/content/7/child/page"))
            .and(query_param("start", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("4", "d")], None)))
            .expect(0)
            .mount(&server)
            .await;

        let pages = client_for(&server).list_child_pages("7", 2).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].id, "2");
    }

    #[tokio::test]
    async fn follows_absolute_next_links() {
        let server = MockServer::start().await;
        let absolute = format!("{}/rest/api/content/5/child/page?start=1", server.uri());

        Mock::given(method("GET"))
            .and(path("/rest/api/content/5/child/page"))
            .and(query_param_is_missing("start"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(listing(&[("1", "a")], Some(&absolute))),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/5/child/page"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("2", "b")], None)))
            .mount(&server)
            .await;

        let pages = client_for(&server).list_child_pages("5", 10).await.unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn listing_error_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/9/child/page"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_child_pages("9", 10).await.unwrap_err();
        match err {
            SowscribeError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Unauthorized"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetches_storage_format_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .and(query_param("expand", "body.storage"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "42",
                "title": "SOW #1",
                "body": { "storage": { "value": "<p>Customer: ACME</p>", "representation": "storage" } }
            })))
            .mount(&server)
            .await;

        let body = client_for(&server).fetch_storage_format("42").await.unwrap();
        assert_eq!(body, "<p>Customer: ACME</p>");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content/43"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "43" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_storage_format("43").await.unwrap_err();
        assert!(matches!(err, SowscribeError::Parse { .. }));
    }
}
