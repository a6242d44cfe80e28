//! `harvest` pipeline: list child pages → fetch → extract text → summarize → store.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use sowscribe_shared::{HarvestConfig, Result, SowscribeError, WikiPage};
use sowscribe_wiki::WikiClient;

use crate::store::{SaveOutcome, SummaryStore};
use crate::summarizer::Summarizer;

/// Result of one harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Child pages returned by the listing (after the cap).
    pub pages_listed: usize,
    /// Summary files created by this run.
    pub written: usize,
    /// Pages whose summary file already existed.
    pub skipped_existing: usize,
    /// Pages whose summarization failed and were stored empty.
    pub summaries_failed: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// What happened to a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Written,
    SkippedExisting,
    SummaryFailed,
}

/// Progress callback for reporting harvest status.
pub trait HarvestProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a page is processed.
    fn page_started(&self, title: &str, current: usize, total: usize);
    /// Called after a page is processed.
    fn page_finished(&self, title: &str, outcome: PageOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl HarvestProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_started(&self, _title: &str, _current: usize, _total: usize) {}
    fn page_finished(&self, _title: &str, _outcome: PageOutcome) {}
}

/// Harvest every child page of `config.parent_page_id` into `config.output_dir`.
///
/// Pages with an existing summary file are skipped before any provider call.
/// Wiki errors abort the run; summarization errors only leave an empty file.
#[instrument(skip_all, fields(parent = %config.parent_page_id, out = %config.output_dir.display()))]
pub async fn harvest(
    config: &HarvestConfig,
    wiki: &WikiClient,
    summarizer: &Summarizer,
    progress: &dyn HarvestProgress,
) -> Result<HarvestReport> {
    let start = Instant::now();

    if config.parent_page_id.trim().is_empty() {
        return Err(SowscribeError::validation(
            "no parent page id given; set [harvest].parent_page_id or pass --parent",
        ));
    }

    let store = SummaryStore::open(&config.output_dir)?;

    progress.phase("Listing child pages");
    let pages = wiki
        .list_child_pages(&config.parent_page_id, config.max_pages)
        .await?;

    progress.phase("Summarizing pages");
    let mut report = HarvestReport {
        pages_listed: pages.len(),
        ..HarvestReport::default()
    };

    let total = pages.len();
    for (i, page) in pages.iter().enumerate() {
        progress.page_started(&page.title, i + 1, total);
        let outcome = harvest_page(page, wiki, summarizer, &store).await?;
        match outcome {
            PageOutcome::Written => report.written += 1,
            PageOutcome::SkippedExisting => report.skipped_existing += 1,
            PageOutcome::SummaryFailed => {
                report.written += 1;
                report.summaries_failed += 1;
            }
        }
        progress.page_finished(&page.title, outcome);
    }

    report.elapsed = start.elapsed();
    info!(
        pages = report.pages_listed,
        written = report.written,
        skipped = report.skipped_existing,
        failed = report.summaries_failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "harvest complete"
    );

    Ok(report)
}

async fn harvest_page(
    page: &WikiPage,
    wiki: &WikiClient,
    summarizer: &Summarizer,
    store: &SummaryStore,
) -> Result<PageOutcome> {
    // Checked before the paid call; `save` re-checks atomically.
    if store.exists(&page.title) {
        info!(
            path = %store.path_for(&page.title).display(),
            "summary already exists, skipping provider request"
        );
        return Ok(PageOutcome::SkippedExisting);
    }

    let markup = wiki.fetch_storage_format(&page.id).await?;
    let text = sowscribe_text::extract_text(&markup);

    let (summary, failed) = match summarizer.summarize(&text).await {
        Some(summary) => (summary, false),
        None => (String::new(), true),
    };

    match store.save(&page.title, &summary)? {
        SaveOutcome::Saved(_) if failed => Ok(PageOutcome::SummaryFailed),
        SaveOutcome::Saved(_) => Ok(PageOutcome::Written),
        SaveOutcome::AlreadyExists(path) => {
            warn!(path = %path.display(), "summary appeared while summarizing, kept existing file");
            Ok(PageOutcome::SkippedExisting)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use sowscribe_openai::OpenAiClient;
    use sowscribe_shared::{OpenAiConfig, WikiConfig};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sowscribe-harvest-test-{}", uuid::Uuid::now_v7()))
    }

    fn config(out: &Path) -> HarvestConfig {
        HarvestConfig {
            parent_page_id: "100".into(),
            output_dir: out.to_path_buf(),
            max_pages: 300,
        }
    }

    fn clients(server: &MockServer) -> (WikiClient, Summarizer) {
        let wiki = WikiClient::new(WikiConfig::new(&server.uri(), "wiki-token").unwrap()).unwrap();
        let openai =
            OpenAiClient::new(OpenAiConfig::new(&server.uri(), "sk-test", "gpt-4o")).unwrap();
        (wiki, Summarizer::new(openai))
    }

    async fn mount_wiki(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/rest/api/content/100/child/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "id": "1", "title": "MSA 2023" },
                    { "id": "2", "title": "SOW #1" },
                    { "id": "3", "title": "SOW #1" }
                ],
                "_links": {}
            })))
            .mount(server)
            .await;

        for id in ["1", "2", "3"] {
            Mock::given(method("GET"))
                .and(path(format!("/rest/api/content/{id}")))
                .and(query_param("expand", "body.storage"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": id,
                    "body": { "storage": { "value": format!("<p>Customer: ACME {id}</p>") } }
                })))
                .mount(server)
                .await;
        }
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        }))
    }

    #[derive(Default)]
    struct RecordingProgress {
        outcomes: Mutex<Vec<(String, PageOutcome)>>,
    }

    impl HarvestProgress for RecordingProgress {
        fn phase(&self, _name: &str) {}
        fn page_started(&self, _title: &str, _current: usize, _total: usize) {}
        fn page_finished(&self, title: &str, outcome: PageOutcome) {
            self.outcomes.lock().unwrap().push((title.to_string(), outcome));
        }
    }

    #[tokio::test]
    async fn duplicate_titles_are_harvested_once() {
        let server = MockServer::start().await;
        mount_wiki(&server).await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("- Customer: ACME"))
            .expect(2)
            .mount(&server)
            .await;

        let out = temp_dir();
        let (wiki, summarizer) = clients(&server);
        let progress = RecordingProgress::default();

        let report = harvest(&config(&out), &wiki, &summarizer, &progress)
            .await
            .unwrap();

        assert_eq!(report.pages_listed, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.summaries_failed, 0);

        let mut files: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        assert_eq!(files, ["MSA_2023.txt", "SOW__1.txt"]);

        let outcomes = progress.outcomes.lock().unwrap();
        assert_eq!(outcomes[2], ("SOW #1".to_string(), PageOutcome::SkippedExisting));

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn second_run_makes_no_provider_calls() {
        let out = temp_dir();

        let first = MockServer::start().await;
        mount_wiki(&first).await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("- Customer: ACME"))
            .mount(&first)
            .await;
        let (wiki, summarizer) = clients(&first);
        harvest(&config(&out), &wiki, &summarizer, &SilentProgress)
            .await
            .unwrap();
        let before = std::fs::read_to_string(out.join("MSA_2023.txt")).unwrap();

        let second = MockServer::start().await;
        mount_wiki(&second).await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("changed"))
            .expect(0)
            .mount(&second)
            .await;
        let (wiki, summarizer) = clients(&second);
        let report = harvest(&config(&out), &wiki, &summarizer, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.written, 0);
        assert_eq!(report.skipped_existing, 3);
        assert_eq!(std::fs::read_to_string(out.join("MSA_2023.txt")).unwrap(), before);

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn failed_summary_leaves_empty_file() {
        let server = MockServer::start().await;
        mount_wiki(&server).await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let out = temp_dir();
        let (wiki, summarizer) = clients(&server);
        let report = harvest(&config(&out), &wiki, &summarizer, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.summaries_failed, 2);
        assert_eq!(std::fs::read_to_string(out.join("SOW__1.txt")).unwrap(), "");

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn listing_error_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/100/child/page"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let out = temp_dir();
        let (wiki, summarizer) = clients(&server);
        let err = harvest(&config(&out), &wiki, &summarizer, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SowscribeError::Api { status: 401, .. }));

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn blank_parent_is_rejected() {
        let server = MockServer::start().await;
        let out = temp_dir();
        let (wiki, summarizer) = clients(&server);
        let mut cfg = config(&out);
        cfg.parent_page_id = "  ".into();

        let err = harvest(&cfg, &wiki, &summarizer, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SowscribeError::Validation { .. }));
    }
}
