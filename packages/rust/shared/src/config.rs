//! Application configuration for SowScribe.
//!
//! User config lives at `~/.sowscribe/sowscribe.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SowscribeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sowscribe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sowscribe";

// ---------------------------------------------------------------------------
// Config structs (matching sowscribe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Wiki connection settings.
    #[serde(default)]
    pub wiki: WikiSection,

    /// LLM provider settings.
    #[serde(default)]
    pub openai: OpenAiSection,

    /// Harvester settings.
    #[serde(default)]
    pub harvest: HarvestSection,

    /// Assistant wrapper settings.
    #[serde(default)]
    pub assistant: AssistantSection,
}

/// `[wiki]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSection {
    /// Base URL of the Confluence instance.
    #[serde(default = "default_wiki_base_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer token.
    #[serde(default = "default_wiki_token_env")]
    pub token_env: String,
}

impl Default for WikiSection {
    fn default() -> Self {
        Self {
            base_url: default_wiki_base_url(),
            token_env: default_wiki_token_env(),
        }
    }
}

fn default_wiki_base_url() -> String {
    "https://codex.example.com".into()
}
fn default_wiki_token_env() -> String {
    "SOWSCRIBE_WIKI_TOKEN".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSection {
    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL (including the version segment).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for summaries and new assistants.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openai_base_url(),
            model: default_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    /// Root page whose children are harvested. Empty means "must be given on the CLI".
    #[serde(default)]
    pub parent_page_id: String,

    /// Directory receiving one summary file per page.
    #[serde(default = "default_documents_dir")]
    pub output_dir: String,

    /// Upper bound on listed child pages.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            parent_page_id: String::new(),
            output_dir: default_documents_dir(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_documents_dir() -> String {
    "sows".into()
}
fn default_max_pages() -> usize {
    300
}

/// `[assistant]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSection {
    /// Directory whose files are indexed into a new vector store.
    #[serde(default = "default_documents_dir")]
    pub source_dir: String,

    /// Where code sent to the code interpreter is mirrored.
    #[serde(default = "default_code_mirror_path")]
    pub code_mirror_path: String,

    /// Instructions attached to every streamed run.
    #[serde(default = "default_run_instructions")]
    pub run_instructions: String,

    /// Vector store expiry, in days after last activity.
    #[serde(default = "default_expiry_days")]
    pub vector_store_expiry_days: u32,

    /// Delay between file batch status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            source_dir: default_documents_dir(),
            code_mirror_path: default_code_mirror_path(),
            run_instructions: default_run_instructions(),
            vector_store_expiry_days: default_expiry_days(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_code_mirror_path() -> String {
    "code_interpreter/code_interpreter.py".into()
}
fn default_run_instructions() -> String {
    "You are an intelligent assistant".into()
}
fn default_expiry_days() -> u32 {
    7
}
fn default_poll_interval_ms() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Runtime configs (resolved from config file + env + CLI flags)
// ---------------------------------------------------------------------------

/// Resolved wiki connection passed to the wiki client.
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// Base URL, e.g. `https://codex.example.com`.
    pub base_url: Url,
    /// Bearer token.
    pub token: String,
}

impl WikiConfig {
    /// Build from a base URL string and a token.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            SowscribeError::config(format!("invalid wiki base URL '{base_url}': {e}"))
        })?;
        Ok(Self {
            base_url,
            token: token.into(),
        })
    }

    /// Resolve from the `[wiki]` section, reading the token from its env var.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let token = read_secret(&config.wiki.token_env, "wiki bearer token")?;
        Self::new(&config.wiki.base_url, token)
    }
}

/// Resolved LLM provider connection.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL without a trailing slash.
    pub base_url: String,
    /// API key.
    pub api_key: String,
    /// Default model id.
    pub model: String,
}

impl OpenAiConfig {
    /// Build from explicit values.
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Resolve from the `[openai]` section, reading the key from its env var.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let api_key = read_secret(&config.openai.api_key_env, "OpenAI API key")?;
        Ok(Self::new(
            &config.openai.base_url,
            api_key,
            config.openai.model.clone(),
        ))
    }
}

/// Runtime harvester configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root page id whose children are harvested.
    pub parent_page_id: String,
    /// Output directory for summary files.
    pub output_dir: PathBuf,
    /// Listing cap.
    pub max_pages: usize,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            parent_page_id: config.harvest.parent_page_id.clone(),
            output_dir: PathBuf::from(&config.harvest.output_dir),
            max_pages: config.harvest.max_pages,
        }
    }
}

/// Runtime assistant wrapper configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Model for newly created assistants.
    pub model: String,
    /// Directory indexed into a fresh vector store.
    pub source_dir: PathBuf,
    /// Code interpreter mirror file.
    pub code_mirror_path: PathBuf,
    /// Per-run instructions.
    pub run_instructions: String,
    /// Vector store expiry in days.
    pub vector_store_expiry_days: u32,
    /// File batch poll interval in ms.
    pub poll_interval_ms: u64,
}

impl From<&AppConfig> for AssistantConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.openai.model.clone(),
            source_dir: PathBuf::from(&config.assistant.source_dir),
            code_mirror_path: PathBuf::from(&config.assistant.code_mirror_path),
            run_instructions: config.assistant.run_instructions.clone(),
            vector_store_expiry_days: config.assistant.vector_store_expiry_days,
            poll_interval_ms: config.assistant.poll_interval_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sowscribe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SowscribeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sowscribe/sowscribe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SowscribeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SowscribeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SowscribeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SowscribeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SowscribeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty secret from the named env var.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SowscribeError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("SOWSCRIBE_WIKI_TOKEN"));
        assert!(toml_str.contains("max_pages = 300"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let toml_str = r#"
[wiki]
base_url = "https://wiki.internal.example"

[harvest]
parent_page_id = "123456"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.wiki.base_url, "https://wiki.internal.example");
        assert_eq!(config.wiki.token_env, "SOWSCRIBE_WIKI_TOKEN");
        assert_eq!(config.harvest.parent_page_id, "123456");
        assert_eq!(config.harvest.output_dir, "sows");
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.assistant.vector_store_expiry_days, 7);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let harvest = HarvestConfig::from(&app);
        assert_eq!(harvest.max_pages, 300);
        assert_eq!(harvest.output_dir, PathBuf::from("sows"));

        let assistant = AssistantConfig::from(&app);
        assert_eq!(assistant.model, "gpt-4o");
        assert_eq!(
            assistant.code_mirror_path,
            PathBuf::from("code_interpreter/code_interpreter.py")
        );
        assert_eq!(assistant.run_instructions, "You are an intelligent assistant");
    }

    #[test]
    fn openai_config_trims_trailing_slash() {
        let config = OpenAiConfig::new("http://127.0.0.1:9000/v1/", "sk-test", "gpt-4o");
        assert_eq!(config.base_url, "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn wiki_config_rejects_bad_url() {
        let result = WikiConfig::new("not a url", "token");
        assert!(result.is_err());
    }

    #[test]
    fn missing_secret_names_the_variable() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.wiki.token_env = "SOWSCRIBE_TEST_NONEXISTENT_TOKEN_98765".into();
        let err = WikiConfig::from_app(&config).unwrap_err();
        assert!(err.to_string().contains("SOWSCRIBE_TEST_NONEXISTENT_TOKEN_98765"));
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!(
            "sowscribe-config-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sowscribe.toml");
        std::fs::write(&path, "[openai]\nmodel = \"gpt-4o-mini\"\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.openai.model, "gpt-4o-mini");

        std::fs::write(&path, "[openai\nmodel = ").unwrap();
        assert!(load_config_from(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
