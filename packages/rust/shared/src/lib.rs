//! Shared types, error model, and configuration for SowScribe.
//!
//! This crate is the foundation depended on by all other SowScribe crates.
//! It provides:
//! - [`SowscribeError`], the unified error type
//! - Domain types ([`WikiPage`], [`Citation`])
//! - Configuration ([`AppConfig`], the resolved runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssistantConfig, AssistantSection, HarvestConfig, HarvestSection, OpenAiConfig,
    OpenAiSection, WikiConfig, WikiSection, config_dir, config_file_path, init_config,
    load_config, load_config_from, read_secret,
};
pub use error::{Result, SowscribeError};
pub use types::{Citation, WikiPage};
