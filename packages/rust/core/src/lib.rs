//! Workflows for SowScribe.
//!
//! - [`harvest`]: wiki child pages → plain text → contract summary files.
//! - [`session`]: interactive assistant chat over the harvested files,
//!   rendered by [`render`] through a [`console::Console`].

pub mod console;
pub mod harvest;
pub mod render;
pub mod session;
pub mod store;
pub mod summarizer;

pub use console::Console;
pub use harvest::{HarvestProgress, HarvestReport, PageOutcome, SilentProgress, harvest};
pub use render::{FileResolver, StreamRenderer, render_run, substitute_citations};
pub use session::AssistantSession;
pub use store::{SaveOutcome, SummaryStore, sanitize_title};
pub use summarizer::Summarizer;
