//! Core domain types shared by the harvester and the assistant wrapper.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WikiPage
// ---------------------------------------------------------------------------

/// A page as listed by the wiki's child-page endpoint.
///
/// The storage-format body is fetched separately, on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiPage {
    /// Wiki content identifier.
    pub id: String,
    /// Page title, also the source of the summary file name.
    pub title: String,
    /// Parent page, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Citation
// ---------------------------------------------------------------------------

/// One citation extracted from a finished assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Position of the annotation in the message; also the `[n]` marker.
    pub index: usize,
    /// Provider file referenced by the annotation.
    pub file_id: String,
    /// Resolved file name, once looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.filename.as_deref().unwrap_or(&self.file_id);
        write!(f, "[{}] {}", self.index, name)
    }
}
