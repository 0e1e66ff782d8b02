// ABOUTME: Serde data models for Penzu API responses and the JSON checkpoint
// ABOUTME: Tolerant parsing with optional fields and numeric-or-string ids

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ids arrive as JSON numbers from some endpoints and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{}", n),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: RemoteId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub plaintext_body: Option<String>,
    #[serde(default)]
    pub richtext_body: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: RemoteId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousEntry {
    pub entry: EntryRef,
}

/// One response of the paginated entry endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPage {
    pub entry: RemoteEntry,
    #[serde(default)]
    pub previous: Option<Vec<PreviousEntry>>,
}

impl EntryPage {
    /// Most recent predecessor; the rest of the window is ignored.
    pub fn predecessor(&self) -> Option<String> {
        self.previous
            .as_ref()
            .and_then(|prev| prev.first())
            .map(|p| p.entry.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalInfo {
    #[serde(default)]
    pub journal: Option<JournalDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalDetails {
    #[serde(default)]
    pub last_entry_id: Option<RemoteId>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// A downloaded image, `path` relative to the export directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub filename: String,
    pub path: String,
}

/// Checkpoint record for one journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub plaintext: String,
    #[serde(default)]
    pub richtext_body: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl From<&RemoteEntry> for Entry {
    fn from(remote: &RemoteEntry) -> Self {
        let content = non_empty(&remote.content)
            .or_else(|| non_empty(&remote.plaintext_body))
            .or_else(|| non_empty(&remote.richtext_body))
            .unwrap_or_default()
            .to_string();

        Entry {
            id: remote.id.to_string(),
            title: non_empty(&remote.title).unwrap_or("Untitled").to_string(),
            content,
            plaintext: remote.plaintext_body.clone().unwrap_or_default(),
            richtext_body: remote.richtext_body.clone().unwrap_or_default(),
            created_at: remote.created_at.clone(),
            updated_at: non_empty(&remote.modified_at)
                .or_else(|| non_empty(&remote.updated_at))
                .map(str::to_string),
            images: Vec::new(),
        }
    }
}
