use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on the number of creations kept in history.
pub const MAX_HISTORY: usize = 30;

const DEFAULT_CREATION_NAME: &str = "Demo Creation";
const MAX_PROMPT_NAME_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreationId(pub String);

impl CreationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CreationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CreationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CreationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A generated interactive artifact together with the input it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creation {
    pub id: CreationId,
    pub name: String,
    pub html: String,
    /// Source image or PDF as a `data:` URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Creation {
    pub fn new(
        name: impl Into<String>,
        html: impl Into<String>,
        original_image: Option<String>,
    ) -> Self {
        Self {
            id: CreationId::generate(),
            name: name.into(),
            html: html.into(),
            original_image,
            timestamp: Utc::now(),
        }
    }

    /// Builds the next version of this creation. The receiver is left untouched;
    /// the revision gets its own id and timestamp.
    pub fn revised(&self, html: impl Into<String>) -> Self {
        Self {
            id: CreationId::generate(),
            name: next_version_name(&self.name),
            html: html.into(),
            original_image: self.original_image.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// `"X"` -> `"X (v2)"`, `"X (v2)"` -> `"X (v3)"`.
pub fn next_version_name(name: &str) -> String {
    if let Some((base, version)) = split_version_suffix(name) {
        return format!("{base} (v{})", version.saturating_add(1));
    }
    format!("{name} (v2)")
}

fn split_version_suffix(name: &str) -> Option<(&str, u32)> {
    let inner = name.strip_suffix(')')?;
    let open = inner.rfind(" (v")?;
    let digits = &inner[open + 3..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let version = digits.parse::<u32>().ok()?;
    Some((&name[..open], version))
}

/// Label for a fresh generation: the file stem when a file was uploaded,
/// otherwise the head of the prompt.
pub fn default_creation_name(file_name: Option<&str>, prompt: &str) -> String {
    if let Some(stem) = file_name
        .map(file_stem)
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
    {
        return stem.to_string();
    }

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return DEFAULT_CREATION_NAME.to_string();
    }

    let head: String = prompt.chars().take(MAX_PROMPT_NAME_CHARS).collect();
    head.trim_end().to_string()
}

fn file_stem(file_name: &str) -> &str {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    }
}
