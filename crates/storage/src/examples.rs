use std::collections::HashMap;

use async_trait::async_trait;
use shared::protocol::CreationDocument;

/// Supplies the bundled example documents shown when history is empty.
#[async_trait]
pub trait ExampleSource: Send + Sync {
    /// Documents that could not be fetched are left out rather than reported.
    async fn fetch_examples(&self) -> Vec<CreationDocument>;
}

pub struct NoExamples;

#[async_trait]
impl ExampleSource for NoExamples {
    async fn fetch_examples(&self) -> Vec<CreationDocument> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticExampleSource {
    documents: Vec<CreationDocument>,
}

impl StaticExampleSource {
    pub fn new(documents: Vec<CreationDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ExampleSource for StaticExampleSource {
    async fn fetch_examples(&self) -> Vec<CreationDocument> {
        self.documents.clone()
    }
}

/// Maps bundled example names to their display names. Names without an entry
/// are shown as-is.
#[derive(Debug, Clone, Default)]
pub struct NameLocalizer {
    names: HashMap<String, String>,
}

impl NameLocalizer {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn localize(&self, name: &str) -> String {
        self.names
            .get(name.trim())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

impl FromIterator<(String, String)> for NameLocalizer {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
