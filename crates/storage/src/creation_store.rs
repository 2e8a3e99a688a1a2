use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use shared::{
    domain::{Creation, CreationId, MAX_HISTORY},
    protocol::{CreationDocument, DocumentError},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    examples::{ExampleSource, NameLocalizer},
    kv::KeyValueStore,
};

pub const HISTORY_KEY: &str = "creation_history";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("invalid creation document: {0}")]
    InvalidFormat(#[from] DocumentError),
}

/// Bounded, newest-first history of creations.
///
/// Every mutating call finishes its read-modify-write-persist cycle before it
/// returns. A failed write is logged and the in-memory collection stays
/// authoritative for the rest of the session.
pub struct CreationStore {
    kv: Arc<dyn KeyValueStore>,
    creations: Vec<Creation>,
}

impl CreationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            creations: Vec::new(),
        }
    }

    /// Loads persisted history, falling back to the bundled examples when there
    /// is none. The fallback collection is not written back.
    pub async fn initialize(
        &mut self,
        examples: &dyn ExampleSource,
        localizer: &NameLocalizer,
    ) -> &[Creation] {
        if let Some(mut persisted) = self.load_persisted().await {
            if !persisted.is_empty() {
                dedupe_by_id(&mut persisted);
                persisted.truncate(MAX_HISTORY);
                info!("loaded {} creations from local history", persisted.len());
                self.creations = persisted;
                return &self.creations;
            }
        }

        let mut bootstrap: Vec<Creation> = examples
            .fetch_examples()
            .await
            .into_iter()
            .filter_map(|mut document| {
                document.name = document.name.map(|name| localizer.localize(&name));
                match document.into_creation() {
                    Ok(creation) => Some(creation),
                    Err(err) => {
                        warn!("skipping bundled example: {err}");
                        None
                    }
                }
            })
            .collect();
        dedupe_by_id(&mut bootstrap);
        bootstrap.truncate(MAX_HISTORY);
        info!(
            "history empty; bootstrapped {} bundled examples",
            bootstrap.len()
        );

        self.creations = bootstrap;
        &self.creations
    }

    pub fn list(&self) -> &[Creation] {
        &self.creations
    }

    pub fn get(&self, id: &CreationId) -> Option<&Creation> {
        self.creations.iter().find(|creation| &creation.id == id)
    }

    pub fn contains(&self, id: &CreationId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.creations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creations.is_empty()
    }

    /// Puts `record` at the head and evicts from the tail past the cap. A record
    /// whose id is already present moves to the head instead of duplicating.
    pub async fn add(&mut self, record: Creation) -> &[Creation] {
        self.creations.retain(|existing| existing.id != record.id);
        self.creations.insert(0, record);
        if self.creations.len() > MAX_HISTORY {
            let evicted = self.creations.len() - MAX_HISTORY;
            self.creations.truncate(MAX_HISTORY);
            debug!("evicted {evicted} oldest creations from history");
        }
        self.persist().await;
        &self.creations
    }

    pub async fn remove(&mut self, id: &CreationId) -> &[Creation] {
        let before = self.creations.len();
        self.creations.retain(|creation| &creation.id != id);
        if self.creations.len() != before {
            self.persist().await;
        }
        &self.creations
    }

    /// Decodes and validates an exported document. A record whose id is already
    /// in history leaves the collection untouched but is still returned.
    pub async fn import(&mut self, raw_json: &str) -> Result<Creation, ImportError> {
        let creation = CreationDocument::from_json(raw_json)?.into_creation()?;

        if self.contains(&creation.id) {
            info!(
                "imported creation {} already in history; not duplicating",
                creation.id
            );
            return Ok(creation);
        }

        self.add(creation.clone()).await;
        Ok(creation)
    }

    /// Serializes through the same document shape `import` reads.
    pub fn export(record: &Creation) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&CreationDocument::from(record))
            .with_context(|| format!("failed to serialize creation {}", record.id))
    }

    /// Filesystem-safe download name for an exported record.
    pub fn export_file_name(record: &Creation) -> String {
        let stem: String = record
            .name
            .trim()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = stem.trim_matches('_');
        if stem.is_empty() {
            format!("creation-{}.json", record.id)
        } else {
            format!("{stem}.json")
        }
    }

    async fn load_persisted(&self) -> Option<Vec<Creation>> {
        let raw = match self.kv.get(HISTORY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("failed to read creation history; treating as empty: {err:#}");
                return None;
            }
        };

        match serde_json::from_str::<Vec<Creation>>(&raw) {
            Ok(creations) => Some(creations),
            Err(err) => {
                warn!("stored creation history is unreadable; treating as empty: {err}");
                None
            }
        }
    }

    async fn persist(&self) {
        if let Err(err) = self.write_through().await {
            warn!("failed to persist creation history; keeping in-memory copy: {err:#}");
        }
    }

    async fn write_through(&self) -> Result<()> {
        if self.creations.is_empty() {
            return self.kv.remove(HISTORY_KEY).await;
        }
        let serialized =
            serde_json::to_string(&self.creations).context("failed to serialize history")?;
        self.kv.set(HISTORY_KEY, &serialized).await
    }
}

fn dedupe_by_id(creations: &mut Vec<Creation>) {
    let mut seen = HashSet::new();
    creations.retain(|creation| seen.insert(creation.id.clone()));
}

#[cfg(test)]
#[path = "tests/creation_store_tests.rs"]
mod tests;
