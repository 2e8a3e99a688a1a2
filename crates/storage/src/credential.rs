use std::sync::Arc;

use anyhow::{bail, Result};

use crate::kv::KeyValueStore;

pub const CREDENTIAL_KEY: &str = "generation_api_key";

/// The user's generation-service credential. Clearing it is the same as being
/// signed out of the service.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> Result<Option<String>> {
        let stored = self.kv.get(CREDENTIAL_KEY).await?;
        Ok(stored
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    pub async fn save(&self, credential: &str) -> Result<()> {
        let credential = credential.trim();
        if credential.is_empty() {
            bail!("credential must not be empty");
        }
        self.kv.set(CREDENTIAL_KEY, credential).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.remove(CREDENTIAL_KEY).await
    }
}
