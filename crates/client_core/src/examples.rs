use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use shared::protocol::CreationDocument;
use storage::ExampleSource;
use tracing::{info, warn};

/// Fetches bundled example documents from a fixed list of URLs.
pub struct HttpExampleSource {
    http: Client,
    urls: Vec<String>,
}

impl HttpExampleSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self::with_http_client(Client::new(), urls)
    }

    pub fn with_http_client(http: Client, urls: Vec<String>) -> Self {
        Self { http, urls }
    }

    async fn fetch_one(&self, url: &str) -> Result<CreationDocument> {
        let document = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<CreationDocument>()
            .await?;
        Ok(document)
    }
}

#[async_trait]
impl ExampleSource for HttpExampleSource {
    async fn fetch_examples(&self) -> Vec<CreationDocument> {
        let results = join_all(self.urls.iter().map(|url| self.fetch_one(url))).await;

        let documents: Vec<CreationDocument> = results
            .into_iter()
            .zip(&self.urls)
            .filter_map(|(result, url)| match result {
                Ok(document) => Some(document),
                Err(err) => {
                    warn!("failed to fetch bundled example {url}: {err:#}");
                    None
                }
            })
            .collect();

        info!(
            "fetched {}/{} bundled examples",
            documents.len(),
            self.urls.len()
        );
        documents
    }
}
