//! Graph sources
//!
//! A provider fetches the raw DOT payload. `http://` and `https://`
//! locations go through `reqwest`, everything else is a local path.

use crate::common::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait GraphProvider: Send + Sync {
    /// Fetch the graph description. Empty payloads are an error.
    async fn provide(&self) -> Result<Vec<u8>>;

    /// Where the graph comes from, for logs
    fn location(&self) -> String;
}

/// Pick a provider from the shape of `location`.
pub fn provider_for(location: &str) -> Box<dyn GraphProvider> {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpGraphProvider::new(location))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Box::new(FileGraphProvider::new(path))
    }
}

fn non_empty(data: Vec<u8>, location: &str) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::GraphSource(format!(
            "no data retrieved from {}",
            location
        )));
    }
    tracing::info!("Graph data content size: {} bytes", data.len());
    Ok(data)
}

/// Downloads the graph over HTTP
pub struct HttpGraphProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpGraphProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GraphProvider for HttpGraphProvider {
    async fn provide(&self) -> Result<Vec<u8>> {
        tracing::info!("Fetching graph from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::GraphSource(format!("{}: {}", self.url, e)))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::GraphSource(format!("{}: {}", self.url, e)))?;
        non_empty(body.to_vec(), &self.url)
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Reads the graph from the local filesystem
pub struct FileGraphProvider {
    path: PathBuf,
}

impl FileGraphProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GraphProvider for FileGraphProvider {
    async fn provide(&self) -> Result<Vec<u8>> {
        tracing::info!("Reading graph from {}", self.path.display());
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::GraphSource(format!("{}: {}", self.path.display(), e)))?;
        non_empty(data, &self.path.display().to_string())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
