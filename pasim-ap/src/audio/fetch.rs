//! Announcement resource fetching
//!
//! Resource ids are either `http(s)://` URLs or filesystem paths. The
//! [`RoutingFetcher`] picks the backend per id so a catalog can mix both.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("pasim/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Retrieves the encoded bytes of an audio resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, resource: &str) -> Result<Vec<u8>>;
}

/// File extension of a resource id, used as the decoder format hint.
pub fn resource_extension(resource: &str) -> Option<&str> {
    let name = resource.rsplit('/').next().unwrap_or(resource);
    let name = name.split(['?', '#']).next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

fn is_url(resource: &str) -> bool {
    resource.starts_with("http://") || resource.starts_with("https://")
}

/// Reads resources from the local filesystem.
///
/// Relative ids are resolved against `root` when one is set.
#[derive(Debug, Default, Clone)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, resource: &str) -> PathBuf {
        let path = Path::new(resource);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        let path = self.resolve(resource);
        let path = path.as_path();
        debug!(path = %path.display(), "Reading audio file");
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::Fetch(format!("Failed to read {}: {}", path.display(), e)))
    }
}

/// Downloads resources over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        debug!(url = %resource, "Downloading audio resource");

        let response = self
            .http_client
            .get(resource)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", resource, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "{}: HTTP {}",
                resource,
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", resource, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Dispatches URLs to HTTP and everything else to the filesystem.
#[derive(Debug, Clone)]
pub struct RoutingFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl RoutingFetcher {
    pub fn new(file_root: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: FileFetcher::new(file_root),
            http: HttpFetcher::new()?,
        })
    }
}

#[async_trait]
impl ResourceFetcher for RoutingFetcher {
    async fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        if is_url(resource) {
            self.http.fetch(resource).await
        } else {
            self.file.fetch(resource).await
        }
    }
}
