//! Package registry lookups for the `@published` selectors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;

use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// A registry that can tell whether a package version has been published.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Returns the published version matching `version`, or `None` if the
    /// registry does not know it.
    async fn published_version(&self, name: &str, version: &str) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct VersionDocument {
    version: String,
}

/// HTTP client for an npm-compatible registry.
pub struct NpmRegistry {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl NpmRegistry {
    /// Creates a client for the registry at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Registry {
                package: "registry".to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: url.as_ref().trim_end_matches('/').to_string(),
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
        })
    }

    fn version_url(&self, name: &str, version: &str) -> String {
        // Scoped names keep their '@' but escape the separator.
        format!("{}/{}/{}", self.base_url, name.replace('/', "%2f"), version)
    }

    async fn fetch(&self, name: &str, version: &str) -> Result<Option<String>> {
        let url = self.version_url(name, version);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Registry {
                package: name.to_string(),
                message: format!("Request to {} failed: {}", url, e),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: VersionDocument =
                    response.json().await.map_err(|e| Error::Registry {
                        package: name.to_string(),
                        message: format!("Invalid registry response: {}", e),
                    })?;
                Ok(Some(document.version))
            }
            status => Err(Error::Registry {
                package: name.to_string(),
                message: format!("Registry returned HTTP {}", status),
            }),
        }
    }
}

#[async_trait]
impl Registry for NpmRegistry {
    async fn published_version(&self, name: &str, version: &str) -> Result<Option<String>> {
        let mut delay = self.retry_delay;
        let mut attempt = 0;
        loop {
            match self.fetch(name, version).await {
                Ok(found) => return Ok(found),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    tracing::debug!(package = name, attempt, "Registry lookup failed: {}", e);
                    attempt += 1;
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}
