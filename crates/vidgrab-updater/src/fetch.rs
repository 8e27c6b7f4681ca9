//! Update manifest fetching.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, UpdateError};
use crate::manifest::{RawManifest, UpdateManifest};

/// Seconds before a manifest request is abandoned.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

const USER_AGENT: &str = concat!("vidgrab/", env!("CARGO_PKG_VERSION"));

/// Fetches and validates the update manifest from a fixed URL.
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: reqwest::Client,
    url: String,
}

impl ManifestFetcher {
    /// Builds a fetcher for `url` with the crate's timeout and user agent.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| UpdateError::NetworkConnection(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Builds a fetcher that reuses an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The manifest URL this fetcher queries.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches, parses, and validates the manifest.
    pub async fn fetch(&self) -> Result<UpdateManifest> {
        debug!(url = %self.url, "fetching update manifest");
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let raw: RawManifest = serde_json::from_str(&body)?;
        let manifest = UpdateManifest::from_raw(raw)?;
        info!(
            version = %manifest.latest_version,
            name = %manifest.display_name,
            "manifest fetched"
        );
        Ok(manifest)
    }
}
