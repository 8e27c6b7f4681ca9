//! Update manifest parsing.
//!
//! The server-side manifest format has drifted over releases, so several
//! key names are accepted for the version and download URL. Aliases are
//! tried in a fixed order and the first present key wins.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, UpdateError};

/// The manifest as it appears on the wire, with all historical key names.
#[derive(Debug, Deserialize)]
pub struct RawManifest {
    /// Preferred version key.
    #[serde(default)]
    pub latest_version: Option<String>,
    /// Legacy version key from GitHub release payloads.
    #[serde(default)]
    pub tag_name: Option<String>,
    /// Display name of the release.
    #[serde(default)]
    pub name: Option<String>,
    /// Release notes, markdown or plain text.
    #[serde(default)]
    pub body: Option<String>,
    /// Preferred download URL key.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Legacy URL key pointing at the release page.
    #[serde(default)]
    pub html_url: Option<String>,
    /// Legacy URL key from GitHub release payloads.
    #[serde(default)]
    pub zipball_url: Option<String>,
    /// Publication timestamp, RFC 3339.
    #[serde(default)]
    pub published_at: Option<String>,
}

/// A validated update manifest.
#[derive(Debug, Clone)]
pub struct UpdateManifest {
    /// Advertised version, with any `v` prefix stripped.
    pub latest_version: String,
    /// Human-readable release name.
    pub display_name: String,
    /// Release notes, empty when the manifest carried none.
    pub release_notes: String,
    /// Direct URL of the release archive.
    pub download_url: String,
    /// When the release was published, if the manifest said.
    pub published_at: Option<DateTime<Utc>>,
}

impl UpdateManifest {
    /// Validates a raw manifest into a usable one.
    ///
    /// The version key and a `http(s)` download URL are required; everything
    /// else degrades to an empty or absent value.
    pub fn from_raw(raw: RawManifest) -> Result<Self> {
        let latest_version = raw
            .latest_version
            .or(raw.tag_name)
            .ok_or_else(|| {
                UpdateError::MalformedManifest("no version key (latest_version, tag_name)".into())
            })?;
        let latest_version = latest_version
            .trim()
            .trim_start_matches('v')
            .to_string();
        if latest_version.is_empty() {
            return Err(UpdateError::MalformedManifest("empty version field".into()));
        }

        let download_url = raw
            .download_url
            .or(raw.html_url)
            .or(raw.zipball_url)
            .ok_or_else(|| {
                UpdateError::InvalidDownloadUrl(
                    "no URL key (download_url, html_url, zipball_url)".into(),
                )
            })?;
        if !download_url.starts_with("https://") && !download_url.starts_with("http://") {
            return Err(UpdateError::InvalidDownloadUrl(download_url));
        }

        let published_at = raw.published_at.as_deref().and_then(parse_timestamp);

        Ok(Self {
            display_name: raw.name.unwrap_or_else(|| format!("v{latest_version}")),
            release_notes: raw.body.unwrap_or_default(),
            latest_version,
            download_url,
            published_at,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(err) => {
            warn!(raw, %err, "ignoring unparseable published_at timestamp");
            None
        }
    }
}
