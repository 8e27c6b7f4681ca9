//! Streaming archive download.
//!
//! The archive is streamed to disk and progress is reported once per
//! mebibyte of received data, mapped onto the 0..=50 band of the overall
//! update scale. A failed or cancelled download removes the partial file.

use std::fmt::Display;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use futures_util::{Stream, StreamExt as _};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, UpdateError};
use crate::progress::{ProgressEvent, Stage};

/// Progress granularity: one event per this many bytes.
pub const CHUNK_BYTES: u64 = 1024 * 1024;

/// Highest overall percentage the download phase can report.
pub const DOWNLOAD_PROGRESS_CEILING: u8 = 50;

/// How a download run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The archive is fully on disk at the destination path.
    Complete,
    /// Cancellation was requested; the partial file was removed.
    Cancelled,
}

/// Streams release archives to disk.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    client: reqwest::Client,
}

impl ArchiveDownloader {
    /// Builds a downloader with a dedicated client.
    ///
    /// No overall request timeout is set: large archives on slow links are
    /// expected, and cancellation covers the stuck case.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vidgrab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| UpdateError::NetworkConnection(err.to_string()))?;
        Ok(Self { client })
    }

    /// Builds a downloader that reuses an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Downloads `url` to `dest`, reporting progress through `on_event`.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelToken,
        on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<DownloadOutcome> {
        debug!(url, dest = %dest.display(), "starting download");
        let response = self.client.get(url).send().await.map_err(|err| {
            let classified: UpdateError = err.into();
            match classified {
                UpdateError::NetworkTimeout => UpdateError::NetworkTimeout,
                other => UpdateError::DownloadFailed(other.to_string()),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::DownloadFailed(format!(
                "server returned HTTP {status}"
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let stream = response.bytes_stream();
        write_stream(stream, dest, total, cancel, on_event).await
    }
}

/// Writes a byte stream to `dest` with per-mebibyte progress events.
///
/// Separated from the HTTP layer so the chunking and cancellation behavior
/// can be tested against synthetic streams.
pub(crate) async fn write_stream<S, B, E>(
    mut stream: S,
    dest: &Path,
    total: u64,
    cancel: &CancelToken,
    on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> Result<DownloadOutcome>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut file = File::create(dest)?;
    let mut downloaded: u64 = 0;
    let mut reported_chunks: u64 = 0;
    let mut last_percent: u8 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            drop(file);
            remove_partial(dest);
            info!(dest = %dest.display(), "download cancelled");
            return Ok(DownloadOutcome::Cancelled);
        }

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                drop(file);
                remove_partial(dest);
                return Err(UpdateError::DownloadFailed(err.to_string()));
            }
        };
        let bytes = chunk.as_ref();
        if let Err(err) = file.write_all(bytes) {
            drop(file);
            remove_partial(dest);
            return Err(UpdateError::Filesystem(err.to_string()));
        }
        downloaded += bytes.len() as u64;

        let chunks = downloaded / CHUNK_BYTES;
        if chunks > reported_chunks {
            reported_chunks = chunks;
            last_percent = band_percent(downloaded, total);
            on_event(ProgressEvent {
                stage: Stage::Downloading,
                percent: last_percent,
                message: transfer_message(downloaded, total),
            });
        }
    }

    if let Err(err) = file.sync_all() {
        drop(file);
        remove_partial(dest);
        return Err(UpdateError::Filesystem(err.to_string()));
    }
    drop(file);

    // Cover the tail the last boundary event missed, and the whole transfer
    // when it was smaller than one chunk.
    if last_percent < DOWNLOAD_PROGRESS_CEILING {
        on_event(ProgressEvent {
            stage: Stage::Downloading,
            percent: DOWNLOAD_PROGRESS_CEILING,
            message: transfer_message(downloaded, downloaded.max(total)),
        });
    }
    info!(dest = %dest.display(), bytes = downloaded, "download complete");
    Ok(DownloadOutcome::Complete)
}

fn band_percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = downloaded.saturating_mul(u64::from(DOWNLOAD_PROGRESS_CEILING)) / total;
    scaled.min(u64::from(DOWNLOAD_PROGRESS_CEILING)) as u8
}

fn transfer_message(downloaded: u64, total: u64) -> String {
    if total == 0 {
        format!("Downloaded {}", format_bytes(downloaded))
    } else {
        format!(
            "Downloading {} / {}",
            format_bytes(downloaded),
            format_bytes(total)
        )
    }
}

fn remove_partial(dest: &Path) {
    if let Err(err) = std::fs::remove_file(dest) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(dest = %dest.display(), %err, "failed to remove partial download");
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= MIB {
        format!("{:.1} MB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes / KIB)
    } else {
        format!("{bytes:.0} B")
    }
}
