//! Error types for the self-update system.

use thiserror::Error;

/// Errors that can occur during the update process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// Failed to parse a version string.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// The manifest request did not complete within the timeout.
    #[error("network timeout while contacting the update server")]
    NetworkTimeout,

    /// Could not reach the update server at all.
    #[error("connection error: {0}")]
    NetworkConnection(String),

    /// The update server answered with a non-success HTTP status.
    #[error("update server returned HTTP {0}")]
    HttpStatus(u16),

    /// The manifest body could not be parsed or is missing required fields.
    #[error("malformed update manifest: {0}")]
    MalformedManifest(String),

    /// The manifest carried no usable download URL.
    #[error("invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    /// The archive transfer failed mid-stream.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// The downloaded archive could not be read as a ZIP file.
    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    /// An archive entry would resolve outside the install root.
    #[error("archive entry escapes the install root: {0}")]
    PathTraversalRejected(String),

    /// File I/O failed during extraction, copying, or cleanup.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// The operation was cancelled by the user.
    #[error("update cancelled")]
    Cancelled,

    /// The new version record could not be written (install still succeeded).
    #[error("failed to persist version record: {0}")]
    VersionPersistFailed(String),

    /// The replacement process could not be spawned (install still succeeded).
    #[error("failed to relaunch: {0}")]
    RelaunchFailed(String),

    /// Another update operation is already running.
    #[error("an update operation is already in progress")]
    AlreadyInProgress,
}

impl UpdateError {
    /// Returns a short message suitable for display to the user.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::NetworkTimeout => "The update server did not respond in time.",
            Self::NetworkConnection(_) => {
                "Could not reach the update server. Please check your internet connection."
            }
            Self::HttpStatus(_) => "The update server rejected the request.",
            Self::MalformedManifest(_) | Self::InvalidDownloadUrl(_) => {
                "The update information from the server is invalid."
            }
            Self::DownloadFailed(_) => "The update could not be downloaded.",
            Self::ArchiveCorrupt(_) => "The update package is damaged.",
            Self::PathTraversalRejected(_) => "The update package contains unsafe file paths.",
            Self::Filesystem(_) => "Could not write the update to disk.",
            Self::Cancelled => "The update was cancelled.",
            Self::VersionPersistFailed(_) => "The new version could not be recorded.",
            Self::RelaunchFailed(_) => {
                "The update is installed but the application could not be relaunched. \
                 Please restart it manually."
            }
            Self::AlreadyInProgress => "An update is already running.",
            Self::InvalidVersion(_) => "An unexpected error occurred.",
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::NetworkConnection(_)
                | Self::DownloadFailed(_)
                | Self::HttpStatus(500..=599)
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::NetworkConnection(err.to_string())
        }
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::Filesystem(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedManifest(err.to_string())
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveCorrupt(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
