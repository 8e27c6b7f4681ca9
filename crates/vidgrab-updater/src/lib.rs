//! Self-update engine for VidGrab.
//!
//! This crate checks a JSON manifest for a newer release, downloads the
//! release archive with progress reporting, extracts it through a scratch
//! directory, copies it over the install root, and relaunches the
//! application.
//!
//! # Overview
//!
//! - Dot-separated numeric versions, compared component by component
//! - Manifest fetching with historical key-name fallbacks
//! - Streaming download with per-mebibyte progress
//! - ZIP extraction with path-traversal rejection
//! - Plain-text `version.txt` record next to the application
//! - Cooperative cancellation at chunk and file granularity
//!
//! # Architecture
//!
//! [`UpdateCoordinator`] owns all update state and drives the pipeline;
//! the individual pieces ([`ManifestFetcher`], [`ArchiveDownloader`],
//! [`ArchiveInstaller`], [`VersionStore`], [`Relauncher`]) are usable on
//! their own. Progress and completion flow through an [`EventSink`]
//! callback on a single monotonic 0..=100 scale: download in 0..=50,
//! extraction in 50..=75, copying in 75..=100.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use vidgrab_updater::{
//!     CancelToken, CheckTrigger, UpdateCoordinator, UpdateSettings, null_sink,
//! };
//!
//! async fn run_update() -> vidgrab_updater::Result<()> {
//!     let settings = UpdateSettings::new(PathBuf::from("/opt/vidgrab"));
//!     let coordinator = UpdateCoordinator::new(settings, null_sink())?;
//!     let outcome = coordinator
//!         .update(CheckTrigger::Manual, &CancelToken::new())
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod progress;
pub mod relaunch;
pub mod store;
pub mod version;

pub use cancel::CancelToken;
pub use config::{
    AUTO_CHECK_INTERVAL_HOURS, DEFAULT_MANIFEST_URL, STARTUP_CHECK_DELAY_SECS, UpdateSettings,
};
pub use coordinator::{
    CheckOutcome, CheckTrigger, UpdateCoordinator, UpdateOutcome, UpdateStatus,
};
pub use download::{ArchiveDownloader, DownloadOutcome};
pub use error::{Result, UpdateError};
pub use fetch::ManifestFetcher;
pub use install::{ArchiveInstaller, InstallOutcome};
pub use manifest::UpdateManifest;
pub use progress::{EventSink, ProgressEvent, Stage, UpdateEvent, null_sink};
pub use relaunch::Relauncher;
pub use store::{VERSION_FILE, VersionStore};
pub use version::{Version, is_newer};

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
