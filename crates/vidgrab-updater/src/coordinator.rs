//! Orchestration of the check / download / install pipeline.
//!
//! The coordinator owns all update state. At most one check or update runs
//! at a time, progress is folded onto a single monotonic 0..=100 scale, and
//! every run ends with a terminal [`UpdateEvent::Finished`] event.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::{STARTUP_CHECK_DELAY_SECS, UpdateSettings};
use crate::download::{ArchiveDownloader, DownloadOutcome};
use crate::error::{Result, UpdateError};
use crate::fetch::ManifestFetcher;
use crate::install::{ArchiveInstaller, InstallOutcome};
use crate::manifest::UpdateManifest;
use crate::progress::{EventSink, ProgressEvent, Stage, UpdateEvent};
use crate::relaunch::Relauncher;
use crate::store::VersionStore;
use crate::version::{Version, is_newer};

/// What the coordinator is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Nothing running, no result yet.
    Idle,
    /// A manifest check is in flight.
    Checking,
    /// The last check found nothing newer.
    NoUpdate,
    /// A newer version is known but not installed.
    UpdateAvailable,
    /// The archive is being downloaded.
    Downloading,
    /// The archive is being extracted and copied.
    Installing,
    /// A new version is installed; it takes effect on restart.
    RestartPending,
    /// The last run failed.
    Error,
}

/// Why a check is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// Scheduled startup check, subject to rate limiting.
    Automatic,
    /// User-initiated check, always runs.
    Manual,
}

/// Result of a manifest check.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// An automatic check was skipped because one ran recently.
    RateLimited,
    /// The installed version is current.
    NoUpdate,
    /// A newer version is available.
    UpdateAvailable(UpdateManifest),
}

/// Result of a full update run.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// An automatic run was skipped because a check ran recently.
    RateLimited,
    /// Nothing newer to install.
    AlreadyUpToDate,
    /// A newer version exists but automatic install is disabled.
    InstallPending(UpdateManifest),
    /// The new version is on disk.
    Installed {
        /// The version that was installed.
        version: Version,
        /// Whether a restart is still needed to run it.
        restart_pending: bool,
    },
    /// The run was cancelled; no version change took effect.
    Cancelled,
}

/// Drives checks and updates, owning all mutable update state.
pub struct UpdateCoordinator {
    settings: Mutex<UpdateSettings>,
    store: VersionStore,
    fetcher: ManifestFetcher,
    downloader: ArchiveDownloader,
    relauncher: Arc<Relauncher>,
    status: Mutex<UpdateStatus>,
    in_flight: Arc<AtomicBool>,
    last_percent: AtomicU8,
    sink: EventSink,
}

impl UpdateCoordinator {
    /// Builds a coordinator from settings, emitting events into `sink`.
    pub fn new(settings: UpdateSettings, sink: EventSink) -> Result<Self> {
        let store = VersionStore::in_dir(&settings.install_root);
        let fetcher = ManifestFetcher::new(settings.manifest_url.clone())?;
        let downloader = ArchiveDownloader::new()?;
        Ok(Self {
            settings: Mutex::new(settings),
            store,
            fetcher,
            downloader,
            relauncher: Arc::new(Relauncher::new()),
            status: Mutex::new(UpdateStatus::Idle),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_percent: AtomicU8::new(0),
            sink,
        })
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> UpdateStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> UpdateSettings {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mutates the settings in place.
    pub fn update_settings(&self, apply: impl FnOnce(&mut UpdateSettings)) {
        apply(&mut self.settings.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// The relauncher, for sibling PID registration.
    #[must_use]
    pub fn relauncher(&self) -> Arc<Relauncher> {
        Arc::clone(&self.relauncher)
    }

    /// The version store used by this coordinator.
    #[must_use]
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Checks the manifest for a newer version. Does not download anything.
    pub async fn check(&self, trigger: CheckTrigger) -> Result<CheckOutcome> {
        let _guard = self.begin_run()?;
        if self.rate_limited(trigger) {
            info!("automatic check skipped, last check was recent");
            return Ok(CheckOutcome::RateLimited);
        }

        match self.check_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn check_inner(&self) -> Result<CheckOutcome> {
        self.set_status(UpdateStatus::Checking);
        self.emit_progress(Stage::Checking, 0, "Checking for updates".to_string());

        let manifest = self.fetcher.fetch().await?;
        self.record_check();

        let current = self.store.read();
        if is_newer(&manifest.latest_version, &current) {
            info!(current = %current, latest = %manifest.latest_version, "update available");
            self.set_status(UpdateStatus::UpdateAvailable);
            self.finish(
                true,
                format!("Version {} is available", manifest.latest_version),
            );
            Ok(CheckOutcome::UpdateAvailable(manifest))
        } else {
            self.set_status(UpdateStatus::NoUpdate);
            self.finish(true, "Already up to date".to_string());
            Ok(CheckOutcome::NoUpdate)
        }
    }

    /// Runs the full pipeline: check, download, install, optional relaunch.
    pub async fn update(&self, trigger: CheckTrigger, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let _guard = self.begin_run()?;
        if self.rate_limited(trigger) {
            info!("automatic update skipped, last check was recent");
            return Ok(UpdateOutcome::RateLimited);
        }

        match self.update_inner(cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn update_inner(&self, cancel: &CancelToken) -> Result<UpdateOutcome> {
        self.set_status(UpdateStatus::Checking);
        self.emit_progress(Stage::Checking, 0, "Checking for updates".to_string());

        let manifest = self.fetcher.fetch().await?;
        self.record_check();

        let current = self.store.read();
        if !is_newer(&manifest.latest_version, &current) {
            self.set_status(UpdateStatus::NoUpdate);
            self.finish(true, "Already up to date".to_string());
            return Ok(UpdateOutcome::AlreadyUpToDate);
        }

        let version: Version = manifest.latest_version.parse()?;
        let (auto_install, auto_restart, relaunch_executable, archive_path, installer) = {
            let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
            (
                settings.auto_install,
                settings.auto_restart,
                settings.relaunch_executable.clone(),
                settings.archive_path(&version),
                ArchiveInstaller::new(settings.install_root.clone(), settings.scratch_dir()),
            )
        };

        if !auto_install {
            info!(latest = %manifest.latest_version, "update available, automatic install disabled");
            self.set_status(UpdateStatus::UpdateAvailable);
            self.finish(
                true,
                format!("Version {} is available", manifest.latest_version),
            );
            return Ok(UpdateOutcome::InstallPending(manifest));
        }

        self.set_status(UpdateStatus::Downloading);
        let outcome = self
            .downloader
            .download(&manifest.download_url, &archive_path, cancel, &|event| {
                self.emit_progress(event.stage, event.percent, event.message);
            })
            .await?;
        if outcome == DownloadOutcome::Cancelled {
            self.set_status(UpdateStatus::Idle);
            self.finish(false, "Update cancelled".to_string());
            return Ok(UpdateOutcome::Cancelled);
        }

        self.set_status(UpdateStatus::Installing);
        let outcome = installer.install(&archive_path, &version, &self.store, cancel, &|event| {
            self.emit_progress(event.stage, event.percent, event.message);
        })?;
        let (files_copied, version_persisted) = match outcome {
            InstallOutcome::Completed {
                files_copied,
                version_persisted,
            } => (files_copied, version_persisted),
            InstallOutcome::Cancelled => {
                self.set_status(UpdateStatus::Idle);
                self.finish(false, "Update cancelled".to_string());
                return Ok(UpdateOutcome::Cancelled);
            }
        };

        if !version_persisted {
            warn!("version record not updated, next check will re-offer this version");
        }
        self.set_status(UpdateStatus::RestartPending);
        self.emit_progress(
            Stage::Installing,
            100,
            format!("Version {version} installed ({files_copied} files)"),
        );
        self.finish(
            true,
            format!("Updated to version {version}. Restart to apply."),
        );

        if auto_restart {
            if let Some(executable) = relaunch_executable {
                // Does not return unless the spawn fails. The install is
                // already complete, so a failed spawn is best effort: the
                // user restarts manually.
                if let Err(err) = self.relauncher.relaunch(&executable) {
                    warn!(%err, "relaunch failed, restart manually to apply the update");
                }
            }
        }

        Ok(UpdateOutcome::Installed {
            version,
            restart_pending: true,
        })
    }

    /// Waits the startup delay, then runs an automatic check.
    ///
    /// A failed automatic check is logged and swallowed; it must never
    /// disturb the rest of the application.
    pub async fn run_startup_check(&self) -> Option<CheckOutcome> {
        tokio::time::sleep(Duration::from_secs(STARTUP_CHECK_DELAY_SECS)).await;
        match self.check(CheckTrigger::Automatic).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(%err, "automatic update check failed");
                None
            }
        }
    }

    fn begin_run(&self) -> Result<RunGuard> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdateError::AlreadyInProgress);
        }
        self.last_percent.store(0, Ordering::SeqCst);
        Ok(RunGuard {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn rate_limited(&self, trigger: CheckTrigger) -> bool {
        trigger == CheckTrigger::Automatic
            && !self
                .settings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .should_check_automatically()
    }

    fn record_check(&self) {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_check();
    }

    fn set_status(&self, status: UpdateStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Emits a progress event, clamped so the percentage never goes backwards
    /// within a run.
    fn emit_progress(&self, stage: Stage, percent: u8, message: String) {
        let floor = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        let percent = percent.max(floor);
        (self.sink)(UpdateEvent::Progress(ProgressEvent {
            stage,
            percent,
            message,
        }));
    }

    fn finish(&self, success: bool, message: String) {
        (self.sink)(UpdateEvent::Finished { success, message });
    }

    fn fail(&self, err: UpdateError) -> UpdateError {
        error!(%err, "update run failed");
        self.set_status(UpdateStatus::Error);
        self.finish(false, err.user_message().to_string());
        err
    }
}

/// Clears the in-flight flag when a run ends, however it ends.
struct RunGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}
