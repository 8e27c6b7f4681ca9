//! Update settings and check scheduling.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Minimum hours between automatic update checks.
pub const AUTO_CHECK_INTERVAL_HOURS: i64 = 24;

/// Seconds to wait after startup before the automatic check fires.
pub const STARTUP_CHECK_DELAY_SECS: u64 = 2;

/// Default manifest location.
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/vidgrab/vidgrab/main/update.json";

/// Configuration for the update coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Where the update manifest is fetched from.
    pub manifest_url: String,
    /// Directory whose contents are replaced by an update.
    pub install_root: PathBuf,
    /// Directory for the downloaded archive and extraction scratch space.
    pub work_dir: PathBuf,
    /// Install a newer version as soon as the check finds one.
    #[serde(default = "default_true")]
    pub auto_install: bool,
    /// Relaunch the application after a successful install.
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    /// Executable to spawn on relaunch. `None` disables relaunching.
    #[serde(default)]
    pub relaunch_executable: Option<PathBuf>,
    /// When the last automatic check ran.
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl UpdateSettings {
    /// Creates settings with defaults for the given install root.
    #[must_use]
    pub fn new(install_root: PathBuf) -> Self {
        let work_dir = install_root.clone();
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            install_root,
            work_dir,
            auto_install: true,
            auto_restart: true,
            relaunch_executable: None,
            last_check: None,
        }
    }

    /// Returns whether an automatic check is due.
    ///
    /// Checks are rate limited to one per [`AUTO_CHECK_INTERVAL_HOURS`].
    /// Manual checks bypass this entirely.
    #[must_use]
    pub fn should_check_automatically(&self) -> bool {
        match self.last_check {
            None => true,
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last);
                elapsed.num_hours() >= AUTO_CHECK_INTERVAL_HOURS
            }
        }
    }

    /// Records that a check just completed.
    pub fn record_check(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// Scratch directory used while extracting an archive.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join("temp_update")
    }

    /// Where the archive for `version` is downloaded to.
    #[must_use]
    pub fn archive_path(&self, version: &Version) -> PathBuf {
        self.work_dir.join(format!("update_v{version}.zip"))
    }
}
