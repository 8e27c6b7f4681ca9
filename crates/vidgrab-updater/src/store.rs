//! Persistent record of the installed version.
//!
//! The installed version lives in a plain-text `version.txt` next to the
//! application. A missing or unreadable record is treated as the baseline
//! version rather than an error, so a fresh install still updates cleanly.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, UpdateError};
use crate::version::Version;

/// File name of the on-disk version record.
pub const VERSION_FILE: &str = "version.txt";

/// Reads and writes the installed-version record.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    /// A store whose record lives at `dir/version.txt`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(VERSION_FILE),
        }
    }

    /// A store with an explicit record path.
    #[must_use]
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the recorded version, falling back to the baseline.
    ///
    /// Never fails: a missing file, unreadable file, or garbled content all
    /// yield [`Version::baseline`] with a warning in the log.
    #[must_use]
    pub fn read(&self) -> Version {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "no version record, assuming baseline");
                return Version::baseline();
            }
        };
        match raw.trim().parse::<Version>() {
            Ok(version) => version,
            Err(_) => {
                warn!(
                    path = %self.path.display(),
                    content = raw.trim(),
                    "unparseable version record, assuming baseline"
                );
                Version::baseline()
            }
        }
    }

    /// Overwrites the record with `version` and flushes it to disk.
    pub fn write(&self, version: &Version) -> Result<()> {
        let persist = |version: &Version| -> std::io::Result<()> {
            let mut file = File::create(&self.path)?;
            file.write_all(version.to_string().as_bytes())?;
            file.sync_all()
        };
        persist(version).map_err(|err| UpdateError::VersionPersistFailed(err.to_string()))?;
        debug!(path = %self.path.display(), %version, "version record written");
        Ok(())
    }

    /// Returns the recorded version when it is newer than `running`.
    ///
    /// After an install the record is ahead of the still-running binary;
    /// callers use this on startup to tell the user a restart finished an
    /// update, or that one is still pending.
    #[must_use]
    pub fn pending_update_notice(&self, running: &Version) -> Option<Version> {
        let recorded = self.read();
        (recorded > *running).then_some(recorded)
    }
}
