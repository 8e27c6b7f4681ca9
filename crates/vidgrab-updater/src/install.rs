//! Archive extraction and installation.
//!
//! Installation runs in two stages: the archive is extracted into a scratch
//! directory, then the extracted files are copied over the install root.
//! Archive entry paths are validated before anything touches the disk, and
//! the scratch directory and archive are removed on every exit path.
//!
//! There is no rollback. Copying is not transactional: a failure mid-copy
//! leaves the install root with a mix of old and new files, which the next
//! successful run repairs.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::cancel::CancelToken;
use crate::error::{Result, UpdateError};
use crate::progress::{ProgressEvent, Stage};
use crate::store::VersionStore;
use crate::version::Version;

/// Overall percentage at which extraction begins.
const EXTRACT_PROGRESS_FLOOR: u8 = 50;
/// Overall percentage at which copying begins.
const COPY_PROGRESS_FLOOR: u8 = 75;

/// How an install run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// All files were copied into place.
    Completed {
        /// Number of files written into the install root.
        files_copied: usize,
        /// Whether the new version record was written successfully.
        version_persisted: bool,
    },
    /// Cancellation was requested before copying finished.
    Cancelled,
}

/// Extracts a release archive and copies it over the install root.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    install_root: PathBuf,
    scratch_dir: PathBuf,
}

impl ArchiveInstaller {
    /// Builds an installer targeting `install_root`, extracting via `scratch_dir`.
    #[must_use]
    pub fn new(install_root: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            install_root,
            scratch_dir,
        }
    }

    /// Installs `archive` as `version`, recording it in `store` on success.
    ///
    /// The scratch directory and the archive file are removed whether the
    /// run completes, fails, or is cancelled.
    pub fn install(
        &self,
        archive: &Path,
        version: &Version,
        store: &VersionStore,
        cancel: &CancelToken,
        on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<InstallOutcome> {
        let result = self.run(archive, version, store, cancel, on_event);
        self.cleanup(archive);
        result
    }

    fn run(
        &self,
        archive: &Path,
        version: &Version,
        store: &VersionStore,
        cancel: &CancelToken,
        on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<InstallOutcome> {
        let extracted = self.extract(archive, cancel, on_event)?;
        if extracted.is_none() {
            return Ok(InstallOutcome::Cancelled);
        }

        let plan = InstallPlan::build(&self.scratch_dir, &self.install_root)?;
        debug!(files = plan.entries.len(), "install plan validated");

        let Some(files_copied) = self.copy(&plan, cancel, on_event)? else {
            return Ok(InstallOutcome::Cancelled);
        };

        let version_persisted = match store.write(version) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "install complete but version record not written");
                false
            }
        };
        info!(%version, files_copied, "update installed");
        Ok(InstallOutcome::Completed {
            files_copied,
            version_persisted,
        })
    }

    /// Extracts the archive into a fresh scratch directory.
    ///
    /// Returns `None` when cancelled between entries.
    fn extract(
        &self,
        archive: &Path,
        cancel: &CancelToken,
        on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<Option<()>> {
        if self.scratch_dir.exists() {
            std::fs::remove_dir_all(&self.scratch_dir)?;
        }
        std::fs::create_dir_all(&self.scratch_dir)?;

        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)?;
        let total = zip.len();

        for index in 0..total {
            if cancel.is_cancelled() {
                info!("install cancelled during extraction");
                return Ok(None);
            }

            let mut entry = zip.by_index(index)?;
            let name = entry.name().to_string();
            let relative = validate_entry_path(&name)?;
            let dest = self.scratch_dir.join(&relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&dest)?;
                io::copy(&mut entry, &mut out)?;
            }

            let percent = EXTRACT_PROGRESS_FLOOR
                + (((index + 1) * usize::from(COPY_PROGRESS_FLOOR - EXTRACT_PROGRESS_FLOOR))
                    / total) as u8;
            on_event(ProgressEvent {
                stage: Stage::Installing,
                percent,
                message: format!("Extracting files ({}/{total})", index + 1),
            });
        }
        debug!(entries = total, "archive extracted");
        Ok(Some(()))
    }

    /// Copies planned files into the install root.
    ///
    /// Returns `None` when cancelled between files.
    fn copy(
        &self,
        plan: &InstallPlan,
        cancel: &CancelToken,
        on_event: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<Option<usize>> {
        let total = plan.entries.len();
        for (index, entry) in plan.entries.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("install cancelled during copy");
                return Ok(None);
            }

            if let Some(parent) = entry.dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&entry.source, &entry.dest)?;

            let percent = COPY_PROGRESS_FLOOR
                + (((index + 1) * usize::from(100 - COPY_PROGRESS_FLOOR)) / total) as u8;
            on_event(ProgressEvent {
                stage: Stage::Installing,
                percent,
                message: format!("Installing files ({}/{total})", index + 1),
            });
        }
        Ok(Some(total))
    }

    /// Best-effort removal of the scratch directory and archive.
    fn cleanup(&self, archive: &Path) {
        if self.scratch_dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&self.scratch_dir) {
                warn!(dir = %self.scratch_dir.display(), %err, "failed to remove scratch directory");
            }
        }
        if archive.exists() {
            if let Err(err) = std::fs::remove_file(archive) {
                warn!(archive = %archive.display(), %err, "failed to remove downloaded archive");
            }
        }
    }
}

/// The files to copy, validated to land inside the install root.
struct InstallPlan {
    entries: Vec<PlanEntry>,
}

struct PlanEntry {
    source: PathBuf,
    dest: PathBuf,
}

impl InstallPlan {
    /// Walks the scratch tree and maps every file onto the install root.
    ///
    /// Fails without copying anything if any destination would escape the
    /// root.
    fn build(scratch: &Path, install_root: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        collect_files(scratch, scratch, install_root, &mut entries)?;
        // Deterministic copy order.
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        Ok(Self { entries })
    }
}

fn collect_files(
    dir: &Path,
    scratch: &Path,
    install_root: &Path,
    entries: &mut Vec<PlanEntry>,
) -> Result<()> {
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        if item.file_type()?.is_dir() {
            collect_files(&path, scratch, install_root, entries)?;
        } else {
            let relative = path
                .strip_prefix(scratch)
                .map_err(|_| UpdateError::Filesystem("file outside scratch directory".into()))?;
            let dest = install_root.join(relative);
            if !dest.starts_with(install_root) {
                return Err(UpdateError::PathTraversalRejected(
                    relative.display().to_string(),
                ));
            }
            entries.push(PlanEntry {
                source: path,
                dest,
            });
        }
    }
    Ok(())
}

/// Normalizes an archive entry name into a safe relative path.
///
/// Rejects absolute paths, drive prefixes, and any `..` component so an
/// entry can never resolve outside the extraction directory.
fn validate_entry_path(name: &str) -> Result<PathBuf> {
    let mut safe = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UpdateError::PathTraversalRejected(name.to_string()));
            }
        }
    }
    if safe.as_os_str().is_empty() {
        return Err(UpdateError::PathTraversalRejected(name.to_string()));
    }
    Ok(safe)
}
