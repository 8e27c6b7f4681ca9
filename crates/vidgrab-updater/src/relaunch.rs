//! Process relaunch after a successful install.
//!
//! Sibling processes (helper windows, workers) register their PIDs with the
//! relauncher; on relaunch they are terminated by PID, the new executable is
//! spawned detached, and the current process exits.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::{Result, UpdateError};

/// Terminates registered siblings and restarts the application.
#[derive(Debug, Default)]
pub struct Relauncher {
    siblings: Mutex<Vec<u32>>,
}

impl Relauncher {
    /// Creates a relauncher with no registered siblings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sibling process to terminate before relaunching.
    pub fn register_sibling(&self, pid: u32) {
        let mut siblings = self.siblings.lock().unwrap_or_else(|e| e.into_inner());
        if !siblings.contains(&pid) {
            siblings.push(pid);
        }
    }

    /// PIDs currently registered.
    #[must_use]
    pub fn siblings(&self) -> Vec<u32> {
        self.siblings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Terminates every registered sibling, best effort.
    ///
    /// A PID that no longer exists is not an error; each failure is logged
    /// and the rest of the list is still processed.
    pub fn terminate_siblings(&self) {
        let siblings = std::mem::take(&mut *self.siblings.lock().unwrap_or_else(|e| e.into_inner()));
        for pid in siblings {
            match terminate_pid(pid) {
                Ok(()) => info!(pid, "terminated sibling process"),
                Err(err) => warn!(pid, %err, "failed to terminate sibling process"),
            }
        }
    }

    /// Kills siblings, spawns `executable` detached, and exits this process.
    ///
    /// Only returns on spawn failure.
    pub fn relaunch(&self, executable: &Path) -> Result<std::convert::Infallible> {
        self.terminate_siblings();
        info!(executable = %executable.display(), "relaunching");
        Command::new(executable)
            .spawn()
            .map_err(|err| UpdateError::RelaunchFailed(err.to_string()))?;
        std::process::exit(0);
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) -> std::io::Result<()> {
    let status = Command::new("kill").arg(pid.to_string()).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill exited with {status}")))
    }
}

#[cfg(windows)]
fn terminate_pid(pid: u32) -> std::io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "taskkill exited with {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deduplicates() {
        let relauncher = Relauncher::new();
        relauncher.register_sibling(100);
        relauncher.register_sibling(200);
        relauncher.register_sibling(100);
        assert_eq!(relauncher.siblings(), vec![100, 200]);
    }

    #[test]
    fn test_spawn_failure_is_relaunch_error() {
        let relauncher = Relauncher::new();
        let err = relauncher
            .relaunch(std::path::Path::new("/nonexistent/vidgrab-binary"))
            .unwrap_err();
        assert!(matches!(err, UpdateError::RelaunchFailed(_)));
    }

    #[test]
    fn test_terminate_drains_list_despite_dead_pids() {
        let relauncher = Relauncher::new();
        // A PID that certainly does not exist; termination is best effort.
        relauncher.register_sibling(u32::MAX - 1);
        relauncher.terminate_siblings();
        assert!(relauncher.siblings().is_empty());
    }
}
