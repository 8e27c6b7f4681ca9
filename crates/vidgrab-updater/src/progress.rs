//! Progress reporting types.
//!
//! One update run maps onto a single 0..=100 scale: the download occupies
//! 0..=50, archive extraction 50..=75, and file installation 75..=100.
//! The coordinator guarantees the reported percentage never decreases
//! within a run.

use std::sync::Arc;

/// The phase an update run is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching and evaluating the update manifest.
    Checking,
    /// Streaming the release archive to disk.
    Downloading,
    /// Extracting and copying files into the install root.
    Installing,
}

impl Stage {
    /// Human-readable label for log output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
        }
    }
}

/// A single progress sample.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Current phase.
    pub stage: Stage,
    /// Overall completion in `0..=100`.
    pub percent: u8,
    /// Short status line for display.
    pub message: String,
}

/// Events emitted by the coordinator over the course of an update run.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// A progress sample.
    Progress(ProgressEvent),
    /// The run ended, successfully or not.
    Finished {
        /// Whether the run completed without error.
        success: bool,
        /// Final status line for display.
        message: String,
    },
}

/// Callback invoked with every [`UpdateEvent`].
pub type EventSink = Arc<dyn Fn(UpdateEvent) + Send + Sync>;

/// An [`EventSink`] that discards all events.
#[must_use]
pub fn null_sink() -> EventSink {
    Arc::new(|_| {})
}
