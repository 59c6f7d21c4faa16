use crate::bulk::DownloadedArtifact;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// States of a [`BulkExport`](crate::BulkExport).  An export moves forward through
/// `Idle -> Submitted -> Polling -> Ready -> Downloading -> Cleaned`, or stops in one of the
/// failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Submitted,
    Polling,
    Ready,
    Downloading,
    Cleaned,
    SubmitFailed,
    PollFailed,
    DownloadFailed,
    CleanupFailed,
}

impl ExportState {
    /// True for the states in which an export ends.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportState::Cleaned
                | ExportState::SubmitFailed
                | ExportState::PollFailed
                | ExportState::DownloadFailed
                | ExportState::CleanupFailed
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportState::Idle => "IDLE",
            ExportState::Submitted => "SUBMITTED",
            ExportState::Polling => "POLLING",
            ExportState::Ready => "READY",
            ExportState::Downloading => "DOWNLOADING",
            ExportState::Cleaned => "CLEANED",
            ExportState::SubmitFailed => "SUBMIT_FAILED",
            ExportState::PollFailed => "POLL_FAILED",
            ExportState::DownloadFailed => "DOWNLOAD_FAILED",
            ExportState::CleanupFailed => "CLEANUP_FAILED",
        };
        f.write_str(s)
    }
}

/// The underlying cause of a failed export.
#[derive(Debug, Error)]
pub enum ExportFailure {
    #[error(transparent)]
    Storage(#[from] cloudstore::Error),

    /// Polling gave up before every artifact was DONE.
    #[error("artifacts not ready after {attempts} status polls ({elapsed:?})")]
    NotReady { attempts: u32, elapsed: Duration },

    /// The server reported that it could not generate an artifact.
    #[error("server failed to generate artifact {name}")]
    ArtifactFailed { name: String },

    /// There were no objects to export, or the server planned no artifacts.
    #[error("nothing to export")]
    NothingToExport,
}

impl ExportFailure {
    /// True if the export was stopped by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportFailure::Storage(cloudstore::Error::Cancelled))
    }
}

/// A failed bulk export, recording the state it failed in and any artifacts that were fully
/// downloaded before the failure.  Those artifacts remain in their sinks.
#[derive(Debug, Error)]
#[error("bulk export failed in state {state}: {source}")]
pub struct ExportError {
    pub state: ExportState,
    pub downloaded: Vec<DownloadedArtifact>,
    #[source]
    pub source: ExportFailure,
}

impl ExportError {
    pub(crate) fn new<F: Into<ExportFailure>>(
        state: ExportState,
        downloaded: Vec<DownloadedArtifact>,
        source: F,
    ) -> Self {
        Self {
            state,
            downloaded,
            source: source.into(),
        }
    }
}
