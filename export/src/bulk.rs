use crate::error::{ExportError, ExportFailure, ExportState};
use crate::object::DEFAULT_CHUNK_SIZE;
use crate::service::ServiceFactory;
use crate::sink::SinkFactory;
use crate::stream::copy_to_sink;
use cloudstore::{ArtifactStatus, BulkEntry, ByteStream, Error, Result};
use slog::{debug, info, warn, Logger};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// When to clear the server's bulk download requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Clear only once every artifact has been downloaded.
    #[default]
    AfterSuccess,
    /// Also make a best-effort attempt to clear after a failed poll or download.
    Always,
}

/// Configuration for a [`BulkExport`].
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Pause before each status request (default 1s).  Must be positive.
    pub poll_interval: Duration,

    /// Give up after this many status requests (default 600).
    pub max_poll_attempts: Option<u32>,

    /// Give up once polling has taken this long (default 1 hour).
    pub max_poll_duration: Option<Duration>,

    /// Maximum size of each write to a sink (default 1024).
    pub chunk_size: usize,

    pub cleanup_policy: CleanupPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: Some(600),
            max_poll_duration: Some(Duration::from_secs(3600)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cleanup_policy: CleanupPolicy::default(),
        }
    }
}

impl ExportConfig {
    /// Check that this configuration can drive an export to completion.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        match (self.max_poll_attempts, self.max_poll_duration) {
            (None, None) => Err(Error::Config(
                "one of max_poll_attempts or max_poll_duration is required".into(),
            )),
            (Some(0), _) => Err(Error::Config("max_poll_attempts must be positive".into())),
            _ => Ok(()),
        }
    }
}

/// An artifact that was completely downloaded and finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub name: String,
    pub size: u64,
}

/// The result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub state: ExportState,
    /// Artifacts, in the order they were downloaded
    pub artifacts: Vec<DownloadedArtifact>,
    /// Number of status requests made
    pub polls: u32,
}

/// The artifacts planned by one bulk download request.  The server's status endpoint reports on
/// every request for the account, so snapshots are always filtered to these names.
#[derive(Debug)]
struct BulkJob {
    names: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Observation {
    /// Every artifact is DONE; contains the names in snapshot order.
    Ready(Vec<String>),
    Pending { done: usize },
    Failed(String),
}

impl BulkJob {
    fn new(planned: Vec<BulkEntry>) -> Self {
        let mut names: Vec<String> = vec![];
        for entry in planned {
            if !names.contains(&entry.zip_name) {
                names.push(entry.zip_name);
            }
        }
        Self { names }
    }

    fn tracks(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn observe(&self, snapshot: &[BulkEntry]) -> Observation {
        let tracked: Vec<&BulkEntry> = snapshot
            .iter()
            .filter(|e| self.tracks(&e.zip_name))
            .collect();

        if let Some(failed) = tracked.iter().find(|e| e.status == ArtifactStatus::Failed) {
            return Observation::Failed(failed.zip_name.clone());
        }

        let is_done = |name: &str| {
            let mut entries = tracked.iter().filter(|e| e.zip_name == name).peekable();
            entries.peek().is_some() && entries.all(|e| e.status == ArtifactStatus::Done)
        };
        let done = self.names.iter().filter(|n| is_done(n)).count();
        if done < self.names.len() {
            return Observation::Pending { done };
        }

        let mut order: Vec<String> = vec![];
        for entry in tracked {
            if !order.contains(&entry.zip_name) {
                order.push(entry.zip_name.clone());
            }
        }
        Observation::Ready(order)
    }
}

/// Race a storage call against cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, f: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        r = f => r,
    }
}

/// A bulk export: request zip artifacts for a set of objects, wait for the server to generate
/// them, download each into a sink, and finally clear the request from the server.
///
/// The export runs once.  Its current [`ExportState`] is available from [`BulkExport::state`],
/// and each state change is logged.  On failure the export stops in the failure state for the
/// phase that failed; artifacts already downloaded are left in their sinks and listed in the
/// [`ExportError`].
pub struct BulkExport<SF: SinkFactory> {
    pub logger: Logger,
    services: Arc<dyn ServiceFactory>,
    sinks: SF,
    config: ExportConfig,
    cancel: CancellationToken,
    state: ExportState,
}

impl<SF: SinkFactory> BulkExport<SF> {
    pub fn new(
        logger: Logger,
        services: Arc<dyn ServiceFactory>,
        sinks: SF,
        config: ExportConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            logger,
            services,
            sinks,
            config,
            cancel: CancellationToken::new(),
            state: ExportState::Idle,
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Run the export for the given object ids.
    pub async fn run(&mut self, object_ids: &[String]) -> Result<ExportReport, ExportError> {
        if self.state != ExportState::Idle {
            return Err(ExportError::new(
                self.state,
                vec![],
                Error::Config("bulk export has already run".into()),
            ));
        }

        let job = match self.submit(object_ids).await {
            Ok(job) => job,
            Err(e) => return Err(self.fail(ExportState::SubmitFailed, vec![], e)),
        };

        let (order, polls) = match self.poll(&job).await {
            Ok(ready) => ready,
            Err(e) => {
                self.cleanup_after_failure().await;
                return Err(self.fail(ExportState::PollFailed, vec![], e));
            }
        };
        self.transition(ExportState::Ready);

        let mut downloaded = vec![];
        if let Err(e) = self.download(&order, &mut downloaded).await {
            self.cleanup_after_failure().await;
            return Err(self.fail(ExportState::DownloadFailed, downloaded, e));
        }

        if let Err(e) = self.cleanup().await {
            return Err(self.fail(ExportState::CleanupFailed, downloaded, e));
        }
        self.transition(ExportState::Cleaned);

        Ok(ExportReport {
            state: self.state,
            artifacts: downloaded,
            polls,
        })
    }

    fn transition(&mut self, to: ExportState) {
        info!(self.logger, "bulk export state change"; "from" => %self.state, "to" => %to);
        self.state = to;
    }

    fn fail<F: Into<ExportFailure>>(
        &mut self,
        state: ExportState,
        downloaded: Vec<DownloadedArtifact>,
        source: F,
    ) -> ExportError {
        let err = ExportError::new(state, downloaded, source);
        warn!(self.logger, "bulk export failed"; "state" => %state, "error" => %err.source);
        self.state = state;
        err
    }

    async fn submit(&mut self, object_ids: &[String]) -> Result<BulkJob, ExportFailure> {
        if object_ids.is_empty() {
            return Err(ExportFailure::NothingToExport);
        }

        let services = &self.services;
        let planned = cancellable(&self.cancel, async {
            services
                .storage()
                .await?
                .start_bulk_download(object_ids)
                .await
        })
        .await?;

        let job = BulkJob::new(planned);
        if job.names.is_empty() {
            return Err(ExportFailure::NothingToExport);
        }
        self.transition(ExportState::Submitted);
        info!(self.logger, "bulk download requested";
            "objects" => object_ids.len(),
            "artifacts" => job.names.join(","));
        Ok(job)
    }

    /// Poll the status until every tracked artifact is DONE, returning the download order and
    /// the number of polls.
    async fn poll(&mut self, job: &BulkJob) -> Result<(Vec<String>, u32), ExportFailure> {
        self.transition(ExportState::Polling);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            let mut delay = self.config.poll_interval;
            if let Some(max) = self.config.max_poll_duration {
                let elapsed = started.elapsed();
                if elapsed >= max {
                    return Err(ExportFailure::NotReady { attempts, elapsed });
                }
                // the last poll happens at the deadline, not an interval past it
                delay = delay.min(max - elapsed);
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled.into()),
                _ = tokio::time::sleep(delay) => {},
            }

            attempts += 1;
            let services = &self.services;
            let snapshot = cancellable(&self.cancel, async {
                services.storage().await?.bulk_status().await
            })
            .await?;

            match job.observe(&snapshot) {
                Observation::Ready(order) => {
                    debug!(self.logger, "all artifacts ready"; "polls" => attempts);
                    return Ok((order, attempts));
                }
                Observation::Failed(name) => return Err(ExportFailure::ArtifactFailed { name }),
                Observation::Pending { done } => {
                    debug!(self.logger, "artifacts pending";
                        "poll" => attempts,
                        "done" => done,
                        "total" => job.names.len());
                }
            }

            let elapsed = started.elapsed();
            let out_of_attempts = self.config.max_poll_attempts.map_or(false, |max| attempts >= max);
            let out_of_time = self.config.max_poll_duration.map_or(false, |max| elapsed >= max);
            if out_of_attempts || out_of_time {
                return Err(ExportFailure::NotReady { attempts, elapsed });
            }
        }
    }

    /// Download each artifact in order, stopping at the first failure.
    async fn download(
        &mut self,
        order: &[String],
        downloaded: &mut Vec<DownloadedArtifact>,
    ) -> Result<(), ExportFailure> {
        self.transition(ExportState::Downloading);

        for name in order {
            let body = self.open(name).await?;
            let mut sink = self.sinks.create_sink(name).await?;
            let size = copy_to_sink(
                name,
                body,
                &mut *sink,
                self.config.chunk_size,
                &self.cancel,
            )
            .await?;
            info!(self.logger, "downloaded artifact"; "name" => name, "size" => size);
            downloaded.push(DownloadedArtifact {
                name: name.clone(),
                size,
            });
        }
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<ByteStream> {
        let services = &self.services;
        cancellable(&self.cancel, async {
            services.storage().await?.bulk_content(name).await
        })
        .await
    }

    async fn cleanup(&self) -> Result<()> {
        let services = &self.services;
        cancellable(&self.cancel, async {
            services.storage().await?.clear_bulk_requests().await
        })
        .await?;
        debug!(self.logger, "cleared bulk download requests");
        Ok(())
    }

    async fn cleanup_after_failure(&self) {
        if self.config.cleanup_policy != CleanupPolicy::Always {
            return;
        }
        if let Err(e) = self.cleanup().await {
            warn!(self.logger, "best-effort cleanup failed"; "error" => %e);
        }
    }
}
