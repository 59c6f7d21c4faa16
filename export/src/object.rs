use crate::service::ServiceFactory;
use crate::sink::{ArtifactSink, FileSink, VecSink};
use crate::stream::copy_to_sink;
use cloudstore::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default size of the chunks written to a sink.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Downloads the content of single objects.
pub struct ObjectFetcher {
    services: Arc<dyn ServiceFactory>,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl ObjectFetcher {
    pub fn new(services: Arc<dyn ServiceFactory>) -> Self {
        Self {
            services,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Write to sinks in chunks of at most this many bytes.
    pub fn chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download an object's content into the given sink, returning the number of bytes
    /// written.  On failure the sink is aborted.
    pub async fn fetch_object(&self, object_id: &str, sink: &mut dyn ArtifactSink) -> Result<u64> {
        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            r = self.open(object_id) => r,
        };
        match body {
            Ok(body) => copy_to_sink(object_id, body, sink, self.chunk_size, &self.cancel).await,
            Err(e) => {
                sink.abort().await;
                Err(e)
            }
        }
    }

    async fn open(&self, object_id: &str) -> Result<cloudstore::ByteStream> {
        self.services.storage().await?.object_content(object_id).await
    }

    /// Download an object's content into a new file at `path`, which must not already exist.
    pub async fn fetch_object_to_file<P: AsRef<Path>>(
        &self,
        object_id: &str,
        path: P,
    ) -> Result<u64> {
        let mut sink = FileSink::create(path.as_ref()).await?;
        self.fetch_object(object_id, &mut sink).await
    }

    /// Download an object's content into memory.
    pub async fn fetch_object_to_vec(&self, object_id: &str) -> Result<Vec<u8>> {
        let mut sink = VecSink::new();
        self.fetch_object(object_id, &mut sink).await?;
        Ok(sink.into_inner())
    }
}
