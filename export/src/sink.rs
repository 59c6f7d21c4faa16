use async_trait::async_trait;
use cloudstore::{Error, Result};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// An ArtifactSink is an ordered destination for downloaded bytes.  Exactly one of `finalize` or
/// `abort` is called when the download ends; dropping a sink without either still releases any
/// underlying handle.
#[async_trait]
pub trait ArtifactSink: Send {
    /// Append a chunk of data.
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Finish writing, returning the total size of the data in bytes.
    async fn finalize(&mut self) -> Result<u64>;

    /// Abandon the download, releasing resources and discarding any partial data.
    async fn abort(&mut self);
}

/// A SinkFactory produces a fresh [`ArtifactSink`] for each named artifact of a bulk export.
#[async_trait]
pub trait SinkFactory: Send {
    async fn create_sink(&mut self, name: &str) -> Result<Box<dyn ArtifactSink>>;
}

/// A sink writing to a local file.  The file is created exclusively: an existing file at the
/// same path is never overwritten.
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Create the file at `path`, failing if it already exists.
    pub async fn create<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let target = self.target();
        match self.file {
            Some(ref mut file) => file
                .write_all(chunk)
                .await
                .map_err(|e| Error::io(target, e)),
            None => Err(Error::io(target, ErrorKind::BrokenPipe.into())),
        }
    }

    async fn finalize(&mut self) -> Result<u64> {
        let target = self.target();
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::io(target.clone(), ErrorKind::BrokenPipe.into()))?;
        file.flush().await.map_err(|e| Error::io(target.clone(), e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::io(target, e))?
            .len();
        Ok(size)
    }

    async fn abort(&mut self) {
        // closing the handle before removing the file
        if self.file.take().is_some() {
            let _ = tokio::fs::remove_file(&self.path).await;
        }
    }
}

/// A sink collecting data in memory.
#[derive(Default, Debug)]
pub struct VecSink(Vec<u8>);

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the sink, returning the data written to it
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

#[async_trait]
impl ArtifactSink for VecSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.0.extend_from_slice(chunk);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<u64> {
        Ok(self.0.len() as u64)
    }

    async fn abort(&mut self) {
        self.0.clear();
    }
}

/// Creates a [`FileSink`] in a directory for each artifact, named after the artifact.
#[derive(Debug, Clone)]
pub struct DirectorySinkFactory {
    dir: PathBuf,
}

impl DirectorySinkFactory {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

/// Artifact names come from the server, so they must be plain file names.
fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(Error::io(
            name,
            std::io::Error::new(
                ErrorKind::InvalidInput,
                "artifact name is not a plain file name",
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl SinkFactory for DirectorySinkFactory {
    async fn create_sink(&mut self, name: &str) -> Result<Box<dyn ArtifactSink>> {
        check_file_name(name)?;
        Ok(Box::new(FileSink::create(self.dir.join(name)).await?))
    }
}

/// Collects each finalized artifact in memory, keyed by name.  Clones share the same
/// collection.
#[derive(Default, Clone, Debug)]
pub struct MemorySinkFactory {
    finished: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the data of a finalized artifact.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Names of all finalized artifacts, sorted.
    pub fn names(&self) -> Vec<String> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

struct MemorySink {
    name: String,
    data: VecSink,
    finished: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.data.write(chunk).await
    }

    async fn finalize(&mut self) -> Result<u64> {
        let data = std::mem::take(&mut self.data).into_inner();
        let size = data.len() as u64;
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(self.name.clone(), data);
        Ok(size)
    }

    async fn abort(&mut self) {
        self.data.abort().await;
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    async fn create_sink(&mut self, name: &str) -> Result<Box<dyn ArtifactSink>> {
        Ok(Box::new(MemorySink {
            name: name.to_owned(),
            data: VecSink::new(),
            finished: self.finished.clone(),
        }))
    }
}
