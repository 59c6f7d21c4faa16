//! Utilities for testing listings and exports
use crate::service::StorageService;
use async_trait::async_trait;
use bytes::Bytes;
use cloudstore::{
    ArtifactStatus, BulkEntry, ByteStream, Error, ListingQuery, ObjectDescriptor, Page,
    PageCursor, Result,
};
use futures_util::stream;
use serde_json::json;
use slog::{o, Drain, Logger};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Create a logger for use in tests
pub(crate) fn test_logger() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    Logger::root(drain, o!())
}

/// Event log, used to log calls from various places and then assert on them.
#[derive(Default, Clone)]
pub(crate) struct Events {
    logged: Arc<Mutex<Vec<String>>>,
}

impl Events {
    pub(crate) fn log<S: Into<String>>(&self, message: S) {
        self.logged.lock().unwrap().push(message.into())
    }

    pub(crate) fn assert(&self, expected: Vec<&str>) {
        assert_eq!(*self.logged.lock().unwrap(), expected);
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.logged
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

pub(crate) fn object(id: &str) -> ObjectDescriptor {
    serde_json::from_value(json!({ "id": id, "type": "callrecording" })).unwrap()
}

pub(crate) fn page(ids: &[&str], last_page: bool) -> Page {
    Page {
        content: ids.iter().map(|id| object(id)).collect(),
        last_page,
    }
}

pub(crate) fn entry(name: &str, status: ArtifactStatus) -> BulkEntry {
    BulkEntry::new(name, status)
}

pub(crate) fn http_error(method: &str, path: &str, status: u16) -> Error {
    Error::Http {
        method: method.into(),
        endpoint: format!("https://storage.example.com/v3/{}", path),
        status,
        body: "{\"message\":\"fake failure\"}".into(),
    }
}

/// Fake implementation of the storage service.  Every call is logged to `events`.
///
/// Listing pages are served in order, one per call.  Status snapshots are served in order, with
/// the last one repeating forever.  Artifact contents are served as the given network chunks;
/// an unknown artifact is a 404.
#[derive(Default)]
pub(crate) struct FakeStorage {
    pub(crate) events: Events,
    pages: Mutex<VecDeque<Result<Page>>>,
    start: Mutex<Option<Result<Vec<BulkEntry>>>>,
    statuses: Mutex<Vec<Result<Vec<BulkEntry>>>>,
    status_calls: Mutex<usize>,
    contents: HashMap<String, Vec<Bytes>>,
    broken: HashSet<String>,
    stalled: HashSet<String>,
    clear: Mutex<Option<Error>>,
}

impl FakeStorage {
    pub(crate) fn new(events: Events) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub(crate) fn with_pages(self, pages: Vec<Result<Page>>) -> Self {
        *self.pages.lock().unwrap() = pages.into();
        self
    }

    pub(crate) fn with_start(self, start: Result<Vec<BulkEntry>>) -> Self {
        *self.start.lock().unwrap() = Some(start);
        self
    }

    pub(crate) fn with_statuses(self, statuses: Vec<Result<Vec<BulkEntry>>>) -> Self {
        *self.statuses.lock().unwrap() = statuses;
        self
    }

    pub(crate) fn with_content(mut self, name: &str, chunks: &[&'static [u8]]) -> Self {
        self.contents.insert(
            name.to_owned(),
            chunks.iter().map(|c| Bytes::from_static(c)).collect(),
        );
        self
    }

    /// Serve the content's chunks, then fail mid-stream.
    pub(crate) fn with_broken_content(mut self, name: &str, chunks: &[&'static [u8]]) -> Self {
        self = self.with_content(name, chunks);
        self.broken.insert(name.to_owned());
        self
    }

    /// Serve content that never arrives.
    pub(crate) fn with_stalled_content(mut self, name: &str) -> Self {
        self.stalled.insert(name.to_owned());
        self
    }

    pub(crate) fn with_clear_error(self, err: Error) -> Self {
        *self.clear.lock().unwrap() = Some(err);
        self
    }

    fn serve(&self, path: String, name: &str) -> Result<ByteStream> {
        if self.stalled.contains(name) {
            return Ok(Box::pin(stream::pending::<Result<Bytes>>()));
        }
        let chunks = match self.contents.get(name) {
            Some(chunks) => chunks.clone(),
            None => return Err(http_error("GET", &path, 404)),
        };
        let mut items: Vec<Result<Bytes>> = chunks.into_iter().map(Ok).collect();
        if self.broken.contains(name) {
            items.push(Err(Error::decode(path, "connection reset mid-body")));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn list_objects(&self, query: &ListingQuery, cursor: PageCursor) -> Result<Page> {
        self.events.log(format!(
            "list filter={} pageKey={}",
            query.filter,
            cursor.page_key()
        ));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .expect("no more pages scripted")
    }

    async fn object_content(&self, object_id: &str) -> Result<ByteStream> {
        self.events.log(format!("content {}", object_id));
        self.serve(format!("objects/{}/content", object_id), object_id)
    }

    async fn start_bulk_download(&self, object_ids: &[String]) -> Result<Vec<BulkEntry>> {
        self.events.log(format!("start {}", object_ids.join(",")));
        self.start
            .lock()
            .unwrap()
            .take()
            .expect("start called more than once")
    }

    async fn bulk_status(&self) -> Result<Vec<BulkEntry>> {
        self.events.log("status");
        let mut calls = self.status_calls.lock().unwrap();
        let statuses = self.statuses.lock().unwrap();
        let i = (*calls).min(statuses.len() - 1);
        *calls += 1;
        match &statuses[i] {
            Ok(entries) => Ok(entries.clone()),
            Err(_) => Err(http_error("GET", "bulk/download/status", 503)),
        }
    }

    async fn bulk_content(&self, zip_name: &str) -> Result<ByteStream> {
        self.events.log(format!("download {}", zip_name));
        self.serve(format!("bulk/download/{}", zip_name), zip_name)
    }

    async fn clear_bulk_requests(&self) -> Result<()> {
        self.events.log("clear");
        match self.clear.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
