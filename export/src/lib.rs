/*!
Support for listing, downloading and bulk-exporting objects from the Cloud Storage Service.

This crate builds on the `cloudstore` client.  Every component obtains its storage client from
a [`ServiceFactory`] once per batch of requests; a [`Session`] is the usual factory, exchanging
credentials for a bearer token and authenticating again whenever the token has expired.

# Listing

[`ObjectLister`] walks a paginated listing from the first page to the last, producing the
objects in server order, either all at once with [`ObjectLister::list_all`] or lazily with
[`ObjectLister::stream`].

# Single objects

[`ObjectFetcher`] streams the content of one object into an [`ArtifactSink`], a file, or memory.

# Bulk export

[`BulkExport`] drives the server's asynchronous zip export: it submits the object ids, polls the
status endpoint until every artifact it asked for is ready, downloads each artifact into a sink
produced by a [`SinkFactory`], and finally clears the request on the server.

```no_run
# async fn f() -> anyhow::Result<()> {
# let logger = slog::Logger::root(slog::Discard, slog::o!());
use cloudstore::{Auth, Credentials, ListingQuery};
use cloudstore_export::{
    BulkExport, DirectorySinkFactory, ExportConfig, ListingConfig, ObjectLister, Session,
    SessionConfig,
};
use std::sync::Arc;

let session = Arc::new(Session::new(
    logger.clone(),
    Credentials::from_env()?,
    Arc::new(Auth::new(cloudstore::DEFAULT_TOKEN_URL)?),
    SessionConfig::default(),
));

let lister = ObjectLister::new(logger.clone(), session.clone(), ListingConfig::default());
let objects = lister
    .list_all(ListingQuery::new().filter("type==callrecording"))
    .await?;
let ids: Vec<String> = objects.into_iter().map(|o| o.id).collect();

if !ids.is_empty() {
    let mut export = BulkExport::new(
        logger,
        session,
        DirectorySinkFactory::new("/tmp/recordings"),
        ExportConfig::default(),
    )?;
    let report = export.run(&ids).await?;
    println!("downloaded {} artifacts", report.artifacts.len());
}
# Ok(())
# }
```

All operations accept a [`CancellationToken`](tokio_util::sync::CancellationToken) via
`with_cancellation`; cancelling it interrupts the current request, sleep or download.
*/

mod bulk;
mod error;
mod listing;
mod object;
mod service;
mod session;
mod sink;
mod stream;

#[cfg(test)]
mod test_helpers;

pub use bulk::{BulkExport, CleanupPolicy, DownloadedArtifact, ExportConfig, ExportReport};
pub use error::{ExportError, ExportFailure, ExportState};
pub use listing::{ListingConfig, ObjectLister};
pub use object::{ObjectFetcher, DEFAULT_CHUNK_SIZE};
pub use service::{ServiceFactory, StaticServiceFactory, StorageService, TokenProvider};
pub use session::{Session, SessionConfig};
pub use sink::{
    ArtifactSink, DirectorySinkFactory, FileSink, MemorySinkFactory, SinkFactory, VecSink,
};
