//! Trait wrappers around the client types, allowing fake injection during tests.
use async_trait::async_trait;
use cloudstore::{
    Auth, BulkEntry, ByteStream, Credentials, ListingQuery, Page, PageCursor, Result, Storage,
    Token,
};
use std::sync::Arc;

/// The storage service methods used by listing, object download and bulk export.  In production
/// this calls the service via [`Storage`]; in testing it can be faked.  Each method has a default
/// implementation that panics with "not implemented", so fakes need only implement the
/// necessary methods.
#[allow(unused_variables)]
#[async_trait]
pub trait StorageService: 'static + Send + Sync {
    async fn list_objects(&self, query: &ListingQuery, cursor: PageCursor) -> Result<Page> {
        todo!()
    }
    async fn object_content(&self, object_id: &str) -> Result<ByteStream> {
        todo!()
    }
    async fn start_bulk_download(&self, object_ids: &[String]) -> Result<Vec<BulkEntry>> {
        todo!()
    }
    async fn bulk_status(&self) -> Result<Vec<BulkEntry>> {
        todo!()
    }
    async fn bulk_content(&self, zip_name: &str) -> Result<ByteStream> {
        todo!()
    }
    async fn clear_bulk_requests(&self) -> Result<()> {
        todo!()
    }
}

/// Trivial implementation of the [`StorageService`] trait for the [`Storage`] client struct
#[async_trait]
impl StorageService for Storage {
    async fn list_objects(&self, query: &ListingQuery, cursor: PageCursor) -> Result<Page> {
        (self as &Storage).list_objects(query, cursor).await
    }
    async fn object_content(&self, object_id: &str) -> Result<ByteStream> {
        (self as &Storage).object_content(object_id).await
    }
    async fn start_bulk_download(&self, object_ids: &[String]) -> Result<Vec<BulkEntry>> {
        (self as &Storage).start_bulk_download(object_ids).await
    }
    async fn bulk_status(&self) -> Result<Vec<BulkEntry>> {
        (self as &Storage).bulk_status().await
    }
    async fn bulk_content(&self, zip_name: &str) -> Result<ByteStream> {
        (self as &Storage).bulk_content(zip_name).await
    }
    async fn clear_bulk_requests(&self) -> Result<()> {
        (self as &Storage).clear_bulk_requests().await
    }
}

/// Something that can exchange credentials for a bearer token.
#[async_trait]
pub trait TokenProvider: 'static + Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token>;
}

#[async_trait]
impl TokenProvider for Auth {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        (self as &Auth).authenticate(credentials).await
    }
}

/// A ServiceFactory supplies [`StorageService`] instances carrying a valid token.  Call this
/// once for each batch of requests (a listing page, a status poll, an artifact download) rather
/// than holding on to the result, so that expired tokens can be replaced.
#[async_trait]
pub trait ServiceFactory: 'static + Send + Sync {
    async fn storage(&self) -> Result<Arc<dyn StorageService>>;
}

/// A ServiceFactory that returns the same service every time.  This suits callers managing
/// their own token, and tests.
#[derive(Clone)]
pub struct StaticServiceFactory(Arc<dyn StorageService>);

impl StaticServiceFactory {
    pub fn new<S: StorageService>(storage: S) -> Self {
        Self(Arc::new(storage))
    }

    pub fn from_arc(storage: Arc<dyn StorageService>) -> Self {
        Self(storage)
    }

    /// Convert to an `Arc<dyn ServiceFactory>`
    pub fn as_service_factory(self) -> Arc<dyn ServiceFactory> {
        Arc::new(self)
    }
}

#[async_trait]
impl ServiceFactory for StaticServiceFactory {
    async fn storage(&self) -> Result<Arc<dyn StorageService>> {
        Ok(self.0.clone())
    }
}
