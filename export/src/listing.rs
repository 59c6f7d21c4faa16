use crate::service::ServiceFactory;
use cloudstore::{Error, ListingQuery, ObjectDescriptor, Page, PageCursor, Result};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use slog::{debug, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for an [`ObjectLister`].
#[derive(Debug, Clone)]
pub struct ListingConfig {
    /// Pause between consecutive page requests (default 100ms).  Zero disables the pause.
    pub page_delay: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(100),
        }
    }
}

/// Lists all objects matching a query, page by page.
///
/// Pages are requested strictly in order, starting from the first, until the server marks a
/// page as the last one.  Items are produced in server order.
pub struct ObjectLister {
    pub logger: Logger,
    services: Arc<dyn ServiceFactory>,
    config: ListingConfig,
    cancel: CancellationToken,
}

struct Listing {
    logger: Logger,
    services: Arc<dyn ServiceFactory>,
    page_delay: Duration,
    cancel: CancellationToken,
    query: ListingQuery,
    /// The next page to fetch, or None when the last page has been seen.
    next: Option<PageCursor>,
    first: bool,
}

impl ObjectLister {
    pub fn new(logger: Logger, services: Arc<dyn ServiceFactory>, config: ListingConfig) -> Self {
        Self {
            logger,
            services,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// List every matching object, failing without partial results if any page fails.
    pub async fn list_all(&self, query: ListingQuery) -> Result<Vec<ObjectDescriptor>> {
        self.stream(query).try_collect().await
    }

    /// Lazily list matching objects.  Pages are fetched as the stream is polled; a failure ends
    /// the stream after the items of all previous pages have been produced.
    pub fn stream(&self, query: ListingQuery) -> BoxStream<'static, Result<ObjectDescriptor>> {
        let listing = Listing {
            logger: self.logger.clone(),
            services: self.services.clone(),
            page_delay: self.config.page_delay,
            cancel: self.cancel.clone(),
            query,
            next: Some(PageCursor::start()),
            first: true,
        };

        stream::try_unfold(listing, |mut listing| async move {
            let cursor = match listing.next {
                Some(cursor) => cursor,
                None => return Ok(None),
            };
            if !listing.first {
                listing.pause().await?;
            }
            listing.first = false;

            let page = listing.fetch(cursor).await?;
            debug!(listing.logger, "fetched listing page";
                "page_key" => cursor.page_key(),
                "items" => page.content.len(),
                "last_page" => page.last_page);

            listing.next = if page.last_page {
                None
            } else if page.content.is_empty() {
                return Err(Error::decode(
                    "objects",
                    format!("page {} is empty but not marked last", cursor.page_key()),
                ));
            } else {
                Some(cursor.after(&page))
            };
            Ok::<_, Error>(Some((page.content, listing)))
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }
}

impl Listing {
    async fn pause(&self) -> Result<()> {
        if self.page_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.page_delay) => Ok(()),
        }
    }

    async fn fetch(&self, cursor: PageCursor) -> Result<Page> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            r = async {
                self.services
                    .storage()
                    .await?
                    .list_objects(&self.query, cursor)
                    .await
            } => r,
        }
    }
}
