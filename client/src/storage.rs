use crate::client::{Client, ClientBuilder};
use crate::error::{Error, Result};
use crate::types::{BulkEntry, ListingQuery, ObjectDescriptor, Page, PageCursor};
use crate::util::path_segment;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::pin::Pin;

/// A streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Storage Service
///
/// Each method corresponds to one endpoint of the Cloud Storage Service API.  All
/// methods require a client configured with a bearer token.
pub struct Storage {
    /// The underlying client used to make API calls for this service.
    pub client: Client,
}

impl Storage {
    /// Create a new Storage instance, based on the given client builder
    pub fn new<CB: Into<ClientBuilder>>(client_builder: CB) -> Result<Self> {
        Ok(Self {
            client: client_builder.into().build()?,
        })
    }

    /// Fetch one page of object metadata.  The page's `last_page` flag is the server's own
    /// signal that no further pages exist.
    pub async fn list_objects(&self, query: &ListingQuery, cursor: PageCursor) -> Result<Page> {
        let page_key = cursor.page_key();
        let limit = query.page_size.to_string();
        let query_pairs = vec![
            ("filter", query.filter.as_str()),
            ("pageKey", page_key.as_str()),
            ("limit", limit.as_str()),
            ("sortField", query.sort_field.as_str()),
            ("sortDirection", query.sort_direction.as_str()),
        ];
        let resp = self
            .client
            .request("GET", "objects", Some(query_pairs), None)
            .await?;
        decode(resp).await
    }

    /// Fetch the metadata of a single object.
    pub async fn object_metadata(&self, object_id: &str) -> Result<ObjectDescriptor> {
        let path = format!("objects/{}/metadata", path_segment(object_id)?);
        let resp = self.client.request("GET", &path, None, None).await?;
        decode(resp).await
    }

    /// Stream the content of a single object.
    pub async fn object_content(&self, object_id: &str) -> Result<ByteStream> {
        let path = format!("objects/{}/content", path_segment(object_id)?);
        let resp = self.client.request("GET", &path, None, None).await?;
        Ok(byte_stream(resp))
    }

    /// Request a bulk (zip) download of the given objects.  The response lists the zip
    /// artifacts that the server will generate, with their initial status.  Each call creates a
    /// new server-side request, so it is never retried.
    pub async fn start_bulk_download(&self, object_ids: &[String]) -> Result<Vec<BulkEntry>> {
        let body = Value::from(object_ids.to_vec());
        let resp = self
            .client
            .request("POST", "bulk/download/start", None, Some(&body))
            .await?;
        decode(resp).await
    }

    /// Get the status of all bulk download requests for the account.  Note that this includes
    /// artifacts from every in-flight request, not just the caller's.
    pub async fn bulk_status(&self) -> Result<Vec<BulkEntry>> {
        let resp = self
            .client
            .request("GET", "bulk/download/status", None, None)
            .await?;
        decode(resp).await
    }

    /// Get the status of a single zip artifact.  The server may answer with a single entry or a
    /// list; both are returned as a list.
    pub async fn zip_status(&self, zip_name: &str) -> Result<Vec<BulkEntry>> {
        let path = format!("bulk/download/status/{}", path_segment(zip_name)?);
        let resp = self.client.request("GET", &path, None, None).await?;
        let endpoint = resp.url().to_string();
        match decode::<Value>(resp).await? {
            v @ Value::Array(_) => {
                serde_json::from_value(v).map_err(|e| Error::decode(endpoint, e))
            }
            v => {
                let entry: BulkEntry =
                    serde_json::from_value(v).map_err(|e| Error::decode(endpoint, e))?;
                Ok(vec![entry])
            }
        }
    }

    /// Stream the content of a generated zip artifact.
    pub async fn bulk_content(&self, zip_name: &str) -> Result<ByteStream> {
        let path = format!("bulk/download/{}", path_segment(zip_name)?);
        let resp = self.client.request("GET", &path, None, None).await?;
        Ok(byte_stream(resp))
    }

    /// Discard all generated zip artifacts for the account.  Downloading an artifact does not
    /// remove it from the server, so this should follow every bulk download.
    pub async fn clear_bulk_requests(&self) -> Result<()> {
        self.client
            .request("PUT", "bulk/download/clear", None, None)
            .await?;
        Ok(())
    }
}

/// Read a response body and decode it as JSON.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let endpoint = resp.url().to_string();
    let body = resp.bytes().await.map_err(|source| Error::Transport {
        endpoint: endpoint.clone(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|e| Error::decode(endpoint, e))
}

fn byte_stream(resp: reqwest::Response) -> ByteStream {
    let endpoint = resp.url().to_string();
    Box::pin(resp.bytes_stream().map(move |r| {
        r.map_err(|source| Error::Transport {
            endpoint: endpoint.clone(),
            source,
        })
    }))
}
