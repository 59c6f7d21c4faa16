/*!
# Cloud Storage Service Client for Rust

This client is a thin wrapper around `reqwest` that provides a named function for each endpoint
of the Cloud Storage Service and adds authentication, typed errors and retries.

# Usage

## Authentication

The service uses the OAuth2 client-credentials flow.  A key/secret pair generated in the admin
console is exchanged for a short-lived bearer token with [`Auth::authenticate`]:

```
# use httptest::{matchers::*, responders::*, Expectation, Server};
# use serde_json::json;
# #[tokio::main]
# async fn main() -> Result<(), cloudstore::Error> {
# let server = Server::run();
# server.expect(
#     Expectation::matching(request::method_path("POST", "/oauth/v2/token"))
#     .respond_with(json_encoded(json!({"access_token": "tok", "expires_in": 1800}))));
# let token_url = server.url_str("/oauth/v2/token");
use cloudstore::{Auth, Credentials};
let auth = Auth::new(token_url)?;
let token = auth.authenticate(&Credentials::new("my-key", "my-secret")).await?;
assert!(!token.is_expired());
# Ok(())
# }
```

Tokens are not refreshed by this crate; see `cloudstore-export`'s `Session` for that.

## Calling the Storage Service

Build a [`Storage`] from a [`ClientBuilder`] carrying the token:

```
# use httptest::{matchers::*, responders::*, Expectation, Server};
# use serde_json::json;
# #[tokio::main]
# async fn main() -> Result<(), cloudstore::Error> {
# let server = Server::run();
# server.expect(
#     Expectation::matching(request::method_path("GET", "/v3/objects"))
#     .respond_with(json_encoded(json!({"content": [{"id": "x"}], "lastPage": true}))));
# let root_url = server.url_str("/v3/");
use cloudstore::{ClientBuilder, ListingQuery, PageCursor, Storage};
let storage = Storage::new(ClientBuilder::new(root_url).bearer_token("tok"))?;
let query = ListingQuery::new().filter("type==callrecording");
let page = storage.list_objects(&query, PageCursor::start()).await?;
assert!(page.last_page);
# Ok(())
# }
```

## Retries

By default, requests are retried on transport failures and 5xx responses, with exponential
backoff.  This can be configured with [`ClientBuilder::retry`]; set `retries` to zero to
disable retries entirely.  Each request is subject to a timeout, 30 seconds by default, set with
[`ClientBuilder::timeout`].

## Errors

Every fallible operation returns [`Error`].  Non-2xx responses become [`Error::Http`] (or
[`Error::Auth`] from the authorization server), carrying the endpoint, status code and response
body.
*/

mod b64;
mod client;
mod credentials;
mod error;
pub mod retry;
mod storage;
mod token;
mod types;
mod util;

pub use client::{Client, ClientBuilder, DEFAULT_STORAGE_ROOT_URL};
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use retry::Retry;
pub use storage::{ByteStream, Storage};
pub use token::{Auth, Token, DEFAULT_TOKEN_URL};
pub use types::{
    ArtifactStatus, BulkEntry, ListingQuery, ObjectDescriptor, Page, PageCursor, SortDirection,
};

// re-export
pub use chrono;
pub use reqwest::StatusCode;
