use crate::error::{Error, Result};
use crate::retry::{is_transient, Retry};
use crate::util::snippet;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// The storage API root used when no other root URL is given.
pub const DEFAULT_STORAGE_ROOT_URL: &str = "https://api.8x8.com/storage/us-west/v3/";

/// ClientBuilder implements the builder pattern for building a Client, allowing
/// optional configuration of features such as the bearer token, retry and timeout.
#[derive(Default, Debug, Clone)]
pub struct ClientBuilder {
    root_url: String,
    retry: Retry,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl ClientBuilder {
    /// Create a new ClientBuilder.  The storage root URL (including the API version path, such
    /// as `https://api.8x8.com/storage/us-west/v3/`) is required and so must always be
    /// specified.
    pub fn new<S: Into<String>>(root_url: S) -> Self {
        Self {
            root_url: root_url.into(),
            timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Add a bearer token to the client; it is sent with every request.
    pub fn bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the retry configuration for the client
    pub fn retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Set the timeout for each HTTP request made by the client.  The default is
    /// 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the resulting client, consuming the builder
    pub fn build(self) -> Result<Client> {
        Client::new(self)
    }
}

impl From<String> for ClientBuilder {
    fn from(root_url: String) -> Self {
        Self::new(root_url)
    }
}

impl From<&str> for ClientBuilder {
    fn from(root_url: &str) -> Self {
        Self::new(root_url)
    }
}

/// Client is the HTTP layer under [`Storage`](crate::Storage).  It holds the bearer token and
/// the service endpoint, which are required for all data operations.
#[derive(Debug)]
pub struct Client {
    /// Pre-built `Authorization` header value, if a token was given
    authorization: Option<HeaderValue>,

    /// Retry information.
    retry: Retry,

    /// The base URL for requests, always ending in `/`
    base_url: reqwest::Url,

    /// Reqwest client
    client: reqwest::Client,
}

impl Client {
    fn new(b: ClientBuilder) -> Result<Client> {
        let mut root_url = b.root_url;
        if !root_url.ends_with('/') {
            root_url.push('/');
        }
        let base_url = reqwest::Url::parse(&root_url)
            .map_err(|e| Error::Config(format!("while parsing {}: {}", root_url, e)))?;
        if base_url.host_str().is_none() {
            return Err(Error::Config(format!(
                "the root URL {} doesn't contain a host",
                root_url
            )));
        }

        if b.timeout.is_zero() {
            return Err(Error::Config("request timeout must be nonzero".into()));
        }

        // the reqwest client carries the timeout and handles connection re-use
        let client = reqwest::Client::builder()
            .timeout(b.timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {}", e)))?;

        let authorization = match b.bearer_token {
            None => None,
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| Error::Config("bearer token is not a valid header value".into()))?;
                value.set_sensitive(true);
                Some(value)
            }
        };

        Ok(Client {
            authorization,
            retry: b.retry,
            base_url,
            client,
        })
    }

    /// Make a request to the storage service.  While the [`Storage`](crate::Storage) methods are
    /// generally more convenient, this method can be used to call a path directly.
    ///
    /// The request URI is `<root_url>/<path>`.  The `path` parameter must not start with `/`.
    ///
    /// Transport failures and server errors are retried according to the client's [`Retry`]
    /// configuration.  Any other non-2xx response is returned as [`Error::Http`] without retry.
    /// Requests with a non-idempotent method (`POST`, `PATCH`) are sent exactly once, since a
    /// timed-out attempt may already have taken effect on the server.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        query: Option<Vec<(&str, &str)>>,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let req = self.build_request(method, path, query, body)?;
        let url = req.url().to_string();

        let mut backoff = if is_idempotent(req.method()) {
            self.retry.backoff()
        } else {
            Retry::never().backoff()
        };

        loop {
            let attempt = req
                .try_clone()
                .ok_or_else(|| Error::Config(format!("cannot clone the request {}", url)))?;

            let err = match self.client.execute(attempt).await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => http_error(method, resp).await,
                Err(source) => Error::Transport {
                    endpoint: url.clone(),
                    source,
                },
            };

            if !is_transient(&err) {
                return Err(err);
            }
            match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            }
        }
    }

    /// Get the root URL with which this client was configured, always ending in `/`.
    pub fn root_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Make a URL for the given path, constructed as for [`request`](crate::Client::request).
    /// The path must not begin with a `/`.
    pub fn make_url(&self, path: &str, query: Option<Vec<(&str, &str)>>) -> Result<String> {
        Ok(self.join(path, query)?.to_string())
    }

    fn join(&self, path: &str, query: Option<Vec<(&str, &str)>>) -> Result<reqwest::Url> {
        if path.starts_with('/') {
            return Err(Error::Config(
                "request path must not begin with `/`".into(),
            ));
        }

        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid request path {}: {}", path, e)))?;

        if let Some(q) = query {
            url.query_pairs_mut().extend_pairs(q);
        }
        Ok(url)
    }

    fn build_request(
        &self,
        method: &str,
        path: &str,
        query: Option<Vec<(&str, &str)>>,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let url = self.join(path, query)?;
        let meth = reqwest::Method::from_str(method)
            .map_err(|_| Error::Config(format!("invalid HTTP method {}", method)))?;

        let mut req = self.client.request(meth, url.clone());

        // pass content-length: 0 if there is no body; the clear endpoint is a body-less PUT
        if body.is_none() {
            req = req.header("Content-Length", "0");
        }

        if let Some(b) = body {
            req = req.json(b);
        }

        if let Some(ref authorization) = self.authorization {
            req = req.header(AUTHORIZATION, authorization.clone());
        }

        req.build().map_err(|source| Error::Transport {
            endpoint: url.to_string(),
            source,
        })
    }
}

fn is_idempotent(method: &reqwest::Method) -> bool {
    !matches!(*method, reqwest::Method::POST | reqwest::Method::PATCH)
}

/// Convert a non-success response into [`Error::Http`], consuming its body.
async fn http_error(method: &str, resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let endpoint = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Error::Http {
        method: method.to_owned(),
        endpoint,
        status,
        body: snippet(&body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;
    use std::time::Duration;

    fn retry_fast() -> Retry {
        Retry {
            retries: 6,
            max_delay: Duration::from_millis(1),
            delay_factor: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_simple_request() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/storage/v3/ping"))
                .respond_with(status_code(200)),
        );
        let root_url = server.url_str("/storage/v3");

        let client = ClientBuilder::new(root_url).build()?;
        let resp = client.request("GET", "ping", None, None).await?;
        assert!(resp.status().is_success());
        Ok(())
    }

    #[tokio::test]
    async fn test_bearer_token_sent() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v3/ping"),
                request::headers(contains(("authorization", "Bearer tok-123"))),
            ])
            .respond_with(status_code(200)),
        );

        let client = ClientBuilder::new(server.url_str("/v3/"))
            .bearer_token("tok-123")
            .build()?;
        client.request("GET", "ping", None, None).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v3/ping")).respond_with(
                // the test does not wait for this to actually finish
                delay_and_then(Duration::from_secs(30), status_code(200)),
            ),
        );

        let client = ClientBuilder::new(server.url_str("/v3/"))
            .timeout(Duration::from_millis(5))
            .retry(Retry::never())
            .build()?;
        let err = client.request("GET", "ping", None, None).await.unwrap_err();
        assert!(err.is_timeout());
        Ok(())
    }

    #[tokio::test]
    async fn test_query() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v3/objects"),
                request::query(url_decoded(contains(("filter", "type==callrecording,name==+1")))),
                request::query(url_decoded(contains(("limit", "100")))),
            ])
            .respond_with(status_code(200)),
        );

        let client = ClientBuilder::new(server.url_str("/v3/")).build()?;
        let resp = client
            .request(
                "GET",
                "objects",
                Some(vec![("filter", "type==callrecording,name==+1"), ("limit", "100")]),
                None,
            )
            .await?;
        assert!(resp.status().is_success());
        Ok(())
    }

    #[tokio::test]
    async fn test_body() -> anyhow::Result<()> {
        let body = json!(["a", "b"]);

        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v3/bulk/download/start"),
                request::body(json_decoded(eq(body.clone()))),
            ])
            .respond_with(status_code(200)),
        );

        let client = ClientBuilder::new(server.url_str("/v3/")).build()?;
        let resp = client
            .request("POST", "bulk/download/start", None, Some(&body))
            .await?;
        assert!(resp.status().is_success());
        Ok(())
    }

    #[test]
    fn make_url_simple() -> anyhow::Result<()> {
        let client = ClientBuilder::new("https://storage.example.com/v3").build()?;
        let url = client.make_url("bulk/download/status", None)?;
        assert_eq!(url, "https://storage.example.com/v3/bulk/download/status");
        Ok(())
    }

    #[test]
    fn make_url_query() -> anyhow::Result<()> {
        let client = ClientBuilder::new("https://storage.example.com/v3/").build()?;
        let url = client.make_url("objects", Some(vec![("pageKey", "0"), ("x!z", "1/3")]))?;
        assert_eq!(
            url,
            "https://storage.example.com/v3/objects?pageKey=0&x%21z=1%2F3"
        );
        Ok(())
    }

    #[test]
    fn make_url_rejects_leading_slash() {
        let client = ClientBuilder::new("https://storage.example.com/v3/")
            .build()
            .unwrap();
        assert!(matches!(
            client.make_url("/objects", None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn build_rejects_url_without_host() {
        assert!(matches!(
            ClientBuilder::new("not a url").build(),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_500_retry() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v3/objects"))
                .times(7) // 1 try, 6 retries
                .respond_with(status_code(500).body("boom")),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .retry(retry_fast())
            .build()?;

        let err = client
            .request("GET", "objects", None, None)
            .await
            .unwrap_err();
        match err {
            Error::Http {
                status,
                ref body,
                ref method,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
                assert_eq!(method, "GET");
            }
            other => panic!("unexpected error {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_500_then_success() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v3/objects"))
                .times(3)
                .respond_with(cycle(vec![
                    Box::new(status_code(503)) as Box<dyn Responder>,
                    Box::new(status_code(502)),
                    Box::new(status_code(200).body("ok")),
                ])),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .retry(retry_fast())
            .build()?;

        let resp = client.request("GET", "objects", None, None).await?;
        assert_eq!(resp.text().await?, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_post_503_not_retried() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v3/bulk/download/start"))
                .times(1)
                .respond_with(status_code(503).body("busy")),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .retry(retry_fast())
            .build()?;

        let err = client
            .request("POST", "bulk/download/start", None, Some(&json!(["a"])))
            .await
            .unwrap_err();
        assert_eq!(
            err.status_code(),
            Some(reqwest::StatusCode::SERVICE_UNAVAILABLE)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_post_timeout_not_retried() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v3/bulk/download/start"))
                .times(1)
                .respond_with(delay_and_then(Duration::from_secs(30), status_code(200))),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .timeout(Duration::from_millis(5))
            .retry(retry_fast())
            .build()?;

        let err = client
            .request("POST", "bulk/download/start", None, Some(&json!(["a"])))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        Ok(())
    }

    #[tokio::test]
    async fn test_put_500_retried() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("PUT", "/v3/bulk/download/clear"))
                .times(2)
                .respond_with(cycle(vec![
                    Box::new(status_code(500)) as Box<dyn Responder>,
                    Box::new(status_code(200)),
                ])),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .retry(retry_fast())
            .build()?;

        client
            .request("PUT", "bulk/download/clear", None, None)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_400_no_retry() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v3/objects"))
                .times(1)
                .respond_with(status_code(400).body("{\"message\":\"bad filter\"}")),
        );
        let client = ClientBuilder::new(server.url_str("/v3/"))
            .retry(retry_fast())
            .build()?;

        let err = client
            .request("GET", "objects", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(reqwest::StatusCode::BAD_REQUEST));
        assert!(err.to_string().contains("bad filter"));
        Ok(())
    }
}
