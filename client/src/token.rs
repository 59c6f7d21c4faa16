use crate::b64::basic_auth;
use crate::error::{Error, Result};
use crate::util::snippet;
use crate::Credentials;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// The authorization server endpoint used when no other is given.
pub const DEFAULT_TOKEN_URL: &str = "https://api.8x8.com/oauth/v2/token";

/// A bearer token obtained from the authorization server.  Tokens are immutable; an expired
/// token is replaced by authenticating again.
#[derive(Clone, PartialEq)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
    expires_in: Duration,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl Token {
    pub fn new<S: Into<String>>(value: S, issued_at: DateTime<Utc>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_in,
        }
    }

    /// The bearer token value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// `issued_at + expires_in`
    pub fn expires_at(&self) -> DateTime<Utc> {
        match chrono::Duration::from_std(self.expires_in) {
            Ok(d) => self
                .issued_at
                .checked_add_signed(d)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }

    /// True if the token is no longer valid at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "seconds")]
    expires_in: u64,
}

/// The authorization server has been seen to send `expires_in` both as a number and as a
/// numeric string.
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    use serde::de::Error as _;
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("expires_in is not a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expires_in {:?} is not an integer", s))),
        other => Err(D::Error::custom(format!(
            "expires_in has unexpected type: {}",
            other
        ))),
    }
}

/// Client for the authorization server, exchanging [`Credentials`] for a [`Token`] using the
/// OAuth2 client-credentials grant.  `Auth` does not cache tokens.
#[derive(Debug, Clone)]
pub struct Auth {
    token_url: String,
    client: reqwest::Client,
}

impl Auth {
    /// Create a client for the given token endpoint, with a 30 second request timeout.
    pub fn new<S: Into<String>>(token_url: S) -> Result<Self> {
        Self::with_timeout(token_url, Duration::from_secs(30))
    }

    pub fn with_timeout<S: Into<String>>(token_url: S, timeout: Duration) -> Result<Self> {
        let token_url = token_url.into();
        reqwest::Url::parse(&token_url)
            .map_err(|e| Error::Config(format!("while parsing {}: {}", token_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self { token_url, client })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange credentials for a bearer token.  Any non-success response is returned as
    /// [`Error::Auth`] carrying the server's payload; this is not retried.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        credentials.validate()?;

        let resp = self
            .client
            .post(&self.token_url)
            .header(
                AUTHORIZATION,
                basic_auth(&credentials.key, &credentials.secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| Error::Transport {
                endpoint: self.token_url.clone(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| Error::Transport {
            endpoint: self.token_url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(Error::Auth {
                endpoint: self.token_url.clone(),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::decode(self.token_url.as_str(), e))?;

        Ok(Token::new(
            parsed.access_token,
            Utc::now(),
            Duration::from_secs(parsed.expires_in),
        ))
    }
}
