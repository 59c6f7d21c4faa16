use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;

/// Credentials represents the key/secret pair generated in the admin console, used to obtain
/// bearer tokens from the authorization server.
#[derive(PartialEq, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Application key
    pub key: String,

    /// Application secret
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Create a new Credentials object with key and secret
    ///
    /// Examples:
    ///
    /// ```
    /// # use cloudstore::Credentials;
    /// let _ = Credentials::new("my_key", "my_secret");
    /// ```
    pub fn new<S1: Into<String>, S2: Into<String>>(key: S1, secret: S2) -> Credentials {
        Credentials {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Create a new Credentials object from environment variables:
    ///
    /// * `CLOUDSTORE_KEY`
    /// * `CLOUDSTORE_SECRET`
    pub fn from_env() -> Result<Credentials> {
        let key = env::var("CLOUDSTORE_KEY")
            .map_err(|e| Error::Config(format!("CLOUDSTORE_KEY: {}", e)))?;
        let secret = env::var("CLOUDSTORE_SECRET")
            .map_err(|e| Error::Config(format!("CLOUDSTORE_SECRET: {}", e)))?;
        let creds = Credentials { key, secret };
        creds.validate()?;
        Ok(creds)
    }

    /// Read credentials from a JSON file formatted as `{"key": "..", "secret": ".."}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Credentials> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("reading credentials file {}: {}", path.display(), e))
        })?;
        let creds: Credentials = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("parsing credentials file {}: {}", path.display(), e))
        })?;
        creds.validate()?;
        Ok(creds)
    }

    /// Check that both the key and the secret are non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::Config("credentials key is empty".into()));
        }
        if self.secret.is_empty() {
            return Err(Error::Config("credentials secret is empty".into()));
        }
        Ok(())
    }
}
