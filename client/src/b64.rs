use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Build the value of a Basic `Authorization` header for the given key and secret.
pub(crate) fn basic_auth(key: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", key, secret)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_key_colon_secret() {
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }
}
