use crate::error::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, NON_ALPHANUMERIC};

// object ids and zip names are embedded as single path segments, so everything but the
// RFC 3986 unreserved characters is escaped
const NOT_ENCODED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

pub(crate) fn urlencode(input: &str) -> PercentEncode<'_> {
    utf8_percent_encode(input, NOT_ENCODED)
}

/// Encode a name for use as a single path segment.  URL resolution treats `.` and `..` (even
/// percent-encoded) as directory references, so those are rejected along with the empty name.
pub(crate) fn path_segment(input: &str) -> Result<PercentEncode<'_>> {
    match input {
        "" | "." | ".." => Err(Error::Config(format!(
            "{:?} cannot be used as a path segment",
            input
        ))),
        _ => Ok(urlencode(input)),
    }
}

/// Truncate a response body for inclusion in an error message.
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 2048;
    if body.len() <= MAX {
        return body.to_owned();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! urlencode_tests {
        ($($name:ident: $input:expr, $output:expr,)*) => {
        $(
            #[test]
            fn $name() {
                assert_eq!(&urlencode($input).to_string(), $output);
            }
        )*
        }
    }

    urlencode_tests! {
        unencoded: "cd209587-b204-4934.zip", "cd209587-b204-4934.zip",
        slashes: "abc/def", "abc%2Fdef",
        spaces: "abc def", "abc%20def",
        dots: "..", "..",
        control: "abc\ndef", "abc%0Adef",
    }

    #[test]
    fn path_segment_rejects_dot_segments() {
        for name in ["", ".", ".."] {
            assert!(matches!(path_segment(name), Err(Error::Config(_))));
        }
        assert_eq!(path_segment("..zip").unwrap().to_string(), "..zip");
        assert_eq!(path_segment("a/..").unwrap().to_string(), "a%2F..");
    }

    #[test]
    fn snippet_short_body_unchanged() {
        assert_eq!(snippet("{\"error\":\"nope\"}"), "{\"error\":\"nope\"}");
    }

    #[test]
    fn snippet_long_body_truncated() {
        let body = "é".repeat(2000);
        let s = snippet(&body);
        assert!(s.ends_with("..."));
        assert!(s.len() <= 2048 + 3);
    }
}
