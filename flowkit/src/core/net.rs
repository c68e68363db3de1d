//! Url joining.

use std::sync::LazyLock;

use regex::Regex;

static FILE_SLASHES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(/{0,3})/*").unwrap());
static SCHEME_SLASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":/").unwrap());
static REPEATED_SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:\s%])/+").unwrap());
static SLASH_BEFORE_QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\?|&|#[^!])").unwrap());
static SECOND_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\?.+)\?").unwrap());

/// Join url parts with `/` and normalise the result.
///
/// Runs of slashes collapse (keeping `scheme://`, and up to three slashes for
/// `file://`), a slash directly before `?`, `&` or `#` is dropped, and a later
/// `?` in the query becomes `&`.
pub fn url_join(parts: &[&str]) -> String {
    let joined = parts.join("/");
    let normalized = if joined.starts_with("file://") {
        FILE_SLASHES_RE.replace_all(&joined, "${1}").into_owned()
    } else {
        let with_scheme = SCHEME_SLASH_RE.replace_all(&joined, "://");
        REPEATED_SLASH_RE
            .replace_all(&with_scheme, "${1}/")
            .into_owned()
    };
    let normalized = SLASH_BEFORE_QUERY_RE.replace_all(&normalized, "${1}");
    SECOND_QUERY_RE.replace_all(&normalized, "${1}&").into_owned()
}
