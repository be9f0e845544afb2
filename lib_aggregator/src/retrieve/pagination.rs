//! Next-page cursors for the two pagination styles in use: RFC 8288 `Link`
//! headers (GitHub) and a `next` URL inside the JSON body (Docker Hub).

use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;

/// Extracts the `rel="next"` target from a `Link` header value.
///
/// ```text
/// <https://api.github.com/orgs/x/repos?page=2>; rel="next", <...?page=5>; rel="last"
/// ```
pub fn next_link(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let param = param.trim();
            match param.split_once('=') {
                Some((key, value)) => {
                    key.trim().eq_ignore_ascii_case("rel")
                        && value.trim().trim_matches('"').split_whitespace().any(|rel| rel == "next")
                }
                None => false,
            }
        });

        is_next.then(|| url.to_string())
    })
}

/// [`next_link`] applied to a response's headers.
pub fn next_link_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(next_link)
}

/// Docker Hub style list envelope: `{"count": N, "next": url|null, "results": [...]}`.
#[derive(Debug, Deserialize)]
pub struct PagedBody<T> {
    /// Total number of items across all pages, when reported.
    #[serde(default)]
    pub count: Option<u64>,
    /// Absolute URL of the following page.
    #[serde(default)]
    pub next: Option<String>,
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn finds_next_among_several_relations() {
        let header = r#"<https://api.github.com/organizations/1/repos?page=1>; rel="prev", <https://api.github.com/organizations/1/repos?page=3>; rel="next", <https://api.github.com/organizations/1/repos?page=9>; rel="last""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://api.github.com/organizations/1/repos?page=3")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let header = r#"<https://api.github.com/x?page=1>; rel="first", <https://api.github.com/x?page=2>; rel="prev""#;
        assert_eq!(next_link(header), None);
    }

    #[test]
    fn tolerates_unquoted_and_multi_value_rel() {
        assert_eq!(next_link("<http://h/a?p=2>; rel=next").as_deref(), Some("http://h/a?p=2"));
        assert_eq!(next_link(r#"<http://h/b>; title="x"; rel="last next""#).as_deref(), Some("http://h/b"));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        assert_eq!(next_link(r#"http://h/no-brackets; rel="next""#), None);
        assert_eq!(next_link(""), None);
    }

    #[test]
    fn reads_from_header_map() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_link_from_headers(&headers), None);
        headers.insert(LINK, HeaderValue::from_static(r#"<http://h/r?page=2>; rel="next""#));
        assert_eq!(next_link_from_headers(&headers).as_deref(), Some("http://h/r?page=2"));
    }

    #[test]
    fn paged_body_accepts_null_next() {
        let body: PagedBody<String> =
            serde_json::from_str(r#"{"count": 2, "next": null, "results": ["a", "b"]}"#).unwrap();
        assert_eq!(body.next, None);
        assert_eq!(body.results, vec!["a", "b"]);
    }
}
