//! Deployment policy: header proxying rules, URL schemes, cache cookie
//! rules.

/// Headers never copied to an upstream request when proxying.
const SKIPPED_PROXY_HEADERS: &[&str] = &[
    "host",
    "if-modified-since",
    "accept-encoding",
    "keep-alive",
    "connection",
    "content-length",
];

const FILE_SCHEME: &str = "file://";
const ROOT_SCHEME: &str = "docroot://";

/// Site-wide policy knobs consulted by the engine. One instance per
/// process, shared through the [`Registry`](crate::Registry).
#[derive(Debug, Clone, Default)]
pub struct Policy {
    real_ip_header: Option<String>,
    cache_cookie_denylist: Vec<String>,
}

impl Policy {
    /// The default policy: no real-IP header, all cookies allowed as
    /// cache keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the header carrying the real client IP to upstreams.
    pub fn with_real_ip_header(mut self, name: impl Into<String>) -> Self {
        self.real_ip_header = Some(name.into());
        self
    }

    /// Forbid a cookie from participating in cache keys.
    pub fn deny_cache_cookie(mut self, name: impl Into<String>) -> Self {
        self.cache_cookie_denylist.push(name.into());
        self
    }

    /// The configured real-IP header name, if any.
    pub fn real_ip_header_name(&self) -> Option<&str> {
        self.real_ip_header.as_deref()
    }

    /// Whether a header must not be forwarded by proxying blocks.
    pub fn is_skipped_proxy_header(&self, name: &str) -> bool {
        SKIPPED_PROXY_HEADERS
            .iter()
            .any(|skipped| name.eq_ignore_ascii_case(skipped))
    }

    /// Whether a cookie may be used as a cache key component.
    pub fn allow_caching_input_cookie(&self, name: &str) -> bool {
        !self
            .cache_cookie_denylist
            .iter()
            .any(|denied| denied == name)
    }

    /// Resolve `file://` and `docroot://` URLs to filesystem paths;
    /// other URLs pass through.
    pub fn path_by_scheme<'a>(&self, document_root: &str, url: &'a str) -> String {
        if let Some(path) = strip_prefix_ci(url, FILE_SCHEME) {
            return path.to_owned();
        }
        if let Some(path) = strip_prefix_ci(url, ROOT_SCHEME) {
            let mut result = document_root.to_owned();
            if !path.starts_with('/') {
                result.push('/');
            }
            result.push_str(path);
            return result;
        }
        url.to_owned()
    }

    /// Whether the URL names a remote scheme the http block may fetch.
    pub fn is_remote_scheme(url: &str) -> bool {
        strip_prefix_ci(url, "http://").is_some() || strip_prefix_ci(url, "https://").is_some()
    }
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_set() {
        let policy = Policy::new();
        assert!(policy.is_skipped_proxy_header("Host"));
        assert!(policy.is_skipped_proxy_header("CONNECTION"));
        assert!(!policy.is_skipped_proxy_header("X-Custom"));
    }

    #[test]
    fn schemes() {
        let policy = Policy::new();
        assert_eq!(policy.path_by_scheme("/www", "file:///etc/x"), "/etc/x");
        assert_eq!(policy.path_by_scheme("/www", "docroot://a/b"), "/www/a/b");
        assert_eq!(policy.path_by_scheme("/www", "docroot:///a"), "/www/a");
        assert_eq!(
            policy.path_by_scheme("/www", "http://e.example/x"),
            "http://e.example/x"
        );
        assert!(Policy::is_remote_scheme("HTTPS://x"));
        assert!(!Policy::is_remote_scheme("ftp://x"));
    }

    #[test]
    fn cache_cookies() {
        let policy = Policy::new().deny_cache_cookie("secret");
        assert!(policy.allow_caching_input_cookie("session"));
        assert!(!policy.allow_caching_input_cookie("secret"));
    }
}
