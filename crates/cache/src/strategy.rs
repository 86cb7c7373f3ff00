//! Pluggable cache-key composition.
//!
//! A page strategy names the request properties that participate in a
//! block's fingerprint beyond the block's own inputs: selected query
//! args (sorted by name unless configured order-preserving) and
//! selected cookies (subject to the policy allowlist).

use std::collections::BTreeSet;
use thiserror::Error;
use xscript_core::Policy;
use xscript_http::Request;

/// Strategy construction failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StrategyError {
    /// A cookie the policy forbids as a cache key was named by the
    /// strategy.
    #[error("Cookie {0} is not allowed in cookie strategy")]
    CookieNotAllowed(String),
}

/// The query-arg component of a strategy.
#[derive(Debug, Clone, Default)]
pub struct QueryStrategy {
    args: BTreeSet<String>,
    sort: bool,
}

impl QueryStrategy {
    /// Select all query args, sorted by name.
    pub fn all() -> Self {
        Self {
            args: BTreeSet::new(),
            sort: true,
        }
    }

    /// Select the named args only.
    pub fn named(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            args: names.into_iter().collect(),
            sort: true,
        }
    }

    /// Keep request order instead of sorting by name.
    pub fn order_preserving(mut self) -> Self {
        self.sort = false;
        self
    }

    /// The key contribution for one request.
    pub fn key(&self, request: &Request) -> String {
        let mut selected: Vec<(&str, &str)> = request
            .args()
            .iter()
            .filter(|(name, _)| {
                !name.is_empty() && (self.args.is_empty() || self.args.contains(name))
            })
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        if self.sort {
            selected.sort();
        }
        let mut key = String::new();
        for (name, value) in selected {
            if !key.is_empty() {
                key.push('&');
            }
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }
}

/// The cookie component of a strategy.
#[derive(Debug, Clone, Default)]
pub struct CookieStrategy {
    cookies: BTreeSet<String>,
}

impl CookieStrategy {
    /// Select the named cookies; names the policy forbids are
    /// rejected.
    pub fn named(
        names: impl IntoIterator<Item = String>,
        policy: &Policy,
    ) -> Result<Self, StrategyError> {
        let mut cookies = BTreeSet::new();
        for name in names {
            if !policy.allow_caching_input_cookie(&name) {
                return Err(StrategyError::CookieNotAllowed(name));
            }
            cookies.insert(name);
        }
        Ok(Self { cookies })
    }

    /// The key contribution for one request.
    pub fn key(&self, request: &Request) -> String {
        let mut key = String::new();
        for name in &self.cookies {
            let Some(value) = request.cookie(name) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if !key.is_empty() {
                key.push('|');
            }
            key.push_str(name);
            key.push(':');
            key.push_str(value);
        }
        key
    }
}

/// A named page strategy combining the sub-strategies.
#[derive(Debug, Clone)]
pub struct CacheStrategy {
    name: String,
    query: Option<QueryStrategy>,
    cookies: Option<CookieStrategy>,
}

impl CacheStrategy {
    /// An empty strategy contributing nothing to keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: None,
            cookies: None,
        }
    }

    /// Attach a query sub-strategy.
    pub fn with_query(mut self, query: QueryStrategy) -> Self {
        self.query = Some(query);
        self
    }

    /// Attach a cookie sub-strategy.
    pub fn with_cookies(mut self, cookies: CookieStrategy) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// The strategy name blocks reference in `cache-strategy`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The combined key contribution for one request.
    pub fn create_key(&self, request: &Request) -> String {
        let mut key = String::new();
        if let Some(query) = &self.query {
            key.push_str(&query.key(request));
        }
        if let Some(cookies) = &self.cookies {
            key.push('|');
            key.push_str(&cookies.key(request));
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xscript_http::Encoder;

    fn request(query: &str, cookie: &str) -> Request {
        let query_line = format!("QUERY_STRING={query}");
        let cookie_line = format!("HTTP_COOKIE={cookie}");
        Request::from_env_lines(
            &["REQUEST_METHOD=GET", &query_line, &cookie_line],
            Vec::new(),
            &Encoder::cp1251(),
        )
        .unwrap()
    }

    #[test]
    fn query_keys_sort_by_default() {
        let strategy = QueryStrategy::all();
        let request = request("b=2&a=1", "");
        assert_eq!(strategy.key(&request), "a=1&b=2");
    }

    #[test]
    fn query_keys_can_preserve_order() {
        let strategy = QueryStrategy::all().order_preserving();
        let request = request("b=2&a=1", "");
        assert_eq!(strategy.key(&request), "b=2&a=1");
    }

    #[test]
    fn named_query_args_filter() {
        let strategy = QueryStrategy::named(["a".to_owned()]);
        let request = request("b=2&a=1&c=3", "");
        assert_eq!(strategy.key(&request), "a=1");
    }

    #[test]
    fn cookie_allowlist_is_enforced() {
        let policy = Policy::new().deny_cache_cookie("session");
        assert!(CookieStrategy::named(["session".to_owned()], &policy).is_err());
        let strategy = CookieStrategy::named(["lang".to_owned()], &policy).unwrap();
        let request = request("", "lang=ru; session=x");
        assert_eq!(strategy.key(&request), "lang:ru");
    }

    #[test]
    fn combined_key() {
        let policy = Policy::new();
        let strategy = CacheStrategy::new("page")
            .with_query(QueryStrategy::all())
            .with_cookies(CookieStrategy::named(["lang".to_owned()], &policy).unwrap());
        let request = request("x=1", "lang=en");
        assert_eq!(strategy.create_key(&request), "x=1|lang:en");
    }
}
