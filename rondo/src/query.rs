//! Query-string serialization for request URLs.
//!
//! ```
//! use rondo::query::{QueryParams, build_url};
//!
//! let params = QueryParams::from_iter([("key", "value1"), ("key", "value2")]);
//! let url = build_url("http://httpbin.org/get", &params)?;
//!
//! assert_eq!(url.as_str(), "http://httpbin.org/get?key=value1&key=value2");
//! # Ok::<(), rondo::Error>(())
//! ```
use crate::Result;
use url::Url;

/// Ordered key/value pairs. Keys may repeat, every pair keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> QueryParams {
        QueryParams::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        params.extend(iter);
        params
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for QueryParams {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

/// Parses `base` and appends `params` to its query, in insertion order and
/// form-urlencoded. Pairs already present in `base` come first.
pub fn build_url(base: &str, params: &QueryParams) -> Result<Url> {
    let mut url = Url::parse(base)?;

    // An empty extension would still leave a dangling `?`.
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter());
    }

    Ok(url)
}
