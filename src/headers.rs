//! Browser-realistic request headers.
//!
//! The same template is attached to every client the crate builds, and is
//! exposed for callers that want to decorate their own transport.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{FetchError, FetchResult};

/// Chrome 131 on Windows 10.
pub const CHROME_WINDOWS_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const SESSION_HEADERS: &[(&str, &str)] = &[
    ("User-Agent", CHROME_WINDOWS_USER_AGENT),
    ("Accept", ACCEPT),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

const FETCH_METADATA: &[(&str, &str)] = &[
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
];

/// Ordered header template. Names keep their canonical casing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header. Matching is case-insensitive; a replaced
    /// header keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Overlay `other` on top of `self`.
    pub fn merged(mut self, other: &HeaderSet) -> Self {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
        self
    }

    pub fn to_header_map(&self) -> FetchResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// Full browser header set, fetch-metadata hints included.
pub fn realistic_headers() -> HeaderSet {
    SESSION_HEADERS
        .iter()
        .chain(FETCH_METADATA.iter())
        .copied()
        .collect()
}

/// Headers attached to client sessions by default.
pub fn session_headers() -> HeaderSet {
    SESSION_HEADERS.iter().copied().collect()
}
