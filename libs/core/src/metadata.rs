use std::collections::BTreeMap;

/// Header carrying the compression codec of the messages on a stream
pub const ENCODING_HEADER: &str = "grpc-encoding";

/// Header listing the codecs the peer is able to decompress
pub const ACCEPT_ENCODING_HEADER: &str = "grpc-accept-encoding";

/// Encoding name meaning "no compression"
pub const IDENTITY_ENCODING: &str = "identity";

/// Call headers or trailers
///
/// Keys are case-insensitive and stored lowercased, like HTTP/2 header names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for this key
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_ascii_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `grpc-encoding` value, if present
    pub fn encoding(&self) -> Option<&str> {
        self.get(ENCODING_HEADER)
    }

    /// Whether `grpc-accept-encoding` lists the given codec
    pub fn accepts_encoding(&self, name: &str) -> bool {
        self.get(ACCEPT_ENCODING_HEADER)
            .map(|value| value.split(',').any(|entry| entry.trim() == name))
            .unwrap_or(false)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}
