use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use conduit_core::IDENTITY_ENCODING;

/// A named message compression codec
pub trait CompressionProvider: Send + Sync {
    /// Name used in the `grpc-encoding` header
    fn encoding_name(&self) -> &str;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Lookup table from encoding name to codec
///
/// Built once at startup and shared read-only between calls, so lookups need
/// no locking.
#[derive(Clone, Default)]
pub struct CompressionRegistry {
    providers: HashMap<String, Arc<dyn CompressionProvider>>,
    // registration order, for error messages
    names: Vec<String>,
}

impl CompressionRegistry {
    /// A registry with no codecs; only identity encoding is usable
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a builder for registering codecs
    pub fn builder() -> CompressionRegistryBuilder {
        CompressionRegistryBuilder::new()
    }

    pub fn get(&self, encoding: &str) -> Option<&Arc<dyn CompressionProvider>> {
        self.providers.get(encoding)
    }

    /// Registered encoding names in registration order
    pub fn encoding_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionRegistry")
            .field("encodings", &self.names)
            .finish()
    }
}

/// Builder for a [`CompressionRegistry`]
#[derive(Default)]
pub struct CompressionRegistryBuilder {
    providers: Vec<Arc<dyn CompressionProvider>>,
}

impl CompressionRegistryBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec; a later codec with the same name replaces an earlier one
    pub fn provider(mut self, provider: impl CompressionProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Freeze the registrations
    pub fn build(self) -> CompressionRegistry {
        let mut registry = CompressionRegistry::empty();

        for provider in self.providers {
            let name = provider.encoding_name().to_string();
            if name == IDENTITY_ENCODING {
                tracing::warn!("ignoring compression provider registered as identity encoding");
                continue;
            }
            if registry.providers.insert(name.clone(), provider).is_none() {
                registry.names.push(name);
            }
        }

        registry
    }
}
