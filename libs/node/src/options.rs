use std::sync::Arc;

use conduit_fabric::{CompressionRegistry, Framer};
use serde::Deserialize;

use crate::interceptor::InterceptorCollection;

/// Receive limit applied when none is configured
pub const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Per-method service settings
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub max_receive_message_size: Option<usize>,
    pub max_send_message_size: Option<usize>,
    /// Encoding for response messages, used when the client accepts it
    pub response_compression: Option<String>,
    /// Append error text to statuses of calls that fail without one
    pub enable_detailed_errors: bool,
    pub interceptors: InterceptorCollection,
    pub compression: Arc<CompressionRegistry>,
}

impl ServiceOptions {
    pub fn builder() -> ServiceOptionsBuilder {
        ServiceOptionsBuilder::new()
    }

    /// Framer configured with these limits and codecs
    pub fn framer(&self) -> Framer {
        Framer::builder()
            .max_receive_message_size(self.max_receive_message_size)
            .max_send_message_size(self.max_send_message_size)
            .compression(self.compression.clone())
            .build()
    }

    pub fn has_interceptors(&self) -> bool {
        !self.interceptors.is_empty()
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_receive_message_size: Some(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE),
            max_send_message_size: None,
            response_compression: None,
            enable_detailed_errors: false,
            interceptors: InterceptorCollection::new(),
            compression: Arc::new(CompressionRegistry::empty()),
        }
    }
}

/// Builder for [`ServiceOptions`]
#[derive(Debug, Default)]
pub struct ServiceOptionsBuilder {
    options: ServiceOptions,
}

impl ServiceOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` lifts the limit
    pub fn max_receive_message_size(mut self, size: Option<usize>) -> Self {
        self.options.max_receive_message_size = size;
        self
    }

    pub fn max_send_message_size(mut self, size: Option<usize>) -> Self {
        self.options.max_send_message_size = size;
        self
    }

    pub fn response_compression(mut self, encoding: impl Into<String>) -> Self {
        self.options.response_compression = Some(encoding.into());
        self
    }

    pub fn enable_detailed_errors(mut self, enabled: bool) -> Self {
        self.options.enable_detailed_errors = enabled;
        self
    }

    pub fn interceptors(mut self, interceptors: InterceptorCollection) -> Self {
        self.options.interceptors = interceptors;
        self
    }

    pub fn compression(mut self, registry: Arc<CompressionRegistry>) -> Self {
        self.options.compression = registry;
        self
    }

    pub fn build(self) -> ServiceOptions {
        self.options
    }
}

/// The file-loadable part of [`ServiceOptions`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub max_receive_message_size: Option<usize>,
    pub max_send_message_size: Option<usize>,
    pub response_compression: Option<String>,
    pub enable_detailed_errors: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_receive_message_size: Some(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE),
            max_send_message_size: None,
            response_compression: None,
            enable_detailed_errors: false,
        }
    }
}

impl ServiceConfig {
    /// Start a builder from these settings
    pub fn into_builder(self) -> ServiceOptionsBuilder {
        let mut builder = ServiceOptionsBuilder::new()
            .max_receive_message_size(self.max_receive_message_size)
            .max_send_message_size(self.max_send_message_size)
            .enable_detailed_errors(self.enable_detailed_errors);
        if let Some(encoding) = self.response_compression {
            builder = builder.response_compression(encoding);
        }
        builder
    }
}
