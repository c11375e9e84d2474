use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conduit_core::{CallOptions, Metadata, Status};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Where a call is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    RequestReceiving,
    Invoking,
    ResponseSending,
    Completed,
    Failed,
}

/// An incoming call as handed over by the transport
pub struct ServerCall {
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub(crate) headers: Metadata,
    pub(crate) options: CallOptions,
    pub(crate) peer: Option<String>,
}

impl ServerCall {
    /// `reader` carries the request stream, `writer` the response stream
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            headers: Metadata::new(),
            options: CallOptions::new(),
            peer: None,
        }
    }

    pub fn with_headers(mut self, headers: Metadata) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn headers(&self) -> &Metadata {
        &self.headers
    }
}

impl fmt::Debug for ServerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCall")
            .field("headers", &self.headers)
            .field("options", &self.options)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// What the transport sends back once a call has finished
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub status: Status,
    pub response_headers: Metadata,
    pub trailers: Metadata,
}

struct ContextInner {
    method: String,
    peer: Option<String>,
    request_headers: Metadata,
    options: CallOptions,
    response_encoding: String,
    response_trailers: Mutex<Metadata>,
    state: Mutex<CallState>,
}

/// Per-call state shared by the handler, interceptors and service code
///
/// Clones refer to the same call.
#[derive(Clone)]
pub struct ServerCallContext {
    inner: Arc<ContextInner>,
}

impl ServerCallContext {
    pub(crate) fn new(
        method: impl Into<String>,
        peer: Option<String>,
        request_headers: Metadata,
        options: CallOptions,
        response_encoding: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                method: method.into(),
                peer,
                request_headers,
                options,
                response_encoding: response_encoding.into(),
                response_trailers: Mutex::new(Metadata::new()),
                state: Mutex::new(CallState::Idle),
            }),
        }
    }

    /// Full method path, `/service/method`
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn peer(&self) -> Option<&str> {
        self.inner.peer.as_deref()
    }

    pub fn request_headers(&self) -> &Metadata {
        &self.inner.request_headers
    }

    pub fn options(&self) -> &CallOptions {
        &self.inner.options
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.options.deadline()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.inner.options.cancellation()
    }

    /// True once the call was cancelled or ran past its deadline
    ///
    /// Also true after the handler has produced the call's outcome.
    pub fn is_cancelled(&self) -> bool {
        self.inner.options.is_complete()
    }

    /// Encoding applied to outbound messages
    pub fn response_encoding(&self) -> &str {
        &self.inner.response_encoding
    }

    pub fn set_trailer(&self, key: impl AsRef<str>, value: impl Into<String>) {
        lock(&self.inner.response_trailers).insert(key, value);
    }

    /// Snapshot of the trailers set so far
    pub fn response_trailers(&self) -> Metadata {
        lock(&self.inner.response_trailers).clone()
    }

    pub fn state(&self) -> CallState {
        *lock(&self.inner.state)
    }

    pub(crate) fn set_state(&self, state: CallState) {
        let mut current = lock(&self.inner.state);
        trace!(method = %self.inner.method, from = ?*current, to = ?state, "call state changed");
        *current = state;
    }
}

impl fmt::Debug for ServerCallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallContext")
            .field("method", &self.inner.method)
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn test_context(method: &str) -> ServerCallContext {
    ServerCallContext::new(method, None, Metadata::new(), CallOptions::new(), "identity")
}
