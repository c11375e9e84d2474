use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{Metadata, Status};
use tracing::debug;

use crate::context::{CallOutcome, ServerCall};
use crate::handler::ServerCallHandler;

/// A handler with its request and response types erased
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Full method path, `/service/method`
    fn method_name(&self) -> &str;

    async fn handle(&self, call: ServerCall) -> CallOutcome;
}

#[async_trait]
impl<S, Req, Resp> CallHandler for ServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    fn method_name(&self) -> &str {
        self.method().full_name()
    }

    async fn handle(&self, call: ServerCall) -> CallOutcome {
        self.handle_call(call).await
    }
}

/// Dispatches calls to handlers by method path
#[derive(Clone, Default)]
pub struct Router {
    handlers: HashMap<String, Arc<dyn CallHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its method path, replacing any previous one
    pub fn add(mut self, handler: impl CallHandler + 'static) -> Self {
        self.handlers
            .insert(handler.method_name().to_string(), Arc::new(handler));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Arc<dyn CallHandler>> {
        self.handlers.get(path)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `call` on the handler registered for `path`
    ///
    /// Unknown paths end with `Unimplemented` without reading the request.
    pub async fn route(&self, path: &str, call: ServerCall) -> CallOutcome {
        match self.handlers.get(path) {
            Some(handler) => handler.handle(call).await,
            None => {
                debug!(method = path, "no handler registered");
                CallOutcome {
                    status: Status::unimplemented("Method is unimplemented."),
                    response_headers: Metadata::new(),
                    trailers: Metadata::new(),
                }
            }
        }
    }
}
