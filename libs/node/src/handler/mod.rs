//! Server call handlers, one per method shape
//!
//! A handler owns everything shared by the calls of one method: the method
//! descriptor, a configured framer, the service activator and the interceptor
//! pipeline. `handle_call` drives a single call from request bytes to a
//! terminal [`CallOutcome`]; it never returns an error itself.

mod client_streaming;
mod duplex_streaming;
mod server_streaming;
mod unary;

use std::any::{type_name, Any};
use std::future::Future;
use std::sync::Arc;

use conduit_core::{Metadata, Status, StatusCode, ENCODING_HEADER, IDENTITY_ENCODING};
use conduit_fabric::Framer;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::activator::{Activate, ActivationScope, DefaultActivator, ServiceActivator};
use crate::context::{CallOutcome, CallState, ServerCall, ServerCallContext};
use crate::error::{Error, Result};
use crate::interceptor::{InterceptorPipeline, Reply};
use crate::method::{Method, MethodType};
use crate::options::ServiceOptions;
use crate::provider::ServiceProvider;
use crate::reader::RequestStream;
use crate::writer::StreamWriter;

pub use client_streaming::ClientStreamingServerCallHandler;
pub use duplex_streaming::DuplexStreamingServerCallHandler;
pub use server_streaming::ServerStreamingServerCallHandler;
pub use unary::UnaryServerCallHandler;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A started call split into its parts
struct CallParts {
    context: ServerCallContext,
    reader: Reader,
    writer: Writer,
    request_encoding: Option<String>,
}

/// State and steps common to every call shape
struct HandlerBase<S, Req, Resp> {
    method: Method<Req, Resp>,
    framer: Framer,
    activator: Arc<dyn ServiceActivator<S>>,
    provider: Arc<dyn ServiceProvider>,
    pipeline: Option<InterceptorPipeline>,
    detailed_errors: bool,
    response_compression: Option<String>,
}

impl<S, Req, Resp> HandlerBase<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    fn new(
        method: Method<Req, Resp>,
        options: &ServiceOptions,
        activator: Arc<dyn ServiceActivator<S>>,
        provider: Arc<dyn ServiceProvider>,
    ) -> Self {
        // No interceptors means the service method is invoked directly
        let pipeline = options
            .has_interceptors()
            .then(|| InterceptorPipeline::new(&options.interceptors, provider.clone()));

        Self {
            method,
            framer: options.framer(),
            activator,
            provider,
            pipeline,
            detailed_errors: options.enable_detailed_errors,
            response_compression: options.response_compression.clone(),
        }
    }

    fn start(&self, call: ServerCall) -> CallParts {
        let ServerCall {
            reader,
            writer,
            headers,
            options,
            peer,
        } = call;

        // Finishing the call fires this child token, never the caller's own
        let cancellation = options.cancellation().child_token();
        let options = options.with_cancellation(cancellation);

        let request_encoding = headers.encoding().map(str::to_owned);
        let response_encoding = self.negotiate_response_encoding(&headers);
        debug!(
            method = self.method.full_name(),
            peer = peer.as_deref().unwrap_or("unknown"),
            encoding = %response_encoding,
            "call started"
        );

        let context = ServerCallContext::new(
            self.method.full_name(),
            peer,
            headers,
            options,
            response_encoding,
        );

        CallParts {
            context,
            reader,
            writer,
            request_encoding,
        }
    }

    /// Compress responses only with a configured codec the client accepts
    fn negotiate_response_encoding(&self, headers: &Metadata) -> String {
        match &self.response_compression {
            Some(encoding)
                if headers.accepts_encoding(encoding)
                    && self.framer.compression().get(encoding).is_some() =>
            {
                encoding.clone()
            }
            _ => IDENTITY_ENCODING.to_string(),
        }
    }

    async fn read_request(
        &self,
        context: &ServerCallContext,
        reader: &mut Reader,
        encoding: Option<&str>,
    ) -> Result<Req> {
        context.set_state(CallState::RequestReceiving);

        self.framer
            .read_single_message(
                reader,
                encoding,
                self.method.request_marshaller().as_ref(),
                context.options(),
            )
            .await?
            .ok_or_else(|| Status::internal("Request did not contain a message.").into())
    }

    fn request_stream(
        &self,
        context: &ServerCallContext,
        reader: Reader,
        encoding: Option<String>,
    ) -> RequestStream<Req> {
        context.set_state(CallState::RequestReceiving);
        RequestStream::new(
            reader,
            self.framer.clone(),
            self.method.request_marshaller().clone(),
            encoding,
            context.options().clone(),
        )
    }

    fn stream_writer(&self, context: &ServerCallContext, writer: Writer) -> StreamWriter<Resp> {
        StreamWriter::new(
            writer,
            self.framer.clone(),
            self.method.response_marshaller().clone(),
            context.response_encoding(),
            context.options().clone(),
        )
    }

    async fn write_response(
        &self,
        context: &ServerCallContext,
        writer: &mut Writer,
        response: &Resp,
    ) -> Result<()> {
        context.set_state(CallState::ResponseSending);

        self.framer
            .write_message(
                writer,
                response,
                self.method.response_marshaller().as_ref(),
                context.response_encoding(),
                context.options(),
            )
            .await?;
        Ok(())
    }

    /// Run `invoke` through the interceptors
    ///
    /// The service instance is activated by the innermost stage and released
    /// on every exit path, including the call being cancelled while user code
    /// is still running.
    async fn invoke<R, F>(&self, context: &ServerCallContext, invoke: F) -> Result<R>
    where
        R: Any + Send,
        F: FnOnce(Arc<S>, ServerCallContext) -> BoxFuture<'static, Result<R>> + Send + 'static,
    {
        context.set_state(CallState::Invoking);

        let activator = self.activator.clone();
        let provider = self.provider.clone();
        let call_service = move |context: ServerCallContext| async move {
            let scope = ActivationScope::create(activator, provider.as_ref(), &[])?;
            invoke(scope.instance(), context).await
        };

        let invocation = async {
            match &self.pipeline {
                None => call_service(context.clone()).await,
                Some(pipeline) => {
                    let reply = pipeline
                        .invoke(
                            context,
                            Box::new(move |context| {
                                call_service(context)
                                    .map(|result| result.map(|response| Box::new(response) as Reply))
                                    .boxed()
                            }),
                        )
                        .await?;

                    reply.downcast::<R>().map(|response| *response).map_err(|_| {
                        Error::invalid_operation(format!(
                            "Interceptor pipeline returned a response that is not '{}'.",
                            type_name::<R>()
                        ))
                    })
                }
            }
        };

        context.options().run(invocation).await?
    }

    /// Map the result to a terminal status and close the call
    ///
    /// Any `StreamWriter` still held by service code refuses to write from
    /// here on.
    fn finish(&self, context: &ServerCallContext, result: Result<()>) -> CallOutcome {
        context.options().cancel();

        let status = match result {
            Ok(()) => {
                context.set_state(CallState::Completed);
                Status::ok()
            }
            Err(e) => {
                context.set_state(CallState::Failed);
                let status = e.to_status(self.detailed_errors);
                if status.code() == StatusCode::Unknown {
                    warn!(
                        method = self.method.full_name(),
                        error = %e,
                        "error thrown by handler"
                    );
                } else {
                    debug!(
                        method = self.method.full_name(),
                        code = ?status.code(),
                        message = status.message(),
                        "call failed"
                    );
                }
                status
            }
        };

        let mut response_headers = Metadata::new();
        if context.response_encoding() != IDENTITY_ENCODING {
            response_headers.insert(ENCODING_HEADER, context.response_encoding());
        }

        CallOutcome {
            status,
            response_headers,
            trailers: context.response_trailers(),
        }
    }
}

/// Call handler for one registered method, fixed to its shape at registration
pub enum ServerCallHandler<S, Req, Resp> {
    Unary(UnaryServerCallHandler<S, Req, Resp>),
    ServerStreaming(ServerStreamingServerCallHandler<S, Req, Resp>),
    ClientStreaming(ClientStreamingServerCallHandler<S, Req, Resp>),
    DuplexStreaming(DuplexStreamingServerCallHandler<S, Req, Resp>),
}

impl<S, Req, Resp> ServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    pub fn unary<F, Fut>(
        method: Method<Req, Resp>,
        options: &ServiceOptions,
        provider: Arc<dyn ServiceProvider>,
        invoker: F,
    ) -> Result<Self>
    where
        S: Activate,
        F: Fn(Arc<S>, Req, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        check_method_type(&method, MethodType::Unary)?;
        let base = HandlerBase::new(method, options, default_activator(), provider);
        Ok(Self::Unary(UnaryServerCallHandler::new(
            base,
            Arc::new(move |service, request, context| invoker(service, request, context).boxed()),
        )))
    }

    pub fn server_streaming<F, Fut>(
        method: Method<Req, Resp>,
        options: &ServiceOptions,
        provider: Arc<dyn ServiceProvider>,
        invoker: F,
    ) -> Result<Self>
    where
        S: Activate,
        F: Fn(Arc<S>, Req, StreamWriter<Resp>, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        check_method_type(&method, MethodType::ServerStreaming)?;
        let base = HandlerBase::new(method, options, default_activator(), provider);
        Ok(Self::ServerStreaming(ServerStreamingServerCallHandler::new(
            base,
            Arc::new(move |service, request, writer, context| {
                invoker(service, request, writer, context).boxed()
            }),
        )))
    }

    pub fn client_streaming<F, Fut>(
        method: Method<Req, Resp>,
        options: &ServiceOptions,
        provider: Arc<dyn ServiceProvider>,
        invoker: F,
    ) -> Result<Self>
    where
        S: Activate,
        F: Fn(Arc<S>, RequestStream<Req>, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        check_method_type(&method, MethodType::ClientStreaming)?;
        let base = HandlerBase::new(method, options, default_activator(), provider);
        Ok(Self::ClientStreaming(ClientStreamingServerCallHandler::new(
            base,
            Arc::new(move |service, requests, context| {
                invoker(service, requests, context).boxed()
            }),
        )))
    }

    pub fn duplex_streaming<F, Fut>(
        method: Method<Req, Resp>,
        options: &ServiceOptions,
        provider: Arc<dyn ServiceProvider>,
        invoker: F,
    ) -> Result<Self>
    where
        S: Activate,
        F: Fn(Arc<S>, RequestStream<Req>, StreamWriter<Resp>, ServerCallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        check_method_type(&method, MethodType::DuplexStreaming)?;
        let base = HandlerBase::new(method, options, default_activator(), provider);
        Ok(Self::DuplexStreaming(DuplexStreamingServerCallHandler::new(
            base,
            Arc::new(move |service, requests, writer, context| {
                invoker(service, requests, writer, context).boxed()
            }),
        )))
    }

    /// Replace the activator service instances are obtained from
    pub fn with_activator(mut self, activator: Arc<dyn ServiceActivator<S>>) -> Self {
        self.base_mut().activator = activator;
        self
    }

    pub fn method(&self) -> &Method<Req, Resp> {
        &self.base().method
    }

    pub fn method_type(&self) -> MethodType {
        match self {
            Self::Unary(_) => MethodType::Unary,
            Self::ServerStreaming(_) => MethodType::ServerStreaming,
            Self::ClientStreaming(_) => MethodType::ClientStreaming,
            Self::DuplexStreaming(_) => MethodType::DuplexStreaming,
        }
    }

    /// Number of interceptors wrapped around each invocation
    pub fn interceptor_count(&self) -> usize {
        self.base().pipeline.as_ref().map_or(0, InterceptorPipeline::len)
    }

    /// Run one call to completion
    pub async fn handle_call(&self, call: ServerCall) -> CallOutcome {
        match self {
            Self::Unary(handler) => handler.handle_call(call).await,
            Self::ServerStreaming(handler) => handler.handle_call(call).await,
            Self::ClientStreaming(handler) => handler.handle_call(call).await,
            Self::DuplexStreaming(handler) => handler.handle_call(call).await,
        }
    }

    fn base(&self) -> &HandlerBase<S, Req, Resp> {
        match self {
            Self::Unary(handler) => &handler.base,
            Self::ServerStreaming(handler) => &handler.base,
            Self::ClientStreaming(handler) => &handler.base,
            Self::DuplexStreaming(handler) => &handler.base,
        }
    }

    fn base_mut(&mut self) -> &mut HandlerBase<S, Req, Resp> {
        match self {
            Self::Unary(handler) => &mut handler.base,
            Self::ServerStreaming(handler) => &mut handler.base,
            Self::ClientStreaming(handler) => &mut handler.base,
            Self::DuplexStreaming(handler) => &mut handler.base,
        }
    }
}

fn default_activator<S: Activate>() -> Arc<dyn ServiceActivator<S>> {
    Arc::new(DefaultActivator::<S>::new())
}

/// A method must be served by the handler for its declared shape
fn check_method_type<Req, Resp>(method: &Method<Req, Resp>, expected: MethodType) -> Result<()> {
    if method.method_type() == expected {
        return Ok(());
    }

    Err(Error::invalid_operation(format!(
        "Method '{}' is declared {:?} but was registered with a {:?} handler.",
        method.full_name(),
        method.method_type(),
        expected
    )))
}
