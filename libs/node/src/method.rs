use std::fmt;
use std::sync::Arc;

use conduit_fabric::Marshaller;
use futures::future::BoxFuture;

use crate::context::ServerCallContext;
use crate::error::Result;
use crate::reader::RequestStream;
use crate::writer::StreamWriter;

/// Shape of a method's request and response streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodType {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

/// Description of one service method and how its messages are marshalled
pub struct Method<Req, Resp> {
    method_type: MethodType,
    service_name: String,
    name: String,
    full_name: String,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
}

impl<Req, Resp> Method<Req, Resp> {
    pub fn new(
        method_type: MethodType,
        service_name: impl Into<String>,
        name: impl Into<String>,
        request_marshaller: impl Marshaller<Req> + 'static,
        response_marshaller: impl Marshaller<Resp> + 'static,
    ) -> Self {
        let service_name = service_name.into();
        let name = name.into();
        let full_name = format!("/{}/{}", service_name, name);

        Self {
            method_type,
            service_name,
            name,
            full_name,
            request_marshaller: Arc::new(request_marshaller),
            response_marshaller: Arc::new(response_marshaller),
        }
    }

    pub fn method_type(&self) -> MethodType {
        self.method_type
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `/service/method`, the path calls are routed by
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn request_marshaller(&self) -> &Arc<dyn Marshaller<Req>> {
        &self.request_marshaller
    }

    pub fn response_marshaller(&self) -> &Arc<dyn Marshaller<Resp>> {
        &self.response_marshaller
    }
}

impl<Req, Resp> Clone for Method<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            method_type: self.method_type,
            service_name: self.service_name.clone(),
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            request_marshaller: self.request_marshaller.clone(),
            response_marshaller: self.response_marshaller.clone(),
        }
    }
}

impl<Req, Resp> fmt::Debug for Method<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("type", &self.method_type)
            .field("full_name", &self.full_name)
            .finish()
    }
}

pub type UnaryInvoker<S, Req, Resp> =
    Arc<dyn Fn(Arc<S>, Req, ServerCallContext) -> BoxFuture<'static, Result<Resp>> + Send + Sync>;

pub type ServerStreamingInvoker<S, Req, Resp> = Arc<
    dyn Fn(Arc<S>, Req, StreamWriter<Resp>, ServerCallContext) -> BoxFuture<'static, Result<()>>
        + Send
        + Sync,
>;

pub type ClientStreamingInvoker<S, Req, Resp> = Arc<
    dyn Fn(Arc<S>, RequestStream<Req>, ServerCallContext) -> BoxFuture<'static, Result<Resp>>
        + Send
        + Sync,
>;

pub type DuplexStreamingInvoker<S, Req, Resp> = Arc<
    dyn Fn(
            Arc<S>,
            RequestStream<Req>,
            StreamWriter<Resp>,
            ServerCallContext,
        ) -> BoxFuture<'static, Result<()>>
        + Send
        + Sync,
>;
