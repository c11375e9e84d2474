use crate::context::{CallOutcome, ServerCall, ServerCallContext};
use crate::error::Result;
use crate::method::DuplexStreamingInvoker;

use super::{CallParts, HandlerBase, Reader, Writer};

/// Request and response streams open at the same time
pub struct DuplexStreamingServerCallHandler<S, Req, Resp> {
    pub(super) base: HandlerBase<S, Req, Resp>,
    invoker: DuplexStreamingInvoker<S, Req, Resp>,
}

impl<S, Req, Resp> DuplexStreamingServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    pub(super) fn new(
        base: HandlerBase<S, Req, Resp>,
        invoker: DuplexStreamingInvoker<S, Req, Resp>,
    ) -> Self {
        Self { base, invoker }
    }

    pub async fn handle_call(&self, call: ServerCall) -> CallOutcome {
        let CallParts {
            context,
            reader,
            writer,
            request_encoding,
        } = self.base.start(call);

        let result = self.process(&context, reader, writer, request_encoding).await;
        self.base.finish(&context, result)
    }

    async fn process(
        &self,
        context: &ServerCallContext,
        reader: Reader,
        writer: Writer,
        request_encoding: Option<String>,
    ) -> Result<()> {
        let requests = self.base.request_stream(context, reader, request_encoding);
        let responses = self.base.stream_writer(context, writer);

        let invoker = self.invoker.clone();
        self.base
            .invoke(context, move |service, context| {
                invoker(service, requests, responses, context)
            })
            .await
    }
}
