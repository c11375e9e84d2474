use crate::context::{CallOutcome, ServerCall, ServerCallContext};
use crate::error::Result;
use crate::method::ServerStreamingInvoker;

use super::{CallParts, HandlerBase, Reader, Writer};

/// One request message in, any number of response messages out
pub struct ServerStreamingServerCallHandler<S, Req, Resp> {
    pub(super) base: HandlerBase<S, Req, Resp>,
    invoker: ServerStreamingInvoker<S, Req, Resp>,
}

impl<S, Req, Resp> ServerStreamingServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    pub(super) fn new(
        base: HandlerBase<S, Req, Resp>,
        invoker: ServerStreamingInvoker<S, Req, Resp>,
    ) -> Self {
        Self { base, invoker }
    }

    pub async fn handle_call(&self, call: ServerCall) -> CallOutcome {
        let CallParts {
            context,
            mut reader,
            writer,
            request_encoding,
        } = self.base.start(call);

        let result = self
            .process(&context, &mut reader, writer, request_encoding.as_deref())
            .await;
        self.base.finish(&context, result)
    }

    async fn process(
        &self,
        context: &ServerCallContext,
        reader: &mut Reader,
        writer: Writer,
        request_encoding: Option<&str>,
    ) -> Result<()> {
        let request = self
            .base
            .read_request(context, reader, request_encoding)
            .await?;

        let responses = self.base.stream_writer(context, writer);
        let invoker = self.invoker.clone();
        self.base
            .invoke(context, move |service, context| {
                invoker(service, request, responses, context)
            })
            .await
    }
}
