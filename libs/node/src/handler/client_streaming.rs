use crate::context::{CallOutcome, ServerCall, ServerCallContext};
use crate::error::Result;
use crate::method::ClientStreamingInvoker;

use super::{CallParts, HandlerBase, Reader, Writer};

/// Any number of request messages in, one response message out
pub struct ClientStreamingServerCallHandler<S, Req, Resp> {
    pub(super) base: HandlerBase<S, Req, Resp>,
    invoker: ClientStreamingInvoker<S, Req, Resp>,
}

impl<S, Req, Resp> ClientStreamingServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    pub(super) fn new(
        base: HandlerBase<S, Req, Resp>,
        invoker: ClientStreamingInvoker<S, Req, Resp>,
    ) -> Self {
        Self { base, invoker }
    }

    pub async fn handle_call(&self, call: ServerCall) -> CallOutcome {
        let CallParts {
            context,
            reader,
            mut writer,
            request_encoding,
        } = self.base.start(call);

        let result = self
            .process(&context, reader, &mut writer, request_encoding)
            .await;
        self.base.finish(&context, result)
    }

    async fn process(
        &self,
        context: &ServerCallContext,
        reader: Reader,
        writer: &mut Writer,
        request_encoding: Option<String>,
    ) -> Result<()> {
        let requests = self.base.request_stream(context, reader, request_encoding);

        let invoker = self.invoker.clone();
        let response = self
            .base
            .invoke(context, move |service, context| {
                invoker(service, requests, context)
            })
            .await?;

        self.base.write_response(context, writer, &response).await
    }
}
