use crate::context::{CallOutcome, ServerCall, ServerCallContext};
use crate::error::Result;
use crate::method::UnaryInvoker;

use super::{CallParts, HandlerBase, Reader, Writer};

/// One request message in, one response message out
pub struct UnaryServerCallHandler<S, Req, Resp> {
    pub(super) base: HandlerBase<S, Req, Resp>,
    invoker: UnaryInvoker<S, Req, Resp>,
}

impl<S, Req, Resp> UnaryServerCallHandler<S, Req, Resp>
where
    S: Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + Sync + 'static,
{
    pub(super) fn new(base: HandlerBase<S, Req, Resp>, invoker: UnaryInvoker<S, Req, Resp>) -> Self {
        Self { base, invoker }
    }

    pub async fn handle_call(&self, call: ServerCall) -> CallOutcome {
        let CallParts {
            context,
            mut reader,
            mut writer,
            request_encoding,
        } = self.base.start(call);

        let result = self
            .process(&context, &mut reader, &mut writer, request_encoding.as_deref())
            .await;
        self.base.finish(&context, result)
    }

    async fn process(
        &self,
        context: &ServerCallContext,
        reader: &mut Reader,
        writer: &mut Writer,
        request_encoding: Option<&str>,
    ) -> Result<()> {
        let request = self
            .base
            .read_request(context, reader, request_encoding)
            .await?;

        let invoker = self.invoker.clone();
        let response = self
            .base
            .invoke(context, move |service, context| {
                invoker(service, request, context)
            })
            .await?;

        self.base.write_response(context, writer, &response).await
    }
}
