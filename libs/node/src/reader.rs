use std::fmt;
use std::sync::Arc;

use conduit_core::{CallOptions, Status};
use conduit_fabric::{Framer, Marshaller};
use futures::Stream;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Request stream of a client-streaming or duplex call
///
/// Messages come back in arrival order. Once the peer has finished sending,
/// `message` keeps returning `None`. A framing error is terminal: every later
/// call fails with the same status and the stream is not read again.
pub struct RequestStream<T> {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    framer: Framer,
    marshaller: Arc<dyn Marshaller<T>>,
    encoding: Option<String>,
    options: CallOptions,
    finished: bool,
    failed: Option<Status>,
}

impl<T> RequestStream<T> {
    /// `encoding` is the request's `grpc-encoding`, if any
    pub fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        framer: Framer,
        marshaller: Arc<dyn Marshaller<T>>,
        encoding: Option<String>,
        options: CallOptions,
    ) -> Self {
        Self {
            reader,
            framer,
            marshaller,
            encoding,
            options,
            finished: false,
            failed: None,
        }
    }

    /// Next request message, `None` once the stream has ended
    pub async fn message(&mut self) -> Result<Option<T>> {
        if let Some(status) = &self.failed {
            return Err(status.clone().into());
        }
        if self.finished {
            return Ok(None);
        }

        let message = self
            .framer
            .read_streamed_message(
                &mut self.reader,
                self.encoding.as_deref(),
                self.marshaller.as_ref(),
                &self.options,
            )
            .await;

        match message {
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Ok(message) => Ok(message),
            Err(e) => {
                // The reader may be stopped mid-frame
                self.failed = Some(e.to_status());
                Err(e.into())
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::try_unfold(self, |mut requests| async move {
            Ok(requests
                .message()
                .await?
                .map(|message| (message, requests)))
        })
    }
}

impl<T> fmt::Debug for RequestStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStream")
            .field("encoding", &self.encoding)
            .field("finished", &self.finished)
            .field("failed", &self.failed)
            .finish()
    }
}
