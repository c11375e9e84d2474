use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use conduit_core::CallOptions;
use conduit_fabric::{Framer, Marshaller};
use tokio::io::AsyncWrite;
use tracing::trace;

use crate::error::{Error, Result};

/// Response stream of a server-streaming or duplex call
///
/// Each `write` puts one complete frame on the wire. Once the call has been
/// cancelled or has ended, writes fail without touching the underlying
/// stream. A passed deadline counts as cancellation.
pub struct StreamWriter<T> {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    framer: Framer,
    marshaller: Arc<dyn Marshaller<T>>,
    encoding: String,
    options: CallOptions,
    messages_sent: usize,
}

impl<T> StreamWriter<T> {
    pub fn new(
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        framer: Framer,
        marshaller: Arc<dyn Marshaller<T>>,
        encoding: impl Into<String>,
        options: CallOptions,
    ) -> Self {
        Self {
            writer,
            framer,
            marshaller,
            encoding: encoding.into(),
            options,
            messages_sent: 0,
        }
    }

    pub async fn write(&mut self, message: &T) -> Result<()> {
        if self.options.is_complete() {
            return Err(Error::invalid_operation(
                "Cannot write message after request is complete.",
            ));
        }

        self.framer
            .write_message(
                &mut self.writer,
                message,
                self.marshaller.as_ref(),
                &self.encoding,
                &self.options,
            )
            .await?;

        self.messages_sent += 1;
        trace!(message_type = type_name::<T>(), count = self.messages_sent, "message sent");
        Ok(())
    }

    /// Number of messages written successfully
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }
}

impl<T> fmt::Debug for StreamWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("encoding", &self.encoding)
            .field("messages_sent", &self.messages_sent)
            .finish()
    }
}
