use std::net::SocketAddr;

use conduit_core::{CallOptions, IDENTITY_ENCODING};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::codec::Marshaller;
use crate::error::Result;
use crate::framing::Framer;

/// Client side of one call stream
///
/// Combines the request body writer, the response body reader and a framer.
pub struct Channel<R, W> {
    reader: R,
    writer: W,
    framer: Framer,
    encoding: String,
    response_encoding: Option<String>,
}

impl<R, W> Channel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a channel from a response reader and a request writer
    pub fn new(reader: R, writer: W, framer: Framer) -> Self {
        Self {
            reader,
            writer,
            framer,
            encoding: IDENTITY_ENCODING.to_string(),
            response_encoding: None,
        }
    }

    /// Compress outbound messages with the named codec
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Codec announced by the peer for inbound messages
    pub fn with_response_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.response_encoding = Some(encoding.into());
        self
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    /// Send a message over the channel
    pub async fn send<T, M>(&mut self, message: &T, marshaller: &M, options: &CallOptions) -> Result<()>
    where
        M: Marshaller<T> + ?Sized,
    {
        self.framer
            .write_message(&mut self.writer, message, marshaller, &self.encoding, options)
            .await
    }

    /// Receive the next message, `None` once the peer finished sending
    pub async fn receive<T, M>(&mut self, marshaller: &M, options: &CallOptions) -> Result<Option<T>>
    where
        M: Marshaller<T> + ?Sized,
    {
        self.framer
            .read_streamed_message(
                &mut self.reader,
                self.response_encoding.as_deref(),
                marshaller,
                options,
            )
            .await
    }

    /// Receive the only message of the response, which may be absent
    pub async fn receive_single<T, M>(
        &mut self,
        marshaller: &M,
        options: &CallOptions,
    ) -> Result<Option<T>>
    where
        M: Marshaller<T> + ?Sized,
    {
        self.framer
            .read_single_message(
                &mut self.reader,
                self.response_encoding.as_deref(),
                marshaller,
                options,
            )
            .await
    }

    /// Signal the end of the request stream
    pub async fn finish_sending(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Close the channel
    pub async fn close(mut self) -> Result<()> {
        self.finish_sending().await
    }
}

impl<S> Channel<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    /// Open a channel over a single bidirectional stream
    pub fn from_stream(stream: S, framer: Framer) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, framer)
    }
}

impl Channel<OwnedReadHalf, OwnedWriteHalf> {
    /// Open a TCP channel
    pub async fn tcp(addr: SocketAddr, framer: Framer) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, framer))
    }
}
