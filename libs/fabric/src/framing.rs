use std::any::type_name;
use std::sync::Arc;

use conduit_core::{CallOptions, Status, IDENTITY_ENCODING};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::codec::Marshaller;
use crate::compression::CompressionRegistry;
use crate::context::{DeserializationContext, SerializationContext};
use crate::error::{Error, Result};

/// Bytes used to encode the message length
pub const MESSAGE_DELIMITER_SIZE: usize = 4;

/// Compression flag plus message length
pub const HEADER_SIZE: usize = MESSAGE_DELIMITER_SIZE + 1;

const MAX_MESSAGE_LENGTH: u32 = i32::MAX as u32;

const RECEIVED_MESSAGE_EXCEEDS_LIMIT: &str =
    "Received message exceeds the maximum configured message size.";
const SENDING_MESSAGE_EXCEEDS_LIMIT: &str =
    "Sending message exceeds the maximum configured message size.";
const NO_MESSAGE_ENCODING: &str =
    "Request did not include grpc-encoding value with compressed message.";
const IDENTITY_MESSAGE_ENCODING: &str =
    "Request sent 'identity' grpc-encoding value with compressed message.";

/// The 5-byte prefix of every message on a call stream
///
/// ```text
/// byte 0     compression flag (0 or 1)
/// bytes 1-4  payload length, big-endian
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub compressed: bool,
    pub length: u32,
}

impl FrameHeader {
    pub fn new(compressed: bool, length: u32) -> Self {
        Self { compressed, length }
    }

    /// Validate and decode a raw header
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let compressed = match bytes[0] {
            0 => false,
            1 => true,
            _ => {
                return Err(Error::invalid_data(
                    "Unexpected compressed flag value in message header.",
                ))
            }
        };

        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if length > MAX_MESSAGE_LENGTH {
            return Err(Error::invalid_data("Message too large."));
        }

        Ok(Self { compressed, length })
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = u8::from(self.compressed);
        bytes[1..].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }
}

/// Length-prefixed message framer
///
/// Reads and writes one message envelope at a time over a raw byte stream,
/// enforcing size limits and applying per-message compression. Cheap to clone
/// and shared by every call of a method.
#[derive(Debug, Clone)]
pub struct Framer {
    max_receive_message_size: Option<usize>,
    max_send_message_size: Option<usize>,
    compression: Arc<CompressionRegistry>,
}

impl Framer {
    /// Framer with no size limits and no compression codecs
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the framer
    pub fn builder() -> FramerBuilder {
        FramerBuilder::new()
    }

    pub fn max_receive_message_size(&self) -> Option<usize> {
        self.max_receive_message_size
    }

    pub fn max_send_message_size(&self) -> Option<usize> {
        self.max_send_message_size
    }

    pub fn compression(&self) -> &Arc<CompressionRegistry> {
        &self.compression
    }

    /// Read the only message of a stream
    ///
    /// Returns `None` when the stream ends before any byte arrives. After the
    /// message the stream must be at its end.
    pub async fn read_single_message<R, T, M>(
        &self,
        reader: &mut R,
        encoding: Option<&str>,
        marshaller: &M,
        options: &CallOptions,
    ) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        self.read_message(reader, encoding, marshaller, options, true)
            .await
    }

    /// Read the next message of a stream, `None` at a clean end of stream
    pub async fn read_streamed_message<R, T, M>(
        &self,
        reader: &mut R,
        encoding: Option<&str>,
        marshaller: &M,
        options: &CallOptions,
    ) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        self.read_message(reader, encoding, marshaller, options, false)
            .await
    }

    async fn read_message<R, T, M>(
        &self,
        reader: &mut R,
        encoding: Option<&str>,
        marshaller: &M,
        options: &CallOptions,
        single_message: bool,
    ) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        let result = self
            .read_message_core(reader, encoding, marshaller, options, single_message)
            .await;
        if let Err(e) = &result {
            debug!(error = %e, "error reading message");
        }
        result
    }

    async fn read_message_core<R, T, M>(
        &self,
        reader: &mut R,
        encoding: Option<&str>,
        marshaller: &M,
        options: &CallOptions,
        single_message: bool,
    ) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        trace!("reading message");

        let mut header = [0u8; HEADER_SIZE];
        let received = options.run(read_to_fill(reader, &mut header)).await??;
        if received < HEADER_SIZE {
            if received == 0 {
                debug!("no message returned");
                return Ok(None);
            }
            return Err(Error::invalid_data(
                "Unexpected end of content while reading the message header.",
            ));
        }

        let header = FrameHeader::parse(&header)?;
        let length = header.length as usize;
        self.check_receive_size(length)?;

        let mut data = vec![0u8; length];
        if length > 0 {
            let received = options.run(read_to_fill(reader, &mut data)).await??;
            if received < length {
                return Err(Error::invalid_data(
                    "Unexpected end of content while reading the message content.",
                ));
            }
        }

        if header.compressed {
            data = self.decompress(encoding, &data)?;
            self.check_receive_size(data.len())?;
        }

        trace!(length = data.len(), message_type = type_name::<T>(), "deserializing message");

        let context = DeserializationContext::new(data);
        let message = marshaller.deserialize(&context)?;

        if single_message {
            let mut trailing = [0u8; 1];
            let read = options.run(reader.read(&mut trailing)).await??;
            if read > 0 {
                return Err(Error::invalid_data(
                    "Unexpected data after finished reading message.",
                ));
            }
        }

        trace!("received message");
        Ok(Some(message))
    }

    /// Serialize, compress and write one message, then flush
    ///
    /// Nothing is written when serialization, the size check or compression
    /// fails. `encoding` is the active outbound codec name.
    pub async fn write_message<W, T, M>(
        &self,
        writer: &mut W,
        message: &T,
        marshaller: &M,
        encoding: &str,
        options: &CallOptions,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        let result = self
            .write_message_core(writer, message, marshaller, encoding, options)
            .await;
        if let Err(e) = &result {
            debug!(error = %e, "error sending message");
        }
        result
    }

    async fn write_message_core<W, T, M>(
        &self,
        writer: &mut W,
        message: &T,
        marshaller: &M,
        encoding: &str,
        options: &CallOptions,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        M: Marshaller<T> + ?Sized,
    {
        trace!("sending message");

        // Serialize first, the length goes in the header
        let mut context = SerializationContext::new();
        marshaller.serialize(message, &mut context)?;
        let data = context
            .take_payload()
            .ok_or_else(|| Status::internal("Serialization did not return a payload."))?;

        if let Some(max) = self.max_send_message_size {
            if data.len() > max {
                return Err(Status::resource_exhausted(SENDING_MESSAGE_EXCEEDS_LIMIT).into());
            }
        }

        let compressed = encoding != IDENTITY_ENCODING;
        let data = if compressed {
            self.compress(encoding, &data)?
        } else {
            data
        };

        let length = u32::try_from(data.len())
            .ok()
            .filter(|length| *length <= MAX_MESSAGE_LENGTH)
            .ok_or_else(|| Error::invalid_data("Message too large."))?;

        trace!(message_type = type_name::<T>(), length, "serialized message");

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&FrameHeader::new(compressed, length).to_bytes());
        frame.extend_from_slice(&data);

        options
            .run(async {
                writer.write_all(&frame).await?;
                writer.flush().await
            })
            .await??;

        trace!("message sent");
        Ok(())
    }

    fn check_receive_size(&self, length: usize) -> Result<()> {
        match self.max_receive_message_size {
            Some(max) if length > max => {
                Err(Status::resource_exhausted(RECEIVED_MESSAGE_EXCEEDS_LIMIT).into())
            }
            _ => Ok(()),
        }
    }

    fn decompress(&self, encoding: Option<&str>, data: &[u8]) -> Result<Vec<u8>> {
        let encoding = encoding.ok_or_else(|| Status::internal(NO_MESSAGE_ENCODING))?;
        if encoding == IDENTITY_ENCODING {
            return Err(Status::internal(IDENTITY_MESSAGE_ENCODING).into());
        }

        let provider = self.compression.get(encoding).ok_or_else(|| {
            let supported = self.compression.encoding_names().collect::<Vec<_>>();
            Status::unimplemented(format!(
                "Unsupported grpc-encoding value '{}'. Supported encodings: {}",
                encoding,
                supported.join(", ")
            ))
        })?;

        Ok(provider.decompress(data)?)
    }

    fn compress(&self, encoding: &str, data: &[u8]) -> Result<Vec<u8>> {
        let provider = self.compression.get(encoding).ok_or_else(|| {
            Status::internal(format!(
                "Could not find compression provider for '{}'.",
                encoding
            ))
        })?;

        Ok(provider.compress(data)?)
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Read until `buf` is full or the stream ends, returning the bytes read
async fn read_to_fill<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut received = 0;
    while received < buf.len() {
        let read = reader.read(&mut buf[received..]).await?;
        if read == 0 {
            break;
        }
        received += read;
    }
    Ok(received)
}

/// Builder for configuring a framer
#[derive(Default)]
pub struct FramerBuilder {
    max_receive_message_size: Option<usize>,
    max_send_message_size: Option<usize>,
    compression: Option<Arc<CompressionRegistry>>,
}

impl FramerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest accepted inbound payload, `None` for unbounded
    pub fn max_receive_message_size(mut self, size: Option<usize>) -> Self {
        self.max_receive_message_size = size;
        self
    }

    /// Set the largest allowed outbound payload, `None` for unbounded
    pub fn max_send_message_size(mut self, size: Option<usize>) -> Self {
        self.max_send_message_size = size;
        self
    }

    /// Set the compression codecs
    pub fn compression(mut self, registry: Arc<CompressionRegistry>) -> Self {
        self.compression = Some(registry);
        self
    }

    pub fn build(self) -> Framer {
        Framer {
            max_receive_message_size: self.max_receive_message_size,
            max_send_message_size: self.max_send_message_size,
            compression: self
                .compression
                .unwrap_or_else(|| Arc::new(CompressionRegistry::empty())),
        }
    }
}
