/// Scratch slot a marshaller fills with the serialized payload
///
/// Created per message and dropped once the bytes are handed to the framer.
#[derive(Debug, Default)]
pub struct SerializationContext {
    payload: Option<Vec<u8>>,
}

impl SerializationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the finished payload
    pub fn complete(&mut self, payload: Vec<u8>) {
        self.payload = Some(payload);
    }

    /// Take the payload out, leaving the context empty
    pub fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.payload.take()
    }
}

/// Received payload handed to a marshaller for decoding
#[derive(Debug)]
pub struct DeserializationContext {
    payload: Vec<u8>,
}

impl DeserializationContext {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_length(&self) -> usize {
        self.payload.len()
    }
}
