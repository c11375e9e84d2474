use crate::codec::Marshaller;
use crate::context::{DeserializationContext, SerializationContext};
use crate::error::Result;

/// Raw codec that passes bytes through without serialization
///
/// Only works with `Vec<u8>` messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Marshaller<Vec<u8>> for RawCodec {
    fn serialize(&self, value: &Vec<u8>, context: &mut SerializationContext) -> Result<()> {
        context.complete(value.clone());
        Ok(())
    }

    fn deserialize(&self, context: &DeserializationContext) -> Result<Vec<u8>> {
        Ok(context.payload().to_vec())
    }
}
