use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Marshaller;
use crate::context::{DeserializationContext, SerializationContext};
use crate::error::{Error, Result};

/// Bincode codec for binary serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> Marshaller<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T, context: &mut SerializationContext) -> Result<()> {
        let payload = bincode::serialize(value).map_err(|e| Error::Codec(e.to_string()))?;
        context.complete(payload);
        Ok(())
    }

    fn deserialize(&self, context: &DeserializationContext) -> Result<T> {
        bincode::deserialize(context.payload()).map_err(|e| Error::Codec(e.to_string()))
    }
}
