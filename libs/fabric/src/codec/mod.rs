use crate::context::{DeserializationContext, SerializationContext};
use crate::error::Result;

pub mod bincode;
pub mod raw;

pub use self::bincode::BincodeCodec;
pub use self::raw::RawCodec;

/// Marshaller trait for turning messages into payloads and back
///
/// One marshaller is fixed per request or response type of a method.
pub trait Marshaller<T>: Send + Sync {
    /// Serialize a value into the context's payload slot
    fn serialize(&self, value: &T, context: &mut SerializationContext) -> Result<()>;

    /// Deserialize the context's payload into a value
    fn deserialize(&self, context: &DeserializationContext) -> Result<T>;
}
