//! Conduit Fabric - Message framing and marshalling layer
//!
//! Provides the length-prefixed message envelope used on call streams
//! (5-byte header, optional per-message compression), the marshaller
//! abstraction (bincode, raw bytes) and a client-side channel.
//!
//! # Example
//!
//! ```no_run
//! use conduit_core::CallOptions;
//! use conduit_fabric::{codec::BincodeCodec, request::unary_tcp, Framer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyRequest { data: String }
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyResponse { result: i32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:8080".parse()?;
//! let req = MyRequest { data: "hello".to_string() };
//! let resp: Option<MyResponse> = unary_tcp(
//!     addr,
//!     Framer::new(),
//!     &req,
//!     &BincodeCodec,
//!     &BincodeCodec,
//!     &CallOptions::new(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod compression;
pub mod context;
pub mod error;
pub mod framing;
pub mod request;

// Re-exports for convenience
pub use channel::Channel;
pub use codec::Marshaller;
pub use compression::{CompressionProvider, CompressionRegistry};
pub use context::{DeserializationContext, SerializationContext};
pub use error::{Error, Result};
pub use framing::{FrameHeader, Framer, FramerBuilder, HEADER_SIZE};
