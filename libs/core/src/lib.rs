//! Conduit Core - Types shared by the wire layer and the server
//!
//! Call outcome (`Status`), call metadata and the per-call abort signals.

pub mod metadata;
pub mod options;
pub mod status;

// Re-exports for convenience
pub use metadata::{Metadata, ACCEPT_ENCODING_HEADER, ENCODING_HEADER, IDENTITY_ENCODING};
pub use options::CallOptions;
pub use status::{Status, StatusCode};
