//! Conduit Node - Server-side call handling
//!
//! Turns a framed request stream into a service invocation and its response
//! stream plus a terminal status. Each registered method gets a
//! [`ServerCallHandler`] fixed to its shape (unary, client streaming, server
//! streaming or duplex); service instances come from an activator backed by a
//! [`ServiceProvider`], and the invocation runs inside the method's
//! interceptor pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conduit_fabric::codec::BincodeCodec;
//! use conduit_node::{
//!     Activate, ActivationArgs, Method, MethodType, Result, Router, ServerCall,
//!     ServerCallHandler, ServiceCollection, ServiceOptions,
//! };
//!
//! struct Greeter;
//!
//! impl Activate for Greeter {
//!     fn activate(_args: &mut ActivationArgs<'_>) -> Result<Self> {
//!         Ok(Greeter)
//!     }
//! }
//!
//! # async fn example(call: ServerCall) -> Result<()> {
//! let method = Method::new(MethodType::Unary, "greet.Greeter", "SayHello", BincodeCodec, BincodeCodec);
//! let handler = ServerCallHandler::unary(
//!     method,
//!     &ServiceOptions::default(),
//!     Arc::new(ServiceCollection::new().build()),
//!     |_greeter: Arc<Greeter>, name: String, _context| async move { Ok(format!("Hello {}", name)) },
//! )?;
//!
//! let router = Router::new().add(handler);
//! let outcome = router.route("/greet.Greeter/SayHello", call).await;
//! println!("{}", outcome.status.code());
//! # Ok(())
//! # }
//! ```

pub mod activator;
pub mod context;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod method;
pub mod options;
pub mod provider;
pub mod reader;
pub mod router;
pub mod writer;

// Re-exports for convenience
pub use conduit_core::{CallOptions, Metadata, Status, StatusCode};

pub use activator::{
    Activate, ActivationArgs, ActivationScope, ActivatorHandle, Argument, DefaultActivator,
    ServiceActivator,
};
pub use context::{CallOutcome, CallState, ServerCall, ServerCallContext};
pub use error::{Error, Result};
pub use handler::ServerCallHandler;
pub use interceptor::{
    reply, Interceptor, InterceptorCollection, InterceptorPipeline, InterceptorRegistration,
    Invocation, Next, Reply,
};
pub use method::{Method, MethodType};
pub use options::{ServiceConfig, ServiceOptions, ServiceOptionsBuilder, DEFAULT_MAX_RECEIVE_MESSAGE_SIZE};
pub use provider::{Container, EmptyProvider, ServiceCollection, ServiceProvider};
pub use reader::RequestStream;
pub use router::{CallHandler, Router};
pub use writer::StreamWriter;
