//! Interceptor registrations and the composed pipeline
//!
//! A method's interceptors are registered as an ordered list of types plus
//! explicit constructor arguments. The list is turned into an
//! [`InterceptorPipeline`] once, when the handler is built; each call then
//! activates a fresh (or container-resolved) interceptor per stage and
//! releases it when the stage returns.
//!
//! Stage 0 is outermost: with `[A, B]` registered, A sees the call first and
//! the result last.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::trace;

use crate::activator::{Activate, ActivationScope, Argument, DefaultActivator, ServiceActivator};
use crate::context::ServerCallContext;
use crate::error::Result;
use crate::provider::ServiceProvider;

/// Type-erased response produced by the innermost invocation
///
/// Unary and client-streaming calls carry the response message; streaming
/// responses carry `()`.
pub type Reply = Box<dyn Any + Send>;

/// Innermost step of the pipeline, the service method itself
pub type Invocation<'a> =
    Box<dyn FnOnce(ServerCallContext) -> BoxFuture<'a, Result<Reply>> + Send + 'a>;

/// Wrap a response value as a [`Reply`]
pub fn reply<T: Any + Send>(value: T) -> Reply {
    Box::new(value)
}

/// Middleware around a call invocation
///
/// Implementations call `next.run(context)` to continue the chain, or return
/// without it to short-circuit.
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Interceptor for Audit {
///     async fn intercept(&self, context: &ServerCallContext, next: Next<'_>) -> Result<Reply> {
///         let reply = next.run(context).await?;
///         context.set_trailer("x-audited", "true");
///         Ok(reply)
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, context: &ServerCallContext, next: Next<'_>) -> Result<Reply>;
}

#[async_trait]
trait Stage: Send + Sync {
    async fn call(
        &self,
        provider: &dyn ServiceProvider,
        context: &ServerCallContext,
        next: Next<'_>,
    ) -> Result<Reply>;
}

struct InterceptorStage<I> {
    activator: Arc<dyn ServiceActivator<I>>,
    args: Vec<Argument>,
}

#[async_trait]
impl<I: Interceptor + Activate> Stage for InterceptorStage<I> {
    async fn call(
        &self,
        provider: &dyn ServiceProvider,
        context: &ServerCallContext,
        next: Next<'_>,
    ) -> Result<Reply> {
        let scope = ActivationScope::create(self.activator.clone(), provider, &self.args)?;
        trace!(interceptor = type_name::<I>(), method = context.method(), "invoking interceptor");
        scope.instance().intercept(context, next).await
    }
}

/// The rest of the pipeline after the current interceptor
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    provider: &'a dyn ServiceProvider,
    invocation: Invocation<'a>,
}

impl<'a> Next<'a> {
    /// Run the remaining interceptors and then the service method
    pub async fn run(self, context: &ServerCallContext) -> Result<Reply> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    provider: self.provider,
                    invocation: self.invocation,
                };
                stage.call(self.provider, context, next).await
            }
            None => (self.invocation)(context.clone()).await,
        }
    }
}

/// One interceptor type plus the explicit arguments it is constructed with
#[derive(Clone)]
pub struct InterceptorRegistration {
    type_name: &'static str,
    type_id: TypeId,
    args: Vec<Argument>,
    stage: Arc<dyn Stage>,
}

impl InterceptorRegistration {
    pub fn new<I: Interceptor + Activate>(args: Vec<Argument>) -> Self {
        let stage = InterceptorStage::<I> {
            activator: Arc::new(DefaultActivator::<I>::new()),
            args: args.clone(),
        };

        Self {
            type_name: type_name::<I>(),
            type_id: TypeId::of::<I>(),
            args,
            stage: Arc::new(stage),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }
}

impl fmt::Debug for InterceptorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistration")
            .field("type", &self.type_name)
            .field("args", &self.args.len())
            .finish()
    }
}

/// Ordered interceptor registrations, duplicates allowed
#[derive(Debug, Clone, Default)]
pub struct InterceptorCollection {
    registrations: Vec<InterceptorRegistration>,
}

impl InterceptorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interceptor type `I`
    pub fn add<I: Interceptor + Activate>(&mut self, args: Vec<Argument>) -> &mut Self {
        self.push(InterceptorRegistration::new::<I>(args))
    }

    pub fn push(&mut self, registration: InterceptorRegistration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    pub fn add_range(
        &mut self,
        registrations: impl IntoIterator<Item = InterceptorRegistration>,
    ) -> &mut Self {
        self.registrations.extend(registrations);
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterceptorRegistration> {
        self.registrations.iter()
    }
}

/// Immutable chain of interceptor stages, built once and shared by every call
#[derive(Clone)]
pub struct InterceptorPipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    provider: Arc<dyn ServiceProvider>,
}

impl InterceptorPipeline {
    pub fn new(interceptors: &InterceptorCollection, provider: Arc<dyn ServiceProvider>) -> Self {
        let stages = interceptors
            .iter()
            .map(|registration| registration.stage.clone())
            .collect();
        Self { stages, provider }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the call through every stage, ending with `invocation`
    pub async fn invoke<'a>(
        &'a self,
        context: &'a ServerCallContext,
        invocation: Invocation<'a>,
    ) -> Result<Reply> {
        let next = Next {
            stages: &self.stages,
            provider: self.provider.as_ref(),
            invocation,
        };
        next.run(context).await
    }
}

impl fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}
