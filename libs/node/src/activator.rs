//! Per-call instance lifecycle
//!
//! An activator hands out an instance for the duration of one call, either
//! borrowed from the shared [`ServiceProvider`] or constructed on the spot, and
//! takes it back afterwards. Only instances it constructed are disposed.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::provider::ServiceProvider;

/// Explicit constructor argument supplied at registration time
#[derive(Clone)]
pub struct Argument(Arc<dyn Any + Send + Sync>);

impl Argument {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Argument(..)")
    }
}

/// Constructor parameters handed to [`Activate::activate`]
///
/// Parameters are taken in order. Positions covered by explicit registration
/// arguments use those values; later positions are resolved from the provider.
pub struct ActivationArgs<'a> {
    explicit: &'a [Argument],
    provider: &'a dyn ServiceProvider,
    position: usize,
}

impl<'a> ActivationArgs<'a> {
    pub fn new(explicit: &'a [Argument], provider: &'a dyn ServiceProvider) -> Self {
        Self {
            explicit,
            provider,
            position: 0,
        }
    }

    /// Take the next constructor parameter
    pub fn next<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>> {
        let position = self.position;
        self.position += 1;

        if let Some(Argument(value)) = self.explicit.get(position) {
            return value.clone().downcast::<T>().map_err(|_| {
                Error::activation(format!(
                    "Argument {} is not of type '{}'.",
                    position,
                    type_name::<T>()
                ))
            });
        }

        self.provider.resolve::<T>().ok_or_else(|| {
            Error::activation(format!(
                "Unable to resolve service for type '{}'.",
                type_name::<T>()
            ))
        })
    }

    /// Take the next parameter by value
    pub fn next_value<T: Any + Send + Sync + Clone>(&mut self) -> Result<T> {
        self.next::<T>().map(|value| T::clone(&value))
    }

    /// Fail if explicit arguments were left unused
    fn finish<T>(&self) -> Result<()> {
        if self.position < self.explicit.len() {
            return Err(Error::activation(format!(
                "'{}' takes {} parameters but {} explicit arguments were supplied.",
                type_name::<T>(),
                self.position,
                self.explicit.len()
            )));
        }
        Ok(())
    }
}

/// A type the activator can construct
pub trait Activate: Sized + Send + Sync + 'static {
    /// Build an instance from explicit and resolved parameters
    fn activate(args: &mut ActivationArgs<'_>) -> Result<Self>;

    /// Release resources held by an activator-created instance
    fn dispose(&self) {}
}

/// An activated instance plus who owns it
pub struct ActivatorHandle<T> {
    instance: Option<Arc<T>>,
    created: bool,
}

impl<T> ActivatorHandle<T> {
    /// `created` is true when the activator constructed (and so owns) the instance
    pub fn new(instance: Arc<T>, created: bool) -> Self {
        Self {
            instance: Some(instance),
            created,
        }
    }

    /// A handle without an instance
    pub fn empty() -> Self {
        Self {
            instance: None,
            created: false,
        }
    }

    pub fn instance(&self) -> Option<&Arc<T>> {
        self.instance.as_ref()
    }

    pub fn created(&self) -> bool {
        self.created
    }
}

impl<T> fmt::Debug for ActivatorHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatorHandle")
            .field("type", &type_name::<T>())
            .field("present", &self.instance.is_some())
            .field("created", &self.created)
            .finish()
    }
}

/// Creates and releases instances of `T`
pub trait ServiceActivator<T>: Send + Sync {
    fn create(&self, provider: &dyn ServiceProvider, args: &[Argument]) -> Result<ActivatorHandle<T>>;

    fn release(&self, handle: ActivatorHandle<T>) -> Result<()>;
}

/// Resolve-or-construct activator
pub struct DefaultActivator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultActivator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DefaultActivator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Activate> ServiceActivator<T> for DefaultActivator<T> {
    fn create(&self, provider: &dyn ServiceProvider, args: &[Argument]) -> Result<ActivatorHandle<T>> {
        // Explicit arguments always mean a fresh instance
        if args.is_empty() {
            if let Some(instance) = provider.resolve::<T>() {
                trace!(service = type_name::<T>(), "resolved instance from provider");
                return Ok(ActivatorHandle::new(instance, false));
            }
        }

        let mut activation = ActivationArgs::new(args, provider);
        let instance = T::activate(&mut activation)?;
        activation.finish::<T>()?;

        trace!(service = type_name::<T>(), "created instance");
        Ok(ActivatorHandle::new(Arc::new(instance), true))
    }

    fn release(&self, handle: ActivatorHandle<T>) -> Result<()> {
        let instance = handle.instance.ok_or(Error::ArgumentNull("instance"))?;

        if handle.created {
            trace!(service = type_name::<T>(), "disposing instance");
            instance.dispose();
        }
        Ok(())
    }
}

/// Releases its handle when dropped
///
/// Covers normal return, early error return and a call future dropped on
/// cancellation alike.
pub struct ActivationScope<T> {
    activator: Arc<dyn ServiceActivator<T>>,
    instance: Arc<T>,
    handle: Option<ActivatorHandle<T>>,
}

impl<T> ActivationScope<T> {
    pub fn create(
        activator: Arc<dyn ServiceActivator<T>>,
        provider: &dyn ServiceProvider,
        args: &[Argument],
    ) -> Result<Self> {
        let handle = activator.create(provider, args)?;
        let instance = handle
            .instance()
            .cloned()
            .ok_or(Error::ArgumentNull("instance"))?;

        Ok(Self {
            activator,
            instance,
            handle: Some(handle),
        })
    }

    /// The activated instance
    pub fn instance(&self) -> Arc<T> {
        self.instance.clone()
    }
}

impl<T> Drop for ActivationScope<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.activator.release(handle) {
                warn!(service = type_name::<T>(), error = %e, "failed to release instance");
            }
        }
    }
}
