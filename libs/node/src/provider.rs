use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared container that service and interceptor instances are resolved from
///
/// Implementations must be safe for concurrent resolution; no locking is added
/// around them.
pub trait ServiceProvider: Send + Sync {
    /// Look up a service by type, `None` if it is not registered
    fn get_service(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl dyn ServiceProvider + '_ {
    /// Typed lookup
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_service(TypeId::of::<T>())
            .and_then(|service| service.downcast::<T>().ok())
    }
}

/// Provider with no registrations
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyProvider;

impl ServiceProvider for EmptyProvider {
    fn get_service(&self, _type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

type Factory = Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Singleton(Arc<dyn Any + Send + Sync>),
    Transient(Factory),
}

/// Builder for a [`Container`]
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, Registration>,
}

impl ServiceCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one shared instance
    pub fn add_singleton<T: Any + Send + Sync>(self, value: T) -> Self {
        self.add_shared(Arc::new(value))
    }

    /// Register an already shared instance
    pub fn add_shared<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.services
            .insert(TypeId::of::<T>(), Registration::Singleton(value));
        self
    }

    /// Register a factory producing a new instance per resolution
    pub fn add_transient<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn Any + Send + Sync>);
        self.services
            .insert(TypeId::of::<T>(), Registration::Transient(factory));
        self
    }

    pub fn build(self) -> Container {
        Container {
            services: self.services,
        }
    }
}

/// Immutable type-keyed service container
#[derive(Clone, Default)]
pub struct Container {
    services: HashMap<TypeId, Registration>,
}

impl Container {
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceProvider for Container {
    fn get_service(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        match self.services.get(&type_id)? {
            Registration::Singleton(value) => Some(value.clone()),
            Registration::Transient(factory) => Some(factory()),
        }
    }
}
