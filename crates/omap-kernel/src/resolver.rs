//! External dependency resolvers.

use crate::error::ResolveError;
use crate::types::{TypeRef, TypeRegistry};
use crate::value::{Handle, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup service for values that mapping rules depend on.
///
/// Implementations must fail when nothing is registered for a request rather
/// than fall back to a default. `types` is the registry of the rule set being
/// applied.
pub trait DependencyResolver: Send + Sync {
    fn resolve(
        &self,
        types: &TypeRegistry,
        ty: TypeRef,
        name: Option<&str>,
    ) -> Result<Value, ResolveError>;
}

type Factory = Arc<dyn Fn() -> Result<Value, ResolveError> + Send + Sync>;

/// Factory table keyed by `(type, name)`.
///
/// Every `resolve` call runs the factory again, so two top-level mapping calls
/// can observe different instances.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    factories: HashMap<(TypeRef, Option<String>), Factory>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, ty: TypeRef, name: Option<&str>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Value, ResolveError> + Send + Sync + 'static,
    {
        self.factories
            .insert((ty, name.map(ToOwned::to_owned)), Arc::new(factory));
        self
    }

    /// Register a factory producing a fresh [`Handle`] per call.
    pub fn register_handle<T, F>(&mut self, ty: TypeRef, name: Option<&str>, factory: F) -> &mut Self
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(ty, name, move || Ok(Value::Handle(Handle::new(factory()))))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl DependencyResolver for ResolverRegistry {
    fn resolve(
        &self,
        types: &TypeRegistry,
        ty: TypeRef,
        name: Option<&str>,
    ) -> Result<Value, ResolveError> {
        let key = (ty, name.map(ToOwned::to_owned));
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| ResolveError::not_registered(types, ty, name))?;
        factory()
    }
}

/// Resolver for configurations that declare no dependencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDependencies;

impl DependencyResolver for NoDependencies {
    fn resolve(
        &self,
        types: &TypeRegistry,
        ty: TypeRef,
        name: Option<&str>,
    ) -> Result<Value, ResolveError> {
        Err(ResolveError::not_registered(types, ty, name))
    }
}
