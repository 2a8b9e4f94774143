//! Per-call dependency memoization.

use crate::declaration::DependencySpec;
use crate::error::ResolveError;
use crate::resolver::DependencyResolver;
use crate::types::{TypeRef, TypeRegistry};
use crate::value::Value;
use std::any::Any;
use std::collections::HashMap;
use tracing::trace;

/// Resolved values handed to a property accessor or mapping function, in the
/// order the dependency spec declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies(Vec<Value>);

impl Dependencies {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Payload of the handle at `index`, if it holds a `T`.
    pub fn handle<T: Any>(&self, index: usize) -> Option<&T> {
        self.0.get(index)?.as_handle()?.downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

/// Cache in front of a resolver, owned by one top-level mapping call.
///
/// Requests are keyed by `(type, name)` with an absent name stored as the
/// empty string; the resolver still receives the name as requested.
pub struct DependencyContext<'r> {
    resolver: &'r dyn DependencyResolver,
    types: &'r TypeRegistry,
    cache: HashMap<(TypeRef, String), Value>,
}

impl<'r> DependencyContext<'r> {
    pub fn new(resolver: &'r dyn DependencyResolver, types: &'r TypeRegistry) -> Self {
        Self {
            resolver,
            types,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, ty: TypeRef, name: Option<&str>) -> Result<Value, ResolveError> {
        let key = (ty, name.unwrap_or_default().to_string());
        if let Some(cached) = self.cache.get(&key) {
            trace!(dependency = self.types.name(ty), name = key.1.as_str(), "dependency cache hit");
            return Ok(cached.clone());
        }
        trace!(dependency = self.types.name(ty), name = key.1.as_str(), "dependency cache miss");
        let value = self.resolver.resolve(self.types, ty, name)?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    pub fn resolve_all(&mut self, spec: &DependencySpec) -> Result<Dependencies, ResolveError> {
        let mut values = Vec::with_capacity(spec.len());
        for request in spec.requests() {
            values.push(self.resolve(request.ty, request.name.as_deref())?);
        }
        Ok(Dependencies(values))
    }

    /// Number of distinct requests resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
