use crate::codec;
use omap_kernel::{DependencyResolver, ResolveError, TypeRef, TypeRegistry, Value};
use std::collections::HashMap;
use tracing::trace;

/// Serves the constant dependencies declared in a document.
///
/// Each resolution decodes the stored JSON again, so every mapping call sees
/// its own instance.
#[derive(Debug, Clone, Default)]
pub struct DocumentResolver {
    constants: HashMap<(TypeRef, Option<String>), serde_json::Value>,
}

impl DocumentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ty: TypeRef, name: Option<&str>, value: serde_json::Value) {
        self.constants.insert((ty, name.map(ToOwned::to_owned)), value);
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

impl DependencyResolver for DocumentResolver {
    fn resolve(
        &self,
        types: &TypeRegistry,
        ty: TypeRef,
        name: Option<&str>,
    ) -> Result<Value, ResolveError> {
        let key = (ty, name.map(ToOwned::to_owned));
        let json = self
            .constants
            .get(&key)
            .ok_or_else(|| ResolveError::not_registered(types, ty, name))?;
        trace!(ty = types.name(ty), name, "decoding document dependency");
        codec::decode(types, ty, json).map_err(|err| ResolveError::failed(types, ty, err.to_string()))
    }
}
