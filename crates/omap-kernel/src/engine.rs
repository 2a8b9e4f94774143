//! Runtime mapping engine.
//!
//! Every top-level call gets a fresh [`DependencyContext`]; nested object and
//! collection mapping reuses it, so one call resolves each dependency once.

use crate::context::{Dependencies, DependencyContext};
use crate::declaration::DependencySpec;
use crate::error::{CollectionRejection, MappingError};
use crate::resolver::DependencyResolver;
use crate::rules::{ElementPlan, EntryKind, Getter, MappingEntry, RuleSet, Setter, TargetMode};
use crate::types::{CollectionShape, TypeRef, TypeRegistry};
use crate::value::{CollectionRef, ObjectRef, Value};
use std::sync::Arc;
use tracing::trace;

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperOptions {
    /// Maximum nesting of object/collection recursion; `None` disables the
    /// guard.
    pub max_depth: Option<usize>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
        }
    }
}

/// Maps object graphs according to a [`RuleSet`].
#[derive(Clone)]
pub struct ObjectMapper {
    rules: Arc<RuleSet>,
    resolver: Arc<dyn DependencyResolver>,
    options: MapperOptions,
}

impl ObjectMapper {
    pub fn new(rules: Arc<RuleSet>, resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            rules,
            resolver,
            options: MapperOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MapperOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> MapperOptions {
        self.options
    }

    fn operation(&self) -> Operation<'_> {
        Operation {
            rules: &self.rules,
            context: DependencyContext::new(self.resolver.as_ref(), self.rules.types()),
            max_depth: self.options.max_depth,
            depth: 0,
        }
    }

    /// Create a new target whose concrete type is inferred from the rules,
    /// bounded by `requested`.
    pub fn map(&self, source: &ObjectRef, requested: TypeRef) -> Result<ObjectRef, MappingError> {
        let mut operation = self.operation();
        operation.nested(|op| op.map_new(source, requested))
    }

    /// Like [`map`](Self::map) with `bound`, then require the result to be an
    /// `expected`.
    pub fn map_as(
        &self,
        source: &ObjectRef,
        bound: TypeRef,
        expected: TypeRef,
    ) -> Result<ObjectRef, MappingError> {
        let mapped = self.map(source, bound)?;
        let types = self.rules.types();
        if !types.is_assignable_from(expected, mapped.type_ref()) {
            return Err(MappingError::UnexpectedTargetType {
                expected: types.name(expected).to_string(),
                actual: types.name(mapped.type_ref()).to_string(),
            });
        }
        Ok(mapped)
    }

    /// Map into an existing target, in place.
    pub fn map_into(&self, source: &ObjectRef, target: &ObjectRef) -> Result<(), MappingError> {
        let mut operation = self.operation();
        operation.nested(|op| op.map_existing(source, target))
    }

    /// Null maps to null; any other value must be an object.
    pub fn map_value(&self, source: &Value, requested: TypeRef) -> Result<Value, MappingError> {
        let mut operation = self.operation();
        operation.map_value_new(source, requested)
    }
}

/// State of one top-level mapping call.
struct Operation<'m> {
    rules: &'m RuleSet,
    context: DependencyContext<'m>,
    max_depth: Option<usize>,
    depth: usize,
}

impl<'m> Operation<'m> {
    fn types(&self) -> &'m TypeRegistry {
        self.rules.types()
    }

    fn nested<T>(
        &mut self,
        step: impl FnOnce(&mut Self) -> Result<T, MappingError>,
    ) -> Result<T, MappingError> {
        if let Some(limit) = self.max_depth
            && self.depth >= limit
        {
            return Err(MappingError::DepthExceeded { limit });
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    fn map_existing(&mut self, source: &ObjectRef, target: &ObjectRef) -> Result<(), MappingError> {
        let rules = self.rules;
        let entries = rules.applicable(source.type_ref(), target.type_ref(), TargetMode::Explicit);
        trace!(
            source = self.types().name(source.type_ref()),
            target = self.types().name(target.type_ref()),
            entries = entries.len(),
            "mapping into existing target"
        );
        self.apply_all(source, target, &entries)
    }

    fn map_new(&mut self, source: &ObjectRef, requested: TypeRef) -> Result<ObjectRef, MappingError> {
        let rules = self.rules;
        let types = self.types();
        let source_type = source.type_ref();
        let entries = rules.applicable(source_type, requested, TargetMode::Implicit);
        let target_type = resolve_target_type(types, source_type, requested, &entries)?;
        trace!(
            source = types.name(source_type),
            requested = types.name(requested),
            resolved = types.name(target_type),
            "resolved target type"
        );
        let target = types.instantiate(target_type)?;
        self.apply_all(source, &target, &entries)?;
        Ok(target)
    }

    fn map_value_new(&mut self, source: &Value, requested: TypeRef) -> Result<Value, MappingError> {
        match source {
            Value::Null => Ok(Value::Null),
            Value::Object(object) => self
                .nested(|op| op.map_new(object, requested))
                .map(Value::Object),
            other => Err(MappingError::NotAnObject {
                found: other.kind_name(),
            }),
        }
    }

    /// Objects are mapped; scalars convert when the plan says so, and pass
    /// through when already of the element type.
    fn map_element(
        &mut self,
        item: &Value,
        element_type: TypeRef,
        plan: &ElementPlan,
    ) -> Result<Value, MappingError> {
        match (item, plan) {
            (Value::Object(_), _) => self.map_value_new(item, element_type),
            (other, ElementPlan::Convert(convert)) => Ok(convert(other.clone())?),
            (Value::Null, ElementPlan::Map) => Ok(Value::Null),
            (other, ElementPlan::Map) if self.types().conforms(element_type, other) => {
                Ok(other.clone())
            }
            (other, ElementPlan::Map) => Err(MappingError::NotAnObject {
                found: other.kind_name(),
            }),
        }
    }

    fn apply_all(
        &mut self,
        source: &ObjectRef,
        target: &ObjectRef,
        entries: &[&MappingEntry],
    ) -> Result<(), MappingError> {
        for entry in entries {
            trace!(entry = %entry.description, "applying entry");
            self.apply(source, target, entry)
                .map_err(|cause| MappingError::MappingFailed {
                    description: entry.description.clone(),
                    cause: Box::new(cause),
                })?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        source: &ObjectRef,
        target: &ObjectRef,
        entry: &MappingEntry,
    ) -> Result<(), MappingError> {
        match &entry.kind {
            EntryKind::Property {
                action,
                dependencies,
            } => {
                let resolved = self.dependencies(dependencies.as_ref())?;
                action(source, target, &resolved)
            }
            EntryKind::Object {
                source: read_source,
                existing,
                attach,
                target_type,
            } => self.apply_object(source, target, read_source, existing, attach, *target_type),
            EntryKind::Collection {
                source: read_source,
                existing,
                attach,
                collection_type,
                element_type,
                element,
            } => {
                let items = match read_source(source)? {
                    Value::Null => Vec::new(),
                    Value::Collection(collection) => collection.items(),
                    other => {
                        return Err(MappingError::NotACollection {
                            found: other.kind_name(),
                        });
                    }
                };
                let mut mapped = Vec::with_capacity(items.len());
                for item in &items {
                    mapped.push(self.map_element(item, *element_type, element)?);
                }
                self.store_collection(target, existing, attach, *collection_type, mapped)
            }
            EntryKind::Function {
                action,
                dependencies,
            } => {
                let resolved = self.dependencies(dependencies.as_ref())?;
                action(source, target, &resolved)
            }
            EntryKind::Ignore { .. } => Ok(()),
        }
    }

    fn dependencies(&mut self, spec: Option<&DependencySpec>) -> Result<Dependencies, MappingError> {
        match spec {
            Some(spec) => Ok(self.context.resolve_all(spec)?),
            None => Ok(Dependencies::empty()),
        }
    }

    fn apply_object(
        &mut self,
        source: &ObjectRef,
        target: &ObjectRef,
        read_source: &Getter,
        existing: &Getter,
        attach: &Setter,
        target_type: TypeRef,
    ) -> Result<(), MappingError> {
        let nested_source = read_source(source)?;
        match existing(target)? {
            Value::Null => {
                let created = self.map_value_new(&nested_source, target_type)?;
                if created.is_null() {
                    return Ok(());
                }
                attach(target, created)
            }
            Value::Object(nested_target) => match nested_source {
                // An existing nested target is never replaced or cleared.
                Value::Null => Ok(()),
                Value::Object(nested_source) => {
                    self.nested(|op| op.map_existing(&nested_source, &nested_target))
                }
                other => Err(MappingError::NotAnObject {
                    found: other.kind_name(),
                }),
            },
            other => Err(MappingError::NotAnObject {
                found: other.kind_name(),
            }),
        }
    }

    fn store_collection(
        &mut self,
        target: &ObjectRef,
        existing: &Getter,
        attach: &Setter,
        collection_type: TypeRef,
        mapped: Vec<Value>,
    ) -> Result<(), MappingError> {
        let types = self.types();
        match existing(target)? {
            Value::Null => {
                let created = types.new_collection(collection_type, mapped)?;
                attach(target, Value::Collection(created))
            }
            Value::Collection(current) => {
                reject_in_place(types, collection_type, &current)?;
                current.replace_with(mapped)?;
                Ok(())
            }
            other => Err(MappingError::NotACollection {
                found: other.kind_name(),
            }),
        }
    }
}

fn reject_in_place(
    types: &TypeRegistry,
    declared: TypeRef,
    current: &CollectionRef,
) -> Result<(), MappingError> {
    let reason = if types.collection_shape(declared) == Some(CollectionShape::Array)
        || current.shape() == CollectionShape::Array
    {
        CollectionRejection::Array
    } else if current.shape() == CollectionShape::ReadOnly {
        CollectionRejection::ReadOnly
    } else {
        return Ok(());
    };
    Err(MappingError::ReadOnlyOrArrayTargetCollection {
        collection: types.name(current.type_ref()).to_string(),
        reason,
    })
}

fn distinct(candidates: impl Iterator<Item = TypeRef>) -> Vec<TypeRef> {
    let mut targets = Vec::new();
    for candidate in candidates {
        if !targets.contains(&candidate) {
            targets.push(candidate);
        }
    }
    targets
}

/// Concrete target type for an implicit-mode call.
///
/// Entries declared for exactly the runtime source type decide first; only
/// when there are none do inherited entries decide.
pub fn resolve_target_type(
    types: &TypeRegistry,
    source_type: TypeRef,
    requested: TypeRef,
    entries: &[&MappingEntry],
) -> Result<TypeRef, MappingError> {
    let ambiguous = |candidates: &[TypeRef]| MappingError::AmbiguousTargetType {
        source_type: types.name(source_type).to_string(),
        requested: types.name(requested).to_string(),
        candidates: candidates
            .iter()
            .map(|t| types.name(*t).to_string())
            .collect(),
    };

    let exact = distinct(
        entries
            .iter()
            .filter(|e| e.source == source_type)
            .map(|e| e.target),
    );
    match exact.as_slice() {
        [single] => return Ok(*single),
        [] => {}
        many => return Err(ambiguous(many)),
    }

    let inherited = distinct(entries.iter().map(|e| e.target));
    match inherited.as_slice() {
        [single] => Ok(*single),
        [] => Err(MappingError::NoMappingFound {
            source_type: types.name(source_type).to_string(),
            requested: types.name(requested).to_string(),
        }),
        many => Err(ambiguous(many)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ConfigurationBuilder;
    use crate::resolver::NoDependencies;
    use crate::types::{Member, ScalarKind};

    struct Model {
        types: Arc<TypeRegistry>,
        node: TypeRef,
        copy: TypeRef,
    }

    /// `Node { Next: Node }` mapped onto `Copy { Next: Copy }`.
    fn linked() -> Model {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let node = types.declare_class("Node").unwrap();
        let copy = types.declare_class("Copy").unwrap();
        types.add_member(node, Member::new("Value", int)).unwrap();
        types.add_member(node, Member::new("Next", node)).unwrap();
        types.add_member(copy, Member::new("Value", int)).unwrap();
        types.add_member(copy, Member::new("Next", copy)).unwrap();
        Model {
            types: Arc::new(types),
            node,
            copy,
        }
    }

    fn mapper(model: &Model, options: MapperOptions) -> ObjectMapper {
        let mut builder = ConfigurationBuilder::new();
        builder.map(model.node, model.copy).map_all();
        let rules = builder.build(model.types.clone()).unwrap();
        ObjectMapper::new(Arc::new(rules), Arc::new(NoDependencies)).with_options(options)
    }

    #[test]
    fn nested_chains_terminate_at_null() {
        let model = linked();
        let head = model.types.instantiate(model.node).unwrap();
        let tail = model.types.instantiate(model.node).unwrap();
        head.set("Value", Value::I32(1)).unwrap();
        tail.set("Value", Value::I32(2)).unwrap();
        head.set("Next", Value::Object(tail)).unwrap();

        let copied = mapper(&model, MapperOptions::default())
            .map(&head, model.copy)
            .unwrap();
        let next = copied.get("Next").and_then(|v| v.as_object().cloned()).unwrap();
        assert_eq!(next.get("Value"), Some(Value::I32(2)));
        assert_eq!(next.get("Next"), Some(Value::Null));
    }

    #[test]
    fn cyclic_graphs_hit_the_depth_limit() {
        let model = linked();
        let looped = model.types.instantiate(model.node).unwrap();
        looped.set("Next", Value::Object(looped.clone())).unwrap();

        let err = mapper(&model, MapperOptions { max_depth: Some(8) })
            .map(&looped, model.copy)
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            MappingError::DepthExceeded { limit: 8 }
        ));
        assert_eq!(err.entry_trail().len(), 8);
    }

    #[test]
    fn map_value_passes_null_through() {
        let model = linked();
        let mapper = mapper(&model, MapperOptions::default());
        assert_eq!(mapper.map_value(&Value::Null, model.copy).unwrap(), Value::Null);
        assert!(matches!(
            mapper.map_value(&Value::I32(1), model.copy),
            Err(MappingError::NotAnObject { found: "i32" })
        ));
    }
}
