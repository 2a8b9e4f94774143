//! Raw rule declarations, the input to a configuration build.
//!
//! Declarations name members by string and carry user closures; nothing is
//! checked until [`ConfigurationBuilder::build`] compiles them into a
//! [`RuleSet`](crate::rules::RuleSet).

use crate::context::Dependencies;
use crate::conversion::{Conversion, ConversionRegistry, Converter};
use crate::error::{ConfigError, ConversionError, MappingError};
use crate::rules::RuleSet;
use crate::types::{TypeRef, TypeRegistry};
use crate::value::{ObjectRef, Value};
use std::fmt;
use std::sync::Arc;

/// Computes a property value from the source instance.
pub type ComputeFn =
    Arc<dyn Fn(&ObjectRef, &Dependencies) -> Result<Value, MappingError> + Send + Sync>;

/// Arbitrary mapping action over a source/target pair.
pub type FunctionAction =
    Arc<dyn Fn(&ObjectRef, &ObjectRef, &Dependencies) -> Result<(), MappingError> + Send + Sync>;

/// One dependency a rule asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRequest {
    pub ty: TypeRef,
    pub name: Option<String>,
}

impl DependencyRequest {
    pub fn of(ty: TypeRef) -> Self {
        Self { ty, name: None }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Ordered dependency tuple a rule receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySpec {
    requests: Vec<DependencyRequest>,
}

impl DependencySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ty: TypeRef, name: Option<&str>) -> Self {
        self.requests.push(DependencyRequest {
            ty,
            name: name.map(ToOwned::to_owned),
        });
        self
    }

    pub fn push(&mut self, request: DependencyRequest) {
        self.requests.push(request);
    }

    pub fn requests(&self) -> &[DependencyRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl FromIterator<DependencyRequest> for DependencySpec {
    fn from_iter<I: IntoIterator<Item = DependencyRequest>>(iter: I) -> Self {
        Self {
            requests: iter.into_iter().collect(),
        }
    }
}

/// Where a property value comes from.
#[derive(Clone)]
pub enum PropertySource {
    Member(String),
    Computed(ComputeFn),
}

impl PropertySource {
    pub fn member(name: impl Into<String>) -> Self {
        PropertySource::Member(name.into())
    }

    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&ObjectRef, &Dependencies) -> Result<Value, MappingError> + Send + Sync + 'static,
    {
        PropertySource::Computed(Arc::new(compute))
    }

    pub fn label(&self) -> &str {
        match self {
            PropertySource::Member(name) => name,
            PropertySource::Computed(_) => "(computed)",
        }
    }
}

impl fmt::Debug for PropertySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertySource::Member(name) => f.debug_tuple("Member").field(name).finish(),
            PropertySource::Computed(_) => f.write_str("Computed"),
        }
    }
}

#[derive(Clone)]
pub enum DeclarationKind {
    /// Copy (and optionally convert) one value onto a target member.
    ///
    /// `dependencies: None` means the accessor never receives resolved
    /// dependencies, even when the node declared some.
    Property {
        from: PropertySource,
        to: String,
        convert: Option<Converter>,
        dependencies: Option<DependencySpec>,
    },
    Object {
        from: String,
        to: String,
    },
    Collection {
        from: String,
        to: String,
    },
    Function {
        action: FunctionAction,
        dependencies: Option<DependencySpec>,
    },
    MapAll {
        except: Vec<String>,
    },
    Ignore {
        member: String,
    },
}

impl DeclarationKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeclarationKind::Property { .. } => "property",
            DeclarationKind::Object { .. } => "object",
            DeclarationKind::Collection { .. } => "collection",
            DeclarationKind::Function { .. } => "function",
            DeclarationKind::MapAll { .. } => "map_all",
            DeclarationKind::Ignore { .. } => "ignore",
        }
    }
}

impl fmt::Debug for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Property {
                from,
                to,
                convert,
                dependencies,
            } => f
                .debug_struct("Property")
                .field("from", from)
                .field("to", to)
                .field("converted", &convert.is_some())
                .field("dependencies", dependencies)
                .finish(),
            DeclarationKind::Object { from, to } => f
                .debug_struct("Object")
                .field("from", from)
                .field("to", to)
                .finish(),
            DeclarationKind::Collection { from, to } => f
                .debug_struct("Collection")
                .field("from", from)
                .field("to", to)
                .finish(),
            DeclarationKind::Function { dependencies, .. } => f
                .debug_struct("Function")
                .field("dependencies", dependencies)
                .finish(),
            DeclarationKind::MapAll { except } => {
                f.debug_struct("MapAll").field("except", except).finish()
            }
            DeclarationKind::Ignore { member } => {
                f.debug_struct("Ignore").field("member", member).finish()
            }
        }
    }
}

/// A raw rule for one declared (source, target) type pair.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub source: TypeRef,
    pub target: TypeRef,
    pub kind: DeclarationKind,
}

impl Declaration {
    /// Target member this declaration takes care of, if it names exactly one.
    pub fn covered_member(&self) -> Option<&str> {
        match &self.kind {
            DeclarationKind::Property { to, .. }
            | DeclarationKind::Object { to, .. }
            | DeclarationKind::Collection { to, .. } => Some(to),
            DeclarationKind::Ignore { member } => Some(member),
            DeclarationKind::Function { .. } | DeclarationKind::MapAll { .. } => None,
        }
    }

    pub fn is_map_all(&self) -> bool {
        matches!(self.kind, DeclarationKind::MapAll { .. })
    }
}

/// Collects declarations and conversions, then compiles them.
#[derive(Clone, Default)]
pub struct ConfigurationBuilder {
    declarations: Vec<Declaration>,
    conversions: ConversionRegistry,
}

impl ConfigurationBuilder {
    /// A builder with no conversions registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder preloaded with [`ConversionRegistry::standard`].
    pub fn with_standard_conversions() -> Self {
        Self {
            declarations: Vec::new(),
            conversions: ConversionRegistry::standard(),
        }
    }

    /// Start declaring rules for `source -> target`.
    pub fn map(&mut self, source: TypeRef, target: TypeRef) -> MapNode<'_> {
        MapNode {
            builder: self,
            source,
            target,
            dependencies: DependencySpec::new(),
        }
    }

    pub fn add_conversion<C: Conversion + 'static>(&mut self, conversion: C) -> &mut Self {
        self.conversions.register(conversion);
        self
    }

    pub fn add_conversions(&mut self, conversions: &ConversionRegistry) -> &mut Self {
        self.conversions.extend(conversions);
        self
    }

    pub fn convert_with<F>(&mut self, source: TypeRef, target: TypeRef, convert: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.conversions.register_fn(source, target, convert);
        self
    }

    pub fn declare(&mut self, declaration: Declaration) -> &mut Self {
        self.declarations.push(declaration);
        self
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    /// Validate, expand auto-mapping and compile every declaration.
    pub fn build(&self, types: Arc<TypeRegistry>) -> Result<RuleSet, ConfigError> {
        crate::build::build_rule_set(types, &self.declarations, &self.conversions)
    }
}

/// Declarations for one (source, target) pair.
pub struct MapNode<'b> {
    builder: &'b mut ConfigurationBuilder,
    source: TypeRef,
    target: TypeRef,
    dependencies: DependencySpec,
}

impl MapNode<'_> {
    fn push(&mut self, kind: DeclarationKind) {
        self.builder.declarations.push(Declaration {
            source: self.source,
            target: self.target,
            kind,
        });
    }

    /// Dependencies handed to later `property_with` / `function_with` rules.
    pub fn with_dependencies(mut self, spec: DependencySpec) -> Self {
        self.dependencies = spec;
        self
    }

    pub fn property(mut self, from: &str, to: &str) -> Self {
        self.push(DeclarationKind::Property {
            from: PropertySource::member(from),
            to: to.to_string(),
            convert: None,
            dependencies: None,
        });
        self
    }

    /// Property computed from the source and this node's dependencies.
    pub fn property_with<F>(mut self, to: &str, compute: F) -> Self
    where
        F: Fn(&ObjectRef, &Dependencies) -> Result<Value, MappingError> + Send + Sync + 'static,
    {
        let dependencies = Some(self.dependencies.clone());
        self.push(DeclarationKind::Property {
            from: PropertySource::computed(compute),
            to: to.to_string(),
            convert: None,
            dependencies,
        });
        self
    }

    /// Property passed through an explicit converter.
    pub fn property_converted<F>(mut self, from: &str, to: &str, convert: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.push(DeclarationKind::Property {
            from: PropertySource::member(from),
            to: to.to_string(),
            convert: Some(Arc::new(convert)),
            dependencies: None,
        });
        self
    }

    pub fn object(mut self, from: &str, to: &str) -> Self {
        self.push(DeclarationKind::Object {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn collection(mut self, from: &str, to: &str) -> Self {
        self.push(DeclarationKind::Collection {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Mapping function that never receives dependencies.
    pub fn function<F>(mut self, action: F) -> Self
    where
        F: Fn(&ObjectRef, &ObjectRef) -> Result<(), MappingError> + Send + Sync + 'static,
    {
        self.push(DeclarationKind::Function {
            action: Arc::new(
                move |source: &ObjectRef, target: &ObjectRef, _: &Dependencies| {
                    action(source, target)
                },
            ),
            dependencies: None,
        });
        self
    }

    pub fn function_with<F>(mut self, action: F) -> Self
    where
        F: Fn(&ObjectRef, &ObjectRef, &Dependencies) -> Result<(), MappingError>
            + Send
            + Sync
            + 'static,
    {
        let dependencies = Some(self.dependencies.clone());
        self.push(DeclarationKind::Function {
            action: Arc::new(action),
            dependencies,
        });
        self
    }

    pub fn map_all(self) -> Self {
        self.map_all_except(&[])
    }

    pub fn map_all_except(mut self, except: &[&str]) -> Self {
        self.push(DeclarationKind::MapAll {
            except: except.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn ignore(mut self, member: &str) -> Self {
        self.push(DeclarationKind::Ignore {
            member: member.to_string(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_record_declarations_in_order() {
        let mut types = TypeRegistry::new();
        let foo = types.declare_class("Foo").unwrap();
        let bar = types.declare_class("Bar").unwrap();

        let mut builder = ConfigurationBuilder::new();
        builder
            .map(foo, bar)
            .property("Property1", "Property3")
            .ignore("Property4")
            .map_all_except(&["Property5"]);

        let kinds: Vec<&str> = builder
            .declarations()
            .iter()
            .map(|d| d.kind.name())
            .collect();
        assert_eq!(kinds, vec!["property", "ignore", "map_all"]);
        assert_eq!(builder.declarations()[0].covered_member(), Some("Property3"));
        assert_eq!(builder.declarations()[1].covered_member(), Some("Property4"));
        assert_eq!(builder.declarations()[2].covered_member(), None);
    }

    #[test]
    fn only_with_variants_capture_node_dependencies() {
        let mut types = TypeRegistry::new();
        let foo = types.declare_class("Foo").unwrap();
        let bar = types.declare_class("Bar").unwrap();
        let clock = types.declare_opaque("Clock").unwrap();

        let mut builder = ConfigurationBuilder::new();
        builder
            .map(foo, bar)
            .with_dependencies(DependencySpec::new().with(clock, Some("utc")))
            .function(|_, _| Ok(()))
            .function_with(|_, _, _| Ok(()));

        let specs: Vec<Option<usize>> = builder
            .declarations()
            .iter()
            .map(|d| match &d.kind {
                DeclarationKind::Function { dependencies, .. } => {
                    dependencies.as_ref().map(DependencySpec::len)
                }
                _ => None,
            })
            .collect();
        assert_eq!(specs, vec![None, Some(1)]);
    }

    #[test]
    fn standard_builder_carries_default_conversions() {
        assert!(ConfigurationBuilder::new().conversions().is_empty());
        assert_eq!(
            ConfigurationBuilder::with_standard_conversions()
                .conversions()
                .len(),
            2
        );
    }
}
