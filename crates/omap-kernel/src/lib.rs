//! # omap kernel
//!
//! Rule-driven object-graph mapping: a declared set of type-pair rules turns
//! instances of one class hierarchy into instances of another.
//!
//! The work happens in two stages. Configuration build expands terse rules
//! ("map every member that matches by name") into a validated, immutable
//! [`RuleSet`]. The runtime [`ObjectMapper`] then consumes that rule set on
//! every call: it picks the most specific target type, constructs it, walks
//! nested objects and collections, and threads resolved dependencies into
//! user closures, memoized once per top-level call.
//!
//! ## Architecture
//!
//! ```text
//! TypeRegistry          ← Descriptors, supertype DAG, member layouts
//!     │
//! ConversionRegistry    ← Scalar converters, last registration wins
//!     │
//! Declaration           ← Raw rules (Property/Object/Collection/Function/MapAll/Ignore)
//!     │
//! build + automap       ← Expansion, validation, aggregated ConfigError
//!     │
//! RuleSet               ← Immutable compiled entries, shared across calls
//!     │
//! ObjectMapper          ← Dispatch + traversal, one DependencyContext per call
//! ```

pub mod automap;
pub mod build;
pub mod context;
pub mod conversion;
pub mod declaration;
pub mod engine;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod rules;
pub mod types;
pub mod value;

pub use context::{Dependencies, DependencyContext};
pub use conversion::{
    Conversion, ConversionRegistry, Converter, FnConversion, OptionalConversion, TableConversion,
};
pub use declaration::{
    ConfigurationBuilder, Declaration, DeclarationKind, DependencyRequest, DependencySpec,
    MapNode, PropertySource,
};
pub use engine::{DEFAULT_MAX_DEPTH, MapperOptions, ObjectMapper};
pub use error::{
    CollectionError, ConfigError, ConfigIssue, ConfigIssueKind, ConversionError, MappingError,
    ResolveError, TypeError,
};
pub use provider::RuleSetProvider;
pub use resolver::{DependencyResolver, NoDependencies, ResolverRegistry};
pub use rules::{ElementPlan, EntryKind, EntryRow, MappingEntry, RuleSet, TargetMode};
pub use types::{
    CollectionShape, Member, MemberInit, ScalarKind, TypeKind, TypeRef, TypeRegistry,
};
pub use value::{CollectionRef, Handle, ObjectRef, Value};
