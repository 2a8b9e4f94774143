//! Error types for omap kernel operations.
//!
//! Configuration-time problems are collected into a single [`ConfigError`]
//! so one failed build reports everything wrong with a rule set. Mapping-time
//! failures abort the current top-level call and are wrapped per entry in
//! [`MappingError::MappingFailed`].

use crate::types::{TypeRef, TypeRegistry};
use serde::{Deserialize, Serialize};

/// Errors raised while registering or inspecting types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("invalid type reference: {0}")]
    InvalidTypeRef(TypeRef),

    #[error("type already registered: {0}")]
    DuplicateType(String),

    #[error("member {member} already declared on {type_name}")]
    DuplicateMember { type_name: String, member: String },

    /// Adding the edge would make `base` a subtype of `derived`.
    #[error("supertype cycle: {derived} cannot extend {base}")]
    SupertypeCycle { derived: String, base: String },

    #[error("{0} is not a class type")]
    NotAClass(String),

    #[error("{0} is not a collection type")]
    NotACollection(String),

    #[error("{0} cannot be constructed")]
    NotConstructible(String),

    #[error("cannot determine item type for collection type {type_name}: candidates {}", .candidates.join(", "))]
    AmbiguousElementType {
        type_name: String,
        candidates: Vec<String>,
    },
}

/// Errors raised by value converters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("converter for {source_type}->{target_type} does not exist")]
    ConversionNotFound {
        source_type: String,
        target_type: String,
    },

    #[error("converter expected a {expected} value, got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },

    #[error("conversion failed: {0}")]
    Failed(String),
}

/// Errors raised by dependency resolvers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("dependency not registered: {type_name}{}", .name.as_deref().map(|n| format!(" (name: {n})")).unwrap_or_default())]
    NotRegistered {
        type_name: String,
        name: Option<String>,
    },

    #[error("dependency {type_name} failed to resolve: {message}")]
    Failed { type_name: String, message: String },
}

impl ResolveError {
    pub fn not_registered(types: &TypeRegistry, ty: TypeRef, name: Option<&str>) -> Self {
        ResolveError::NotRegistered {
            type_name: types.name(ty).to_string(),
            name: name.map(ToOwned::to_owned),
        }
    }

    pub fn failed(types: &TypeRegistry, ty: TypeRef, message: impl Into<String>) -> Self {
        ResolveError::Failed {
            type_name: types.name(ty).to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised when mutating a collection in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("arrays cannot be resized in place")]
    FixedSize,

    #[error("collection is read-only")]
    ReadOnly,
}

/// A member name that has no slot on an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no member {member} on {type_name}")]
pub struct UnknownMember {
    pub type_name: String,
    pub member: String,
}

/// Classification of configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigIssueKind {
    /// Auto-mapping found no source counterpart for a target member.
    UnmatchedMember,
    /// Auto-mapping needed a nested object/collection rule that was never declared.
    NoNestedMapping,
    /// A collection type exposes more than one element type.
    AmbiguousCollectionElementType,
    /// A declaration names a target member that is missing or not assignable.
    MissingMemberOnTarget,
    /// A declaration names a source member that is missing.
    MissingMemberOnSource,
    /// A collection declaration points at a member that is not a collection.
    NotACollection,
    /// A conversion claimed a type pair but could not produce a converter.
    ConversionUnavailable,
    /// An explicit declaration pairs types that neither match nor convert.
    TypeMismatch,
}

impl ConfigIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigIssueKind::UnmatchedMember => "unmatched_member",
            ConfigIssueKind::NoNestedMapping => "no_nested_mapping",
            ConfigIssueKind::AmbiguousCollectionElementType => "ambiguous_collection_element_type",
            ConfigIssueKind::MissingMemberOnTarget => "missing_member_on_target",
            ConfigIssueKind::MissingMemberOnSource => "missing_member_on_source",
            ConfigIssueKind::NotACollection => "not_a_collection",
            ConfigIssueKind::ConversionUnavailable => "conversion_unavailable",
            ConfigIssueKind::TypeMismatch => "type_mismatch",
        }
    }
}

/// One problem found while building a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigIssue {
    pub kind: ConfigIssueKind,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(
        kind: ConfigIssueKind,
        source: impl Into<String>,
        target: impl Into<String>,
        member: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            member: member.map(ToOwned::to_owned),
            message: message.into(),
        }
    }
}

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - [{}] {}", issue.kind.as_str(), issue.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration build failure. No partial rule set is ever produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the following error(s) occurred while building the mapper:\n{}", render_issues(.issues))]
    Invalid { issues: Vec<ConfigIssue> },

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ConfigError {
    /// Every aggregated issue (empty for non-aggregate failures).
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            ConfigError::Invalid { issues } => issues,
            ConfigError::Type(_) => &[],
        }
    }
}

/// Why an existing target collection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionRejection {
    Array,
    ReadOnly,
}

impl std::fmt::Display for CollectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionRejection::Array => write!(f, "cannot map collection to initialized array"),
            CollectionRejection::ReadOnly => write!(f, "cannot map collection to read-only list"),
        }
    }
}

/// Mapping-time failures.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("cannot map from {source_type} to {requested}: cannot decide what the target type should be, options are: {}", .candidates.join(", "))]
    AmbiguousTargetType {
        source_type: String,
        requested: String,
        candidates: Vec<String>,
    },

    #[error("cannot map from {source_type} to {requested}: no target types found")]
    NoMappingFound {
        source_type: String,
        requested: String,
    },

    #[error("{collection}: {reason}")]
    ReadOnlyOrArrayTargetCollection {
        collection: String,
        reason: CollectionRejection,
    },

    /// A failure while applying one entry, attributed to that entry.
    #[error("error while mapping {description}")]
    MappingFailed {
        description: String,
        #[source]
        cause: Box<MappingError>,
    },

    #[error("mapped {actual} is not assignable to {expected}")]
    UnexpectedTargetType { expected: String, actual: String },

    #[error("cannot assign {found} to {member} of type {expected}")]
    TypeMismatch {
        member: String,
        expected: String,
        found: &'static str,
    },

    #[error("expected an object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("expected a collection, found {found}")]
    NotACollection { found: &'static str },

    #[error("member {member} on {type_name} has no setter")]
    MemberNotWritable { type_name: String, member: String },

    #[error("recursion depth limit {limit} exceeded; the object graph may be cyclic")]
    DepthExceeded { limit: usize },

    #[error(transparent)]
    UnknownMember(#[from] UnknownMember),

    #[error(transparent)]
    Dependency(#[from] ResolveError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Raised by user-supplied accessors and functions.
    #[error("{0}")]
    Custom(String),
}

impl MappingError {
    pub fn custom(message: impl Into<String>) -> Self {
        MappingError::Custom(message.into())
    }

    /// The innermost error below any `MappingFailed` wrappers.
    pub fn root_cause(&self) -> &MappingError {
        let mut current = self;
        while let MappingError::MappingFailed { cause, .. } = current {
            current = cause;
        }
        current
    }

    /// Entry descriptions from the outermost wrapper inwards.
    pub fn entry_trail(&self) -> Vec<&str> {
        let mut trail = Vec::new();
        let mut current = self;
        while let MappingError::MappingFailed { description, cause } = current {
            trail.push(description.as_str());
            current = cause;
        }
        trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_lists_every_issue() {
        let err = ConfigError::Invalid {
            issues: vec![
                ConfigIssue::new(
                    ConfigIssueKind::UnmatchedMember,
                    "Foo",
                    "Bar",
                    Some("A"),
                    "Foo->Bar: no source member for A",
                ),
                ConfigIssue::new(
                    ConfigIssueKind::UnmatchedMember,
                    "Foo",
                    "Bar",
                    Some("B"),
                    "Foo->Bar: no source member for B",
                ),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("[unmatched_member] Foo->Bar: no source member for A"));
        assert!(rendered.contains("[unmatched_member] Foo->Bar: no source member for B"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn root_cause_unwraps_entry_wrappers() {
        let err = MappingError::MappingFailed {
            description: "FooO.Foo -> BarO.Bar".into(),
            cause: Box::new(MappingError::MappingFailed {
                description: "Foo.Property1 -> Bar.Property3".into(),
                cause: Box::new(MappingError::custom("boom")),
            }),
        };
        assert!(matches!(err.root_cause(), MappingError::Custom(m) if m == "boom"));
        assert_eq!(
            err.entry_trail(),
            vec!["FooO.Foo -> BarO.Bar", "Foo.Property1 -> Bar.Property3"]
        );
    }

    #[test]
    fn issue_kind_serializes_snake_case() {
        let json = serde_json::to_value(ConfigIssueKind::NoNestedMapping).expect("serialize");
        assert_eq!(json, serde_json::json!("no_nested_mapping"));
        assert_eq!(ConfigIssueKind::NoNestedMapping.as_str(), "no_nested_mapping");
    }
}
