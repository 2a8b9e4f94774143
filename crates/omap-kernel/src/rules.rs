//! Compiled mapping entries and the immutable rule set.

use crate::context::Dependencies;
use crate::conversion::{ConversionRegistry, Converter};
use crate::declaration::{DependencySpec, FunctionAction};
use crate::error::MappingError;
use crate::types::{TypeRef, TypeRegistry};
use crate::value::{ObjectRef, Value};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reads a member (or computed value) from an instance.
pub type Getter = Arc<dyn Fn(&ObjectRef) -> Result<Value, MappingError> + Send + Sync>;

/// Stores a value into a target member, type-checked.
pub type Setter = Arc<dyn Fn(&ObjectRef, Value) -> Result<(), MappingError> + Send + Sync>;

/// Compiled accessor/setter pair of a property entry.
pub type PropertyAction =
    Arc<dyn Fn(&ObjectRef, &ObjectRef, &Dependencies) -> Result<(), MappingError> + Send + Sync>;

/// What happens to each item of a mapped collection.
#[derive(Clone)]
pub enum ElementPlan {
    /// Objects go through the rules; conforming scalars are kept as they are.
    Map,
    /// Scalars go through a converter.
    Convert(Converter),
}

#[derive(Clone)]
pub enum EntryKind {
    Property {
        action: PropertyAction,
        dependencies: Option<DependencySpec>,
    },
    Object {
        source: Getter,
        existing: Getter,
        attach: Setter,
        target_type: TypeRef,
    },
    Collection {
        source: Getter,
        existing: Getter,
        attach: Setter,
        collection_type: TypeRef,
        element_type: TypeRef,
        element: ElementPlan,
    },
    Function {
        action: FunctionAction,
        dependencies: Option<DependencySpec>,
    },
    Ignore {
        member: String,
    },
}

impl EntryKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::Property { .. } => "property",
            EntryKind::Object { .. } => "object",
            EntryKind::Collection { .. } => "collection",
            EntryKind::Function { .. } => "function",
            EntryKind::Ignore { .. } => "ignore",
        }
    }
}

/// One compiled rule.
#[derive(Clone)]
pub struct MappingEntry {
    pub source: TypeRef,
    pub target: TypeRef,
    pub description: String,
    pub kind: EntryKind,
}

impl MappingEntry {
    pub fn is_ignore(&self) -> bool {
        matches!(self.kind, EntryKind::Ignore { .. })
    }
}

impl fmt::Debug for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingEntry")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("kind", &self.kind.name())
            .field("description", &self.description)
            .finish()
    }
}

/// How the target side of an entry is matched against a mapping call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// The target instance exists; its runtime type must be assignable to the
    /// entry target.
    Explicit,
    /// The target is to be created; the entry target must be assignable to
    /// the requested bound.
    Implicit,
}

/// Serializable listing row for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRow {
    pub index: usize,
    pub kind: String,
    pub source: String,
    pub target: String,
    pub description: String,
}

/// Validated, immutable set of mapping entries in declaration order.
pub struct RuleSet {
    types: Arc<TypeRegistry>,
    conversions: ConversionRegistry,
    entries: Vec<MappingEntry>,
    by_pair: HashMap<(TypeRef, TypeRef), Vec<usize>>,
    fingerprint: String,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("entries", &self.entries)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl RuleSet {
    pub(crate) fn new(
        types: Arc<TypeRegistry>,
        conversions: ConversionRegistry,
        entries: Vec<MappingEntry>,
    ) -> Self {
        let mut by_pair: HashMap<(TypeRef, TypeRef), Vec<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_pair
                .entry((entry.source, entry.target))
                .or_default()
                .push(index);
        }
        let fingerprint = compute_fingerprint(&types, &entries);
        Self {
            types,
            conversions,
            entries,
            by_pair,
            fingerprint,
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries declared for exactly this pair, in declaration order.
    pub fn entries_for(&self, source: TypeRef, target: TypeRef) -> Vec<&MappingEntry> {
        self.by_pair
            .get(&(source, target))
            .map(|indices| indices.iter().filter_map(|i| self.entries.get(*i)).collect())
            .unwrap_or_default()
    }

    /// Entries that apply to a call, in declaration order. Ignore entries
    /// never apply.
    pub fn applicable(
        &self,
        source: TypeRef,
        target: TypeRef,
        mode: TargetMode,
    ) -> Vec<&MappingEntry> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_ignore())
            .filter(|entry| self.types.is_assignable_from(entry.source, source))
            .filter(|entry| match mode {
                TargetMode::Explicit => self.types.is_assignable_from(entry.target, target),
                TargetMode::Implicit => self.types.is_assignable_from(target, entry.target),
            })
            .collect()
    }

    /// One line per entry.
    pub fn describe(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.description.clone()).collect()
    }

    pub fn rows(&self) -> Vec<EntryRow> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| EntryRow {
                index,
                kind: entry.kind.name().to_string(),
                source: self.types.name(entry.source).to_string(),
                target: self.types.name(entry.target).to_string(),
                description: entry.description.clone(),
            })
            .collect()
    }

    /// SHA-256 over entry kinds, type names and descriptions.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn compute_fingerprint(types: &TypeRegistry, entries: &[MappingEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.kind.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(types.name(entry.source).as_bytes());
        hasher.update([0u8]);
        hasher.update(types.name(entry.target).as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.description.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore(source: TypeRef, target: TypeRef, member: &str) -> MappingEntry {
        MappingEntry {
            source,
            target,
            description: format!("Ignored: -> {member}"),
            kind: EntryKind::Ignore {
                member: member.to_string(),
            },
        }
    }

    fn noop(source: TypeRef, target: TypeRef, description: &str) -> MappingEntry {
        MappingEntry {
            source,
            target,
            description: description.to_string(),
            kind: EntryKind::Function {
                action: Arc::new(
                    |_: &ObjectRef, _: &ObjectRef, _: &Dependencies| -> Result<(), MappingError> {
                        Ok(())
                    },
                ),
                dependencies: None,
            },
        }
    }

    fn hierarchy() -> (Arc<TypeRegistry>, [TypeRef; 4]) {
        let mut types = TypeRegistry::new();
        let foo = types.declare_class("Foo").unwrap();
        let foo_x = types.declare_class("FooX").unwrap();
        let bar = types.declare_class("Bar").unwrap();
        let bar_x = types.declare_class("BarX").unwrap();
        types.extend(foo_x, foo).unwrap();
        types.extend(bar_x, bar).unwrap();
        (Arc::new(types), [foo, foo_x, bar, bar_x])
    }

    #[test]
    fn applicability_depends_on_mode() {
        let (types, [foo, foo_x, bar, bar_x]) = hierarchy();
        let rules = RuleSet::new(
            types,
            ConversionRegistry::new(),
            vec![noop(foo, bar, "base"), noop(foo_x, bar_x, "derived")],
        );

        let implicit: Vec<&str> = rules
            .applicable(foo_x, bar, TargetMode::Implicit)
            .iter()
            .map(|e| e.description.as_str())
            .collect();
        assert_eq!(implicit, vec!["base", "derived"]);

        let exact: Vec<&str> = rules
            .applicable(foo_x, bar_x, TargetMode::Implicit)
            .iter()
            .map(|e| e.description.as_str())
            .collect();
        assert_eq!(exact, vec!["derived"]);

        let explicit: Vec<&str> = rules
            .applicable(foo_x, bar_x, TargetMode::Explicit)
            .iter()
            .map(|e| e.description.as_str())
            .collect();
        assert_eq!(explicit, vec!["base", "derived"]);

        let base_only: Vec<&str> = rules
            .applicable(foo, bar_x, TargetMode::Explicit)
            .iter()
            .map(|e| e.description.as_str())
            .collect();
        assert_eq!(base_only, vec!["base"]);
    }

    #[test]
    fn ignore_entries_are_listed_but_never_applied() {
        let (types, [foo, _, bar, _]) = hierarchy();
        let rules = RuleSet::new(
            types,
            ConversionRegistry::new(),
            vec![ignore(foo, bar, "Bar.P2")],
        );
        assert_eq!(rules.entries_for(foo, bar).len(), 1);
        assert!(rules.applicable(foo, bar, TargetMode::Explicit).is_empty());
        assert_eq!(rules.rows()[0].kind, "ignore");
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let (types, [foo, _, bar, _]) = hierarchy();
        let first = RuleSet::new(
            types.clone(),
            ConversionRegistry::new(),
            vec![noop(foo, bar, "MappingFunction(Foo, Bar)")],
        );
        let second = RuleSet::new(
            types.clone(),
            ConversionRegistry::new(),
            vec![noop(foo, bar, "MappingFunction(Foo, Bar)")],
        );
        let third = RuleSet::new(types, ConversionRegistry::new(), vec![]);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_ne!(first.fingerprint(), third.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }
}
