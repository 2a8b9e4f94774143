//! Type registry: first-class descriptors for every type the mapper touches.
//!
//! Inheritance is not native to Rust, so it is modelled explicitly: each
//! class lists its supertypes, and the supertype edges form a DAG. Dispatch
//! only ever asks one question of it, [`TypeRegistry::is_assignable_from`].
//!
//! The registry is mutable while types are being declared and is then
//! shared immutably (usually behind an `Arc`) by rule sets and mappers.

use crate::error::TypeError;
use crate::value::{CollectionRef, ObjectRef, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Opaque handle of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef(u32);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Builtin scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    DateTime,
    DateTimeOffset,
    Decimal,
}

impl ScalarKind {
    /// Registration order; `TypeRegistry::new` assigns `TypeRef(i)` to `ALL[i]`.
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::Bool,
        ScalarKind::U8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::String,
        ScalarKind::DateTime,
        ScalarKind::DateTimeOffset,
        ScalarKind::Decimal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::U8 => "u8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::String => "string",
            ScalarKind::DateTime => "datetime",
            ScalarKind::DateTimeOffset => "datetimeoffset",
            ScalarKind::Decimal => "decimal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Value of a freshly constructed member of this kind.
    ///
    /// Strings behave as references and start out null; every other scalar
    /// starts at zero, `false`, or the Unix epoch.
    pub fn default_value(self) -> Value {
        match self {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::U8 => Value::U8(0),
            ScalarKind::I16 => Value::I16(0),
            ScalarKind::I32 => Value::I32(0),
            ScalarKind::I64 => Value::I64(0),
            ScalarKind::F32 => Value::F32(0.0),
            ScalarKind::F64 => Value::F64(0.0),
            ScalarKind::String => Value::Null,
            ScalarKind::DateTime => Value::DateTime(chrono::NaiveDateTime::default()),
            ScalarKind::DateTimeOffset => Value::DateTimeOffset(
                chrono::DateTime::<chrono::Utc>::default().fixed_offset(),
            ),
            ScalarKind::Decimal => Value::Decimal(rust_decimal::Decimal::ZERO),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarKind::Bool, Value::Bool(_))
                | (ScalarKind::U8, Value::U8(_))
                | (ScalarKind::I16, Value::I16(_))
                | (ScalarKind::I32, Value::I32(_))
                | (ScalarKind::I64, Value::I64(_))
                | (ScalarKind::F32, Value::F32(_))
                | (ScalarKind::F64, Value::F64(_))
                | (ScalarKind::String, Value::String(_))
                | (ScalarKind::String, Value::Null)
                | (ScalarKind::DateTime, Value::DateTime(_))
                | (ScalarKind::DateTimeOffset, Value::DateTimeOffset(_))
                | (ScalarKind::Decimal, Value::Decimal(_))
        )
    }
}

/// Storage shape of a collection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionShape {
    /// Fixed size once allocated.
    Array,
    /// Growable list.
    List,
    /// Interface-like sequence, backed by a list when constructed.
    Sequence,
    /// Built once, never cleared or appended to afterwards.
    ReadOnly,
}

impl CollectionShape {
    fn prefix(self) -> &'static str {
        match self {
            CollectionShape::Array => "array",
            CollectionShape::List => "list",
            CollectionShape::Sequence => "seq",
            CollectionShape::ReadOnly => "readonly",
        }
    }
}

/// What a member holds right after its owner is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberInit {
    /// The type default (null for references).
    #[default]
    Default,
    /// A freshly constructed instance of the member type.
    Construct,
}

/// A data member of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: TypeRef,
    pub writable: bool,
    pub public: bool,
    pub init: MemberInit,
}

impl Member {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            writable: true,
            public: true,
            init: MemberInit::Default,
        }
    }

    /// No setter: the member can be read and mutated in place, never replaced.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Excluded from auto-mapping.
    pub fn hidden(mut self) -> Self {
        self.public = false;
        self
    }

    /// Constructed together with the owning instance.
    pub fn constructed(mut self) -> Self {
        self.init = MemberInit::Construct;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassShape {
    pub supertypes: Vec<TypeRef>,
    pub members: Vec<Member>,
    pub is_abstract: bool,
}

#[derive(Debug, Clone)]
pub struct CollectionType {
    pub shape: CollectionShape,
    pub elements: Vec<TypeRef>,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Scalar(ScalarKind),
    Optional(TypeRef),
    Class(ClassShape),
    Collection(CollectionType),
    /// Known only by name, e.g. a service handed out by a dependency resolver.
    Opaque,
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub id: TypeRef,
    pub name: String,
    pub kind: TypeKind,
}

/// Flattened member slots of a class, inherited members first.
#[derive(Debug)]
pub struct Layout {
    owner: String,
    members: Vec<Member>,
    index: HashMap<String, usize>,
}

impl Layout {
    fn new(owner: &str, members: Vec<Member>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(slot, member)| (member.name.clone(), slot))
            .collect();
        Self {
            owner: owner.to_string(),
            members,
            index,
        }
    }

    /// Name of the class this layout belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn slot(&self, member: &str) -> Option<usize> {
        self.index.get(member).copied()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Registry of every type known to a mapping configuration.
#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<String, TypeRef>,
    optionals: HashMap<TypeRef, TypeRef>,
    collections: HashMap<(CollectionShape, TypeRef), TypeRef>,
    layouts: Vec<OnceLock<Arc<Layout>>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry holding only the builtin scalars.
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            optionals: HashMap::new(),
            collections: HashMap::new(),
            layouts: Vec::new(),
        };
        for kind in ScalarKind::ALL {
            registry.push(kind.name().to_string(), TypeKind::Scalar(kind));
        }
        registry
    }

    fn push(&mut self, name: String, kind: TypeKind) -> TypeRef {
        let id = TypeRef(self.types.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.types.push(TypeDescriptor { id, name, kind });
        self.layouts.push(OnceLock::new());
        id
    }

    fn push_named(&mut self, name: &str, kind: TypeKind) -> Result<TypeRef, TypeError> {
        if self.by_name.contains_key(name) {
            return Err(TypeError::DuplicateType(name.to_string()));
        }
        Ok(self.push(name.to_string(), kind))
    }

    /// Layouts depend on members and supertypes of every ancestor.
    fn invalidate_layouts(&mut self) {
        for layout in &mut self.layouts {
            layout.take();
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn scalar(&self, kind: ScalarKind) -> TypeRef {
        let position = ScalarKind::ALL
            .iter()
            .position(|candidate| *candidate == kind)
            .unwrap_or_default();
        TypeRef(position as u32)
    }

    /// Declare a concrete class with no members yet.
    pub fn declare_class(&mut self, name: &str) -> Result<TypeRef, TypeError> {
        self.push_named(name, TypeKind::Class(ClassShape::default()))
    }

    /// Declare a class that can be dispatched to but never constructed.
    pub fn declare_abstract_class(&mut self, name: &str) -> Result<TypeRef, TypeError> {
        self.push_named(
            name,
            TypeKind::Class(ClassShape {
                is_abstract: true,
                ..ClassShape::default()
            }),
        )
    }

    pub fn declare_opaque(&mut self, name: &str) -> Result<TypeRef, TypeError> {
        self.push_named(name, TypeKind::Opaque)
    }

    /// Make `derived` a direct subtype of `base`.
    pub fn extend(&mut self, derived: TypeRef, base: TypeRef) -> Result<(), TypeError> {
        self.class(base)?;
        self.class(derived)?;
        if self.is_assignable_from(derived, base) {
            return Err(TypeError::SupertypeCycle {
                derived: self.name(derived).to_string(),
                base: self.name(base).to_string(),
            });
        }
        let shape = self.class_mut(derived)?;
        if !shape.supertypes.contains(&base) {
            shape.supertypes.push(base);
        }
        self.invalidate_layouts();
        Ok(())
    }

    pub fn add_member(&mut self, owner: TypeRef, member: Member) -> Result<(), TypeError> {
        self.descriptor(member.ty)?;
        let type_name = self.name(owner).to_string();
        let shape = self.class_mut(owner)?;
        if shape.members.iter().any(|m| m.name == member.name) {
            return Err(TypeError::DuplicateMember {
                type_name,
                member: member.name,
            });
        }
        shape.members.push(member);
        self.invalidate_layouts();
        Ok(())
    }

    /// `inner?`, interned.
    pub fn optional(&mut self, inner: TypeRef) -> Result<TypeRef, TypeError> {
        if let Some(existing) = self.optionals.get(&inner) {
            return Ok(*existing);
        }
        let name = format!("{}?", self.descriptor(inner)?.name);
        let id = self.push(name, TypeKind::Optional(inner));
        self.optionals.insert(inner, id);
        Ok(id)
    }

    pub fn list(&mut self, element: TypeRef) -> Result<TypeRef, TypeError> {
        self.collection_of(CollectionShape::List, element)
    }

    pub fn array(&mut self, element: TypeRef) -> Result<TypeRef, TypeError> {
        self.collection_of(CollectionShape::Array, element)
    }

    pub fn sequence(&mut self, element: TypeRef) -> Result<TypeRef, TypeError> {
        self.collection_of(CollectionShape::Sequence, element)
    }

    pub fn read_only(&mut self, element: TypeRef) -> Result<TypeRef, TypeError> {
        self.collection_of(CollectionShape::ReadOnly, element)
    }

    /// Builtin single-element collection type, interned as `shape<element>`.
    pub fn collection_of(
        &mut self,
        shape: CollectionShape,
        element: TypeRef,
    ) -> Result<TypeRef, TypeError> {
        if let Some(existing) = self.collections.get(&(shape, element)) {
            return Ok(*existing);
        }
        let name = format!("{}<{}>", shape.prefix(), self.descriptor(element)?.name);
        let id = self.push(
            name,
            TypeKind::Collection(CollectionType {
                shape,
                elements: vec![element],
            }),
        );
        self.collections.insert((shape, element), id);
        Ok(id)
    }

    /// Named collection type that may iterate several element types.
    pub fn collection_type(
        &mut self,
        name: &str,
        shape: CollectionShape,
        elements: &[TypeRef],
    ) -> Result<TypeRef, TypeError> {
        for element in elements {
            self.descriptor(*element)?;
        }
        self.push_named(
            name,
            TypeKind::Collection(CollectionType {
                shape,
                elements: elements.to_vec(),
            }),
        )
    }

    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, ty: TypeRef) -> Result<&TypeDescriptor, TypeError> {
        self.types
            .get(ty.index())
            .ok_or(TypeError::InvalidTypeRef(ty))
    }

    pub fn kind(&self, ty: TypeRef) -> Option<&TypeKind> {
        self.types.get(ty.index()).map(|d| &d.kind)
    }

    /// Display name; unknown handles render as `#n`.
    pub fn name(&self, ty: TypeRef) -> &str {
        self.types
            .get(ty.index())
            .map(|d| d.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn scalar_kind(&self, ty: TypeRef) -> Option<ScalarKind> {
        match self.kind(ty)? {
            TypeKind::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn optional_inner(&self, ty: TypeRef) -> Option<TypeRef> {
        match self.kind(ty)? {
            TypeKind::Optional(inner) => Some(*inner),
            _ => None,
        }
    }

    pub fn is_class(&self, ty: TypeRef) -> bool {
        matches!(self.kind(ty), Some(TypeKind::Class(_)))
    }

    pub fn collection_shape(&self, ty: TypeRef) -> Option<CollectionShape> {
        match self.kind(ty)? {
            TypeKind::Collection(collection) => Some(collection.shape),
            _ => None,
        }
    }

    fn class(&self, ty: TypeRef) -> Result<&ClassShape, TypeError> {
        match &self.descriptor(ty)?.kind {
            TypeKind::Class(shape) => Ok(shape),
            _ => Err(TypeError::NotAClass(self.name(ty).to_string())),
        }
    }

    fn class_mut(&mut self, ty: TypeRef) -> Result<&mut ClassShape, TypeError> {
        let name = self.name(ty).to_string();
        match self.types.get_mut(ty.index()).map(|d| &mut d.kind) {
            Some(TypeKind::Class(shape)) => Ok(shape),
            Some(_) => Err(TypeError::NotAClass(name)),
            None => Err(TypeError::InvalidTypeRef(ty)),
        }
    }

    /// Direct supertypes, in declaration order.
    pub fn supertypes(&self, ty: TypeRef) -> &[TypeRef] {
        match self.kind(ty) {
            Some(TypeKind::Class(shape)) => &shape.supertypes,
            _ => &[],
        }
    }

    /// Whether a value of `derived` may stand where `base` is declared.
    pub fn is_assignable_from(&self, base: TypeRef, derived: TypeRef) -> bool {
        if base == derived {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<TypeRef> = self.supertypes(derived).iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if current == base {
                return true;
            }
            if seen.insert(current) {
                queue.extend(self.supertypes(current).iter().copied());
            }
        }
        false
    }

    /// Every value of type `source` conforms to `target`, so it can be stored
    /// without a conversion.
    pub fn is_compatible(&self, target: TypeRef, source: TypeRef) -> bool {
        if self.is_assignable_from(target, source) {
            return true;
        }
        match (self.kind(target), self.kind(source)) {
            (Some(TypeKind::Opaque), _) => true,
            (Some(TypeKind::Optional(inner)), Some(TypeKind::Optional(source_inner))) => {
                self.is_compatible(*inner, *source_inner)
            }
            (Some(TypeKind::Optional(inner)), _) => self.is_compatible(*inner, source),
            (Some(TypeKind::Collection(declared)), Some(TypeKind::Collection(_))) => {
                declared.shape == CollectionShape::Sequence
                    && matches!(
                        (self.element_type(target), self.element_type(source)),
                        (Ok(Some(want)), Ok(Some(have))) if want == have
                    )
            }
            _ => false,
        }
    }

    /// Layout of a class: inherited members first, redeclared names keep
    /// their inherited slot but take the derived declaration.
    pub fn layout(&self, ty: TypeRef) -> Result<Arc<Layout>, TypeError> {
        self.class(ty)?;
        let cell = self
            .layouts
            .get(ty.index())
            .ok_or(TypeError::InvalidTypeRef(ty))?;
        Ok(cell
            .get_or_init(|| {
                let mut members: Vec<Member> = Vec::new();
                let mut visited = BTreeSet::new();
                self.collect_members(ty, &mut members, &mut visited);
                Arc::new(Layout::new(self.name(ty), members))
            })
            .clone())
    }

    fn collect_members(
        &self,
        ty: TypeRef,
        into: &mut Vec<Member>,
        visited: &mut BTreeSet<TypeRef>,
    ) {
        if !visited.insert(ty) {
            return;
        }
        let Some(TypeKind::Class(shape)) = self.kind(ty) else {
            return;
        };
        for base in &shape.supertypes {
            self.collect_members(*base, into, visited);
        }
        for member in &shape.members {
            match into.iter_mut().find(|existing| existing.name == member.name) {
                Some(existing) => *existing = member.clone(),
                None => into.push(member.clone()),
            }
        }
    }

    /// Flattened members of a class; empty for every other kind.
    pub fn members(&self, ty: TypeRef) -> Vec<Member> {
        self.layout(ty)
            .map(|layout| layout.members().to_vec())
            .unwrap_or_default()
    }

    pub fn member(&self, ty: TypeRef, name: &str) -> Option<Member> {
        let layout = self.layout(ty).ok()?;
        let slot = layout.slot(name)?;
        layout.members().get(slot).cloned()
    }

    /// The single element type a collection iterates.
    ///
    /// `Ok(None)` for non-collections (and collections declaring no element
    /// type); an error when more than one element type is exposed.
    pub fn element_type(&self, ty: TypeRef) -> Result<Option<TypeRef>, TypeError> {
        let Some(TypeKind::Collection(collection)) = self.kind(ty) else {
            return Ok(None);
        };
        match collection.elements.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(*single)),
            many => Err(TypeError::AmbiguousElementType {
                type_name: self.name(ty).to_string(),
                candidates: many.iter().map(|t| self.name(*t).to_string()).collect(),
            }),
        }
    }

    pub fn default_value(&self, ty: TypeRef) -> Value {
        match self.kind(ty) {
            Some(TypeKind::Scalar(kind)) => kind.default_value(),
            _ => Value::Null,
        }
    }

    /// Whether `value` may be stored in a member declared as `ty`.
    pub fn conforms(&self, ty: TypeRef, value: &Value) -> bool {
        let Some(kind) = self.kind(ty) else {
            return false;
        };
        match (kind, value) {
            (TypeKind::Scalar(scalar), value) => scalar.accepts(value),
            (TypeKind::Optional(_), Value::Null) => true,
            (TypeKind::Optional(inner), value) => self.conforms(*inner, value),
            (TypeKind::Class(_), Value::Null) => true,
            (TypeKind::Class(_), Value::Object(object)) => {
                self.is_assignable_from(ty, object.type_ref())
            }
            (TypeKind::Collection(_), Value::Null) => true,
            (TypeKind::Collection(declared), Value::Collection(collection)) => {
                let actual = collection.type_ref();
                if actual == ty {
                    return true;
                }
                declared.shape == CollectionShape::Sequence
                    && matches!(
                        (self.element_type(ty), self.element_type(actual)),
                        (Ok(Some(want)), Ok(Some(have))) if want == have
                    )
            }
            (TypeKind::Opaque, _) => true,
            _ => false,
        }
    }

    /// Default-construct an instance of a concrete class.
    pub fn instantiate(&self, ty: TypeRef) -> Result<ObjectRef, TypeError> {
        if self.class(ty)?.is_abstract {
            return Err(TypeError::NotConstructible(self.name(ty).to_string()));
        }
        let layout = self.layout(ty)?;
        let mut slots = Vec::with_capacity(layout.len());
        for member in layout.members() {
            let value = match member.init {
                MemberInit::Default => self.default_value(member.ty),
                MemberInit::Construct => self.construct_member(member.ty)?,
            };
            slots.push(value);
        }
        Ok(ObjectRef::from_parts(ty, layout, slots))
    }

    fn construct_member(&self, ty: TypeRef) -> Result<Value, TypeError> {
        match self.kind(ty) {
            Some(TypeKind::Class(_)) => Ok(Value::Object(self.instantiate(ty)?)),
            Some(TypeKind::Collection(_)) => {
                Ok(Value::Collection(self.new_collection(ty, Vec::new())?))
            }
            Some(_) => Ok(self.default_value(ty)),
            None => Err(TypeError::InvalidTypeRef(ty)),
        }
    }

    /// A collection of type `ty` holding `items`, sized exactly.
    pub fn new_collection(&self, ty: TypeRef, items: Vec<Value>) -> Result<CollectionRef, TypeError> {
        match self.kind(ty) {
            Some(TypeKind::Collection(collection)) => {
                let mut storage = Vec::with_capacity(items.len());
                storage.extend(items);
                Ok(CollectionRef::new(ty, collection.shape, storage))
            }
            Some(_) => Err(TypeError::NotACollection(self.name(ty).to_string())),
            None => Err(TypeError::InvalidTypeRef(ty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> (TypeRegistry, TypeRef, TypeRef, TypeRef) {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let foo = types.declare_class("Foo").unwrap();
        let foo_x = types.declare_class("FooX").unwrap();
        types.extend(foo_x, foo).unwrap();
        types.add_member(foo, Member::new("Property1", int)).unwrap();
        types.add_member(foo_x, Member::new("Property2", int)).unwrap();
        (types, foo, foo_x, int)
    }

    #[test]
    fn builtin_scalars_resolve_by_name() {
        let types = TypeRegistry::new();
        for kind in ScalarKind::ALL {
            assert_eq!(types.lookup(kind.name()), Some(types.scalar(kind)));
            assert_eq!(types.scalar_kind(types.scalar(kind)), Some(kind));
        }
    }

    #[test]
    fn assignability_follows_supertypes_only_upwards() {
        let (types, foo, foo_x, _) = hierarchy();
        assert!(types.is_assignable_from(foo, foo_x));
        assert!(types.is_assignable_from(foo, foo));
        assert!(!types.is_assignable_from(foo_x, foo));
    }

    #[test]
    fn extend_rejects_cycles() {
        let (mut types, foo, foo_x, _) = hierarchy();
        let err = types.extend(foo, foo_x).unwrap_err();
        assert!(matches!(err, TypeError::SupertypeCycle { .. }));
    }

    #[test]
    fn layout_puts_inherited_members_first() {
        let (types, _, foo_x, _) = hierarchy();
        let names: Vec<String> = types.members(foo_x).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Property1", "Property2"]);
    }

    #[test]
    fn diamond_members_are_flattened_once() {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let root = types.declare_abstract_class("Root").unwrap();
        let left = types.declare_class("Left").unwrap();
        let right = types.declare_class("Right").unwrap();
        let leaf = types.declare_class("Leaf").unwrap();
        types.add_member(root, Member::new("Id", int)).unwrap();
        types.extend(left, root).unwrap();
        types.extend(right, root).unwrap();
        types.extend(leaf, left).unwrap();
        types.extend(leaf, right).unwrap();
        assert_eq!(types.members(leaf).len(), 1);
        assert!(types.is_assignable_from(root, leaf));
    }

    #[test]
    fn collection_types_are_interned() {
        let (mut types, foo, _, _) = hierarchy();
        let first = types.list(foo).unwrap();
        let second = types.list(foo).unwrap();
        assert_eq!(first, second);
        assert_eq!(types.name(first), "list<Foo>");
        assert_ne!(first, types.array(foo).unwrap());
    }

    #[test]
    fn element_type_is_rejected_when_ambiguous() {
        let (mut types, foo, foo_x, int) = hierarchy();
        let list = types.list(foo).unwrap();
        assert_eq!(types.element_type(list).unwrap(), Some(foo));
        assert_eq!(types.element_type(int).unwrap(), None);

        let twin = types
            .collection_type("Twin", CollectionShape::List, &[foo, foo_x])
            .unwrap();
        assert!(matches!(
            types.element_type(twin),
            Err(TypeError::AmbiguousElementType { .. })
        ));
    }

    #[test]
    fn abstract_classes_cannot_be_instantiated() {
        let mut types = TypeRegistry::new();
        let shape = types.declare_abstract_class("Shape").unwrap();
        assert!(matches!(
            types.instantiate(shape),
            Err(TypeError::NotConstructible(_))
        ));
    }

    #[test]
    fn instantiate_applies_member_defaults_and_construction() {
        let (mut types, foo, _, int) = hierarchy();
        let holder = types.declare_class("Holder").unwrap();
        let list = types.list(foo).unwrap();
        let text = types.scalar(ScalarKind::String);
        types.add_member(holder, Member::new("Count", int)).unwrap();
        types.add_member(holder, Member::new("Label", text)).unwrap();
        types
            .add_member(holder, Member::new("Items", list).read_only().constructed())
            .unwrap();

        let instance = types.instantiate(holder).unwrap();
        assert_eq!(instance.get("Count"), Some(Value::I32(0)));
        assert_eq!(instance.get("Label"), Some(Value::Null));
        let items = instance.get("Items").and_then(|v| v.as_collection().cloned());
        assert_eq!(items.map(|c| c.len()), Some(0));
    }

    #[test]
    fn conforms_checks_declared_types() {
        let (mut types, foo, foo_x, int) = hierarchy();
        let maybe_int = types.optional(int).unwrap();
        let derived = types.instantiate(foo_x).unwrap();
        let base = types.instantiate(foo).unwrap();

        assert!(types.conforms(int, &Value::I32(1)));
        assert!(!types.conforms(int, &Value::I64(1)));
        assert!(!types.conforms(int, &Value::Null));
        assert!(types.conforms(maybe_int, &Value::Null));
        assert!(types.conforms(maybe_int, &Value::I32(4)));
        assert!(types.conforms(foo, &Value::Object(derived)));
        assert!(!types.conforms(foo_x, &Value::Object(base)));
    }
}
