//! Runtime values flowing through the mapper.
//!
//! Objects and collections are shared mutable handles so that mapping into an
//! existing graph mutates it in place and identity is observable.

use crate::error::{CollectionError, UnknownMember};
use crate::types::{CollectionShape, Layout, TypeRef};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Decimal(Decimal),
    Object(ObjectRef),
    Collection(CollectionRef),
    Handle(Handle),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::DateTimeOffset(_) => "datetimeoffset",
            Value::Decimal(_) => "decimal",
            Value::Object(_) => "object",
            Value::Collection(_) => "collection",
            Value::Handle(_) => "handle",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Value::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Runtime type of an object or collection value.
    pub fn runtime_type(&self) -> Option<TypeRef> {
        match self {
            Value::Object(object) => Some(object.type_ref()),
            Value::Collection(collection) => Some(collection.type_ref()),
            _ => None,
        }
    }
}

/// Scalars compare by value; objects, collections and handles by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b),
            (Value::Handle(a), Value::Handle(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::U8(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::I16(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl From<CollectionRef> for Value {
    fn from(value: CollectionRef) -> Self {
        Value::Collection(value)
    }
}

/// Opaque payload handed out by a dependency resolver.
#[derive(Clone)]
pub struct Handle(Rc<dyn Any>);

impl Handle {
    pub fn new<T: Any>(payload: T) -> Self {
        Self(Rc::new(payload))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", Rc::as_ptr(&self.0))
    }
}

struct ObjectData {
    ty: TypeRef,
    layout: Arc<Layout>,
    slots: Vec<Value>,
}

/// Shared handle to a class instance.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    /// Use `TypeRegistry::instantiate`; slots must line up with `layout`.
    pub(crate) fn from_parts(ty: TypeRef, layout: Arc<Layout>, slots: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(ObjectData { ty, layout, slots })))
    }

    pub fn type_ref(&self) -> TypeRef {
        self.0.borrow().ty
    }

    pub fn type_name(&self) -> String {
        self.0.borrow().layout.owner().to_string()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.0.borrow().layout.slot(name).is_some()
    }

    pub fn member_type(&self, name: &str) -> Option<TypeRef> {
        let data = self.0.borrow();
        let slot = data.layout.slot(name)?;
        data.layout.members().get(slot).map(|m| m.ty)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.0
            .borrow()
            .layout
            .members()
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        let slot = data.layout.slot(name)?;
        data.slots.get(slot).cloned()
    }

    /// Store without type checking; the engine checks against the member type.
    pub fn set(&self, name: &str, value: Value) -> Result<(), UnknownMember> {
        let mut data = self.0.borrow_mut();
        let unknown = |data: &ObjectData| UnknownMember {
            type_name: data.layout.owner().to_string(),
            member: name.to_string(),
        };
        let Some(slot) = data.layout.slot(name) else {
            return Err(unknown(&data));
        };
        if slot >= data.slots.len() {
            return Err(unknown(&data));
        }
        data.slots[slot] = value;
        Ok(())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Members are not printed: graphs may be cyclic.
        match self.0.try_borrow() {
            Ok(data) => write!(f, "ObjectRef({} @ {:p})", data.ty, Rc::as_ptr(&self.0)),
            Err(_) => write!(f, "ObjectRef(<borrowed> @ {:p})", Rc::as_ptr(&self.0)),
        }
    }
}

struct CollectionData {
    ty: TypeRef,
    shape: CollectionShape,
    items: Vec<Value>,
}

/// Shared handle to a collection instance.
#[derive(Clone)]
pub struct CollectionRef(Rc<RefCell<CollectionData>>);

impl CollectionRef {
    pub(crate) fn new(ty: TypeRef, shape: CollectionShape, items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(CollectionData { ty, shape, items })))
    }

    pub fn type_ref(&self) -> TypeRef {
        self.0.borrow().ty
    }

    pub fn shape(&self) -> CollectionShape {
        self.0.borrow().shape
    }

    pub fn ptr_eq(&self, other: &CollectionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().items.is_empty()
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().items.clone()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().items.get(index).cloned()
    }

    fn check_growable(&self) -> Result<(), CollectionError> {
        match self.shape() {
            CollectionShape::Array => Err(CollectionError::FixedSize),
            CollectionShape::ReadOnly => Err(CollectionError::ReadOnly),
            CollectionShape::List | CollectionShape::Sequence => Ok(()),
        }
    }

    pub fn push(&self, value: Value) -> Result<(), CollectionError> {
        self.check_growable()?;
        self.0.borrow_mut().items.push(value);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        self.check_growable()?;
        self.0.borrow_mut().items.clear();
        Ok(())
    }

    /// Clear then append, keeping this instance.
    pub fn replace_with(&self, items: Vec<Value>) -> Result<(), CollectionError> {
        self.check_growable()?;
        let mut data = self.0.borrow_mut();
        data.items.clear();
        data.items.extend(items);
        Ok(())
    }
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => write!(
                f,
                "CollectionRef({} {:?} len={} @ {:p})",
                data.ty,
                data.shape,
                data.items.len(),
                Rc::as_ptr(&self.0)
            ),
            Err(_) => write!(f, "CollectionRef(<borrowed> @ {:p})", Rc::as_ptr(&self.0)),
        }
    }
}
