//! Value-level conversions between scalar type pairs.
//!
//! A [`ConversionRegistry`] is an ordered list of [`Conversion`]s. Lookups scan
//! from the most recently registered conversion backwards, so registering a
//! conversion for a pair already covered by the defaults overrides them.

use crate::error::ConversionError;
use crate::types::{ScalarKind, TypeRef, TypeRegistry};
use crate::value::Value;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Compiled converter for one source/target pair.
pub type Converter = Arc<dyn Fn(Value) -> Result<Value, ConversionError> + Send + Sync>;

/// A family of conversions.
pub trait Conversion: Send + Sync {
    fn can_convert(&self, types: &TypeRegistry, source: TypeRef, target: TypeRef) -> bool;

    fn create(
        &self,
        types: &TypeRegistry,
        source: TypeRef,
        target: TypeRef,
    ) -> Result<Converter, ConversionError>;
}

/// Conversion for exactly one type pair, backed by a closure.
pub struct FnConversion {
    source: TypeRef,
    target: TypeRef,
    convert: Converter,
}

impl FnConversion {
    pub fn new<F>(source: TypeRef, target: TypeRef, convert: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        Self {
            source,
            target,
            convert: Arc::new(convert),
        }
    }
}

impl Conversion for FnConversion {
    fn can_convert(&self, _types: &TypeRegistry, source: TypeRef, target: TypeRef) -> bool {
        source == self.source && target == self.target
    }

    fn create(
        &self,
        types: &TypeRegistry,
        source: TypeRef,
        target: TypeRef,
    ) -> Result<Converter, ConversionError> {
        if !self.can_convert(types, source, target) {
            return Err(not_found(types, source, target));
        }
        Ok(self.convert.clone())
    }
}

type ScalarFn = fn(Value) -> Result<Value, ConversionError>;

/// Table of scalar-to-scalar conversions keyed by [`ScalarKind`] pairs.
#[derive(Default)]
pub struct TableConversion {
    rows: Vec<(ScalarKind, ScalarKind, ScalarFn)>,
}

macro_rules! scalar_rule {
    ($from:ident => $to:ident, fallible |$v:ident| $body:expr) => {
        (
            ScalarKind::$from,
            ScalarKind::$to,
            (|value: Value| match value {
                Value::$from($v) => $body.map(Value::$to),
                other => Err(ConversionError::UnexpectedValue {
                    expected: ScalarKind::$from.name(),
                    found: other.kind_name(),
                }),
            }) as ScalarFn,
        )
    };
    ($from:ident => $to:ident) => {
        (
            ScalarKind::$from,
            ScalarKind::$to,
            (|value: Value| match value {
                Value::$from(v) => Ok(Value::$to(v as _)),
                other => Err(ConversionError::UnexpectedValue {
                    expected: ScalarKind::$from.name(),
                    found: other.kind_name(),
                }),
            }) as ScalarFn,
        )
    };
    ($from:ident => $to:ident, |$v:ident| $body:expr) => {
        (
            ScalarKind::$from,
            ScalarKind::$to,
            (|value: Value| match value {
                Value::$from($v) => Ok(Value::$to($body)),
                other => Err(ConversionError::UnexpectedValue {
                    expected: ScalarKind::$from.name(),
                    found: other.kind_name(),
                }),
            }) as ScalarFn,
        )
    };
}

impl TableConversion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lossless numeric widenings, bool to integer, date-time bridging, and
    /// decimal in from the integers and out to the floats.
    pub fn with_defaults() -> Self {
        Self {
            rows: vec![
                scalar_rule!(I32 => I64),
                scalar_rule!(I32 => F64),
                scalar_rule!(I32 => F32),
                scalar_rule!(I16 => I32),
                scalar_rule!(I16 => I64),
                scalar_rule!(U8 => I16),
                scalar_rule!(U8 => I32),
                scalar_rule!(U8 => I64),
                scalar_rule!(F32 => F64),
                scalar_rule!(Bool => I32, |b| i32::from(b)),
                scalar_rule!(Bool => I16, |b| i16::from(b)),
                scalar_rule!(Bool => U8, |b| u8::from(b)),
                scalar_rule!(DateTime => DateTimeOffset, |d| d.and_utc().fixed_offset()),
                scalar_rule!(DateTimeOffset => DateTime, |d| d.naive_local()),
                scalar_rule!(U8 => Decimal, |n| Decimal::from(n)),
                scalar_rule!(I16 => Decimal, |n| Decimal::from(n)),
                scalar_rule!(I32 => Decimal, |n| Decimal::from(n)),
                scalar_rule!(I64 => Decimal, |n| Decimal::from(n)),
                scalar_rule!(Decimal => F64, fallible |d| d.to_f64().ok_or_else(|| out_of_range(d, "f64"))),
                scalar_rule!(Decimal => F32, fallible |d| d.to_f32().ok_or_else(|| out_of_range(d, "f32"))),
            ],
        }
    }

    pub fn insert(&mut self, source: ScalarKind, target: ScalarKind, convert: ScalarFn) {
        self.rows.push((source, target, convert));
    }

    fn row(&self, types: &TypeRegistry, source: TypeRef, target: TypeRef) -> Option<ScalarFn> {
        let source = types.scalar_kind(source)?;
        let target = types.scalar_kind(target)?;
        self.rows
            .iter()
            .find(|(from, to, _)| *from == source && *to == target)
            .map(|(_, _, convert)| *convert)
    }
}

impl Conversion for TableConversion {
    fn can_convert(&self, types: &TypeRegistry, source: TypeRef, target: TypeRef) -> bool {
        self.row(types, source, target).is_some()
    }

    fn create(
        &self,
        types: &TypeRegistry,
        source: TypeRef,
        target: TypeRef,
    ) -> Result<Converter, ConversionError> {
        let convert = self
            .row(types, source, target)
            .ok_or_else(|| not_found(types, source, target))?;
        Ok(Arc::new(convert))
    }
}

/// Bridges `T` and `T?`. Unwrapping null yields the default of `T`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptionalConversion;

impl Conversion for OptionalConversion {
    fn can_convert(&self, types: &TypeRegistry, source: TypeRef, target: TypeRef) -> bool {
        types.optional_inner(source) == Some(target) || types.optional_inner(target) == Some(source)
    }

    fn create(
        &self,
        types: &TypeRegistry,
        source: TypeRef,
        target: TypeRef,
    ) -> Result<Converter, ConversionError> {
        if types.optional_inner(target) == Some(source) {
            return Ok(Arc::new(|value: Value| -> Result<Value, ConversionError> {
                Ok(value)
            }));
        }
        if types.optional_inner(source) == Some(target) {
            // Values are not `Send`; keep the scalar kind and rebuild the default.
            let fallback = types.scalar_kind(target);
            return Ok(Arc::new(move |value: Value| {
                if value.is_null() {
                    Ok(fallback.map(ScalarKind::default_value).unwrap_or_default())
                } else {
                    Ok(value)
                }
            }));
        }
        Err(not_found(types, source, target))
    }
}

fn out_of_range(value: Decimal, target: &str) -> ConversionError {
    ConversionError::Failed(format!("{value} is out of range for {target}"))
}

fn not_found(types: &TypeRegistry, source: TypeRef, target: TypeRef) -> ConversionError {
    ConversionError::ConversionNotFound {
        source_type: types.name(source).to_string(),
        target_type: types.name(target).to_string(),
    }
}

/// Ordered composition of conversions; the last registered match wins.
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    conversions: Vec<Arc<dyn Conversion>>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default table followed by optional bridging.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TableConversion::with_defaults());
        registry.register(OptionalConversion);
        registry
    }

    pub fn register<C: Conversion + 'static>(&mut self, conversion: C) -> &mut Self {
        self.conversions.push(Arc::new(conversion));
        self
    }

    pub fn register_fn<F>(&mut self, source: TypeRef, target: TypeRef, convert: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.register(FnConversion::new(source, target, convert))
    }

    /// Append every conversion of `other`, which then takes precedence.
    pub fn extend(&mut self, other: &ConversionRegistry) -> &mut Self {
        self.conversions.extend(other.conversions.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }

    pub fn can_convert(&self, types: &TypeRegistry, source: TypeRef, target: TypeRef) -> bool {
        self.conversions
            .iter()
            .any(|conversion| conversion.can_convert(types, source, target))
    }

    pub fn create_converter(
        &self,
        types: &TypeRegistry,
        source: TypeRef,
        target: TypeRef,
    ) -> Result<Converter, ConversionError> {
        self.conversions
            .iter()
            .rev()
            .find(|conversion| conversion.can_convert(types, source, target))
            .ok_or_else(|| not_found(types, source, target))?
            .create(types, source, target)
    }
}
