//! Member type expressions: `i32`, `Customer`, `string?`, `list<Tag>`,
//! `array<list<i64>?>`.

use crate::error::DocumentError;
use omap_kernel::{CollectionShape, ScalarKind, TypeRef, TypeRegistry};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Named(String),
    Optional(Box<TypeExpr>),
    Collection(CollectionShape, Box<TypeExpr>),
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("type name regex must compile")
    })
}

fn collection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<shape>list|array|seq|readonly)\s*<\s*(?P<inner>.+?)\s*>$")
            .expect("collection type regex must compile")
    })
}

impl TypeExpr {
    pub fn parse(expr: &str) -> Result<Self, DocumentError> {
        let trimmed = expr.trim();
        let invalid = |reason: &str| DocumentError::TypeExpr {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid("empty"));
        }
        if let Some(inner) = trimmed.strip_suffix('?') {
            let inner = Self::parse(inner).map_err(|_| invalid("bad optional inner type"))?;
            if matches!(inner, TypeExpr::Optional(_)) {
                return Err(invalid("nested optional"));
            }
            return Ok(TypeExpr::Optional(Box::new(inner)));
        }
        if let Some(caps) = collection_re().captures(trimmed) {
            let shape = match &caps["shape"] {
                "list" => CollectionShape::List,
                "array" => CollectionShape::Array,
                "seq" => CollectionShape::Sequence,
                _ => CollectionShape::ReadOnly,
            };
            let inner =
                Self::parse(&caps["inner"]).map_err(|_| invalid("bad collection element type"))?;
            return Ok(TypeExpr::Collection(shape, Box::new(inner)));
        }
        if name_re().is_match(trimmed) {
            return Ok(TypeExpr::Named(trimmed.to_string()));
        }
        Err(invalid("expected a name, T?, or list<T>/array<T>/seq<T>/readonly<T>"))
    }

    /// Resolve against `types`, interning optional and collection types.
    pub fn resolve(&self, types: &mut TypeRegistry) -> Result<TypeRef, DocumentError> {
        match self {
            TypeExpr::Named(name) => match ScalarKind::from_name(name) {
                Some(kind) => Ok(types.scalar(kind)),
                None => types
                    .lookup(name)
                    .ok_or_else(|| DocumentError::UnknownType(name.clone())),
            },
            TypeExpr::Optional(inner) => {
                let inner = inner.resolve(types)?;
                Ok(types.optional(inner)?)
            }
            TypeExpr::Collection(shape, inner) => {
                let inner = inner.resolve(types)?;
                Ok(types.collection_of(*shape, inner)?)
            }
        }
    }
}

/// Parse and resolve in one step.
pub fn resolve_type(types: &mut TypeRegistry, expr: &str) -> Result<TypeRef, DocumentError> {
    TypeExpr::parse(expr)?.resolve(types)
}
