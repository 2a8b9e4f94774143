//! JSON codec for object graphs.
//!
//! Objects are JSON objects whose keys are member names. A `"$type"` key names
//! the concrete runtime type when it differs from the declared one; `encode`
//! always writes it. Date-times are RFC 3339 strings (without an offset for
//! `datetime`). Decimals decode from numbers or strings and encode as strings,
//! keeping their exact digits.

use crate::error::DocumentError;
use chrono::{DateTime, NaiveDateTime};
use omap_kernel::{ObjectRef, ScalarKind, TypeKind, TypeRef, TypeRegistry, Value};
use rust_decimal::Decimal;
use serde_json::Value as Json;
use std::str::FromStr;

pub const TYPE_KEY: &str = "$type";

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Decode `json` as a value of declared type `ty`.
pub fn decode(types: &TypeRegistry, ty: TypeRef, json: &Json) -> Result<Value, DocumentError> {
    decode_at(types, ty, json, "$")
}

fn decode_at(
    types: &TypeRegistry,
    ty: TypeRef,
    json: &Json,
    path: &str,
) -> Result<Value, DocumentError> {
    let kind = types
        .kind(ty)
        .ok_or_else(|| DocumentError::decode(path, format!("unknown type reference {ty}")))?;
    match kind {
        TypeKind::Optional(inner) => {
            if json.is_null() {
                Ok(Value::Null)
            } else {
                decode_at(types, *inner, json, path)
            }
        }
        TypeKind::Scalar(scalar) => decode_scalar(*scalar, json, path),
        TypeKind::Class(_) => {
            if json.is_null() {
                return Ok(Value::Null);
            }
            decode_object(types, ty, json, path).map(Value::Object)
        }
        TypeKind::Collection(_) => {
            if json.is_null() {
                return Ok(Value::Null);
            }
            let element = types.element_type(ty)?.ok_or_else(|| {
                DocumentError::decode(
                    path,
                    format!("{} declares no element type", types.name(ty)),
                )
            })?;
            let items = json
                .as_array()
                .ok_or_else(|| DocumentError::decode(path, "expected an array"))?
                .iter()
                .enumerate()
                .map(|(index, item)| decode_at(types, element, item, &format!("{path}[{index}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Collection(types.new_collection(ty, items)?))
        }
        TypeKind::Opaque => Err(DocumentError::decode(
            path,
            format!("opaque type {} has no JSON form", types.name(ty)),
        )),
    }
}

fn decode_object(
    types: &TypeRegistry,
    declared: TypeRef,
    json: &Json,
    path: &str,
) -> Result<ObjectRef, DocumentError> {
    let fields = json
        .as_object()
        .ok_or_else(|| DocumentError::decode(path, "expected an object"))?;
    let concrete = match fields.get(TYPE_KEY) {
        None => declared,
        Some(Json::String(name)) => {
            let found = types
                .lookup(name)
                .ok_or_else(|| DocumentError::UnknownType(name.clone()))?;
            if !types.is_assignable_from(declared, found) {
                return Err(DocumentError::decode(
                    path,
                    format!("{name} is not assignable to {}", types.name(declared)),
                ));
            }
            found
        }
        Some(_) => return Err(DocumentError::decode(path, "\"$type\" must be a string")),
    };

    let object = types.instantiate(concrete)?;
    for (key, field) in fields {
        if key == TYPE_KEY {
            continue;
        }
        let member = types.member(concrete, key).ok_or_else(|| {
            DocumentError::decode(
                path,
                format!("no member {key} on {}", types.name(concrete)),
            )
        })?;
        let value = decode_at(types, member.ty, field, &format!("{path}.{key}"))?;
        object
            .set(key, value)
            .map_err(|err| DocumentError::decode(path, err.to_string()))?;
    }
    Ok(object)
}

fn decode_scalar(kind: ScalarKind, json: &Json, path: &str) -> Result<Value, DocumentError> {
    let mismatch = || DocumentError::decode(path, format!("expected {}, got {json}", kind.name()));
    let int = || json.as_i64().ok_or_else(mismatch);
    let narrow = |n: i64| mismatch_range(path, kind, n);

    if json.is_null() {
        return match kind {
            ScalarKind::String => Ok(Value::Null),
            _ => Err(mismatch()),
        };
    }
    let value = match kind {
        ScalarKind::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        ScalarKind::U8 => {
            let n = int()?;
            Value::U8(u8::try_from(n).map_err(|_| narrow(n))?)
        }
        ScalarKind::I16 => {
            let n = int()?;
            Value::I16(i16::try_from(n).map_err(|_| narrow(n))?)
        }
        ScalarKind::I32 => {
            let n = int()?;
            Value::I32(i32::try_from(n).map_err(|_| narrow(n))?)
        }
        ScalarKind::I64 => Value::I64(int()?),
        ScalarKind::F32 => Value::F32(json.as_f64().ok_or_else(mismatch)? as f32),
        ScalarKind::F64 => Value::F64(json.as_f64().ok_or_else(mismatch)?),
        ScalarKind::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        ScalarKind::DateTime => {
            let text = json.as_str().ok_or_else(mismatch)?;
            let parsed = text
                .parse::<NaiveDateTime>()
                .map_err(|err| DocumentError::decode(path, format!("bad datetime {text:?}: {err}")))?;
            Value::DateTime(parsed)
        }
        ScalarKind::DateTimeOffset => {
            let text = json.as_str().ok_or_else(mismatch)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|err| {
                DocumentError::decode(path, format!("bad datetimeoffset {text:?}: {err}"))
            })?;
            Value::DateTimeOffset(parsed)
        }
        ScalarKind::Decimal => {
            let text = match json {
                Json::String(text) => text.clone(),
                Json::Number(number) => number.to_string(),
                _ => return Err(mismatch()),
            };
            let parsed = Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|err| DocumentError::decode(path, format!("bad decimal {text:?}: {err}")))?;
            Value::Decimal(parsed)
        }
    };
    Ok(value)
}

fn mismatch_range(path: &str, kind: ScalarKind, n: i64) -> DocumentError {
    DocumentError::decode(path, format!("{n} is out of range for {}", kind.name()))
}

/// Encode `value`; fails on cyclic object graphs.
pub fn encode(types: &TypeRegistry, value: &Value) -> Result<Json, DocumentError> {
    let mut stack = Vec::new();
    encode_at(types, value, "$", &mut stack)
}

fn encode_at(
    types: &TypeRegistry,
    value: &Value,
    path: &str,
    stack: &mut Vec<ObjectRef>,
) -> Result<Json, DocumentError> {
    let json = match value {
        Value::Null | Value::Handle(_) => Json::Null,
        Value::Bool(b) => Json::from(*b),
        Value::U8(n) => Json::from(*n),
        Value::I16(n) => Json::from(*n),
        Value::I32(n) => Json::from(*n),
        Value::I64(n) => Json::from(*n),
        Value::F32(n) => Json::from(*n),
        Value::F64(n) => Json::from(*n),
        Value::String(s) => Json::from(s.as_str()),
        Value::DateTime(d) => Json::from(d.format(NAIVE_FORMAT).to_string()),
        Value::DateTimeOffset(d) => Json::from(d.to_rfc3339()),
        Value::Decimal(d) => Json::from(d.to_string()),
        Value::Collection(collection) => Json::Array(
            collection
                .items()
                .iter()
                .enumerate()
                .map(|(index, item)| encode_at(types, item, &format!("{path}[{index}]"), stack))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(object) => {
            if stack.iter().any(|seen| seen.ptr_eq(object)) {
                return Err(DocumentError::Encode {
                    path: path.to_string(),
                    reason: "object graph is cyclic".to_string(),
                });
            }
            stack.push(object.clone());
            let mut fields = serde_json::Map::new();
            fields.insert(
                TYPE_KEY.to_string(),
                Json::from(types.name(object.type_ref())),
            );
            for name in object.member_names() {
                let field = object.get(&name).unwrap_or_default();
                let encoded = encode_at(types, &field, &format!("{path}.{name}"), stack)?;
                fields.insert(name, encoded);
            }
            stack.pop();
            Json::Object(fields)
        }
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omap_kernel::Member;
    use serde_json::json;

    struct Fixture {
        types: TypeRegistry,
        shape: TypeRef,
        circle: TypeRef,
        drawing: TypeRef,
    }

    fn fixture() -> Fixture {
        let mut types = TypeRegistry::new();
        let f64_ty = types.scalar(ScalarKind::F64);
        let text = types.scalar(ScalarKind::String);
        let stamp = types.scalar(ScalarKind::DateTimeOffset);
        let shape = types.declare_abstract_class("Shape").unwrap();
        let circle = types.declare_class("Circle").unwrap();
        types.extend(circle, shape).unwrap();
        types.add_member(shape, Member::new("Label", text)).unwrap();
        types.add_member(circle, Member::new("Radius", f64_ty)).unwrap();
        let shapes = types.list(shape).unwrap();
        let drawing = types.declare_class("Drawing").unwrap();
        types.add_member(drawing, Member::new("Shapes", shapes)).unwrap();
        types.add_member(drawing, Member::new("Saved", stamp)).unwrap();
        Fixture {
            types,
            shape,
            circle,
            drawing,
        }
    }

    #[test]
    fn decodes_polymorphic_elements_by_type_key() {
        let f = fixture();
        let json = json!({
            "Shapes": [{ "$type": "Circle", "Label": "c", "Radius": 2.5 }],
            "Saved": "2024-05-01T08:00:00+02:00"
        });
        let decoded = decode(&f.types, f.drawing, &json).unwrap();
        let drawing = decoded.as_object().unwrap();
        let shapes = drawing.get("Shapes").unwrap();
        let first = shapes.as_collection().unwrap().get(0).unwrap();
        let circle = first.as_object().unwrap();
        assert_eq!(circle.type_ref(), f.circle);
        assert_eq!(circle.get("Radius"), Some(Value::F64(2.5)));

        let encoded = encode(&f.types, &decoded).unwrap();
        assert_eq!(
            encoded,
            json!({
                "$type": "Drawing",
                "Shapes": [{ "$type": "Circle", "Label": "c", "Radius": 2.5 }],
                "Saved": "2024-05-01T08:00:00+02:00"
            })
        );
    }

    #[test]
    fn abstract_types_need_a_concrete_type_key() {
        let f = fixture();
        let err = decode(&f.types, f.shape, &json!({ "Label": "x" })).unwrap_err();
        assert!(matches!(err, DocumentError::Type(_)), "{err}");

        let err = decode(&f.types, f.circle, &json!({ "$type": "Drawing" })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot decode $: Drawing is not assignable to Circle"
        );
    }

    #[test]
    fn reports_the_failing_path() {
        let f = fixture();
        let json = json!({ "Shapes": [{ "$type": "Circle", "Radius": "big" }] });
        let err = decode(&f.types, f.drawing, &json).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot decode $.Shapes[0].Radius: expected f64, got \"big\""
        );
    }

    #[test]
    fn narrow_integers_are_range_checked() {
        let types = TypeRegistry::new();
        let byte = types.scalar(ScalarKind::U8);
        assert_eq!(decode(&types, byte, &json!(200)).unwrap(), Value::U8(200));
        assert!(decode(&types, byte, &json!(300)).is_err());
    }

    #[test]
    fn naive_date_times_round_trip() {
        let types = TypeRegistry::new();
        let naive = types.scalar(ScalarKind::DateTime);
        let value = decode(&types, naive, &json!("2024-02-29T12:30:00")).unwrap();
        assert_eq!(encode(&types, &value).unwrap(), json!("2024-02-29T12:30:00"));
    }

    #[test]
    fn decimals_keep_their_digits() {
        let types = TypeRegistry::new();
        let decimal = types.scalar(ScalarKind::Decimal);
        let from_text = decode(&types, decimal, &json!("10.50")).unwrap();
        assert_eq!(from_text, Value::Decimal(Decimal::new(1050, 2)));
        assert_eq!(encode(&types, &from_text).unwrap(), json!("10.50"));

        let from_number = decode(&types, decimal, &json!(3)).unwrap();
        assert_eq!(from_number, Value::Decimal(Decimal::from(3)));
        let err = decode(&types, decimal, &json!(true)).unwrap_err();
        assert_eq!(err.to_string(), "cannot decode $: expected decimal, got true");
    }

    #[test]
    fn cyclic_graphs_cannot_be_encoded() {
        let mut types = TypeRegistry::new();
        let node = types.declare_class("Node").unwrap();
        types.add_member(node, Member::new("Next", node)).unwrap();
        let looped = types.instantiate(node).unwrap();
        looped.set("Next", Value::Object(looped.clone())).unwrap();

        let err = encode(&types, &Value::Object(looped)).unwrap_err();
        assert_eq!(err.to_string(), "cannot encode $.Next: object graph is cyclic");
    }
}
