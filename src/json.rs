//! Protobuf JSON mapping for decoded messages.
//!
//! Follows the canonical proto3 JSON encoding: fields are keyed by their JSON name in field
//! number order, 64-bit integers are strings, bytes are base64, enums are value names and
//! fields without presence are omitted when they hold their default value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::DateTime;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

use crate::context::to_json_name as json_field_name;
use crate::context::*;
use crate::decode::*;
use crate::render::RenderError;

/// Seconds of 0001-01-01T00:00:00Z relative to the Unix epoch.
const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;

/// Seconds of 9999-12-31T23:59:59Z relative to the Unix epoch.
const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

/// Ten thousand years in seconds.
const MAX_DURATION_SECONDS: i64 = 315_576_000_000;

/// Converts a decoded message into a JSON value.
pub fn message_to_json(msg: &MessageValue, ctx: &Context) -> Result<JsonValue, RenderError>
{
    nested_json(msg, ctx, 0)
}

fn nested_json(
    msg: &MessageValue,
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    let fields: Vec<_> = msg.fields.iter().collect();
    message_json(ctx.resolve_message(msg.msg_ref), &fields, ctx, depth)
}

fn message_json(
    info: &MessageInfo,
    fields: &[&FieldValue],
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    if let Some(wkt) = well_known_json(info, fields, ctx, depth)? {
        return Ok(wkt);
    }

    let by_number = group_by_number(fields);
    let mut object = Map::new();
    for field in info.iter_fields() {
        let values = match by_number.get(&field.number) {
            Some(values) => values,
            None => continue,
        };

        let json = match field.multiplicity {
            Multiplicity::Repeated | Multiplicity::RepeatedPacked => {
                match map_entry_type(&field.field_type, ctx) {
                    Some(entry) => map_json(entry, values, ctx, depth)?,
                    None => repeated_json(values, ctx, depth)?,
                }
            }
            Multiplicity::Single | Multiplicity::Optional => {
                match singular_json(field, values, ctx, depth)? {
                    Some(json) => json,
                    None => continue,
                }
            }
        };

        object.insert(field.json_name.clone(), json);
    }

    Ok(JsonValue::Object(object))
}

/// Groups the decoded values by field number, dropping values that did not match the field
/// definition.
fn group_by_number<'a>(fields: &[&'a FieldValue]) -> BTreeMap<u64, Vec<&'a Value>>
{
    let mut by_number: BTreeMap<u64, Vec<&Value>> = BTreeMap::new();
    for field in fields {
        if let Value::Unknown(..) = field.value {
            continue;
        }
        by_number.entry(field.number).or_default().push(&field.value);
    }
    by_number
}

fn last_value<'a>(fields: &[&'a FieldValue], number: u64) -> Option<&'a Value>
{
    fields
        .iter()
        .rev()
        .find(|f| f.number == number && !matches!(f.value, Value::Unknown(..)))
        .map(|f| &f.value)
}

fn singular_json(
    field: &MessageField,
    values: &[&Value],
    ctx: &Context,
    depth: usize,
) -> Result<Option<JsonValue>, RenderError>
{
    // Multiple occurrences of a singular message field are merged together.
    if let ValueType::Message(msg_ref) = field.field_type {
        let mut merged = vec![];
        for value in values {
            if let Value::Message(m) = value {
                merged.extend(m.fields.iter());
            }
        }
        let info = ctx.resolve_message(msg_ref);
        return message_json(info, &merged, ctx, depth + 1).map(Some);
    }

    // For scalars the last one wins.
    let value = match values.last() {
        Some(value) => *value,
        None => return Ok(None),
    };

    if field.multiplicity == Multiplicity::Single && is_default(value) {
        return Ok(None);
    }

    value_json(value, ctx, depth).map(Some)
}

fn repeated_json(
    values: &[&Value],
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    let mut array = vec![];
    for value in values {
        match value {
            Value::Packed(packed) => {
                for item in packed.to_values() {
                    array.push(value_json(&item, ctx, depth)?);
                }
            }
            other => array.push(value_json(other, ctx, depth)?),
        }
    }
    Ok(JsonValue::Array(array))
}

fn map_entry_type<'a>(vt: &ValueType, ctx: &'a Context) -> Option<&'a MessageInfo>
{
    match vt {
        ValueType::Message(m) => Some(ctx.resolve_message(*m)).filter(|info| info.map_entry),
        _ => None,
    }
}

fn map_json(
    entry: &MessageInfo,
    values: &[&Value],
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    let (key_field, value_field) = match (entry.get_field(1), entry.get_field(2)) {
        (Some(k), Some(v)) => (k, v),
        _ => {
            return Err(RenderError::MalformedWireData {
                reason: format!("map entry '{}' lacks key or value field", entry.full_name),
            })
        }
    };

    let mut object = Map::new();
    for value in values {
        let fields: Vec<_> = match value {
            Value::Message(m) => m.fields.iter().collect(),
            _ => continue,
        };

        let key = match last_value(&fields, 1) {
            Some(k) => map_key(k),
            None => map_key(&default_value(&key_field.field_type)),
        };

        let json = match &value_field.field_type {
            ValueType::Message(m) => {
                let nested: Vec<_> = fields
                    .iter()
                    .filter(|f| f.number == 2)
                    .filter_map(|f| match &f.value {
                        Value::Message(nested) => Some(nested.fields.iter()),
                        _ => None,
                    })
                    .flatten()
                    .collect();
                message_json(ctx.resolve_message(*m), &nested, ctx, depth + 1)?
            }
            vt => match last_value(&fields, 2) {
                Some(v) => value_json(v, ctx, depth)?,
                None => value_json(&default_value(vt), ctx, depth)?,
            },
        };

        object.insert(key, json);
    }

    Ok(JsonValue::Object(object))
}

fn map_key(value: &Value) -> String
{
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) => v.to_string(),
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => v.to_string(),
        Value::UInt32(v) | Value::Fixed32(v) => v.to_string(),
        Value::UInt64(v) | Value::Fixed64(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}

fn value_json(
    value: &Value,
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    Ok(match value {
        Value::Double(v) => float_json(*v),
        Value::Float(v) => float_json(widen(*v)),
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) => JsonValue::from(*v),
        Value::UInt32(v) | Value::Fixed32(v) => JsonValue::from(*v),
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => JsonValue::String(v.to_string()),
        Value::UInt64(v) | Value::Fixed64(v) => JsonValue::String(v.to_string()),
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::String(v) => JsonValue::String(v.clone()),
        Value::Bytes(v) => JsonValue::String(STANDARD.encode(v)),
        Value::Enum(e) => enum_json(e, ctx),
        Value::Message(m) => nested_json(m, ctx, depth + 1)?,
        Value::Packed(p) => {
            let items = p
                .to_values()
                .iter()
                .map(|item| value_json(item, ctx, depth))
                .collect::<Result<_, _>>()?;
            JsonValue::Array(items)
        }
        Value::Incomplete(..) | Value::TooDeep(..) | Value::Unknown(..) => {
            return Err(RenderError::MalformedWireData {
                reason: "value could not be decoded".to_string(),
            })
        }
    })
}

fn enum_json(value: &EnumValue, ctx: &Context) -> JsonValue
{
    let info = ctx.resolve_enum(value.enum_ref);
    if info.full_name == "google.protobuf.NullValue" {
        return JsonValue::Null;
    }

    match info.get_field_by_value(value.value) {
        Some(field) => JsonValue::String(field.name.clone()),
        None => JsonValue::from(value.value),
    }
}

fn float_json(v: f64) -> JsonValue
{
    if v.is_nan() {
        JsonValue::String("NaN".to_string())
    } else if v.is_infinite() {
        match v.is_sign_positive() {
            true => JsonValue::String("Infinity".to_string()),
            false => JsonValue::String("-Infinity".to_string()),
        }
    } else {
        Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

/// Widens a float keeping its shortest decimal representation, so `0.1f32` becomes `0.1`.
fn widen(v: f32) -> f64
{
    v.to_string().parse().unwrap_or_else(|_| f64::from(v))
}

fn is_default(value: &Value) -> bool
{
    match value {
        Value::Double(v) => v.to_bits() == 0,
        Value::Float(v) => v.to_bits() == 0,
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) => *v == 0,
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => *v == 0,
        Value::UInt32(v) | Value::Fixed32(v) => *v == 0,
        Value::UInt64(v) | Value::Fixed64(v) => *v == 0,
        Value::Bool(v) => !*v,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        Value::Enum(e) => e.value == 0,
        _ => false,
    }
}

/// The value a field has when it's absent from the payload.
fn default_value(vt: &ValueType) -> Value
{
    match vt {
        ValueType::Double => Value::Double(0.0),
        ValueType::Float => Value::Float(0.0),
        ValueType::Int32 => Value::Int32(0),
        ValueType::Int64 => Value::Int64(0),
        ValueType::UInt32 => Value::UInt32(0),
        ValueType::UInt64 => Value::UInt64(0),
        ValueType::SInt32 => Value::SInt32(0),
        ValueType::SInt64 => Value::SInt64(0),
        ValueType::Fixed32 => Value::Fixed32(0),
        ValueType::Fixed64 => Value::Fixed64(0),
        ValueType::SFixed32 => Value::SFixed32(0),
        ValueType::SFixed64 => Value::SFixed64(0),
        ValueType::Bool => Value::Bool(false),
        ValueType::String => Value::String(String::new()),
        ValueType::Bytes => Value::Bytes(Default::default()),
        ValueType::Enum(e) => Value::Enum(EnumValue {
            enum_ref: *e,
            value: 0,
        }),
        ValueType::Message(m) => Value::Message(Box::new(MessageValue {
            msg_ref: *m,
            fields: vec![],
            garbage: None,
        })),
    }
}

fn last_or_default(info: &MessageInfo, fields: &[&FieldValue], number: u64) -> Option<Value>
{
    last_value(fields, number)
        .cloned()
        .or_else(|| info.get_field(number).map(|f| default_value(&f.field_type)))
}

fn well_known_json(
    info: &MessageInfo,
    fields: &[&FieldValue],
    ctx: &Context,
    depth: usize,
) -> Result<Option<JsonValue>, RenderError>
{
    let type_name = match info.full_name.strip_prefix("google.protobuf.") {
        Some(name) => name,
        None => return Ok(None),
    };

    let json = match type_name {
        "Timestamp" => {
            let (seconds, nanos) = seconds_and_nanos(info, fields);
            JsonValue::String(format_timestamp(seconds, nanos)?)
        }
        "Duration" => {
            let (seconds, nanos) = seconds_and_nanos(info, fields);
            JsonValue::String(format_duration(seconds, nanos)?)
        }
        "DoubleValue" | "FloatValue" | "Int64Value" | "UInt64Value" | "Int32Value"
        | "UInt32Value" | "BoolValue" | "StringValue" | "BytesValue" => {
            match last_or_default(info, fields, 1) {
                Some(value) => value_json(&value, ctx, depth)?,
                None => return Ok(None),
            }
        }
        "Struct" => match info.get_field(1).and_then(|f| map_entry_type(&f.field_type, ctx)) {
            Some(entry) => {
                let values: Vec<_> = group_by_number(fields).remove(&1).unwrap_or_default();
                map_json(entry, &values, ctx, depth)?
            }
            None => return Ok(None),
        },
        "ListValue" => {
            let values: Vec<_> = group_by_number(fields).remove(&1).unwrap_or_default();
            repeated_json(&values, ctx, depth)?
        }
        "Value" => struct_value_json(fields, ctx, depth)?,
        "FieldMask" => {
            let paths: Vec<_> = fields
                .iter()
                .filter(|f| f.number == 1)
                .filter_map(|f| match &f.value {
                    Value::String(s) => Some(json_field_name(s)),
                    _ => None,
                })
                .collect();
            JsonValue::String(paths.join(","))
        }
        "Any" => any_json(fields, ctx, depth)?,
        _ => return Ok(None),
    };

    Ok(Some(json))
}

fn seconds_and_nanos(info: &MessageInfo, fields: &[&FieldValue]) -> (i64, i32)
{
    let seconds = match last_or_default(info, fields, 1) {
        Some(Value::Int64(s)) => s,
        _ => 0,
    };
    let nanos = match last_or_default(info, fields, 2) {
        Some(Value::Int32(n)) => n,
        _ => 0,
    };
    (seconds, nanos)
}

fn format_timestamp(seconds: i64, nanos: i32) -> Result<String, RenderError>
{
    let invalid = || RenderError::InvalidWellKnownType {
        type_name: "google.protobuf.Timestamp".to_string(),
        reason: format!("seconds {} nanos {} out of range", seconds, nanos),
    };

    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&seconds)
        || !(0..1_000_000_000).contains(&nanos)
    {
        return Err(invalid());
    }

    let time = DateTime::from_timestamp(seconds, nanos as u32).ok_or_else(invalid)?;
    Ok(format!(
        "{}{}Z",
        time.format("%Y-%m-%dT%H:%M:%S"),
        format_nanos(nanos as u32)
    ))
}

fn format_duration(seconds: i64, nanos: i32) -> Result<String, RenderError>
{
    if !(-MAX_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&seconds)
        || !(-999_999_999..=999_999_999).contains(&nanos)
        || (seconds < 0 && nanos > 0)
        || (seconds > 0 && nanos < 0)
    {
        return Err(RenderError::InvalidWellKnownType {
            type_name: "google.protobuf.Duration".to_string(),
            reason: format!("seconds {} nanos {} out of range", seconds, nanos),
        });
    }

    let sign = match seconds < 0 || nanos < 0 {
        true => "-",
        false => "",
    };
    Ok(format!(
        "{}{}{}s",
        sign,
        seconds.unsigned_abs(),
        format_nanos(nanos.unsigned_abs())
    ))
}

/// Fraction of a second with 0, 3, 6 or 9 digits.
fn format_nanos(nanos: u32) -> String
{
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

fn struct_value_json(
    fields: &[&FieldValue],
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    let kind = fields
        .iter()
        .rev()
        .find(|f| (1..=6).contains(&f.number) && !matches!(f.value, Value::Unknown(..)));

    match kind {
        Some(f) if f.number == 1 => Ok(JsonValue::Null),
        Some(f) => value_json(&f.value, ctx, depth),
        None => Err(RenderError::InvalidWellKnownType {
            type_name: "google.protobuf.Value".to_string(),
            reason: "no kind is set".to_string(),
        }),
    }
}

fn any_json(
    fields: &[&FieldValue],
    ctx: &Context,
    depth: usize,
) -> Result<JsonValue, RenderError>
{
    let type_url = match last_value(fields, 1) {
        Some(Value::String(url)) => url.clone(),
        _ => String::new(),
    };
    let payload = match last_value(fields, 2) {
        Some(Value::Bytes(b)) => b.clone(),
        _ => Default::default(),
    };

    if type_url.is_empty() && payload.is_empty() {
        return Ok(JsonValue::Object(Map::new()));
    }

    let type_name = type_url.rsplit('/').next().unwrap_or_default();
    let info = ctx
        .get_message(type_name)
        .ok_or_else(|| RenderError::UnresolvableAny {
            type_url: type_url.clone(),
        })?;

    // The payload of an Any is a nested message of its own.
    if depth >= RECURSION_LIMIT {
        return Err(RenderError::MalformedWireData {
            reason: format!("{}: nested more than {} levels deep", type_url, RECURSION_LIMIT),
        });
    }

    let inner = info.decode_nested(&payload, ctx, depth + 1);
    if let Some(reason) = inner.find_defect(ctx) {
        return Err(RenderError::MalformedWireData { reason });
    }

    let mut object = Map::new();
    object.insert("@type".to_string(), JsonValue::String(type_url));
    match nested_json(&inner, ctx, depth + 1)? {
        JsonValue::Object(fields) if !is_special_json(info) => object.extend(fields),
        special => {
            object.insert("value".to_string(), special);
        }
    }
    Ok(JsonValue::Object(object))
}

/// True, if the message has a special JSON representation that is wrapped in a `value` field
/// when embedded in an `Any`.
fn is_special_json(info: &MessageInfo) -> bool
{
    match info.full_name.strip_prefix("google.protobuf.") {
        Some(name) => matches!(
            name,
            "Any"
                | "Timestamp"
                | "Duration"
                | "FieldMask"
                | "Struct"
                | "Value"
                | "ListValue"
                | "DoubleValue"
                | "FloatValue"
                | "Int64Value"
                | "UInt64Value"
                | "Int32Value"
                | "UInt32Value"
                | "BoolValue"
                | "StringValue"
                | "BytesValue"
        ),
        None => false,
    }
}

impl PackedArray
{
    /// Expands the packed array into individual values.
    pub fn to_values(&self) -> Vec<Value>
    {
        match self {
            PackedArray::Double(v) => v.iter().map(|i| Value::Double(*i)).collect(),
            PackedArray::Float(v) => v.iter().map(|i| Value::Float(*i)).collect(),
            PackedArray::Int32(v) => v.iter().map(|i| Value::Int32(*i)).collect(),
            PackedArray::Int64(v) => v.iter().map(|i| Value::Int64(*i)).collect(),
            PackedArray::UInt32(v) => v.iter().map(|i| Value::UInt32(*i)).collect(),
            PackedArray::UInt64(v) => v.iter().map(|i| Value::UInt64(*i)).collect(),
            PackedArray::SInt32(v) => v.iter().map(|i| Value::SInt32(*i)).collect(),
            PackedArray::SInt64(v) => v.iter().map(|i| Value::SInt64(*i)).collect(),
            PackedArray::Fixed32(v) => v.iter().map(|i| Value::Fixed32(*i)).collect(),
            PackedArray::Fixed64(v) => v.iter().map(|i| Value::Fixed64(*i)).collect(),
            PackedArray::SFixed32(v) => v.iter().map(|i| Value::SFixed32(*i)).collect(),
            PackedArray::SFixed64(v) => v.iter().map(|i| Value::SFixed64(*i)).collect(),
            PackedArray::Bool(v) => v.iter().map(|i| Value::Bool(*i)).collect(),
            PackedArray::Enum(enum_ref, v) => v
                .iter()
                .map(|i| {
                    Value::Enum(EnumValue {
                        enum_ref: *enum_ref,
                        value: *i,
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn timestamps()
    {
        assert_eq!(format_timestamp(0, 0).unwrap(), "1970-01-01T00:00:00Z");
        assert_eq!(
            format_timestamp(1_700_000_000, 500_000_000).unwrap(),
            "2023-11-14T22:13:20.500Z"
        );
        assert_eq!(
            format_timestamp(1, 1_000).unwrap(),
            "1970-01-01T00:00:01.000001Z"
        );
        assert_eq!(
            format_timestamp(1, 1).unwrap(),
            "1970-01-01T00:00:01.000000001Z"
        );
        assert!(format_timestamp(MAX_TIMESTAMP_SECONDS + 1, 0).is_err());
        assert!(format_timestamp(0, -1).is_err());
    }

    #[test]
    fn durations()
    {
        assert_eq!(format_duration(0, 0).unwrap(), "0s");
        assert_eq!(format_duration(1, 500_000_000).unwrap(), "1.500s");
        assert_eq!(format_duration(-1, -500_000_000).unwrap(), "-1.500s");
        assert_eq!(format_duration(0, -1_000).unwrap(), "-0.000001s");
        assert!(format_duration(1, -1).is_err());
    }

    #[test]
    fn floats()
    {
        assert_eq!(float_json(f64::NAN), JsonValue::String("NaN".to_string()));
        assert_eq!(
            float_json(f64::NEG_INFINITY),
            JsonValue::String("-Infinity".to_string())
        );
        assert_eq!(float_json(1.5).to_string(), "1.5");
        assert_eq!(widen(0.1f32), 0.1f64);
    }
}
