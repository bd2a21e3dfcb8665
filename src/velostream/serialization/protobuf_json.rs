//! Protobuf JSON mapping
//!
//! Prints decoded messages as JSON using the field names of the schema, in
//! declaration order. Fields without presence are always printed, defaults
//! included; fields with presence only when set. 64-bit integers are printed as
//! strings, bytes as base64, enums by value name and non-finite floats as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};
use std::collections::HashSet;

use crate::velostream::serialization::padding::{div_ceil, member_overhead, PaddingBound};
use crate::velostream::serialization::{SerializationError, SerializationResult};

fn write_string(out: &mut String, text: &str) -> SerializationResult<()> {
    let quoted = serde_json::to_string(text)
        .map_err(|e| SerializationError::decode(format!("unprintable string: {}", e)))?;
    out.push_str(&quoted);
    Ok(())
}

fn write_float(out: &mut String, value: f64, single: bool) -> SerializationResult<()> {
    if value.is_nan() {
        out.push_str("\"NaN\"");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { "\"Infinity\"" } else { "\"-Infinity\"" });
    } else {
        let printed = if single {
            serde_json::to_string(&(value as f32))
        } else {
            serde_json::to_string(&value)
        };
        out.push_str(
            &printed.map_err(|e| SerializationError::decode(format!("unprintable number: {}", e)))?,
        );
    }
    Ok(())
}

pub fn to_json(message: &DynamicMessage) -> SerializationResult<String> {
    let mut out = String::new();
    write_message(&mut out, message)?;
    Ok(out)
}

fn write_message(out: &mut String, message: &DynamicMessage) -> SerializationResult<()> {
    out.push('{');
    let mut first = true;
    for field in message.descriptor().fields() {
        if field.supports_presence() && !message.has_field(&field) {
            continue;
        }
        if !first {
            out.push(',');
        }
        first = false;
        write_string(out, field.name())?;
        out.push(':');
        write_field(out, &field, &message.get_field(&field))?;
    }
    out.push('}');
    Ok(())
}

fn write_field(out: &mut String, field: &FieldDescriptor, value: &Value) -> SerializationResult<()> {
    match value {
        Value::List(items) => {
            let kind = field.kind();
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_single(out, &kind, item)?;
            }
            out.push(']');
        }
        Value::Map(entries) => {
            let value_kind = match field.kind() {
                Kind::Message(entry) => entry.map_entry_value_field().kind(),
                other => other,
            };
            let mut sorted: Vec<(String, &Value)> =
                entries.iter().map(|(k, v)| (map_key_text(k), v)).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, &key)?;
                out.push(':');
                write_single(out, &value_kind, item)?;
            }
            out.push('}');
        }
        single => write_single(out, &field.kind(), single)?,
    }
    Ok(())
}

fn map_key_text(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

fn write_single(out: &mut String, kind: &Kind, value: &Value) -> SerializationResult<()> {
    match value {
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::I32(v) => out.push_str(&v.to_string()),
        Value::U32(v) => out.push_str(&v.to_string()),
        Value::I64(v) => {
            out.push('"');
            out.push_str(&v.to_string());
            out.push('"');
        }
        Value::U64(v) => {
            out.push('"');
            out.push_str(&v.to_string());
            out.push('"');
        }
        Value::F32(v) => write_float(out, f64::from(*v), true)?,
        Value::F64(v) => write_float(out, *v, false)?,
        Value::String(s) => write_string(out, s)?,
        Value::Bytes(bytes) => {
            out.push('"');
            out.push_str(&STANDARD.encode(bytes));
            out.push('"');
        }
        Value::EnumNumber(number) => match kind {
            Kind::Enum(e) => match e.get_value(*number) {
                Some(v) => write_string(out, v.name())?,
                None => out.push_str(&number.to_string()),
            },
            _ => out.push_str(&number.to_string()),
        },
        Value::Message(message) => write_message(out, message)?,
        Value::List(_) | Value::Map(_) => {
            return Err(SerializationError::decode("nested repeated value"));
        }
    }
    Ok(())
}

/// Whether `message` or anything nested in it carries fields the schema does not know
pub fn has_unknown_fields(message: &DynamicMessage) -> bool {
    if message.unknown_fields().next().is_some() {
        return true;
    }
    message.fields().any(|(_, value)| match value {
        Value::Message(nested) => has_unknown_fields(nested),
        Value::List(items) => items.iter().any(|item| match item {
            Value::Message(nested) => has_unknown_fields(nested),
            _ => false,
        }),
        Value::Map(entries) => entries.values().any(|item| match item {
            Value::Message(nested) => has_unknown_fields(nested),
            _ => false,
        }),
        _ => false,
    })
}

/// Text of the field at `segments`, or `None` when it is unset or not a scalar
pub fn extract_text(message: &DynamicMessage, segments: &[String]) -> Option<String> {
    let (first, rest) = segments.split_first()?;
    let field = message.descriptor().get_field_by_name(first)?;
    if field.supports_presence() && !message.has_field(&field) {
        return None;
    }
    let value = message.get_field(&field);
    if rest.is_empty() {
        return scalar_text(&field.kind(), &value);
    }
    match value.as_ref() {
        Value::Message(nested) => extract_text(nested, rest),
        _ => None,
    }
}

fn scalar_text(kind: &Kind, value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::I32(v) => Some(v.to_string()),
        Value::I64(v) => Some(v.to_string()),
        Value::U32(v) => Some(v.to_string()),
        Value::U64(v) => Some(v.to_string()),
        Value::F32(v) => Some(v.to_string()),
        Value::F64(v) => Some(v.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bytes(bytes) => Some(STANDARD.encode(bytes)),
        Value::EnumNumber(number) => match kind {
            Kind::Enum(e) => e
                .get_value(*number)
                .map(|v| v.name().to_string())
                .or_else(|| Some(number.to_string())),
            _ => Some(number.to_string()),
        },
        Value::Message(_) | Value::List(_) | Value::Map(_) => None,
    }
}

fn enum_name_width(kind: &Kind) -> usize {
    match kind {
        Kind::Enum(e) => e.values().map(|v| v.name().len()).max().unwrap_or(0),
        _ => 0,
    }
}

/// Printed length of the default value of a field without presence
fn default_chars(field: &FieldDescriptor) -> usize {
    if field.is_list() || field.is_map() {
        return 2;
    }
    match field.kind() {
        Kind::Int32 | Kind::Sint32 | Kind::Uint32 | Kind::Fixed32 | Kind::Sfixed32 => 1,
        Kind::Int64 | Kind::Sint64 | Kind::Uint64 | Kind::Fixed64 | Kind::Sfixed64 => 3,
        Kind::Float | Kind::Double => 3,
        Kind::Bool => 5,
        Kind::String | Kind::Bytes => 2,
        kind @ Kind::Enum(_) => enum_name_width(&kind) + 2,
        Kind::Message(message) => fixed_chars(&message),
    }
}

/// JSON characters printed for `message` that no payload byte pays for
pub fn fixed_chars(message: &MessageDescriptor) -> usize {
    2 + message
        .fields()
        .filter(|f| !f.supports_presence())
        .map(|f| member_overhead(f.name()) + default_chars(&f))
        .sum::<usize>()
}

/// Characters per byte of a single present value, tag byte included
fn scalar_per_byte(kind: &Kind) -> usize {
    match kind {
        Kind::Float => 4,
        Kind::String => 6,
        Kind::Enum(_) => div_ceil(enum_name_width(kind) + 2, 2).max(6),
        _ => 3,
    }
}

/// Characters per byte of one element of a repeated scalar, separator included
fn element_per_byte(kind: &Kind) -> usize {
    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Uint32 => 4,
        Kind::Int64 | Kind::Sint64 | Kind::Uint64 | Kind::Bool => 6,
        Kind::Float => 5,
        Kind::Double => 4,
        Kind::Fixed32 | Kind::Sfixed32 | Kind::Fixed64 | Kind::Sfixed64 => 3,
        Kind::String => 6,
        Kind::Bytes => 3,
        Kind::Enum(_) => (enum_name_width(kind) + 3).max(12),
        Kind::Message(_) => 0,
    }
}

fn message_per_byte(message: &MessageDescriptor, visiting: &mut HashSet<String>) -> usize {
    if !visiting.insert(message.full_name().to_string()) {
        return 0;
    }
    let per_byte = message
        .fields()
        .map(|field| field_per_byte(&field, visiting))
        .max()
        .unwrap_or(0);
    visiting.remove(message.full_name());
    per_byte
}

fn field_per_byte(field: &FieldDescriptor, visiting: &mut HashSet<String>) -> usize {
    let kind = field.kind();
    if field.is_map() {
        let Kind::Message(entry) = kind else {
            return 0;
        };
        let value_field = entry.map_entry_value_field();
        let (value_fixed, value_per_byte) = match value_field.kind() {
            Kind::Message(value) => (fixed_chars(&value), message_per_byte(&value, visiting)),
            value_kind => (default_chars(&value_field), scalar_per_byte(&value_kind)),
        };
        return div_ceil(26 + value_fixed, 2) + value_per_byte.max(6);
    }
    if field.is_list() {
        return match &kind {
            Kind::Message(element) => {
                div_ceil(fixed_chars(element) + 1, 2).max(message_per_byte(element, visiting))
            }
            scalar => element_per_byte(scalar),
        };
    }
    match &kind {
        Kind::Message(nested) => {
            div_ceil(member_overhead(field.name()) + fixed_chars(nested), 2)
                .max(message_per_byte(nested, visiting))
        }
        scalar if field.supports_presence() => {
            div_ceil(member_overhead(field.name()), 2) + scalar_per_byte(scalar)
        }
        scalar => scalar_per_byte(scalar),
    }
}

/// Bound on JSON size relative to the binary payload for `message`
pub fn json_bound(message: &MessageDescriptor) -> PaddingBound {
    PaddingBound::new(
        fixed_chars(message),
        message_per_byte(message, &mut HashSet::new()),
    )
}

/// Largest binary output per JSON input character when writing `message`
pub fn binary_per_char(message: &MessageDescriptor) -> usize {
    let mut visiting = HashSet::new();
    let mut widest = 0;
    reachable_widths(message, &mut visiting, &mut widest);
    match widest {
        8 => 9,
        4 => 5,
        _ => 2,
    }
}

fn reachable_widths(message: &MessageDescriptor, visiting: &mut HashSet<String>, widest: &mut usize) {
    if !visiting.insert(message.full_name().to_string()) {
        return;
    }
    for field in message.fields() {
        match field.kind() {
            Kind::Double | Kind::Fixed64 | Kind::Sfixed64 => *widest = (*widest).max(8),
            Kind::Float | Kind::Fixed32 | Kind::Sfixed32 => *widest = (*widest).max(4),
            Kind::Message(nested) => reachable_widths(&nested, visiting, widest),
            _ => {}
        }
    }
}
