//! Avro JSON mapping
//!
//! Converts between decoded Avro values and the Avro JSON encoding. Union values
//! other than null are wrapped in a single-member object naming the branch.
//! Bytes and fixed values are strings whose code points are the byte values.
//! Enums are printed as their symbols, and logical types as their underlying type.
//!
//! The same module computes how much larger than its binary form a value's JSON
//! can get, per schema. Those bounds back the read-side padding.

use std::collections::{BTreeMap, HashMap, HashSet};

use apache_avro::schema::{Name, Schema, UnionSchema};
use apache_avro::types::Value;
use apache_avro::{Decimal, Duration};

use crate::velostream::serialization::padding::{div_ceil, member_overhead, PaddingBound};
use crate::velostream::serialization::{SerializationError, SerializationResult};

/// Named types of a schema, keyed by full name
pub type NamedTypes = HashMap<Name, Schema>;

/// Collect every named type so references can be followed
pub fn collect_named_types(schema: &Schema) -> NamedTypes {
    let mut names = NamedTypes::new();
    collect_into(schema, &mut names);
    names
}

fn collect_into(schema: &Schema, names: &mut NamedTypes) {
    match schema {
        Schema::Record(record) => {
            if names.insert(record.name.clone(), schema.clone()).is_none() {
                for field in &record.fields {
                    collect_into(&field.schema, names);
                }
            }
        }
        Schema::Enum(e) => {
            names.insert(e.name.clone(), schema.clone());
        }
        Schema::Fixed(fixed) => {
            names.insert(fixed.name.clone(), schema.clone());
        }
        Schema::Decimal(decimal) => collect_into(&decimal.inner, names),
        Schema::Array(array) => collect_into(&array.items, names),
        Schema::Map(map) => collect_into(&map.types, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_into(variant, names);
            }
        }
        _ => {}
    }
}

fn resolve<'a>(schema: &'a Schema, names: &'a NamedTypes) -> SerializationResult<&'a Schema> {
    match schema {
        Schema::Ref { name } => names.get(name).ok_or_else(|| {
            SerializationError::decode(format!("unknown named type {}", name.fullname(None)))
        }),
        other => Ok(other),
    }
}

/// Name of a union branch as used by the JSON wrapper object
fn branch_name(schema: &Schema) -> String {
    match schema {
        Schema::Null => "null".to_string(),
        Schema::Boolean => "boolean".to_string(),
        Schema::Int | Schema::Date | Schema::TimeMillis => "int".to_string(),
        Schema::Long
        | Schema::TimeMicros
        | Schema::TimestampMillis
        | Schema::TimestampMicros
        | Schema::TimestampNanos
        | Schema::LocalTimestampMillis
        | Schema::LocalTimestampMicros
        | Schema::LocalTimestampNanos => "long".to_string(),
        Schema::Float => "float".to_string(),
        Schema::Double => "double".to_string(),
        Schema::Bytes | Schema::BigDecimal => "bytes".to_string(),
        Schema::String | Schema::Uuid => "string".to_string(),
        Schema::Array(_) => "array".to_string(),
        Schema::Map(_) => "map".to_string(),
        Schema::Union(_) => "union".to_string(),
        Schema::Record(record) => record.name.fullname(None),
        Schema::Enum(e) => e.name.fullname(None),
        Schema::Fixed(fixed) => fixed.name.fullname(None),
        Schema::Decimal(decimal) => branch_name(&decimal.inner),
        Schema::Duration => "fixed".to_string(),
        Schema::Ref { name } => name.fullname(None),
    }
}

fn write_string(out: &mut String, text: &str) -> SerializationResult<()> {
    let quoted = serde_json::to_string(text)
        .map_err(|e| SerializationError::decode(format!("unprintable string: {}", e)))?;
    out.push_str(&quoted);
    Ok(())
}

/// Bytes as a JSON string of ISO-8859-1 code points
fn write_latin1(out: &mut String, bytes: &[u8]) -> SerializationResult<()> {
    let text: String = bytes.iter().map(|b| char::from(*b)).collect();
    write_string(out, &text)
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

/// Print `value`, decoded with `schema`, in the Avro JSON encoding
pub fn to_json(value: &Value, schema: &Schema, names: &NamedTypes) -> SerializationResult<String> {
    let mut out = String::new();
    write_value(&mut out, value, schema, names)?;
    Ok(out)
}

fn write_value(
    out: &mut String,
    value: &Value,
    schema: &Schema,
    names: &NamedTypes,
) -> SerializationResult<()> {
    let schema = resolve(schema, names)?;
    match (value, schema) {
        (Value::Null, _) => out.push_str("null"),
        (Value::Boolean(b), _) => out.push_str(if *b { "true" } else { "false" }),
        (Value::Int(v) | Value::Date(v) | Value::TimeMillis(v), _) => out.push_str(&v.to_string()),
        (
            Value::Long(v)
            | Value::TimeMicros(v)
            | Value::TimestampMillis(v)
            | Value::TimestampMicros(v)
            | Value::TimestampNanos(v)
            | Value::LocalTimestampMillis(v)
            | Value::LocalTimestampMicros(v)
            | Value::LocalTimestampNanos(v),
            _,
        ) => out.push_str(&v.to_string()),
        (Value::Float(v), _) => write_float(out, f64::from(*v), true)?,
        (Value::Double(v), _) => write_float(out, *v, false)?,
        (Value::Bytes(bytes) | Value::Fixed(_, bytes), _) => write_latin1(out, bytes)?,
        (Value::String(s), _) => write_string(out, s)?,
        (Value::Uuid(uuid), _) => write_string(out, &uuid.to_string())?,
        (Value::Enum(_, symbol), _) => write_string(out, symbol)?,
        (Value::Decimal(decimal), _) => {
            let bytes = Vec::<u8>::try_from(decimal)
                .map_err(|e| SerializationError::avro_error("Unprintable decimal", e))?;
            write_latin1(out, &bytes)?;
        }
        (Value::Duration(duration), _) => {
            let bytes: [u8; 12] = duration.clone().into();
            write_latin1(out, &bytes)?;
        }
        (Value::Union(index, inner), Schema::Union(union)) => {
            let branch = union_branch(union, *index)?;
            if matches!(**inner, Value::Null) {
                out.push_str("null");
            } else {
                out.push('{');
                write_string(out, &branch_name(resolve(branch, names)?))?;
                out.push(':');
                write_value(out, inner, branch, names)?;
                out.push('}');
            }
        }
        (Value::Array(items), Schema::Array(array)) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, &array.items, names)?;
            }
            out.push(']');
        }
        (Value::Map(entries), Schema::Map(map)) => {
            let sorted: BTreeMap<&String, &Value> = entries.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, item, &map.types, names)?;
            }
            out.push('}');
        }
        (Value::Record(fields), Schema::Record(record)) => {
            out.push('{');
            for (i, ((name, item), field)) in fields.iter().zip(&record.fields).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, name)?;
                out.push(':');
                write_value(out, item, &field.schema, names)?;
            }
            out.push('}');
        }
        (value, schema) => {
            return Err(SerializationError::decode(format!(
                "value {:?} does not match schema type {}",
                value,
                branch_name(schema)
            )))
        }
    }
    Ok(())
}

fn union_branch(union: &UnionSchema, index: u32) -> SerializationResult<&Schema> {
    union
        .variants()
        .get(index as usize)
        .ok_or_else(|| SerializationError::decode(format!("union branch {} out of range", index)))
}

fn json_mismatch(expected: &str, json: &serde_json::Value) -> SerializationError {
    SerializationError::encode(format!("expected {}, found {}", expected, json))
}

fn latin1_bytes(json: &serde_json::Value) -> SerializationResult<Vec<u8>> {
    let text = json.as_str().ok_or_else(|| json_mismatch("string", json))?;
    text.chars()
        .map(|c| u8::try_from(u32::from(c)))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| SerializationError::encode(format!("{} is not a byte string", json)))
}

fn json_float(json: &serde_json::Value) -> SerializationResult<f64> {
    match json {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| json_mismatch("number", json)),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(json_mismatch("number", json)),
        },
        _ => Err(json_mismatch("number", json)),
    }
}

fn json_int(json: &serde_json::Value) -> SerializationResult<i32> {
    json.as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| json_mismatch("int", json))
}

fn json_long(json: &serde_json::Value) -> SerializationResult<i64> {
    json.as_i64().ok_or_else(|| json_mismatch("long", json))
}

/// Convert JSON in the Avro JSON encoding into a value of `schema`
pub fn from_json(
    json: &serde_json::Value,
    schema: &Schema,
    names: &NamedTypes,
) -> SerializationResult<Value> {
    let schema = resolve(schema, names)?;
    let value = match schema {
        Schema::Null => match json {
            serde_json::Value::Null => Value::Null,
            other => return Err(json_mismatch("null", other)),
        },
        Schema::Boolean => Value::Boolean(json.as_bool().ok_or_else(|| json_mismatch("boolean", json))?),
        Schema::Int => Value::Int(json_int(json)?),
        Schema::Date => Value::Date(json_int(json)?),
        Schema::TimeMillis => Value::TimeMillis(json_int(json)?),
        Schema::Long => Value::Long(json_long(json)?),
        Schema::TimeMicros => Value::TimeMicros(json_long(json)?),
        Schema::TimestampMillis => Value::TimestampMillis(json_long(json)?),
        Schema::TimestampMicros => Value::TimestampMicros(json_long(json)?),
        Schema::TimestampNanos => Value::TimestampNanos(json_long(json)?),
        Schema::LocalTimestampMillis => Value::LocalTimestampMillis(json_long(json)?),
        Schema::LocalTimestampMicros => Value::LocalTimestampMicros(json_long(json)?),
        Schema::LocalTimestampNanos => Value::LocalTimestampNanos(json_long(json)?),
        Schema::Float => Value::Float(json_float(json)? as f32),
        Schema::Double => Value::Double(json_float(json)?),
        Schema::Bytes => Value::Bytes(latin1_bytes(json)?),
        Schema::String => Value::String(
            json.as_str()
                .ok_or_else(|| json_mismatch("string", json))?
                .to_string(),
        ),
        Schema::Uuid => {
            let text = json.as_str().ok_or_else(|| json_mismatch("uuid", json))?;
            Value::Uuid(
                uuid::Uuid::parse_str(text)
                    .map_err(|e| SerializationError::encode(format!("invalid uuid {}: {}", text, e)))?,
            )
        }
        Schema::Fixed(fixed) => {
            let bytes = latin1_bytes(json)?;
            if bytes.len() != fixed.size {
                return Err(SerializationError::encode(format!(
                    "fixed {} needs {} bytes, found {}",
                    fixed.name.fullname(None),
                    fixed.size,
                    bytes.len()
                )));
            }
            Value::Fixed(fixed.size, bytes)
        }
        Schema::Decimal(_) => Value::Decimal(Decimal::from(latin1_bytes(json)?)),
        Schema::Duration => {
            let bytes: [u8; 12] = latin1_bytes(json)?
                .try_into()
                .map_err(|_| json_mismatch("12 byte duration", json))?;
            Value::Duration(Duration::from(bytes))
        }
        Schema::BigDecimal => {
            return Err(SerializationError::encode(
                "big-decimal values cannot be written from JSON",
            ))
        }
        Schema::Enum(e) => {
            let symbol = json.as_str().ok_or_else(|| json_mismatch("enum symbol", json))?;
            let index = e
                .symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| {
                    SerializationError::encode(format!(
                        "'{}' is not a symbol of {}",
                        symbol,
                        e.name.fullname(None)
                    ))
                })?;
            Value::Enum(index as u32, symbol.to_string())
        }
        Schema::Array(array) => {
            let items = json.as_array().ok_or_else(|| json_mismatch("array", json))?;
            Value::Array(
                items
                    .iter()
                    .map(|item| from_json(item, &array.items, names))
                    .collect::<SerializationResult<_>>()?,
            )
        }
        Schema::Map(map) => {
            let entries = json.as_object().ok_or_else(|| json_mismatch("map", json))?;
            Value::Map(
                entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), from_json(item, &map.types, names)?)))
                    .collect::<SerializationResult<HashMap<_, _>>>()?,
            )
        }
        Schema::Record(record) => {
            let object = json.as_object().ok_or_else(|| json_mismatch("record", json))?;
            if let Some(unknown) = object.keys().find(|key| !record.lookup.contains_key(*key)) {
                return Err(SerializationError::encode(format!(
                    "unknown field '{}' for {}",
                    unknown,
                    record.name.fullname(None)
                )));
            }
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let item = object.get(&field.name).ok_or_else(|| {
                    SerializationError::encode(format!("missing field '{}'", field.name))
                })?;
                fields.push((field.name.clone(), from_json(item, &field.schema, names)?));
            }
            Value::Record(fields)
        }
        Schema::Union(union) => union_from_json(json, union, names)?,
        Schema::Ref { .. } => return Err(SerializationError::encode("unresolved reference")),
    };
    Ok(value)
}

fn union_from_json(
    json: &serde_json::Value,
    union: &UnionSchema,
    names: &NamedTypes,
) -> SerializationResult<Value> {
    let variants = union.variants();
    let null_index = variants.iter().position(|v| matches!(v, Schema::Null));

    if json.is_null() {
        return match null_index {
            Some(index) => Ok(Value::Union(index as u32, Box::new(Value::Null))),
            None => Err(json_mismatch("non-null union value", json)),
        };
    }

    if let Some(object) = json.as_object() {
        if object.len() == 1 {
            if let Some((branch, inner)) = object.iter().next() {
                for (index, variant) in variants.iter().enumerate() {
                    if branch_name(resolve(variant, names)?) == *branch {
                        let value = from_json(inner, variant, names)?;
                        return Ok(Value::Union(index as u32, Box::new(value)));
                    }
                }
            }
        }
    }

    let mut non_null = variants
        .iter()
        .enumerate()
        .filter(|(_, v)| !matches!(v, Schema::Null));
    match (non_null.next(), non_null.next()) {
        (Some((index, variant)), None) => {
            let value = from_json(json, variant, names)?;
            Ok(Value::Union(index as u32, Box::new(value)))
        }
        _ => Err(json_mismatch("union value wrapped in its branch name", json)),
    }
}

/// Text of the field at `segments` inside a decoded record
pub fn extract_text(value: &Value, segments: &[String]) -> Option<String> {
    let mut current = value;
    for segment in segments {
        current = unwrap_union(current);
        match current {
            Value::Record(fields) => {
                current = fields
                    .iter()
                    .find(|(name, _)| name == segment)
                    .map(|(_, v)| v)?;
            }
            _ => return None,
        }
    }
    scalar_text(unwrap_union(current))
}

fn unwrap_union(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => inner,
        other => other,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Boolean(b) => Some(b.to_string()),
        Value::Int(v) | Value::Date(v) | Value::TimeMillis(v) => Some(v.to_string()),
        Value::Long(v)
        | Value::TimeMicros(v)
        | Value::TimestampMillis(v)
        | Value::TimestampMicros(v)
        | Value::TimestampNanos(v)
        | Value::LocalTimestampMillis(v)
        | Value::LocalTimestampMicros(v)
        | Value::LocalTimestampNanos(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::String(s) | Value::Enum(_, s) => Some(s.clone()),
        Value::Uuid(uuid) => Some(uuid.to_string()),
        Value::Bytes(bytes) | Value::Fixed(_, bytes) => {
            Some(bytes.iter().map(|b| char::from(*b)).collect())
        }
        _ => None,
    }
}

/// Bound on JSON size relative to the binary size for values of `schema`
pub fn json_bound(schema: &Schema, names: &NamedTypes) -> PaddingBound {
    let mut visiting = HashSet::new();
    PaddingBound::new(
        fixed_chars(schema, names, &mut HashSet::new()),
        chars_per_byte(schema, names, &mut visiting),
    )
}

/// JSON characters printed for a value of `schema` that no payload byte pays for
fn fixed_chars(schema: &Schema, names: &NamedTypes, visiting: &mut HashSet<Name>) -> usize {
    match schema {
        Schema::Null => 4,
        Schema::Enum(e) => e.symbols.iter().map(String::len).max().unwrap_or(0) + 2,
        Schema::Fixed(_) | Schema::Duration => 2,
        Schema::Decimal(decimal) => fixed_chars(&decimal.inner, names, visiting),
        Schema::Array(_) | Schema::Map(_) => 2,
        Schema::Record(record) => {
            if !visiting.insert(record.name.clone()) {
                return 0;
            }
            let total = 2 + record
                .fields
                .iter()
                .map(|f| member_overhead(&f.name) + fixed_chars(&f.schema, names, visiting))
                .sum::<usize>();
            visiting.remove(&record.name);
            total
        }
        Schema::Ref { name } => match names.get(name) {
            Some(named) => fixed_chars(named, names, visiting),
            None => 0,
        },
        _ => 0,
    }
}

/// Fewest binary bytes a value of `schema` can occupy
fn min_binary_bytes(schema: &Schema, names: &NamedTypes) -> usize {
    match schema {
        Schema::Null => 0,
        Schema::Float => 4,
        Schema::Double => 8,
        Schema::Fixed(fixed) => fixed.size,
        Schema::Duration => 12,
        Schema::Decimal(decimal) => min_binary_bytes(&decimal.inner, names),
        Schema::Record(_) | Schema::Ref { .. } => 0,
        _ => 1,
    }
}

/// JSON characters per payload byte for a value of `schema`.
///
/// Array items and map entries that occupy no bytes at all (records of nulls)
/// cannot be bounded per byte; they are charged as if they took one.
fn chars_per_byte(schema: &Schema, names: &NamedTypes, visiting: &mut HashSet<Name>) -> usize {
    match schema {
        Schema::Null => 0,
        Schema::Boolean => 5,
        Schema::Int
        | Schema::Long
        | Schema::Date
        | Schema::TimeMillis
        | Schema::TimeMicros
        | Schema::TimestampMillis
        | Schema::TimestampMicros
        | Schema::TimestampNanos
        | Schema::LocalTimestampMillis
        | Schema::LocalTimestampMicros
        | Schema::LocalTimestampNanos => 3,
        Schema::Float => 4,
        Schema::Double => 3,
        Schema::Bytes | Schema::String | Schema::Uuid | Schema::BigDecimal => 6,
        Schema::Fixed(_) | Schema::Duration => 6,
        Schema::Decimal(_) => 6,
        Schema::Enum(_) => 0,
        Schema::Record(record) => {
            if !visiting.insert(record.name.clone()) {
                return 0;
            }
            let per_byte = record
                .fields
                .iter()
                .map(|f| chars_per_byte(&f.schema, names, visiting))
                .max()
                .unwrap_or(0);
            visiting.remove(&record.name);
            per_byte
        }
        Schema::Union(union) => union
            .variants()
            .iter()
            .map(|variant| {
                let resolved = resolve(variant, names).unwrap_or(variant);
                if matches!(resolved, Schema::Null) {
                    4
                } else {
                    let wrapper = branch_name(resolved).len() + 5;
                    let fixed = fixed_chars(resolved, names, &mut HashSet::new());
                    (wrapper + fixed).max(chars_per_byte(variant, names, visiting))
                }
            })
            .max()
            .unwrap_or(0),
        Schema::Array(array) => {
            let items = resolve(&array.items, names).unwrap_or(&array.items);
            let fixed = fixed_chars(items, names, &mut HashSet::new());
            chars_per_byte(&array.items, names, visiting)
                + div_ceil(fixed + 1, min_binary_bytes(items, names).max(1))
        }
        Schema::Map(map) => {
            let fixed = fixed_chars(&map.types, names, &mut HashSet::new());
            (fixed + 10).max(chars_per_byte(&map.types, names, visiting))
        }
        Schema::Ref { name } => match names.get(name) {
            Some(named) => chars_per_byte(named, names, visiting),
            None => 0,
        },
    }
}

/// Largest binary output per JSON input character when writing `schema`
pub fn binary_per_char(schema: &Schema, names: &NamedTypes) -> usize {
    let mut visiting = HashSet::new();
    let mut widest = 0;
    reachable_widths(schema, names, &mut visiting, &mut widest);
    match widest {
        8 => 9,
        4 => 5,
        _ => 2,
    }
}

fn reachable_widths(schema: &Schema, names: &NamedTypes, visiting: &mut HashSet<Name>, widest: &mut usize) {
    match schema {
        Schema::Double => *widest = (*widest).max(8),
        Schema::Float => *widest = (*widest).max(4),
        Schema::Record(record) => {
            if visiting.insert(record.name.clone()) {
                for field in &record.fields {
                    reachable_widths(&field.schema, names, visiting, widest);
                }
            }
        }
        Schema::Array(array) => reachable_widths(&array.items, names, visiting, widest),
        Schema::Map(map) => reachable_widths(&map.types, names, visiting, widest),
        Schema::Union(union) => {
            for variant in union.variants() {
                reachable_widths(variant, names, visiting, widest);
            }
        }
        Schema::Ref { name } => {
            if let Some(named) = names.get(name) {
                reachable_widths(named, names, visiting, widest);
            }
        }
        _ => {}
    }
}
