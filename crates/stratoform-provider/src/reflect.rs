//! Option-struct mapping
//!
//! Moves values between schema-shaped maps and typed option structs whose
//! serde field names are the attribute names. At the schema level a nested
//! object is a single-element list; in the struct it is a plain field.
//! Primitive lists and lists of objects map one to one.

use crate::error::{ProviderError, Result};
use crate::schema::{Schema, ValueType, is_unknown};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Builds an option struct from schema-shaped values.
///
/// Null and unknown values are left out so `Option` fields stay `None`.
pub fn expand<T: DeserializeOwned>(schema: &Schema, values: &Map<String, Value>) -> Result<T> {
    let shaped = unwrap_blocks(schema, values);
    serde_json::from_value(Value::Object(shaped))
        .map_err(|e| ProviderError::invalid(format!("cannot build options: {e}")))
}

/// Serialises an option struct into schema-shaped values.
///
/// Fields with no matching attribute are dropped.
pub fn flatten<T: Serialize>(schema: &Schema, options: &T) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(options)
        .map_err(|e| ProviderError::invalid(format!("cannot read options: {e}")))?;
    match value {
        Value::Object(object) => Ok(wrap_blocks(schema, object)),
        other => Err(ProviderError::invalid(format!(
            "options must serialise to an object, got {other}"
        ))),
    }
}

fn unwrap_blocks(schema: &Schema, values: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, attribute) in schema.iter() {
        let Some(value) = values.get(name).filter(|v| !v.is_null() && !is_unknown(v)) else {
            continue;
        };
        let value = match (&attribute.block, value) {
            (Some(block), Value::Array(items)) => {
                let mut objects = items.iter().filter_map(|item| {
                    item.as_object()
                        .map(|object| Value::Object(unwrap_blocks(block, object)))
                });
                if attribute.is_single_block() {
                    match objects.next() {
                        Some(object) => object,
                        None => continue,
                    }
                } else {
                    Value::Array(objects.collect())
                }
            }
            (None, Value::Array(items)) if attribute.value_type != ValueType::Block => {
                Value::Array(items.iter().filter(|v| !is_unknown(v)).cloned().collect())
            }
            _ => value.clone(),
        };
        out.insert(name.to_string(), value);
    }
    out
}

fn wrap_blocks(schema: &Schema, object: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in object {
        let Some(attribute) = schema.get(&name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let value = match (&attribute.block, value) {
            (Some(block), Value::Object(inner)) => {
                Value::Array(vec![Value::Object(wrap_blocks(block, inner))])
            }
            (Some(block), Value::Array(items)) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(inner) => Value::Object(wrap_blocks(block, inner)),
                        other => other,
                    })
                    .collect(),
            ),
            (_, value) => value,
        };
        out.insert(name, value);
    }
    out
}
