//! Per-instance attribute values

use crate::diff::same_value;
use crate::error::{ProviderError, Result};
use crate::schema::{ID, Schema, UNKNOWN, is_unknown};
use serde_json::{Map, Value};
use std::sync::Arc;
use stratoform_cloud::Tags;

/// The values a resource callback reads and writes.
///
/// `values` holds the new state being built; `prior` the state before the
/// operation (empty on create). Only attributes the schema declares can be
/// written.
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<Schema>,
    id: String,
    values: Map<String, Value>,
    prior: Map<String, Value>,
}

fn known_id(values: &Map<String, Value>) -> String {
    match values.get(ID) {
        Some(Value::String(id)) if id != UNKNOWN => id.clone(),
        _ => String::new(),
    }
}

impl ResourceData {
    pub fn new(schema: Arc<Schema>, mut values: Map<String, Value>) -> Self {
        let id = known_id(&values);
        values.remove(ID);
        Self {
            schema,
            id,
            values,
            prior: Map::new(),
        }
    }

    /// Attaches the state from before this operation.
    ///
    /// When the new values carry no identity, the prior one is kept.
    pub fn with_prior(mut self, mut prior: Map<String, Value>) -> Self {
        if self.id.is_empty() {
            self.id = known_id(&prior);
        }
        prior.remove(ID);
        self.prior = prior;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Marks the object as gone.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// A known, non-null value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values
            .get(key)
            .filter(|v| !v.is_null() && !is_unknown(v))
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        strings(self.get(key))
    }

    pub fn get_tags(&self, key: &str) -> Tags {
        tags(self.get(key))
    }

    pub fn prior(&self, key: &str) -> Option<&Value> {
        self.prior
            .get(key)
            .filter(|v| !v.is_null() && !is_unknown(v))
    }

    pub fn prior_tags(&self, key: &str) -> Tags {
        tags(self.prior(key))
    }

    /// Whether `key` differs from the prior state.
    pub fn has_change(&self, key: &str) -> bool {
        !same_value(self.schema.get(key), self.values.get(key), self.prior.get(key))
    }

    /// Writes one attribute, normalised through its state function.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if key == ID {
            self.id = value.as_str().unwrap_or_default().to_string();
            return Ok(());
        }
        let attribute = self.schema.get(key).ok_or_else(|| {
            ProviderError::invalid(format!("attribute `{key}` is not declared in the schema"))
        })?;
        let value = attribute.normalize(&value);
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Writes every entry of `values`.
    pub fn set_all(&mut self, values: Map<String, Value>) -> Result<()> {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The state to hand back to the host; `null` once the identity is cleared.
    ///
    /// Values still unknown after the operation are stored as `null`.
    pub fn to_state(&self) -> Value {
        if self.id.is_empty() {
            return Value::Null;
        }
        let mut state: Map<String, Value> = self
            .schema
            .iter()
            .map(|(name, _)| {
                let value = match self.values.get(name) {
                    Some(v) if !is_unknown(v) => v.clone(),
                    _ => Value::Null,
                };
                (name.to_string(), value)
            })
            .collect();
        state.insert(ID.to_string(), Value::String(self.id.clone()));
        Value::Object(state)
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn tags(value: Option<&Value>) -> Tags {
    value
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}
