//! Planning
//!
//! [`ResourceDiff::propose`] derives the planned state from the prior state
//! and the configuration; a resource's `customize_diff` may then adjust it
//! before [`ResourceDiff::finish`] decides the action.

use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, ID, Schema, UNKNOWN, ValueType, is_unknown};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    NoOp,
    Create,
    Update,
    Replace,
    Delete,
}

/// Result of `PlanResourceChange`.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub action: ChangeAction,
    pub planned_state: Value,
    pub requires_replace: Vec<String>,
}

impl PlannedChange {
    /// The plan for a resource removed from configuration.
    pub fn destroy(exists: bool) -> Self {
        Self {
            action: if exists {
                ChangeAction::Delete
            } else {
                ChangeAction::NoOp
            },
            planned_state: Value::Null,
            requires_replace: Vec::new(),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        _ => false,
    }
}

/// Compares two attribute values the way planning does.
///
/// Null, absent and empty collections are equal; sets ignore order.
pub(crate) fn same_value(
    attribute: Option<&Attribute>,
    a: Option<&Value>,
    b: Option<&Value>,
) -> bool {
    let a = a.filter(|v| !is_empty(v));
    let b = b.filter(|v| !is_empty(v));
    match (a, b) {
        (None, None) => true,
        (Some(Value::Array(x)), Some(Value::Array(y)))
            if attribute.is_some_and(|attr| attr.value_type == ValueType::Set) =>
        {
            x.len() == y.len()
                && x.iter().all(|item| y.contains(item))
                && y.iter().all(|item| x.contains(item))
        }
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// A proposed change that `customize_diff` can inspect and adjust.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    schema: Arc<Schema>,
    prior: Option<Map<String, Value>>,
    config: Map<String, Value>,
    planned: Map<String, Value>,
    forced: BTreeSet<String>,
    /// Computed values planned by `customize_diff`; kept across replacement.
    decided: BTreeSet<String>,
}

impl ResourceDiff {
    /// Proposes the new state for `config`; `prior` is `None` when creating.
    ///
    /// Configured values win. Unconfigured attributes take their default,
    /// keep their prior computed value, or become unknown on create.
    pub fn propose(
        schema: Arc<Schema>,
        prior: Option<Map<String, Value>>,
        config: Map<String, Value>,
    ) -> Self {
        let mut planned = Map::new();
        for (name, attribute) in schema.iter() {
            let configured = config.get(name).filter(|v| !v.is_null());
            let previous = prior
                .as_ref()
                .and_then(|p| p.get(name))
                .filter(|v| !v.is_null());
            let value = match (configured, &attribute.default, previous) {
                (Some(value), _, _) if !attribute.is_computed_only() => attribute.normalize(value),
                (_, Some(default), _) => default.clone(),
                (_, None, Some(previous)) if attribute.computed => previous.clone(),
                (_, None, None) if attribute.computed && prior.is_none() => {
                    Value::String(UNKNOWN.to_string())
                }
                _ => Value::Null,
            };
            planned.insert(name.to_string(), value);
        }
        let id = prior
            .as_ref()
            .and_then(|p| p.get(ID))
            .cloned()
            .unwrap_or_else(|| Value::String(UNKNOWN.to_string()));
        planned.insert(ID.to_string(), id);

        Self {
            schema,
            prior,
            config,
            planned,
            forced: BTreeSet::new(),
            decided: BTreeSet::new(),
        }
    }

    /// Identity of the existing object; empty when creating.
    pub fn id(&self) -> &str {
        self.prior
            .as_ref()
            .and_then(|p| p.get(ID))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn is_create(&self) -> bool {
        self.prior.is_none()
    }

    /// Whether applying this plan brings a new object into existence: a
    /// create, or a replacement forced by a changed attribute.
    pub fn will_create(&self) -> bool {
        let Some(prior) = &self.prior else {
            return true;
        };
        !self.forced.is_empty()
            || self.schema.iter().any(|(name, attribute)| {
                attribute.force_new
                    && !same_value(Some(attribute), self.planned.get(name), prior.get(name))
            })
    }

    /// A known planned value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.planned
            .get(key)
            .filter(|v| !v.is_null() && !is_unknown(v))
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// Whether `key` was set in configuration.
    pub fn is_configured(&self, key: &str) -> bool {
        self.config.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn prior(&self, key: &str) -> Option<&Value> {
        self.prior.as_ref().and_then(|p| p.get(key))
    }

    pub fn has_change(&self, key: &str) -> bool {
        match &self.prior {
            None => true,
            Some(prior) => !same_value(self.schema.get(key), self.planned.get(key), prior.get(key)),
        }
    }

    fn computed_attribute(&self, key: &str) -> Result<()> {
        match self.schema.get(key) {
            Some(attribute) if attribute.computed => Ok(()),
            Some(_) => Err(ProviderError::invalid(format!(
                "`{key}` is not computed and cannot be changed while planning"
            ))),
            None => Err(ProviderError::invalid(format!(
                "attribute `{key}` is not declared in the schema"
            ))),
        }
    }

    /// Plans a known value for a computed attribute.
    pub fn set_new(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.computed_attribute(key)?;
        self.planned.insert(key.to_string(), value.into());
        self.decided.insert(key.to_string());
        Ok(())
    }

    /// Marks a computed attribute as known only after apply.
    pub fn set_new_computed(&mut self, key: &str) -> Result<()> {
        self.computed_attribute(key)?;
        self.planned
            .insert(key.to_string(), Value::String(UNKNOWN.to_string()));
        self.decided.insert(key.to_string());
        Ok(())
    }

    /// Requires replacement when `key` changes.
    pub fn force_new(&mut self, key: &str) -> Result<()> {
        if !self.schema.declares(key) {
            return Err(ProviderError::invalid(format!(
                "attribute `{key}` is not declared in the schema"
            )));
        }
        if self.prior.is_some() && self.has_change(key) {
            self.forced.insert(key.to_string());
        }
        Ok(())
    }

    /// Decides the action and the final planned state.
    pub fn finish(self) -> PlannedChange {
        let Some(prior) = &self.prior else {
            return PlannedChange {
                action: ChangeAction::Create,
                planned_state: Value::Object(self.planned),
                requires_replace: Vec::new(),
            };
        };

        let mut replace = self.forced.clone();
        let mut changed = false;
        for (name, attribute) in self.schema.iter() {
            if same_value(Some(attribute), self.planned.get(name), prior.get(name)) {
                continue;
            }
            changed = true;
            if attribute.force_new {
                replace.insert(name.to_string());
            }
        }

        let mut planned = self.planned;
        let action = if !replace.is_empty() {
            for (name, attribute) in self.schema.iter() {
                let configured = self.config.get(name).is_some_and(|v| !v.is_null());
                if attribute.computed && !configured && !self.decided.contains(name) {
                    planned.insert(name.to_string(), Value::String(UNKNOWN.to_string()));
                }
            }
            planned.insert(ID.to_string(), Value::String(UNKNOWN.to_string()));
            ChangeAction::Replace
        } else if changed {
            ChangeAction::Update
        } else {
            ChangeAction::NoOp
        };

        PlannedChange {
            action,
            planned_state: Value::Object(planned),
            requires_replace: replace.into_iter().collect(),
        }
    }
}
