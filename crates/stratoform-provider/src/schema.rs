//! Attribute schemas
//!
//! A [`Schema`] maps attribute names to [`Attribute`] descriptors. Resources,
//! data sources and the provider block itself are all described this way;
//! the same descriptors drive configuration validation, planning and the
//! `GetSchema` export.

use crate::error::{ProviderError, Result};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Placeholder for a value that is only known after apply.
pub const UNKNOWN: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// Name of the implicit identity attribute.
pub const ID: &str = "id";

pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNKNOWN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    Bool,
    Float,
    List,
    Set,
    Map,
    /// A list of nested objects with their own schema
    Block,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Float => "float",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Map => "map",
            ValueType::Block => "block",
        }
    }
}

pub type Validator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;
pub type StateFunc = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct Attribute {
    pub value_type: ValueType,
    pub element: Option<Box<Attribute>>,
    pub block: Option<Schema>,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub max_items: Option<usize>,
    pub description: &'static str,
    pub conflicts_with: Vec<&'static str>,
    pub exactly_one_of: Vec<&'static str>,
    validators: Vec<Validator>,
    state_func: Option<StateFunc>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("type", &self.value_type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

impl Attribute {
    fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            element: None,
            block: None,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            max_items: None,
            description: "",
            conflicts_with: Vec::new(),
            exactly_one_of: Vec::new(),
            validators: Vec::new(),
            state_func: None,
        }
    }

    pub fn string() -> Self {
        Self::of(ValueType::String)
    }

    pub fn int() -> Self {
        Self::of(ValueType::Int)
    }

    pub fn bool() -> Self {
        Self::of(ValueType::Bool)
    }

    pub fn float() -> Self {
        Self::of(ValueType::Float)
    }

    pub fn list(element: Attribute) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::of(ValueType::List)
        }
    }

    pub fn set(element: Attribute) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::of(ValueType::Set)
        }
    }

    pub fn map(element: Attribute) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::of(ValueType::Map)
        }
    }

    /// A nested resource, represented as a list of objects.
    ///
    /// With `max_items(1)` it models a single nested object.
    pub fn block(schema: Schema) -> Self {
        Self {
            block: Some(schema),
            ..Self::of(ValueType::Block)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn conflicts_with(mut self, names: &[&'static str]) -> Self {
        self.conflicts_with.extend_from_slice(names);
        self
    }

    pub fn exactly_one_of(mut self, names: &[&'static str]) -> Self {
        self.exactly_one_of.extend_from_slice(names);
        self
    }

    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Normalises configured and observed values before they are stored.
    pub fn state_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.state_func = Some(Arc::new(func));
        self
    }

    /// Set by the provider only, never by configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Whether this attribute models exactly one nested object.
    pub fn is_single_block(&self) -> bool {
        self.value_type == ValueType::Block && self.max_items == Some(1)
    }

    pub fn normalize(&self, value: &Value) -> Value {
        match &self.state_func {
            Some(func) if !value.is_null() && !is_unknown(value) => func(value),
            _ => value.clone(),
        }
    }

    fn check(&self, path: &str, value: &Value, errors: &mut BTreeSet<String>) {
        if is_unknown(value) {
            return;
        }
        let matches = match (self.value_type, value) {
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ValueType::Float, Value::Number(_)) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::List | ValueType::Set, Value::Array(items)) => {
                self.check_len(path, items.len(), errors);
                if let Some(element) = &self.element {
                    for (i, item) in items.iter().enumerate() {
                        element.check(&format!("{path}[{i}]"), item, errors);
                    }
                }
                true
            }
            (ValueType::Map, Value::Object(entries)) => {
                if let Some(element) = &self.element {
                    for (key, item) in entries {
                        element.check(&format!("{path}.{key}"), item, errors);
                    }
                }
                true
            }
            (ValueType::Block, Value::Array(items)) => {
                self.check_len(path, items.len(), errors);
                if let Some(schema) = &self.block {
                    for (i, item) in items.iter().enumerate() {
                        match item {
                            Value::Object(object) => {
                                schema.collect_errors(&format!("{path}[{i}]."), object, errors)
                            }
                            _ => {
                                errors.insert(format!("`{path}[{i}]` must be an object"));
                            }
                        }
                    }
                }
                true
            }
            _ => false,
        };
        if !matches {
            errors.insert(format!("`{path}` must be of type {}", self.value_type.as_str()));
            return;
        }
        for validator in &self.validators {
            if let Err(message) = validator(value) {
                errors.insert(format!("`{path}`: {message}"));
            }
        }
    }

    fn check_len(&self, path: &str, len: usize, errors: &mut BTreeSet<String>) {
        if let Some(max) = self.max_items
            && len > max
        {
            errors.insert(format!("`{path}` accepts at most {max} item(s), got {len}"));
        }
    }

    fn to_json(&self) -> Value {
        let mut out = json!({
            "type": self.value_type.as_str(),
            "required": self.required,
            "optional": self.optional,
            "computed": self.computed,
            "force_new": self.force_new,
            "sensitive": self.sensitive,
        });
        if let Some(element) = &self.element {
            out["element"] = element.to_json();
        }
        if let Some(block) = &self.block {
            out["block"] = block.to_json();
        }
        if let Some(default) = &self.default {
            out["default"] = default.clone();
        }
        if let Some(max) = self.max_items {
            out["max_items"] = json!(max);
        }
        if !self.description.is_empty() {
            out["description"] = json!(self.description);
        }
        if !self.conflicts_with.is_empty() {
            out["conflicts_with"] = json!(self.conflicts_with);
        }
        if !self.exactly_one_of.is_empty() {
            out["exactly_one_of"] = json!(self.exactly_one_of);
        }
        out
    }
}

/// Attribute name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub version: u32,
    attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether `name` may be written to state. The identity is always allowed.
    pub fn declares(&self, name: &str) -> bool {
        name == ID || self.attributes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Value {
        let attributes: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(name, attribute)| (name.clone(), attribute.to_json()))
            .collect();
        json!({ "version": self.version, "attributes": attributes })
    }

    /// Checks a configuration object against this schema.
    ///
    /// Every problem is reported, not just the first.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<()> {
        let mut errors = BTreeSet::new();
        self.collect_errors("", config, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::invalid(
                errors.into_iter().collect::<Vec<_>>().join("; "),
            ))
        }
    }

    fn collect_errors(
        &self,
        prefix: &str,
        config: &Map<String, Value>,
        errors: &mut BTreeSet<String>,
    ) {
        for key in config.keys() {
            if key != ID && !self.attributes.contains_key(key) {
                errors.insert(format!("unsupported argument `{prefix}{key}`"));
            }
        }

        let is_set = |name: &str| config.get(name).is_some_and(|v| !v.is_null());

        for (name, attribute) in &self.attributes {
            let path = format!("{prefix}{name}");
            match config.get(name).filter(|v| !v.is_null()) {
                None if attribute.required => {
                    errors.insert(format!("`{path}` is required"));
                }
                None => {}
                Some(_) if attribute.is_computed_only() => {
                    errors.insert(format!("`{path}` is computed and cannot be set"));
                }
                Some(value) => {
                    attribute.check(&path, value, errors);
                    for other in &attribute.conflicts_with {
                        if is_set(*other) {
                            let (a, b) = if name.as_str() < *other {
                                (name.as_str(), *other)
                            } else {
                                (*other, name.as_str())
                            };
                            errors.insert(format!("`{prefix}{a}` conflicts with `{prefix}{b}`"));
                        }
                    }
                }
            }

            if !attribute.exactly_one_of.is_empty() {
                let mut group: BTreeSet<&str> = attribute.exactly_one_of.iter().copied().collect();
                group.insert(name);
                let count = group.iter().filter(|&&n| is_set(n)).count();
                if count != 1 {
                    let names: Vec<String> =
                        group.iter().map(|n| format!("`{prefix}{n}`")).collect();
                    errors.insert(format!("exactly one of {} must be set", names.join(", ")));
                }
            }
        }
    }
}

/// Accepts only the listed strings.
pub fn one_of(
    allowed: &'static [&'static str],
) -> impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static {
    move |value| match value.as_str() {
        Some(s) if allowed.contains(&s) => Ok(()),
        _ => Err(format!("expected one of {}, got {value}", allowed.join(", "))),
    }
}

/// Accepts integers in `min..=max`.
pub fn int_between(
    min: i64,
    max: i64,
) -> impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static {
    move |value| match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(format!("expected an integer between {min} and {max}, got {value}")),
    }
}

/// Accepts strings whose length is in `min..=max`.
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static {
    move |value| match value.as_str() {
        Some(s) if (min..=max).contains(&s.chars().count()) => Ok(()),
        _ => Err(format!("expected length between {min} and {max}")),
    }
}

/// State function that strips surrounding whitespace from strings.
pub fn trim_space(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_schema() -> Schema {
        Schema::new()
            .attribute("name", Attribute::string().required())
            .attribute(
                "size",
                Attribute::int().required().force_new().validate(int_between(1, 32768)),
            )
            .attribute(
                "volume_type",
                Attribute::string()
                    .optional()
                    .validate(one_of(&["SATA", "SAS", "SSD"])),
            )
            .attribute("status", Attribute::string().computed())
            .attribute("snapshot_id", Attribute::string().optional().conflicts_with(&["image_id"]))
            .attribute("image_id", Attribute::string().optional().conflicts_with(&["snapshot_id"]))
            .attribute(
                "root_volume",
                Attribute::block(
                    Schema::new()
                        .attribute("size", Attribute::int().required())
                        .attribute("volumetype", Attribute::string().required()),
                )
                .optional()
                .max_items(1),
            )
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = object(json!({
            "name": "data",
            "size": 10,
            "volume_type": "SSD",
            "root_volume": [{ "size": 40, "volumetype": "SAS" }]
        }));
        volume_schema().validate(&config).unwrap();
    }

    #[test]
    fn test_reports_every_problem() {
        let config = object(json!({
            "size": 0,
            "volume_type": "TAPE",
            "status": "available",
            "colour": "blue"
        }));
        let err = volume_schema().validate(&config).unwrap_err();
        assert_eq!(err.code(), "resource-invalid");
        let message = err.to_string();
        assert!(message.contains("`name` is required"));
        assert!(message.contains("`size`: expected an integer between 1 and 32768"));
        assert!(message.contains("`volume_type`: expected one of SATA, SAS, SSD"));
        assert!(message.contains("`status` is computed"));
        assert!(message.contains("unsupported argument `colour`"));
    }

    #[test]
    fn test_conflicts_reported_once() {
        let config = object(json!({
            "name": "data",
            "size": 1,
            "snapshot_id": "s",
            "image_id": "i"
        }));
        let message = volume_schema().validate(&config).unwrap_err().to_string();
        assert_eq!(message.matches("conflicts with").count(), 1);
    }

    #[test]
    fn test_exactly_one_of() {
        let schema = Schema::new()
            .attribute("zone_id", Attribute::string().optional().exactly_one_of(&["zone_name"]))
            .attribute("zone_name", Attribute::string().optional().exactly_one_of(&["zone_id"]));
        assert!(schema.validate(&object(json!({ "zone_id": "z" }))).is_ok());
        let none = schema.validate(&Map::new()).unwrap_err().to_string();
        assert_eq!(
            none,
            "invalid resource configuration: exactly one of `zone_id`, `zone_name` must be set"
        );
        assert!(schema
            .validate(&object(json!({ "zone_id": "z", "zone_name": "n" })))
            .is_err());
    }

    #[test]
    fn test_nested_block_checked() {
        let config = object(json!({
            "name": "data",
            "size": 1,
            "root_volume": [{ "size": "big" }, { "size": 1, "volumetype": "SAS" }]
        }));
        let message = volume_schema().validate(&config).unwrap_err().to_string();
        assert!(message.contains("`root_volume` accepts at most 1 item(s), got 2"));
        assert!(message.contains("`root_volume[0].size` must be of type int"));
        assert!(message.contains("`root_volume[0].volumetype` is required"));
    }

    #[test]
    fn test_unknown_values_skip_checks() {
        let config = object(json!({ "name": "data", "size": UNKNOWN }));
        volume_schema().validate(&config).unwrap();
    }

    #[test]
    fn test_schema_export() {
        let exported = volume_schema().to_json();
        assert_eq!(exported["attributes"]["size"]["force_new"], true);
        assert_eq!(exported["attributes"]["status"]["computed"], true);
        assert_eq!(exported["attributes"]["root_volume"]["max_items"], 1);
        assert_eq!(
            exported["attributes"]["root_volume"]["block"]["attributes"]["volumetype"]["type"],
            "string"
        );
    }

    #[test]
    fn test_state_func_normalises() {
        let attribute = Attribute::string().state_func(trim_space);
        assert_eq!(attribute.normalize(&json!("ssh-rsa AAA\n")), json!("ssh-rsa AAA"));
        assert_eq!(attribute.normalize(&Value::Null), Value::Null);
    }
}
