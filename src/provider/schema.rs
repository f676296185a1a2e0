//! Attribute schemas for the provider block, resources and data sources.
//!
//! A [`Block`] is a named set of attributes. It validates incoming
//! configuration (unknown keys, required values, types, `max_items`) and fills
//! in defaults, and it can check itself for inconsistent declarations.

use crate::error::ProviderError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    String,
    List,
    Set,
    Map,
}

impl ValueType {
    fn is_collection(self) -> bool {
        matches!(self, ValueType::List | ValueType::Set | ValueType::Map)
    }
}

/// Element of a collection attribute: a plain value or a nested block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Elem {
    Value(Box<Schema>),
    Block(Block),
}

#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub computed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elem: Option<Elem>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Schema {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            description: String::new(),
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            deprecated: None,
            default: None,
            max_items: None,
            elem: None,
        }
    }

    /// A collection of strings.
    pub fn strings(value_type: ValueType) -> Self {
        Self::new(value_type).elem(Elem::Value(Box::new(Schema::new(ValueType::String))))
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

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
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

    pub fn elem(mut self, elem: Elem) -> Self {
        self.elem = Some(elem);
        self
    }

    /// Nested block schema of a list/set attribute, if any.
    pub fn block(&self) -> Option<&Block> {
        match &self.elem {
            Some(Elem::Block(block)) => Some(block),
            _ => None,
        }
    }

    fn validate(&self, path: &str) -> Result<(), String> {
        if !self.required && !self.optional && !self.computed {
            return Err(format!(
                "{}: one of required, optional or computed must be set",
                path
            ));
        }
        if self.required && (self.optional || self.computed) {
            return Err(format!(
                "{}: required cannot be combined with optional or computed",
                path
            ));
        }
        if self.default.is_some() && !self.optional {
            return Err(format!("{}: default is only allowed on optional attributes", path));
        }
        if self.default.is_some() && self.computed {
            return Err(format!("{}: default cannot be set with computed", path));
        }
        if self.max_items.is_some() && !matches!(self.value_type, ValueType::List | ValueType::Set)
        {
            return Err(format!("{}: max_items is only valid on lists and sets", path));
        }
        match (&self.elem, self.value_type.is_collection()) {
            (Some(_), false) => {
                return Err(format!("{}: elem is only valid on collections", path));
            }
            (None, true) => return Err(format!("{}: collections must declare elem", path)),
            (Some(Elem::Block(_)), true) if self.value_type == ValueType::Map => {
                return Err(format!("{}: maps cannot hold nested blocks", path));
            }
            _ => {}
        }
        if let Some(Elem::Block(block)) = &self.elem {
            block.validate_at(path)?;
        }
        if let Some(default) = &self.default {
            self.check_value(path, default)?;
        }
        Ok(())
    }

    /// Checks that `value` fits this schema's type, recursing into elements.
    pub(crate) fn check_value(&self, path: &str, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        let ok = match self.value_type {
            ValueType::Bool => value.is_boolean(),
            ValueType::Int => value.is_i64(),
            ValueType::String => value.is_string(),
            ValueType::List | ValueType::Set => value.is_array(),
            ValueType::Map => value.is_object(),
        };
        if !ok {
            return Err(format!(
                "{}: expected {}",
                path,
                serde_json::to_string(&self.value_type).unwrap_or_default()
            ));
        }

        if let (Some(max), Some(items)) = (self.max_items, value.as_array()) {
            if items.len() > max {
                return Err(format!(
                    "{}: at most {} element(s) allowed, got {}",
                    path,
                    max,
                    items.len()
                ));
            }
        }

        match (&self.elem, value) {
            (Some(Elem::Value(elem)), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    elem.check_value(&format!("{}.{}", path, i), item)?;
                }
            }
            (Some(Elem::Value(elem)), Value::Object(entries)) => {
                for (k, item) in entries {
                    elem.check_value(&format!("{}.{}", path, k), item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A named set of attributes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Block {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub attributes: BTreeMap<String, Schema>,
}

impl Block {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, name: &str, schema: Schema) -> Self {
        self.attributes.insert(name.to_string(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.attributes.get(name)
    }

    /// Checks the declarations of every attribute, recursively.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_at("")
    }

    fn validate_at(&self, prefix: &str) -> Result<(), String> {
        for (name, schema) in &self.attributes {
            schema.validate(&join_path(prefix, name))?;
        }
        Ok(())
    }

    /// Validates user configuration against this block and fills in defaults.
    pub fn apply(&self, config: &Map<String, Value>) -> Result<Map<String, Value>, ProviderError> {
        self.apply_at("", config).map_err(ProviderError::Config)
    }

    fn apply_at(
        &self,
        prefix: &str,
        config: &Map<String, Value>,
    ) -> Result<Map<String, Value>, String> {
        if let Some(unknown) = config.keys().find(|k| !self.attributes.contains_key(*k)) {
            return Err(format!(
                "unsupported argument {:?}",
                join_path(prefix, unknown)
            ));
        }

        let mut out = Map::new();
        for (name, schema) in &self.attributes {
            let path = join_path(prefix, name);
            let value = config.get(name).filter(|v| !v.is_null());

            match value {
                Some(_) if schema.computed && !schema.optional => {
                    return Err(format!("{}: value is computed and cannot be set", path));
                }
                Some(value) => {
                    schema.check_value(&path, value)?;
                    let value = match (schema.block(), value) {
                        (Some(block), Value::Array(items)) => Value::Array(
                            items
                                .iter()
                                .enumerate()
                                .map(|(i, item)| {
                                    let item = item.as_object().ok_or_else(|| {
                                        format!("{}.{}: expected block", path, i)
                                    })?;
                                    block
                                        .apply_at(&format!("{}.{}", path, i), item)
                                        .map(Value::Object)
                                })
                                .collect::<Result<Vec<_>, String>>()?,
                        ),
                        _ => value.clone(),
                    };
                    out.insert(name.clone(), value);
                }
                None if schema.required => {
                    return Err(format!("the argument {:?} is required", path));
                }
                None => {
                    if let Some(default) = &schema.default {
                        out.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(out)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
