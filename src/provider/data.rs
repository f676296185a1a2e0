//! Resource data: the id and attribute values of one resource instance.

use crate::error::ProviderError;
use crate::provider::schema::Block;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration or state of a single resource, bound to its schema.
///
/// Getters return the zero value of the attribute's type when it is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(skip)]
    schema: Arc<Block>,
}

impl PartialEq for ResourceData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.attributes == other.attributes
    }
}

impl ResourceData {
    /// Validates `config` against `schema` and fills in defaults.
    pub fn from_config(
        schema: Arc<Block>,
        config: &Map<String, Value>,
    ) -> Result<Self, ProviderError> {
        let attributes = schema.apply(config)?;
        Ok(Self {
            id: None,
            attributes,
            schema,
        })
    }

    /// Rebinds previously serialized state to `schema`.
    pub fn from_state(schema: Arc<Block>, state: Value) -> Result<Self, ProviderError> {
        let mut data: ResourceData = serde_json::from_value(state)
            .map_err(|e| ProviderError::state(format!("invalid state: {}", e)))?;
        if let Some(unknown) = data.attributes.keys().find(|k| schema.get(k).is_none()) {
            return Err(ProviderError::state(format!(
                "state has unknown attribute {:?}",
                unknown
            )));
        }
        data.schema = schema;
        Ok(data)
    }

    /// Empty data carrying only an id, as handed to an importer.
    pub fn with_id(schema: Arc<Block>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            attributes: Map::new(),
            schema,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Whether `key` is set to something other than its zero value.
    pub fn is_set(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(entries)) => !entries.is_empty(),
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) => false,
        }
    }

    /// A list or set of strings; null elements read as empty strings.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First element of a nested-block list, bound to the nested schema.
    pub fn get_block(&self, key: &str) -> Option<ResourceData> {
        let block = self.schema.get(key)?.block()?;
        let first = self.get(key)?.as_array()?.first()?.as_object()?;
        Some(ResourceData {
            id: None,
            attributes: first.clone(),
            schema: Arc::new(block.clone()),
        })
    }

    /// Sets an attribute, checking it against the schema.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ProviderError> {
        let schema = self
            .schema
            .get(key)
            .ok_or_else(|| ProviderError::state(format!("Invalid address to set: {:?}", key)))?;
        let value = value.into();
        schema.check_value(key, &value).map_err(ProviderError::State)?;
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::schema::{Elem, Schema, ValueType};
    use serde_json::json;

    fn schema() -> Arc<Block> {
        Arc::new(
            Block::new("")
                .attribute("count", Schema::new(ValueType::Int).optional())
                .attribute("keys", Schema::strings(ValueType::Set).computed())
                .attribute("headers", Schema::strings(ValueType::Map).optional())
                .attribute(
                    "kube",
                    Schema::new(ValueType::List)
                        .optional()
                        .max_items(1)
                        .elem(Elem::Block(Block::new("").attribute(
                            "namespace",
                            Schema::new(ValueType::String).optional(),
                        ))),
                ),
        )
    }

    #[test]
    fn test_getters_return_zero_values() {
        let data = ResourceData::from_config(schema(), &Map::new()).unwrap();
        assert_eq!(data.get_int("count"), 0);
        assert!(data.get_string_list("keys").is_empty());
        assert!(data.get_string_map("headers").is_empty());
        assert!(data.get_block("kube").is_none());
        assert!(!data.is_set("count"));
    }

    #[test]
    fn test_get_block_binds_nested_schema() {
        let config = json!({"kube": [{"namespace": "vault"}], "headers": {"X-A": "1"}});
        let data = ResourceData::from_config(schema(), config.as_object().unwrap()).unwrap();
        let kube = data.get_block("kube").unwrap();
        assert_eq!(kube.get_string("namespace"), "vault");
        assert_eq!(data.get_string_map("headers").get("X-A").unwrap(), "1");
    }

    #[test]
    fn test_set_checks_schema() {
        let mut data = ResourceData::from_config(schema(), &Map::new()).unwrap();
        data.set("keys", vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(data.get_string_list("keys"), vec!["a", "b"]);

        assert!(data.set("nope", "x").is_err());
        assert!(data.set("count", "not a number").is_err());
    }

    #[test]
    fn test_state_round_trip_rebinds_schema() {
        let mut data = ResourceData::with_id(schema(), "http://127.0.0.1:8200");
        data.set("keys", vec!["k1".to_string()]).unwrap();

        let state = serde_json::to_value(&data).unwrap();
        let restored = ResourceData::from_state(schema(), state).unwrap();
        assert_eq!(restored, data);

        let bad = json!({"id": "x", "attributes": {"unknown": 1}});
        assert!(ResourceData::from_state(schema(), bad).is_err());
    }
}
