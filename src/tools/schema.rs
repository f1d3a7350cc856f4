//! Declared input shapes, checked before every capability call

use crate::core::{EngineError, EngineResult};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip)]
    compiled: Option<Arc<Regex>>,
}

impl PropertySchema {
    pub fn new(schema_type: &str, description: &str) -> Self {
        Self { schema_type: schema_type.into(), description: description.into(), enum_values: None, pattern: None, compiled: None }
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Strings must match `re`. Compiled once, here.
    pub fn matching(mut self, re: &str) -> Result<Self, regex::Error> {
        self.compiled = Some(Arc::new(Regex::new(re)?));
        self.pattern = Some(re.into());
        Ok(self)
    }

    fn check(&self, field: &str, value: &Value) -> Result<(), String> {
        let type_ok = match self.schema_type.as_str() {
            "string" => value.is_string(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            _ => true,
        };
        if !type_ok {
            return Err(format!("'{}' must be {}", field, self.schema_type));
        }
        if let (Some(allowed), Some(s)) = (&self.enum_values, value.as_str()) {
            if !allowed.iter().any(|a| a == s) {
                return Err(format!("'{}' must be one of [{}], got '{}'", field, allowed.join(", "), s));
            }
        }
        if let (Some(re), Some(s)) = (&self.compiled, value.as_str()) {
            if !re.is_match(s) {
                return Err(format!("'{}' does not match {}", field, re.as_str()));
            }
        }
        Ok(())
    }
}

/// Object-shaped input: typed properties plus required keys. Extra keys pass.
#[derive(Debug, Clone, Serialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self { Self { schema_type: "object".into(), properties: BTreeMap::new(), required: Vec::new() } }
}

impl InputSchema {
    pub fn new() -> Self { Self::default() }

    pub fn property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn required(mut self, name: &str, schema: PropertySchema) -> Self {
        self.required.push(name.into());
        self.property(name, schema)
    }

    /// Reject, never coerce.
    pub fn validate(&self, capability: &str, input: &Value) -> EngineResult<()> {
        let obj = input.as_object().ok_or_else(|| EngineError::validation(capability, "input must be an object"))?;
        for name in &self.required {
            if obj.get(name).map_or(true, Value::is_null) {
                return Err(EngineError::validation(capability, format!("missing required '{}'", name)));
            }
        }
        for (name, schema) in &self.properties {
            match obj.get(name) {
                None | Some(Value::Null) => continue,
                Some(value) => schema.check(name, value).map_err(|reason| EngineError::validation(capability, reason))?,
            }
        }
        Ok(())
    }
}
