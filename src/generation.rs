//! Generation options handed to the pipeline.

use serde_json::Value;
use tracing::debug;

use crate::config::StructuredOutputConfig;
use crate::primitives::OptionMap;
use crate::structural_tag::parsing::value_type;
use crate::{Error, Result};

pub static STRUCTURED_OUTPUT_CONFIG: &str = "structured_output_config";

/// Generation option map split into the typed structured output config and the
/// remaining options, which are forwarded to the pipeline untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOptions {
    structured_output_config: Option<StructuredOutputConfig>,
    options: OptionMap,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Object(map) => Self::from_map(&map),
            other => Err(Error::type_error("object", value_type(&other))),
        }
    }

    pub fn from_map(map: &OptionMap) -> Result<Self> {
        let mut generation = Self::default();
        for (key, value) in map {
            if key == STRUCTURED_OUTPUT_CONFIG {
                if !value.is_null() {
                    let config = StructuredOutputConfig::from_value(value)
                        .map_err(|e| e.at(STRUCTURED_OUTPUT_CONFIG))?;
                    generation.structured_output_config = Some(config);
                }
            } else {
                debug!(key = key.as_str(), "Passing generation option through");
                generation.options.insert(key.clone(), value.clone());
            }
        }
        Ok(generation)
    }

    pub fn with_structured_output_config(self, config: StructuredOutputConfig) -> Self {
        Self {
            structured_output_config: Some(config),
            ..self
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn structured_output_config(&self) -> Option<&StructuredOutputConfig> {
        self.structured_output_config.as_ref()
    }

    /// Options other than the structured output config, in insertion order.
    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn into_parts(self) -> (Option<StructuredOutputConfig>, OptionMap) {
        (self.structured_output_config, self.options)
    }

    /// Merges the options back into a single map, the config is written in its
    /// canonical form.
    pub fn to_map(&self) -> Result<OptionMap> {
        let mut map = self.options.clone();
        if let Some(config) = &self.structured_output_config {
            map.insert(STRUCTURED_OUTPUT_CONFIG.into(), config.to_json()?);
        }
        Ok(map)
    }
}
