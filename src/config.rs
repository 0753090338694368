//! Structured output configuration attached to a generation request.
//!
//! A [`StructuredOutputConfig`] holds at most one constraint: a JSON schema, a regex,
//! an EBNF grammar or a [`StructuralTag`] tree. The fields are not exclusive by
//! construction, [`StructuredOutputConfig::validate`] checks it on request.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::primitives::OptionMap;
use crate::structural_tag::parsing::{is_legacy_shape, value_type};
use crate::structural_tag::{Parser, StructuralTag};
use crate::{Error, Result};

pub static JSON_SCHEMA: &str = "json_schema";
pub static REGEX: &str = "regex";
pub static GRAMMAR: &str = "grammar";
pub static STRUCTURAL_TAGS_CONFIG: &str = "structural_tags_config";
/// Deprecated, kept for backward compatibility.
pub static COMPOUND_GRAMMAR: &str = "compound_grammar";

/// Value of the `structural_tags_config` field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StructuralTagsConfig {
    StructuralTag(StructuralTag),
    /// Deprecated flat list of `{begin, schema, end}` items with triggers.
    /// Its content is never interpreted.
    Legacy,
}

impl StructuralTagsConfig {
    pub fn structural_tag(&self) -> Result<&StructuralTag> {
        match self {
            Self::StructuralTag(tag) => Ok(tag),
            Self::Legacy => Err(Error::UnsupportedLegacyShape),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy)
    }
}

impl From<StructuralTag> for StructuralTagsConfig {
    fn from(tag: StructuralTag) -> Self {
        Self::StructuralTag(tag)
    }
}

/// Borrowed view of the active constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint<'a> {
    JsonSchema(&'a str),
    Regex(&'a str),
    Grammar(&'a str),
    StructuralTag(&'a StructuralTag),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StructuredOutputConfig {
    json_schema: Option<String>,
    regex: Option<String>,
    grammar: Option<String>,
    structural_tags_config: Option<StructuralTagsConfig>,
    compound_grammar: Option<StructuralTag>,
}

impl StructuredOutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the config from a JSON object text.
    pub fn from_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(Error::type_error("object", value_type(other))),
        }
    }

    /// Populates the config from a generic option map.
    ///
    /// Keys are matched exactly, `null` values are treated as absent and unknown
    /// keys are ignored.
    pub fn from_map(map: &OptionMap) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            trace!(key = key.as_str(), "Reading structured output config field");
            match key.as_str() {
                "json_schema" => {
                    config.json_schema = Some(schema_text(value).map_err(|e| e.at(JSON_SCHEMA))?)
                }
                "regex" => config.regex = Some(string_field(value).map_err(|e| e.at(REGEX))?),
                "grammar" => {
                    config.grammar = Some(string_field(value).map_err(|e| e.at(GRAMMAR))?)
                }
                "structural_tags_config" => {
                    config.structural_tags_config = Some(
                        structural_tags_config(value).map_err(|e| e.at(STRUCTURAL_TAGS_CONFIG))?,
                    )
                }
                "compound_grammar" => {
                    warn!("`compound_grammar` is deprecated, use `structural_tags_config` instead");
                    config.compound_grammar = Some(
                        Parser::new()
                            .parse(value)
                            .map_err(|e| e.at(COMPOUND_GRAMMAR))?,
                    )
                }
                other => debug!(key = other, "Ignoring unknown structured output config key"),
            }
        }
        Ok(config)
    }

    pub fn with_json_schema(self, json_schema: impl Into<String>) -> Self {
        Self {
            json_schema: Some(json_schema.into()),
            ..self
        }
    }

    pub fn with_regex(self, regex: impl Into<String>) -> Self {
        Self {
            regex: Some(regex.into()),
            ..self
        }
    }

    pub fn with_grammar(self, grammar: impl Into<String>) -> Self {
        Self {
            grammar: Some(grammar.into()),
            ..self
        }
    }

    pub fn with_structural_tag(self, tag: impl Into<StructuralTag>) -> Self {
        Self {
            structural_tags_config: Some(StructuralTagsConfig::StructuralTag(tag.into())),
            ..self
        }
    }

    pub fn json_schema(&self) -> Option<&str> {
        self.json_schema.as_deref()
    }

    pub fn regex(&self) -> Option<&str> {
        self.regex.as_deref()
    }

    pub fn grammar(&self) -> Option<&str> {
        self.grammar.as_deref()
    }

    /// Structural tag tree, if set.
    ///
    /// Fails with [`Error::UnsupportedLegacyShape`] when the field holds the
    /// deprecated structural tags config.
    pub fn structural_tags_config(&self) -> Result<Option<&StructuralTag>> {
        self.structural_tags_config
            .as_ref()
            .map(StructuralTagsConfig::structural_tag)
            .transpose()
    }

    pub fn raw_structural_tags_config(&self) -> Option<&StructuralTagsConfig> {
        self.structural_tags_config.as_ref()
    }

    pub fn compound_grammar(&self) -> Option<&StructuralTag> {
        self.compound_grammar.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.set_fields().is_empty()
    }

    fn set_fields(&self) -> Vec<&'static str> {
        [
            (JSON_SCHEMA, self.json_schema.is_some()),
            (REGEX, self.regex.is_some()),
            (GRAMMAR, self.grammar.is_some()),
            (STRUCTURAL_TAGS_CONFIG, self.structural_tags_config.is_some()),
            (COMPOUND_GRAMMAR, self.compound_grammar.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }

    /// Checks that at most one constraint is set and that none uses a deprecated
    /// unsupported shape.
    pub fn validate(&self) -> Result<()> {
        if let Some(StructuralTagsConfig::Legacy) = self.structural_tags_config {
            return Err(Error::UnsupportedLegacyShape);
        }
        let fields = self.set_fields();
        if fields.len() > 1 {
            return Err(Error::ConflictingConstraints(fields));
        }
        Ok(())
    }

    /// The single active constraint, `None` when the config is empty.
    pub fn constraint(&self) -> Result<Option<Constraint<'_>>> {
        self.validate()?;
        let constraint = if let Some(schema) = &self.json_schema {
            Some(Constraint::JsonSchema(schema))
        } else if let Some(regex) = &self.regex {
            Some(Constraint::Regex(regex))
        } else if let Some(grammar) = &self.grammar {
            Some(Constraint::Grammar(grammar))
        } else if let Some(tag) = self.structural_tags_config()? {
            Some(Constraint::StructuralTag(tag))
        } else {
            self.compound_grammar.as_ref().map(Constraint::StructuralTag)
        };
        Ok(constraint)
    }

    /// Canonical JSON object holding the populated fields only.
    pub fn to_json(&self) -> Result<Value> {
        let mut map = Map::new();
        if let Some(schema) = &self.json_schema {
            map.insert(JSON_SCHEMA.into(), Value::String(schema.clone()));
        }
        if let Some(regex) = &self.regex {
            map.insert(REGEX.into(), Value::String(regex.clone()));
        }
        if let Some(grammar) = &self.grammar {
            map.insert(GRAMMAR.into(), Value::String(grammar.clone()));
        }
        if let Some(tag) = self.structural_tags_config()? {
            map.insert(STRUCTURAL_TAGS_CONFIG.into(), tag.to_json());
        }
        if let Some(tag) = &self.compound_grammar {
            map.insert(COMPOUND_GRAMMAR.into(), tag.to_json());
        }
        Ok(Value::Object(map))
    }
}

impl fmt::Display for StructuredOutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuredOutputConfig(")?;
        let mut sep = "";
        for (name, value) in [
            (JSON_SCHEMA, &self.json_schema),
            (REGEX, &self.regex),
            (GRAMMAR, &self.grammar),
        ] {
            if let Some(value) = value {
                write!(f, "{sep}{name}=\"{value}\"")?;
                sep = ", ";
            }
        }
        match &self.structural_tags_config {
            Some(StructuralTagsConfig::StructuralTag(tag)) => {
                write!(f, "{sep}{STRUCTURAL_TAGS_CONFIG}={tag}")?;
                sep = ", ";
            }
            Some(StructuralTagsConfig::Legacy) => {
                write!(f, "{sep}{STRUCTURAL_TAGS_CONFIG}=StructuralTagsConfig(deprecated)")?;
                sep = ", ";
            }
            None => {}
        }
        if let Some(tag) = &self.compound_grammar {
            write!(f, "{sep}{COMPOUND_GRAMMAR}={tag}")?;
        }
        write!(f, ")")
    }
}

impl TryFrom<&Value> for StructuredOutputConfig {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn string_field(value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::type_error("string", value_type(value)))
}

fn schema_text(value: &Value) -> Result<String> {
    match value {
        Value::String(schema) => Ok(schema.clone()),
        schema @ Value::Object(_) => Ok(schema.to_string()),
        other => Err(Error::type_error("string or object", value_type(other))),
    }
}

fn structural_tags_config(value: &Value) -> Result<StructuralTagsConfig> {
    if is_legacy_shape(value) {
        warn!("Deprecated structural tags config shape, use a structural tag instead");
        return Ok(StructuralTagsConfig::Legacy);
    }
    Parser::new().parse(value).map(StructuralTagsConfig::StructuralTag)
}
