use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::structural_tag::types::{self, Kind};
use crate::structural_tag::{StructuralTag, Tag, TagsWithSeparator, TriggeredTags};
use crate::{Error, Result};

/// Default bound on the nesting of object nodes.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Converts dynamically typed values into structural tags.
pub struct Parser {
    depth: usize,
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(self, max_depth: usize) -> Self {
        Self { max_depth, ..self }
    }

    pub fn parse(&mut self, value: &Value) -> Result<StructuralTag> {
        match value {
            Value::String(text) => Ok(StructuralTag::PlainText(text.clone())),
            Value::Object(obj) => self.parse_object(obj, value),
            other => Err(Error::type_error("StructuralTag object or string", value_type(other))),
        }
    }

    fn parse_object(&mut self, obj: &Map<String, Value>, value: &Value) -> Result<StructuralTag> {
        let discriminator = match obj.get(types::TYPE) {
            Some(Value::String(discriminator)) => discriminator.as_str(),
            Some(other) => return Err(Error::InvalidStructuralTag(other.to_string().into())),
            None if is_legacy_shape(value) => return Err(Error::UnsupportedLegacyShape),
            None => return Err(Error::InvalidStructuralTag("<missing>".into())),
        };
        let Some(kind) = Kind::from_discriminator(discriminator) else {
            return Err(Error::InvalidStructuralTag(discriminator.into()));
        };
        if kind.discriminator() != Some(discriminator) {
            debug!(discriminator, %kind, "Structural tag uses an alias discriminator");
        }

        if self.depth >= self.max_depth {
            return Err(Error::NestingLimitReached(self.max_depth));
        }
        self.depth += 1;
        trace!(%kind, depth = self.depth, "Parsing structural tag");
        let result = self.parse_kind(kind, obj);
        self.depth -= 1;
        result
    }

    fn parse_kind(&mut self, kind: Kind, obj: &Map<String, Value>) -> Result<StructuralTag> {
        match kind {
            Kind::Regex => required_str(kind, obj, types::VALUE).map(StructuralTag::regex),
            Kind::JsonSchema => schema_text(kind, obj).map(StructuralTag::json_schema),
            Kind::Ebnf => required_str(kind, obj, types::VALUE).map(StructuralTag::ebnf),
            Kind::ConstString => {
                required_str(kind, obj, types::VALUE).map(StructuralTag::const_string)
            }
            Kind::AnyText => parse_any_text(obj),
            Kind::QwenXmlParametersFormat => {
                schema_text(kind, obj).map(StructuralTag::qwen_xml_parameters_format)
            }
            Kind::Concat => self.parse_elements(kind, obj).and_then(StructuralTag::concat),
            Kind::Union => self.parse_elements(kind, obj).and_then(StructuralTag::union),
            Kind::Tag => self.parse_tag(obj).map(StructuralTag::Tag),
            Kind::TriggeredTags => self.parse_triggered_tags(obj),
            Kind::TagsWithSeparator => self.parse_tags_with_separator(obj),
            Kind::PlainText => Err(Error::InvalidStructuralTag(kind.name().into())),
        }
    }

    fn parse_elements(
        &mut self,
        kind: Kind,
        obj: &Map<String, Value>,
    ) -> Result<Vec<StructuralTag>> {
        let (field, elements) = match (obj.get(types::TAGS), obj.get(types::ELEMENTS)) {
            (Some(tags), _) => (types::TAGS, tags),
            (None, Some(elements)) => (types::ELEMENTS, elements),
            (None, None) => {
                return Err(Error::MissingField {
                    kind,
                    field: types::TAGS,
                })
            }
        };
        let elements = elements.as_array().ok_or_else(|| {
            Error::type_error("array", value_type(elements)).at(format!("{kind}.{field}"))
        })?;

        elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                self.parse(element).map_err(|e| e.at(format!("{kind}.{field}[{i}]")))
            })
            .collect()
    }

    fn parse_tag(&mut self, obj: &Map<String, Value>) -> Result<Tag> {
        let kind = Kind::Tag;
        let begin = required_str(kind, obj, types::BEGIN)?;
        let end = required_str(kind, obj, types::END)?;
        let content = obj.get(types::CONTENT).ok_or(Error::MissingField {
            kind,
            field: types::CONTENT,
        })?;
        let content = self
            .parse(content)
            .map_err(|e| e.at(format!("{kind}.{}", types::CONTENT)))?;
        Ok(Tag::new(begin, content, end))
    }

    fn parse_tags(&mut self, kind: Kind, obj: &Map<String, Value>) -> Result<Vec<Tag>> {
        let tags = required_array(kind, obj, types::TAGS)?;
        tags.iter()
            .enumerate()
            .map(|(i, tag)| {
                self.parse(tag)
                    .and_then(Tag::try_from)
                    .map_err(|e| e.at(format!("{kind}.{}[{i}]", types::TAGS)))
            })
            .collect()
    }

    fn parse_triggered_tags(&mut self, obj: &Map<String, Value>) -> Result<StructuralTag> {
        let kind = Kind::TriggeredTags;
        let triggers = required_array(kind, obj, types::TRIGGERS)?
            .iter()
            .enumerate()
            .map(|(i, trigger)| {
                trigger.as_str().ok_or_else(|| {
                    Error::type_error("string", value_type(trigger))
                        .at(format!("{kind}.{}[{i}]", types::TRIGGERS))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let tags = self.parse_tags(kind, obj)?;
        let at_least_one = optional_bool(kind, obj, types::AT_LEAST_ONE)?;
        let stop_after_first = optional_bool(kind, obj, types::STOP_AFTER_FIRST)?;

        Ok(TriggeredTags::new(triggers, tags, at_least_one, stop_after_first).into())
    }

    fn parse_tags_with_separator(&mut self, obj: &Map<String, Value>) -> Result<StructuralTag> {
        let kind = Kind::TagsWithSeparator;
        let tags = self.parse_tags(kind, obj)?;
        let separator = required_str(kind, obj, types::SEPARATOR)?;
        let at_least_one = optional_bool(kind, obj, types::AT_LEAST_ONE)?;
        let stop_after_first = optional_bool(kind, obj, types::STOP_AFTER_FIRST)?;

        Ok(TagsWithSeparator::new(tags, separator, at_least_one, stop_after_first).into())
    }
}

fn parse_any_text(obj: &Map<String, Value>) -> Result<StructuralTag> {
    let count = obj.keys().filter(|key| *key != types::TYPE).count();
    if count > 0 {
        return Err(Error::UnexpectedArguments {
            kind: Kind::AnyText,
            count,
        });
    }
    Ok(StructuralTag::any_text())
}

fn required<'v>(kind: Kind, obj: &'v Map<String, Value>, field: &'static str) -> Result<&'v Value> {
    obj.get(field).ok_or(Error::MissingField { kind, field })
}

fn required_str<'v>(
    kind: Kind,
    obj: &'v Map<String, Value>,
    field: &'static str,
) -> Result<&'v str> {
    let value = required(kind, obj, field)?;
    value
        .as_str()
        .ok_or_else(|| Error::type_error("string", value_type(value)).at(format!("{kind}.{field}")))
}

fn required_array<'v>(
    kind: Kind,
    obj: &'v Map<String, Value>,
    field: &'static str,
) -> Result<&'v Vec<Value>> {
    let value = required(kind, obj, field)?;
    value
        .as_array()
        .ok_or_else(|| Error::type_error("array", value_type(value)).at(format!("{kind}.{field}")))
}

fn optional_bool(kind: Kind, obj: &Map<String, Value>, field: &'static str) -> Result<bool> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => {
            Err(Error::type_error("boolean", value_type(other)).at(format!("{kind}.{field}")))
        }
    }
}

// Schema payloads may be given inline as JSON objects, they are kept as compact text.
fn schema_text(kind: Kind, obj: &Map<String, Value>) -> Result<String> {
    match required(kind, obj, types::VALUE)? {
        Value::String(schema) => Ok(schema.clone()),
        schema @ Value::Object(_) => Ok(schema.to_string()),
        other => Err(Error::type_error("string or object", value_type(other))
            .at(format!("{kind}.{}", types::VALUE))),
    }
}

pub(crate) fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct LegacyStructuralTagItem {
    begin: String,
    schema: Value,
    end: String,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct LegacyStructuralTagsConfig {
    structural_tags: Vec<LegacyStructuralTagItem>,
    #[serde(default)]
    triggers: Vec<String>,
}

/// Recognizes the deprecated flat structural tags config: either an object holding a
/// `structural_tags` list of `{begin, schema, end}` items (with optional `triggers`) or
/// the bare list of items.
///
/// The content is never interpreted.
pub(crate) fn is_legacy_shape(value: &Value) -> bool {
    match value {
        Value::Array(_) => Vec::<LegacyStructuralTagItem>::deserialize(value).is_ok(),
        Value::Object(obj) if !obj.contains_key(types::TYPE) => {
            LegacyStructuralTagsConfig::deserialize(value).is_ok()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::structural_tag::from_value;

    #[test]
    fn test_plain_text() {
        for text in ["", "hello", "<function=", "{\"not\": \"parsed\"}"] {
            assert_eq!(
                from_value(&json!(text)),
                Ok(StructuralTag::PlainText(text.to_string()))
            );
        }
    }

    #[test]
    fn test_leaves() {
        for (value, expected) in [
            (
                json!({"type": "regex", "value": "[0-9]+"}),
                StructuralTag::regex("[0-9]+"),
            ),
            (
                json!({"type": "json_schema", "value": "{\"type\": \"integer\"}"}),
                StructuralTag::json_schema("{\"type\": \"integer\"}"),
            ),
            (
                json!({"type": "json_schema", "value": {"type": "integer"}}),
                StructuralTag::json_schema(r#"{"type":"integer"}"#),
            ),
            (
                json!({"type": "grammar", "value": "root ::= \"a\""}),
                StructuralTag::ebnf("root ::= \"a\""),
            ),
            (
                json!({"type": "ebnf", "value": "root ::= \"a\""}),
                StructuralTag::ebnf("root ::= \"a\""),
            ),
            (
                json!({"type": "const_string", "value": "x"}),
                StructuralTag::const_string("x"),
            ),
            (json!({"type": "any_text"}), StructuralTag::any_text()),
            (
                json!({"type": "qwen_xml_params", "value": "{}"}),
                StructuralTag::qwen_xml_parameters_format("{}"),
            ),
            (
                json!({"type": "qwen_xml_parameter", "value": {"type": "object"}}),
                StructuralTag::qwen_xml_parameters_format(r#"{"type":"object"}"#),
            ),
        ] {
            assert_eq!(from_value(&value), Ok(expected), "Unexpected result for {value}");
        }
    }

    #[test]
    fn test_tag() {
        let value = json!({
            "type": "tag",
            "begin": "<a>",
            "content": {"type": "regex", "value": "[0-9]+"},
            "end": "</a>"
        });
        let tag = from_value(&value).expect("Valid tag");
        assert_eq!(
            tag,
            StructuralTag::tag("<a>", StructuralTag::regex("[0-9]+"), "</a>")
        );
        assert_eq!(tag.to_string(), r#"Tag("<a>", Regex("[0-9]+"), "</a>")"#);
    }

    #[test]
    fn test_union_of_const_strings() {
        let value = json!({
            "type": "union",
            "tags": [
                {"type": "const_string", "value": "x"},
                {"type": "const_string", "value": "y"}
            ]
        });
        assert_eq!(
            from_value(&value),
            StructuralTag::union(vec![
                StructuralTag::const_string("x"),
                StructuralTag::const_string("y")
            ])
        );

        let value = json!({"type": "union", "tags": [{"type": "const_string", "value": "x"}]});
        assert_eq!(
            from_value(&value),
            Err(Error::ArityError {
                kind: Kind::Union,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_concat_aliases() {
        let expected = StructuralTag::concat(vec!["a".into(), StructuralTag::any_text()]);
        for value in [
            json!({"type": "concat", "tags": ["a", {"type": "any_text"}]}),
            json!({"type": "sequence", "tags": ["a", {"type": "any_text"}]}),
            json!({"type": "concat", "elements": ["a", {"type": "any_text"}]}),
        ] {
            assert_eq!(from_value(&value), expected);
        }
    }

    #[test]
    fn test_tag_collections() {
        let tag = json!({
            "type": "tag",
            "begin": "<function=get_weather>",
            "content": {"type": "json_schema", "value": "{}"},
            "end": "</function>"
        });

        let triggered = from_value(&json!({
            "type": "triggered_tags",
            "triggers": ["<function="],
            "tags": [tag],
            "at_least_one": true
        }))
        .expect("Valid triggered tags");
        let StructuralTag::TriggeredTags(triggered) = triggered else {
            unreachable!("Expected TriggeredTags, got {triggered}");
        };
        assert_eq!(triggered.triggers(), &["<function="]);
        assert_eq!(triggered.tags().len(), 1);
        assert!(triggered.at_least_one());
        assert!(!triggered.stop_after_first());

        let separated = from_value(&json!({
            "type": "tags_with_separator",
            "tags": [tag, tag],
            "separator": ",",
            "stop_after_first": false
        }))
        .expect("Valid tags with separator");
        let StructuralTag::TagsWithSeparator(separated) = separated else {
            unreachable!("Expected TagsWithSeparator, got {separated}");
        };
        assert_eq!(separated.separator(), ",");
        assert_eq!(separated.tags().len(), 2);
    }

    #[test]
    fn test_non_tag_in_tag_collection() {
        for value in [
            json!({
                "type": "triggered_tags",
                "triggers": ["<"],
                "tags": [{"type": "regex", "value": "a"}]
            }),
            json!({
                "type": "tags_with_separator",
                "tags": ["plain"],
                "separator": ","
            }),
        ] {
            let err = from_value(&value).expect_err("Only tags are allowed");
            assert!(
                matches!(err.root_cause(), Error::TypeError { expected: "Tag", .. }),
                "Unexpected error {err:?}"
            );
            assert!(err.location().unwrap().ends_with(".tags[0]"), "{err}");
        }
    }

    #[test]
    fn test_unknown_discriminator() {
        for (value, discriminator) in [
            (json!({"type": "Regex", "value": "a"}), "Regex"),
            (json!({"type": "lark", "value": "a"}), "lark"),
            (json!({"type": 42}), "42"),
            (json!({"value": "a"}), "<missing>"),
        ] {
            assert_eq!(
                from_value(&value),
                Err(Error::InvalidStructuralTag(discriminator.into()))
            );
        }
    }

    #[test]
    fn test_nested_errors_are_located() {
        let value = json!({
            "type": "concat",
            "tags": [
                "a",
                {
                    "type": "tag",
                    "begin": "<a>",
                    "content": {"type": "unknown"},
                    "end": "</a>"
                }
            ]
        });
        let err = from_value(&value).expect_err("Unknown nested type");
        assert_eq!(
            err.root_cause(),
            &Error::InvalidStructuralTag("unknown".into())
        );
        assert_eq!(err.location().as_deref(), Some("Concat.tags[1].Tag.content"));
        assert_eq!(
            err.to_string(),
            r#"Concat.tags[1]: Tag.content: Invalid value for StructuralTag: unknown type "unknown""#
        );
    }

    #[test]
    fn test_any_text_rejects_arguments() {
        assert_eq!(
            from_value(&json!({"type": "any_text", "value": "x"})),
            Err(Error::UnexpectedArguments {
                kind: Kind::AnyText,
                count: 1
            })
        );
    }

    #[test]
    fn test_invalid_fields() {
        for (value, expected) in [
            (
                json!({"type": "regex"}),
                Error::MissingField {
                    kind: Kind::Regex,
                    field: "value",
                },
            ),
            (
                json!({"type": "tag", "begin": "<a>", "end": "</a>"}),
                Error::MissingField {
                    kind: Kind::Tag,
                    field: "content",
                },
            ),
            (
                json!({"type": "union"}),
                Error::MissingField {
                    kind: Kind::Union,
                    field: "tags",
                },
            ),
            (
                json!({"type": "tags_with_separator", "tags": []}),
                Error::MissingField {
                    kind: Kind::TagsWithSeparator,
                    field: "separator",
                },
            ),
            (
                json!({"type": "const_string", "value": 1}),
                Error::type_error("string", "number").at("ConstString.value"),
            ),
            (
                json!({"type": "tag", "begin": "<a>", "content": 1, "end": "</a>"}),
                Error::type_error("StructuralTag object or string", "number").at("Tag.content"),
            ),
            (
                json!({"type": "triggered_tags", "triggers": ["a", 1], "tags": []}),
                Error::type_error("string", "number").at("TriggeredTags.triggers[1]"),
            ),
            (
                json!({
                    "type": "triggered_tags",
                    "triggers": [],
                    "tags": [],
                    "at_least_one": "yes"
                }),
                Error::type_error("boolean", "string").at("TriggeredTags.at_least_one"),
            ),
        ] {
            assert_eq!(from_value(&value), Err(expected), "Unexpected result for {value}");
        }
    }

    #[test]
    fn test_non_object_values() {
        for value in [json!(null), json!(1), json!(true), json!([1, 2])] {
            let err = from_value(&value).expect_err("Not a structural tag");
            assert!(matches!(err, Error::TypeError { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_legacy_shape() {
        let legacy = json!({
            "structural_tags": [
                {"begin": "<function=f>", "schema": "{}", "end": "</function>"}
            ],
            "triggers": ["<function="]
        });
        assert!(is_legacy_shape(&legacy));
        assert_eq!(from_value(&legacy), Err(Error::UnsupportedLegacyShape));

        let items = json!([{"begin": "<a>", "schema": {"type": "object"}, "end": "</a>"}]);
        assert!(is_legacy_shape(&items));

        let without_triggers = json!({
            "structural_tags": [{"begin": "<a>", "schema": "{}", "end": "</a>"}]
        });
        assert!(is_legacy_shape(&without_triggers));
        assert_eq!(from_value(&without_triggers), Err(Error::UnsupportedLegacyShape));

        assert!(!is_legacy_shape(&json!({"triggers": ["a"]})));
        assert!(!is_legacy_shape(&json!({"structural_tags": 5})));
        assert!(!is_legacy_shape(&json!({"structural_tags": [{"begin": "<a>"}]})));
        assert_eq!(
            from_value(&json!({"structural_tags": 5})),
            Err(Error::InvalidStructuralTag("<missing>".into()))
        );
        assert!(!is_legacy_shape(&json!({"type": "tag", "structural_tags": [], "triggers": []})));
    }

    #[test]
    fn test_nesting_limit() {
        let mut value = json!({"type": "any_text"});
        for _ in 0..10 {
            value = json!({"type": "tag", "begin": "(", "content": value, "end": ")"});
        }

        let tag = Parser::new().with_max_depth(11).parse(&value).expect("Within limit");
        assert_eq!(tag.depth(), 11);

        let err = Parser::new()
            .with_max_depth(10)
            .parse(&value)
            .expect_err("Over the limit");
        assert_eq!(err.root_cause(), &Error::NestingLimitReached(10));
    }

    #[test]
    fn test_parser_is_reusable_after_error() {
        let mut parser = Parser::new().with_max_depth(2);
        let deep = json!({
            "type": "tag",
            "begin": "",
            "content": {
                "type": "tag",
                "begin": "",
                "content": {"type": "any_text"},
                "end": ""
            },
            "end": ""
        });
        assert!(parser.parse(&deep).is_err());
        assert_eq!(
            parser.parse(&json!({"type": "tag", "begin": "", "content": "x", "end": ""})),
            Ok(StructuralTag::tag("", "x", ""))
        );
    }
}
