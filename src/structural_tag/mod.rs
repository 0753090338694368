//! Provides the structural tag model: a recursive description of allowed output structure,
//! rendered to a canonical JSON form handed over to a constrained-decoding engine.
//!
//! A [`StructuralTag`] is either a leaf, constraining a single piece of text, or a compound
//! node built from other structural tags. Every node can be rendered as a human readable
//! string (see [`std::fmt::Display`]) and as canonical JSON (see [`StructuralTag::to_json`]).
//! Canonical JSON ingested back with [`from_value`] yields an equal node.
//!
//! ## Supported kinds
//!
//! ### Leaves
//! - `PlainText`
//!     - A literal string, represented by a bare JSON string.
//! - `Regex`
//!     - Text matching a regular expression.
//! - `JSONSchema`
//!     - Valid instance of a JSON Schema document.
//! - `EBNF`
//!     - Text matching a grammar in EBNF notation.
//! - `ConstString`
//!     - A fixed string.
//! - `AnyText`
//!     - Unconstrained text.
//! - `QwenXMLParametersFormat`
//!     - Tool call parameters block in Qwen XML format, described by a JSON schema.
//!
//! ### Compound
//! - `Concat`
//!     - Two or more structural tags, matched in sequence.
//! - `Union`
//!     - Two or more alternatives, exactly one is matched.
//! - `Tag`
//!     - Content wrapped by fixed `begin` and `end` delimiters.
//! - `TriggeredTags`
//!     - Tags matched only after one of the trigger strings is observed.
//! - `TagsWithSeparator`
//!     - Tags repeated and joined by a separator.
//!
//! ### Cardinality
//!
//! Both tag collections accept two flags: `at_least_one` requires at least one tag to be
//! matched, `stop_after_first` forbids matching more than one.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashSet as HashSet;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

pub use parsing::{Parser, DEFAULT_MAX_DEPTH};
pub use types::Kind;

pub(crate) mod parsing;
pub mod types;

use crate::{Error, Result};

/// Builds a structural tag from its JSON text.
///
/// # Example
///
/// ```rust
/// # use structured_output_core::Error;
/// use structured_output_core::prelude::*;
///
/// # fn main() -> Result<(), Error> {
///     let tag = structural_tag::from_str(r#"{
///         "type": "tag",
///         "begin": "<a>",
///         "content": {"type": "regex", "value": "[0-9]+"},
///         "end": "</a>"
///     }"#)?;
///     assert_eq!(tag.to_string(), r#"Tag("<a>", Regex("[0-9]+"), "</a>")"#);
/// #   Ok(())
/// }
/// ```
pub fn from_str(json: &str) -> Result<StructuralTag> {
    let value: Value = serde_json::from_str(json)?;
    from_value(&value)
}

/// Builds a structural tag from a dynamically typed value.
///
/// A bare string becomes `PlainText`, objects are dispatched on their `type` field.
pub fn from_value(value: &Value) -> Result<StructuralTag> {
    Parser::new().parse(value)
}

/// A node of the structural tag tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StructuralTag {
    PlainText(String),
    Regex(Regex),
    JsonSchema(JsonSchema),
    Ebnf(Ebnf),
    ConstString(ConstString),
    AnyText(AnyText),
    QwenXmlParametersFormat(QwenXmlParametersFormat),
    Concat(Concat),
    Union(Union),
    Tag(Tag),
    TriggeredTags(TriggeredTags),
    TagsWithSeparator(TagsWithSeparator),
}

impl StructuralTag {
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::PlainText(text.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::Regex(Regex::new(pattern))
    }

    pub fn json_schema(schema: impl Into<String>) -> Self {
        Self::JsonSchema(JsonSchema::new(schema))
    }

    pub fn ebnf(grammar: impl Into<String>) -> Self {
        Self::Ebnf(Ebnf::new(grammar))
    }

    pub fn const_string(value: impl Into<String>) -> Self {
        Self::ConstString(ConstString::new(value))
    }

    pub fn any_text() -> Self {
        Self::AnyText(AnyText::new())
    }

    pub fn qwen_xml_parameters_format(json_schema: impl Into<String>) -> Self {
        Self::QwenXmlParametersFormat(QwenXmlParametersFormat::new(json_schema))
    }

    pub fn concat(elements: Vec<StructuralTag>) -> Result<Self> {
        Concat::new(elements).map(Self::Concat)
    }

    pub fn union(elements: Vec<StructuralTag>) -> Result<Self> {
        Union::new(elements).map(Self::Union)
    }

    pub fn tag(
        begin: impl Into<String>,
        content: impl Into<StructuralTag>,
        end: impl Into<String>,
    ) -> Self {
        Self::Tag(Tag::new(begin, content, end))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::PlainText(_) => Kind::PlainText,
            Self::Regex(_) => Kind::Regex,
            Self::JsonSchema(_) => Kind::JsonSchema,
            Self::Ebnf(_) => Kind::Ebnf,
            Self::ConstString(_) => Kind::ConstString,
            Self::AnyText(_) => Kind::AnyText,
            Self::QwenXmlParametersFormat(_) => Kind::QwenXmlParametersFormat,
            Self::Concat(_) => Kind::Concat,
            Self::Union(_) => Kind::Union,
            Self::Tag(_) => Kind::Tag,
            Self::TriggeredTags(_) => Kind::TriggeredTags,
            Self::TagsWithSeparator(_) => Kind::TagsWithSeparator,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind().is_leaf()
    }

    pub fn is_compound(&self) -> bool {
        self.kind().is_compound()
    }

    /// Number of nodes on the longest path from this node down to a leaf, leaves have depth 1.
    pub fn depth(&self) -> usize {
        let children_depth = match self {
            Self::Concat(concat) => max_depth(concat.elements()),
            Self::Union(union) => max_depth(union.elements()),
            Self::Tag(tag) => tag.content().depth(),
            Self::TriggeredTags(triggered) => max_tag_depth(triggered.tags()),
            Self::TagsWithSeparator(separated) => max_tag_depth(separated.tags()),
            _ => 0,
        };
        children_depth + 1
    }

    /// Canonical JSON form of the node.
    pub fn to_json(&self) -> Value {
        match self {
            Self::PlainText(text) => Value::String(text.clone()),
            Self::Regex(regex) => regex.to_json(),
            Self::JsonSchema(schema) => schema.to_json(),
            Self::Ebnf(ebnf) => ebnf.to_json(),
            Self::ConstString(value) => value.to_json(),
            Self::AnyText(any) => any.to_json(),
            Self::QwenXmlParametersFormat(format) => format.to_json(),
            Self::Concat(concat) => concat.to_json(),
            Self::Union(union) => union.to_json(),
            Self::Tag(tag) => tag.to_json(),
            Self::TriggeredTags(triggered) => triggered.to_json(),
            Self::TagsWithSeparator(separated) => separated.to_json(),
        }
    }

    /// Compact canonical JSON text of the node.
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

fn max_depth(elements: &[StructuralTag]) -> usize {
    elements
        .iter()
        .map(StructuralTag::depth)
        .max()
        .unwrap_or(0)
}

fn max_tag_depth(tags: &[Tag]) -> usize {
    tags.iter().map(Tag::depth).max().unwrap_or(0)
}

impl fmt::Display for StructuralTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node: &dyn fmt::Display = match self {
            Self::PlainText(text) => return write!(f, "\"{text}\""),
            Self::Regex(regex) => regex,
            Self::JsonSchema(schema) => schema,
            Self::Ebnf(ebnf) => ebnf,
            Self::ConstString(value) => value,
            Self::AnyText(any) => any,
            Self::QwenXmlParametersFormat(format) => format,
            Self::Concat(concat) => concat,
            Self::Union(union) => union,
            Self::Tag(tag) => tag,
            Self::TriggeredTags(triggered) => triggered,
            Self::TagsWithSeparator(separated) => separated,
        };
        fmt::Display::fmt(node, f)
    }
}

impl Serialize for StructuralTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StructuralTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(&value).map_err(D::Error::custom)
    }
}

impl TryFrom<&Value> for StructuralTag {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        from_value(value)
    }
}

impl From<&str> for StructuralTag {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_string())
    }
}

impl From<String> for StructuralTag {
    fn from(text: String) -> Self {
        Self::PlainText(text)
    }
}

// Writes `Kind("payload")` for single-payload leaves.
macro_rules! string_leaf {
    ($(#[$meta:meta])* $name:ident, $field:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            $field: String,
        }

        impl $name {
            pub fn new($field: impl Into<String>) -> Self {
                Self {
                    $field: $field.into(),
                }
            }

            pub fn $field(&self) -> &str {
                &self.$field
            }

            pub fn to_json(&self) -> Value {
                json!({
                    "type": $kind.discriminator(),
                    "value": self.$field,
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(\"{}\")", $kind, self.$field)
            }
        }

        impl From<$name> for StructuralTag {
            fn from(node: $name) -> Self {
                StructuralTag::$name(node)
            }
        }
    };
}

string_leaf!(
    /// Text matching a regular expression.
    Regex,
    pattern,
    Kind::Regex
);
string_leaf!(
    /// Valid instance of a JSON Schema, the schema text is kept opaque.
    JsonSchema,
    schema,
    Kind::JsonSchema
);
string_leaf!(
    /// Text matching an EBNF grammar.
    Ebnf,
    grammar,
    Kind::Ebnf
);
string_leaf!(
    /// A fixed string.
    ConstString,
    value,
    Kind::ConstString
);
string_leaf!(
    /// Tool call parameters in Qwen XML format, described by the parameters' JSON schema.
    QwenXmlParametersFormat,
    json_schema,
    Kind::QwenXmlParametersFormat
);

/// Unconstrained text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AnyText;

impl AnyText {
    pub fn new() -> Self {
        Self
    }

    pub fn to_json(&self) -> Value {
        json!({ "type": Kind::AnyText.discriminator() })
    }
}

impl fmt::Display for AnyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", Kind::AnyText)
    }
}

impl From<AnyText> for StructuralTag {
    fn from(node: AnyText) -> Self {
        StructuralTag::AnyText(node)
    }
}

/// Minimal number of elements of `Concat` and `Union`.
pub const MIN_ELEMENTS: usize = 2;

fn check_arity(kind: Kind, elements: &[StructuralTag]) -> Result<()> {
    if elements.len() < MIN_ELEMENTS {
        return Err(Error::ArityError {
            kind,
            expected: MIN_ELEMENTS,
            actual: elements.len(),
        });
    }
    Ok(())
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(item, f)?;
    }
    Ok(())
}

/// Structural tags matched in sequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Concat {
    elements: Vec<StructuralTag>,
}

impl Concat {
    pub fn new(elements: Vec<StructuralTag>) -> Result<Self> {
        check_arity(Kind::Concat, &elements)?;
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[StructuralTag] {
        &self.elements
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": Kind::Concat.discriminator(),
            "tags": self.elements.iter().map(StructuralTag::to_json).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Concat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", Kind::Concat)?;
        write_list(f, &self.elements)?;
        f.write_str(")")
    }
}

impl From<Concat> for StructuralTag {
    fn from(node: Concat) -> Self {
        StructuralTag::Concat(node)
    }
}

/// Alternatives, exactly one of them is matched.
///
/// Order of the alternatives is kept in the canonical form, it carries no matching priority.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Union {
    elements: Vec<StructuralTag>,
}

impl Union {
    pub fn new(elements: Vec<StructuralTag>) -> Result<Self> {
        check_arity(Kind::Union, &elements)?;
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[StructuralTag] {
        &self.elements
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": Kind::Union.discriminator(),
            "tags": self.elements.iter().map(StructuralTag::to_json).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", Kind::Union)?;
        write_list(f, &self.elements)?;
        f.write_str(")")
    }
}

impl From<Union> for StructuralTag {
    fn from(node: Union) -> Self {
        StructuralTag::Union(node)
    }
}

/// Content wrapped by fixed `begin` and `end` delimiters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    begin: String,
    content: Box<StructuralTag>,
    end: String,
}

impl Tag {
    pub fn new(
        begin: impl Into<String>,
        content: impl Into<StructuralTag>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            begin: begin.into(),
            content: Box::new(content.into()),
            end: end.into(),
        }
    }

    pub fn begin(&self) -> &str {
        &self.begin
    }

    pub fn content(&self) -> &StructuralTag {
        &self.content
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    fn depth(&self) -> usize {
        self.content.depth() + 1
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": Kind::Tag.discriminator(),
            "begin": self.begin,
            "content": self.content.to_json(),
            "end": self.end,
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(\"{}\", {}, \"{}\")",
            Kind::Tag,
            self.begin,
            self.content,
            self.end
        )
    }
}

impl From<Tag> for StructuralTag {
    fn from(node: Tag) -> Self {
        StructuralTag::Tag(node)
    }
}

impl TryFrom<StructuralTag> for Tag {
    type Error = Error;

    fn try_from(node: StructuralTag) -> Result<Self> {
        match node {
            StructuralTag::Tag(tag) => Ok(tag),
            other => Err(Error::type_error(Kind::Tag.name(), other.kind().name())),
        }
    }
}

// Keeps the first occurrence of every trigger.
fn dedup_triggers(triggers: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut seen = HashSet::default();
    triggers
        .into_iter()
        .map(Into::into)
        .filter(|trigger: &String| seen.insert(trigger.clone()))
        .collect()
}

// Converts every element to a `Tag`, locating the first one that isn't.
fn tags_from_elements(kind: Kind, elements: Vec<StructuralTag>) -> Result<Vec<Tag>> {
    elements
        .into_iter()
        .enumerate()
        .map(|(i, element)| {
            Tag::try_from(element).map_err(|e| e.at(format!("{kind}.{}[{i}]", types::TAGS)))
        })
        .collect()
}

struct TagList<'a>(&'a [Tag]);

impl fmt::Display for TagList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        write_list(f, self.0)?;
        f.write_str("]")
    }
}

/// Tags gated by trigger strings: a tag may only be matched once one of the triggers is observed.
///
/// Triggers form a set, equality and hashing ignore their order.
#[derive(Clone, Debug)]
pub struct TriggeredTags {
    triggers: Vec<String>,
    tags: Vec<Tag>,
    at_least_one: bool,
    stop_after_first: bool,
}

impl TriggeredTags {
    pub fn new(
        triggers: impl IntoIterator<Item = impl Into<String>>,
        tags: Vec<Tag>,
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Self {
        Self {
            triggers: dedup_triggers(triggers),
            tags,
            at_least_one,
            stop_after_first,
        }
    }

    /// Same as [`TriggeredTags::new`], but every element must be a `Tag` node.
    pub fn from_elements(
        triggers: impl IntoIterator<Item = impl Into<String>>,
        elements: Vec<StructuralTag>,
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Result<Self> {
        let tags = tags_from_elements(Kind::TriggeredTags, elements)?;
        Ok(Self::new(triggers, tags, at_least_one, stop_after_first))
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn trigger_set(&self) -> HashSet<&str> {
        self.triggers.iter().map(String::as_str).collect()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn at_least_one(&self) -> bool {
        self.at_least_one
    }

    pub fn stop_after_first(&self) -> bool {
        self.stop_after_first
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": Kind::TriggeredTags.discriminator(),
            "triggers": self.triggers,
            "tags": self.tags.iter().map(Tag::to_json).collect::<Vec<_>>(),
            "at_least_one": self.at_least_one,
            "stop_after_first": self.stop_after_first,
        })
    }
}

impl PartialEq for TriggeredTags {
    fn eq(&self, other: &Self) -> bool {
        self.at_least_one == other.at_least_one
            && self.stop_after_first == other.stop_after_first
            && self.tags == other.tags
            && self.trigger_set() == other.trigger_set()
    }
}

impl Eq for TriggeredTags {}

impl Hash for TriggeredTags {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut triggers: Vec<&str> = self.triggers.iter().map(String::as_str).collect();
        triggers.sort_unstable();
        triggers.hash(state);
        self.tags.hash(state);
        self.at_least_one.hash(state);
        self.stop_after_first.hash(state);
    }
}

impl fmt::Display for TriggeredTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(triggers=[", Kind::TriggeredTags)?;
        for (i, trigger) in self.triggers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "\"{trigger}\"")?;
        }
        write!(
            f,
            "], tags={}, at_least_one={}, stop_after_first={})",
            TagList(&self.tags),
            self.at_least_one,
            self.stop_after_first
        )
    }
}

impl From<TriggeredTags> for StructuralTag {
    fn from(node: TriggeredTags) -> Self {
        StructuralTag::TriggeredTags(node)
    }
}

/// Tags repeated and joined by a separator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagsWithSeparator {
    tags: Vec<Tag>,
    separator: String,
    at_least_one: bool,
    stop_after_first: bool,
}

impl TagsWithSeparator {
    pub fn new(
        tags: Vec<Tag>,
        separator: impl Into<String>,
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Self {
        Self {
            tags,
            separator: separator.into(),
            at_least_one,
            stop_after_first,
        }
    }

    /// Same as [`TagsWithSeparator::new`], but every element must be a `Tag` node.
    pub fn from_elements(
        elements: Vec<StructuralTag>,
        separator: impl Into<String>,
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Result<Self> {
        let tags = tags_from_elements(Kind::TagsWithSeparator, elements)?;
        Ok(Self::new(tags, separator, at_least_one, stop_after_first))
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn at_least_one(&self) -> bool {
        self.at_least_one
    }

    pub fn stop_after_first(&self) -> bool {
        self.stop_after_first
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": Kind::TagsWithSeparator.discriminator(),
            "tags": self.tags.iter().map(Tag::to_json).collect::<Vec<_>>(),
            "separator": self.separator,
            "at_least_one": self.at_least_one,
            "stop_after_first": self.stop_after_first,
        })
    }
}

impl fmt::Display for TagsWithSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(tags={}, separator=\"{}\", at_least_one={}, stop_after_first={})",
            Kind::TagsWithSeparator,
            TagList(&self.tags),
            self.separator,
            self.at_least_one,
            self.stop_after_first
        )
    }
}

impl From<TagsWithSeparator> for StructuralTag {
    fn from(node: TagsWithSeparator) -> Self {
        StructuralTag::TagsWithSeparator(node)
    }
}
