//! Static vocabulary of the canonical JSON form: node kinds, their discriminators
//! and the field names used by every kind.

use std::fmt;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap as HashMap;

/// Discriminator field of every object node.
pub static TYPE: &str = "type";
/// Payload of single-string leaves.
pub static VALUE: &str = "value";
pub static TAGS: &str = "tags";
pub static ELEMENTS: &str = "elements";
pub static BEGIN: &str = "begin";
pub static CONTENT: &str = "content";
pub static END: &str = "end";
pub static TRIGGERS: &str = "triggers";
pub static SEPARATOR: &str = "separator";
pub static AT_LEAST_ONE: &str = "at_least_one";
pub static STOP_AFTER_FIRST: &str = "stop_after_first";

/// Kinds of structural tag nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    PlainText,
    Regex,
    JsonSchema,
    Ebnf,
    ConstString,
    AnyText,
    QwenXmlParametersFormat,
    Concat,
    Union,
    Tag,
    TriggeredTags,
    TagsWithSeparator,
}

impl Kind {
    /// Discriminated kinds, in the order ingestion checks them.
    ///
    /// `PlainText` has no discriminator, it is represented by a bare string.
    pub const DISCRIMINATED: [Kind; 11] = [
        Kind::Regex,
        Kind::JsonSchema,
        Kind::Ebnf,
        Kind::ConstString,
        Kind::AnyText,
        Kind::QwenXmlParametersFormat,
        Kind::Concat,
        Kind::Union,
        Kind::Tag,
        Kind::TriggeredTags,
        Kind::TagsWithSeparator,
    ];

    /// Name used by the debug rendering.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::PlainText => "PlainText",
            Kind::Regex => "Regex",
            Kind::JsonSchema => "JSONSchema",
            Kind::Ebnf => "EBNF",
            Kind::ConstString => "ConstString",
            Kind::AnyText => "AnyText",
            Kind::QwenXmlParametersFormat => "QwenXMLParametersFormat",
            Kind::Concat => "Concat",
            Kind::Union => "Union",
            Kind::Tag => "Tag",
            Kind::TriggeredTags => "TriggeredTags",
            Kind::TagsWithSeparator => "TagsWithSeparator",
        }
    }

    /// Canonical discriminator written to the `type` field.
    pub fn discriminator(&self) -> Option<&'static str> {
        self.discriminators().first().copied()
    }

    /// All discriminators accepted on ingestion, canonical one first.
    pub fn discriminators(&self) -> &'static [&'static str] {
        match self {
            Kind::PlainText => &[],
            Kind::Regex => &["regex"],
            Kind::JsonSchema => &["json_schema"],
            Kind::Ebnf => &["grammar", "ebnf"],
            Kind::ConstString => &["const_string"],
            Kind::AnyText => &["any_text"],
            Kind::QwenXmlParametersFormat => &["qwen_xml_params", "qwen_xml_parameter"],
            Kind::Concat => &["concat", "sequence"],
            Kind::Union => &["union", "or"],
            Kind::Tag => &["tag"],
            Kind::TriggeredTags => &["triggered_tags"],
            Kind::TagsWithSeparator => &["tags_with_separator"],
        }
    }

    /// Resolves a discriminator, canonical or alias.
    pub fn from_discriminator(discriminator: &str) -> Option<Kind> {
        DISCRIMINATOR_TABLE.get(discriminator).copied()
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_compound()
    }

    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Kind::Concat | Kind::Union | Kind::Tag | Kind::TriggeredTags | Kind::TagsWithSeparator
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// First registration of a discriminator wins.
static DISCRIMINATOR_TABLE: Lazy<HashMap<&'static str, Kind>> = Lazy::new(|| {
    let mut table = HashMap::default();
    for kind in Kind::DISCRIMINATED {
        for discriminator in kind.discriminators() {
            table.entry(*discriminator).or_insert(kind);
        }
    }
    table
});
