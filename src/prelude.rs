//! Library's interface essentials.

pub use super::config::{Constraint, StructuralTagsConfig, StructuredOutputConfig};
pub use super::generation::GenerationOptions;
pub use super::primitives::OptionMap;
pub use super::structural_tag::{
    self, AnyText, Concat, ConstString, Ebnf, JsonSchema, Kind, QwenXmlParametersFormat,
    Regex, StructuralTag, Tag, TagsWithSeparator, TriggeredTags, Union,
};
