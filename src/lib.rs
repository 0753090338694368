//! # Structured_output_core
//!
//! `structured_output_core` crate provides the constraint model a generation pipeline
//! uses to restrict model output:
//!
//! - build [`StructuralTag`] trees out of leaves (plain text, regex, JSON schema, EBNF
//!   grammar, ...) and compound nodes (concatenation, alternatives, tags, triggered tags)
//!
//! - render them in a canonical JSON form consumed by a constrained decoding engine
//!
//! - collect a request's constraint in a [`StructuredOutputConfig`]
//!
//! ## `structural_tag`
//!
//! [`structural_tag`] module defines the node types and builds them from dynamically
//! typed values:
//! - [`structural_tag::from_str`]
//! - [`structural_tag::from_value`]
//!
//! Every node can be written back with [`StructuralTag::to_json`], reading that output
//! again gives an equal node. The `Display` implementation gives a compact debug
//! rendering, e.g. `Tag("<a>", Regex("[0-9]+"), "</a>")`.
//!
//! Nesting depth of ingested values is bounded, the bound could be customized with
//! [`structural_tag::Parser::with_max_depth`], otherwise
//! [`structural_tag::DEFAULT_MAX_DEPTH`] is used.
//!
//! ## `StructuredOutputConfig`
//!
//! The config holds at most one of a JSON schema, a regex, an EBNF grammar or a
//! structural tag. The deprecated flat structural tags config is recognized, but any
//! access to it fails with [`Error::UnsupportedLegacyShape`].
//!
//! [`GenerationOptions`] separates the config from the rest of a generation option map.
//!
//! ## Example
//!
//! ```rust
//! # use structured_output_core::Error;
//! use structured_output_core::prelude::*;
//!
//! # fn main() -> Result<(), Error> {
//! // Generation options as supplied by a calling application
//! let options = GenerationOptions::from_str(r#"{
//!     "max_new_tokens": 100,
//!     "structured_output_config": {
//!         "structural_tags_config": {
//!             "type": "triggered_tags",
//!             "triggers": ["<function="],
//!             "tags": [{
//!                 "type": "tag",
//!                 "begin": "<function=get_weather>",
//!                 "content": {"type": "json_schema", "value": {"type": "object"}},
//!                 "end": "</function>"
//!             }],
//!             "at_least_one": true
//!         }
//!     }
//! }"#)?;
//!
//! let config = options.structured_output_config().expect("Config is set");
//! if let Some(Constraint::StructuralTag(tag)) = config.constraint()? {
//!     println!("Constraint: {}", tag);
//!     println!("Grammar for the decoding engine: {}", tag.to_json_string());
//! }
//! println!("Remaining options: {:?}", options.options());
//! # Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod prelude;
pub mod primitives;
pub mod structural_tag;

pub use config::{Constraint, StructuralTagsConfig, StructuredOutputConfig};
pub use error::{Error, Result};
pub use generation::GenerationOptions;
pub use structural_tag::StructuralTag;
