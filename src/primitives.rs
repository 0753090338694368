//! Defines fundamental types used throughout the crate.

use serde_json::{Map, Value};

/// String-keyed map of dynamically typed options, as supplied by a calling application.
pub type OptionMap = Map<String, Value>;
