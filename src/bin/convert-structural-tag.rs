use serde_json::Value;
use structured_output_core::prelude::*;
use tracing_subscriber::EnvFilter;

// Keys which mark the input as a structured output config rather than a single tag.
const CONFIG_KEYS: [&str; 5] = [
    "json_schema",
    "regex",
    "grammar",
    "structural_tags_config",
    "compound_grammar",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let input = std::io::read_to_string(std::io::stdin())?;
    let value: Value = serde_json::from_str(&input)?;

    let is_config = value.as_object().is_some_and(|obj| {
        !obj.contains_key("type") && CONFIG_KEYS.iter().any(|key| obj.contains_key(*key))
    });
    if is_config {
        let config = StructuredOutputConfig::from_value(&value)?;
        config.validate()?;
        println!("Config: {}", config);
        println!("{}", serde_json::to_string_pretty(&config.to_json()?)?);
    } else {
        let tag = structural_tag::from_value(&value)?;
        println!("StructuralTag: {}", tag);
        println!("Depth: {}", tag.depth());
        println!("{}", serde_json::to_string_pretty(&tag.to_json())?);
    }
    Ok(())
}
