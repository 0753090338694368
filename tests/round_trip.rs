//! Property-based tests for the canonical JSON form
//!
//! Reading back the canonical JSON of any structural tag gives an equal tag.

use proptest::prelude::*;
use structured_output_core::prelude::*;

/// Payload text, including characters that need escaping in JSON
fn payload_strategy() -> impl Strategy<Value = String> + Clone {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,12}",
        "[a-z<>/=\"{}:,_.*+?|()\\\\-]{0,12}",
        Just(String::new()),
    ]
}

fn leaf_strategy() -> impl Strategy<Value = StructuralTag> {
    prop_oneof![
        payload_strategy().prop_map(StructuralTag::PlainText),
        payload_strategy().prop_map(StructuralTag::regex),
        payload_strategy().prop_map(StructuralTag::json_schema),
        payload_strategy().prop_map(StructuralTag::ebnf),
        payload_strategy().prop_map(StructuralTag::const_string),
        payload_strategy().prop_map(StructuralTag::qwen_xml_parameters_format),
        Just(StructuralTag::any_text()),
    ]
}

fn structural_tag_strategy() -> impl Strategy<Value = StructuralTag> {
    leaf_strategy().prop_recursive(4, 32, 4, |inner| {
        let tag = (payload_strategy(), inner.clone(), payload_strategy())
            .prop_map(|(begin, content, end)| Tag::new(begin, content, end));
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(|elements| {
                StructuralTag::concat(elements).expect("Two or more elements")
            }),
            prop::collection::vec(inner, 2..4).prop_map(|elements| {
                StructuralTag::union(elements).expect("Two or more elements")
            }),
            tag.clone().prop_map(StructuralTag::Tag),
            (
                prop::collection::vec(payload_strategy(), 0..3),
                prop::collection::vec(tag.clone(), 0..3),
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(triggers, tags, at_least_one, stop_after_first)| {
                    StructuralTag::from(TriggeredTags::new(
                        triggers,
                        tags,
                        at_least_one,
                        stop_after_first,
                    ))
                }),
            (
                prop::collection::vec(tag, 0..3),
                payload_strategy(),
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(tags, separator, at_least_one, stop_after_first)| {
                    StructuralTag::from(TagsWithSeparator::new(
                        tags,
                        separator,
                        at_least_one,
                        stop_after_first,
                    ))
                }),
        ]
    })
}

proptest! {
    #[test]
    fn canonical_json_reads_back(tag in structural_tag_strategy()) {
        prop_assert_eq!(structural_tag::from_value(&tag.to_json()), Ok(tag.clone()));
        prop_assert_eq!(structural_tag::from_str(&tag.to_json_string()), Ok(tag));
    }

    #[test]
    fn serde_reads_back(tag in structural_tag_strategy()) {
        let json = serde_json::to_string(&tag).expect("Serializable tag");
        let read: StructuralTag = serde_json::from_str(&json).expect("Readable tag");
        prop_assert_eq!(read, tag);
    }

    #[test]
    fn canonical_json_is_stable(tag in structural_tag_strategy()) {
        let read = structural_tag::from_value(&tag.to_json()).expect("Readable tag");
        prop_assert_eq!(read.to_json_string(), tag.to_json_string());
        prop_assert_eq!(read.to_string(), tag.to_string());
    }

    #[test]
    fn bare_strings_are_plain_text(text in ".*") {
        prop_assert_eq!(
            structural_tag::from_value(&serde_json::Value::String(text.clone())),
            Ok(StructuralTag::PlainText(text))
        );
    }

    #[test]
    fn config_reads_back(tag in structural_tag_strategy(), regex in payload_strategy()) {
        for config in [
            StructuredOutputConfig::new().with_structural_tag(tag.clone()),
            StructuredOutputConfig::new().with_regex(regex.clone()),
        ] {
            let value = config.to_json().expect("Serializable config");
            prop_assert_eq!(StructuredOutputConfig::from_value(&value), Ok(config));
        }
    }
}
