//! Offset-safe text rewriting.
//!
//! Detections are applied in one left-to-right pass against the original
//! text's coordinates, so replacements of a different length never shift
//! the spans that follow.

use crate::analyzer::assert_detections_valid;
use crate::detection::Detection;
use crate::offsets::CharIndex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// How a detected span is rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorConfig {
    Replace {
        new_value: String,
    },
    /// Remove the span entirely.
    Redact,
    /// Hex SHA-256 of the span.
    Hash,
    Mask {
        #[serde(default = "default_masking_char")]
        masking_char: char,
        /// Number of characters to mask; `None` masks the whole span.
        #[serde(default)]
        chars_to_mask: Option<usize>,
        #[serde(default)]
        from_end: bool,
    },
}

fn default_masking_char() -> char {
    '*'
}

impl OperatorConfig {
    pub fn replace(new_value: impl Into<String>) -> Self {
        OperatorConfig::Replace {
            new_value: new_value.into(),
        }
    }

    /// Replacement text for the detected span `original`. Replace tokens
    /// are emitted verbatim.
    pub fn apply(&self, original: &str) -> String {
        match self {
            OperatorConfig::Replace { new_value } => new_value.clone(),
            OperatorConfig::Redact => String::new(),
            OperatorConfig::Hash => hex::encode(Sha256::digest(original.as_bytes())),
            OperatorConfig::Mask {
                masking_char,
                chars_to_mask,
                from_end,
            } => mask(original, *masking_char, *chars_to_mask, *from_end),
        }
    }
}

fn mask(original: &str, masking_char: char, chars_to_mask: Option<usize>, from_end: bool) -> String {
    let total = original.chars().count();
    let count = chars_to_mask.unwrap_or(total).min(total);
    let masked_from = if from_end { total - count } else { 0 };
    let masked_to = masked_from + count;

    original
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if (masked_from..masked_to).contains(&i) {
                masking_char
            } else {
                c
            }
        })
        .collect()
}

/// Placeholder used when an entity type has no configured operator.
pub fn default_placeholder(entity_type: &str) -> String {
    format!("<{}>", entity_type)
}

/// One rewritten span. `start`/`end` are character offsets in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedItem {
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedText {
    pub text: String,
    pub items: Vec<AnonymizedItem>,
}

#[derive(Debug, Clone, Default)]
pub struct Anonymizer;

impl Anonymizer {
    pub fn new() -> Self {
        Self
    }

    /// Replace every detection with its mapped token, or `<ENTITY_TYPE>`.
    ///
    /// `detections` must be sorted by start, non-overlapping and within
    /// `text`; anything else is a programming error and panics.
    pub fn anonymize(
        &self,
        text: &str,
        detections: &[Detection],
        entity_to_replacement: &HashMap<String, String>,
    ) -> String {
        let operators: HashMap<String, OperatorConfig> = entity_to_replacement
            .iter()
            .map(|(entity, token)| (entity.clone(), OperatorConfig::replace(token.clone())))
            .collect();

        self.anonymize_with_operators(text, detections, &operators).text
    }

    pub fn anonymize_with_operators(
        &self,
        text: &str,
        detections: &[Detection],
        operators: &HashMap<String, OperatorConfig>,
    ) -> AnonymizedText {
        let index = CharIndex::new(text);
        assert_detections_valid(detections, index.char_len());

        let mut output = String::with_capacity(text.len());
        let mut output_chars = 0;
        let mut items = Vec::with_capacity(detections.len());
        let mut cursor = 0;

        for detection in detections {
            let span = index.byte_range(detection.start, detection.end);

            let untouched = &text[cursor..span.start];
            output.push_str(untouched);
            output_chars += untouched.chars().count();

            let original = &text[span.clone()];
            let replacement = match operators.get(&detection.entity_type) {
                Some(operator) => operator.apply(original),
                None => default_placeholder(&detection.entity_type),
            };

            debug!(
                "Replacing {} at {}..{}",
                detection.entity_type, detection.start, detection.end
            );

            let replacement_chars = replacement.chars().count();
            output.push_str(&replacement);
            items.push(AnonymizedItem {
                entity_type: detection.entity_type.clone(),
                start: output_chars,
                end: output_chars + replacement_chars,
                replacement,
            });
            output_chars += replacement_chars;
            cursor = span.end;
        }

        output.push_str(&text[cursor..]);

        AnonymizedText {
            text: output,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(entity: &str, start: usize, end: usize) -> Detection {
        Detection {
            entity_type: entity.to_string(),
            start,
            end,
            score: 0.9,
            recognizer: "test".to_string(),
            pattern: "test".to_string(),
        }
    }

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replace_with_mapping() {
        let text = "张三，电话：13800138000。";
        let detections = vec![detection("PERSON", 0, 2), detection("PHONE_NUMBER", 6, 17)];
        let result = Anonymizer::new().anonymize(
            text,
            &detections,
            &mapping(&[("PERSON", "<NAME>"), ("PHONE_NUMBER", "<PHONE>")]),
        );

        assert_eq!(result, "<NAME>，电话：<PHONE>。");
    }

    #[test]
    fn test_default_placeholder() {
        let text = "做了心电图";
        let result =
            Anonymizer::new().anonymize(text, &[detection("MEDICAL_TEST", 2, 5)], &HashMap::new());
        assert_eq!(result, "做了<MEDICAL_TEST>");
    }

    #[test]
    fn test_empty_text_and_no_detections() {
        let anonymizer = Anonymizer::new();
        assert_eq!(anonymizer.anonymize("", &[], &HashMap::new()), "");
        assert_eq!(
            anonymizer.anonymize("无敏感信息", &[], &HashMap::new()),
            "无敏感信息"
        );
    }

    #[test]
    fn test_adjacent_spans() {
        let text = "ABCDEF";
        let result = Anonymizer::new().anonymize(
            text,
            &[detection("X", 0, 3), detection("Y", 3, 6)],
            &mapping(&[("X", "1"), ("Y", "22222")]),
        );
        assert_eq!(result, "122222");
    }

    #[test]
    fn test_output_offsets() {
        let text = "患者王五，住院号：ZY12345678";
        let result = Anonymizer::new().anonymize_with_operators(
            text,
            &[detection("PERSON", 2, 4), detection("INPATIENT_NO", 9, 19)],
            &HashMap::from([
                ("PERSON".to_string(), OperatorConfig::replace("<NAME>")),
                ("INPATIENT_NO".to_string(), OperatorConfig::replace("<INPATIENT>")),
            ]),
        );

        assert_eq!(result.text, "患者<NAME>，住院号：<INPATIENT>");
        let first = &result.items[0];
        assert_eq!((first.start, first.end), (2, 8));
        let second = &result.items[1];
        let slice: String = result
            .text
            .chars()
            .skip(second.start)
            .take(second.end - second.start)
            .collect();
        assert_eq!(slice, "<INPATIENT>");
    }

    #[test]
    fn test_redact_operator() {
        let text = "密码123456结束";
        let result = Anonymizer::new().anonymize_with_operators(
            text,
            &[detection("PAYMENT_PASSWORD", 2, 8)],
            &HashMap::from([("PAYMENT_PASSWORD".to_string(), OperatorConfig::Redact)]),
        );
        assert_eq!(result.text, "密码结束");
    }

    #[test]
    fn test_hash_operator_is_stable() {
        let operator = OperatorConfig::Hash;
        let first = operator.apply("张三");
        assert_eq!(first.len(), 64);
        assert_eq!(first, operator.apply("张三"));
        assert_ne!(first, operator.apply("李四"));
    }

    #[test]
    fn test_mask_operator() {
        let full = OperatorConfig::Mask {
            masking_char: '*',
            chars_to_mask: None,
            from_end: false,
        };
        assert_eq!(full.apply("13800138000"), "***********");

        let tail = OperatorConfig::Mask {
            masking_char: '#',
            chars_to_mask: Some(4),
            from_end: true,
        };
        assert_eq!(tail.apply("13800138000"), "1380013####");

        let head = OperatorConfig::Mask {
            masking_char: '*',
            chars_to_mask: Some(20),
            from_end: false,
        };
        assert_eq!(head.apply("张三"), "**");
    }

    #[test]
    fn test_replace_token_is_verbatim() {
        let operator = OperatorConfig::replace("[{entity_type}]");
        assert_eq!(operator.apply("110101199001011234"), "[{entity_type}]");

        let text = "电话：13800138000";
        let mapping = HashMap::from([("PHONE_NUMBER".to_string(), "{entity_type}".to_string())]);
        let result = Anonymizer::new().anonymize(text, &[detection("PHONE_NUMBER", 3, 14)], &mapping);
        assert_eq!(result, "电话：{entity_type}");
    }

    #[test]
    fn test_operator_deserialization() {
        let op: OperatorConfig =
            serde_json::from_str(r#"{"type": "mask", "chars_to_mask": 3}"#).unwrap();
        assert_eq!(
            op,
            OperatorConfig::Mask {
                masking_char: '*',
                chars_to_mask: Some(3),
                from_end: false
            }
        );

        let op: OperatorConfig =
            serde_json::from_str(r#"{"type": "replace", "new_value": "<X>"}"#).unwrap();
        assert_eq!(op, OperatorConfig::replace("<X>"));
    }

    #[test]
    #[should_panic]
    fn test_overlapping_input_panics() {
        Anonymizer::new().anonymize(
            "ABCDEF",
            &[detection("X", 0, 4), detection("Y", 3, 6)],
            &HashMap::new(),
        );
    }
}
