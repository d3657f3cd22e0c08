//! Detected entity spans produced by recognizers and the analyzer

use crate::offsets::char_slice;
use serde::{Deserialize, Serialize};

/// One recognized entity occurrence.
///
/// `start` and `end` are half-open character offsets into the analyzed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub recognizer: String,
    pub pattern: String,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Detection) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The detected substring of `text`.
    pub fn text_in<'a>(&self, text: &'a str) -> &'a str {
        char_slice(text, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(start: usize, end: usize) -> Detection {
        Detection {
            entity_type: "PERSON".to_string(),
            start,
            end,
            score: 0.8,
            recognizer: "person".to_string(),
            pattern: "CHINESE_NAME_PATTERN".to_string(),
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(detection(0, 3).overlaps(&detection(2, 5)));
        assert!(detection(2, 5).overlaps(&detection(0, 3)));
        assert!(!detection(0, 3).overlaps(&detection(3, 5)));
        assert!(detection(0, 10).overlaps(&detection(4, 5)));
    }

    #[test]
    fn test_text_in_uses_char_offsets() {
        let text = "张三，男，45岁。";
        let d = detection(0, 2);
        assert_eq!(d.len(), 2);
        assert_eq!(d.text_in(text), "张三");
    }
}
