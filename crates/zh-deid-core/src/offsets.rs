//! Conversion between byte offsets and character offsets.
//!
//! Regex matches report byte offsets, but detections are expressed in
//! characters so that callers slicing Chinese text by code point get the
//! right span.

#[derive(Debug, Clone)]
pub struct CharIndex {
    // byte offset of every char start, followed by the total byte length
    boundaries: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Number of characters in the indexed text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Character offset of a byte offset that lies on a char boundary.
    /// Offsets inside a multi-byte char round down to the char's start.
    pub fn char_offset(&self, byte: usize) -> usize {
        match self.boundaries.binary_search(&byte) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        }
    }

    /// Byte offset of a character offset, clamped to the end of the text.
    pub fn byte_offset(&self, char_offset: usize) -> usize {
        let last = self.boundaries.len() - 1;
        self.boundaries[char_offset.min(last)]
    }

    /// Byte range covering the character range `start..end`.
    pub fn byte_range(&self, start: usize, end: usize) -> std::ops::Range<usize> {
        self.byte_offset(start)..self.byte_offset(end)
    }
}

/// Slice `text` by character offsets.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let index = CharIndex::new(text);
    &text[index.byte_range(start, end)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_offsets_are_identity() {
        let index = CharIndex::new("abc");
        assert_eq!(index.char_len(), 3);
        assert_eq!(index.char_offset(2), 2);
        assert_eq!(index.byte_offset(3), 3);
    }

    #[test]
    fn test_multibyte_offsets() {
        let text = "张三，13800138000";
        let index = CharIndex::new(text);

        assert_eq!(index.char_len(), 14);
        // 张 三 ， are three bytes each
        assert_eq!(index.byte_offset(3), 9);
        assert_eq!(index.char_offset(9), 3);
        assert_eq!(index.char_offset(text.len()), 14);
        assert_eq!(&text[index.byte_range(0, 2)], "张三");
    }

    #[test]
    fn test_empty_text() {
        let index = CharIndex::new("");
        assert_eq!(index.char_len(), 0);
        assert_eq!(index.byte_offset(0), 0);
        assert_eq!(index.byte_offset(5), 0);
    }

    #[test]
    fn test_char_slice() {
        assert_eq!(char_slice("患者王五，住院号", 2, 4), "王五");
        assert_eq!(char_slice("abc", 1, 10), "bc");
    }
}
