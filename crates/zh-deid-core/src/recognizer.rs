//! Pattern recognizer: runs a set of patterns over text and applies
//! context-keyword score boosting

use crate::detection::Detection;
use crate::error::{DeidError, DeidResult};
use crate::offsets::CharIndex;
use crate::pattern::Pattern;
use tracing::debug;

pub const DEFAULT_CONTEXT_WINDOW: usize = 30;
pub const DEFAULT_CONTEXT_BOOST: f64 = 0.35;

/// How context keywords influence a match's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextSettings {
    /// Number of characters before the match searched for keywords.
    pub window: usize,
    /// Added to the base score when a keyword is found, capped at 1.0.
    pub boost: f64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_CONTEXT_WINDOW,
            boost: DEFAULT_CONTEXT_BOOST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recognizer {
    name: String,
    entity_type: String,
    language: Option<String>,
    patterns: Vec<Pattern>,
    context: Vec<String>,
}

impl Recognizer {
    /// `language` of `None` makes the recognizer apply to every language.
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        language: Option<String>,
        patterns: Vec<Pattern>,
        context: Vec<String>,
    ) -> DeidResult<Self> {
        let name = name.into();
        let entity_type = entity_type.into();

        if entity_type.trim().is_empty() {
            return Err(DeidError::InvalidDescriptor {
                id: 0,
                reason: format!("recognizer '{}' has no entity type", name),
            });
        }
        if patterns.is_empty() {
            return Err(DeidError::InvalidDescriptor {
                id: 0,
                reason: format!("recognizer '{}' has no patterns", name),
            });
        }

        let context = context
            .into_iter()
            .map(|keyword| keyword.to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();

        Ok(Self {
            name,
            entity_type,
            language,
            patterns,
            context,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn supports_language(&self, language: &str) -> bool {
        match &self.language {
            None => true,
            Some(own) => own.eq_ignore_ascii_case(language),
        }
    }

    pub fn recognize(&self, text: &str, settings: &ContextSettings) -> Vec<Detection> {
        let index = CharIndex::new(text);
        self.recognize_indexed(text, &index, settings)
    }

    /// Same as [`recognize`](Self::recognize) with a char index the caller
    /// shares across recognizers.
    pub fn recognize_indexed(
        &self,
        text: &str,
        index: &CharIndex,
        settings: &ContextSettings,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();
        if text.is_empty() {
            return detections;
        }

        for pattern in &self.patterns {
            for mat in pattern.regex().find_iter(text) {
                if mat.start() == mat.end() {
                    continue;
                }

                let start = index.char_offset(mat.start());
                let end = index.char_offset(mat.end());
                let score = if self.has_context(text, index, start, settings.window) {
                    (pattern.score() + settings.boost).min(1.0)
                } else {
                    pattern.score()
                };

                debug!(
                    "Recognizer '{}' pattern '{}' matched {}..{} (score {:.2})",
                    self.name,
                    pattern.name(),
                    start,
                    end,
                    score
                );

                detections.push(Detection {
                    entity_type: self.entity_type.clone(),
                    start,
                    end,
                    score,
                    recognizer: self.name.clone(),
                    pattern: pattern.name().to_string(),
                });
            }
        }

        detections
    }

    fn has_context(&self, text: &str, index: &CharIndex, start: usize, window: usize) -> bool {
        if self.context.is_empty() || window == 0 || start == 0 {
            return false;
        }

        let prefix = &text[index.byte_range(start.saturating_sub(window), start)];
        let prefix = prefix.to_lowercase();
        self.context.iter().any(|keyword| prefix.contains(keyword.as_str()))
    }
}
