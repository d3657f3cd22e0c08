//! Atomic detection rule: a named regex with a base confidence score

use crate::error::{DeidError, DeidResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Pattern {
    name: String,
    regex: Regex,
    score: f64,
}

impl Pattern {
    /// Compiles `regex` case-insensitively. A pattern that does not compile,
    /// or whose score is outside `[0, 1]`, is rejected here rather than at
    /// query time.
    pub fn new(name: impl Into<String>, regex: &str, score: f64) -> DeidResult<Self> {
        let name = name.into();

        if !(0.0..=1.0).contains(&score) {
            return Err(DeidError::InvalidScore { name, score });
        }

        let regex = RegexBuilder::new(regex)
            .case_insensitive(true)
            .build()
            .map_err(|source| DeidError::InvalidPattern {
                name: name.clone(),
                source,
            })?;

        Ok(Self { name, regex, score })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Serialized form of a pattern as it appears in profile descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDescriptor {
    pub name: String,
    pub regex: String,
    pub score: f64,
}

impl TryFrom<&PatternDescriptor> for Pattern {
    type Error = DeidError;

    fn try_from(descriptor: &PatternDescriptor) -> DeidResult<Self> {
        Pattern::new(descriptor.name.clone(), &descriptor.regex, descriptor.score)
    }
}
