//! The de-identification engine: an immutable analyzer + anonymizer pair
//! built once from a profile and shared across requests.

use crate::analyzer::{Analyzer, AnalyzerSettings};
use crate::anonymizer::Anonymizer;
use crate::builtin::default_replacements;
use crate::config::AnalyzerConfig;
use crate::detection::Detection;
use crate::profile::Profile;
use crate::registry::RecognizerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of [`DeidEngine::anonymize_text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizeOutcome {
    pub text: String,
    /// Detections in the coordinates of the input text.
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone)]
pub struct DeidEngine {
    analyzer: Analyzer,
    anonymizer: Anonymizer,
    language: String,
    entity_to_replacement: HashMap<String, String>,
    profile_name: Option<String>,
}

impl DeidEngine {
    pub fn new(
        registry: RecognizerRegistry,
        settings: AnalyzerSettings,
        language: impl Into<String>,
        entity_to_replacement: HashMap<String, String>,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(Arc::new(registry), settings),
            anonymizer: Anonymizer::new(),
            language: language.into(),
            entity_to_replacement,
            profile_name: None,
        }
    }

    /// Engine over the built-in recognizers and replacement tokens.
    pub fn with_defaults() -> Self {
        Self::from_profile(None, &AnalyzerConfig::default())
    }

    /// Build from a profile, or from the built-ins when `profile` is `None`.
    /// Profile replacements override the default tokens per entity type.
    pub fn from_profile(profile: Option<&Profile>, config: &AnalyzerConfig) -> Self {
        let registry = RecognizerRegistry::from_source(profile);

        let mut entity_to_replacement: HashMap<String, String> = default_replacements()
            .into_iter()
            .map(|(entity, token)| (entity.to_string(), token.to_string()))
            .collect();
        if let Some(profile) = profile {
            entity_to_replacement.extend(profile.anonymize_entities.clone());
        }

        info!(
            "Engine ready: {} recognizers, language '{}', threshold {}",
            registry.len(),
            config.language,
            config.score_threshold
        );

        let mut engine = Self::new(
            registry,
            config.settings(),
            config.language.clone(),
            entity_to_replacement,
        );
        engine.profile_name = profile.map(|p| p.name.clone());
        engine
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Default language used when a request does not name one.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.profile_name.as_deref()
    }

    pub fn entity_to_replacement(&self) -> &HashMap<String, String> {
        &self.entity_to_replacement
    }

    pub fn analyze(
        &self,
        text: &str,
        language: &str,
        entity_filter: Option<&HashSet<String>>,
    ) -> Vec<Detection> {
        self.analyzer.analyze(text, language, entity_filter)
    }

    pub fn anonymize(
        &self,
        text: &str,
        detections: &[Detection],
        entity_to_replacement: &HashMap<String, String>,
    ) -> String {
        self.anonymizer.anonymize(text, detections, entity_to_replacement)
    }

    /// Analyze then anonymize. Without an explicit mapping the engine's own
    /// replacement tokens are used.
    pub fn anonymize_text(
        &self,
        text: &str,
        language: &str,
        entity_filter: Option<&HashSet<String>>,
        entity_to_replacement: Option<&HashMap<String, String>>,
    ) -> AnonymizeOutcome {
        let detections = self.analyze(text, language, entity_filter);
        let mapping = entity_to_replacement.unwrap_or(&self.entity_to_replacement);
        let anonymized = self.anonymize(text, &detections, mapping);

        debug!("Anonymized text with {} detections", detections.len());

        AnonymizeOutcome {
            text: anonymized,
            detections,
        }
    }
}

impl Default for DeidEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
