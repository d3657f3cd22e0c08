//! Recognizer registry: the ordered, language-filtered set of active
//! recognizers, built once per profile and shared read-only afterwards.

use crate::builtin::{RecognizerKind, DEFAULT_LANGUAGE};
use crate::error::{DeidError, DeidResult};
use crate::pattern::{Pattern, PatternDescriptor};
use crate::profile::Profile;
use crate::recognizer::Recognizer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Language tag that makes a dynamic recognizer apply to every language.
pub const ANY_LANGUAGE: &str = "*";

/// External description of a recognizer, as stored in a profile.
///
/// `kind` names a built-in table or `"dynamic"`; the remaining fields only
/// matter for dynamic recognizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerDescriptor {
    pub id: i64,
    #[serde(default)]
    pub priority: i64,
    pub kind: String,
    #[serde(default)]
    pub patterns: Vec<PatternDescriptor>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub supported_entity: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl RecognizerDescriptor {
    pub fn builtin(id: i64, priority: i64, kind: RecognizerKind) -> Self {
        Self {
            id,
            priority,
            kind: kind.as_str().to_string(),
            patterns: Vec::new(),
            context: Vec::new(),
            supported_entity: None,
            language: None,
        }
    }

    /// Materialize the descriptor into a recognizer.
    pub fn build(&self) -> DeidResult<Recognizer> {
        let kind: RecognizerKind = self.kind.parse()?;

        match kind.table() {
            Some(builtin) => builtin.build(),
            None => self.build_dynamic(),
        }
    }

    fn build_dynamic(&self) -> DeidResult<Recognizer> {
        let entity = self
            .supported_entity
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DeidError::InvalidDescriptor {
                id: self.id,
                reason: "dynamic recognizer requires supported_entity".to_string(),
            })?;

        if self.patterns.is_empty() {
            return Err(DeidError::InvalidDescriptor {
                id: self.id,
                reason: "dynamic recognizer requires at least one pattern".to_string(),
            });
        }

        let patterns = self
            .patterns
            .iter()
            .map(Pattern::try_from)
            .collect::<DeidResult<Vec<_>>>()?;

        let language = match self.language.as_deref() {
            Some(ANY_LANGUAGE) => None,
            Some(language) => Some(language.to_string()),
            None => Some(DEFAULT_LANGUAGE.to_string()),
        };

        Recognizer::new(
            format!("Dynamic_{}", self.id),
            entity,
            language,
            patterns,
            self.context.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecognizerRegistry {
    supported_languages: BTreeSet<String>,
    recognizers: Vec<Recognizer>,
}

impl RecognizerRegistry {
    pub fn new(supported_languages: impl IntoIterator<Item = String>) -> Self {
        Self {
            supported_languages: supported_languages.into_iter().collect(),
            recognizers: Vec::new(),
        }
    }

    /// Registry holding every built-in recognizer in default order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new([DEFAULT_LANGUAGE.to_string()]);
        registry.add_default_recognizers();
        registry
    }

    /// Build from a profile, skipping descriptors that fail to construct.
    /// Descriptors are applied in ascending priority; ties keep their order.
    pub fn from_profile(profile: &Profile) -> Self {
        let mut registry = Self::new([DEFAULT_LANGUAGE.to_string()]);

        let mut descriptors: Vec<&RecognizerDescriptor> = profile.recognizers.iter().collect();
        descriptors.sort_by_key(|d| d.priority);

        for descriptor in descriptors {
            if let Err(e) = registry.add_descriptor(descriptor) {
                warn!(
                    "Skipping recognizer {} ({}) in profile '{}': {}",
                    descriptor.id, descriptor.kind, profile.name, e
                );
            }
        }

        info!(
            "Built registry for profile '{}' with {} recognizers",
            profile.name,
            registry.len()
        );
        registry
    }

    /// `None` means the configuration source was unavailable: fall back to
    /// the built-in defaults.
    pub fn from_source(profile: Option<&Profile>) -> Self {
        match profile {
            Some(profile) => Self::from_profile(profile),
            None => {
                info!("No profile available, using default recognizers");
                Self::with_defaults()
            }
        }
    }

    pub fn add_default_recognizers(&mut self) {
        for builtin in RecognizerKind::BUILTIN.iter().filter_map(RecognizerKind::table) {
            match builtin.build() {
                Ok(recognizer) => self.add_recognizer(recognizer),
                Err(e) => error!("Built-in recognizer '{}' failed to build: {}", builtin.kind, e),
            }
        }
    }

    pub fn add_recognizer(&mut self, recognizer: Recognizer) {
        if let Some(language) = recognizer.language() {
            self.supported_languages.insert(language.to_string());
        }
        debug!(
            "Registered recognizer '{}' for {}",
            recognizer.name(),
            recognizer.entity_type()
        );
        self.recognizers.push(recognizer);
    }

    pub fn add_descriptor(&mut self, descriptor: &RecognizerDescriptor) -> DeidResult<()> {
        let recognizer = descriptor.build()?;
        self.add_recognizer(recognizer);
        Ok(())
    }

    pub fn supported_languages(&self) -> &BTreeSet<String> {
        &self.supported_languages
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }

    pub fn recognizers(&self) -> &[Recognizer] {
        &self.recognizers
    }

    pub fn recognizers_for(&self, language: &str) -> Vec<&Recognizer> {
        self.recognizers
            .iter()
            .filter(|r| r.supports_language(language))
            .collect()
    }

    /// Entity types the registry can produce.
    pub fn entity_types(&self) -> BTreeSet<&str> {
        self.recognizers.iter().map(Recognizer::entity_type).collect()
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }
}

impl Default for RecognizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
