//! Analyzer: runs every applicable recognizer, thresholds the candidates and
//! resolves overlaps into a deterministic, start-ordered detection list.

use crate::detection::Detection;
use crate::offsets::CharIndex;
use crate::recognizer::ContextSettings;
use crate::registry::RecognizerRegistry;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    pub score_threshold: f64,
    pub context: ContextSettings,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            context: ContextSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    registry: Arc<RecognizerRegistry>,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(registry: Arc<RecognizerRegistry>, settings: AnalyzerSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &RecognizerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn analyze(
        &self,
        text: &str,
        language: &str,
        entity_filter: Option<&HashSet<String>>,
    ) -> Vec<Detection> {
        if text.is_empty() {
            return Vec::new();
        }

        if !self.registry.supports_language(language) {
            warn!("No recognizers registered for language '{}'", language);
            return Vec::new();
        }

        let index = CharIndex::new(text);
        let mut candidates = Vec::new();

        for recognizer in self.registry.recognizers_for(language) {
            if let Some(filter) = entity_filter {
                if !filter.contains(recognizer.entity_type()) {
                    continue;
                }
            }
            candidates.extend(recognizer.recognize_indexed(text, &index, &self.settings.context));
        }

        let raw_count = candidates.len();
        candidates.retain(|d| d.score >= self.settings.score_threshold);

        let detections = resolve_overlaps(candidates);
        assert_detections_valid(&detections, index.char_len());

        debug!(
            "Analyzed {} chars: {} candidates, {} accepted",
            index.char_len(),
            raw_count,
            detections.len()
        );
        detections
    }
}

/// Ranking used for overlap resolution: higher score, then longer span,
/// then earlier start.
fn precedence(a: &Detection, b: &Detection) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.start.cmp(&b.start))
}

/// Greedily keep the best-ranked detections that do not intersect an
/// already kept one. The result is sorted by `start`.
pub fn resolve_overlaps(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.retain(|d| !d.is_empty());
    candidates.sort_by(precedence);

    // accepted spans keyed by start; they never overlap each other
    let mut accepted: BTreeMap<usize, Detection> = BTreeMap::new();

    for candidate in candidates {
        // Only the accepted span with the greatest start before the
        // candidate's end can reach into it.
        let blocked = accepted
            .range(..candidate.end)
            .next_back()
            .is_some_and(|(_, kept)| kept.end > candidate.start);

        if blocked {
            debug!(
                "Discarding {} {}..{} (score {:.2}) due to overlap",
                candidate.entity_type, candidate.start, candidate.end, candidate.score
            );
            continue;
        }
        accepted.insert(candidate.start, candidate);
    }

    accepted.into_values().collect()
}

/// Panics when detections are unsorted, overlapping or out of bounds.
pub(crate) fn assert_detections_valid(detections: &[Detection], char_len: usize) {
    for detection in detections {
        assert!(
            detection.start < detection.end && detection.end <= char_len,
            "detection {}..{} outside text of {} chars",
            detection.start,
            detection.end,
            char_len
        );
    }
    for pair in detections.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "detections {}..{} and {}..{} overlap or are unsorted",
            pair[0].start,
            pair[0].end,
            pair[1].start,
            pair[1].end
        );
    }
}
