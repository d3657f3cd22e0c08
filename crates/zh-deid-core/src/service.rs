//! Request boundary around the engine
//!
//! Validates requests, shapes responses and hands every completed request to
//! the audit collaborator in the background. `serve` speaks JSON lines: one
//! request object per input line, one response (or `{"error": ...}`) per
//! output line.

use crate::audit::{validate_and_store, AuditStore};
use crate::config::Config;
use crate::detection::Detection;
use crate::engine::DeidEngine;
use crate::error::{DeidError, DeidResult};
use crate::profile::load_profile;
use crate::prompt_loader::PromptLoader;
use crate::validator::PiiValidator;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizeRequest {
    pub text: String,
    /// Restrict detection to these entity types; absent or empty means all.
    #[serde(default)]
    pub entities: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub entity_type: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizeResponse {
    pub original_text: String,
    pub anonymized_text: String,
    pub detected_entities: Vec<DetectedEntity>,
}

impl DetectedEntity {
    pub fn from_detection(detection: &Detection, text: &str) -> Self {
        Self {
            entity_type: detection.entity_type.clone(),
            text: detection.text_in(text).to_string(),
            start: detection.start,
            end: detection.end,
            score: (detection.score * 100.0).round() / 100.0,
        }
    }
}

pub struct DeidService {
    engine: Arc<DeidEngine>,
    audit: Option<Arc<Mutex<AuditStore>>>,
    validator: Option<Arc<PiiValidator>>,
    pending: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl DeidService {
    pub fn new(
        engine: Arc<DeidEngine>,
        audit: Option<AuditStore>,
        validator: Option<PiiValidator>,
    ) -> Self {
        Self {
            engine,
            audit: audit.map(|store| Arc::new(Mutex::new(store))),
            validator: validator.map(Arc::new),
            pending: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Wire up the engine and its collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let profile = load_profile(&config.profile);
        let engine = Arc::new(DeidEngine::from_profile(profile.as_ref(), &config.analyzer));

        let audit = if config.audit.enabled {
            Some(AuditStore::new(config.audit.clone())?)
        } else {
            None
        };

        let validator = match config.llm {
            Some(ref llm) if llm.enabled && audit.is_some() => {
                Some(PiiValidator::new(llm.clone(), PromptLoader::new()?)?)
            }
            Some(ref llm) if llm.enabled => {
                warn!("LLM validation is enabled but auditing is off; verdicts would be discarded");
                None
            }
            _ => None,
        };

        info!(
            "Service ready: profile {}, audit {}, validation {}",
            engine.profile_name().unwrap_or("<built-in>"),
            if audit.is_some() { "on" } else { "off" },
            if validator.is_some() { "on" } else { "off" }
        );

        Ok(Self::new(engine, audit, validator))
    }

    pub fn engine(&self) -> &DeidEngine {
        &self.engine
    }

    /// Anonymize one request. With auditing enabled this must run inside a
    /// Tokio runtime, since the audit record is written by a spawned task.
    pub fn handle(&self, request: &AnonymizeRequest) -> DeidResult<AnonymizeResponse> {
        if request.text.trim().is_empty() {
            return Err(DeidError::EmptyInput);
        }

        let filter: Option<HashSet<String>> = request
            .entities
            .as_ref()
            .filter(|entities| !entities.is_empty())
            .map(|entities| entities.iter().cloned().collect());
        let language = request.language.as_deref().unwrap_or(self.engine.language());

        let outcome = self
            .engine
            .anonymize_text(&request.text, language, filter.as_ref(), None);

        let detected_entities = outcome
            .detections
            .iter()
            .map(|d| DetectedEntity::from_detection(d, &request.text))
            .collect();

        if let Some(ref audit) = self.audit {
            self.spawn_audit(
                Arc::clone(audit),
                request.text.clone(),
                outcome.text.clone(),
                outcome.detections,
            );
        }

        Ok(AnonymizeResponse {
            original_text: request.text.clone(),
            anonymized_text: outcome.text,
            detected_entities,
        })
    }

    fn spawn_audit(
        &self,
        audit: Arc<Mutex<AuditStore>>,
        original_text: String,
        anonymized_text: String,
        detections: Vec<Detection>,
    ) {
        let validator = self.validator.clone();
        let handle = tokio::spawn(async move {
            validate_and_store(
                validator.as_deref(),
                &audit,
                &original_text,
                &anonymized_text,
                &detections,
            )
            .await;
        });

        match self.pending.lock() {
            Ok(mut pending) => {
                pending.retain(|task| !task.is_finished());
                pending.push(handle);
            }
            Err(e) => error!("Background task list poisoned: {}", e),
        }
    }

    /// Wait for outstanding background audit tasks.
    pub async fn flush(&self) {
        let tasks: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(e) => {
                error!("Background task list poisoned: {}", e);
                return;
            }
        };

        for task in tasks {
            if let Err(e) = task.await {
                error!("Background audit task failed: {}", e);
            }
        }
    }

    /// Handle one JSON line, producing one JSON line (without newline).
    pub fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<AnonymizeRequest>(line) {
            Ok(request) => match self.handle(&request) {
                Ok(response) => serde_json::to_value(response),
                Err(e) => {
                    warn!("Rejected request: {}", e);
                    Ok(serde_json::json!({ "error": e.to_string() }))
                }
            },
            Err(e) => {
                warn!("Malformed request line: {}", e);
                Ok(serde_json::json!({ "error": format!("Invalid request: {}", e) }))
            }
        };

        match response {
            Ok(value) => value.to_string(),
            Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
        }
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line);
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            handled += 1;
            debug!("Handled request #{}", handled);
        }

        info!("EOF on input after {} requests, shutting down", handled);
        self.flush().await;
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<()> {
        info!("Serving JSON lines on stdio");
        self.serve(BufReader::new(stdin()), stdout()).await
    }
}
