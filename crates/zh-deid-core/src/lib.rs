pub mod analyzer;
pub mod anonymizer;
pub mod audit;
pub mod builtin;
pub mod config;
pub mod detection;
pub mod ehr;
pub mod engine;
pub mod error;
pub mod offsets;
pub mod pattern;
pub mod profile;
pub mod prompt_loader;
pub mod recognizer;
pub mod registry;
pub mod service;
pub mod validator;


pub use analyzer::{resolve_overlaps, Analyzer, AnalyzerSettings};
pub use anonymizer::{AnonymizedItem, AnonymizedText, Anonymizer, OperatorConfig};
pub use audit::{validate_and_store, AuditRecord, AuditStatistics, AuditStore};
pub use builtin::{default_replacements, RecognizerKind, DEFAULT_LANGUAGE};
pub use config::{
    AnalyzerConfig, AuditConfig, Config, LlmConfig, LogRotation, LoggingConfig, ProfileConfig,
};
pub use detection::Detection;
pub use ehr::{EhrGenerator, PatientRecord, PlantedValues};
pub use engine::{AnonymizeOutcome, DeidEngine};
pub use error::{DeidError, DeidResult};
pub use pattern::{Pattern, PatternDescriptor};
pub use profile::{load_profile, Profile, ProfileStore, ProfileSummary, MEDICAL_RECORDS_PROFILE};
pub use prompt_loader::PromptLoader;
pub use recognizer::{ContextSettings, Recognizer};
pub use registry::{RecognizerDescriptor, RecognizerRegistry};
pub use service::{AnonymizeRequest, AnonymizeResponse, DeidService, DetectedEntity};
pub use validator::{PiiValidator, ValidationVerdict};
