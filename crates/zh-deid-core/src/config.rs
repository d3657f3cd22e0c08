//! Configuration management for zh-deid

use crate::analyzer::{AnalyzerSettings, DEFAULT_SCORE_THRESHOLD};
use crate::builtin::DEFAULT_LANGUAGE;
use crate::profile::MEDICAL_RECORDS_PROFILE;
use crate::recognizer::{ContextSettings, DEFAULT_CONTEXT_BOOST, DEFAULT_CONTEXT_WINDOW};
use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub language: String,
    pub score_threshold: f64,
    pub context_window: usize,
    pub context_boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Profile to load; `None` selects the store's default profile.
    pub name: Option<String>,
    pub database_path: Option<PathBuf>,
    /// A TOML or JSON profile file, used instead of the database.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub database_path: PathBuf,
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub prompt_template: Option<String>,
}

/// Optional log file output in addition to stderr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files; unset disables file logging.
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: "zh-deid.log".to_string(),
            rotation: LogRotation::Daily,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            context_window: DEFAULT_CONTEXT_WINDOW,
            context_boost: DEFAULT_CONTEXT_BOOST,
        }
    }
}

impl AnalyzerConfig {
    pub fn settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            score_threshold: self.score_threshold,
            context: ContextSettings {
                window: self.context_window,
                boost: self.context_boost,
            },
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: Some(MEDICAL_RECORDS_PROFILE.to_string()),
            database_path: Some(PathBuf::from("profiles.db")),
            file: None,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_path: PathBuf::from("audit.db"),
            retention_days: Some(90),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "llama3.2:3b".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            timeout_seconds: 300,
            prompt_template: None,
        }
    }
}

fn is_in_memory(path: &Path) -> bool {
    path == Path::new(":memory:")
}

impl Config {
    pub fn get_app_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "zh-deid", "zh-deid")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine application directories"))
    }

    /// Anchor relative database and log paths in the application data
    /// directory.
    pub fn resolve_paths(&mut self) -> Result<()> {
        let needs_profile_db = self
            .profile
            .database_path
            .as_deref()
            .is_some_and(|p| p.is_relative() && !is_in_memory(p));
        let needs_audit_db =
            self.audit.database_path.is_relative() && !is_in_memory(&self.audit.database_path);
        let needs_log_dir = self
            .logging
            .directory
            .as_deref()
            .is_some_and(Path::is_relative);

        if !needs_profile_db && !needs_audit_db && !needs_log_dir {
            return Ok(());
        }

        let project_dirs = Self::get_app_dirs()?;
        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        if needs_profile_db {
            if let Some(path) = self.profile.database_path.take() {
                self.profile.database_path = Some(data_dir.join(path));
            }
        }
        if needs_audit_db {
            self.audit.database_path = data_dir.join(&self.audit.database_path);
        }
        if needs_log_dir {
            if let Some(dir) = self.logging.directory.take() {
                self.logging.directory = Some(data_dir.join(dir));
            }
        }

        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.resolve_paths()?;
        Ok(config)
    }

    /// Load `path` if given, else the default config file when it exists,
    /// else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let default_path = Self::get_default_config_path()?;
        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            let mut config = Self::default();
            config.resolve_paths()?;
            Ok(config)
        }
    }

    pub fn get_default_config_path() -> Result<PathBuf> {
        let project_dirs = Self::get_app_dirs()?;
        let config_dir = project_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.join("zh-deid.toml"))
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.analyzer.language.trim().is_empty() {
            return Err(anyhow::anyhow!("Analyzer language must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.analyzer.score_threshold) {
            return Err(anyhow::anyhow!("Score threshold must be between 0.0 and 1.0"));
        }

        if !(0.0..=1.0).contains(&self.analyzer.context_boost) {
            return Err(anyhow::anyhow!("Context boost must be between 0.0 and 1.0"));
        }

        if self.logging.file_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Log file name must not be empty"));
        }

        if self.analyzer.context_window == 0 {
            return Err(anyhow::anyhow!("Context window must be at least one character"));
        }

        if let Some(ref llm) = self.llm {
            if llm.enabled && llm.timeout_seconds == 0 {
                return Err(anyhow::anyhow!("LLM timeout must be greater than zero"));
            }
        }

        if self.audit.enabled && !is_in_memory(&self.audit.database_path) {
            if let Some(parent) = self.audit.database_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        Ok(())
    }
}
