//! Anonymizer profiles and their SQLite-backed store
//!
//! A profile selects which recognizers are active and maps entity types to
//! replacement tokens. The engine only consumes the [`Profile`] value; this
//! module also provides the store profiles are usually kept in.

use crate::builtin::{default_replacements, RecognizerKind};
use crate::config::ProfileConfig;
use crate::pattern::PatternDescriptor;
use crate::registry::RecognizerDescriptor;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const MEDICAL_RECORDS_PROFILE: &str = "medical_records";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub recognizers: Vec<RecognizerDescriptor>,
    #[serde(default)]
    pub anonymize_entities: BTreeMap<String, String>,
}

impl Profile {
    /// The stock profile for medical record de-identification.
    pub fn medical_records() -> Self {
        let kinds = [
            RecognizerKind::IdCard,
            RecognizerKind::Phone,
            RecognizerKind::Person,
            RecognizerKind::Address,
            RecognizerKind::Inpatient,
            RecognizerKind::Outpatient,
            RecognizerKind::MedicalTest,
        ];

        let recognizers = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| RecognizerDescriptor::builtin(i as i64 + 1, i as i64 + 1, *kind))
            .collect();

        let anonymize_entities = default_replacements()
            .into_iter()
            .map(|(entity, token)| (entity.to_string(), token.to_string()))
            .collect();

        Self {
            id: 0,
            name: MEDICAL_RECORDS_PROFILE.to_string(),
            description: Some("Default profile for medical record anonymization".to_string()),
            is_default: true,
            recognizers,
            anonymize_entities,
        }
    }

    /// Load a profile from a `.json` file, or TOML for any other extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let profile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            _ => toml::from_str(&contents)?,
        };
        Ok(profile)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => toml::to_string_pretty(self)?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Recognizer fields persisted in the `parameters` JSON column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DescriptorParameters {
    #[serde(default)]
    patterns: Vec<PatternDescriptor>,
    #[serde(default)]
    context: Vec<String>,
    #[serde(default)]
    supported_entity: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub recognizer_count: usize,
}

pub struct ProfileStore {
    conn: Connection,
}

impl ProfileStore {
    pub fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let database_path = database_path.as_ref();
        let conn = if database_path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = database_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(database_path)?
        };

        let store = Self { conn };
        store.initialize_schema()?;

        info!("Opened profile store at {:?}", database_path);
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS anonymizer_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                is_default INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS profile_recognizer_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL REFERENCES anonymizer_profiles(id) ON DELETE CASCADE,
                recognizer_kind TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                parameters TEXT,
                priority INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS profile_replacements (
                profile_id INTEGER NOT NULL REFERENCES anonymizer_profiles(id) ON DELETE CASCADE,
                entity_type TEXT NOT NULL,
                replacement TEXT NOT NULL,
                PRIMARY KEY (profile_id, entity_type)
            );

            CREATE INDEX IF NOT EXISTS idx_settings_profile
             ON profile_recognizer_settings(profile_id, priority);",
        )?;

        debug!("Profile schema initialized");
        Ok(())
    }

    pub fn create_profile(
        &mut self,
        name: &str,
        description: Option<&str>,
        is_default: bool,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        if is_default {
            tx.execute("UPDATE anonymizer_profiles SET is_default = 0", [])?;
        }
        tx.execute(
            "INSERT INTO anonymizer_profiles (name, description, is_default) VALUES (?1, ?2, ?3)",
            params![name, description, is_default],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Created profile '{}' with id {}", name, id);
        Ok(id)
    }

    pub fn add_recognizer_to_profile(
        &mut self,
        profile_id: i64,
        descriptor: &RecognizerDescriptor,
        enabled: bool,
    ) -> Result<i64> {
        let parameters = DescriptorParameters {
            patterns: descriptor.patterns.clone(),
            context: descriptor.context.clone(),
            supported_entity: descriptor.supported_entity.clone(),
            language: descriptor.language.clone(),
        };

        self.conn.execute(
            "INSERT INTO profile_recognizer_settings
             (profile_id, recognizer_kind, enabled, parameters, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile_id,
                descriptor.kind,
                enabled,
                serde_json::to_string(&parameters)?,
                descriptor.priority
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(
            "Added recognizer '{}' to profile {} with priority {}",
            descriptor.kind, profile_id, descriptor.priority
        );
        Ok(id)
    }

    pub fn set_replacement(&mut self, profile_id: i64, entity_type: &str, replacement: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO profile_replacements (profile_id, entity_type, replacement)
             VALUES (?1, ?2, ?3)",
            params![profile_id, entity_type, replacement],
        )?;
        Ok(())
    }

    /// Persist a whole profile; fails if the name is already taken.
    pub fn save_profile(&mut self, profile: &Profile) -> Result<i64> {
        let id = self.create_profile(
            &profile.name,
            profile.description.as_deref(),
            profile.is_default,
        )?;

        for descriptor in &profile.recognizers {
            self.add_recognizer_to_profile(id, descriptor, true)?;
        }
        for (entity_type, replacement) in &profile.anonymize_entities {
            self.set_replacement(id, entity_type, replacement)?;
        }

        Ok(id)
    }

    /// Create the stock medical records profile unless it already exists.
    pub fn seed_medical_records_profile(&mut self) -> Result<i64> {
        if let Some(existing) = self.find_profile_id(MEDICAL_RECORDS_PROFILE)? {
            info!("Profile '{}' already exists", MEDICAL_RECORDS_PROFILE);
            return Ok(existing);
        }
        self.save_profile(&Profile::medical_records())
    }

    fn find_profile_id(&self, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM anonymizer_profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn get_profile(&self, name: &str) -> Result<Option<Profile>> {
        match self.find_profile_id(name)? {
            Some(id) => self.load_profile_by_id(id).map(Some),
            None => {
                debug!("Profile '{}' not found", name);
                Ok(None)
            }
        }
    }

    pub fn get_default_profile(&self) -> Result<Option<Profile>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM anonymizer_profiles WHERE is_default = 1 ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => self.load_profile_by_id(id).map(Some),
            None => Ok(None),
        }
    }

    fn load_profile_by_id(&self, id: i64) -> Result<Profile> {
        let (name, description, is_default): (String, Option<String>, bool) = self.conn.query_row(
            "SELECT name, description, is_default FROM anonymizer_profiles WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT id, recognizer_kind, parameters, priority
             FROM profile_recognizer_settings
             WHERE profile_id = ?1 AND enabled = 1
             ORDER BY priority, id",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut recognizers = Vec::new();
        for row in rows {
            let (setting_id, kind, parameters, priority) = row?;
            let parameters: DescriptorParameters = match parameters.as_deref() {
                None | Some("") => DescriptorParameters::default(),
                Some(json) => match serde_json::from_str(json) {
                    Ok(parameters) => parameters,
                    Err(e) => {
                        warn!("Skipping recognizer setting {} with malformed parameters: {}", setting_id, e);
                        continue;
                    }
                },
            };

            recognizers.push(RecognizerDescriptor {
                id: setting_id,
                priority,
                kind,
                patterns: parameters.patterns,
                context: parameters.context,
                supported_entity: parameters.supported_entity,
                language: parameters.language,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT entity_type, replacement FROM profile_replacements WHERE profile_id = ?1",
        )?;
        let anonymize_entities = stmt
            .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        debug!(
            "Loaded profile '{}' with {} recognizers and {} replacements",
            name,
            recognizers.len(),
            anonymize_entities.len()
        );

        Ok(Profile {
            id,
            name,
            description,
            is_default,
            recognizers,
            anonymize_entities,
        })
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.description, p.is_default,
                    (SELECT COUNT(*) FROM profile_recognizer_settings s
                     WHERE s.profile_id = p.id AND s.enabled = 1)
             FROM anonymizer_profiles p
             ORDER BY p.id",
        )?;

        let profiles = stmt
            .query_map([], |row| {
                Ok(ProfileSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    is_default: row.get(3)?,
                    recognizer_count: row.get::<_, i64>(4)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(profiles)
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM anonymizer_profiles WHERE name = ?1", params![name])?;
        if deleted > 0 {
            warn!("Deleted profile '{}'", name);
        }
        Ok(deleted > 0)
    }
}

/// Resolve the configured profile. Never fails: an unreadable file, a
/// missing database or an unknown profile all yield `None`, which selects
/// the built-in recognizers.
pub fn load_profile(config: &ProfileConfig) -> Option<Profile> {
    if let Some(ref file) = config.file {
        return match Profile::from_file(file) {
            Ok(profile) => {
                info!("Loaded profile '{}' from {}", profile.name, file.display());
                Some(profile)
            }
            Err(e) => {
                warn!("Failed to read profile file {}: {}. Using default recognizers.", file.display(), e);
                None
            }
        };
    }

    let database_path = config.database_path.as_ref()?;
    if database_path != Path::new(":memory:") && !database_path.exists() {
        warn!("Profile database {} does not exist. Using default recognizers.", database_path.display());
        return None;
    }

    let lookup = ProfileStore::new(database_path).and_then(|store| match config.name {
        Some(ref name) => store.get_profile(name),
        None => store.get_default_profile(),
    });

    match lookup {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => {
            warn!("Profile not found. Using default recognizers.");
            None
        }
        Err(e) => {
            warn!("Profile store error: {}. Using default recognizers.", e);
            None
        }
    }
}
