//! Audit trail of anonymization results using SQLite
//!
//! Each anonymized request can be recorded together with the detections and
//! the optional LLM verdict for later review. Recording is best-effort and
//! runs after the response has been produced.

use crate::config::AuditConfig;
use crate::detection::Detection;
use crate::validator::{PiiValidator, ValidationVerdict};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub id: String,
    pub original_text: String,
    pub anonymized_text: String,
    pub validation: Option<ValidationVerdict>,
    pub detections: Vec<Detection>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditStatistics {
    pub total_results: i64,
    pub validated_results: i64,
    /// Results the validator flagged as still containing PII.
    pub flagged_results: i64,
    pub entity_counts: HashMap<String, i64>,
}

pub struct AuditStore {
    conn: Connection,
    config: AuditConfig,
}

impl AuditStore {
    pub fn new(config: AuditConfig) -> Result<Self> {
        let conn = if config.database_path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.database_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(&config.database_path)?
        };

        let mut store = Self { conn, config };
        store.initialize_schema()?;
        store.cleanup_expired()?;

        info!("Initialized audit store at {:?}", store.config.database_path);
        Ok(store)
    }

    fn initialize_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS validation_results (
                id TEXT PRIMARY KEY,
                original_text TEXT NOT NULL,
                anonymized_text TEXT NOT NULL,
                validation TEXT,
                detections TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_validation_created_at
             ON validation_results(created_at)",
            [],
        )?;

        debug!("Audit schema initialized");
        Ok(())
    }

    pub fn store_result(
        &mut self,
        original_text: &str,
        anonymized_text: &str,
        validation: Option<&ValidationVerdict>,
        detections: &[Detection],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let validation_json = validation.map(serde_json::to_string).transpose()?;
        let detections_json = serde_json::to_string(detections)?;

        self.conn.execute(
            "INSERT INTO validation_results
             (id, original_text, anonymized_text, validation, detections, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                original_text,
                anonymized_text,
                validation_json,
                detections_json,
                now
            ],
        )?;

        debug!(
            "Stored audit record {} with {} detections",
            id,
            detections.len()
        );
        Ok(id)
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, original_text, anonymized_text, validation, detections, created_at
             FROM validation_results
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, original_text, anonymized_text, validation, detections, created_at) = row?;
            records.push(AuditRecord {
                id,
                original_text,
                anonymized_text,
                validation: validation
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?,
                detections: serde_json::from_str(&detections)?,
                created_at: created_at as u64,
            });
        }

        Ok(records)
    }

    pub fn cleanup_expired(&mut self) -> Result<usize> {
        let Some(retention_days) = self.config.retention_days else {
            return Ok(0);
        };

        let cutoff_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)?
            .as_secs()
            .saturating_sub(retention_days as u64 * 24 * 60 * 60);

        let deleted = self.conn.execute(
            "DELETE FROM validation_results WHERE created_at < ?1",
            params![cutoff_time],
        )?;

        if deleted > 0 {
            info!(
                "Cleaned up {} audit records older than {} days",
                deleted, retention_days
            );
        }
        Ok(deleted)
    }

    pub fn statistics(&self) -> Result<AuditStatistics> {
        let (total_results, validated_results, flagged_results): (i64, i64, i64) =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COUNT(validation),
                        COALESCE(SUM(json_extract(validation, '$.contains_pii') = 1), 0)
                 FROM validation_results",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let mut stmt = self.conn.prepare(
            "SELECT json_extract(d.value, '$.entity_type'), COUNT(*)
             FROM validation_results r, json_each(r.detections) d
             GROUP BY 1",
        )?;
        let entity_counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(AuditStatistics {
            total_results,
            validated_results,
            flagged_results,
            entity_counts,
        })
    }
}

/// Validate the anonymized text (when a validator is configured) and record
/// the outcome. Failures are logged and swallowed.
pub async fn validate_and_store(
    validator: Option<&PiiValidator>,
    store: &Mutex<AuditStore>,
    original_text: &str,
    anonymized_text: &str,
    detections: &[Detection],
) {
    let verdict = match validator {
        Some(validator) => match validator.validate(anonymized_text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("Residual PII validation failed: {}", e);
                None
            }
        },
        None => None,
    };

    let mut store = store.lock().await;
    if let Err(e) = store.store_result(original_text, anonymized_text, verdict.as_ref(), detections) {
        error!("Failed to store audit record: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn memory_config() -> AuditConfig {
        AuditConfig {
            enabled: true,
            database_path: PathBuf::from(":memory:"),
            retention_days: Some(30),
        }
    }

    fn detection(entity: &str, start: usize, end: usize) -> Detection {
        Detection {
            entity_type: entity.to_string(),
            start,
            end,
            score: 0.9,
            recognizer: "test".to_string(),
            pattern: "test".to_string(),
        }
    }

    #[test]
    fn test_store_and_read_back() {
        let mut store = AuditStore::new(memory_config()).unwrap();
        let detections = vec![detection("PERSON", 0, 2), detection("PHONE_NUMBER", 6, 17)];
        let verdict = ValidationVerdict {
            contains_pii: false,
            identified_pii: vec![],
        };

        let id = store
            .store_result(
                "张三，电话：13800138000",
                "<NAME>，电话：<PHONE>",
                Some(&verdict),
                &detections,
            )
            .unwrap();

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].anonymized_text, "<NAME>，电话：<PHONE>");
        assert_eq!(records[0].validation, Some(verdict));
        assert_eq!(records[0].detections, detections);
    }

    #[test]
    fn test_recent_limit_and_order() {
        let mut store = AuditStore::new(memory_config()).unwrap();
        for i in 0..5 {
            store
                .store_result(&format!("原文{}", i), &format!("结果{}", i), None, &[])
                .unwrap();
        }

        let records = store.recent(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original_text, "原文4");
        assert_eq!(records[1].original_text, "原文3");
        assert!(records[0].validation.is_none());
    }

    #[test]
    fn test_statistics() {
        let mut store = AuditStore::new(memory_config()).unwrap();
        let flagged = ValidationVerdict {
            contains_pii: true,
            identified_pii: vec!["李四".to_string()],
        };
        let clean = ValidationVerdict {
            contains_pii: false,
            identified_pii: vec![],
        };

        store
            .store_result("a", "a", Some(&flagged), &[detection("PERSON", 0, 1)])
            .unwrap();
        store
            .store_result(
                "b",
                "b",
                Some(&clean),
                &[detection("PERSON", 0, 1), detection("ID_CARD", 2, 3)],
            )
            .unwrap();
        store.store_result("c", "c", None, &[]).unwrap();

        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_results, 3);
        assert_eq!(stats.validated_results, 2);
        assert_eq!(stats.flagged_results, 1);
        assert_eq!(stats.entity_counts.get("PERSON"), Some(&2));
        assert_eq!(stats.entity_counts.get("ID_CARD"), Some(&1));
    }

    #[test]
    fn test_cleanup_expired() {
        let mut store = AuditStore::new(memory_config()).unwrap();
        store.store_result("old", "old", None, &[]).unwrap();
        store.store_result("new", "new", None, &[]).unwrap();

        let forty_days_ago = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 40 * 24 * 60 * 60;
        store
            .conn
            .execute(
                "UPDATE validation_results SET created_at = ?1 WHERE original_text = 'old'",
                params![forty_days_ago],
            )
            .unwrap();

        assert_eq!(store.cleanup_expired().unwrap(), 1);
        let remaining = store.recent(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].original_text, "new");
    }

    #[test]
    fn test_no_retention_keeps_everything() {
        let mut config = memory_config();
        config.retention_days = None;
        let mut store = AuditStore::new(config).unwrap();
        store.store_result("x", "x", None, &[]).unwrap();
        assert_eq!(store.cleanup_expired().unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = AuditConfig {
            database_path: temp_dir.path().join("audit").join("audit.db"),
            ..memory_config()
        };

        AuditStore::new(config.clone())
            .unwrap()
            .store_result("原文", "结果", None, &[])
            .unwrap();

        let reopened = AuditStore::new(config).unwrap();
        assert_eq!(reopened.statistics().unwrap().total_results, 1);
    }

    #[tokio::test]
    async fn test_validate_and_store_without_validator() {
        let store = Mutex::new(AuditStore::new(memory_config()).unwrap());
        validate_and_store(None, &store, "张三", "<NAME>", &[detection("PERSON", 0, 2)]).await;

        let records = store.lock().await.recent(1).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].validation.is_none());
    }
}
