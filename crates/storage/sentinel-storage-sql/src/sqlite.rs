//! SQLite adapter implementing the sentinel store capabilities
//!
//! The event log assigns its dense per-scan sequence inside a transaction;
//! re-appending an already-sequenced event is an `INSERT OR IGNORE`, which
//! makes orchestrator-level retries idempotent on `(scan_id, event_seq)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::ports::{AuditStore, CheckpointStore, ConfigStore, EventStore};
use sentinel_core::types::{AuditRecord, Checkpoint, ScanEvent, ScanStatus};
use sentinel_core::{Result, SentinelError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed store for events, checkpoints, audit records and config
pub struct SqliteScanStore {
    pool: SqlitePool,
}

impl SqliteScanStore {
    /// Open (or create) the database at the given path
    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Opening SQLite database at: {}", database_path);

        let opts = SqliteConnectOptions::from_str(database_path)
            .map_err(|e| SentinelError::database(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(SentinelError::DatabaseSqlx)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| SentinelError::database(format!("Invalid SQLite URL: {}", e)))?;

        // A single connection keeps every query on the same memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(SentinelError::DatabaseSqlx)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        debug!("Initializing SQLite schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_event (
                scan_id TEXT NOT NULL,
                event_seq INTEGER NOT NULL,
                type TEXT NOT NULL,
                space_key TEXT,
                page_id TEXT,
                ts TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (scan_id, event_seq)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_checkpoint (
                scan_id TEXT NOT NULL,
                space_key TEXT NOT NULL,
                last_page_id TEXT,
                last_attachment_name TEXT,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scan_id, space_key)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pii_access_audit (
                id TEXT PRIMARY KEY,
                scan_id TEXT NOT NULL,
                purpose TEXT NOT NULL,
                pii_count INTEGER NOT NULL,
                accessed_at TEXT NOT NULL,
                retention_until TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scan_event_type ON scan_event(scan_id, type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scan_event_page ON scan_event(scan_id, page_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_retention ON pii_access_audit(retention_until)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set a configuration value (operator tooling and tests)
    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_config (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanEvent> {
        let payload: String = row.get("payload_json");
        let event: ScanEvent = serde_json::from_str(&payload)?;
        Ok(event)
    }

    fn checkpoint_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
        let status: String = row.get("status");
        let updated_at: String = row.get("updated_at");
        Ok(Checkpoint {
            scan_id: row.get("scan_id"),
            space_key: row.get("space_key"),
            last_page_id: row.get("last_page_id"),
            last_attachment_name: row.get("last_attachment_name"),
            // Invalid persisted statuses read back as Running
            status: ScanStatus::from_persisted(&status),
            updated_at: parse_ts(&updated_at)?,
        })
    }

    fn audit_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditRecord> {
        let id: String = row.get("id");
        let accessed_at: String = row.get("accessed_at");
        let retention_until: String = row.get("retention_until");
        let pii_count: i64 = row.get("pii_count");
        Ok(AuditRecord {
            id: uuid::Uuid::parse_str(&id)
                .map_err(|e| SentinelError::database(format!("Invalid audit id: {}", e)))?,
            scan_id: row.get("scan_id"),
            purpose: row.get("purpose"),
            pii_count: pii_count.max(0) as u64,
            accessed_at: parse_ts(&accessed_at)?,
            retention_until: parse_ts(&retention_until)?,
        })
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SentinelError::database(format!("Invalid timestamp {:?}: {}", value, e)))
}

#[async_trait]
impl EventStore for SqliteScanStore {
    async fn append(&self, event: &ScanEvent) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if event.event_seq > 0 {
            let payload = serde_json::to_string(event)?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO scan_event
                    (scan_id, event_seq, type, space_key, page_id, ts, payload_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(&event.scan_id)
            .bind(event.event_seq as i64)
            .bind(event.label())
            .bind(&event.space_key)
            .bind(&event.page_id)
            .bind(event.ts.to_rfc3339())
            .bind(payload)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(event.event_seq);
        }

        let row = sqlx::query(
            "SELECT COALESCE(MAX(event_seq), 0) + 1 AS next FROM scan_event WHERE scan_id = ?",
        )
        .bind(&event.scan_id)
        .fetch_one(&mut *tx)
        .await?;
        let next: i64 = row.get("next");

        let mut stored = event.clone();
        stored.event_seq = next as u64;
        let payload = serde_json::to_string(&stored)?;

        sqlx::query(
            r#"
            INSERT INTO scan_event
                (scan_id, event_seq, type, space_key, page_id, ts, payload_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&stored.scan_id)
        .bind(next)
        .bind(stored.label())
        .bind(&stored.space_key)
        .bind(&stored.page_id)
        .bind(stored.ts.to_rfc3339())
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(next as u64)
    }

    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<ScanEvent>> {
        let rows = sqlx::query(
            "SELECT payload_json FROM scan_event WHERE scan_id = ? ORDER BY event_seq",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::event_from_row).collect()
    }

    async fn list_by_scan_and_types(
        &self,
        scan_id: &str,
        types: &[&str],
    ) -> Result<Vec<ScanEvent>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT payload_json FROM scan_event WHERE scan_id = ? AND type IN ({}) ORDER BY event_seq",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(scan_id);
        for t in types {
            query = query.bind(*t);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::event_from_row).collect()
    }

    async fn list_item_events(&self, scan_id: &str, page_id: &str) -> Result<Vec<ScanEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT payload_json FROM scan_event
            WHERE scan_id = ? AND page_id = ? AND type IN ('item', 'attachmentItem')
            ORDER BY event_seq
        "#,
        )
        .bind(scan_id)
        .bind(page_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::event_from_row).collect()
    }

    async fn count_by_type(&self, scan_id: &str) -> Result<HashMap<String, u64>> {
        let rows = sqlx::query(
            "SELECT type, COUNT(*) AS n FROM scan_event WHERE scan_id = ? GROUP BY type",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let label: String = row.get("type");
                let n: i64 = row.get("n");
                (label, n.max(0) as u64)
            })
            .collect())
    }

    async fn latest_scan(&self) -> Result<Option<(String, DateTime<Utc>)>> {
        let row = sqlx::query(
            r#"
            SELECT scan_id, MIN(ts) AS started_at FROM scan_event
            GROUP BY scan_id ORDER BY started_at DESC LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let scan_id: String = row.get("scan_id");
                let started_at: String = row.get("started_at");
                Ok(Some((scan_id, parse_ts(&started_at)?)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for SqliteScanStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_checkpoint
                (scan_id, space_key, last_page_id, last_attachment_name, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(scan_id, space_key) DO UPDATE SET
                last_page_id = excluded.last_page_id,
                last_attachment_name = excluded.last_attachment_name,
                status = excluded.status,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&checkpoint.scan_id)
        .bind(&checkpoint.space_key)
        .bind(&checkpoint.last_page_id)
        .bind(&checkpoint.last_attachment_name)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_scan_and_space(
        &self,
        scan_id: &str,
        space_key: &str,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT * FROM scan_checkpoint WHERE scan_id = ? AND space_key = ?",
        )
        .bind(scan_id)
        .bind(space_key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::checkpoint_from_row).transpose()
    }

    async fn find_by_scan(&self, scan_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM scan_checkpoint WHERE scan_id = ? ORDER BY space_key",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::checkpoint_from_row).collect()
    }

    async fn find_latest_by_space(&self, space_key: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT * FROM scan_checkpoint WHERE space_key = ? ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(space_key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::checkpoint_from_row).transpose()
    }

    async fn delete_by_scan(&self, scan_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scan_checkpoint WHERE scan_id = ?")
            .bind(scan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteScanStore {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pii_access_audit
                (id, scan_id, purpose, pii_count, accessed_at, retention_until)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(record.id.to_string())
        .bind(&record.scan_id)
        .bind(&record.purpose)
        .bind(record.pii_count as i64)
        .bind(record.accessed_at.to_rfc3339())
        .bind(record.retention_until.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM pii_access_audit WHERE scan_id = ? ORDER BY accessed_at DESC",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::audit_from_row).collect()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pii_access_audit WHERE retention_until < ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ConfigStore for SqliteScanStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM scan_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::types::ScanEventKind;

    async fn store() -> SqliteScanStore {
        SqliteScanStore::in_memory().await.unwrap()
    }

    fn event(scan: &str, kind: ScanEventKind) -> ScanEvent {
        ScanEvent::new(scan, kind).in_space("SP")
    }

    #[tokio::test]
    async fn test_append_assigns_dense_sequence_per_scan() {
        let store = store().await;
        for _ in 0..3 {
            store
                .append(&event("s1", ScanEventKind::MultiStart))
                .await
                .unwrap();
        }
        store
            .append(&event("s2", ScanEventKind::MultiStart))
            .await
            .unwrap();

        let seqs: Vec<u64> = EventStore::list_by_scan(&store, "s1")
            .await
            .unwrap()
            .iter()
            .map(|e| e.event_seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let other = EventStore::list_by_scan(&store, "s2").await.unwrap();
        assert_eq!(other[0].event_seq, 1);
    }

    #[tokio::test]
    async fn test_append_idempotent_on_sequenced_event() {
        let store = store().await;
        let mut ev = event("s1", ScanEventKind::MultiStart);
        ev.event_seq = store.append(&ev).await.unwrap();

        let again = store.append(&ev).await.unwrap();
        assert_eq!(again, ev.event_seq);
        assert_eq!(EventStore::list_by_scan(&store, "s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_types_ordered() {
        let store = store().await;
        store
            .append(&event("s1", ScanEventKind::MultiStart))
            .await
            .unwrap();
        store
            .append(&event(
                "s1",
                ScanEventKind::Start {
                    pages_total: 1,
                    analysis_progress_percentage: 0,
                },
            ))
            .await
            .unwrap();
        store
            .append(&event("s1", ScanEventKind::MultiComplete))
            .await
            .unwrap();

        let filtered = store
            .list_by_scan_and_types("s1", &["multiStart", "multiComplete"])
            .await
            .unwrap();
        let labels: Vec<&str> = filtered.iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["multiStart", "multiComplete"]);

        assert!(store
            .list_by_scan_and_types("s1", &[])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_count_by_type() {
        let store = store().await;
        for _ in 0..2 {
            store
                .append(&event("s1", ScanEventKind::Keepalive))
                .await
                .unwrap();
        }
        let counts = store.count_by_type("s1").await.unwrap();
        assert_eq!(counts.get("keepalive"), Some(&2));
    }

    #[tokio::test]
    async fn test_checkpoint_upsert_and_ordering() {
        let store = store().await;
        let mut checkpoint = Checkpoint::running("s1", "ZZ");
        store.save(&checkpoint).await.unwrap();
        checkpoint.space_key = "AA".into();
        checkpoint.last_page_id = Some("p-1".into());
        store.save(&checkpoint).await.unwrap();
        checkpoint.status = ScanStatus::Completed;
        store.save(&checkpoint).await.unwrap();

        let all = store.find_by_scan("s1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].space_key, "AA");
        assert_eq!(all[0].status, ScanStatus::Completed);
        assert_eq!(all[1].space_key, "ZZ");

        let latest = store.find_latest_by_space("AA").await.unwrap().unwrap();
        assert_eq!(latest.scan_id, "s1");

        store.delete_by_scan("s1").await.unwrap();
        assert!(store.find_by_scan("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_status_reads_as_running() {
        let store = store().await;
        sqlx::query(
            r#"
            INSERT INTO scan_checkpoint
                (scan_id, space_key, last_page_id, last_attachment_name, status, updated_at)
            VALUES ('s1', 'SP', NULL, NULL, 'BOGUS', ?)
        "#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let checkpoint = store
            .find_by_scan_and_space("s1", "SP")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.status, ScanStatus::Running);
    }

    #[tokio::test]
    async fn test_audit_record_and_purge() {
        let store = store().await;
        let now = Utc::now();
        let record = AuditRecord {
            id: uuid::Uuid::new_v4(),
            scan_id: "s1".into(),
            purpose: "dashboard".into(),
            pii_count: 3,
            accessed_at: now,
            retention_until: now - chrono::Duration::days(1),
        };
        store.record(&record).await.unwrap();

        let listed = AuditStore::list_by_scan(&store, "s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pii_count, 3);

        let purged = store.purge_expired(now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(AuditStore::list_by_scan(&store, "s1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_config_store() {
        let store = store().await;
        assert!(store.get("policy.allowSecretReveal").await.unwrap().is_none());
        store.set_config("policy.allowSecretReveal", "true").await.unwrap();
        assert_eq!(
            store.get("policy.allowSecretReveal").await.unwrap().as_deref(),
            Some("true")
        );
        assert!(store
            .get_bool("policy.allowSecretReveal", false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_latest_scan_picks_most_recent() {
        let store = store().await;
        let mut older = event("old-scan", ScanEventKind::MultiStart);
        older.ts = Utc::now() - chrono::Duration::hours(2);
        store.append(&older).await.unwrap();

        store
            .append(&event("new-scan", ScanEventKind::MultiStart))
            .await
            .unwrap();

        let (scan_id, _) = store.latest_scan().await.unwrap().unwrap();
        assert_eq!(scan_id, "new-scan");
    }

    #[tokio::test]
    async fn test_on_disk_database_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.db");
        let url = format!("sqlite://{}", path.display());
        let store = SqliteScanStore::new(&url).await.unwrap();
        store
            .append(&event("s1", ScanEventKind::MultiStart))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
