//! 异步 SQLite 快照存储
//!
//! 使用 sqlx 提供完全异步的数据库操作。manifest 与 blob 在同一事务中写入；
//! seq 自增列记录写入顺序。需要启用 `async-sqlite` feature。

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::core::SnapshotError;
use crate::snapshot::manifest::{ManifestQuery, ManifestScan, SnapshotManifest};
use crate::snapshot::storage::SnapshotStorage;

impl From<sqlx::Error> for SnapshotError {
    fn from(e: sqlx::Error) -> Self {
        SnapshotError::Backend(e.to_string())
    }
}

pub struct SqliteSnapshotStorage {
    pool: SqlitePool,
}

impl SqliteSnapshotStorage {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let storage = Self { pool };
        storage.init_tables().await?;
        Ok(storage)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn init_tables(&self) -> Result<(), SnapshotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshot_manifests (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                trigger_text TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                metadata TEXT NOT NULL,
                blob_ref TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshot_blobs (
                blob_ref TEXT PRIMARY KEY,
                data BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_manifests_correlation ON snapshot_manifests(correlation_id, seq)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn manifest_from_row(row: &SqliteRow) -> Result<SnapshotManifest, SnapshotError> {
    let created_at: String = row.try_get("created_at")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(SnapshotManifest {
        id: row.try_get("id")?,
        trigger: row.try_get("trigger_text")?,
        correlation_id: row.try_get("correlation_id")?,
        run_id: row.try_get("run_id")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| SnapshotError::Backend(format!("bad created_at: {e}")))?
            .with_timezone(&Utc),
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata)?,
        blob_ref: row.try_get("blob_ref")?,
    })
}

#[async_trait]
impl SnapshotStorage for SqliteSnapshotStorage {
    async fn put(&self, manifest: &SnapshotManifest, blob: Vec<u8>) -> Result<(), SnapshotError> {
        let metadata = serde_json::to_string(&manifest.metadata)?;
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM snapshot_manifests WHERE id = ?")
            .bind(&manifest.id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(SnapshotError::DuplicateId(manifest.id.clone()));
        }

        sqlx::query("INSERT INTO snapshot_blobs (blob_ref, data) VALUES (?, ?)")
            .bind(&manifest.blob_ref)
            .bind(blob)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO snapshot_manifests (id, trigger_text, correlation_id, run_id, created_at, metadata, blob_ref)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&manifest.id)
        .bind(&manifest.trigger)
        .bind(&manifest.correlation_id)
        .bind(&manifest.run_id)
        .bind(manifest.created_at.to_rfc3339())
        .bind(metadata)
        .bind(&manifest.blob_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>, SnapshotError> {
        let row = sqlx::query("SELECT * FROM snapshot_manifests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(manifest_from_row).transpose()
    }

    async fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let row = sqlx::query(
            "SELECT b.data FROM snapshot_blobs b
             JOIN snapshot_manifests m ON m.blob_ref = b.blob_ref
             WHERE m.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(r) => Some(r.try_get::<Vec<u8>, _>("data")?),
            None => None,
        })
    }

    async fn scan(&self, query: &ManifestQuery) -> Result<ManifestScan, SnapshotError> {
        let rows = match &query.correlation_id {
            Some(c) => {
                sqlx::query("SELECT * FROM snapshot_manifests WHERE correlation_id = ? ORDER BY seq")
                    .bind(c)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM snapshot_manifests ORDER BY seq")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        let matched = rows
            .iter()
            .map(manifest_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ManifestScan::from_matched(matched, query.limit))
    }
}
