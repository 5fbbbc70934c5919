use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::application::ports::{
    EntryUpdate, GetOrCreateOutcome, MetadataStore, StoreError,
};
use crate::domain::{
    CacheEntry, CacheKey, EntryStatus, FileHash, FileId, FileType, Job, JobId, JobStatus,
    SourceType, UploadRecord,
};

/// SQLite-backed metadata store (`metadata.db` under the work dir).
///
/// A single-connection pool serializes every access, which is what makes the
/// `get_or_create` transaction the single-flight point: two concurrent
/// requests for one key can never both observe "absent" and both insert.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        Self::connect(&url).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, StoreError> {
        // One connection, held for the process lifetime: writers serialize
        // through it, and in-memory test databases survive pool churn.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(query_failed)?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&pool)
            .await
            .map_err(query_failed)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                file_id TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                stored_path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_uploads_file_hash ON uploads(file_hash)",
            "CREATE INDEX IF NOT EXISTS idx_uploads_expires_at ON uploads(expires_at)",
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_ref TEXT NOT NULL,
                source_name TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                profile_version TEXT NOT NULL,
                summary_text TEXT,
                bundle_path TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_accessed TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_source ON cache_entries(source_type, source_ref)",
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_status ON cache_entries(status)",
            r#"
            CREATE TABLE IF NOT EXISTS cache_jobs (
                job_id TEXT PRIMARY KEY,
                cache_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (cache_key) REFERENCES cache_entries(cache_key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_cache_jobs_cache_key ON cache_jobs(cache_key)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(query_failed)?;
        }
        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRow(e.to_string())
}

fn upload_from_row(row: &SqliteRow) -> Result<UploadRecord, StoreError> {
    let file_id: String = row.try_get("file_id").map_err(query_failed)?;
    let file_hash: String = row.try_get("file_hash").map_err(query_failed)?;
    let file_type: String = row.try_get("file_type").map_err(query_failed)?;
    let stored_path: String = row.try_get("stored_path").map_err(query_failed)?;
    let size: i64 = row.try_get("size").map_err(query_failed)?;

    Ok(UploadRecord {
        file_id: FileId::parse(&file_id).map_err(corrupt)?,
        original_name: row.try_get("original_name").map_err(query_failed)?,
        size: size as u64,
        mime_type: row.try_get("mime_type").map_err(query_failed)?,
        file_type: FileType::from_str(&file_type).map_err(corrupt)?,
        file_hash: FileHash::parse(&file_hash).map_err(corrupt)?,
        stored_path: stored_path.into(),
        created_at: row.try_get("created_at").map_err(query_failed)?,
        expires_at: row.try_get("expires_at").map_err(query_failed)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<CacheEntry, StoreError> {
    let cache_key: String = row.try_get("cache_key").map_err(query_failed)?;
    let source_type: String = row.try_get("source_type").map_err(query_failed)?;
    let status: String = row.try_get("status").map_err(query_failed)?;

    Ok(CacheEntry {
        cache_key: CacheKey::parse(&cache_key).map_err(corrupt)?,
        source_type: SourceType::from_str(&source_type).map_err(corrupt)?,
        source_ref: row.try_get("source_ref").map_err(query_failed)?,
        source_name: row.try_get("source_name").map_err(query_failed)?,
        status: EntryStatus::from_str(&status).map_err(corrupt)?,
        profile_version: row.try_get("profile_version").map_err(query_failed)?,
        summary_text: row.try_get("summary_text").map_err(query_failed)?,
        bundle_path: row.try_get("bundle_path").map_err(query_failed)?,
        error: row.try_get("error").map_err(query_failed)?,
        created_at: row.try_get("created_at").map_err(query_failed)?,
        updated_at: row.try_get("updated_at").map_err(query_failed)?,
        last_accessed: row.try_get("last_accessed").map_err(query_failed)?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let job_id: String = row.try_get("job_id").map_err(query_failed)?;
    let cache_key: String = row.try_get("cache_key").map_err(query_failed)?;
    let status: String = row.try_get("status").map_err(query_failed)?;

    Ok(Job {
        job_id: JobId::parse(&job_id).map_err(corrupt)?,
        cache_key: CacheKey::parse(&cache_key).map_err(corrupt)?,
        status: JobStatus::from_str(&status).map_err(corrupt)?,
        error: row.try_get("error").map_err(query_failed)?,
        created_at: row.try_get("created_at").map_err(query_failed)?,
        updated_at: row.try_get("updated_at").map_err(query_failed)?,
    })
}

async fn insert_job_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job: &Job,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO cache_jobs (job_id, cache_key, status, error, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.job_id.as_str())
    .bind(job.cache_key.as_str())
    .bind(job.status.as_str())
    .bind(&job.error)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(query_failed)?;
    Ok(())
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    #[instrument(skip(self, record), fields(file_id = %record.file_id))]
    async fn insert_upload(&self, record: &UploadRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO uploads (
                file_id, original_name, size, mime_type, file_type,
                file_hash, stored_path, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.file_id.as_str())
        .bind(&record.original_name)
        .bind(record.size as i64)
        .bind(&record.mime_type)
        .bind(record.file_type.as_str())
        .bind(record.file_hash.as_str())
        .bind(record.stored_path.display().to_string())
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn get_upload(&self, file_id: &FileId) -> Result<Option<UploadRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM uploads WHERE file_id = ?")
            .bind(file_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(upload_from_row).transpose()
    }

    async fn find_live_upload_by_hash(
        &self,
        file_hash: &FileHash,
        now: DateTime<Utc>,
    ) -> Result<Option<UploadRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM uploads
            WHERE file_hash = ? AND expires_at >= ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(file_hash.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;
        row.as_ref().map(upload_from_row).transpose()
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn delete_upload(&self, file_id: &FileId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM uploads WHERE file_id = ?")
            .bind(file_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn count_uploads_at_path(&self, stored_path: &Path) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM uploads WHERE stored_path = ?")
            .bind(stored_path.display().to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        let n: i64 = row.try_get("n").map_err(query_failed)?;
        Ok(n as u64)
    }

    async fn list_expired_uploads(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM uploads WHERE expires_at < ?")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(upload_from_row).collect()
    }

    #[instrument(skip(self), fields(cache_key = %cache_key))]
    async fn get_entry(&self, cache_key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM cache_entries WHERE cache_key = ?")
            .bind(cache_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    #[instrument(skip(self, source_ref, source_name), fields(cache_key = %cache_key, refresh))]
    async fn get_or_create(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
        source_ref: &str,
        source_name: Option<&str>,
        profile_version: &str,
        refresh: bool,
    ) -> Result<GetOrCreateOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        let now = Utc::now();

        let existing = sqlx::query("SELECT * FROM cache_entries WHERE cache_key = ?")
            .bind(cache_key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed)?;
        let existing = existing.as_ref().map(entry_from_row).transpose()?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO cache_entries (
                        cache_key, source_type, source_ref, source_name, status,
                        profile_version, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
                    "#,
                )
                .bind(cache_key.as_str())
                .bind(source_type.as_str())
                .bind(source_ref)
                .bind(source_name)
                .bind(profile_version)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(query_failed)?;

                let job = Job::new(cache_key.clone());
                insert_job_tx(&mut tx, &job).await?;

                let entry = CacheEntry {
                    cache_key: cache_key.clone(),
                    source_type,
                    source_ref: source_ref.to_string(),
                    source_name: source_name.map(String::from),
                    status: EntryStatus::Pending,
                    profile_version: profile_version.to_string(),
                    summary_text: None,
                    bundle_path: None,
                    error: None,
                    created_at: now,
                    updated_at: now,
                    last_accessed: None,
                };
                GetOrCreateOutcome::Enqueue { entry, job }
            }
            // Refresh only resets terminal entries; refreshing an in-flight
            // key adopts the existing work instead of doubling it.
            Some(mut entry) if refresh && entry.status.is_terminal() => {
                sqlx::query(
                    r#"
                    UPDATE cache_entries
                    SET status = 'pending', summary_text = NULL, bundle_path = NULL,
                        error = NULL, profile_version = ?,
                        source_name = COALESCE(?, source_name), updated_at = ?
                    WHERE cache_key = ?
                    "#,
                )
                .bind(profile_version)
                .bind(source_name)
                .bind(now)
                .bind(cache_key.as_str())
                .execute(&mut *tx)
                .await
                .map_err(query_failed)?;

                let job = Job::new(cache_key.clone());
                insert_job_tx(&mut tx, &job).await?;

                entry.status = EntryStatus::Pending;
                entry.summary_text = None;
                entry.bundle_path = None;
                entry.error = None;
                entry.profile_version = profile_version.to_string();
                if entry.source_name.is_none() {
                    entry.source_name = source_name.map(String::from);
                }
                entry.updated_at = now;
                GetOrCreateOutcome::Enqueue { entry, job }
            }
            Some(entry) => match entry.status {
                EntryStatus::Completed => GetOrCreateOutcome::Hit(entry),
                EntryStatus::Failed => GetOrCreateOutcome::Failed(entry),
                EntryStatus::Pending | EntryStatus::Running => {
                    let job_row = sqlx::query(
                        r#"
                        SELECT * FROM cache_jobs
                        WHERE cache_key = ? AND status IN ('pending', 'running')
                        ORDER BY created_at DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(cache_key.as_str())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_failed)?;

                    match job_row.as_ref().map(job_from_row).transpose()? {
                        Some(job) => GetOrCreateOutcome::InFlight { entry, job },
                        None => {
                            // Entry left non-terminal without a live job;
                            // re-create one so the work is not stranded.
                            let job = Job::new(cache_key.clone());
                            insert_job_tx(&mut tx, &job).await?;
                            GetOrCreateOutcome::Enqueue { entry, job }
                        }
                    }
                }
            },
        };

        tx.commit().await.map_err(query_failed)?;
        Ok(outcome)
    }

    #[instrument(skip(self, update), fields(cache_key = %cache_key))]
    async fn update_entry(
        &self,
        cache_key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<(), StoreError> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE cache_entries SET updated_at = ");
        qb.push_bind(Utc::now());

        if let Some(status) = update.status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
            // Completion clears any stale error from an earlier attempt.
            if status == EntryStatus::Completed && update.error.is_none() {
                qb.push(", error = NULL");
            }
        }
        if let Some(summary_text) = update.summary_text {
            qb.push(", summary_text = ");
            qb.push_bind(summary_text);
        }
        if let Some(bundle_path) = update.bundle_path {
            qb.push(", bundle_path = ");
            qb.push_bind(bundle_path);
        }
        if let Some(error) = update.error {
            qb.push(", error = ");
            qb.push_bind(error);
        }
        if let Some(source_name) = update.source_name {
            qb.push(", source_name = ");
            qb.push_bind(source_name);
        }

        qb.push(" WHERE cache_key = ");
        qb.push_bind(cache_key.as_str());

        qb.build().execute(&self.pool).await.map_err(query_failed)?;
        Ok(())
    }

    async fn touch_entry(&self, cache_key: &CacheKey) -> Result<(), StoreError> {
        sqlx::query("UPDATE cache_entries SET last_accessed = ? WHERE cache_key = ?")
            .bind(Utc::now())
            .bind(cache_key.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    #[instrument(skip(self), fields(cache_key = %cache_key))]
    async fn delete_entry(&self, cache_key: &CacheKey) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        sqlx::query("DELETE FROM cache_jobs WHERE cache_key = ?")
            .bind(cache_key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key = ?")
            .bind(cache_key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        tx.commit().await.map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_stale_entries(
        &self,
        cutoff: DateTime<Utc>,
        status: Option<EntryStatus>,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT * FROM cache_entries
                    WHERE COALESCE(last_accessed, updated_at) < ? AND status = ?
                    ORDER BY COALESCE(last_accessed, updated_at) ASC
                    "#,
                )
                .bind(cutoff)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM cache_entries
                    WHERE COALESCE(last_accessed, updated_at) < ?
                    ORDER BY COALESCE(last_accessed, updated_at) ASC
                    "#,
                )
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(query_failed)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn list_entries_by_lru(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM cache_entries ORDER BY COALESCE(last_accessed, updated_at) ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM cache_jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn latest_job_for(&self, cache_key: &CacheKey) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM cache_jobs
            WHERE cache_key = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(cache_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self, error), fields(job_id = %job_id, status = %status))]
    async fn update_job(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE cache_jobs
            SET status = ?, error = COALESCE(?, error), updated_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn sweep_interrupted(&self) -> Result<Vec<JobId>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        let now = Utc::now();

        let rows = sqlx::query(
            "SELECT job_id FROM cache_jobs WHERE status IN ('pending', 'running')",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(query_failed)?;

        let mut swept = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = row.try_get("job_id").map_err(query_failed)?;
            swept.push(JobId::parse(&raw).map_err(corrupt)?);
        }

        sqlx::query(
            r#"
            UPDATE cache_jobs
            SET status = 'failed', error = 'interrupted', updated_at = ?
            WHERE status IN ('pending', 'running')
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        sqlx::query(
            r#"
            UPDATE cache_entries
            SET status = 'failed', error = 'interrupted', updated_at = ?
            WHERE status IN ('pending', 'running')
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        tx.commit().await.map_err(query_failed)?;
        Ok(swept)
    }
}
