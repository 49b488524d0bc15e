//! Persistent record of which candidates have already been reported.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use fpn_core::CandidateId;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeEntry {
    pub candidate_id: CandidateId,
    pub notified: bool,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Atomic get-or-insert. New entries start with `notified = false`.
    async fn find_or_create(
        &self,
        candidate_id: CandidateId,
    ) -> Result<(DedupeEntry, bool), PersistenceError>;

    /// Idempotently flips `notified` to true. Never resets it.
    async fn mark_notified(&self, candidate_id: CandidateId) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone)]
enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// sqlx-backed store. `postgres://` URLs use Postgres, anything else is treated as SQLite.
#[derive(Debug, Clone)]
pub struct SqlDedupeStore {
    pool: DbPool,
    op_timeout: Duration,
}

impl SqlDedupeStore {
    pub async fn connect(database_url: &str, op_timeout: Duration) -> Result<Self, PersistenceError> {
        let pool = if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(op_timeout)
                .connect(database_url)
                .await?;
            DbPool::Postgres(pool)
        } else if database_url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(op_timeout)
                .connect_with(options)
                .await?;
            DbPool::Sqlite(pool)
        } else {
            return Err(PersistenceError::UnsupportedUrl(database_url.to_string()));
        };

        Ok(Self { pool, op_timeout })
    }

    /// Create the dedupe table when missing. Safe to call on every start.
    pub async fn init(&self) -> Result<(), PersistenceError> {
        const DDL: &str = r#"
            CREATE TABLE IF NOT EXISTS fpn_projects (
                project_id BIGINT PRIMARY KEY,
                notified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;
        self.bounded(async {
            match &self.pool {
                DbPool::Sqlite(pool) => sqlx::query(DDL).execute(pool).await.map(|_| ()),
                DbPool::Postgres(pool) => sqlx::query(DDL).execute(pool).await.map(|_| ()),
            }
        })
        .await?;
        info!(backend = self.backend_name(), "dedupe store ready");
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.pool {
            DbPool::Sqlite(_) => "sqlite",
            DbPool::Postgres(_) => "postgres",
        }
    }

    pub async fn get(&self, candidate_id: CandidateId) -> Result<Option<DedupeEntry>, PersistenceError> {
        let row = self
            .bounded(async {
                match &self.pool {
                    DbPool::Sqlite(pool) => {
                        sqlx::query("SELECT notified FROM fpn_projects WHERE project_id = ?")
                            .bind(candidate_id)
                            .fetch_optional(pool)
                            .await?
                            .map(|r| r.try_get::<bool, _>("notified"))
                            .transpose()
                    }
                    DbPool::Postgres(pool) => {
                        sqlx::query("SELECT notified FROM fpn_projects WHERE project_id = $1")
                            .bind(candidate_id)
                            .fetch_optional(pool)
                            .await?
                            .map(|r| r.try_get::<bool, _>("notified"))
                            .transpose()
                    }
                }
            })
            .await?;

        Ok(row.map(|notified| DedupeEntry {
            candidate_id,
            notified,
        }))
    }

    async fn insert_if_absent(&self, candidate_id: CandidateId) -> Result<bool, PersistenceError> {
        let affected = self
            .bounded(async {
                match &self.pool {
                    DbPool::Sqlite(pool) => sqlx::query(
                        "INSERT INTO fpn_projects (project_id, notified) VALUES (?, FALSE) \
                         ON CONFLICT (project_id) DO NOTHING",
                    )
                    .bind(candidate_id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected()),
                    DbPool::Postgres(pool) => sqlx::query(
                        "INSERT INTO fpn_projects (project_id, notified) VALUES ($1, FALSE) \
                         ON CONFLICT (project_id) DO NOTHING",
                    )
                    .bind(candidate_id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected()),
                }
            })
            .await?;
        Ok(affected == 1)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, PersistenceError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(PersistenceError::from),
            Err(_) => Err(PersistenceError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl DedupeStore for SqlDedupeStore {
    async fn find_or_create(
        &self,
        candidate_id: CandidateId,
    ) -> Result<(DedupeEntry, bool), PersistenceError> {
        let created = self.insert_if_absent(candidate_id).await?;
        if created {
            return Ok((
                DedupeEntry {
                    candidate_id,
                    notified: false,
                },
                true,
            ));
        }
        // Row predates this call; it is never deleted, so it must still be there.
        let entry = self.get(candidate_id).await?.unwrap_or(DedupeEntry {
            candidate_id,
            notified: false,
        });
        Ok((entry, false))
    }

    async fn mark_notified(&self, candidate_id: CandidateId) -> Result<(), PersistenceError> {
        self.bounded(async {
            match &self.pool {
                DbPool::Sqlite(pool) => sqlx::query(
                    "INSERT INTO fpn_projects (project_id, notified) VALUES (?, TRUE) \
                     ON CONFLICT (project_id) DO UPDATE SET notified = TRUE",
                )
                .bind(candidate_id)
                .execute(pool)
                .await
                .map(|_| ()),
                DbPool::Postgres(pool) => sqlx::query(
                    "INSERT INTO fpn_projects (project_id, notified) VALUES ($1, TRUE) \
                     ON CONFLICT (project_id) DO UPDATE SET notified = TRUE",
                )
                .bind(candidate_id)
                .execute(pool)
                .await
                .map(|_| ()),
            }
        })
        .await
    }
}

/// Process-local store; loses its contents on restart.
#[derive(Debug, Default)]
pub struct MemoryDedupeStore {
    entries: Mutex<HashMap<CandidateId, bool>>,
}

impl MemoryDedupeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, candidate_id: CandidateId) -> Option<DedupeEntry> {
        self.entries
            .lock()
            .await
            .get(&candidate_id)
            .map(|&notified| DedupeEntry {
                candidate_id,
                notified,
            })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DedupeStore for MemoryDedupeStore {
    async fn find_or_create(
        &self,
        candidate_id: CandidateId,
    ) -> Result<(DedupeEntry, bool), PersistenceError> {
        let mut entries = self.entries.lock().await;
        let mut created = false;
        let notified = *entries.entry(candidate_id).or_insert_with(|| {
            created = true;
            false
        });
        Ok((
            DedupeEntry {
                candidate_id,
                notified,
            },
            created,
        ))
    }

    async fn mark_notified(&self, candidate_id: CandidateId) -> Result<(), PersistenceError> {
        self.entries.lock().await.insert(candidate_id, true);
        Ok(())
    }
}
