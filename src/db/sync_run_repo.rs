// src/db/sync_run_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::sync::{SyncRun, SyncStatus},
};

// Nome do índice único parcial (um único `running` por integração), ver migrations.
const ONE_RUNNING_PER_INTEGRATION: &str = "sync_runs_one_running_per_integration";

/// Livro-razão das execuções: cria em `running` e fecha exatamente uma vez.
#[async_trait]
pub trait SyncRunLedger: Send + Sync {
    /// Falha com `ConcurrentRunConflict` se a integração já tem um `running`.
    async fn begin(&self, integration_id: Uuid) -> Result<SyncRun, AppError>;

    /// `success` sem falhas, senão `partial`.
    async fn finalize(&self, run_id: Uuid, processed: i32, failed: i32) -> Result<SyncRun, AppError>;

    async fn fail(
        &self,
        run_id: Uuid,
        reason: &str,
        processed: i32,
        failed: i32,
    ) -> Result<SyncRun, AppError>;

    /// Fecha como `failed` os `running` mais antigos que `older_than` (processo que caiu).
    async fn reap_stale(&self, integration_id: Uuid, older_than: DateTime<Utc>) -> Result<u64, AppError>;

    async fn list_recent(&self, integration_id: Uuid, limit: i64) -> Result<Vec<SyncRun>, AppError>;
}

#[derive(Clone)]
pub struct SyncRunRepository {
    pool: PgPool,
}

impl SyncRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn close(
        &self,
        run_id: Uuid,
        status: SyncStatus,
        reason: Option<&str>,
        processed: i32,
        failed: i32,
    ) -> Result<SyncRun, AppError> {
        // `AND status = 'running'`: status terminal nunca é reaberto nem sobrescrito.
        let run = sqlx::query_as::<_, SyncRun>(
            r#"
            UPDATE sync_runs
            SET status = $2,
                failure_reason = $3,
                items_processed = $4,
                items_failed = $5,
                finished_at = GREATEST(NOW(), started_at)
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(reason)
        .bind(processed)
        .bind(failed)
        .fetch_optional(&self.pool)
        .await?;

        run.ok_or(AppError::SyncRunAlreadyClosed(run_id))
    }
}

#[async_trait]
impl SyncRunLedger for SyncRunRepository {
    async fn begin(&self, integration_id: Uuid) -> Result<SyncRun, AppError> {
        sqlx::query_as::<_, SyncRun>(
            r#"
            INSERT INTO sync_runs (integration_id, status, started_at, finished_at)
            VALUES ($1, 'running', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(integration_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(ONE_RUNNING_PER_INTEGRATION)
                {
                    return AppError::ConcurrentRunConflict;
                }
            }
            e.into()
        })
    }

    async fn finalize(&self, run_id: Uuid, processed: i32, failed: i32) -> Result<SyncRun, AppError> {
        self.close(run_id, SyncStatus::for_completed_run(failed), None, processed, failed)
            .await
    }

    async fn fail(
        &self,
        run_id: Uuid,
        reason: &str,
        processed: i32,
        failed: i32,
    ) -> Result<SyncRun, AppError> {
        self.close(run_id, SyncStatus::Failed, Some(reason), processed, failed)
            .await
    }

    async fn reap_stale(&self, integration_id: Uuid, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = 'failed', failure_reason = 'abandoned', finished_at = NOW()
            WHERE integration_id = $1 AND status = 'running' AND started_at < $2
            "#,
        )
        .bind(integration_id)
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_recent(&self, integration_id: Uuid, limit: i64) -> Result<Vec<SyncRun>, AppError> {
        let runs = sqlx::query_as::<_, SyncRun>(
            r#"
            SELECT * FROM sync_runs
            WHERE integration_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(integration_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}
