// src/db/integration_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        integration::{
            ErpCredential, ErpKind, Integration, SyncSettings, UpdateSyncSettingsRequest,
            DEFAULT_SYNC_INTERVAL_MINUTES,
        },
        tenancy::TenantPartition,
    },
};

/// Integrações por (tenant, ERP) e as suas configurações de sincronização.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Idempotente em (tenant, kind): reativa e troca a credencial se já existir.
    async fn upsert_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
        credential: &ErpCredential,
    ) -> Result<Integration, AppError>;

    /// Cria as configurações padrão só se ainda não existirem.
    async fn ensure_default_settings(&self, integration_id: Uuid) -> Result<SyncSettings, AppError>;

    /// Soft delete: `active = false`, a linha e o histórico ficam. `false` se não havia linha.
    async fn deactivate_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<bool, AppError>;

    async fn get_active_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError>;

    /// Ativa ou não.
    async fn find_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError>;

    async fn mark_synced(&self, integration_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn get_settings(&self, integration_id: Uuid) -> Result<Option<SyncSettings>, AppError>;

    async fn update_settings(
        &self,
        integration_id: Uuid,
        input: &UpdateSyncSettingsRequest,
    ) -> Result<SyncSettings, AppError>;

    /// Integrações ativas, com sincronização ligada, cujo intervalo já venceu.
    async fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Integration>, AppError>;
}

#[derive(Clone)]
pub struct IntegrationRepository {
    pool: PgPool,
}

impl IntegrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationStore for IntegrationRepository {
    async fn upsert_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
        credential: &ErpCredential,
    ) -> Result<Integration, AppError> {
        let integration = sqlx::query_as::<_, Integration>(
            r#"
            INSERT INTO erp_integrations
                (tenant_id, erp_kind, access_token, refresh_token, token_expires_at, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (tenant_id, erp_kind)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                token_expires_at = EXCLUDED.token_expires_at,
                active = TRUE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(partition.tenant_id())
        .bind(kind)
        .bind(&credential.access_token)
        .bind(credential.refresh_token.as_deref())
        .bind(credential.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(integration)
    }

    async fn ensure_default_settings(&self, integration_id: Uuid) -> Result<SyncSettings, AppError> {
        // DO NOTHING: reconectar não pode apagar as escolhas anteriores do tenant.
        sqlx::query(
            r#"
            INSERT INTO sync_settings (integration_id, sync_products, sync_prices, sync_stock, sync_interval_minutes)
            VALUES ($1, TRUE, TRUE, FALSE, $2)
            ON CONFLICT (integration_id) DO NOTHING
            "#,
        )
        .bind(integration_id)
        .bind(DEFAULT_SYNC_INTERVAL_MINUTES)
        .execute(&self.pool)
        .await?;

        let settings = sqlx::query_as::<_, SyncSettings>(
            "SELECT * FROM sync_settings WHERE integration_id = $1",
        )
        .bind(integration_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn deactivate_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE erp_integrations
            SET active = FALSE, updated_at = NOW()
            WHERE tenant_id = $1 AND erp_kind = $2
            "#,
        )
        .bind(partition.tenant_id())
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_active_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError> {
        let integration = sqlx::query_as::<_, Integration>(
            "SELECT * FROM erp_integrations WHERE tenant_id = $1 AND erp_kind = $2 AND active",
        )
        .bind(partition.tenant_id())
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(integration)
    }

    async fn find_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError> {
        let integration = sqlx::query_as::<_, Integration>(
            "SELECT * FROM erp_integrations WHERE tenant_id = $1 AND erp_kind = $2",
        )
        .bind(partition.tenant_id())
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(integration)
    }

    async fn mark_synced(&self, integration_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE erp_integrations SET last_sync = $2, updated_at = NOW() WHERE id = $1")
            .bind(integration_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_settings(&self, integration_id: Uuid) -> Result<Option<SyncSettings>, AppError> {
        let settings = sqlx::query_as::<_, SyncSettings>(
            "SELECT * FROM sync_settings WHERE integration_id = $1",
        )
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn update_settings(
        &self,
        integration_id: Uuid,
        input: &UpdateSyncSettingsRequest,
    ) -> Result<SyncSettings, AppError> {
        // Campos ausentes (NULL) mantêm o valor atual
        let settings = sqlx::query_as::<_, SyncSettings>(
            r#"
            INSERT INTO sync_settings (integration_id, sync_products, sync_prices, sync_stock, sync_interval_minutes)
            VALUES ($1, COALESCE($2, TRUE), COALESCE($3, TRUE), COALESCE($4, FALSE), COALESCE($5, $6))
            ON CONFLICT (integration_id)
            DO UPDATE SET
                sync_products = COALESCE($2, sync_settings.sync_products),
                sync_prices = COALESCE($3, sync_settings.sync_prices),
                sync_stock = COALESCE($4, sync_settings.sync_stock),
                sync_interval_minutes = COALESCE($5, sync_settings.sync_interval_minutes),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(integration_id)
        .bind(input.sync_products)
        .bind(input.sync_prices)
        .bind(input.sync_stock)
        .bind(input.sync_interval_minutes)
        .bind(DEFAULT_SYNC_INTERVAL_MINUTES)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Integration>, AppError> {
        let integrations = sqlx::query_as::<_, Integration>(
            r#"
            SELECT i.*
            FROM erp_integrations i
            JOIN sync_settings s ON s.integration_id = i.id
            WHERE i.active
              AND s.sync_products
              AND (i.last_sync IS NULL
                   OR i.last_sync + make_interval(mins => s.sync_interval_minutes) <= $1)
            ORDER BY i.last_sync ASC NULLS FIRST
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(integrations)
    }
}
