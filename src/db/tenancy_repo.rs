// src/db/tenancy_repo.rs

use sqlx::PgPool;

use crate::{common::error::AppError, models::tenancy::TenantPartition};

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cria (se ainda não existir) o schema do tenant e a tabela de produtos.
    /// Idempotente: pode rodar no início de toda sincronização.
    pub async fn provision_partition(&self, partition: &TenantPartition) -> Result<(), AppError> {
        // Identificadores não aceitam bind; o nome vem de `TenantPartition`
        // (só [a-z0-9_]), nunca de entrada do usuário.
        let schema = partition.schema_name();
        let ddl = format!(
            r#"
            CREATE SCHEMA IF NOT EXISTS {schema};

            CREATE TABLE IF NOT EXISTS {schema}.products (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                erp_id TEXT,
                title TEXT NOT NULL,
                description TEXT,
                sale_price NUMERIC(14, 2) NOT NULL DEFAULT 0,
                promotional_price NUMERIC(14, 2),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                source public.product_source NOT NULL DEFAULT 'manual',
                last_sync TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT products_erp_has_id CHECK (source = 'manual' OR erp_id IS NOT NULL),
                CONSTRAINT products_promo_le_sale
                    CHECK (promotional_price IS NULL OR promotional_price <= sale_price)
            );

            -- A chave de reconciliação: nunca duas linhas com o mesmo erp_id
            CREATE UNIQUE INDEX IF NOT EXISTS products_erp_id_key ON {schema}.products (erp_id);
            "#
        );

        sqlx::raw_sql(&ddl).execute(&self.pool).await?;

        tracing::debug!(partition = %partition, "Partição provisionada");
        Ok(())
    }
}
