// src/db/catalog_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    common::{db_utils::begin_partition_tx, error::AppError},
    db::TenantRepository,
    models::{
        catalog::{NormalizedItem, Product},
        tenancy::TenantPartition,
    },
};

/// Produtos do tenant, sempre endereçados por uma `TenantPartition` já resolvida.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn ensure_partition(&self, partition: &TenantPartition) -> Result<(), AppError>;

    /// Upsert atômico pela chave `erp_id`. Com `update_prices = false`, uma linha
    /// existente mantém os preços que já tinha.
    async fn upsert_erp_item(
        &self,
        partition: &TenantPartition,
        item: &NormalizedItem,
        synced_at: DateTime<Utc>,
        update_prices: bool,
    ) -> Result<Product, AppError>;

    async fn list_products(&self, partition: &TenantPartition) -> Result<Vec<Product>, AppError>;
}

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
    tenant_repo: TenantRepository,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tenant_repo: TenantRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ProductCatalog for CatalogRepository {
    async fn ensure_partition(&self, partition: &TenantPartition) -> Result<(), AppError> {
        self.tenant_repo.provision_partition(partition).await
    }

    async fn upsert_erp_item(
        &self,
        partition: &TenantPartition,
        item: &NormalizedItem,
        synced_at: DateTime<Utc>,
        update_prices: bool,
    ) -> Result<Product, AppError> {
        // Uma transação por item: a falha de um item não desfaz os outros.
        let mut tx = begin_partition_tx(&self.pool, partition).await?;

        // "UPSERT": tenta INSERIR; se o erp_id já existir (ON CONFLICT), ATUALIZA.
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products
                (erp_id, title, description, sale_price, promotional_price, active, source, last_sync, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'erp', $7, $7)
            ON CONFLICT (erp_id)
            DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                sale_price = CASE WHEN $8 THEN EXCLUDED.sale_price ELSE products.sale_price END,
                promotional_price = CASE WHEN $8 THEN EXCLUDED.promotional_price ELSE products.promotional_price END,
                active = EXCLUDED.active,
                source = 'erp',
                last_sync = EXCLUDED.last_sync,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&item.erp_id)
        .bind(&item.title)
        .bind(item.description.as_deref())
        .bind(item.sale_price)
        .bind(item.promotional_price)
        .bind(item.is_active)
        .bind(synced_at)
        .bind(update_prices)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    async fn list_products(&self, partition: &TenantPartition) -> Result<Vec<Product>, AppError> {
        // Tenant que nunca sincronizou ainda não tem schema
        self.tenant_repo.provision_partition(partition).await?;

        let mut tx = begin_partition_tx(&self.pool, partition).await?;

        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY title ASC")
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(products)
    }
}
