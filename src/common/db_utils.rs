use sqlx::{PgPool, Postgres, Transaction};

use crate::common::error::AppError;
use crate::models::tenancy::TenantPartition;

// ---
// Helper de partição: a "Chave" para o schema do tenant
// ---
/// Abre uma transação com o `search_path` apontando para o schema do tenant.
/// `set_config(..., true)` vale só até o fim da transação, então a conexão volta
/// limpa para a pool.
pub(crate) async fn begin_partition_tx(
    pool: &PgPool,
    partition: &TenantPartition,
) -> Result<Transaction<'static, Postgres>, AppError> {
    // O '?' converte automaticamente sqlx::Error -> AppError::DatabaseError
    let mut tx = pool.begin().await?;

    // `public` continua no path por causa dos tipos enum compartilhados
    sqlx::query("SELECT set_config('search_path', $1, true)")
        .bind(format!("{}, public", partition.schema_name()))
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}
