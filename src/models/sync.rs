// src/models/sync.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Status de uma execução ---
// `Running` é o único status não-terminal. Um `Running` antigo (processo caiu)
// deve ser lido como "desconhecido", nunca como sucesso.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncStatus::Running)
    }

    /// Status de encerramento normal: qualquer falha por item vira `Partial`.
    pub fn for_completed_run(items_failed: i32) -> Self {
        if items_failed == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        }
    }
}

// --- SyncRun (Livro-razão de sincronizações) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub status: SyncStatus,
    pub items_processed: i32,
    pub items_failed: i32,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    // Placeholder igual a `started_at` enquanto `Running`.
    pub finished_at: DateTime<Utc>,
}

// --- Resultado devolvido para quem disparou a sincronização ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub status: SyncStatus,
    #[schema(example = 250)]
    pub processed: i32,
    #[schema(example = 0)]
    pub failed: i32,
}
