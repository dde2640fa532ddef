// src/models/integration.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- 1. Tipo de ERP ---
// Hoje só existe o Tiny, mas a chave (tenant, erp_kind) já fica pronta para outros.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "erp_kind", rename_all = "lowercase")] // Banco
#[serde(rename_all = "lowercase")] // JSON
pub enum ErpKind {
    Tiny,
}

// --- 2. Integração (uma linha por tenant + ERP) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub erp_kind: ErpKind,

    #[serde(skip_serializing)] // Nunca devolvemos o token para o cliente
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,

    pub token_expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credencial enviada pelo tenant ao conectar (ou reconectar) o ERP.
#[derive(Debug, Clone)]
pub struct ErpCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// --- 3. Configurações de sincronização ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub integration_id: Uuid,

    #[schema(example = true)]
    pub sync_products: bool,

    #[schema(example = true)]
    pub sync_prices: bool,

    // Guardado apenas: o catálogo ainda não tem estoque.
    #[schema(example = false)]
    pub sync_stock: bool,

    #[schema(example = 60)]
    pub sync_interval_minutes: i32,

    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_SYNC_INTERVAL_MINUTES: i32 = 60;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSyncSettingsRequest {
    #[schema(example = true)]
    pub sync_products: Option<bool>,

    #[schema(example = false)]
    pub sync_prices: Option<bool>,

    pub sync_stock: Option<bool>,

    #[validate(range(min = 5, max = 10080, message = "O intervalo deve ficar entre 5 minutos e 7 dias."))]
    #[schema(example = 120)]
    pub sync_interval_minutes: Option<i32>,
}

// --- 4. Resposta de status (GET /api/erp/tiny) ---
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub integration: Integration,
    pub settings: Option<SyncSettings>,
}
