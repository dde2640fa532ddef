// src/models/catalog.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// --- Origem do produto ---
// `Erp`: criado/atualizado só pela sincronização (chave = erp_id).
// `Manual`: criado pelo tenant no CRUD, sem erp_id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "product_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductSource {
    Manual,
    Erp,
}

// --- Produto (vive dentro do schema do tenant) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub erp_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub sale_price: Decimal,
    pub promotional_price: Option<Decimal>,
    pub active: bool,
    pub source: ProductSource,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// Item normalizado (formato neutro, independente do ERP)
// ---
fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_promotional_price(item: &NormalizedItem) -> Result<(), ValidationError> {
    if let Some(promo) = item.promotional_price {
        if promo > item.sale_price {
            let mut err = ValidationError::new("promotional_price");
            err.message = Some("O preço promocional não pode ser maior que o preço de venda.".into());
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Validate)]
#[validate(schema(function = "validate_promotional_price"))]
pub struct NormalizedItem {
    #[validate(length(min = 1, message = "O item do ERP veio sem id."))]
    pub erp_id: String,

    #[validate(length(min = 1, message = "O item do ERP veio sem nome."))]
    pub title: String,

    pub description: Option<String>,

    #[validate(custom(function = "validate_not_negative"))]
    pub sale_price: Decimal,

    #[validate(custom(function = "validate_not_negative"))]
    pub promotional_price: Option<Decimal>,

    pub is_active: bool,
}

impl NormalizedItem {
    /// Valida o item antes do upsert. Falha aqui conta como falha do item, não da execução.
    pub fn check(&self) -> Result<(), ItemRejection> {
        self.validate().map_err(|errors| ItemRejection {
            erp_id: Some(self.erp_id.clone()),
            reason: errors.to_string(),
        })
    }
}

/// Item que não pôde ser normalizado/validado.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("item {erp_id:?} rejeitado: {reason}")]
pub struct ItemRejection {
    pub erp_id: Option<String>,
    pub reason: String,
}
