// src/handlers/settings.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        integration::{SyncSettings, UpdateSyncSettingsRequest},
        tenancy::TenantPartition,
    },
};

// GET /api/erp/tiny/settings
#[utoipa::path(
    get,
    path = "/api/erp/tiny/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Configurações de sincronização", body = SyncSettings),
        (status = 404, description = "Nenhuma integração cadastrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
) -> Result<impl IntoResponse, ApiError> {
    let settings = app_state
        .integration_service
        .get_settings(&partition)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(settings)))
}

// PUT /api/erp/tiny/settings
#[utoipa::path(
    put,
    path = "/api/erp/tiny/settings",
    tag = "Settings",
    request_body = UpdateSyncSettingsRequest,
    responses(
        (status = 200, description = "Configurações atualizadas", body = SyncSettings),
        (status = 400, description = "Intervalo fora da faixa permitida")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
    Json(payload): Json<UpdateSyncSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let updated = app_state
        .integration_service
        .update_settings(&partition, &payload)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(updated)))
}
