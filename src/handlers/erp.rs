// src/handlers/erp.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        integration::{Integration, IntegrationStatus},
        sync::{SyncRun, SyncSummary},
        tenancy::TenantPartition,
    },
};

// ---
// Payloads
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTokenPayload {
    #[validate(length(min = 1, message = "O token é obrigatório."))]
    #[schema(example = "a1b2c3d4e5")]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectCredentialsPayload {
    #[validate(length(min = 1, message = "O accessToken é obrigatório."))]
    pub access_token: String,

    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RunsQuery {
    /// Quantidade de execuções (padrão 20, máximo 100)
    pub limit: Option<i64>,
}

const DEFAULT_RUNS_LIMIT: i64 = 20;

// ---
// Conexão
// ---

#[utoipa::path(
    post,
    path = "/api/erp/tiny/auth",
    tag = "ERP",
    request_body = ConnectTokenPayload,
    responses(
        (status = 200, description = "Token validado e integração salva", body = Integration),
        (status = 422, description = "Token recusado pelo Tiny"),
        (status = 502, description = "Tiny indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn connect_token(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
    Json(payload): Json<ConnectTokenPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let integration = app_state
        .integration_service
        .connect_with_token(&partition, payload.token.trim())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(integration)))
}

#[utoipa::path(
    post,
    path = "/api/erp/tiny",
    tag = "ERP",
    request_body = ConnectCredentialsPayload,
    responses(
        (status = 200, description = "Credenciais OAuth salvas (expiram em 24h)", body = Integration)
    ),
    security(("api_jwt" = []))
)]
pub async fn connect_credentials(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
    Json(payload): Json<ConnectCredentialsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let integration = app_state
        .integration_service
        .connect_with_credentials(
            &partition,
            &payload.access_token,
            payload.refresh_token.as_deref(),
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(integration)))
}

#[utoipa::path(
    delete,
    path = "/api/erp/tiny",
    tag = "ERP",
    responses(
        (status = 204, description = "Integração desativada"),
        (status = 404, description = "Nenhuma integração cadastrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn disconnect(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .integration_service
        .disconnect(&partition)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/erp/tiny",
    tag = "ERP",
    responses(
        (status = 200, description = "Integração e configurações", body = IntegrationStatus),
        (status = 404, description = "Nenhuma integração cadastrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_status(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
) -> Result<impl IntoResponse, ApiError> {
    let status = app_state
        .integration_service
        .status(&partition)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(status)))
}

// ---
// Sincronização
// ---

// Roda no próprio request: se o cliente desconectar, a execução é encerrada
// como `failed` ("cancelled") pela guarda do livro-razão.
#[utoipa::path(
    post,
    path = "/api/erp/tiny/sync",
    tag = "ERP",
    responses(
        (status = 200, description = "Sincronização concluída (success ou partial)", body = SyncSummary),
        (status = 404, description = "Nenhuma integração ativa"),
        (status = 409, description = "Já existe uma sincronização em andamento"),
        (status = 422, description = "Credencial recusada pelo Tiny"),
        (status = 502, description = "Falha de comunicação com o Tiny")
    ),
    security(("api_jwt" = []))
)]
pub async fn start_sync(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .sync_service
        .start_sync(&partition, &app_state.shutdown)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/api/erp/tiny/sync/runs",
    tag = "ERP",
    params(RunsQuery),
    responses(
        (status = 200, description = "Execuções mais recentes primeiro", body = [SyncRun])
    ),
    security(("api_jwt" = []))
)]
pub async fn list_runs(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
    Query(query): Query<RunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = app_state
        .sync_service
        .list_runs(&partition, query.limit.unwrap_or(DEFAULT_RUNS_LIMIT))
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(runs)))
}
