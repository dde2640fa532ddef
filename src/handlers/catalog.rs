// src/handlers/catalog.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::i18n::Locale,
    models::{catalog::Product, tenancy::TenantPartition},
};

#[utoipa::path(
    get,
    path = "/api/catalog/products",
    tag = "Catalog",
    responses(
        (status = 200, description = "Produtos da loja, por título", body = [Product])
    ),
    security(("api_jwt" = []))
)]
pub async fn list_products(
    State(app_state): State<AppState>,
    locale: Locale,
    partition: TenantPartition,
) -> Result<impl IntoResponse, ApiError> {
    let products = app_state
        .catalog
        .list_products(&partition)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(products)))
}
