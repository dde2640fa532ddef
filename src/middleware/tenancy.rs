// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedUser,
    models::tenancy::{resolve_partition, TenantPartition},
};

// O tenant NÃO vem de cabeçalho: a partição sai sempre do principal autenticado,
// então não há como pedir dados de outro tenant.
impl<S> FromRequestParts<S> for TenantPartition
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| &user.0);

        resolve_partition(principal)
    }
}
