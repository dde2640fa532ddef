// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- ERP (Tiny) ---
        handlers::erp::connect_token,
        handlers::erp::connect_credentials,
        handlers::erp::disconnect,
        handlers::erp::get_status,
        handlers::erp::start_sync,
        handlers::erp::list_runs,

        // --- Settings ---
        handlers::settings::get_settings,
        handlers::settings::update_settings,

        // --- Catalog ---
        handlers::catalog::list_products,
    ),
    components(
        schemas(
            // --- Integração ---
            models::integration::ErpKind,
            models::integration::Integration,
            models::integration::SyncSettings,
            models::integration::UpdateSyncSettingsRequest,
            models::integration::IntegrationStatus,

            // --- Sincronização ---
            models::sync::SyncStatus,
            models::sync::SyncRun,
            models::sync::SyncSummary,

            // --- Catálogo ---
            models::catalog::ProductSource,
            models::catalog::Product,

            // --- Payloads ---
            handlers::erp::ConnectTokenPayload,
            handlers::erp::ConnectCredentialsPayload,
        )
    ),
    tags(
        (name = "ERP", description = "Integração com o Tiny e sincronização do catálogo"),
        (name = "Settings", description = "Configurações de sincronização"),
        (name = "Catalog", description = "Produtos da loja")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
