// src/services/integration_service.rs

use chrono::{TimeDelta, Utc};
use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::IntegrationStore,
    models::{
        integration::{
            ErpCredential, ErpKind, Integration, IntegrationStatus, SyncSettings,
            UpdateSyncSettingsRequest,
        },
        tenancy::TenantPartition,
    },
    services::erp_client::{ErpClient, ErpError},
};

// Validade assumida para credenciais OAuth recebidas sem expiração explícita.
const OAUTH_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct IntegrationService {
    store: Arc<dyn IntegrationStore>,
    erp: Arc<dyn ErpClient>,
}

impl IntegrationService {
    pub fn new(store: Arc<dyn IntegrationStore>, erp: Arc<dyn ErpClient>) -> Self {
        Self { store, erp }
    }

    /// Conecta com um token de API. Faz uma chamada de validação ao ERP antes de
    /// gravar qualquer coisa.
    pub async fn connect_with_token(
        &self,
        partition: &TenantPartition,
        token: &str,
    ) -> Result<Integration, AppError> {
        match self.erp.fetch_page(token, 1).await {
            // Catálogo vazio também prova que o token é aceito
            Ok(_) => {}
            Err(ErpError::Rejected(detail)) => {
                tracing::info!(tenant = %partition, %detail, "Token do ERP recusado na validação");
                return Err(AppError::InvalidErpToken);
            }
            Err(transport @ ErpError::Transport(_)) => return Err(transport.into()),
        }

        let credential = ErpCredential {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
        };
        self.save(partition, &credential).await
    }

    /// Conecta com credenciais OAuth (access + refresh), sem chamada de validação.
    pub async fn connect_with_credentials(
        &self,
        partition: &TenantPartition,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<Integration, AppError> {
        let credential = ErpCredential {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Some(Utc::now() + TimeDelta::hours(OAUTH_TOKEN_TTL_HOURS)),
        };
        self.save(partition, &credential).await
    }

    async fn save(
        &self,
        partition: &TenantPartition,
        credential: &ErpCredential,
    ) -> Result<Integration, AppError> {
        let integration = self
            .store
            .upsert_integration(partition, ErpKind::Tiny, credential)
            .await?;

        // Só cria se não existir: reconectar mantém as escolhas do tenant.
        self.store.ensure_default_settings(integration.id).await?;

        tracing::info!(tenant = %partition, integration_id = %integration.id, "🔗 Integração com o Tiny salva");
        Ok(integration)
    }

    pub async fn disconnect(&self, partition: &TenantPartition) -> Result<(), AppError> {
        let found = self
            .store
            .deactivate_integration(partition, ErpKind::Tiny)
            .await?;

        if !found {
            return Err(AppError::IntegrationNotFound);
        }

        tracing::info!(tenant = %partition, "Integração com o Tiny desativada");
        Ok(())
    }

    pub async fn status(&self, partition: &TenantPartition) -> Result<IntegrationStatus, AppError> {
        let integration = self.find(partition).await?;
        let settings = self.store.get_settings(integration.id).await?;
        Ok(IntegrationStatus { integration, settings })
    }

    pub async fn get_settings(&self, partition: &TenantPartition) -> Result<SyncSettings, AppError> {
        let integration = self.find(partition).await?;
        self.store.ensure_default_settings(integration.id).await
    }

    pub async fn update_settings(
        &self,
        partition: &TenantPartition,
        input: &UpdateSyncSettingsRequest,
    ) -> Result<SyncSettings, AppError> {
        let integration = self.find(partition).await?;
        self.store.update_settings(integration.id, input).await
    }

    async fn find(&self, partition: &TenantPartition) -> Result<Integration, AppError> {
        self.store
            .find_integration(partition, ErpKind::Tiny)
            .await?
            .ok_or(AppError::IntegrationNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{tenant, InMemoryIntegrations, ScriptedErp};

    fn service(erp: ScriptedErp) -> (IntegrationService, Arc<InMemoryIntegrations>) {
        let store = Arc::new(InMemoryIntegrations::default());
        (IntegrationService::new(store.clone(), Arc::new(erp)), store)
    }

    #[tokio::test]
    async fn token_connect_validates_then_saves_with_defaults() {
        let (service, store) = service(ScriptedErp::new(100).with_catalog("tok-ok", vec![]));
        let partition = tenant();

        let integration = service.connect_with_token(&partition, "tok-ok").await.unwrap();

        assert!(integration.active);
        assert_eq!(integration.tenant_id, partition.tenant_id());
        assert_eq!(integration.refresh_token, None);
        assert_eq!(integration.token_expires_at, None);

        let settings = store.get_settings(integration.id).await.unwrap().unwrap();
        assert!(settings.sync_products && settings.sync_prices && !settings.sync_stock);
        assert_eq!(settings.sync_interval_minutes, 60);
    }

    #[tokio::test]
    async fn refused_token_persists_nothing() {
        let (service, store) = service(ScriptedErp::new(100));
        let partition = tenant();

        let err = service.connect_with_token(&partition, "nope").await.unwrap_err();

        assert!(matches!(err, AppError::InvalidErpToken));
        assert!(store.integrations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_during_validation_surfaces() {
        let erp = ScriptedErp::new(100).failing_on_page(1, ErpError::Transport("dns".into()));
        let (service, _) = service(erp);

        let err = service.connect_with_token(&tenant(), "tok").await.unwrap_err();
        assert!(matches!(err, AppError::ErpTransport(_)));
    }

    #[tokio::test]
    async fn reconnecting_keeps_settings_and_integration() {
        let (service, _) = service(ScriptedErp::new(100).with_catalog("tok-ok", vec![]));
        let partition = tenant();

        let first = service.connect_with_token(&partition, "tok-ok").await.unwrap();
        service
            .update_settings(
                &partition,
                &UpdateSyncSettingsRequest {
                    sync_interval_minutes: Some(15),
                    sync_prices: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second = service
            .connect_with_credentials(&partition, "oauth-access", Some("oauth-refresh"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_token, "oauth-access");
        assert_eq!(second.refresh_token.as_deref(), Some("oauth-refresh"));
        let expires_in = second.token_expires_at.unwrap() - Utc::now();
        assert!(expires_in > TimeDelta::hours(23) && expires_in <= TimeDelta::hours(24));

        let settings = service.get_settings(&partition).await.unwrap();
        assert_eq!(settings.sync_interval_minutes, 15);
        assert!(!settings.sync_prices);
    }

    #[tokio::test]
    async fn disconnect_deactivates_and_status_reflects_it() {
        let (service, _) = service(ScriptedErp::new(100).with_catalog("tok-ok", vec![]));
        let partition = tenant();

        assert!(matches!(
            service.disconnect(&partition).await.unwrap_err(),
            AppError::IntegrationNotFound
        ));
        assert!(matches!(
            service.status(&partition).await.unwrap_err(),
            AppError::IntegrationNotFound
        ));

        service.connect_with_token(&partition, "tok-ok").await.unwrap();
        service.disconnect(&partition).await.unwrap();

        let status = service.status(&partition).await.unwrap();
        assert!(!status.integration.active);
        assert!(status.settings.is_some());
    }
}
