// src/services/scheduler.rs

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    common::error::AppError,
    db::IntegrationStore,
    models::tenancy::{resolve_partition, Principal},
    services::sync_service::SyncService,
};

/// Disparo agendado: acorda a cada `tick` e sincroniza as integrações vencidas.
pub struct SyncScheduler {
    sync_service: SyncService,
    integrations: Arc<dyn IntegrationStore>,
    tick: Duration,
}

impl SyncScheduler {
    pub fn new(sync_service: SyncService, integrations: Arc<dyn IntegrationStore>, tick: Duration) -> Self {
        Self {
            sync_service,
            integrations,
            tick,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(tick = ?self.tick, "⏰ Agendador de sincronização iniciado");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.poll(&shutdown).await {
                        tracing::error!(error = %e, "Falha ao buscar integrações para sincronizar");
                    }
                }
            }
        }

        tracing::info!("Agendador de sincronização parado");
    }

    /// Uma rodada: roda em sequência cada integração vencida. Devolve quantas concluíram.
    pub async fn poll(&self, shutdown: &CancellationToken) -> Result<usize, AppError> {
        let due = self.integrations.list_due_for_sync(Utc::now()).await?;
        if due.is_empty() {
            tracing::debug!("Nenhuma integração vencida");
            return Ok(0);
        }

        let mut completed = 0;
        for integration in due {
            if shutdown.is_cancelled() {
                break;
            }

            // Age em nome do dono da integração, pela mesma resolução de partição da API.
            let principal = Principal::for_scheduled_run(integration.tenant_id);
            let partition = resolve_partition(Some(&principal))?;

            match self.sync_service.start_sync(&partition, shutdown).await {
                Ok(summary) => {
                    completed += 1;
                    tracing::info!(
                        integration_id = %integration.id,
                        run_id = %summary.run_id,
                        processed = summary.processed,
                        failed = summary.failed,
                        "Sincronização agendada concluída"
                    );
                }
                Err(AppError::ConcurrentRunConflict) => {
                    tracing::debug!(integration_id = %integration.id, "Já em andamento, pulando");
                }
                Err(e) => {
                    tracing::warn!(integration_id = %integration.id, error = %e, "Sincronização agendada falhou");
                }
            }
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sync::SyncStatus;
    use crate::services::{
        sync_service::SyncLimits,
        testing::{catalog_of, tenant, Fixture, InMemoryCatalog, ScriptedErp},
    };

    fn scheduler(fx: &Fixture) -> SyncScheduler {
        SyncScheduler::new(
            fx.service(SyncLimits::default()),
            fx.integrations.clone(),
            Duration::from_secs(60),
        )
    }

    fn fixture() -> Fixture {
        let erp = ScriptedErp::new(100)
            .with_catalog("tok-a", catalog_of(3))
            .with_catalog("tok-b", catalog_of(3))
            .with_catalog("tok-c", catalog_of(3));
        Fixture::new(erp, InMemoryCatalog::default())
    }

    #[tokio::test]
    async fn poll_runs_only_due_integrations() {
        let fx = fixture();
        let (a, b, c) = (tenant(), tenant(), tenant());
        let due = fx.integrations.activate(&a, "tok-a");
        let fresh = fx.integrations.activate(&b, "tok-b");
        let disabled = fx.integrations.activate(&c, "tok-c");

        fx.integrations.mark_synced(fresh.id, Utc::now()).await.unwrap();
        fx.integrations.edit_settings(disabled.id, |s| s.sync_products = false);

        let completed = scheduler(&fx).poll(&CancellationToken::new()).await.unwrap();

        assert_eq!(completed, 1);
        let run = fx.ledger.only();
        assert_eq!(run.integration_id, due.id);
        assert_eq!(run.status, SyncStatus::Success);
        assert_eq!(fx.catalog.products(&a).len(), 3);
        assert!(fx.catalog.products(&b).is_empty());
    }

    #[tokio::test]
    async fn overdue_integration_is_synced_again() {
        let fx = fixture();
        let partition = tenant();
        let integration = fx.integrations.activate(&partition, "tok-a");
        fx.integrations
            .mark_synced(integration.id, Utc::now() - chrono::TimeDelta::minutes(61))
            .await
            .unwrap();

        assert_eq!(scheduler(&fx).poll(&CancellationToken::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_poll_starts_nothing() {
        let fx = fixture();
        fx.integrations.activate(&tenant(), "tok-a");
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(scheduler(&fx).poll(&shutdown).await.unwrap(), 0);
        assert!(fx.ledger.all().is_empty());
    }

    #[tokio::test]
    async fn run_loop_syncs_on_first_tick_and_stops_on_shutdown() {
        let fx = fixture();
        fx.integrations.activate(&tenant(), "tok-a");
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(scheduler(&fx).run(shutdown.clone()));
        while !fx.ledger.all().first().is_some_and(|r| r.status.is_terminal()) {
            tokio::task::yield_now().await;
        }

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(fx.ledger.only().status, SyncStatus::Success);
    }
}
