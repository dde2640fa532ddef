// src/services/sync_service.rs

use chrono::{TimeDelta, Utc};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{IntegrationStore, ProductCatalog, SyncRunLedger},
    models::{
        integration::{ErpKind, Integration},
        sync::{SyncRun, SyncSummary},
        tenancy::TenantPartition,
    },
    services::erp_client::{ErpClient, ErpError},
};

/// Limites de uma execução. Nenhuma sincronização roda sem teto de tempo ou de páginas.
#[derive(Debug, Clone)]
pub struct SyncLimits {
    pub request_timeout: Duration,
    pub max_run_duration: Duration,
    pub max_pages: u32,
    pub stale_after: Duration,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_run_duration: Duration::from_secs(15 * 60),
            max_pages: 500,
            stale_after: Duration::from_secs(60 * 60),
        }
    }
}

/// Contadores acumulados de uma execução (também usados quando ela aborta).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub processed: i32,
    pub failed: i32,
    pub pages: u32,
}

// Motivos que encerram a execução como `failed`
#[derive(Debug, Error)]
enum RunAbort {
    #[error(transparent)]
    Erp(#[from] ErpError),

    #[error("timeout: execução passou de {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("limite de {0} páginas atingido")]
    PageLimit(u32),

    #[error("erro interno: {0}")]
    Storage(AppError),
}

impl From<RunAbort> for AppError {
    fn from(abort: RunAbort) -> Self {
        match abort {
            RunAbort::Erp(err) => err.into(),
            RunAbort::Timeout(_) => AppError::ErpTransport("timeout".to_string()),
            RunAbort::Cancelled => AppError::SyncCancelled,
            RunAbort::PageLimit(pages) => AppError::SyncPageLimit(pages),
            RunAbort::Storage(err) => err,
        }
    }
}

// ---
// Guardas de escopo
// ---

/// Reserva em memória: uma execução por integração neste processo.
/// A garantia entre processos é o índice único parcial de `sync_runs`.
struct RunSlot {
    running: Arc<Mutex<HashSet<Uuid>>>,
    integration_id: Uuid,
}

impl RunSlot {
    fn acquire(running: &Arc<Mutex<HashSet<Uuid>>>, integration_id: Uuid) -> Result<Self, AppError> {
        let mut set = running.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(integration_id) {
            return Err(AppError::ConcurrentRunConflict);
        }
        Ok(Self {
            running: running.clone(),
            integration_id,
        })
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.integration_id);
    }
}

/// Dono da linha `running` do livro-razão. Se for descartado sem `finalize`/`fail`
/// (future abandonado, pânico), o `Drop` ainda dispara `fail(run, "cancelled")`.
struct RunGuard {
    ledger: Arc<dyn SyncRunLedger>,
    run_id: Uuid,
    progress: SyncProgress,
    closed: bool,
}

impl RunGuard {
    fn new(ledger: Arc<dyn SyncRunLedger>, run_id: Uuid) -> Self {
        Self {
            ledger,
            run_id,
            progress: SyncProgress::default(),
            closed: false,
        }
    }

    async fn finalize(mut self) -> Result<SyncRun, AppError> {
        let result = self
            .ledger
            .finalize(self.run_id, self.progress.processed, self.progress.failed)
            .await;
        self.closed = true;
        result
    }

    async fn fail(mut self, reason: &str) -> Result<SyncRun, AppError> {
        let result = self
            .ledger
            .fail(self.run_id, reason, self.progress.processed, self.progress.failed)
            .await;
        self.closed = true;
        result
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let ledger = self.ledger.clone();
        let run_id = self.run_id;
        let progress = self.progress;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match ledger
                        .fail(run_id, "cancelled", progress.processed, progress.failed)
                        .await
                    {
                        Ok(_) => tracing::warn!(%run_id, "Execução interrompida e encerrada como failed"),
                        Err(e) => tracing::error!(%run_id, error = %e, "Falha ao encerrar execução interrompida"),
                    }
                });
            }
            Err(_) => {
                tracing::error!(%run_id, "Sem runtime para encerrar a execução; fica running até ser recolhida");
            }
        }
    }
}

// ---
// Motor de reconciliação
// ---

#[derive(Clone)]
pub struct SyncService {
    integrations: Arc<dyn IntegrationStore>,
    ledger: Arc<dyn SyncRunLedger>,
    catalog: Arc<dyn ProductCatalog>,
    erp: Arc<dyn ErpClient>,
    limits: SyncLimits,
    running: Arc<Mutex<HashSet<Uuid>>>,
}

impl SyncService {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        ledger: Arc<dyn SyncRunLedger>,
        catalog: Arc<dyn ProductCatalog>,
        erp: Arc<dyn ErpClient>,
        limits: SyncLimits,
    ) -> Self {
        Self {
            integrations,
            ledger,
            catalog,
            erp,
            limits,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Sincroniza o catálogo do ERP para a partição do tenant.
    ///
    /// Pré-condições (sem integração ativa, sync desligada, outra execução em
    /// andamento) falham sem criar linha no livro-razão. Depois do `begin`, toda
    /// saída fecha a linha: `success`/`partial` pelo fluxo normal, `failed` em erro
    /// do ERP, timeout, cancelamento ou descarte do future.
    pub async fn start_sync(
        &self,
        partition: &TenantPartition,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, AppError> {
        let integration = self
            .integrations
            .get_active_integration(partition, ErpKind::Tiny)
            .await?
            .ok_or(AppError::NoActiveIntegration)?;

        // Sem linha de configuração = padrões (produtos e preços ligados)
        let update_prices = match self.integrations.get_settings(integration.id).await? {
            Some(settings) if !settings.sync_products => return Err(AppError::SyncDisabled),
            Some(settings) => settings.sync_prices,
            None => true,
        };

        // Desligamento já em curso: nem abre linha no livro-razão.
        if cancel.is_cancelled() {
            return Err(AppError::SyncCancelled);
        }

        let _slot = RunSlot::acquire(&self.running, integration.id)?;

        let stale_after = TimeDelta::from_std(self.limits.stale_after).unwrap_or(TimeDelta::hours(1));
        let reaped = self
            .ledger
            .reap_stale(integration.id, Utc::now() - stale_after)
            .await?;
        if reaped > 0 {
            tracing::warn!(integration_id = %integration.id, reaped, "Execuções abandonadas encerradas como failed");
        }

        let run = self.ledger.begin(integration.id).await?;
        tracing::info!(
            tenant = %partition,
            integration_id = %integration.id,
            run_id = %run.id,
            "🔄 Sincronização iniciada"
        );

        let mut guard = RunGuard::new(self.ledger.clone(), run.id);

        let outcome = {
            let drive = self.drive(partition, &integration, update_prices, &mut guard.progress);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RunAbort::Cancelled),
                res = tokio::time::timeout(self.limits.max_run_duration, drive) => {
                    res.unwrap_or(Err(RunAbort::Timeout(self.limits.max_run_duration)))
                }
            }
        };

        match outcome {
            Ok(()) => {
                let closed = guard.finalize().await?;

                // A execução já está fechada; falhar aqui não muda o resultado.
                if let Err(e) = self.integrations.mark_synced(integration.id, closed.finished_at).await {
                    tracing::error!(integration_id = %integration.id, error = %e, "Falha ao gravar last_sync");
                }

                tracing::info!(
                    tenant = %partition,
                    run_id = %closed.id,
                    status = ?closed.status,
                    processed = closed.items_processed,
                    failed = closed.items_failed,
                    "✅ Sincronização concluída"
                );

                Ok(SyncSummary {
                    run_id: closed.id,
                    status: closed.status,
                    processed: closed.items_processed,
                    failed: closed.items_failed,
                })
            }
            Err(abort) => {
                let reason = abort.to_string();
                let progress = guard.progress;
                tracing::error!(
                    tenant = %partition,
                    run_id = %run.id,
                    pages = progress.pages,
                    processed = progress.processed,
                    failed = progress.failed,
                    reason = %reason,
                    "🔥 Sincronização abortada"
                );

                if let Err(e) = guard.fail(&reason).await {
                    tracing::error!(run_id = %run.id, error = %e, "Falha ao registrar execução como failed");
                }

                Err(abort.into())
            }
        }
    }

    /// Laço de páginas. Sequencial: a página N+1 só é buscada depois de todos os
    /// itens da página N; página curta = fim do catálogo.
    async fn drive(
        &self,
        partition: &TenantPartition,
        integration: &Integration,
        update_prices: bool,
        progress: &mut SyncProgress,
    ) -> Result<(), RunAbort> {
        self.catalog
            .ensure_partition(partition)
            .await
            .map_err(RunAbort::Storage)?;

        let page_size = self.erp.page_size();
        let mut page: u32 = 1;

        loop {
            if page > self.limits.max_pages {
                return Err(RunAbort::PageLimit(self.limits.max_pages));
            }

            let fetched = tokio::time::timeout(
                self.limits.request_timeout,
                self.erp.fetch_page(&integration.access_token, page),
            )
            .await
            .map_err(|_| ErpError::Transport("timeout".to_string()))??;

            progress.pages = page;
            let page_len = fetched.items.len();
            let synced_at = Utc::now();

            for entry in fetched.items {
                // Falha de item é local: conta, loga e segue. Só conta depois que o
                // upsert termina; item interrompido no meio não entra nos contadores.
                let failure = match entry {
                    Ok(item) => match self
                        .catalog
                        .upsert_erp_item(partition, &item, synced_at, update_prices)
                        .await
                    {
                        Ok(_) => None,
                        Err(e) => Some((Some(item.erp_id.clone()), e.to_string())),
                    },
                    Err(rejection) => Some((rejection.erp_id, rejection.reason)),
                };

                progress.processed += 1;
                if let Some((erp_id, reason)) = failure {
                    progress.failed += 1;
                    tracing::warn!(
                        tenant = %partition,
                        page,
                        erp_id = erp_id.as_deref().unwrap_or("?"),
                        %reason,
                        "Erro ao processar produto"
                    );
                }
            }

            tracing::debug!(tenant = %partition, page, items = page_len, "Página processada");

            if page_len < page_size {
                return Ok(());
            }
            page += 1;
        }
    }

    /// Histórico de execuções da integração do tenant (ativa ou não), mais recentes primeiro.
    pub async fn list_runs(
        &self,
        partition: &TenantPartition,
        limit: i64,
    ) -> Result<Vec<SyncRun>, AppError> {
        let integration = self
            .integrations
            .find_integration(partition, ErpKind::Tiny)
            .await?
            .ok_or(AppError::IntegrationNotFound)?;

        self.ledger.list_recent(integration.id, limit.clamp(1, 100)).await
    }
}
