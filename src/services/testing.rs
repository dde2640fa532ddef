// src/services/testing.rs
// Implementações em memória dos traits de armazenamento e do ERP, para os testes.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{IntegrationStore, ProductCatalog, SyncRunLedger},
    models::{
        catalog::{ItemRejection, NormalizedItem, Product, ProductSource},
        integration::{
            ErpCredential, ErpKind, Integration, SyncSettings, UpdateSyncSettingsRequest,
            DEFAULT_SYNC_INTERVAL_MINUTES,
        },
        sync::{SyncRun, SyncStatus},
        tenancy::{resolve_partition, Principal, TenantPartition},
    },
    services::{
        erp_client::{ErpClient, ErpError, ErpPage},
        sync_service::{SyncLimits, SyncService},
    },
};

pub fn tenant() -> TenantPartition {
    resolve_partition(Some(&Principal::from_session(Uuid::new_v4()))).unwrap()
}

pub fn item(erp_id: &str, title: &str, price: i64, active: bool) -> NormalizedItem {
    NormalizedItem {
        erp_id: erp_id.to_string(),
        title: title.to_string(),
        description: None,
        sale_price: Decimal::from(price),
        promotional_price: None,
        is_active: active,
    }
}

pub fn catalog_of(count: usize) -> Vec<Result<NormalizedItem, ItemRejection>> {
    (0..count)
        .map(|i| Ok(item(&format!("P{i:04}"), &format!("Produto {i}"), 10, true)))
        .collect()
}

// ---
// Integrações
// ---

#[derive(Default)]
pub struct InMemoryIntegrations {
    pub integrations: Mutex<Vec<Integration>>,
    pub settings: Mutex<HashMap<Uuid, SyncSettings>>,
}

impl InMemoryIntegrations {
    /// Semeia uma integração ativa com as configurações padrão.
    pub fn activate(&self, partition: &TenantPartition, token: &str) -> Integration {
        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4(),
            tenant_id: partition.tenant_id(),
            erp_kind: ErpKind::Tiny,
            access_token: token.to_string(),
            refresh_token: None,
            token_expires_at: None,
            active: true,
            last_sync: None,
            created_at: now,
            updated_at: now,
        };
        self.integrations.lock().unwrap().push(integration.clone());
        self.settings
            .lock()
            .unwrap()
            .insert(integration.id, default_settings(integration.id));
        integration
    }

    pub fn get(&self, id: Uuid) -> Integration {
        self.integrations
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .unwrap()
    }

    pub fn edit_settings(&self, id: Uuid, edit: impl FnOnce(&mut SyncSettings)) {
        let mut settings = self.settings.lock().unwrap();
        edit(settings.get_mut(&id).unwrap());
    }

    fn find_by(&self, partition: &TenantPartition, kind: ErpKind) -> Option<Integration> {
        self.integrations
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.tenant_id == partition.tenant_id() && i.erp_kind == kind)
            .cloned()
    }
}

fn default_settings(integration_id: Uuid) -> SyncSettings {
    SyncSettings {
        integration_id,
        sync_products: true,
        sync_prices: true,
        sync_stock: false,
        sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrations {
    async fn upsert_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
        credential: &ErpCredential,
    ) -> Result<Integration, AppError> {
        let mut rows = self.integrations.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = rows
            .iter_mut()
            .find(|i| i.tenant_id == partition.tenant_id() && i.erp_kind == kind)
        {
            existing.access_token = credential.access_token.clone();
            existing.refresh_token = credential.refresh_token.clone();
            existing.token_expires_at = credential.expires_at;
            existing.active = true;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let integration = Integration {
            id: Uuid::new_v4(),
            tenant_id: partition.tenant_id(),
            erp_kind: kind,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            token_expires_at: credential.expires_at,
            active: true,
            last_sync: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(integration.clone());
        Ok(integration)
    }

    async fn ensure_default_settings(&self, integration_id: Uuid) -> Result<SyncSettings, AppError> {
        let mut settings = self.settings.lock().unwrap();
        Ok(settings
            .entry(integration_id)
            .or_insert_with(|| default_settings(integration_id))
            .clone())
    }

    async fn deactivate_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<bool, AppError> {
        let mut rows = self.integrations.lock().unwrap();
        match rows
            .iter_mut()
            .find(|i| i.tenant_id == partition.tenant_id() && i.erp_kind == kind)
        {
            Some(row) => {
                row.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_active_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError> {
        Ok(self.find_by(partition, kind).filter(|i| i.active))
    }

    async fn find_integration(
        &self,
        partition: &TenantPartition,
        kind: ErpKind,
    ) -> Result<Option<Integration>, AppError> {
        Ok(self.find_by(partition, kind))
    }

    async fn mark_synced(&self, integration_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut rows = self.integrations.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|i| i.id == integration_id) {
            row.last_sync = Some(at);
        }
        Ok(())
    }

    async fn get_settings(&self, integration_id: Uuid) -> Result<Option<SyncSettings>, AppError> {
        Ok(self.settings.lock().unwrap().get(&integration_id).cloned())
    }

    async fn update_settings(
        &self,
        integration_id: Uuid,
        input: &UpdateSyncSettingsRequest,
    ) -> Result<SyncSettings, AppError> {
        let mut settings = self.settings.lock().unwrap();
        let row = settings
            .entry(integration_id)
            .or_insert_with(|| default_settings(integration_id));
        if let Some(v) = input.sync_products {
            row.sync_products = v;
        }
        if let Some(v) = input.sync_prices {
            row.sync_prices = v;
        }
        if let Some(v) = input.sync_stock {
            row.sync_stock = v;
        }
        if let Some(v) = input.sync_interval_minutes {
            row.sync_interval_minutes = v;
        }
        Ok(row.clone())
    }

    async fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Integration>, AppError> {
        let settings = self.settings.lock().unwrap();
        let rows = self.integrations.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|i| i.active)
            .filter(|i| match settings.get(&i.id) {
                Some(s) if s.sync_products => match i.last_sync {
                    None => true,
                    Some(last) => last + TimeDelta::minutes(s.sync_interval_minutes as i64) <= now,
                },
                _ => false,
            })
            .cloned()
            .collect())
    }
}

// ---
// Livro-razão
// ---

#[derive(Default)]
pub struct InMemoryLedger {
    pub runs: Mutex<Vec<SyncRun>>,
}

impl InMemoryLedger {
    pub fn all(&self) -> Vec<SyncRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn only(&self) -> SyncRun {
        let runs = self.all();
        assert_eq!(runs.len(), 1, "esperava exatamente uma execução: {runs:?}");
        runs.into_iter().next().unwrap()
    }

    fn close(
        &self,
        run_id: Uuid,
        status: SyncStatus,
        reason: Option<&str>,
        processed: i32,
        failed: i32,
    ) -> Result<SyncRun, AppError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == SyncStatus::Running)
            .ok_or(AppError::SyncRunAlreadyClosed(run_id))?;
        run.status = status;
        run.failure_reason = reason.map(str::to_string);
        run.items_processed = processed;
        run.items_failed = failed;
        run.finished_at = Utc::now().max(run.started_at);
        Ok(run.clone())
    }
}

#[async_trait]
impl SyncRunLedger for InMemoryLedger {
    async fn begin(&self, integration_id: Uuid) -> Result<SyncRun, AppError> {
        let mut runs = self.runs.lock().unwrap();
        if runs
            .iter()
            .any(|r| r.integration_id == integration_id && r.status == SyncStatus::Running)
        {
            return Err(AppError::ConcurrentRunConflict);
        }
        let now = Utc::now();
        let run = SyncRun {
            id: Uuid::new_v4(),
            integration_id,
            status: SyncStatus::Running,
            items_processed: 0,
            items_failed: 0,
            failure_reason: None,
            started_at: now,
            finished_at: now,
        };
        runs.push(run.clone());
        Ok(run)
    }

    async fn finalize(&self, run_id: Uuid, processed: i32, failed: i32) -> Result<SyncRun, AppError> {
        self.close(run_id, SyncStatus::for_completed_run(failed), None, processed, failed)
    }

    async fn fail(
        &self,
        run_id: Uuid,
        reason: &str,
        processed: i32,
        failed: i32,
    ) -> Result<SyncRun, AppError> {
        self.close(run_id, SyncStatus::Failed, Some(reason), processed, failed)
    }

    async fn reap_stale(&self, integration_id: Uuid, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let mut runs = self.runs.lock().unwrap();
        let mut reaped = 0;
        for run in runs.iter_mut().filter(|r| {
            r.integration_id == integration_id
                && r.status == SyncStatus::Running
                && r.started_at < older_than
        }) {
            run.status = SyncStatus::Failed;
            run.failure_reason = Some("abandoned".to_string());
            run.finished_at = Utc::now();
            reaped += 1;
        }
        Ok(reaped)
    }

    async fn list_recent(&self, integration_id: Uuid, limit: i64) -> Result<Vec<SyncRun>, AppError> {
        let mut runs: Vec<SyncRun> = self
            .all()
            .into_iter()
            .filter(|r| r.integration_id == integration_id)
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}

// ---
// Catálogo (um mapa por schema)
// ---

#[derive(Default)]
pub struct InMemoryCatalog {
    pub rows: Mutex<HashMap<String, BTreeMap<String, Product>>>,
    pub failing: HashSet<String>,
    // Upsert desses erp_ids nunca termina
    pub hanging: HashSet<String>,
    pub attempts: Mutex<Vec<String>>,
}

impl InMemoryCatalog {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn hanging_on(ids: &[&str]) -> Self {
        Self {
            hanging: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn products(&self, partition: &TenantPartition) -> Vec<Product> {
        self.rows
            .lock()
            .unwrap()
            .get(partition.schema_name())
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn product(&self, partition: &TenantPartition, erp_id: &str) -> Option<Product> {
        self.rows
            .lock()
            .unwrap()
            .get(partition.schema_name())
            .and_then(|rows| rows.get(erp_id).cloned())
    }

    pub fn attempted(&self, erp_id: &str) -> bool {
        self.attempts.lock().unwrap().iter().any(|a| a == erp_id)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn ensure_partition(&self, partition: &TenantPartition) -> Result<(), AppError> {
        self.rows
            .lock()
            .unwrap()
            .entry(partition.schema_name().to_string())
            .or_default();
        Ok(())
    }

    async fn upsert_erp_item(
        &self,
        partition: &TenantPartition,
        item: &NormalizedItem,
        synced_at: DateTime<Utc>,
        update_prices: bool,
    ) -> Result<Product, AppError> {
        self.attempts.lock().unwrap().push(item.erp_id.clone());
        if self.hanging.contains(&item.erp_id) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&item.erp_id) {
            return Err(anyhow::anyhow!("violação de restrição em {}", item.erp_id).into());
        }

        let mut rows = self.rows.lock().unwrap();
        let table = rows.entry(partition.schema_name().to_string()).or_default();

        let product = match table.get(&item.erp_id) {
            Some(existing) => Product {
                title: item.title.clone(),
                description: item.description.clone(),
                sale_price: if update_prices { item.sale_price } else { existing.sale_price },
                promotional_price: if update_prices {
                    item.promotional_price
                } else {
                    existing.promotional_price
                },
                active: item.is_active,
                last_sync: Some(synced_at),
                updated_at: synced_at,
                ..existing.clone()
            },
            None => Product {
                id: Uuid::new_v4(),
                erp_id: Some(item.erp_id.clone()),
                title: item.title.clone(),
                description: item.description.clone(),
                sale_price: item.sale_price,
                promotional_price: item.promotional_price,
                active: item.is_active,
                source: ProductSource::Erp,
                last_sync: Some(synced_at),
                created_at: synced_at,
                updated_at: synced_at,
            },
        };

        table.insert(item.erp_id.clone(), product.clone());
        Ok(product)
    }

    async fn list_products(&self, partition: &TenantPartition) -> Result<Vec<Product>, AppError> {
        Ok(self.products(partition))
    }
}

// ---
// ERP roteirizado: um catálogo por token, falhas por página, ou travado
// ---

pub struct ScriptedErp {
    page_size: usize,
    catalogs: HashMap<String, Vec<Result<NormalizedItem, ItemRejection>>>,
    failures: HashMap<u32, ErpError>,
    hang: bool,
    pub fetched: Mutex<Vec<u32>>,
}

impl ScriptedErp {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            catalogs: HashMap::new(),
            failures: HashMap::new(),
            hang: false,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_catalog(mut self, token: &str, items: Vec<Result<NormalizedItem, ItemRejection>>) -> Self {
        self.catalogs.insert(token.to_string(), items);
        self
    }

    pub fn failing_on_page(mut self, page: u32, err: ErpError) -> Self {
        self.failures.insert(page, err);
        self
    }

    /// Nenhuma página responde (só timeout ou cancelamento encerram).
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn pages_fetched(&self) -> Vec<u32> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErpClient for ScriptedErp {
    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_page(&self, credential: &str, page: u32) -> Result<ErpPage, ErpError> {
        self.fetched.lock().unwrap().push(page);

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.failures.get(&page) {
            return Err(err.clone());
        }

        let catalog = self
            .catalogs
            .get(credential)
            .ok_or_else(|| ErpError::Rejected("Token inválido ou não informado".to_string()))?;

        let start = (page as usize - 1) * self.page_size;
        let items = catalog
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();

        Ok(ErpPage { items })
    }
}

// ---
// Montagem do serviço com as peças em memória
// ---

pub struct Fixture {
    pub integrations: Arc<InMemoryIntegrations>,
    pub ledger: Arc<InMemoryLedger>,
    pub catalog: Arc<InMemoryCatalog>,
    pub erp: Arc<ScriptedErp>,
}

impl Fixture {
    pub fn new(erp: ScriptedErp, catalog: InMemoryCatalog) -> Self {
        Self {
            integrations: Arc::new(InMemoryIntegrations::default()),
            ledger: Arc::new(InMemoryLedger::default()),
            catalog: Arc::new(catalog),
            erp: Arc::new(erp),
        }
    }

    pub fn service(&self, limits: SyncLimits) -> SyncService {
        SyncService::new(
            self.integrations.clone(),
            self.ledger.clone(),
            self.catalog.clone(),
            self.erp.clone(),
            limits,
        )
    }
}
