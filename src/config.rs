// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, str::FromStr, sync::Arc, time::Duration};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    db::{
        CatalogRepository, IntegrationRepository, IntegrationStore, ProductCatalog,
        SyncRunRepository,
    },
    services::{
        auth::AuthService,
        erp_client::TinyClient,
        integration_service::IntegrationService,
        sync_service::{SyncLimits, SyncService},
    },
};

const DEFAULT_TINY_API_URL: &str = "https://api.tiny.com.br/api2/produtos.pesquisa.php";

// Lê uma variável opcional; valor presente mas ilegível é erro de configuração.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} inválida: '{raw}'")),
        Err(_) => Ok(default),
    }
}

// Uma execução ainda viva nunca pode parecer abandonada para outra instância.
fn check_limits(limits: &SyncLimits) -> anyhow::Result<()> {
    if limits.max_pages == 0 {
        anyhow::bail!("SYNC_MAX_PAGES deve ser maior que zero");
    }
    if limits.stale_after <= limits.max_run_duration {
        anyhow::bail!(
            "SYNC_STALE_AFTER_SECS ({}) deve ser maior que SYNC_MAX_DURATION_SECS ({})",
            limits.stale_after.as_secs(),
            limits.max_run_duration.as_secs()
        );
    }
    Ok(())
}

/// Configuração lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub bind_addr: String,
    pub tiny_api_url: String,
    pub limits: SyncLimits,
    // Zero desliga o agendador
    pub scheduler_tick: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = SyncLimits::default();

        let limits = SyncLimits {
            request_timeout: Duration::from_secs(env_or(
                "ERP_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_run_duration: Duration::from_secs(env_or(
                "SYNC_MAX_DURATION_SECS",
                defaults.max_run_duration.as_secs(),
            )?),
            max_pages: env_or("SYNC_MAX_PAGES", defaults.max_pages)?,
            stale_after: Duration::from_secs(env_or(
                "SYNC_STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )?),
        };

        check_limits(&limits)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?,
            jwt_audience: env::var("JWT_AUDIENCE").ok().filter(|a| !a.is_empty()),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            tiny_api_url: env_or("TINY_API_URL", DEFAULT_TINY_API_URL.to_string())?,
            limits,
            scheduler_tick: Duration::from_secs(env_or("SCHEDULER_TICK_SECS", 60)?),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub integration_service: IntegrationService,
    pub sync_service: SyncService,
    pub integrations: Arc<dyn IntegrationStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    // Compartilhado com toda execução em andamento e com o agendador
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub settings: Settings,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let settings = Settings::from_env()?;

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let integrations: Arc<dyn IntegrationStore> =
            Arc::new(IntegrationRepository::new(db_pool.clone()));
        let ledger = Arc::new(SyncRunRepository::new(db_pool.clone()));
        let catalog: Arc<dyn ProductCatalog> = Arc::new(CatalogRepository::new(db_pool.clone()));
        let erp = Arc::new(TinyClient::new(
            settings.tiny_api_url.clone(),
            settings.limits.request_timeout,
        )?);

        let auth_service = AuthService::new(settings.jwt_secret.clone(), settings.jwt_audience.clone());
        let integration_service = IntegrationService::new(integrations.clone(), erp.clone());
        let sync_service = SyncService::new(
            integrations.clone(),
            ledger,
            catalog.clone(),
            erp,
            settings.limits.clone(),
        );

        Ok(Self {
            db_pool,
            auth_service,
            integration_service,
            sync_service,
            integrations,
            catalog,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            settings,
        })
    }
}
