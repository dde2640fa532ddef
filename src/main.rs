//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;
use crate::services::scheduler::SyncScheduler;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Enums compartilhadas + tabelas de integração e livro-razão (schema public)
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // --- Agendador ---
    let tick = app_state.settings.scheduler_tick;
    if tick.is_zero() {
        tracing::info!("Agendador desligado (SCHEDULER_TICK_SECS=0)");
    } else {
        let scheduler = SyncScheduler::new(
            app_state.sync_service.clone(),
            app_state.integrations.clone(),
            tick,
        );
        app_state.tracker.spawn(scheduler.run(app_state.shutdown.clone()));
    }

    // Integração com o Tiny (todas exigem sessão)
    let erp_routes = Router::new()
        .route("/"
               ,post(handlers::erp::connect_credentials)
               .get(handlers::erp::get_status)
               .delete(handlers::erp::disconnect)
        )
        .route("/auth", post(handlers::erp::connect_token))
        .route("/settings"
               ,get(handlers::settings::get_settings)
               .put(handlers::settings::update_settings)
        )
        .route("/sync", post(handlers::erp::start_sync))
        .route("/sync/runs", get(handlers::erp::list_runs))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let catalog_routes = Router::new()
        .route("/products", get(handlers::catalog::list_products))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let shutdown = app_state.shutdown.clone();
    let tracker = app_state.tracker.clone();
    let addr = app_state.settings.bind_addr.clone();

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/erp/tiny", erp_routes)
        .nest("/api/catalog", catalog_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Erro no servidor Axum");

    // Execuções em andamento já receberam o cancelamento; espera todas fecharem o livro-razão.
    tracker.close();
    tracker.wait().await;
    tracing::info!("Servidor encerrado");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Falha ao instalar o handler de Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Falha ao instalar o handler de SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("🛑 Desligando: cancelando sincronizações em andamento");
    shutdown.cancel();
}
