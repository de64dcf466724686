// storefront/src/main.rs

use storefront::config::{AppConfig, GatewayMode, StoreBackend};
use storefront::db::{MemoryStore, PgStore};
use storefront::errors::AppError;
use storefront::pipelines::settlement_effects::recover_pending_settlements;
use storefront::services::clock::SystemClock;
use storefront::services::gateway_http::HttpPaymentGateway;
use storefront::services::payment_sandbox::SandboxGateway;
use storefront::services::settlement_worker::spawn_worker;
use storefront::state::{AppState, StoreHandles};
use storefront::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn startup_error(context: &str, err: AppError) -> std::io::Error {
  tracing::error!(error = %err, "{}", context);
  std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

async fn build_stores(config: &AppConfig) -> Result<StoreHandles, AppError> {
  match config.store_backend {
    StoreBackend::Memory => {
      tracing::warn!("Using the in-memory store; data is lost on restart.");
      Ok(StoreHandles::from_memory(Arc::new(MemoryStore::new())))
    }
    StoreBackend::Postgres => {
      let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;
      let store = PgStore::connect(url).await?;
      if config.run_migrations {
        store.run_migrations().await?;
      }
      Ok(StoreHandles::from_postgres(store))
    }
  }
}

fn build_state(stores: StoreHandles, config: AppConfig) -> Result<AppState, AppError> {
  let clock = Arc::new(SystemClock);
  match config.gateway_mode {
    GatewayMode::Sandbox => {
      tracing::warn!("Payment gateway in SANDBOX mode; settlements are simulated.");
      let sandbox = Arc::new(SandboxGateway::new(config.qr_ttl()));
      Ok(AppState::with_sandbox(stores, sandbox, clock, config))
    }
    GatewayMode::Live => {
      let gateway = HttpPaymentGateway::new(
        &config.gateway_base_url,
        &config.gateway_token,
        Duration::from_secs(config.gateway_timeout_secs),
        config.qr_ttl(),
      )?;
      Ok(AppState::new(stores, Arc::new(gateway), None, clock, config))
    }
  }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting storefront server...");

  let app_config = AppConfig::from_env().map_err(|e| startup_error("Failed to load application configuration", e))?;
  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);

  let stores = build_stores(&app_config)
    .await
    .map_err(|e| startup_error("Failed to initialise the store", e))?;
  let app_state = build_state(stores, app_config).map_err(|e| startup_error("Failed to initialise the gateway", e))?;

  match recover_pending_settlements(&app_state).await {
    Ok(0) => tracing::info!("No unsettled payments to recover."),
    Ok(queued) => tracing::info!(queued, "Queued unsettled post-payment effects for retry."),
    Err(e) => tracing::error!(error = %e, "Settlement recovery sweep failed; continuing startup."),
  }
  let _worker = spawn_worker(app_state.clone());

  let sandbox_enabled = app_state.sandbox.is_some();
  tracing::info!("Attempting to bind server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes(sandbox_enabled))
  })
  .bind(&server_address)?
  .run()
  .await
}
