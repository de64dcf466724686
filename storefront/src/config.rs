// storefront/src/config.rs

use crate::errors::{AppError, Result};
use crate::services::payment_gateway::MerchantProfile;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  Postgres,
  Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
  Live,
  Sandbox,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub store_backend: StoreBackend,
  pub database_url: Option<String>,
  pub run_migrations: bool,

  pub gateway_mode: GatewayMode,
  pub gateway_base_url: String,
  pub gateway_token: String,
  pub gateway_timeout_secs: u64,
  pub merchant: MerchantProfile,
  pub payment_qr_ttl_secs: i64,

  pub order_number_prefix: String,
  pub order_number_attempts: u32,

  pub settlement_retry_max_attempts: u32,
  pub settlement_retry_base_delay_ms: u64,

  pub webhook_secret: Option<String>,
}

fn parse_env<T: FromStr>(var_name: &str, default: T) -> Result<T>
where
  T::Err: std::fmt::Display,
{
  match env::var(var_name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, raw, e))),
    Err(_) => Ok(default),
  }
}

fn string_env(var_name: &str, default: &str) -> String {
  env::var(var_name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    let defaults = Self::local_defaults();

    let store_backend = match string_env("STORE_BACKEND", "postgres").to_ascii_lowercase().as_str() {
      "postgres" => StoreBackend::Postgres,
      "memory" => StoreBackend::Memory,
      other => return Err(AppError::Config(format!("Invalid STORE_BACKEND '{}'", other))),
    };
    let database_url = env::var("DATABASE_URL").ok();
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
      return Err(AppError::Config(
        "Missing environment variable 'DATABASE_URL' (required for STORE_BACKEND=postgres)".to_string(),
      ));
    }

    let gateway_mode = match string_env("PAYMENT_GATEWAY_MODE", "live").to_ascii_lowercase().as_str() {
      "live" => GatewayMode::Live,
      "sandbox" => GatewayMode::Sandbox,
      other => return Err(AppError::Config(format!("Invalid PAYMENT_GATEWAY_MODE '{}'", other))),
    };
    let gateway_base_url = string_env("PAYMENT_GATEWAY_BASE_URL", &defaults.gateway_base_url);
    let gateway_token = string_env("PAYMENT_GATEWAY_TOKEN", "");
    if gateway_mode == GatewayMode::Live && gateway_token.is_empty() {
      return Err(AppError::Config(
        "PAYMENT_GATEWAY_TOKEN is required when PAYMENT_GATEWAY_MODE=live".to_string(),
      ));
    }

    let m = &defaults.merchant;
    let merchant = MerchantProfile {
      account_id: string_env("MERCHANT_ACCOUNT_ID", &m.account_id),
      merchant_id: string_env("MERCHANT_ID", &m.merchant_id),
      acquiring_bank: string_env("ACQUIRING_BANK", &m.acquiring_bank),
      name: string_env("MERCHANT_NAME", &m.name),
      city: string_env("MERCHANT_CITY", &m.city),
      country: string_env("MERCHANT_COUNTRY", &m.country),
      category_code: string_env("MERCHANT_CATEGORY_CODE", &m.category_code),
    };
    let merchant_fields = [
      ("MERCHANT_ACCOUNT_ID", &merchant.account_id),
      ("MERCHANT_ID", &merchant.merchant_id),
      ("ACQUIRING_BANK", &merchant.acquiring_bank),
      ("MERCHANT_NAME", &merchant.name),
      ("MERCHANT_CITY", &merchant.city),
      ("MERCHANT_COUNTRY", &merchant.country),
      ("MERCHANT_CATEGORY_CODE", &merchant.category_code),
    ];
    if let Some((var_name, _)) = merchant_fields.iter().find(|(_, v)| !v.is_ascii()) {
      return Err(AppError::Config(format!("{} must be ASCII for the payment QR", var_name)));
    }

    let config = Self {
      server_host: string_env("SERVER_HOST", &defaults.server_host),
      server_port: parse_env("SERVER_PORT", defaults.server_port)?,
      store_backend,
      database_url,
      run_migrations: parse_env("RUN_MIGRATIONS", defaults.run_migrations)?,
      gateway_mode,
      gateway_base_url,
      gateway_token,
      gateway_timeout_secs: parse_env("PAYMENT_GATEWAY_TIMEOUT_SECS", defaults.gateway_timeout_secs)?,
      merchant,
      payment_qr_ttl_secs: parse_env("PAYMENT_QR_TTL_SECS", defaults.payment_qr_ttl_secs)?,
      order_number_prefix: string_env("ORDER_NUMBER_PREFIX", &defaults.order_number_prefix),
      order_number_attempts: parse_env("ORDER_NUMBER_ATTEMPTS", defaults.order_number_attempts)?,
      settlement_retry_max_attempts: parse_env(
        "SETTLEMENT_RETRY_MAX_ATTEMPTS",
        defaults.settlement_retry_max_attempts,
      )?,
      settlement_retry_base_delay_ms: parse_env(
        "SETTLEMENT_RETRY_BASE_DELAY_MS",
        defaults.settlement_retry_base_delay_ms,
      )?,
      webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
    };

    if config.payment_qr_ttl_secs <= 0 {
      return Err(AppError::Config("PAYMENT_QR_TTL_SECS must be positive".to_string()));
    }
    if config.order_number_attempts == 0 {
      return Err(AppError::Config("ORDER_NUMBER_ATTEMPTS must be at least 1".to_string()));
    }

    tracing::info!(
      store_backend = ?config.store_backend,
      gateway_mode = ?config.gateway_mode,
      "Application configuration loaded successfully."
    );
    Ok(config)
  }

  /// Defaults for every setting: in-memory store, sandbox gateway.
  pub fn local_defaults() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      store_backend: StoreBackend::Memory,
      database_url: None,
      run_migrations: true,
      gateway_mode: GatewayMode::Sandbox,
      gateway_base_url: "https://api-bakong.nbc.gov.kh".to_string(),
      gateway_token: String::new(),
      gateway_timeout_secs: 10,
      merchant: MerchantProfile {
        account_id: "seamline@bank".to_string(),
        merchant_id: "SEAMLINE01".to_string(),
        acquiring_bank: "Seamline Bank".to_string(),
        name: "Seamline Apparel".to_string(),
        city: "Phnom Penh".to_string(),
        country: "KH".to_string(),
        category_code: "5691".to_string(),
      },
      payment_qr_ttl_secs: 180,
      order_number_prefix: "ORD".to_string(),
      order_number_attempts: 5,
      settlement_retry_max_attempts: 8,
      settlement_retry_base_delay_ms: 500,
      webhook_secret: None,
    }
  }

  pub fn qr_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.payment_qr_ttl_secs)
  }
}
