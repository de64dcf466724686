// storefront/src/services/gateway_http.rs

//! Live gateway client. Instruments are built locally; settlement is looked up
//! over HTTP with a bearer token.

use crate::services::payment_gateway::{
  build_instrument, GatewayError, InstrumentRequest, PaymentGateway, PaymentInstrument, SettlementStatus,
};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use tracing::{instrument, warn};

pub const CHECK_PATH: &str = "/v1/check_transaction_by_hash";

pub struct HttpPaymentGateway {
  client: reqwest::Client,
  base_url: String,
  token: String,
  ttl: Duration,
}

impl HttpPaymentGateway {
  pub fn new(base_url: &str, token: &str, timeout: std::time::Duration, ttl: Duration) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| GatewayError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      token: token.to_string(),
      ttl,
    })
  }
}

/// Settled iff the body says `responseCode == 0` and carries `data`.
pub fn interpret_check_response(body: serde_json::Value) -> SettlementStatus {
  let code = body.get("responseCode").and_then(|c| c.as_i64());
  let has_data = body.get("data").is_some_and(|d| !d.is_null());
  SettlementStatus {
    settled: code == Some(0) && has_data,
    raw: body,
  }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
  fn name(&self) -> &str {
    "khqr"
  }

  async fn generate_instrument(&self, req: &InstrumentRequest) -> Result<PaymentInstrument, GatewayError> {
    build_instrument(req, self.ttl)
  }

  #[instrument(name = "gateway::query_settlement", skip(self), fields(gateway = "khqr"))]
  async fn query_settlement(&self, settlement_hash: &str) -> SettlementStatus {
    let url = format!("{}{}", self.base_url, CHECK_PATH);
    let resp = match self
      .client
      .post(&url)
      .bearer_auth(&self.token)
      .json(&json!({ "hash": settlement_hash }))
      .send()
      .await
    {
      Ok(resp) => resp,
      Err(e) => {
        warn!(error = %e, "Settlement query failed in transport.");
        return SettlementStatus::unsettled(format!("transport: {}", e));
      }
    };

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
      warn!(http_status = %status, "Settlement query returned non-200.");
      return SettlementStatus::unsettled(format!("http status {}", status.as_u16()));
    }

    match resp.json::<serde_json::Value>().await {
      Ok(body) => interpret_check_response(body),
      Err(e) => {
        warn!(error = %e, "Settlement query returned a malformed body.");
        SettlementStatus::unsettled(format!("malformed body: {}", e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_code_zero_with_data_is_settled() {
    assert!(interpret_check_response(json!({"responseCode": 0, "data": {"amount": 100}})).settled);
    assert!(!interpret_check_response(json!({"responseCode": 0, "data": null})).settled);
    assert!(!interpret_check_response(json!({"responseCode": 1, "data": {}})).settled);
    assert!(!interpret_check_response(json!({"unexpected": true})).settled);
  }
}
