// storefront/src/services/payment_sandbox.rs

//! In-process gateway for local development and tests. Settlements happen only
//! when `settle` is called.

use crate::services::payment_gateway::{
  build_instrument, GatewayError, InstrumentRequest, PaymentGateway, PaymentInstrument, SettlementStatus,
};
use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct SandboxGateway {
  ttl: Duration,
  settled: Mutex<HashSet<String>>,
  fail_generation: AtomicBool,
  unreachable: AtomicBool,
  queries: AtomicUsize,
}

impl SandboxGateway {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      settled: Mutex::new(HashSet::new()),
      fail_generation: AtomicBool::new(false),
      unreachable: AtomicBool::new(false),
      queries: AtomicUsize::new(0),
    }
  }

  /// Marks `settlement_hash` as paid by the customer's bank.
  pub fn settle(&self, settlement_hash: &str) {
    self.settled.lock().insert(settlement_hash.to_string());
  }

  pub fn set_fail_generation(&self, fail: bool) {
    self.fail_generation.store(fail, Ordering::SeqCst);
  }

  /// Simulates the gateway being down for settlement queries.
  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  pub fn query_count(&self) -> usize {
    self.queries.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
  fn name(&self) -> &str {
    "sandbox"
  }

  async fn generate_instrument(&self, req: &InstrumentRequest) -> Result<PaymentInstrument, GatewayError> {
    if self.fail_generation.load(Ordering::SeqCst) {
      return Err(GatewayError::Unavailable("sandbox generation disabled".to_string()));
    }
    build_instrument(req, self.ttl)
  }

  async fn query_settlement(&self, settlement_hash: &str) -> SettlementStatus {
    self.queries.fetch_add(1, Ordering::SeqCst);
    if self.unreachable.load(Ordering::SeqCst) {
      return SettlementStatus::unsettled("sandbox unreachable");
    }
    if self.settled.lock().contains(settlement_hash) {
      SettlementStatus {
        settled: true,
        raw: json!({ "responseCode": 0, "data": { "hash": settlement_hash } }),
      }
    } else {
      SettlementStatus {
        settled: false,
        raw: json!({ "responseCode": 1, "responseMessage": "Transaction could not be found" }),
      }
    }
  }
}
