// storefront/src/services/order_number.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `<PREFIX>-<YYYYMMDD>-<6 uppercase hex>`. Uniqueness is checked by the caller.
pub fn generate(prefix: &str, now: DateTime<Utc>) -> String {
  let random = Uuid::new_v4();
  let tail: String = random.as_bytes()[..3].iter().map(|b| format!("{:02X}", b)).collect();
  format!("{}-{}-{}", prefix, now.format("%Y%m%d"), tail)
}
