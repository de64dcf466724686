// storefront/src/models/money.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies the gateway settles in. Amounts are always carried in the
/// currency's minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "currency_code", rename_all = "UPPERCASE")]
pub enum Currency {
  Usd,
  Khr,
}

impl Currency {
  /// ISO 4217 numeric code, as used in EMV tag 53.
  pub fn numeric_code(&self) -> &'static str {
    match self {
      Currency::Usd => "840",
      Currency::Khr => "116",
    }
  }

  pub fn exponent(&self) -> u32 {
    match self {
      Currency::Usd => 2,
      Currency::Khr => 0,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Currency::Usd => "USD",
      Currency::Khr => "KHR",
    }
  }

  /// Renders a minor-unit amount in major units, e.g. `10000` USD -> `"100.00"`.
  pub fn format_minor(&self, amount_minor: i64) -> String {
    let exp = self.exponent();
    if exp == 0 {
      return amount_minor.to_string();
    }
    let scale = 10_i64.pow(exp);
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!(
      "{}{}.{:0width$}",
      sign,
      abs / scale as u64,
      abs % scale as u64,
      width = exp as usize
    )
  }
}

impl fmt::Display for Currency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

impl TryFrom<String> for Currency {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    match value.to_ascii_uppercase().as_str() {
      "USD" => Ok(Currency::Usd),
      "KHR" => Ok(Currency::Khr),
      other => Err(format!("Unsupported currency '{}'", other)),
    }
  }
}

/// `quantity * unit_price * (100 - discount_pct) / 100`, rounded half up.
/// `None` when the product does not fit in an `i64`.
pub fn discounted_line_total(quantity: i32, unit_price_minor: i64, discount_percentage: i32) -> Option<i64> {
  let gross = i64::from(quantity)
    .checked_mul(unit_price_minor)?
    .checked_mul(i64::from(100 - discount_percentage))?;
  Some(gross.checked_add(50)?.div_euclid(100))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_minor_units() {
    assert_eq!(Currency::Usd.format_minor(10000), "100.00");
    assert_eq!(Currency::Usd.format_minor(5), "0.05");
    assert_eq!(Currency::Khr.format_minor(40000), "40000");
  }

  #[test]
  fn line_total_rounds_half_up() {
    assert_eq!(discounted_line_total(2, 1000, 0), Some(2000));
    assert_eq!(discounted_line_total(1, 999, 10), Some(899));
    // 3 * 333 * 0.85 = 849.15
    assert_eq!(discounted_line_total(3, 333, 15), Some(849));
    // 1 * 5 * 0.5 = 2.5
    assert_eq!(discounted_line_total(1, 5, 50), Some(3));
    assert_eq!(discounted_line_total(4, 2500, 100), Some(0));
  }

  #[test]
  fn line_total_reports_overflow() {
    assert_eq!(discounted_line_total(20, i64::MAX / 10, 0), None);
    assert_eq!(discounted_line_total(i32::MAX, i64::MAX / 1000, 10), None);
    // Fits before the discount multiplier only.
    assert_eq!(discounted_line_total(1, i64::MAX / 2, 0), None);
  }

  #[test]
  fn parses_currency_case_insensitively() {
    assert_eq!(Currency::try_from("usd".to_string()), Ok(Currency::Usd));
    assert!(Currency::try_from("EUR".to_string()).is_err());
  }
}
