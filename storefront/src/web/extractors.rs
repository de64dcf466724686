// storefront/src/web/extractors.rs

//! Caller identity as resolved by the upstream auth collaborator.

use crate::errors::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

pub const CUSTOMER_ID_HEADER: &str = "X-Customer-Id";
pub const CUSTOMER_ROLE_HEADER: &str = "X-Customer-Role";

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct AuthenticatedCustomer {
  pub customer_id: Uuid,
  pub role: Option<String>,
}

impl AuthenticatedCustomer {
  pub fn is_admin(&self) -> bool {
    self.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
  }

  pub fn require_admin(&self) -> Result<(), AppError> {
    if self.is_admin() {
      Ok(())
    } else {
      Err(AppError::Forbidden("Administrator role required".to_string()))
    }
  }
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

impl FromRequest for AuthenticatedCustomer {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let customer_id = header_str(req, CUSTOMER_ID_HEADER).and_then(|raw| Uuid::parse_str(raw).ok());
    let Some(customer_id) = customer_id else {
      warn!("Missing or invalid {} header.", CUSTOMER_ID_HEADER);
      return ready(Err(AppError::Auth(format!(
        "Authentication required: missing or invalid {} header",
        CUSTOMER_ID_HEADER
      ))));
    };
    let role = header_str(req, CUSTOMER_ROLE_HEADER)
      .filter(|r| !r.is_empty())
      .map(str::to_string);
    ready(Ok(AuthenticatedCustomer { customer_id, role }))
  }
}
