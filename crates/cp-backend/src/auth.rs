//! Pluggable principal extractor.
//!
//! Authentication proper is out of scope for this service (see the system
//! overview); callers are expected to sit behind a gateway that establishes
//! identity and forwards it in the `X-User-Id` header. [`UserId`] is the one
//! seam that gateway would plug into.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cp_error::{CpError, ErrorCode};

/// The authenticated caller's user id, extracted from `X-User-Id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = CpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("x-user-id")
            .ok_or_else(|| CpError::new(ErrorCode::Unauthorized, "missing X-User-Id header"))?;
        let s = value
            .to_str()
            .map_err(|_| CpError::new(ErrorCode::Unauthorized, "X-User-Id header is not valid UTF-8"))?
            .trim();
        if s.is_empty() {
            return Err(CpError::new(ErrorCode::Unauthorized, "X-User-Id header is empty"));
        }
        Ok(UserId(s.to_string()))
    }
}
