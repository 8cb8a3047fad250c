//! The `{code, message, data}` wrapper every successful response wears.
//!
//! Failures go through [`cp_error::CpError`]'s own `IntoResponse` impl
//! instead, which renders a `{code: "SCREAMING_CASE", message, data}` shape —
//! deliberately not the same Rust type as this one, since unifying a literal
//! `0` with a stable string tag under one field would cost static typing for
//! no reader benefit.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Wraps a successful handler's payload in the `{code: 0, message, data}` envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    code: i32,
    message: &'static str,
    data: T,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap `data` as a success response with the default `"ok"` message.
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            message: "ok",
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
