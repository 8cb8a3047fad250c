//! Postgres-backed repositories for the control plane.
//!
//! Every repository function takes a `&PgPool` or an open transaction and
//! returns [`CpError`] on failure — callers never see a raw `sqlx::Error`.
//! Soft-delete (`is_deleted = false`), ownership (`user_id = …`), and
//! ordering (`created_at desc, id desc`) predicates are applied by the
//! functions in this crate, not by callers.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod messages;
pub mod presets;
pub mod projects;
pub mod runs;
pub mod sessions;
pub mod tool_executions;
pub mod usage;

use cp_error::{CpError, ErrorCode};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default page size for list queries that receive no explicit `limit`.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// A `(limit, offset)` pair for list queries.
///
/// `limit = None` means "no limit" (return every matching row); callers that
/// want the default page size should pass `Page::default()`.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Maximum rows to return, or `None` for no limit.
    pub limit: Option<i64>,
    /// Rows to skip before collecting results.
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Some(DEFAULT_PAGE_SIZE),
            offset: 0,
        }
    }
}

/// Connect to Postgres and verify connectivity.
pub async fn connect(database_url: &str) -> Result<PgPool, CpError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(CpError::database)
}

/// Run the embedded migrations against `pool`.
pub async fn migrate(pool: &PgPool) -> Result<(), CpError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CpError::new(ErrorCode::MigrationFailed, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_uses_standard_page_size() {
        let page = Page::default();
        assert_eq!(page.limit, Some(DEFAULT_PAGE_SIZE));
        assert_eq!(page.offset, 0);
    }
}
