//! Repository for [`Project`] rows.

use crate::Page;
use cp_core::Project;
use cp_error::{CpError, ErrorCode};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Create a project owned by `user_id`.
pub async fn create(pool: &PgPool, user_id: &str, name: &str) -> Result<Project, CpError> {
    let row = sqlx::query(
        r#"
        insert into projects (user_id, name)
        values ($1, $2)
        returning id, user_id, name, is_deleted, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Fetch a project by id, scoped to `user_id`.
pub async fn get(pool: &PgPool, user_id: &str, id: Uuid) -> Result<Project, CpError> {
    let row = sqlx::query(
        r#"
        select id, user_id, name, is_deleted, created_at, updated_at
        from projects
        where id = $1 and user_id = $2 and not is_deleted
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::not_found(ErrorCode::ProjectNotFound, "project not found"))?;

    from_row(&row)
}

/// List `user_id`'s projects, most recent first.
pub async fn list(pool: &PgPool, user_id: &str, page: Page) -> Result<Vec<Project>, CpError> {
    let rows = sqlx::query(
        r#"
        select id, user_id, name, is_deleted, created_at, updated_at
        from projects
        where user_id = $1 and not is_deleted
        order by created_at desc, id desc
        limit $2 offset $3
        "#,
    )
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// Rename a project.
pub async fn rename(pool: &PgPool, user_id: &str, id: Uuid, name: &str) -> Result<Project, CpError> {
    let row = sqlx::query(
        r#"
        update projects
        set name = $1, updated_at = now()
        where id = $2 and user_id = $3 and not is_deleted
        returning id, user_id, name, is_deleted, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::not_found(ErrorCode::ProjectNotFound, "project not found"))?;

    from_row(&row)
}

/// Soft-delete a project, clearing `project_id` on every session that
/// referenced it.
pub async fn soft_delete(pool: &PgPool, user_id: &str, id: Uuid) -> Result<(), CpError> {
    let mut tx = pool.begin().await.map_err(CpError::database)?;

    let result = sqlx::query(
        r#"
        update projects
        set is_deleted = true, updated_at = now()
        where id = $1 and user_id = $2 and not is_deleted
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(CpError::database)?;

    if result.rows_affected() == 0 {
        return Err(CpError::not_found(ErrorCode::ProjectNotFound, "project not found"));
    }

    sqlx::query("update agent_sessions set project_id = null, updated_at = now() where project_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(CpError::database)?;

    tx.commit().await.map_err(CpError::database)?;
    Ok(())
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<Project, CpError> {
    Ok(Project {
        id: row.try_get("id").map_err(CpError::database)?,
        user_id: row.try_get("user_id").map_err(CpError::database)?,
        name: row.try_get("name").map_err(CpError::database)?,
        is_deleted: row.try_get("is_deleted").map_err(CpError::database)?,
        created_at: row.try_get("created_at").map_err(CpError::database)?,
        updated_at: row.try_get("updated_at").map_err(CpError::database)?,
    })
}
