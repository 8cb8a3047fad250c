//! Integration tests against a live Postgres instance.
//!
//! Run with `DATABASE_URL` pointing at a scratch database and
//! `--features postgres-tests`. These exercise the properties that only
//! show up under real row locking (`FOR UPDATE SKIP LOCKED`) and can't be
//! faked with an in-process mock.
#![cfg(feature = "postgres-tests")]

use cp_core::{ConfigValue, MessageRole, RunError};
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-tests");
    let pool = cp_db::connect(&url).await.expect("connect");
    cp_db::migrate(&pool).await.expect("migrate");
    pool
}

async fn seed_run(pool: &PgPool) -> Uuid {
    let user_id = format!("user-{}", Uuid::new_v4());
    let session = cp_db::sessions::create(pool, &user_id, None, &ConfigValue::empty_map())
        .await
        .unwrap();
    let message = cp_db::messages::append(
        pool,
        session.id,
        MessageRole::User,
        &ConfigValue::String("do the thing".into()),
        None,
    )
    .await
    .unwrap();
    let run = cp_db::runs::create(pool, session.id, message.id, &ConfigValue::empty_map())
        .await
        .unwrap();
    run.id
}

#[tokio::test]
async fn claim_is_single_flight_under_concurrency() {
    let pool = pool().await;
    let run_id = seed_run(&pool).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            cp_db::runs::claim_next_run(&pool, &format!("worker-{i}"), None)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some((run, _token)) = handle.await.unwrap() {
            assert_eq!(run.id, run_id);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn start_requires_matching_claim_token() {
    let pool = pool().await;
    let run_id = seed_run(&pool).await;

    let (_, token) = cp_db::runs::claim_next_run(&pool, "worker-1", None)
        .await
        .unwrap()
        .expect("one run queued");

    let err = cp_db::runs::start_run(&pool, run_id, "wrong-token", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, cp_error::ErrorCode::StaleClaim);

    let run = cp_db::runs::start_run(&pool, run_id, &token, None).await.unwrap();
    assert_eq!(run.status, cp_core::RunStatus::Running);

    // Idempotent: calling again with the same token is a no-op, not an error.
    let run_again = cp_db::runs::start_run(&pool, run_id, &token, None).await.unwrap();
    assert_eq!(run_again.status, cp_core::RunStatus::Running);
}

#[tokio::test]
async fn fail_run_is_terminal_and_updates_session() {
    let pool = pool().await;
    let run_id = seed_run(&pool).await;
    let (run, token) = cp_db::runs::claim_next_run(&pool, "worker-1", None)
        .await
        .unwrap()
        .unwrap();

    cp_db::runs::start_run(&pool, run.id, &token, None).await.unwrap();
    let failed = cp_db::runs::fail_run(
        &pool,
        run_id,
        &token,
        RunError {
            code: "EXECUTOR_CRASHED".into(),
            message: "boom".into(),
            details: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(failed.status, cp_core::RunStatus::Failed);
    assert!(failed.finished_at.is_some());

    let err = cp_db::runs::fail_run(
        &pool,
        run_id,
        &token,
        RunError {
            code: "AGAIN".into(),
            message: "retry".into(),
            details: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, cp_error::ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn orphaned_claims_are_released_after_ttl() {
    let pool = pool().await;
    let run_id = seed_run(&pool).await;
    cp_db::runs::claim_next_run(&pool, "worker-1", None)
        .await
        .unwrap()
        .unwrap();

    // Not yet past the (generous) TTL: nothing released.
    let released = cp_db::runs::release_orphaned_claims(&pool, chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(released, 0);

    let released = cp_db::runs::release_orphaned_claims(&pool, chrono::Duration::zero())
        .await
        .unwrap();
    assert_eq!(released, 1);

    let run = cp_db::runs::get(&pool, run_id).await.unwrap();
    assert_eq!(run.status, cp_core::RunStatus::Queued);
    assert_eq!(run.attempt, 1);
    assert!(run.claim_token.is_none());
}

#[tokio::test]
async fn messages_list_in_insertion_order() {
    let pool = pool().await;
    let user_id = format!("user-{}", Uuid::new_v4());
    let session = cp_db::sessions::create(&pool, &user_id, None, &ConfigValue::empty_map())
        .await
        .unwrap();

    for i in 0..3 {
        cp_db::messages::append(
            &pool,
            session.id,
            MessageRole::User,
            &ConfigValue::String(format!("message {i}")),
            None,
        )
        .await
        .unwrap();
    }

    let messages = cp_db::messages::list_by_session(&pool, session.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.content.as_str(), Some(format!("message {i}").as_str()));
    }
}

#[tokio::test]
async fn tool_execution_rejects_out_of_order_finish() {
    let pool = pool().await;
    let run_id = seed_run(&pool).await;
    let run = cp_db::runs::get(&pool, run_id).await.unwrap();

    let started_at = chrono::Utc::now();
    let exec = cp_db::tool_executions::start(
        &pool,
        run.session_id,
        run_id,
        "bash",
        &ConfigValue::empty_map(),
        started_at,
    )
    .await
    .unwrap();

    let before_start = started_at - chrono::Duration::seconds(5);
    let err = cp_db::tool_executions::finish(&pool, exec.id, None, None, before_start)
        .await
        .unwrap_err();
    assert_eq!(err.code, cp_error::ErrorCode::BadRequest);

    let finished = cp_db::tool_executions::finish(&pool, exec.id, None, None, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(finished.status, cp_core::ToolExecutionStatus::Finished);
}
