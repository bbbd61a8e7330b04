//! S3 — control apply-once (spec.md §4.4, §8): an operator-enqueued
//! command is delivered once over `GET /device-policy`, acknowledged
//! exactly once, and a fresh enqueue supersedes whatever was pending.

mod common;

use ew_protocol::commands::{CommandAckRequest, ControlCommandPayload};
use ew_protocol::device::OperationMode;
use ew_server::commands::queue;
use ew_server::db;
use sqlx::PgPool;

#[sqlx::test(migrations = "../ew-server/migrations")]
async fn enqueued_command_is_delivered_acked_once_and_superseded_by_the_next(pool: PgPool) {
    common::register_device(&pool, "dev-1").await;
    let now = chrono::Utc::now();

    let first_id = queue::enqueue(
        &pool,
        "dev-1",
        ControlCommandPayload::SetOperationMode {
            operation_mode: OperationMode::Sleep,
            sleep_poll_interval_s: Some(3600),
        },
        300,
        now,
    )
    .await
    .unwrap();

    let pending = db::commands::find_pending_for_device(&pool, "dev-1")
        .await
        .unwrap()
        .expect("first command should be pending");
    assert_eq!(pending.id, first_id);

    queue::acknowledge(
        &pool,
        "dev-1",
        CommandAckRequest {
            command_id: first_id,
            applied: true,
            error: None,
        },
        now,
    )
    .await
    .unwrap();

    let acked = db::commands::get_by_id(&pool, first_id).await.unwrap().unwrap();
    assert_eq!(acked.status, "acknowledged");
    assert!(db::commands::find_pending_for_device(&pool, "dev-1")
        .await
        .unwrap()
        .is_none());

    // A retried ack for the same command is a no-op, not an error.
    queue::acknowledge(
        &pool,
        "dev-1",
        CommandAckRequest {
            command_id: first_id,
            applied: true,
            error: None,
        },
        now,
    )
    .await
    .unwrap();
    let still_acked = db::commands::get_by_id(&pool, first_id).await.unwrap().unwrap();
    assert_eq!(still_acked.status, "acknowledged");

    let second_id = queue::enqueue(
        &pool,
        "dev-1",
        ControlCommandPayload::Shutdown { grace_s: 30 },
        300,
        now,
    )
    .await
    .unwrap();
    assert_ne!(second_id, first_id);

    let second_pending = db::commands::find_pending_for_device(&pool, "dev-1")
        .await
        .unwrap()
        .expect("second command should now be pending");
    assert_eq!(second_pending.id, second_id);

    // Acking the wrong (no-longer-pending) command id must not disturb
    // the currently pending one.
    let conflict = queue::acknowledge(
        &pool,
        "dev-1",
        CommandAckRequest {
            command_id: first_id,
            applied: true,
            error: None,
        },
        now,
    )
    .await;
    assert!(conflict.is_ok(), "acking an already-acknowledged command is idempotent, not an error");

    let still_second_pending = db::commands::find_pending_for_device(&pool, "dev-1")
        .await
        .unwrap()
        .expect("second command is unaffected by a stale ack on the first");
    assert_eq!(still_second_pending.id, second_id);
}
