//! `ALERT_WEBHOOK_URL` seeds exactly one destination, and re-seeding
//! (e.g. on a server restart) never duplicates it.

mod common;

use ew_server::db;
use sqlx::PgPool;

#[sqlx::test(migrations = "../ew-server/migrations")]
async fn seeding_is_idempotent_and_leaves_operator_destinations_alone(pool: PgPool) {
    db::notifications::ensure_default_destination(&pool, "https://hooks.example.com/a")
        .await
        .unwrap();
    db::notifications::ensure_default_destination(&pool, "https://hooks.example.com/a")
        .await
        .unwrap();

    let destinations = db::notifications::list_enabled(&pool).await.unwrap();
    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0].webhook_url, "https://hooks.example.com/a");

    db::notifications::ensure_default_destination(&pool, "https://hooks.example.com/b")
        .await
        .unwrap();
    let destinations = db::notifications::list_enabled(&pool).await.unwrap();
    assert_eq!(destinations.len(), 2, "a distinct url seeds a second destination rather than replacing the first");
}
