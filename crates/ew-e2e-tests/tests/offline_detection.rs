//! S4 — offline detection (spec.md §8): a device silent past
//! `offline_after_s` is swept into `device_offline`; once it is heard
//! from again the alert resolves and a `device_online` record appears.

mod common;

use chrono::{Duration, Utc};
use ew_protocol::alerts::alert_type;
use ew_server::alerts::offline;
use ew_server::db;
use sqlx::PgPool;

#[sqlx::test(migrations = "../ew-server/migrations")]
async fn silence_past_offline_after_s_opens_and_then_resolves(pool: PgPool) {
    common::register_device(&pool, "dev-1").await;

    let now = Utc::now();
    // touch_last_seen only ever advances last_seen_at, so backdating it
    // needs a direct update instead.
    sqlx::query("UPDATE devices SET last_seen_at = $1 WHERE device_id = $2")
        .bind(now - Duration::seconds(400))
        .bind("dev-1")
        .execute(&pool)
        .await
        .unwrap();

    offline::sweep(&pool, now).await.unwrap();

    let open = db::alerts::find_open(&pool, "dev-1", alert_type::DEVICE_OFFLINE)
        .await
        .unwrap();
    assert!(open.is_some(), "device silent for 400s with offline_after_s=300 should be offline");

    let later = now + Duration::seconds(30);
    db::devices::touch_last_seen(&pool, "dev-1", later)
        .await
        .unwrap();

    offline::sweep(&pool, later).await.unwrap();

    let still_open = db::alerts::find_open(&pool, "dev-1", alert_type::DEVICE_OFFLINE)
        .await
        .unwrap();
    assert!(still_open.is_none(), "a fresh heartbeat should resolve the offline alert");

    let recent = db::alerts::list(&pool, Some("dev-1"), false, 100).await.unwrap();
    assert!(
        recent.iter().any(|a| a.alert_type == alert_type::DEVICE_ONLINE),
        "resolving offline should record a device_online entry"
    );
}
