//! S1 — ingest dedupe (spec.md §8): resubmitting the same
//! `message_id` is accepted once and counted as a duplicate thereafter.

mod common;

use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

#[sqlx::test(migrations = "../ew-server/migrations")]
async fn resubmitting_the_same_message_id_is_a_duplicate(pool: PgPool) {
    common::register_device(&pool, "dev-1").await;
    let app = ew_server::routes::build_router(common::build_state(pool));

    let body = json!({
        "points": [{
            "message_id": "m-1",
            "ts": "2026-01-01T00:00:00Z",
            "metrics": {"water_pressure_psi": 40.0}
        }]
    });

    let first = post_ingest(app.clone(), &body).await;
    assert_eq!(first["accepted"], 1);
    assert_eq!(first["duplicates"], 0);
    assert_eq!(first["quarantined"], 0);

    let second = post_ingest(app, &body).await;
    assert_eq!(second["accepted"], 0);
    assert_eq!(second["duplicates"], 1);
    assert_eq!(second["quarantined"], 0);
}

async fn post_ingest(app: axum::Router, body: &Value) -> Value {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/ingest")
        .header("authorization", common::bearer_header())
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
