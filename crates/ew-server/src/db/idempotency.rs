use sqlx::PgPool;

/// Message ids already present in either the accepted or the
/// quarantined table for this device — checked before validation so a
/// replayed batch is idempotent regardless of which path a point took
/// the first time it was seen.
pub async fn already_seen(
    pool: &PgPool,
    device_id: &str,
    message_ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }

    let seen: Vec<(String,)> = sqlx::query_as(
        "SELECT message_id FROM telemetry_points WHERE device_id = $1 AND message_id = ANY($2)
         UNION
         SELECT message_id FROM quarantined_points WHERE device_id = $1 AND message_id = ANY($2)",
    )
    .bind(device_id)
    .bind(message_ids)
    .fetch_all(pool)
    .await?;

    Ok(seen.into_iter().map(|(message_id,)| message_id).collect())
}
