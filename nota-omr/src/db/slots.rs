//! Recognition slot tracking
//!
//! Each in-flight recognition run holds one row in `recognition_slots`.
//! Rows carry an expiry so a crashed run cannot pin the count forever:
//! expired rows are ignored by the count and swept opportunistically.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use nota_common::Result;

/// Slots self-expire after this long; recognition runs are bounded well below it
const SLOT_TTL_SECS: i64 = 3600;

/// Acquire a recognition slot, returning its id for later release
pub async fn acquire_slot(pool: &SqlitePool) -> Result<Uuid> {
    let slot_id = Uuid::new_v4();
    let now = Utc::now();
    let expires = now + Duration::seconds(SLOT_TTL_SECS);

    sqlx::query("INSERT INTO recognition_slots (slot_id, acquired_at, expires_at) VALUES (?, ?, ?)")
        .bind(slot_id.to_string())
        .bind(now.to_rfc3339())
        .bind(expires.to_rfc3339())
        .execute(pool)
        .await?;

    Ok(slot_id)
}

/// Release a recognition slot; releasing an already-gone slot is a no-op
pub async fn release_slot(pool: &SqlitePool, slot_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM recognition_slots WHERE slot_id = ?")
        .bind(slot_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Count non-expired slots, sweeping expired rows first
pub async fn count_active_slots(pool: &SqlitePool) -> Result<u64> {
    let now = Utc::now().to_rfc3339();

    sqlx::query("DELETE FROM recognition_slots WHERE expires_at < ?")
        .bind(&now)
        .execute(pool)
        .await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recognition_slots WHERE expires_at >= ?")
        .bind(&now)
        .fetch_one(pool)
        .await?;

    Ok(count.max(0) as u64)
}
