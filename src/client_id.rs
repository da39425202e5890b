//! Stable per-device client identifier
//!
//! Generated once and kept in the `settings` table so that documents written
//! by this device can be recognised across restarts.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

const CLIENT_ID_KEY: &str = "client_id";

/// Return the stored client id, creating one on first use
pub async fn get_or_create(pool: &SqlitePool) -> Result<String> {
    let candidate = Uuid::new_v4().to_string();

    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(CLIENT_ID_KEY)
        .bind(&candidate)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!(client_id = %candidate, "Generated new client id");
        return Ok(candidate);
    }

    let (client_id,): (String,) = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(CLIENT_ID_KEY)
        .fetch_one(pool)
        .await?;

    Ok(client_id)
}
