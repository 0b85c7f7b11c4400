use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod order_sessions;
pub mod referral_claims;
pub mod webhook_events;

pub const SQLITE_DB_URL: &str = "sqlite://data/tss.db";

pub fn db_url() -> String {
    let result = env::var("TSS_DATABASE_URL").unwrap_or_else(|_| {
        info!("TSS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
