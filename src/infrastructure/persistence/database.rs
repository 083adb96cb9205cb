use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Connection to the platform database. This core only reads from it.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Create the exchange account table when absent so fresh environments
    /// and tests come up without migrations. Production schemas are owned by
    /// the platform.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exchange_accounts (
                user_id TEXT NOT NULL,
                exchange_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                trading_enabled INTEGER NOT NULL DEFAULT 1,
                allowed_symbols TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (user_id, exchange_name)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create exchange_accounts table")?;

        Ok(())
    }
}
