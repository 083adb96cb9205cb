use crate::domain::exchange::ExchangeAccount;
use crate::domain::ports::ExchangeAccountRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// Read-only view over the platform's `exchange_accounts` table.
/// `allowed_symbols` is stored as a JSON string array.
pub struct SqliteExchangeAccountRepository {
    pool: SqlitePool,
}

impl SqliteExchangeAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExchangeAccountRepository for SqliteExchangeAccountRepository {
    async fn active_accounts(&self, user_id: &str) -> Result<Vec<ExchangeAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, exchange_name, status, trading_enabled, allowed_symbols
            FROM exchange_accounts
            WHERE user_id = ? AND status = 'ACTIVE' AND trading_enabled = 1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load exchange accounts")?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let allowed_raw: String = row.try_get("allowed_symbols")?;
            let allowed_symbols: Vec<String> =
                serde_json::from_str(&allowed_raw).unwrap_or_default();

            accounts.push(ExchangeAccount {
                user_id: row.try_get("user_id")?,
                exchange_name: row.try_get("exchange_name")?,
                status: row.try_get("status")?,
                trading_enabled: row.try_get("trading_enabled")?,
                allowed_symbols,
            });
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;

    async fn seed(pool: &SqlitePool, user: &str, exchange: &str, status: &str, enabled: bool) {
        sqlx::query(
            "INSERT INTO exchange_accounts (user_id, exchange_name, status, trading_enabled, allowed_symbols)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind(exchange)
        .bind(status)
        .bind(enabled)
        .bind(r#"["BTC","ETH"]"#)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_only_active_trading_accounts_are_returned() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        seed(&db.pool, "u1", "binance", "ACTIVE", true).await;
        seed(&db.pool, "u1", "kraken", "ACTIVE", false).await;
        seed(&db.pool, "u1", "kucoin", "SUSPENDED", true).await;
        seed(&db.pool, "u2", "okx", "ACTIVE", true).await;

        let repo = SqliteExchangeAccountRepository::new(db.pool.clone());
        let accounts = repo.active_accounts("u1").await.unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].exchange_name, "binance");
        assert_eq!(accounts[0].allowed_symbols, vec!["BTC", "ETH"]);
    }
}
