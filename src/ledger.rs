//! Append-only trade ledger backed by SQLite
//!
//! `append` is the only mutation; corrections are new records. The pool
//! runs with full synchronous mode so an acked append survives a crash.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;

use crate::types::{TradeAction, TradeRecord};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Durably append one record. Returning Ok means the record survives
    /// a crash; the cycle is not complete until this succeeds.
    async fn append(&self, record: &TradeRecord) -> anyhow::Result<()>;

    /// Records within [from, to], newest-first
    async fn query_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TradeRecord>>;
}

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub async fn open(db_path: &str) -> anyhow::Result<Self> {
        let connection_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            // An acked append must be durable
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(connection_options)
            .await
            .context("failed to open ledger database")?;

        let ledger = Self { pool };
        ledger.initialize().await?;
        Ok(ledger)
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                action TEXT NOT NULL,
                percentage INTEGER NOT NULL,
                reason TEXT NOT NULL,
                base_balance TEXT NOT NULL,
                quote_balance TEXT NOT NULL,
                base_avg_buy_price TEXT NOT NULL,
                base_price TEXT NOT NULL,
                reflection TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .context("failed to create trades table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_ts ON trades(ts);")
            .execute(&self.pool)
            .await
            .context("failed to create trades index")?;

        Ok(())
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<TradeRecord> {
    let ts: i64 = row.try_get("ts")?;
    let action: String = row.try_get("action")?;
    let percentage: i64 = row.try_get("percentage")?;

    let decimal = |column: &str| -> anyhow::Result<Decimal> {
        let text: String = row.try_get(column)?;
        Decimal::from_str(&text).with_context(|| format!("corrupt decimal in column {}", column))
    };

    Ok(TradeRecord {
        timestamp: Utc
            .timestamp_millis_opt(ts)
            .single()
            .ok_or_else(|| anyhow::anyhow!("corrupt timestamp: {}", ts))?,
        action: action.parse::<TradeAction>()?,
        percentage: u8::try_from(percentage).context("corrupt percentage")?,
        reason: row.try_get("reason")?,
        base_balance: decimal("base_balance")?,
        quote_balance: decimal("quote_balance")?,
        base_avg_buy_price: decimal("base_avg_buy_price")?,
        base_price: decimal("base_price")?,
        reflection: row.try_get("reflection")?,
    })
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn append(&self, record: &TradeRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO trades
                (ts, action, percentage, reason, base_balance, quote_balance,
                 base_avg_buy_price, base_price, reflection)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);",
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(record.action.as_str())
        .bind(i64::from(record.percentage))
        .bind(&record.reason)
        .bind(record.base_balance.to_string())
        .bind(record.quote_balance.to_string())
        .bind(record.base_avg_buy_price.to_string())
        .bind(record.base_price.to_string())
        .bind(&record.reflection)
        .execute(&self.pool)
        .await
        .context("trade append failed")?;
        Ok(())
    }

    async fn query_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            "SELECT ts, action, percentage, reason, base_balance, quote_balance,
                    base_avg_buy_price, base_price, reflection
             FROM trades
             WHERE ts >= ? AND ts <= ?
             ORDER BY ts DESC, id DESC;",
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .context("trade query failed")?;

        rows.iter().map(row_to_record).collect()
    }
}
