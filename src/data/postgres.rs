use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use super::MarketData;
use crate::models::{Candle, Tick};
use crate::Result;

/// Postgres-backed candle and tick store
pub struct PostgresMarketData {
    pool: PgPool,
}

impl PostgresMarketData {
    /// Connect to Postgres and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| crate::TradingError::Store(format!("migration failed: {}", e)))?;

        tracing::info!("Connected to Postgres market data store");

        Ok(Self { pool })
    }

    pub async fn insert_candles(&self, candles: &[Candle]) -> Result<()> {
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (symbol, ts, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (symbol, ts) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume
                "#,
            )
            .bind(&candle.symbol)
            .bind(candle.timestamp)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&self.pool)
            .await?;
        }

        tracing::debug!("Saved {} candles to Postgres", candles.len());

        Ok(())
    }

    pub async fn record_ticks(&self, ticks: &[Tick]) -> Result<()> {
        for tick in ticks {
            sqlx::query("INSERT INTO ticks (symbol, ts, price, volume) VALUES ($1, $2, $3, $4)")
                .bind(&tick.symbol)
                .bind(tick.timestamp)
                .bind(tick.price)
                .bind(tick.volume)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl MarketData for PostgresMarketData {
    async fn candles(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, ts, open, high, low, close, volume
            FROM candles
            WHERE symbol = $1 AND ts >= $2 AND ts < $3
            ORDER BY ts ASC
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Candle {
                symbol: row.get("symbol"),
                timestamp: row.get("ts"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
            })
            .collect())
    }

    async fn ticks(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Tick>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, ts, price, volume
            FROM ticks
            WHERE symbol = $1 AND ts >= $2 AND ts < $3
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Tick {
                symbol: row.get("symbol"),
                timestamp: row.get("ts"),
                price: row.get("price"),
                volume: row.get("volume"),
            })
            .collect())
    }
}
