use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

use crate::{
    models::{CheckInClaim, NewWallet, WalletRecord},
    utils::checked_in_today,
};

const CREATE_WALLETS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS wallets (
    qq_id BIGINT PRIMARY KEY,
    eth_address TEXT NOT NULL UNIQUE,
    eth_private_key TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'utc'),
    last_check_in TIMESTAMP NULL
)";

/// Timestamps are stored without a zone and always mean UTC, so tables
/// created by the older Python plugin can be read as they are.
#[derive(sqlx::FromRow)]
struct WalletRow {
    qq_id: i64,
    eth_address: String,
    eth_private_key: String,
    created_at: NaiveDateTime,
    last_check_in: Option<NaiveDateTime>,
}

impl From<WalletRow> for WalletRecord {
    fn from(row: WalletRow) -> Self {
        WalletRecord {
            qq_id: row.qq_id,
            eth_address: row.eth_address,
            eth_private_key: row.eth_private_key,
            created_at: row.created_at.and_utc(),
            last_check_in: row.last_check_in.map(|at| at.and_utc()),
        }
    }
}

/// Storage the command handlers need. One row per chat user, keyed by QQ id.
pub trait WalletStore {
    async fn find(&self, qq_id: i64) -> anyhow::Result<Option<WalletRecord>>;

    /// Returns `None` when a wallet for `qq_id` already exists.
    async fn insert(&self, wallet: NewWallet) -> anyhow::Result<Option<WalletRecord>>;

    async fn all(&self) -> anyhow::Result<Vec<WalletRecord>>;

    /// Atomically stamps `now` as the last check-in unless the user already
    /// checked in on the same UTC day.
    async fn claim_check_in(&self, qq_id: i64, now: DateTime<Utc>)
        -> anyhow::Result<CheckInClaim>;

    /// Puts `previous` back, but only while the row still holds `claimed_at`.
    async fn release_check_in(
        &self,
        qq_id: i64,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgWalletStore {
    pool: Pool<Postgres>,
}

pub async fn establish_connection(db_url: &str) -> anyhow::Result<Pool<Postgres>> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("Failed to create pool")
}

impl PgWalletStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        let store = Self::new(establish_connection(db_url).await?);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_WALLETS_TABLE)
            .execute(&self.pool)
            .await
            .context("Failed to create wallets table")?;
        info!("Wallets table ready");
        Ok(())
    }
}

impl WalletStore for PgWalletStore {
    async fn find(&self, qq_id: i64) -> anyhow::Result<Option<WalletRecord>> {
        let wallet: Option<WalletRow> = sqlx::query_as("SELECT * FROM wallets WHERE qq_id = $1")
            .bind(qq_id)
            .fetch_optional(&self.pool)
            .await
            .context("Error fetching wallet")?;
        Ok(wallet.map(WalletRecord::from))
    }

    async fn insert(&self, wallet: NewWallet) -> anyhow::Result<Option<WalletRecord>> {
        let created: Option<WalletRow> = sqlx::query_as(
            "INSERT INTO wallets (qq_id, eth_address, eth_private_key) VALUES ($1, $2, $3)
             ON CONFLICT (qq_id) DO NOTHING RETURNING *",
        )
        .bind(wallet.qq_id)
        .bind(&wallet.eth_address)
        .bind(&wallet.eth_private_key)
        .fetch_optional(&self.pool)
        .await
        .context("Error creating wallet")?;
        Ok(created.map(WalletRecord::from))
    }

    async fn all(&self) -> anyhow::Result<Vec<WalletRecord>> {
        let wallets: Vec<WalletRow> = sqlx::query_as("SELECT * FROM wallets ORDER BY qq_id")
            .fetch_all(&self.pool)
            .await
            .context("Error fetching wallets")?;
        Ok(wallets.into_iter().map(WalletRecord::from).collect())
    }

    async fn claim_check_in(
        &self,
        qq_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CheckInClaim> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        let row: Option<(Option<NaiveDateTime>,)> =
            sqlx::query_as("SELECT last_check_in FROM wallets WHERE qq_id = $1 FOR UPDATE")
                .bind(qq_id)
                .fetch_optional(&mut *tx)
                .await
                .context("Error locking wallet")?;

        let Some((last,)) = row else {
            return Ok(CheckInClaim::NotRegistered);
        };
        let previous = last.map(|at| at.and_utc());
        if checked_in_today(previous, now) {
            return Ok(CheckInClaim::AlreadyCheckedIn);
        }

        sqlx::query("UPDATE wallets SET last_check_in = $1 WHERE qq_id = $2")
            .bind(now.naive_utc())
            .bind(qq_id)
            .execute(&mut *tx)
            .await
            .context("Error updating check-in")?;

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(CheckInClaim::Claimed { previous })
    }

    async fn release_check_in(
        &self,
        qq_id: i64,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE wallets SET last_check_in = $1 WHERE qq_id = $2 AND last_check_in = $3")
            .bind(previous.map(|at| at.naive_utc()))
            .bind(qq_id)
            .bind(claimed_at.naive_utc())
            .execute(&self.pool)
            .await
            .context("Error releasing check-in")?;
        Ok(())
    }
}
