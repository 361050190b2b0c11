use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{AccountRecord, Address, Amount, Balance, LedgerEvent};

use super::MIGRATION_001_INITIAL;

/// Ledger-wide values written once at genesis.
#[derive(Debug, Clone)]
pub struct LedgerMeta {
    pub owner: Address,
    pub total_supply: Amount,
    pub created_at: DateTime<Utc>,
}

/// A notification as it sits in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Monotonically increasing, gap-free within one database.
    pub sequence: i64,
    /// Shared by every notification emitted by the same operation.
    pub operation_id: Uuid,
    pub operation: String,
    pub caller: Address,
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
}

/// Filter for querying the event log
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub account: Option<Address>,
    pub kind: Option<String>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

/// Everything a single committed operation writes.
pub struct Commit<'a> {
    pub operation_id: Uuid,
    pub operation: &'a str,
    pub caller: Address,
    pub records: &'a [(Address, AccountRecord)],
    pub events: &'a [LedgerEvent],
    pub recorded_at: DateTime<Utc>,
}

/// Repository for persisting ledger state and its event log.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Genesis
    // ========================

    pub async fn get_meta(&self) -> Result<Option<LedgerMeta>> {
        let row = sqlx::query("SELECT owner, total_supply, created_at FROM ledger_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch ledger metadata")?;

        match row {
            Some(row) => {
                let owner: String = row.get("owner");
                let total_supply: String = row.get("total_supply");
                let created_at: String = row.get("created_at");
                Ok(Some(LedgerMeta {
                    owner: parse_address(&owner)?,
                    total_supply: total_supply.parse().context("Invalid total supply")?,
                    created_at: parse_timestamp(&created_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Write the metadata row and the genesis account records in one transaction.
    pub async fn save_genesis(
        &self,
        meta: &LedgerMeta,
        records: &[(Address, AccountRecord)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO ledger_meta (id, owner, total_supply, created_at)
            VALUES (1, ?, ?, ?)
            "#,
        )
        .bind(meta.owner.to_hex())
        .bind(meta.total_supply.to_string())
        .bind(meta.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save ledger metadata")?;

        for (address, record) in records {
            Self::write_record(&mut tx, address, record).await?;
        }

        tx.commit().await.context("Failed to commit genesis")?;
        Ok(())
    }

    // ========================
    // Account state
    // ========================

    /// Load every stored account record together with the last event
    /// sequence, read from one consistent snapshot.
    pub async fn load_state(&self) -> Result<(Vec<(Address, AccountRecord)>, i64)> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let last_sequence = fetch_last_sequence(&mut tx).await?;
        let accounts = fetch_accounts(&mut tx).await?;
        tx.commit().await.context("Failed to finish read")?;
        Ok((accounts, last_sequence))
    }

    /// Sequence of the newest logged notification, 0 for an empty log.
    /// Every committed operation logs at least one notification, so this
    /// moves whenever any handle writes.
    pub async fn last_sequence(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        fetch_last_sequence(&mut conn).await
    }

    // ========================
    // Commits
    // ========================

    /// Take the database write lock (`BEGIN IMMEDIATE`). Other handles,
    /// in this process or another, wait until it is committed or rolled back.
    pub async fn begin_write(&self) -> Result<WriteTx> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .context("Failed to take write lock")?;
        Ok(WriteTx { conn: Some(conn) })
    }

    async fn write_record(
        conn: &mut SqliteConnection,
        address: &Address,
        record: &AccountRecord,
    ) -> Result<()> {
        let address = address.to_hex();

        sqlx::query("DELETE FROM allowances WHERE owner = ?")
            .bind(&address)
            .execute(&mut *conn)
            .await
            .context("Failed to clear allowances")?;

        if record.is_default() {
            sqlx::query("DELETE FROM accounts WHERE address = ?")
                .bind(&address)
                .execute(&mut *conn)
                .await
                .context("Failed to delete account")?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (address, stored_balance, overdraft_limit, transfer_paused, receive_paused)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                stored_balance = excluded.stored_balance,
                overdraft_limit = excluded.overdraft_limit,
                transfer_paused = excluded.transfer_paused,
                receive_paused = excluded.receive_paused
            "#,
        )
        .bind(&address)
        .bind(record.stored_balance.to_string())
        .bind(record.overdraft_limit.to_string())
        .bind(record.transfer_paused)
        .bind(record.receive_paused)
        .execute(&mut *conn)
        .await
        .context("Failed to save account")?;

        for (spender, amount) in &record.allowances {
            sqlx::query("INSERT INTO allowances (owner, spender, amount) VALUES (?, ?, ?)")
                .bind(&address)
                .bind(spender.to_hex())
                .bind(amount.to_string())
                .execute(&mut *conn)
                .await
                .context("Failed to save allowance")?;
        }

        Ok(())
    }

    // ========================
    // Event log
    // ========================

    /// List logged notifications in emission order.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let mut query = String::from(
            "SELECT sequence, operation_id, operation, caller, kind, payload, recorded_at FROM events WHERE 1=1",
        );
        if filter.kind.is_some() {
            query.push_str(" AND kind = ?");
        }
        query.push_str(" ORDER BY sequence");

        let mut sql_query = sqlx::query(&query);
        if let Some(kind) = &filter.kind {
            sql_query = sql_query.bind(kind);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list events")?;

        let mut events = rows
            .iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;

        if let Some(account) = &filter.account {
            events.retain(|e| e.event.involves(account));
        }
        if let Some(limit) = filter.limit {
            let skip = events.len().saturating_sub(limit);
            events.drain(..skip);
        }

        Ok(events)
    }

    pub async fn count_events(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM events")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count events")?
            .get("count");
        Ok(count)
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<(Address, AccountRecord)> {
        let address: String = row.get("address");
        let stored_balance: String = row.get("stored_balance");
        let overdraft_limit: String = row.get("overdraft_limit");

        Ok((
            parse_address(&address)?,
            AccountRecord {
                stored_balance: stored_balance
                    .parse::<Balance>()
                    .context("Invalid stored balance")?,
                overdraft_limit: overdraft_limit
                    .parse::<Amount>()
                    .context("Invalid overdraft limit")?,
                allowances: BTreeMap::new(),
                transfer_paused: row.get::<i32, _>("transfer_paused") != 0,
                receive_paused: row.get::<i32, _>("receive_paused") != 0,
            },
        ))
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<StoredEvent> {
        let operation_id: String = row.get("operation_id");
        let caller: String = row.get("caller");
        let payload: String = row.get("payload");
        let recorded_at: String = row.get("recorded_at");

        Ok(StoredEvent {
            sequence: row.get("sequence"),
            operation_id: Uuid::parse_str(&operation_id).context("Invalid operation ID")?,
            operation: row.get("operation"),
            caller: parse_address(&caller)?,
            event: serde_json::from_str(&payload).context("Invalid event payload")?,
            recorded_at: parse_timestamp(&recorded_at)?,
        })
    }
}

/// An open write transaction holding the database write lock.
///
/// Finish it with [`WriteTx::commit`] or [`WriteTx::rollback`]. If it is
/// dropped unfinished, the connection is closed rather than returned to the
/// pool, which rolls the transaction back.
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .context("Write transaction already finished")
    }

    pub async fn last_sequence(&mut self) -> Result<i64> {
        fetch_last_sequence(self.conn()?).await
    }

    pub async fn load_accounts(&mut self) -> Result<Vec<(Address, AccountRecord)>> {
        fetch_accounts(self.conn()?).await
    }

    /// Write the records touched by one operation and append its
    /// notifications to the log. Visible to others only after `commit`.
    pub async fn write(&mut self, commit: Commit<'_>) -> Result<Vec<StoredEvent>> {
        let conn = self.conn()?;

        for (address, record) in commit.records {
            Repository::write_record(conn, address, record).await?;
        }

        let mut stored = Vec::with_capacity(commit.events.len());
        for event in commit.events {
            let payload = serde_json::to_string(event)?;
            let row = sqlx::query(
                r#"
                INSERT INTO events (operation_id, operation, caller, kind, payload, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING sequence
                "#,
            )
            .bind(commit.operation_id.to_string())
            .bind(commit.operation)
            .bind(commit.caller.to_hex())
            .bind(event.name())
            .bind(&payload)
            .bind(commit.recorded_at.to_rfc3339())
            .fetch_one(&mut *conn)
            .await
            .context("Failed to append event")?;

            stored.push(StoredEvent {
                sequence: row.get("sequence"),
                operation_id: commit.operation_id,
                operation: commit.operation.to_string(),
                caller: commit.caller,
                event: event.clone(),
                recorded_at: commit.recorded_at,
            });
        }

        Ok(stored)
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finish("COMMIT").await.context("Failed to commit operation")
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK").await.context("Failed to roll back operation")
    }

    async fn finish(&mut self, statement: &str) -> Result<()> {
        sqlx::query(statement).execute(self.conn()?).await?;
        // Back to the pool only once the transaction is closed.
        self.conn.take();
        Ok(())
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

async fn fetch_last_sequence(conn: &mut SqliteConnection) -> Result<i64> {
    let sequence: i64 = sqlx::query("SELECT COALESCE(MAX(sequence), 0) AS last FROM events")
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read last event sequence")?
        .get("last");
    Ok(sequence)
}

async fn fetch_accounts(conn: &mut SqliteConnection) -> Result<Vec<(Address, AccountRecord)>> {
    let rows = sqlx::query(
        r#"
        SELECT address, stored_balance, overdraft_limit, transfer_paused, receive_paused
        FROM accounts
        ORDER BY address
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load accounts")?;

    let mut accounts: BTreeMap<Address, AccountRecord> = BTreeMap::new();
    for row in &rows {
        let (address, record) = Repository::row_to_account(row)?;
        accounts.insert(address, record);
    }

    let allowance_rows = sqlx::query("SELECT owner, spender, amount FROM allowances")
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load allowances")?;

    for row in &allowance_rows {
        let owner: String = row.get("owner");
        let spender: String = row.get("spender");
        let amount: String = row.get("amount");
        let amount: Amount = amount.parse().context("Invalid allowance amount")?;
        accounts
            .entry(parse_address(&owner)?)
            .or_default()
            .set_allowance(parse_address(&spender)?, amount);
    }

    Ok(accounts.into_iter().collect())
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse()
        .map_err(|e| anyhow::anyhow!("Invalid stored address '{}': {}", s, e))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}
