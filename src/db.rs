use crate::error::LedgerError;
use crate::models::{normalize_symbol, Account, Holding, TradeType, TransactionEntry};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide handle to the ledger database.
///
/// One connection behind an async mutex: every scope runs alone in this
/// process, and as a `BEGIN IMMEDIATE` transaction so other processes sharing
/// the file are held off by SQLite's write lock.
#[derive(Clone)]
pub struct DatabasePool {
    conn: Arc<Mutex<Connection>>,
    lock_timeout: Duration,
}

impl DatabasePool {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn, lock_timeout)
    }

    /// A private in-memory ledger, used by tests.
    pub fn open_in_memory(lock_timeout: Duration) -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?, lock_timeout)
    }

    fn init(conn: Connection, lock_timeout: Duration) -> Result<Self, LedgerError> {
        conn.busy_timeout(lock_timeout)?;
        conn.pragma_update(None, "foreign_keys", 1)?;

        // Money columns are decimal strings.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                cash_balance TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS holdings (
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                company TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                average_buy_price TEXT NOT NULL,
                total_cost TEXT NOT NULL,
                PRIMARY KEY (user_id, symbol),
                FOREIGN KEY (user_id) REFERENCES accounts(user_id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                company TEXT NOT NULL,
                trade_type TEXT NOT NULL CHECK (trade_type IN ('BUY', 'SELL')),
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                price TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES accounts(user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_time
                ON transactions (user_id, executed_at);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lock_timeout,
        })
    }

    async fn lock(&self) -> Result<OwnedMutexGuard<Connection>, LedgerError> {
        tokio::time::timeout(self.lock_timeout, self.conn.clone().lock_owned())
            .await
            .map_err(|_| {
                LedgerError::ConflictRetryable(format!(
                    "timed out after {}ms waiting for the ledger",
                    self.lock_timeout.as_millis()
                ))
            })
    }

    /// Runs `f` as one all-or-nothing unit.
    ///
    /// Writes staged through the scope commit together when `f` returns `Ok`;
    /// on `Err` the transaction is dropped and rolled back. The scope runs on
    /// the blocking pool with the connection lock held, so a caller that gives
    /// up on the future either never started the scope or leaves it to finish.
    pub async fn atomic<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut LedgerScope<'_>) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.lock().await?;
        run_blocking(move || {
            let mut conn = conn;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = {
                let mut scope = LedgerScope { tx: &tx };
                f(&mut scope)?
            };
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Read-only view over one consistent snapshot.
    pub async fn snapshot<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&LedgerScope<'_>) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.lock().await?;
        run_blocking(move || {
            let mut conn = conn;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let out = f(&LedgerScope { tx: &tx })?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Creates the account if it does not exist yet. Returns the current account.
    pub async fn open_account(
        &self,
        user_id: &str,
        starting_cash: Decimal,
    ) -> Result<Account, LedgerError> {
        let user_id = user_id.to_string();
        self.atomic(move |scope| {
            if scope.create_account(&user_id, starting_cash)? {
                tracing::info!("Opened account {} with {}", user_id, starting_cash);
            }
            let cash_balance = scope
                .get_balance(&user_id)?
                .ok_or_else(|| LedgerError::UserNotFound(user_id.clone()))?;
            Ok(Account {
                user_id,
                cash_balance,
            })
        })
        .await
    }

    pub async fn get_account(&self, user_id: &str) -> Result<Account, LedgerError> {
        let owner = user_id.to_string();
        let cash_balance = self
            .snapshot(move |scope| scope.get_balance(&owner))
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;
        Ok(Account {
            user_id: user_id.to_string(),
            cash_balance,
        })
    }

    pub async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, LedgerError> {
        let owner = user_id.to_string();
        self.snapshot(move |scope| scope.list_holdings(&owner)).await
    }

    pub async fn get_holding(&self, user_id: &str, symbol: &str) -> Result<Holding, LedgerError> {
        let symbol = normalize_symbol(symbol);
        let (owner, lookup) = (user_id.to_string(), symbol.clone());
        self.snapshot(move |scope| scope.get_holding(&owner, &lookup))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Holding {}", symbol)))
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        let owner = user_id.to_string();
        self.snapshot(move |scope| scope.list_transactions(&owner, limit))
            .await
    }

    pub async fn get_transaction(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<TransactionEntry, LedgerError> {
        let (owner, lookup) = (user_id.to_string(), id.to_string());
        self.snapshot(move |scope| scope.get_transaction(&owner, &lookup))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Transaction {}", id)))
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<(), LedgerError> {
        self.lock().await?.execute_batch(sql)?;
        Ok(())
    }
}

/// The operations available inside an atomic scope.
///
/// Reads take `&self`; writes take `&mut self` so a snapshot cannot write.
pub struct LedgerScope<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl LedgerScope<'_> {
    pub fn get_balance(&self, user_id: &str) -> Result<Option<Decimal>, LedgerError> {
        let raw: Option<String> = self
            .tx
            .query_row(
                "SELECT cash_balance FROM accounts WHERE user_id = ?",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| parse_decimal(&s)).transpose()
    }

    /// Returns `false` when the account already existed.
    pub fn create_account(
        &mut self,
        user_id: &str,
        cash_balance: Decimal,
    ) -> Result<bool, LedgerError> {
        if cash_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "Cash balance cannot be negative".to_string(),
            ));
        }
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO accounts (user_id, cash_balance) VALUES (?, ?)",
            params![user_id, cash_balance.to_string()],
        )?;
        Ok(inserted == 1)
    }

    pub fn set_balance(&mut self, user_id: &str, cash_balance: Decimal) -> Result<(), LedgerError> {
        if cash_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "Cash balance cannot be negative".to_string(),
            ));
        }
        let updated = self.tx.execute(
            "UPDATE accounts SET cash_balance = ? WHERE user_id = ?",
            params![cash_balance.to_string(), user_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    pub fn get_holding(&self, user_id: &str, symbol: &str) -> Result<Option<Holding>, LedgerError> {
        let holding = self
            .tx
            .query_row(
                "SELECT user_id, symbol, company, quantity, average_buy_price, total_cost
                 FROM holdings WHERE user_id = ? AND symbol = ?",
                [user_id, symbol],
                holding_from_row,
            )
            .optional()?;
        Ok(holding)
    }

    pub fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, LedgerError> {
        let mut stmt = self.tx.prepare(
            "SELECT user_id, symbol, company, quantity, average_buy_price, total_cost
             FROM holdings WHERE user_id = ? ORDER BY symbol ASC",
        )?;
        let holdings = stmt
            .query_map([user_id], holding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holdings)
    }

    pub fn upsert_holding(&mut self, holding: &Holding) -> Result<(), LedgerError> {
        if holding.quantity <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "Holding {} must have a positive quantity",
                holding.symbol
            )));
        }
        self.tx.execute(
            "INSERT INTO holdings (user_id, symbol, company, quantity, average_buy_price, total_cost)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, symbol)
             DO UPDATE SET
                 company = excluded.company,
                 quantity = excluded.quantity,
                 average_buy_price = excluded.average_buy_price,
                 total_cost = excluded.total_cost",
            params![
                holding.user_id,
                holding.symbol,
                holding.company,
                holding.quantity,
                holding.average_buy_price.to_string(),
                holding.total_cost.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_holding(&mut self, user_id: &str, symbol: &str) -> Result<(), LedgerError> {
        self.tx.execute(
            "DELETE FROM holdings WHERE user_id = ? AND symbol = ?",
            [user_id, symbol],
        )?;
        Ok(())
    }

    /// Entries are insert-only; there is no update or delete counterpart.
    pub fn append_transaction(&mut self, entry: &TransactionEntry) -> Result<(), LedgerError> {
        self.tx.execute(
            "INSERT INTO transactions
                (id, user_id, symbol, company, trade_type, quantity, price, total_amount, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id,
                entry.user_id,
                entry.symbol,
                entry.company,
                entry.trade_type.as_str(),
                entry.quantity,
                entry.price.to_string(),
                entry.total_amount.to_string(),
                format_timestamp(&entry.executed_at),
            ],
        )?;
        Ok(())
    }

    /// Newest first; entries sharing a timestamp come back in reverse insertion order.
    pub fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        // SQLite treats a negative LIMIT as no limit.
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut stmt = self.tx.prepare(
            "SELECT id, user_id, symbol, company, trade_type, quantity, price, total_amount, executed_at
             FROM transactions
             WHERE user_id = ?
             ORDER BY executed_at DESC, seq DESC
             LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_transaction(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<TransactionEntry>, LedgerError> {
        let entry = self
            .tx
            .query_row(
                "SELECT id, user_id, symbol, company, trade_type, quantity, price, total_amount, executed_at
                 FROM transactions WHERE id = ? AND user_id = ?",
                [id, user_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::StoreUnavailable(format!("ledger task failed: {}", e)))?
}

fn parse_decimal(s: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(s)
        .map_err(|e| LedgerError::StoreUnavailable(format!("corrupt decimal {:?}: {}", s, e)))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Fixed-width UTC so that text order is time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn holding_from_row(row: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        user_id: row.get(0)?,
        symbol: row.get(1)?,
        company: row.get(2)?,
        quantity: row.get(3)?,
        average_buy_price: decimal_column(row, 4)?,
        total_cost: decimal_column(row, 5)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionEntry> {
    let raw_type: String = row.get(4)?;
    let trade_type = TradeType::parse(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown trade type {}", raw_type).into(),
        )
    })?;
    let raw_time: String = row.get(8)?;
    let executed_at = DateTime::parse_from_rfc3339(&raw_time)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(TransactionEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        company: row.get(3)?,
        trade_type,
        quantity: row.get(5)?,
        price: decimal_column(row, 6)?,
        total_amount: decimal_column(row, 7)?,
        executed_at,
    })
}
