use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Cents, Currency, HistoryFilter, InvestmentEntry, InvestmentId,
    InvestmentRecord, Project, ProjectId, TransactionKind, TransactionRecord,
};

use super::{BalanceLedger, InvestmentBook, MIGRATION_001_INITIAL, TransactionRecorder};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed storage for accounts, ledger entries, projects and investments.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL such as `sqlite:fundflow.db?mode=rwc`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self> {
        let repo = Self::connect(database_url, max_connections).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.try_get("id")?;
        let currency_str: String = row.try_get("currency")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            balance: row.try_get("balance").context("Invalid balance")?,
            currency: Currency::from_str(&currency_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", currency_str))?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<TransactionRecord> {
        let id_str: String = row.try_get("id")?;
        let account_id_str: String = row.try_get("account_id")?;
        let kind_str: String = row.try_get("kind")?;
        let investment_id_str: Option<String> = row.try_get("investment_id")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(TransactionRecord {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.try_get("sequence")?,
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            amount: row.try_get("amount")?,
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            investment_id: investment_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid investment ID")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    fn row_to_project(row: &SqliteRow) -> Result<Project> {
        let id_str: String = row.try_get("id")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(Project {
            id: Uuid::parse_str(&id_str).context("Invalid project ID")?,
            title: row.try_get("title")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    fn row_to_investment(row: &SqliteRow) -> Result<InvestmentRecord> {
        let id_str: String = row.try_get("id")?;
        let account_id_str: String = row.try_get("account_id")?;
        let project_id_str: String = row.try_get("project_id")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(InvestmentRecord {
            id: Uuid::parse_str(&id_str).context("Invalid investment ID")?,
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            project_id: Uuid::parse_str(&project_id_str).context("Invalid project ID")?,
            amount: row.try_get("amount")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }
}

/// Balances to which `delta` can be added without leaving the i64 range.
/// SQLite turns an overflowing integer sum into a REAL, so the bound is checked
/// in the WHERE clause instead.
fn balance_range(delta: Cents) -> (Cents, Cents) {
    if delta >= 0 {
        (Cents::MIN, Cents::MAX - delta)
    } else {
        (Cents::MIN - delta, Cents::MAX)
    }
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
/// Instants before year 0 get a leading '-' and still sort first.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}'", s))?
        .with_timezone(&Utc))
}

// ========================
// Ledger operations
// ========================

#[async_trait]
impl BalanceLedger for Repository {
    async fn insert_account(&self, account: &Account) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, balance, currency, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.balance)
        .bind(account.currency.as_str())
        .bind(format_timestamp(account.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(false),
            Err(e) => Err(e).context("Failed to save account"),
        }
    }

    async fn get_account(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, balance, currency, created_at
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, balance, currency, created_at
            FROM accounts
            ORDER BY email
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    async fn adjust_balance(&self, email: &str, delta: Cents) -> Result<Option<Account>> {
        let (low, high) = balance_range(delta);

        // Single statement: SQLite serializes writers, so no update is lost
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + ?
            WHERE email = ? AND balance BETWEEN ? AND ?
            RETURNING id, name, email, balance, currency, created_at
            "#,
        )
        .bind(delta)
        .bind(email)
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to adjust balance")?;

        if let Some(row) = row {
            return Self::row_to_account(&row).map(Some);
        }
        if self.get_account(email).await?.is_some() {
            anyhow::bail!("Adjusting the balance of {} by {} would overflow", email, delta);
        }
        Ok(None)
    }

    async fn adjust_balance_above(
        &self,
        email: &str,
        delta: Cents,
        floor: Cents,
    ) -> Result<Option<Account>> {
        let (low, high) = balance_range(delta);
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + ?
            WHERE email = ? AND balance BETWEEN ? AND ? AND balance + ? >= ?
            RETURNING id, name, email, balance, currency, created_at
            "#,
        )
        .bind(delta)
        .bind(email)
        .bind(low)
        .bind(high)
        .bind(delta)
        .bind(floor)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to adjust balance")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }
}

// ========================
// Transaction history
// ========================

#[async_trait]
impl TransactionRecorder for Repository {
    async fn record(
        &self,
        account_id: AccountId,
        amount: Cents,
        kind: TransactionKind,
        investment_id: Option<InvestmentId>,
    ) -> Result<TransactionRecord> {
        let mut record = TransactionRecord::new(account_id, amount, kind, investment_id)
            .context("Rejected transaction entry")?;

        let row = sqlx::query(
            r#"
            INSERT INTO transactions (id, account_id, amount, kind, investment_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING sequence
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.account_id.to_string())
        .bind(record.amount)
        .bind(record.kind.as_str())
        .bind(record.investment_id.map(|id| id.to_string()))
        .bind(format_timestamp(record.created_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save transaction")?;

        record.sequence = row.try_get("sequence")?;
        Ok(record)
    }

    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, account_id, amount, kind, investment_id, created_at
            FROM transactions
            WHERE account_id = ?
            ORDER BY created_at DESC, sequence DESC
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn list_filtered(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>> {
        let mut query = String::from(
            r#"
            SELECT t.sequence, t.id, t.account_id, t.amount, t.kind, t.investment_id, t.created_at
            FROM transactions t
            LEFT JOIN investments i ON i.id = t.investment_id
            LEFT JOIN projects p ON p.id = i.project_id
            WHERE t.account_id = ?
            "#,
        );

        let window = filter.period.map(|p| p.window(Utc::now()));
        let keyword = filter.keyword();

        if filter.kind.is_some() {
            query.push_str(" AND t.kind = ?");
        }
        if window.is_some() {
            query.push_str(" AND t.created_at >= ? AND t.created_at <= ?");
        }
        if keyword.is_some() {
            query.push_str(" AND instr(lower(p.title), lower(?)) > 0");
        }
        query.push_str(" ORDER BY t.created_at DESC, t.sequence DESC");

        let mut sql_query = sqlx::query(&query).bind(account_id.to_string());
        if let Some(kind) = filter.kind {
            sql_query = sql_query.bind(kind.as_str());
        }
        if let Some((start, end)) = window {
            sql_query = sql_query
                .bind(format_timestamp(start))
                .bind(format_timestamp(end));
        }
        if let Some(keyword) = keyword {
            sql_query = sql_query.bind(keyword);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn list_all(&self) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, account_id, amount, kind, investment_id, created_at
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }
}

// ========================
// Projects and investments
// ========================

#[async_trait]
impl InvestmentBook for Repository {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query("INSERT INTO projects (id, title, created_at) VALUES (?, ?, ?)")
            .bind(project.id.to_string())
            .bind(&project.title)
            .bind(format_timestamp(project.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to save project")?;
        Ok(())
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, title, created_at FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch project")?;

        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT id, title, created_at FROM projects ORDER BY title")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list projects")?;

        rows.iter().map(Self::row_to_project).collect()
    }

    async fn create_investment(
        &self,
        account_id: AccountId,
        project_id: ProjectId,
        amount: Cents,
    ) -> Result<InvestmentRecord> {
        let investment = InvestmentRecord::new(account_id, project_id, amount)
            .context("Rejected investment")?;

        sqlx::query(
            r#"
            INSERT INTO investments (id, account_id, project_id, amount, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(investment.id.to_string())
        .bind(investment.account_id.to_string())
        .bind(investment.project_id.to_string())
        .bind(investment.amount)
        .bind(format_timestamp(investment.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save investment")?;

        Ok(investment)
    }

    async fn delete_investment(&self, id: InvestmentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM investments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete investment")?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_investment(&self, id: InvestmentId) -> Result<Option<InvestmentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, project_id, amount, created_at
            FROM investments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch investment")?;

        row.as_ref().map(Self::row_to_investment).transpose()
    }

    async fn list_investments(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<InvestmentEntry>> {
        let mut query = String::from(
            r#"
            SELECT i.id, i.account_id, i.project_id, i.amount, i.created_at, p.title
            FROM investments i
            JOIN projects p ON p.id = i.project_id
            WHERE i.account_id = ?
            "#,
        );

        let window = filter.period.map(|p| p.window(Utc::now()));
        let keyword = filter.keyword();

        if window.is_some() {
            query.push_str(" AND i.created_at >= ? AND i.created_at <= ?");
        }
        if keyword.is_some() {
            query.push_str(" AND instr(lower(p.title), lower(?)) > 0");
        }
        query.push_str(" ORDER BY i.created_at DESC, i.rowid DESC");

        let mut sql_query = sqlx::query(&query).bind(account_id.to_string());
        if let Some((start, end)) = window {
            sql_query = sql_query
                .bind(format_timestamp(start))
                .bind(format_timestamp(end));
        }
        if let Some(keyword) = keyword {
            sql_query = sql_query.bind(keyword);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list investments")?;

        rows.iter()
            .map(|row| {
                Ok(InvestmentEntry {
                    investment: Self::row_to_investment(row)?,
                    project_title: row.try_get("title")?,
                })
            })
            .collect()
    }

    async fn count_investments(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM investments")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count investments")?
            .try_get("count")?;
        Ok(count)
    }

    async fn count_orphaned_investments(&self) -> Result<i64> {
        let count: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM investments i
            WHERE NOT EXISTS (SELECT 1 FROM transactions t WHERE t.investment_id = i.id)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphaned investments")?
        .try_get("count")?;
        Ok(count)
    }
}
