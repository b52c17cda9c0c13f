mod repository;

pub use repository::*;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{
    Account, AccountId, Cents, HistoryFilter, InvestmentEntry, InvestmentId, InvestmentRecord,
    Project, ProjectId, TransactionKind, TransactionRecord,
};

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Authoritative account balances.
///
/// Adjustments are atomic at the storage layer: concurrent adjustments of the
/// same account serialize, so the final balance is the sum of every applied
/// delta. Policy (overdraft checks, validation) belongs to the caller.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Insert a new account. Returns `false` when the email is already taken.
    async fn insert_account(&self, account: &Account) -> Result<bool>;

    async fn get_account(&self, email: &str) -> Result<Option<Account>>;

    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Add `delta` (negative for debits) to the balance.
    /// Returns the updated account, or `None` when the email does not resolve.
    /// Fails without writing when the new balance would overflow.
    async fn adjust_balance(&self, email: &str, delta: Cents) -> Result<Option<Account>>;

    /// Like [`adjust_balance`](Self::adjust_balance), but only applies when the
    /// resulting balance stays at or above `floor`. Returns `None` when the
    /// account is missing or the guard rejected the update.
    async fn adjust_balance_above(
        &self,
        email: &str,
        delta: Cents,
        floor: Cents,
    ) -> Result<Option<Account>>;
}

/// Append-only history of balance-affecting events.
#[async_trait]
pub trait TransactionRecorder: Send + Sync {
    /// Append one entry. Fails without writing when the entry is invalid.
    async fn record(
        &self,
        account_id: AccountId,
        amount: Cents,
        kind: TransactionKind,
        investment_id: Option<InvestmentId>,
    ) -> Result<TransactionRecord>;

    /// Every entry of an account, newest first.
    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<TransactionRecord>>;

    /// Entries of an account matching `filter`, newest first.
    async fn list_filtered(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>>;

    /// Every entry of every account, in insertion order.
    async fn list_all(&self) -> Result<Vec<TransactionRecord>>;
}

/// Projects and the investments made into them.
#[async_trait]
pub trait InvestmentBook: Send + Sync {
    async fn insert_project(&self, project: &Project) -> Result<()>;

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn create_investment(
        &self,
        account_id: AccountId,
        project_id: ProjectId,
        amount: Cents,
    ) -> Result<InvestmentRecord>;

    /// Remove an investment. Only used to undo a failed invest workflow.
    /// Returns `false` when nothing was deleted.
    async fn delete_investment(&self, id: InvestmentId) -> Result<bool>;

    async fn get_investment(&self, id: InvestmentId) -> Result<Option<InvestmentRecord>>;

    /// Investments of an account with their project titles, newest first.
    async fn list_investments(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<InvestmentEntry>>;

    async fn count_investments(&self) -> Result<i64>;

    /// Investments that no invest entry points at.
    async fn count_orphaned_investments(&self) -> Result<i64>;
}

/// Everything the ledger service needs from storage.
pub trait Store: BalanceLedger + TransactionRecorder + InvestmentBook {}

impl<T> Store for T where T: BalanceLedger + TransactionRecorder + InvestmentBook {}
