// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use fundflow::application::LedgerService;
use fundflow::config::Config;
use fundflow::domain::{
    Account, AccountId, Cents, HistoryFilter, InvestmentEntry, InvestmentId, InvestmentRecord,
    Project, ProjectId, TransactionKind, TransactionRecord,
};
use fundflow::storage::{
    BalanceLedger, DEFAULT_MAX_CONNECTIONS, InvestmentBook, Repository, Store,
    TransactionRecorder,
};
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir) -> Config {
    let db_path = temp_dir.path().join("test.db");
    Config::new(db_path.to_str().unwrap())
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Helper to create a service whose storage calls can be made to fail
pub async fn faulty_service() -> Result<(LedgerService<FaultyStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let repo = Repository::init(&config.database_url(true), DEFAULT_MAX_CONNECTIONS).await?;
    Ok((LedgerService::new(FaultyStore::new(repo)), temp_dir))
}

/// Register an account and deposit `amount` into it.
pub async fn funded_account<S: Store>(
    service: &LedgerService<S>,
    email: &str,
    amount: Cents,
) -> Result<Account> {
    let account = service.register_account("Test Investor", email).await?;
    if amount > 0 {
        return Ok(service.deposit(email, amount).await?.account);
    }
    Ok(account)
}

/// Wraps a [`Repository`] and fails selected mutations on demand.
/// Every mutation attempt is written to a call log, failed or not.
pub struct FaultyStore {
    inner: Repository,
    fail_debit: AtomicBool,
    fail_credit: AtomicBool,
    fail_create_investment: AtomicBool,
    fail_delete_investment: AtomicBool,
    fail_record: Mutex<Vec<TransactionKind>>,
    calls: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new(inner: Repository) -> Self {
        Self {
            inner,
            fail_debit: AtomicBool::new(false),
            fail_credit: AtomicBool::new(false),
            fail_create_investment: AtomicBool::new(false),
            fail_delete_investment: AtomicBool::new(false),
            fail_record: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every balance adjustment with a negative delta.
    pub fn fail_debits(&self, fail: bool) {
        self.fail_debit.store(fail, Ordering::SeqCst);
    }

    /// Fail every balance adjustment with a positive delta.
    pub fn fail_credits(&self, fail: bool) {
        self.fail_credit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create_investment(&self, fail: bool) {
        self.fail_create_investment.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_investment(&self, fail: bool) {
        self.fail_delete_investment.store(fail, Ordering::SeqCst);
    }

    /// Fail recording entries of `kind`.
    pub fn fail_record(&self, kind: TransactionKind) {
        self.fail_record.lock().unwrap().push(kind);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn check_adjustment(&self, delta: Cents) -> Result<()> {
        if delta < 0 {
            self.log("debit");
            if self.fail_debit.load(Ordering::SeqCst) {
                return Err(anyhow!("injected debit failure"));
            }
        } else {
            self.log("credit");
            if self.fail_credit.load(Ordering::SeqCst) {
                return Err(anyhow!("injected credit failure"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceLedger for FaultyStore {
    async fn insert_account(&self, account: &Account) -> Result<bool> {
        self.inner.insert_account(account).await
    }

    async fn get_account(&self, email: &str) -> Result<Option<Account>> {
        self.inner.get_account(email).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn adjust_balance(&self, email: &str, delta: Cents) -> Result<Option<Account>> {
        self.check_adjustment(delta)?;
        self.inner.adjust_balance(email, delta).await
    }

    async fn adjust_balance_above(
        &self,
        email: &str,
        delta: Cents,
        floor: Cents,
    ) -> Result<Option<Account>> {
        self.check_adjustment(delta)?;
        self.inner.adjust_balance_above(email, delta, floor).await
    }
}

#[async_trait]
impl TransactionRecorder for FaultyStore {
    async fn record(
        &self,
        account_id: AccountId,
        amount: Cents,
        kind: TransactionKind,
        investment_id: Option<InvestmentId>,
    ) -> Result<TransactionRecord> {
        self.log(format!("record:{}", kind));
        if self.fail_record.lock().unwrap().contains(&kind) {
            return Err(anyhow!("injected {} record failure", kind));
        }
        self.inner
            .record(account_id, amount, kind, investment_id)
            .await
    }

    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<TransactionRecord>> {
        self.inner.list_by_account(account_id).await
    }

    async fn list_filtered(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>> {
        self.inner.list_filtered(account_id, filter).await
    }

    async fn list_all(&self) -> Result<Vec<TransactionRecord>> {
        self.inner.list_all().await
    }
}

#[async_trait]
impl InvestmentBook for FaultyStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        self.inner.insert_project(project).await
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.inner.get_project(id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.inner.list_projects().await
    }

    async fn create_investment(
        &self,
        account_id: AccountId,
        project_id: ProjectId,
        amount: Cents,
    ) -> Result<InvestmentRecord> {
        self.log("create_investment");
        if self.fail_create_investment.load(Ordering::SeqCst) {
            return Err(anyhow!("injected investment failure"));
        }
        self.inner
            .create_investment(account_id, project_id, amount)
            .await
    }

    async fn delete_investment(&self, id: InvestmentId) -> Result<bool> {
        self.log("delete_investment");
        if self.fail_delete_investment.load(Ordering::SeqCst) {
            return Err(anyhow!("injected delete failure"));
        }
        self.inner.delete_investment(id).await
    }

    async fn get_investment(&self, id: InvestmentId) -> Result<Option<InvestmentRecord>> {
        self.inner.get_investment(id).await
    }

    async fn list_investments(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<InvestmentEntry>> {
        self.inner.list_investments(account_id, filter).await
    }

    async fn count_investments(&self) -> Result<i64> {
        self.inner.count_investments().await
    }

    async fn count_orphaned_investments(&self) -> Result<i64> {
        self.inner.count_orphaned_investments().await
    }
}
