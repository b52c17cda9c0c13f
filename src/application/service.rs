use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{
    Account, Cents, ConsistencyReport, HistoryFilter, InvestmentEntry, InvestmentRecord,
    MIN_NAME_LEN, Project, ProjectId, TransactionKind, TransactionRecord,
    build_consistency_report, ensure_positive, format_cents, is_valid_email, is_valid_name,
    normalize_email,
};
use crate::storage::{Repository, Store};

use super::{AppError, Compensation, Saga, SagaState};

/// Application service coordinating every balance-affecting operation.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
///
/// Multi-step operations run as a [`Saga`]: nothing spans the steps, so a
/// concurrent reader may observe a debited balance before the matching
/// entry exists.
pub struct LedgerService<S = Repository> {
    store: S,
}

/// Result of a deposit or withdrawal.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub account: Account,
    pub transaction: TransactionRecord,
}

/// Result of a completed investment.
#[derive(Debug, Clone)]
pub struct InvestmentReceipt {
    pub account: Account,
    pub project: Project,
    pub investment: InvestmentRecord,
    pub transaction: TransactionRecord,
}

impl LedgerService<Repository> {
    /// Initialize a new database described by `config`.
    pub async fn init(config: &Config) -> Result<Self, AppError> {
        let repo = Repository::init(&config.database_url(true), config.max_connections).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let repo = Repository::connect(&config.database_url(false), config.max_connections).await?;
        Ok(Self::new(repo))
    }
}

impl<S: Store> LedgerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================
    // Account operations
    // ========================

    /// Register a new account with a zero balance.
    pub async fn register_account(&self, name: &str, email: &str) -> Result<Account, AppError> {
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(AppError::InvalidInput(format!(
                "name must be at least {} characters",
                MIN_NAME_LEN
            )));
        }
        if !is_valid_email(email) {
            return Err(AppError::InvalidInput(format!(
                "'{}' is not a valid email address",
                email.trim()
            )));
        }

        let account = Account::new(name.to_string(), email.to_string());
        if !self.store.insert_account(&account).await? {
            return Err(AppError::AccountAlreadyExists(account.email));
        }

        info!("registered account {}", account.email);
        Ok(account)
    }

    /// Get an account by email.
    pub async fn get_account(&self, email: &str) -> Result<Account, AppError> {
        let email = normalize_email(email);
        let account = self.store.get_account(&email).await?;
        account.ok_or(AppError::AccountNotFound(email))
    }

    pub async fn get_balance(&self, email: &str) -> Result<Cents, AppError> {
        Ok(self.get_account(email).await?.balance)
    }

    // ========================
    // Project operations
    // ========================

    pub async fn create_project(&self, title: &str) -> Result<Project, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("project title cannot be empty".into()));
        }

        let project = Project::new(title);
        self.store.insert_project(&project).await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: ProjectId) -> Result<Project, AppError> {
        self.store
            .get_project(id)
            .await?
            .ok_or(AppError::ProjectNotFound(id))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, AppError> {
        Ok(self.store.list_projects().await?)
    }

    // ========================
    // Balance operations
    // ========================

    /// Credit `amount` and record a deposit entry.
    /// The credit is taken back if the entry cannot be written.
    pub async fn deposit(&self, email: &str, amount: Cents) -> Result<BalanceChange, AppError> {
        let amount = ensure_positive(amount)?;
        let account = self.get_account(email).await?;
        self.ensure_fits(&account, amount)?;

        let email = account.email;
        let mut saga = Saga::new(&self.store, TransactionKind::Deposit);

        let account = match self.store.adjust_balance(&email, amount).await {
            Ok(Some(account)) => account,
            Ok(None) => return saga.fail(AppError::AccountNotFound(email)).await,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(
            SagaState::Credited,
            Some(Compensation::Debit {
                email: email.clone(),
                amount,
            }),
        );

        let transaction = match self
            .store
            .record(account.id, amount, TransactionKind::Deposit, None)
            .await
        {
            Ok(transaction) => transaction,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(SagaState::TransactionRecorded, None);
        saga.complete();

        info!(
            "deposited {} into {}, balance {}",
            format_cents(amount),
            email,
            format_cents(account.balance)
        );
        Ok(BalanceChange {
            account,
            transaction,
        })
    }

    /// Debit `amount` and record a withdraw entry.
    /// Rejected before any write when the balance cannot cover it.
    pub async fn withdraw(&self, email: &str, amount: Cents) -> Result<BalanceChange, AppError> {
        let amount = ensure_positive(amount)?;
        let account = self.get_account(email).await?;
        self.ensure_covers(&account, amount)?;

        let email = account.email;
        let mut saga = Saga::new(&self.store, TransactionKind::Withdraw);

        let account = match self.debit(&email, amount).await {
            Ok(account) => account,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(
            SagaState::Debited,
            Some(Compensation::Credit {
                email: email.clone(),
                amount,
            }),
        );

        let transaction = match self
            .store
            .record(account.id, amount, TransactionKind::Withdraw, None)
            .await
        {
            Ok(transaction) => transaction,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(SagaState::TransactionRecorded, None);
        saga.complete();

        info!(
            "withdrew {} from {}, balance {}",
            format_cents(amount),
            email,
            format_cents(account.balance)
        );
        Ok(BalanceChange {
            account,
            transaction,
        })
    }

    /// Invest `amount` from the account into a project.
    ///
    /// Runs debit, investment, invest entry in that order. When a step fails
    /// the steps before it are undone newest first and the failure is
    /// returned; if an undo step fails as well the error is
    /// [`AppError::CompensationFailed`].
    pub async fn invest(
        &self,
        email: &str,
        project_id: ProjectId,
        amount: Cents,
    ) -> Result<InvestmentReceipt, AppError> {
        let amount = ensure_positive(amount)?;
        let project = self.get_project(project_id).await?;
        let account = self.get_account(email).await?;
        self.ensure_covers(&account, amount)?;

        let email = account.email;
        let mut saga = Saga::new(&self.store, TransactionKind::Invest);

        // Step 1: debit
        let account = match self.debit(&email, amount).await {
            Ok(account) => account,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(
            SagaState::Debited,
            Some(Compensation::Credit {
                email: email.clone(),
                amount,
            }),
        );

        // Step 2: investment
        let investment = match self
            .store
            .create_investment(account.id, project.id, amount)
            .await
        {
            Ok(investment) => investment,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(
            SagaState::InvestmentRecorded,
            Some(Compensation::DeleteInvestment(investment.id)),
        );

        // Step 3: ledger entry
        let transaction = match self
            .store
            .record(
                account.id,
                amount,
                TransactionKind::Invest,
                Some(investment.id),
            )
            .await
        {
            Ok(transaction) => transaction,
            Err(e) => return saga.fail(e).await,
        };
        saga.advance(SagaState::TransactionRecorded, None);
        saga.complete();

        info!(
            "{} invested {} in '{}', balance {}",
            email,
            format_cents(amount),
            project.title,
            format_cents(account.balance)
        );
        Ok(InvestmentReceipt {
            account,
            project,
            investment,
            transaction,
        })
    }

    fn ensure_covers(&self, account: &Account, amount: Cents) -> Result<(), AppError> {
        if account.can_cover(amount) {
            return Ok(());
        }
        warn!(
            "rejected debit of {} from {}: balance {}",
            format_cents(amount),
            account.email,
            format_cents(account.balance)
        );
        Err(AppError::InsufficientBalance {
            email: account.email.clone(),
            balance: account.balance,
            required: amount,
        })
    }

    fn ensure_fits(&self, account: &Account, amount: Cents) -> Result<(), AppError> {
        if account.balance.checked_add(amount).is_some() {
            return Ok(());
        }
        warn!(
            "rejected deposit of {} into {}: balance {} is at the limit",
            format_cents(amount),
            account.email,
            format_cents(account.balance)
        );
        Err(AppError::InvalidAmount(format!(
            "deposit of {} would exceed the maximum balance",
            format_cents(amount)
        )))
    }

    /// Floor-guarded debit. A concurrent debit that landed after the
    /// pre-check makes the guard fail; that is reported as insufficient funds.
    async fn debit(&self, email: &str, amount: Cents) -> Result<Account, AppError> {
        if let Some(account) = self.store.adjust_balance_above(email, -amount, 0).await? {
            return Ok(account);
        }

        match self.store.get_account(email).await? {
            Some(account) => Err(AppError::InsufficientBalance {
                email: account.email,
                balance: account.balance,
                required: amount,
            }),
            None => Err(AppError::AccountNotFound(email.to_string())),
        }
    }

    // ========================
    // History
    // ========================

    /// Ledger entries of an account, newest first.
    pub async fn list_transactions(
        &self,
        email: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>, AppError> {
        let account = self.get_account(email).await?;
        Ok(self.store.list_filtered(account.id, filter).await?)
    }

    /// Investments of an account, newest first.
    /// A kind filter other than invest matches nothing.
    pub async fn list_investments(
        &self,
        email: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<InvestmentEntry>, AppError> {
        let account = self.get_account(email).await?;
        if filter.kind.is_some_and(|kind| kind != TransactionKind::Invest) {
            return Ok(Vec::new());
        }
        Ok(self.store.list_investments(account.id, filter).await?)
    }

    // ========================
    // Consistency
    // ========================

    /// Compare every stored balance with the balance replayed from history.
    pub async fn check_consistency(&self) -> Result<ConsistencyReport, AppError> {
        let accounts = self.store.list_accounts().await?;
        let records = self.store.list_all().await?;
        let investment_count = self.store.count_investments().await?;
        let orphaned = self.store.count_orphaned_investments().await?;

        let report = build_consistency_report(&accounts, &records, investment_count, orphaned);
        if !report.is_consistent() {
            warn!(
                "ledger inconsistent: {} drifted balance(s), {} orphaned investment(s)",
                report.drifted.len(),
                report.orphaned_investments
            );
        }
        Ok(report)
    }
}
