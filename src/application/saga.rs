use std::fmt;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::domain::{Cents, InvestmentId, TransactionKind, format_cents};
use crate::storage::Store;

use super::AppError;

/// Where a balance-mutating workflow currently stands.
///
/// Forward path for invest: `Start -> Debited -> InvestmentRecorded ->
/// TransactionRecorded -> Done`. Deposits go through `Credited` instead of
/// `Debited` and withdrawals skip `InvestmentRecorded`. A failed workflow ends
/// in `Compensated` or, if an undo step failed too, `Inconsistent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Start,
    Credited,
    Debited,
    InvestmentRecorded,
    TransactionRecorded,
    Done,
    Compensated,
    Inconsistent,
}

impl SagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Start => "start",
            SagaState::Credited => "credited",
            SagaState::Debited => "debited",
            SagaState::InvestmentRecorded => "investment_recorded",
            SagaState::TransactionRecorded => "transaction_recorded",
            SagaState::Done => "done",
            SagaState::Compensated => "compensated",
            SagaState::Inconsistent => "inconsistent",
        }
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The undo action for one applied forward step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Give back money taken by a debit.
    Credit { email: String, amount: Cents },
    /// Take back money added by a credit.
    Debit { email: String, amount: Cents },
    /// Remove an investment written earlier in the workflow.
    DeleteInvestment(InvestmentId),
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::Credit { email, amount } => {
                write!(f, "credit {} back to {}", format_cents(*amount), email)
            }
            Compensation::Debit { email, amount } => {
                write!(f, "debit {} again from {}", format_cents(*amount), email)
            }
            Compensation::DeleteInvestment(id) => write!(f, "delete investment {}", id),
        }
    }
}

/// A manual saga over the ledger store.
///
/// Each forward step registers its compensation; on failure the registered
/// compensations run newest first. Nothing is retried, and the saga lives in
/// memory only.
pub struct Saga<'a, S: Store> {
    store: &'a S,
    operation: TransactionKind,
    state: SagaState,
    compensations: Vec<Compensation>,
}

impl<'a, S: Store> Saga<'a, S> {
    pub fn new(store: &'a S, operation: TransactionKind) -> Self {
        Self {
            store,
            operation,
            state: SagaState::Start,
            compensations: Vec::new(),
        }
    }

    /// Record that a forward step took effect.
    pub fn advance(&mut self, state: SagaState, compensation: Option<Compensation>) {
        debug!("{} saga: {} -> {}", self.operation, self.state, state);
        self.state = state;
        if let Some(compensation) = compensation {
            self.compensations.push(compensation);
        }
    }

    /// Finish successfully; registered compensations are discarded.
    pub fn complete(mut self) {
        self.advance(SagaState::Done, None);
        self.compensations.clear();
    }

    /// Abort with `error`, undoing every applied step in reverse order.
    pub async fn fail<T>(self, error: impl Into<AppError>) -> Result<T, AppError> {
        Err(self.abort(error.into()).await)
    }

    /// Undo every applied step newest first and return the error to surface:
    /// the original one, or `CompensationFailed` wrapping it when an undo step
    /// failed. Later undo steps still run after one fails.
    pub async fn abort(mut self, original: AppError) -> AppError {
        if self.compensations.is_empty() {
            if original.is_rejection() {
                warn!("{} rejected at {}: {}", self.operation, self.state, original);
            } else {
                error!("{} failed at {}: {:#}", self.operation, self.state, original);
            }
            return original;
        }

        warn!(
            "{} failed at {}, compensating {} step(s): {}",
            self.operation,
            self.state,
            self.compensations.len(),
            original
        );

        let mut failures = Vec::new();
        while let Some(compensation) = self.compensations.pop() {
            match self.run(&compensation).await {
                Ok(()) => debug!("{} saga: {} done", self.operation, compensation),
                Err(e) => {
                    error!(
                        operation = %self.operation,
                        state = %self.state,
                        original = %original,
                        "compensation '{}' failed: {:#}",
                        compensation,
                        e
                    );
                    failures.push(format!("{}: {:#}", compensation, e));
                }
            }
        }

        if failures.is_empty() {
            info!(
                state = %SagaState::Compensated,
                "{} compensated after failure: {}",
                self.operation,
                original
            );
            original
        } else {
            error!(
                state = %SagaState::Inconsistent,
                "{} left storage inconsistent: {} of the undo steps failed",
                self.operation,
                failures.len()
            );
            AppError::CompensationFailed {
                operation: self.operation,
                original: Box::new(original),
                failures,
            }
        }
    }

    async fn run(&self, compensation: &Compensation) -> anyhow::Result<()> {
        match compensation {
            Compensation::Credit { email, amount } => self
                .store
                .adjust_balance(email, *amount)
                .await?
                .map(|_| ())
                .ok_or_else(|| anyhow!("account {} no longer exists", email)),
            Compensation::Debit { email, amount } => self
                .store
                .adjust_balance(email, -*amount)
                .await?
                .map(|_| ())
                .ok_or_else(|| anyhow!("account {} no longer exists", email)),
            Compensation::DeleteInvestment(id) => {
                if !self.store.delete_investment(*id).await? {
                    // Already gone: the intent of the undo step holds
                    warn!("investment {} was already removed", id);
                }
                Ok(())
            }
        }
    }
}
