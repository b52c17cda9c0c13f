use thiserror::Error;

use crate::domain::{AmountError, Cents, PeriodParseError, ProjectId, TransactionKind};

/// Opaque message handed to callers outside the crate for faults.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Insufficient balance in account {email}: balance {balance}, required {required}")]
    InsufficientBalance {
        email: String,
        balance: Cents,
        required: Cents,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reported by the consistency check; the details are in its report.
    #[error("Ledger consistency check failed")]
    LedgerInconsistent,

    #[error("Persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    /// An undo step failed after `original` aborted the workflow.
    /// Balance and records no longer agree until someone repairs them.
    #[error("Compensation failed during {operation} after: {original} ({} undo step(s) failed)", .failures.len())]
    CompensationFailed {
        operation: TransactionKind,
        original: Box<AppError>,
        failures: Vec<String>,
    },
}

impl AppError {
    /// Caller-side rejections, raised before anything was mutated.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::AccountNotFound(_)
                | AppError::AccountAlreadyExists(_)
                | AppError::ProjectNotFound(_)
                | AppError::InsufficientBalance { .. }
                | AppError::InvalidAmount(_)
                | AppError::InvalidInput(_)
        )
    }

    /// Errors whose message may cross the external boundary as is.
    pub fn is_public(&self) -> bool {
        self.is_rejection() || matches!(self, AppError::LedgerInconsistent)
    }

    /// True when storage may be left inconsistent.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, AppError::CompensationFailed { .. })
    }

    /// Message safe to show at the external boundary; storage detail is never included.
    pub fn public_message(&self) -> String {
        if self.is_public() {
            self.to_string()
        } else {
            INTERNAL_ERROR_MESSAGE.to_string()
        }
    }
}

/// True when `err` is a fault rather than an error the caller can act on.
/// Anything that is not an [`AppError`] (I/O, CSV, JSON) counts as a fault.
pub fn is_fault(err: &anyhow::Error) -> bool {
    !err.downcast_ref::<AppError>().is_some_and(AppError::is_public)
}

/// Message for an error leaving the process; faults are reduced to
/// [`INTERNAL_ERROR_MESSAGE`].
pub fn boundary_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AppError>() {
        Some(app_err) => app_err.public_message(),
        None => INTERNAL_ERROR_MESSAGE.to_string(),
    }
}

impl From<AmountError> for AppError {
    fn from(err: AmountError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}

impl From<PeriodParseError> for AppError {
    fn from(err: PeriodParseError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}
