use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AmountError, Cents, InvestmentId, ensure_positive};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Invest,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Invest => "invest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionKind::Deposit),
            "withdraw" => Some(TransactionKind::Withdraw),
            "invest" => Some(TransactionKind::Invest),
            _ => None,
        }
    }

    /// Signed balance effect of a record of this kind with the given magnitude.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            TransactionKind::Deposit => amount,
            TransactionKind::Withdraw | TransactionKind::Invest => -amount,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable ledger entry describing one balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    /// Assigned by storage; breaks ties between records with equal timestamps.
    pub sequence: i64,
    pub account_id: AccountId,
    /// Magnitude of the operation, never negative. Direction comes from `kind`.
    pub amount: Cents,
    pub kind: TransactionKind,
    /// Investment this entry pays for; only set for `Invest` entries.
    pub investment_id: Option<InvestmentId>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        account_id: AccountId,
        amount: Cents,
        kind: TransactionKind,
        investment_id: Option<InvestmentId>,
    ) -> Result<Self, RecordError> {
        let amount = ensure_positive(amount).map_err(RecordError::Amount)?;
        match (kind, investment_id) {
            (TransactionKind::Invest, None) => return Err(RecordError::MissingInvestment),
            (TransactionKind::Deposit | TransactionKind::Withdraw, Some(_)) => {
                return Err(RecordError::UnexpectedInvestment(kind));
            }
            _ => {}
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            amount,
            kind,
            investment_id,
            created_at: Utc::now(),
        })
    }

    pub fn signed_amount(&self) -> Cents {
        self.kind.signed(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    Amount(AmountError),
    MissingInvestment,
    UnexpectedInvestment(TransactionKind),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Amount(e) => write!(f, "{}", e),
            RecordError::MissingInvestment => {
                write!(f, "invest entries must reference an investment")
            }
            RecordError::UnexpectedInvestment(kind) => {
                write!(f, "{} entries cannot reference an investment", kind)
            }
        }
    }
}

impl std::error::Error for RecordError {}
