use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AmountError, Cents, ensure_positive};

pub type InvestmentId = Uuid;
pub type ProjectId = Uuid;

/// A fundable project. Projects have no owning account, so investing
/// never credits anyone; the money leaves the investor's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

/// Money committed by an account to a project.
/// Created by the invest workflow after the debit and removed only when a later step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentRecord {
    pub id: InvestmentId,
    pub account_id: AccountId,
    pub project_id: ProjectId,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl InvestmentRecord {
    pub fn new(
        account_id: AccountId,
        project_id: ProjectId,
        amount: Cents,
    ) -> Result<Self, AmountError> {
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            project_id,
            amount: ensure_positive(amount)?,
            created_at: Utc::now(),
        })
    }
}

/// An investment together with the project it funds, for history views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentEntry {
    pub investment: InvestmentRecord,
    pub project_title: String,
}
