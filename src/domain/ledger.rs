use std::collections::HashMap;

use serde::Serialize;

use super::{Account, AccountId, Cents, TransactionRecord};

/// Replayed balances for every account that appears in `records`: deposits
/// add, withdrawals and investments subtract. Sums saturate, so a corrupt
/// history shows up as drift.
pub fn replay_all_balances(records: &[TransactionRecord]) -> HashMap<AccountId, Cents> {
    let mut balances: HashMap<AccountId, Cents> = HashMap::new();
    for record in records {
        let balance = balances.entry(record.account_id).or_insert(0);
        *balance = balance.saturating_add(record.signed_amount());
    }
    balances
}

/// An account whose stored balance disagrees with its recorded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account_id: AccountId,
    pub email: String,
    pub stored: Cents,
    pub recorded: Cents,
}

impl BalanceDrift {
    pub fn difference(&self) -> Cents {
        self.stored.saturating_sub(self.recorded)
    }
}

/// Outcome of comparing balances with the transaction history.
/// Drift or orphaned investments point at an operation whose compensation failed.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub investment_count: i64,
    pub drifted: Vec<BalanceDrift>,
    /// Investments without the invest entry that should pay for them.
    pub orphaned_investments: i64,
    pub negative_balances: Vec<AccountId>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.drifted.is_empty() && self.orphaned_investments == 0 && self.negative_balances.is_empty()
    }
}

pub fn build_consistency_report(
    accounts: &[Account],
    records: &[TransactionRecord],
    investment_count: i64,
    orphaned_investments: i64,
) -> ConsistencyReport {
    let replayed = replay_all_balances(records);

    let drifted = accounts
        .iter()
        .filter_map(|account| {
            let recorded = replayed.get(&account.id).copied().unwrap_or(0);
            (recorded != account.balance).then(|| BalanceDrift {
                account_id: account.id,
                email: account.email.clone(),
                stored: account.balance,
                recorded,
            })
        })
        .collect();

    let negative_balances = accounts
        .iter()
        .filter(|a| a.balance < 0)
        .map(|a| a.id)
        .collect();

    ConsistencyReport {
        account_count: accounts.len(),
        transaction_count: records.len(),
        investment_count,
        drifted,
        orphaned_investments,
        negative_balances,
    }
}
