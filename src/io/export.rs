use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Account, HistoryFilter, InvestmentEntry, InvestmentId, TransactionRecord};
use crate::storage::Store;

/// An account's history, as written by the JSON export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    pub transactions: Vec<TransactionRecord>,
    pub investments: Vec<InvestmentEntry>,
}

/// Exporter for converting an account's history to various formats
pub struct Exporter<'a, S: Store> {
    service: &'a LedgerService<S>,
}

impl<'a, S: Store> Exporter<'a, S> {
    pub fn new(service: &'a LedgerService<S>) -> Self {
        Self { service }
    }

    /// Export ledger entries matching `filter` to CSV, newest first
    pub async fn export_transactions_csv<W: Write>(
        &self,
        email: &str,
        filter: &HistoryFilter,
        writer: W,
    ) -> Result<usize> {
        let transactions = self.service.list_transactions(email, filter).await?;
        let titles = self.project_titles(email).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "kind",
            "amount_cents",
            "investment_id",
            "project",
        ])?;

        let mut count = 0;
        for record in &transactions {
            let project = record
                .investment_id
                .and_then(|id| titles.get(&id).cloned())
                .unwrap_or_default();

            csv_writer.write_record([
                record.id.to_string(),
                record.sequence.to_string(),
                record.created_at.to_rfc3339(),
                record.kind.as_str().to_string(),
                record.amount.to_string(),
                record
                    .investment_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                project,
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export investments matching `filter` to CSV, newest first
    pub async fn export_investments_csv<W: Write>(
        &self,
        email: &str,
        filter: &HistoryFilter,
        writer: W,
    ) -> Result<usize> {
        let investments = self.service.list_investments(email, filter).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "created_at", "project_id", "project", "amount_cents"])?;

        let mut count = 0;
        for entry in &investments {
            let investment = &entry.investment;
            csv_writer.write_record([
                investment.id.to_string(),
                investment.created_at.to_rfc3339(),
                investment.project_id.to_string(),
                entry.project_title.clone(),
                investment.amount.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the account and its filtered history as a JSON snapshot
    pub async fn export_json<W: Write>(
        &self,
        email: &str,
        filter: &HistoryFilter,
        mut writer: W,
    ) -> Result<HistorySnapshot> {
        let account = self.service.get_account(email).await?;
        let transactions = self.service.list_transactions(email, filter).await?;
        let investments = self.service.list_investments(email, filter).await?;

        let snapshot = HistorySnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account,
            transactions,
            investments,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }

    async fn project_titles(&self, email: &str) -> Result<HashMap<InvestmentId, String>> {
        let investments = self
            .service
            .list_investments(email, &HistoryFilter::default())
            .await?;
        Ok(investments
            .into_iter()
            .map(|entry| (entry.investment.id, entry.project_title))
            .collect())
    }
}
