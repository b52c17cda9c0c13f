use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use crate::application::{AppError, LedgerService};
use crate::config::{Config, DEFAULT_DATABASE};
use crate::domain::{
    HistoryFilter, TransactionKind, TransactionPeriod, format_cents, parse_amount,
};

/// fundflow - account ledger with compensated investment workflows
#[derive(Parser)]
#[command(name = "fundflow")]
#[command(about = "Deposits, withdrawals and project investments on a SQLite ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "FUNDFLOW_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Show the balance of an account
    Balance {
        /// Account email
        email: String,
    },

    /// Deposit money into an account
    Deposit {
        /// Account email
        email: String,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account email
        email: String,

        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,
    },

    /// Project management commands
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Invest money from an account into a project
    Invest {
        /// Account email
        email: String,

        /// Project ID
        #[arg(short, long)]
        project: String,

        /// Amount to invest (e.g., "50.00" or "50")
        amount: String,
    },

    /// List ledger entries of an account, newest first
    History {
        /// Account email
        email: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List investments of an account, newest first
    Investments {
        /// Account email
        email: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Compare balances with the recorded history
    Check,

    /// Export an account's history to CSV or JSON
    Export {
        /// What to export: transactions, investments, json
        export_type: String,

        /// Account email
        email: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a new account with a zero balance
    Register {
        /// Display name (at least 6 characters)
        name: String,

        /// Email address (must be unique)
        email: String,
    },

    /// Show account details
    Show {
        /// Account email
        email: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a new project
    Add {
        /// Project title
        title: String,
    },

    /// List all projects
    List,
}

/// History filters shared by listing and export commands.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only entries of this kind: deposit, withdraw, invest
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Only entries from the last period (e.g., "30 days", "1 year")
    #[arg(short, long)]
    pub period: Option<String>,

    /// Only entries whose project title contains this keyword
    #[arg(long)]
    pub keyword: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Result<HistoryFilter, AppError> {
        let mut filter = HistoryFilter::default();
        if let Some(kind) = &self.kind {
            let kind = TransactionKind::from_str(kind).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Invalid kind '{}'. Valid kinds: deposit, withdraw, invest",
                    kind
                ))
            })?;
            filter = filter.with_kind(kind);
        }
        if let Some(period) = &self.period {
            filter = filter.with_period(TransactionPeriod::parse(period)?);
        }
        if let Some(keyword) = &self.keyword {
            filter = filter.with_keyword(keyword.clone());
        }
        Ok(filter)
    }
}

impl Cli {
    pub fn config(&self) -> Config {
        Config::new(self.database.clone()).with_verbose(self.verbose)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        match self.command {
            Commands::Init => {
                LedgerService::init(&config).await?;
                println!("Database initialized: {}", config.database);
            }

            Commands::Account(account_cmd) => {
                let service = LedgerService::connect(&config).await?;
                run_account_command(&service, account_cmd).await?;
            }

            Commands::Balance { email } => {
                let service = LedgerService::connect(&config).await?;
                let account = service.get_account(&email).await?;
                println!(
                    "{}: {} {}",
                    account.email,
                    format_cents(account.balance),
                    account.currency
                );
            }

            Commands::Deposit { email, amount } => {
                let service = LedgerService::connect(&config).await?;
                let amount = parse_amount(&amount).map_err(AppError::from)?;
                let change = service.deposit(&email, amount).await?;
                println!(
                    "Deposited {} into {} (balance {}, entry {})",
                    format_cents(change.transaction.amount),
                    change.account.email,
                    format_cents(change.account.balance),
                    change.transaction.id
                );
            }

            Commands::Withdraw { email, amount } => {
                let service = LedgerService::connect(&config).await?;
                let amount = parse_amount(&amount).map_err(AppError::from)?;
                let change = service.withdraw(&email, amount).await?;
                println!(
                    "Withdrew {} from {} (balance {}, entry {})",
                    format_cents(change.transaction.amount),
                    change.account.email,
                    format_cents(change.account.balance),
                    change.transaction.id
                );
            }

            Commands::Project(project_cmd) => {
                let service = LedgerService::connect(&config).await?;
                run_project_command(&service, project_cmd).await?;
            }

            Commands::Invest {
                email,
                project,
                amount,
            } => {
                let service = LedgerService::connect(&config).await?;
                let project_id = Uuid::parse_str(&project)
                    .map_err(|_| AppError::InvalidInput(format!("Invalid project ID '{}'", project)))?;
                let amount = parse_amount(&amount).map_err(AppError::from)?;
                let receipt = service.invest(&email, project_id, amount).await?;
                println!(
                    "Invested {} in '{}' (balance {}, investment {})",
                    format_cents(receipt.investment.amount),
                    receipt.project.title,
                    format_cents(receipt.account.balance),
                    receipt.investment.id
                );
            }

            Commands::History { email, filter } => {
                let service = LedgerService::connect(&config).await?;
                run_history_command(&service, &email, &filter).await?;
            }

            Commands::Investments { email, filter } => {
                let service = LedgerService::connect(&config).await?;
                run_investments_command(&service, &email, &filter).await?;
            }

            Commands::Check => {
                let service = LedgerService::connect(&config).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                email,
                output,
                filter,
            } => {
                let service = LedgerService::connect(&config).await?;
                run_export_command(&service, &export_type, &email, output.as_deref(), &filter)
                    .await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Register { name, email } => {
            let account = service.register_account(&name, &email).await?;
            println!("Registered account: {} <{}>", account.name, account.email);
        }

        AccountCommands::Show { email } => {
            let account = service.get_account(&email).await?;
            let investments = service
                .list_investments(&email, &HistoryFilter::default())
                .await?;
            let invested: i64 = investments.iter().map(|e| e.investment.amount).sum();

            println!("Account: {}", account.name);
            println!("  ID:          {}", account.id);
            println!("  Email:       {}", account.email);
            println!(
                "  Created:     {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!(
                "  Balance:     {} {}",
                format_cents(account.balance),
                account.currency
            );
            println!(
                "  Invested:    {} in {} investment(s)",
                format_cents(invested),
                investments.len()
            );
        }
    }
    Ok(())
}

async fn run_project_command(service: &LedgerService, cmd: ProjectCommands) -> Result<()> {
    match cmd {
        ProjectCommands::Add { title } => {
            let project = service.create_project(&title).await?;
            println!("Created project: {} ({})", project.title, project.id);
        }

        ProjectCommands::List => {
            let projects = service.list_projects().await?;
            if projects.is_empty() {
                println!("No projects found.");
            } else {
                println!("{:<38} TITLE", "ID");
                println!("{}", "-".repeat(70));
                for project in projects {
                    println!("{:<38} {}", project.id, project.title);
                }
            }
        }
    }
    Ok(())
}

async fn run_history_command(
    service: &LedgerService,
    email: &str,
    args: &FilterArgs,
) -> Result<()> {
    let filter = args.to_filter()?;
    let records = service.list_transactions(email, &filter).await?;

    if records.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!("{:<20} {:<10} {:>12} INVESTMENT", "DATE", "KIND", "AMOUNT");
    println!("{}", "-".repeat(70));
    for record in &records {
        println!(
            "{:<20} {:<10} {:>12} {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.kind.as_str(),
            format_cents(record.signed_amount()),
            record
                .investment_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_investments_command(
    service: &LedgerService,
    email: &str,
    args: &FilterArgs,
) -> Result<()> {
    let filter = args.to_filter()?;
    let entries = service.list_investments(email, &filter).await?;

    if entries.is_empty() {
        println!("No investments found.");
        return Ok(());
    }

    println!("{:<20} {:<30} {:>12}", "DATE", "PROJECT", "AMOUNT");
    println!("{}", "-".repeat(64));
    for entry in &entries {
        println!(
            "{:<20} {:<30} {:>12}",
            entry.investment.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&entry.project_title, 30),
            format_cents(entry.investment.amount)
        );
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger consistency...\n");

    let report = service.check_consistency().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!("Investments:  {}", report.investment_count);
    println!();

    if report.is_consistent() {
        println!("Ledger is consistent.");
        return Ok(());
    }

    println!("Issues found:");
    for drift in &report.drifted {
        println!(
            "  - {}: stored balance {} but history sums to {} (off by {})",
            drift.email,
            format_cents(drift.stored),
            format_cents(drift.recorded),
            format_cents(drift.difference())
        );
    }
    if report.orphaned_investments > 0 {
        println!(
            "  - {} investment(s) without a matching invest entry",
            report.orphaned_investments
        );
    }
    for account_id in &report.negative_balances {
        println!("  - account {} has a negative balance", account_id);
    }
    Err(AppError::LedgerInconsistent.into())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    email: &str,
    output: Option<&str>,
    args: &FilterArgs,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let export_type = ExportType::parse(export_type)?;
    let filter = args.to_filter()?;
    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                warn!("cannot create {}: {}", path, e);
                AppError::InvalidInput(format!("Cannot create output file '{}'", path))
            })?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        ExportType::Transactions => {
            let count = exporter
                .export_transactions_csv(email, &filter, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        ExportType::Investments => {
            let count = exporter
                .export_investments_csv(email, &filter, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} investments", count);
            }
        }
        ExportType::Json => {
            let snapshot = exporter.export_json(email, &filter, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {}: {} transactions, {} investments",
                    snapshot.account.email,
                    snapshot.transactions.len(),
                    snapshot.investments.len()
                );
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportType {
    Transactions,
    Investments,
    Json,
}

impl ExportType {
    fn parse(s: &str) -> Result<Self, AppError> {
        match s.to_lowercase().as_str() {
            "transactions" => Ok(ExportType::Transactions),
            "investments" => Ok(ExportType::Investments),
            "json" => Ok(ExportType::Json),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid export type '{}'. Valid types: transactions, investments, json",
                s
            ))),
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
