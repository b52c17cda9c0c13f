mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{faulty_service, funded_account, test_service};
use fundflow::application::AppError;
use fundflow::domain::{HistoryFilter, TransactionKind};
use fundflow::storage::BalanceLedger;

// ========================
// Registration
// ========================

#[tokio::test]
async fn test_register_account_starts_at_zero() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = service
        .register_account("Ada Lovelace", "Ada@Example.com")
        .await?;
    assert_eq!(account.balance, 0);
    assert_eq!(account.email, "ada@example.com");
    assert_eq!(service.get_balance("ada@example.com").await?, 0);
    assert_eq!(service.get_account("ADA@example.com").await?.id, account.id);

    Ok(())
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service
        .register_account("Ada Lovelace", "ada@example.com")
        .await?;
    let result = service
        .register_account("Another Ada", "ADA@example.com")
        .await;
    assert!(matches!(result, Err(AppError::AccountAlreadyExists(_))));

    Ok(())
}

#[tokio::test]
async fn test_register_validates_input() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.register_account("Ada", "ada@example.com").await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    let result = service.register_account("Ada Lovelace", "not-an-email").await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    assert!(service.store().list_accounts().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    assert!(matches!(
        service.get_balance("ghost@example.com").await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.deposit("ghost@example.com", 5000).await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.withdraw("ghost@example.com", 5000).await,
        Err(AppError::AccountNotFound(_))
    ));

    Ok(())
}

// ========================
// Deposit and withdraw
// ========================

#[tokio::test]
async fn test_deposit_records_one_entry() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;

    let change = service.deposit("ada@example.com", 5000).await?;
    assert_eq!(change.account.balance, 15000);
    assert_eq!(change.transaction.kind, TransactionKind::Deposit);
    assert_eq!(change.transaction.amount, 5000);
    assert_eq!(change.transaction.account_id, change.account.id);
    assert_eq!(change.transaction.investment_id, None);

    let deposits = service
        .list_transactions(
            "ada@example.com",
            &HistoryFilter::default().with_kind(TransactionKind::Deposit),
        )
        .await?;
    assert_eq!(deposits.len(), 2);
    assert_eq!(deposits[0].id, change.transaction.id);
    assert_eq!(service.get_balance("ada@example.com").await?, 15000);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_records_one_entry() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;

    let change = service.withdraw("ada@example.com", 2500).await?;
    assert_eq!(change.account.balance, 7500);
    assert_eq!(change.transaction.kind, TransactionKind::Withdraw);
    assert_eq!(change.transaction.amount, 2500);
    assert_eq!(change.transaction.signed_amount(), -2500);

    // The whole balance can be withdrawn
    let change = service.withdraw("ada@example.com", 7500).await?;
    assert_eq!(change.account.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_more_than_balance_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;

    let result = service.withdraw("ada@example.com", 15000).await;
    match result {
        Err(AppError::InsufficientBalance {
            balance, required, ..
        }) => {
            assert_eq!(balance, 10000);
            assert_eq!(required, 15000);
        }
        other => panic!("expected InsufficientBalance, got {:?}", other.map(|c| c.account)),
    }

    assert_eq!(service.get_balance("ada@example.com").await?, 10000);
    let withdrawals = service
        .list_transactions(
            "ada@example.com",
            &HistoryFilter::default().with_kind(TransactionKind::Withdraw),
        )
        .await?;
    assert!(withdrawals.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected() -> Result<()> {
    let (service, _temp) = faulty_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;
    service.store().clear_calls();

    for amount in [0, -500] {
        assert!(matches!(
            service.deposit("ada@example.com", amount).await,
            Err(AppError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.withdraw("ada@example.com", amount).await,
            Err(AppError::InvalidAmount(_))
        ));
    }

    assert!(service.store().calls().is_empty());
    assert_eq!(service.get_balance("ada@example.com").await?, 10000);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_makes_no_storage_calls() -> Result<()> {
    let (service, _temp) = faulty_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;
    let project = service.create_project("Solar Farm").await?;
    service.store().clear_calls();

    assert!(matches!(
        service.withdraw("ada@example.com", 10001).await,
        Err(AppError::InsufficientBalance { .. })
    ));
    assert!(matches!(
        service.invest("ada@example.com", project.id, 15000).await,
        Err(AppError::InsufficientBalance { .. })
    ));

    assert!(service.store().calls().is_empty());
    assert_eq!(service.get_balance("ada@example.com").await?, 10000);

    Ok(())
}

// ========================
// Numeric limits
// ========================

#[tokio::test]
async fn test_deposit_past_max_balance_is_rejected() -> Result<()> {
    let (service, _temp) = faulty_service().await?;
    funded_account(&service, "ada@example.com", i64::MAX - 10).await?;
    service.store().clear_calls();

    let result = service.deposit("ada@example.com", 100).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    assert!(service.store().calls().is_empty());

    let account = service.get_account("ada@example.com").await?;
    assert_eq!(account.balance, i64::MAX - 10);

    // Exactly up to the limit is fine
    let change = service.deposit("ada@example.com", 10).await?;
    assert_eq!(change.account.balance, i64::MAX);

    let deposits = service
        .list_transactions(
            "ada@example.com",
            &HistoryFilter::default().with_kind(TransactionKind::Deposit),
        )
        .await?;
    assert_eq!(deposits.len(), 2);
    assert!(service.check_consistency().await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_storage_refuses_overflowing_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", i64::MAX - 10).await?;

    assert!(service.store().adjust_balance("ada@example.com", 100).await.is_err());
    assert!(
        service
            .store()
            .adjust_balance_above("ada@example.com", 100, 0)
            .await?
            .is_none()
    );
    assert!(service.store().adjust_balance("ghost@example.com", 100).await?.is_none());

    // Bypassing the guard still cannot store a non-integer balance
    let raw = sqlx::query("UPDATE accounts SET balance = balance + 100 WHERE email = ?")
        .bind("ada@example.com")
        .execute(service.store().pool())
        .await;
    assert!(raw.is_err());

    assert_eq!(service.get_balance("ada@example.com").await?, i64::MAX - 10);

    Ok(())
}

// ========================
// Conservation
// ========================

#[tokio::test]
async fn test_serial_operations_conserve_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service
        .register_account("Ada Lovelace", "ada@example.com")
        .await?;

    let operations: [(TransactionKind, i64); 6] = [
        (TransactionKind::Deposit, 10000),
        (TransactionKind::Withdraw, 2500),
        (TransactionKind::Deposit, 125),
        (TransactionKind::Withdraw, 7000),
        (TransactionKind::Deposit, 4999),
        (TransactionKind::Withdraw, 1),
    ];

    let mut expected = 0;
    for (kind, amount) in operations {
        match kind {
            TransactionKind::Deposit => service.deposit("ada@example.com", amount).await?,
            _ => service.withdraw("ada@example.com", amount).await?,
        };
        expected += kind.signed(amount);
    }

    assert_eq!(service.get_balance("ada@example.com").await?, expected);

    let records = service
        .list_transactions("ada@example.com", &HistoryFilter::default())
        .await?;
    assert_eq!(records.len(), operations.len());
    let recorded: i64 = records.iter().map(|r| r.signed_amount()).sum();
    assert_eq!(recorded, expected);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_operations_conserve_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", 10000).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.deposit("ada@example.com", 500).await.map(|_| ())
            } else {
                service.withdraw("ada@example.com", 300).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(
        service.get_balance("ada@example.com").await?,
        10000 + 10 * 500 - 10 * 300
    );
    let records = service
        .list_transactions("ada@example.com", &HistoryFilter::default())
        .await?;
    assert_eq!(records.len(), 21);
    assert!(service.check_consistency().await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, "ada@example.com", 1000).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.withdraw("ada@example.com", 300).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientBalance { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(service.get_balance("ada@example.com").await?, 100);

    let withdrawals = service
        .list_transactions(
            "ada@example.com",
            &HistoryFilter::default().with_kind(TransactionKind::Withdraw),
        )
        .await?;
    assert_eq!(withdrawals.len(), 3);
    assert!(service.check_consistency().await?.is_consistent());

    Ok(())
}
