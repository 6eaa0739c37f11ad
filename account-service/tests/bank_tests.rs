use std::sync::Arc;

use account_service::{
    AccountRepository, Bank, BankConfig, FeeConfig, InMemoryAccountRepository,
    InMemoryClientDirectory, InMemoryStore, InterestConfig, OperationLog, RepositoryType,
};
use chrono::NaiveDate;
use common::decimal::Amount;
use common::error::Error;
use common::model::{AccountId, ClientId, NewClient, OperationKind};
use common::TransactionManager;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct TestBank {
    bank: Bank,
    repo: Arc<InMemoryAccountRepository>,
    store: Arc<InMemoryStore>,
}

fn create_test_bank(bonus_rate: Amount) -> TestBank {
    let store = Arc::new(InMemoryStore::new());
    let repo = Arc::new(InMemoryAccountRepository::new(store.clone()));
    let clients = Arc::new(InMemoryClientDirectory::new(store.clone()));

    let mut config = BankConfig::new("postgres://unused".to_string(), 1, true);
    config.fees = FeeConfig::new(dec!(3), dec!(1000));
    config.interest = InterestConfig::new(dec!(1.5), bonus_rate);

    let bank = Bank::from_parts(repo.clone(), clients, &config);
    TestBank { bank, repo, store }
}

fn new_client(national_id: &str) -> NewClient {
    NewClient {
        national_id: national_id.to_string(),
        first_name: "Luis".to_string(),
        last_name: "Garcia".to_string(),
        phone: "699000111".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1979, 11, 23).unwrap(),
    }
}

async fn funded_checking(bank: &Bank, client_id: ClientId, amount: Amount) -> AccountId {
    let account_id = bank.open_checking_account(client_id).await.unwrap();
    bank.deposit(client_id, account_id, amount, "Opening deposit").await.unwrap();
    account_id
}

async fn funded_savings(bank: &Bank, client_id: ClientId, amount: Amount) -> AccountId {
    let account_id = bank.open_savings_account(client_id, false).await.unwrap();
    bank.deposit(client_id, account_id, amount, "Opening deposit").await.unwrap();
    account_id
}

async fn balance(bank: &Bank, client_id: ClientId, account_id: AccountId) -> Amount {
    bank.account(client_id, account_id).await.unwrap().balance
}

#[tokio::test]
async fn test_savings_deposit_credits_bonus() {
    let t = create_test_bank(dec!(2));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = t.bank.open_savings_account(client, true).await.unwrap();

    let account = t.bank.deposit(client, account_id, dec!(100), "x").await.unwrap();
    assert_eq!(account.balance, dec!(102));

    let account = t.bank.deposit(client, account_id, dec!(100), "x").await.unwrap();
    assert_eq!(account.balance, dec!(204));

    // The recorded operations carry the credited amounts and their ids
    let stored = t.bank.account(client, account_id).await.unwrap();
    assert_eq!(stored.balance, dec!(204));
    assert_eq!(stored.operations.len(), 2);
    assert!(stored.operations.iter().all(|op| op.amount == dec!(102) && op.id.is_some()));
}

#[tokio::test]
async fn test_checking_debit_overdraws() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = funded_checking(&t.bank, client, dec!(50)).await;

    let account = t.bank.debit(client, account_id, dec!(80), "y").await.unwrap();
    assert_eq!(account.balance, dec!(-30));

    let stored = t.bank.account(client, account_id).await.unwrap();
    assert_eq!(stored.balance, dec!(-30));
    let last = stored.operations.last().unwrap();
    assert_eq!(last.kind, OperationKind::Debit);
    assert_eq!(last.amount, dec!(80));
    assert_eq!(last.description, "y");
}

#[tokio::test]
async fn test_savings_debit_insufficient_funds() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = funded_savings(&t.bank, client, dec!(50)).await;

    let result = t.bank.debit(client, account_id, dec!(80), "z").await;
    match result {
        Err(Error::InsufficientFunds { account_id: id, amount }) => {
            assert_eq!(id, account_id);
            assert_eq!(amount, dec!(80));
        }
        other => panic!("Expected InsufficientFunds, got {:?}", other),
    }

    let stored = t.bank.account(client, account_id).await.unwrap();
    assert_eq!(stored.balance, dec!(50));
    assert_eq!(stored.operations.len(), 1);

    // The bank stays usable after a rejected debit
    let account = t.bank.debit(client, account_id, dec!(20), "z").await.unwrap();
    assert_eq!(account.balance, dec!(30));
}

#[tokio::test]
async fn test_non_positive_movements() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = funded_checking(&t.bank, client, dec!(10)).await;

    let account = t.bank.deposit(client, account_id, dec!(0), "nothing").await.unwrap();
    assert_eq!(account.balance, dec!(10));
    assert_eq!(account.operations.len(), 1);

    let result = t.bank.debit(client, account_id, dec!(-5), "negative").await;
    assert!(matches!(result, Err(Error::ValidationError(_))));
    assert_eq!(t.store.operations.len(), 1);
}

#[tokio::test]
async fn test_account_access_checks() {
    let t = create_test_bank(dec!(0));
    let alice = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let bob = t.bank.register_client(new_client("22222222B")).await.unwrap();
    let alice_account = t.bank.open_checking_account(alice).await.unwrap();

    assert!(matches!(
        t.bank.account(bob, alice_account).await,
        Err(Error::OwnershipMismatch { client_id, account_id }) if client_id == bob && account_id == alice_account
    ));
    assert!(matches!(
        t.bank.deposit(bob, alice_account, dec!(10), "not mine").await,
        Err(Error::OwnershipMismatch { .. })
    ));
    assert!(matches!(t.bank.account(alice, 999).await, Err(Error::AccountNotFound(999))));
    assert!(matches!(t.bank.account(999, alice_account).await, Err(Error::ClientNotFound(999))));
    assert!(matches!(t.bank.open_checking_account(999).await, Err(Error::ClientNotFound(999))));
    assert_eq!(balance(&t.bank, alice, alice_account).await, dec!(0));
}

#[tokio::test]
async fn test_open_accounts_use_bank_settings() {
    let t = create_test_bank(dec!(0.5));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let checking = t.bank.open_checking_account(client).await.unwrap();
    let savings = t.bank.open_savings_account(client, true).await.unwrap();

    let accounts = t.bank.client_accounts(client).await.unwrap();
    assert_eq!(accounts.iter().map(|a| a.id).collect::<Vec<_>>(), vec![checking, savings]);
    assert_eq!(
        accounts[1].kind,
        common::model::AccountKind::Savings { has_passbook: true, bonus_rate: dec!(0.5) }
    );
    assert!(accounts.iter().all(|a| a.balance == dec!(0) && a.operations.is_empty()));
}

#[tokio::test]
async fn test_close_account_deletes_operations() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let other = t.bank.register_client(new_client("87654321X")).await.unwrap();
    let closed = funded_checking(&t.bank, client, dec!(100)).await;
    let kept = funded_checking(&t.bank, client, dec!(40)).await;
    t.bank.debit(client, closed, dec!(25), "rent").await.unwrap();

    assert!(matches!(t.bank.close_account(other, closed).await, Err(Error::OwnershipMismatch { .. })));

    t.bank.close_account(client, closed).await.unwrap();

    assert!(matches!(t.bank.account(client, closed).await, Err(Error::AccountNotFound(_))));
    assert!(t.repo.operation_log().find_by_account_id(closed).await.unwrap().is_empty());
    assert_eq!(t.store.operations.len(), 1);
    assert_eq!(balance(&t.bank, client, kept).await, dec!(40));
    assert!(!t.repo.transaction_manager().is_active().await);
}

#[tokio::test]
async fn test_transfer_moves_money() {
    let t = create_test_bank(dec!(0));
    let alice = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let bob = t.bank.register_client(new_client("22222222B")).await.unwrap();
    let source = funded_checking(&t.bank, alice, dec!(300)).await;
    let destination = funded_savings(&t.bank, bob, dec!(10)).await;

    let outcome = t.bank.transfer(alice, bob, source, destination, dec!(120)).await.unwrap();
    assert_eq!(outcome.source.balance, dec!(180));
    assert_eq!(outcome.destination.balance, dec!(130));

    let debit = t.bank.account(alice, source).await.unwrap().operations.pop().unwrap();
    assert_eq!(debit.kind, OperationKind::Debit);
    assert_eq!(debit.description, format!("Transfer to account {}", destination));

    let credit = t.bank.account(bob, destination).await.unwrap().operations.pop().unwrap();
    assert_eq!(credit.kind, OperationKind::Deposit);
    assert_eq!(credit.amount, dec!(120));
    assert_eq!(credit.description, format!("Transfer from account {}", source));
}

#[tokio::test]
async fn test_transfer_from_poor_savings_touches_nothing() {
    let t = create_test_bank(dec!(0));
    let alice = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let bob = t.bank.register_client(new_client("22222222B")).await.unwrap();
    let source = funded_savings(&t.bank, alice, dec!(100)).await;
    let destination = funded_checking(&t.bank, bob, dec!(5)).await;
    let operations_before = t.store.operations.len();

    let result = t.bank.transfer(alice, bob, source, destination, dec!(500)).await;
    assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

    assert_eq!(balance(&t.bank, alice, source).await, dec!(100));
    assert_eq!(balance(&t.bank, bob, destination).await, dec!(5));
    assert_eq!(t.store.operations.len(), operations_before);
}

#[tokio::test]
async fn test_transfer_rolls_back_when_second_leg_fails() {
    let t = create_test_bank(dec!(0));
    let alice = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let bob = t.bank.register_client(new_client("22222222B")).await.unwrap();
    let source = funded_checking(&t.bank, alice, dec!(300)).await;
    let destination = funded_checking(&t.bank, bob, dec!(0)).await;
    let operations_before = t.store.operations.len();

    t.repo.fail_updates_for(destination);
    let result = t.bank.transfer(alice, bob, source, destination, dec!(100)).await;
    assert!(result.unwrap_err().is_persistence());

    // The debit already written for the source is undone
    assert_eq!(balance(&t.bank, alice, source).await, dec!(300));
    assert_eq!(balance(&t.bank, bob, destination).await, dec!(0));
    assert_eq!(t.store.operations.len(), operations_before);
    assert!(!t.repo.transaction_manager().is_active().await);

    t.repo.clear_failure(destination);
    t.bank.transfer(alice, bob, source, destination, dec!(100)).await.unwrap();
    assert_eq!(balance(&t.bank, bob, destination).await, dec!(100));
}

#[tokio::test]
async fn test_transfer_rejects_invalid_requests() {
    let t = create_test_bank(dec!(0));
    let alice = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let account = funded_checking(&t.bank, alice, dec!(50)).await;
    let other = t.bank.open_checking_account(alice).await.unwrap();

    assert!(matches!(
        t.bank.transfer(alice, alice, account, account, dec!(10)).await,
        Err(Error::ValidationError(_))
    ));
    assert!(matches!(
        t.bank.transfer(alice, alice, account, other, dec!(0)).await,
        Err(Error::ValidationError(_))
    ));
    assert!(matches!(
        t.bank.transfer(alice, alice, account, 999, dec!(10)).await,
        Err(Error::AccountNotFound(999))
    ));
    assert_eq!(balance(&t.bank, alice, account).await, dec!(50));
}

#[tokio::test]
async fn test_fees_charge_checking_below_threshold() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let poor = funded_checking(&t.bank, client, dec!(500)).await;
    let rich = funded_checking(&t.bank, client, dec!(2000)).await;
    let overdrawn = t.bank.open_checking_account(client).await.unwrap();
    t.bank.debit(client, overdrawn, dec!(10), "card").await.unwrap();
    let savings = funded_savings(&t.bank, client, dec!(20)).await;

    let report = t.bank.apply_fees_to_all_checking(t.bank.fee_config()).await.unwrap();
    assert_eq!(report.affected, vec![poor, overdrawn]);
    assert_eq!(report.total, dec!(6));

    assert_eq!(balance(&t.bank, client, poor).await, dec!(497));
    assert_eq!(balance(&t.bank, client, rich).await, dec!(2000));
    assert_eq!(balance(&t.bank, client, overdrawn).await, dec!(-13));
    assert_eq!(balance(&t.bank, client, savings).await, dec!(20));

    let fee = t.bank.account(client, poor).await.unwrap().operations.pop().unwrap();
    assert_eq!(fee.description, common::model::account::FEE_DESCRIPTION);
}

#[tokio::test]
async fn test_fee_batch_is_all_or_nothing() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let mut accounts = Vec::new();
    for amount in [dec!(100), dec!(200), dec!(300), dec!(400)] {
        accounts.push(funded_checking(&t.bank, client, amount).await);
    }
    let operations_before = t.store.operations.len();

    t.repo.fail_updates_for(accounts[2]);
    let result = t.bank.apply_fees_to_all_checking(&FeeConfig::new(dec!(3), dec!(1000))).await;

    match result {
        Err(Error::BatchAborted { source, .. }) => assert!(source.is_persistence()),
        other => panic!("Expected BatchAborted, got {:?}", other),
    }

    // The first two charges were rolled back with the rest
    for (account_id, amount) in accounts.iter().zip([dec!(100), dec!(200), dec!(300), dec!(400)]) {
        assert_eq!(balance(&t.bank, client, *account_id).await, amount);
    }
    assert_eq!(t.store.operations.len(), operations_before);
}

#[tokio::test]
async fn test_interest_credits_savings_only() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let savings = funded_savings(&t.bank, client, dec!(1000)).await;
    let empty = t.bank.open_savings_account(client, false).await.unwrap();
    let checking = funded_checking(&t.bank, client, dec!(1000)).await;

    let report = t.bank.apply_interest_to_all_savings(&InterestConfig::new(dec!(1.5), dec!(0))).await.unwrap();
    assert_eq!(report.affected, vec![savings]);
    assert_eq!(report.total, dec!(15));

    assert_eq!(balance(&t.bank, client, savings).await, dec!(1015));
    assert_eq!(balance(&t.bank, client, empty).await, dec!(0));
    assert_eq!(balance(&t.bank, client, checking).await, dec!(1000));
}

#[tokio::test]
async fn test_interest_batch_failure_rolls_back() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let first = funded_savings(&t.bank, client, dec!(100)).await;
    let second = funded_savings(&t.bank, client, dec!(200)).await;
    let third = funded_savings(&t.bank, client, dec!(300)).await;

    t.repo.fail_updates_for(third);
    let result = t.bank.apply_interest_to_all_savings(t.bank.interest_config()).await;
    assert!(matches!(result, Err(Error::BatchAborted { .. })));

    assert_eq!(balance(&t.bank, client, first).await, dec!(100));
    assert_eq!(balance(&t.bank, client, second).await, dec!(200));
    assert_eq!(balance(&t.bank, client, third).await, dec!(300));
}

#[tokio::test]
async fn test_register_client_rejects_duplicate_national_id() {
    let t = create_test_bank(dec!(0));
    t.bank.register_client(new_client("12345678Z")).await.unwrap();

    let result = t.bank.register_client(new_client("12345678Z")).await;
    assert!(matches!(result, Err(Error::ValidationError(_))));
    assert_eq!(t.bank.clients().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_many_clients() {
    let t = create_test_bank(dec!(0));
    let ids = ["10000000A", "20000000B", "30000000C"];

    let registered = futures::future::try_join_all(
        ids.iter().map(|id| t.bank.register_client(new_client(id)))
    ).await.unwrap();
    assert_eq!(registered.len(), 3);

    let client = t.bank.client_by_national_id("20000000B").await.unwrap().unwrap();
    assert!(registered.contains(&client.id));
    assert_eq!(t.bank.client(client.id).await.unwrap().last_name, "Garcia");
    assert!(matches!(t.bank.client(999).await, Err(Error::ClientNotFound(999))));
}

#[tokio::test]
async fn test_remove_client_closes_accounts() {
    let t = create_test_bank(dec!(0));
    let leaving = t.bank.register_client(new_client("11111111A")).await.unwrap();
    let staying = t.bank.register_client(new_client("22222222B")).await.unwrap();
    funded_checking(&t.bank, leaving, dec!(10)).await;
    funded_savings(&t.bank, leaving, dec!(20)).await;
    let kept = funded_checking(&t.bank, staying, dec!(30)).await;

    t.bank.remove_client(leaving).await.unwrap();

    assert!(matches!(t.bank.client(leaving).await, Err(Error::ClientNotFound(_))));
    assert!(t.repo.find_all_ids_for_client(leaving).await.unwrap().is_empty());
    assert_eq!(t.store.accounts.len(), 1);
    assert_eq!(t.store.operations.len(), 1);
    assert_eq!(balance(&t.bank, staying, kept).await, dec!(30));

    assert!(matches!(t.bank.remove_client(leaving).await, Err(Error::ClientNotFound(_))));
}

#[tokio::test]
async fn test_default_in_memory_bank() {
    let bank = Bank::with_repository(RepositoryType::InMemory).await.unwrap();
    let client = bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = bank.open_checking_account(client).await.unwrap();

    bank.deposit(client, account_id, dec!(25), "cash").await.unwrap();
    assert_eq!(bank.account(client, account_id).await.unwrap().balance, dec!(25));
    assert!(!bank.name().is_empty());
}

#[tokio::test]
async fn test_overflowing_deposit_is_rejected() {
    let t = create_test_bank(dec!(0.5));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let account_id = funded_savings(&t.bank, client, dec!(100)).await;

    let result = t.bank.deposit(client, account_id, Decimal::MAX, "big").await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::DecimalError(_)));
    assert!(err.is_recoverable());

    assert_eq!(balance(&t.bank, client, account_id).await, dec!(100.5));
    assert!(!t.repo.transaction_manager().is_active().await);

    // The same overflow on the credit leg of a transfer touches nothing
    let source = funded_checking(&t.bank, client, dec!(10)).await;
    let result = t.bank.transfer(client, client, source, account_id, Decimal::MAX).await;
    assert!(matches!(result, Err(Error::DecimalError(_))));
    assert_eq!(balance(&t.bank, client, source).await, dec!(10));

    let account = t.bank.deposit(client, account_id, dec!(10), "small").await.unwrap();
    assert_eq!(account.balance, dec!(110.55));
}

#[tokio::test]
async fn test_interest_overflow_rolls_back_batch() {
    let t = create_test_bank(dec!(0));
    let client = t.bank.register_client(new_client("12345678Z")).await.unwrap();
    let modest = funded_savings(&t.bank, client, dec!(100)).await;
    let huge = funded_savings(&t.bank, client, Decimal::MAX).await;
    let operations_before = t.store.operations.len();

    let result = t.bank.apply_interest_to_all_savings(&InterestConfig::new(dec!(1.5), dec!(0))).await;
    match result {
        Err(Error::BatchAborted { source, .. }) => assert!(matches!(*source, Error::DecimalError(_))),
        other => panic!("Expected BatchAborted, got {:?}", other),
    }

    assert_eq!(balance(&t.bank, client, modest).await, dec!(100));
    assert_eq!(balance(&t.bank, client, huge).await, Decimal::MAX);
    assert_eq!(t.store.operations.len(), operations_before);

    // The bank is not left inside the aborted transaction
    assert!(!t.repo.transaction_manager().is_active().await);
    t.bank.debit(client, huge, dec!(1), "withdrawal").await.unwrap();
}
