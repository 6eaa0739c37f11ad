//! Bank: client and account lifecycle, single-account movements, transfers
//! and the bulk fee/interest batches
//!
//! Accounts are mutated in memory (see [`Account`]) and the resulting
//! postings are persisted here. Anything that writes more than one row runs
//! inside a single repository transaction: it either commits completely or is
//! rolled back completely.

use std::sync::Arc;

use common::decimal::{checked_add, Amount};
use common::error::{Error, ErrorExt, Result};
use common::model::{
    Account, AccountId, AccountType, Client, ClientId, NewAccount, NewClient, Posting,
};
use common::PgSession;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clients::{ClientDirectory, InMemoryClientDirectory, PostgresClientDirectory};
use crate::config::{BankConfig, FeeConfig, InterestConfig};
use crate::repository::{AccountRepository, InMemoryAccountRepository, PostgresAccountRepository};
use crate::store::InMemoryStore;

const FEE_BATCH: &str = "apply fees to checking accounts";
const INTEREST_BATCH: &str = "apply interest to savings accounts";

/// Repository Type
pub enum RepositoryType {
    /// In-memory repository
    InMemory,
    /// PostgreSQL repository
    Postgres(Option<String>),
}

/// Result of a bulk fee or interest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Accounts that were charged or credited
    pub affected: Vec<AccountId>,
    /// Total amount charged or credited
    pub total: Amount,
}

/// Both sides of a completed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub source: Account,
    pub destination: Account,
}

/// Bank orchestrating clients, accounts and their operations
pub struct Bank {
    name: String,
    accounts: Arc<dyn AccountRepository>,
    clients: Arc<dyn ClientDirectory>,
    fees: FeeConfig,
    interest: InterestConfig,
    transaction_logging: bool,
}

impl Bank {
    /// Create an in-memory bank with the default configuration
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::from_parts(
            Arc::new(InMemoryAccountRepository::new(store.clone())),
            Arc::new(InMemoryClientDirectory::new(store)),
            &BankConfig::default(),
        )
    }

    /// Create a bank over existing storage
    pub fn from_parts(
        accounts: Arc<dyn AccountRepository>,
        clients: Arc<dyn ClientDirectory>,
        config: &BankConfig,
    ) -> Self {
        Self {
            name: config.bank_name.clone(),
            accounts,
            clients,
            fees: config.fees.clone(),
            interest: config.interest.clone(),
            transaction_logging: config.transaction_logging,
        }
    }

    /// Create a bank with a specific repository type
    pub async fn with_repository(repo_type: RepositoryType) -> Result<Self> {
        match repo_type {
            RepositoryType::InMemory => Ok(Self::new()),
            RepositoryType::Postgres(database_url) => {
                let mut config = BankConfig::from_env()?;
                if let Some(url) = database_url {
                    config.database_url = url;
                }
                Self::with_config(&config).await
            }
        }
    }

    /// Create a PostgreSQL-backed bank from a configuration
    pub async fn with_config(config: &BankConfig) -> Result<Self> {
        config.validate()?;
        info!("Connecting to PostgreSQL database with pool size: {}", config.db_pool_size);

        let pool = common::db::init_db_pool(&config.database_url, config.db_pool_size).await?;
        let session = Arc::new(PgSession::new(pool));

        Ok(Self::from_parts(
            Arc::new(PostgresAccountRepository::new(session.clone())),
            Arc::new(PostgresClientDirectory::new(session)),
            config,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fee_config(&self) -> &FeeConfig {
        &self.fees
    }

    pub fn interest_config(&self) -> &InterestConfig {
        &self.interest
    }

    /// The account repository this bank persists through
    pub fn repository(&self) -> &Arc<dyn AccountRepository> {
        &self.accounts
    }

    // Clients

    /// Register a new client; national ids are unique
    pub async fn register_client(&self, client: NewClient) -> Result<ClientId> {
        info!("Registering client {}", client.national_id);

        if self.clients.find_by_national_id(&client.national_id).await?.is_some() {
            return Err(Error::ValidationError(format!(
                "A client with national id {} already exists", client.national_id
            )));
        }

        self.clients.create(&client).await
    }

    /// Get a client by ID
    pub async fn client(&self, client_id: ClientId) -> Result<Client> {
        self.clients.find_by_id(client_id).await?
            .ok_or(Error::ClientNotFound(client_id))
    }

    /// Get a client by national id
    pub async fn client_by_national_id(&self, national_id: &str) -> Result<Option<Client>> {
        self.clients.find_by_national_id(national_id).await
    }

    /// Every registered client
    pub async fn clients(&self) -> Result<Vec<Client>> {
        self.clients.find_all().await
    }

    /// Close every account of a client, then remove the client
    pub async fn remove_client(&self, client_id: ClientId) -> Result<()> {
        info!("Removing client {}", client_id);
        self.ensure_client(client_id).await?;

        self.accounts.begin().await?;
        let outcome = async {
            for account_id in self.accounts.find_all_ids_for_client(client_id).await? {
                self.accounts.delete(account_id).await
                    .with_context(|| format!("Failed to close account {}", account_id))?;
            }
            self.clients.delete(client_id).await
        }.await;

        self.finish("remove client", outcome).await
    }

    // Account lifecycle

    /// Open an empty checking account for a client
    pub async fn open_checking_account(&self, client_id: ClientId) -> Result<AccountId> {
        info!("Opening checking account for client {}", client_id);
        self.ensure_client(client_id).await?;

        self.accounts.create(&NewAccount::checking(client_id)).await
            .with_context(|| format!("Failed to open checking account for client {}", client_id))
    }

    /// Open an empty savings account for a client, with the bank's bonus rate
    pub async fn open_savings_account(&self, client_id: ClientId, has_passbook: bool) -> Result<AccountId> {
        info!("Opening savings account for client {} (passbook: {})", client_id, has_passbook);
        self.ensure_client(client_id).await?;

        let account = NewAccount::savings(client_id, has_passbook, self.interest.bonus_rate);
        self.accounts.create(&account).await
            .with_context(|| format!("Failed to open savings account for client {}", client_id))
    }

    /// Close an account, deleting its operations with it
    pub async fn close_account(&self, client_id: ClientId, account_id: AccountId) -> Result<()> {
        info!("Closing account {} of client {}", account_id, client_id);
        self.account(client_id, account_id).await?;

        self.accounts.begin().await?;
        let outcome = self.accounts.delete(account_id).await;
        self.finish("close account", outcome).await
    }

    /// Get an account, checking that it belongs to the client
    pub async fn account(&self, client_id: ClientId, account_id: AccountId) -> Result<Account> {
        self.ensure_client(client_id).await?;

        let account = self.accounts.find_by_id(account_id).await?
            .ok_or(Error::AccountNotFound(account_id))?;

        if account.owner_id != client_id {
            return Err(Error::OwnershipMismatch { client_id, account_id });
        }
        Ok(account)
    }

    /// Every account of a client
    pub async fn client_accounts(&self, client_id: ClientId) -> Result<Vec<Account>> {
        self.ensure_client(client_id).await?;

        let mut accounts = Vec::new();
        for account_id in self.accounts.find_all_ids_for_client(client_id).await? {
            let account = self.accounts.find_by_id(account_id).await?
                .ok_or(Error::AccountNotFound(account_id))?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    // Movements

    /// Deposit into a client's account
    pub async fn deposit(
        &self,
        client_id: ClientId,
        account_id: AccountId,
        amount: Amount,
        description: &str,
    ) -> Result<Account> {
        info!("Depositing {} to account {}", amount, account_id);

        let account = self.account(client_id, account_id).await?;
        let posting = account.deposit(amount, description).map_err(|e| {
            warn!("Deposit rejected: {}", e);
            e
        })?;
        if !posting.is_change() {
            debug!("Ignoring non-positive deposit of {} to account {}", amount, account_id);
            return Ok(posting.account);
        }

        self.accounts.begin().await?;
        let outcome = self.persist(posting).await;
        self.finish("deposit", outcome).await
    }

    /// Debit a client's account. Savings accounts fail with
    /// [`Error::InsufficientFunds`] when the balance does not cover `amount`.
    pub async fn debit(
        &self,
        client_id: ClientId,
        account_id: AccountId,
        amount: Amount,
        description: &str,
    ) -> Result<Account> {
        info!("Debiting {} from account {}", amount, account_id);

        let account = self.account(client_id, account_id).await?;
        let posting = account.debit(amount, description).map_err(|e| {
            warn!("Debit rejected: {}", e);
            e
        })?;

        self.accounts.begin().await?;
        let outcome = self.persist(posting).await;
        self.finish("debit", outcome).await
    }

    /// Move `amount` between two accounts as one unit: the debit of the
    /// source and the deposit into the destination commit together or not
    /// at all. Both accounts are validated before either leg runs.
    pub async fn transfer(
        &self,
        from_client_id: ClientId,
        to_client_id: ClientId,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Amount,
    ) -> Result<TransferOutcome> {
        info!(
            "Transferring {} from account {} to account {}",
            amount, from_account_id, to_account_id
        );

        if amount <= Amount::ZERO {
            return Err(Error::ValidationError(format!("Transfer amount must be positive, got {}", amount)));
        }
        if from_account_id == to_account_id {
            return Err(Error::ValidationError(format!(
                "Cannot transfer from account {} to itself", from_account_id
            )));
        }

        let source = self.account(from_client_id, from_account_id).await?;
        let destination = self.account(to_client_id, to_account_id).await?;

        let debit = source.debit(amount, &format!("Transfer to account {}", to_account_id))
            .map_err(|e| {
                warn!("Transfer rejected: {}", e);
                e
            })?;
        let deposit = destination.deposit(amount, &format!("Transfer from account {}", from_account_id))
            .map_err(|e| {
                warn!("Transfer rejected: {}", e);
                e
            })?;

        self.accounts.begin().await?;
        let outcome = async {
            let source = self.persist(debit).await?;
            let destination = self.persist(deposit).await?;
            Ok(TransferOutcome { source, destination })
        }.await;

        self.finish("transfer", outcome).await
    }

    // Batches

    /// Charge the maintenance fee to every checking account below the
    /// threshold. All charges commit together; any failure rolls back the
    /// whole batch and is reported as [`Error::BatchAborted`].
    pub async fn apply_fees_to_all_checking(&self, fees: &FeeConfig) -> Result<BatchReport> {
        info!("Applying fee {} below balance {} to checking accounts", fees.fee, fees.min_balance);

        self.run_batch(FEE_BATCH, AccountType::Checking, |account| {
            account.apply_fee(fees.fee, fees.min_balance)
        }).await
    }

    /// Pay interest to every savings account. All deposits commit together;
    /// any failure rolls back the whole batch.
    pub async fn apply_interest_to_all_savings(&self, interest: &InterestConfig) -> Result<BatchReport> {
        info!("Applying interest rate {}% to savings accounts", interest.rate);

        self.run_batch(INTEREST_BATCH, AccountType::Savings, |account| {
            account.apply_interest(interest.rate)
        }).await
    }

    async fn run_batch<F>(&self, batch: &str, account_type: AccountType, mutate: F) -> Result<BatchReport>
    where
        F: Fn(&Account) -> Result<Posting> + Send + Sync,
    {
        self.accounts.begin().await
            .map_err(|e| Error::batch_aborted(batch, e))?;

        let outcome = async {
            let mut report = BatchReport { affected: Vec::new(), total: Amount::ZERO };

            for account in self.accounts.find_all().await? {
                if !account.is(account_type) {
                    continue;
                }

                let posting = mutate(&account)?;
                if let Some(operation) = &posting.operation {
                    report.total = checked_add(report.total, operation.amount)?;
                    report.affected.push(account.id);
                    self.persist(posting).await
                        .with_context(|| format!("Batch stopped at account {}", account.id))?;
                }
            }

            Ok(report)
        }.await;

        let report = self.finish(batch, outcome).await
            .map_err(|e| Error::batch_aborted(batch, e))?;

        info!("Batch '{}' touched {} accounts for a total of {}", batch, report.affected.len(), report.total);
        Ok(report)
    }

    // Persistence helpers

    async fn ensure_client(&self, client_id: ClientId) -> Result<()> {
        if self.clients.exists(client_id).await? {
            Ok(())
        } else {
            Err(Error::ClientNotFound(client_id))
        }
    }

    /// Record the posting's operation and write the account. Must run inside
    /// an active transaction.
    async fn persist(&self, mut posting: Posting) -> Result<Account> {
        if let Some(operation) = posting.operation.clone() {
            let id = self.accounts.operation_log().create(&operation).await
                .with_context(|| format!("Failed to record operation on account {}", operation.account_id))?;
            posting.mark_recorded(id);

            if self.transaction_logging {
                info!(
                    "Recorded operation {}: {} {} on account {} ({})",
                    id, operation.kind, operation.amount, operation.account_id, operation.description
                );
            }
        }

        self.accounts.update(&posting.account).await
            .with_context(|| format!("Failed to update account {}", posting.account.id))?;

        Ok(posting.account)
    }

    /// Commit on success, roll back on failure and return the original error
    async fn finish<T>(&self, action: &str, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.accounts.commit().await
                    .with_context(|| format!("Failed to commit {}", action))?;
                debug!("Committed {}", action);
                Ok(value)
            }
            Err(e) => {
                error!("Error during {}, rolling back: {}", action, e);

                if let Err(rollback_err) = self.accounts.rollback().await {
                    error!("Failed to roll back transaction: {}", rollback_err);
                }

                Err(e)
            }
        }
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}
