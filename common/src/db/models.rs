//! Persisted row types and their conversion to and from the domain model
//!
//! Timestamps are stored as `TIMESTAMPTZ` and read back as epoch seconds.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::error::{Error, Result};
use crate::model::{
    Account, AccountId, AccountKind, AccountType, Client, ClientId, Operation, OperationId,
    OperationKind,
};

/// Database model for the accounts table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbAccount {
    pub id: AccountId,
    pub client_id: ClientId,
    pub account_type: String,
    pub balance: Decimal,
    pub created_at: i64,
    pub has_passbook: Option<bool>,
    pub bonus_rate: Option<Decimal>,
}

impl DbAccount {
    /// Rebuild the account variant named by the stored type tag and attach
    /// its operations. An unknown tag, or a savings row missing its passbook
    /// flag or bonus rate, is a reconstruction error.
    pub fn into_account(self, operations: Vec<Operation>) -> Result<Account> {
        let kind = match self.account_type.parse::<AccountType>()? {
            AccountType::Checking => AccountKind::Checking,
            AccountType::Savings => match (self.has_passbook, self.bonus_rate) {
                (Some(has_passbook), Some(bonus_rate)) => AccountKind::Savings { has_passbook, bonus_rate },
                _ => {
                    return Err(Error::Reconstruction(format!(
                        "Savings account {} is missing its passbook flag or bonus rate", self.id
                    )))
                }
            },
        };

        Ok(Account {
            id: self.id,
            owner_id: self.client_id,
            balance: self.balance,
            created_at: from_epoch(self.created_at)?,
            kind,
            operations,
        })
    }
}

impl From<&Account> for DbAccount {
    fn from(account: &Account) -> Self {
        let (has_passbook, bonus_rate) = match &account.kind {
            AccountKind::Checking => (None, None),
            AccountKind::Savings { has_passbook, bonus_rate } => (Some(*has_passbook), Some(*bonus_rate)),
        };

        Self {
            id: account.id,
            client_id: account.owner_id,
            account_type: account.account_type().as_str().to_string(),
            balance: account.balance,
            created_at: account.created_at.timestamp(),
            has_passbook,
            bonus_rate,
        }
    }
}

/// Database model for the operations table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbOperation {
    pub id: OperationId,
    pub account_id: AccountId,
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub created_at: i64,
}

impl DbOperation {
    /// Row for an operation recorded under `id`
    pub fn recorded(id: OperationId, operation: &Operation) -> Self {
        Self {
            id,
            account_id: operation.account_id,
            kind: operation.kind.as_str().to_string(),
            amount: operation.amount,
            description: operation.description.clone(),
            created_at: operation.created_at.timestamp(),
        }
    }

    pub fn into_operation(self) -> Result<Operation> {
        Ok(Operation {
            id: Some(self.id),
            account_id: self.account_id,
            kind: self.kind.parse::<OperationKind>()?,
            amount: self.amount,
            description: self.description,
            created_at: from_epoch(self.created_at)?,
        })
    }
}

/// Database model for the clients table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbClient {
    pub id: ClientId,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub created_at: i64,
}

impl DbClient {
    pub fn into_client(self) -> Result<Client> {
        Ok(Client {
            id: self.id,
            national_id: self.national_id,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            birth_date: self.birth_date,
            created_at: from_epoch(self.created_at)?,
        })
    }
}

impl From<&Client> for DbClient {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            national_id: client.national_id.clone(),
            first_name: client.first_name.clone(),
            last_name: client.last_name.clone(),
            phone: client.phone.clone(),
            birth_date: client.birth_date,
            created_at: client.created_at.timestamp(),
        }
    }
}

fn from_epoch(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::Reconstruction(format!("Timestamp out of range: {}", seconds)))
}
