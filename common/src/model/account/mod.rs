//! Account models and the ledger rules for mutating them
//!
//! Accounts are immutable values: every mutation returns a [`Posting`] with
//! the new snapshot and the [`Operation`] it produced, and the caller decides
//! when (and in which transaction) to persist it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{checked_add, percentage, precision, scale_by_rate, Amount, Rate};
use crate::error::{Error, Result};
use super::operation::{Operation, OperationKind};
use super::{AccountId, ClientId, OperationId};

/// Description recorded for interest deposits
pub const INTEREST_DESCRIPTION: &str = "Interest credited";

/// Description recorded for maintenance fee debits
pub const FEE_DESCRIPTION: &str = "Maintenance fee charge";

/// Account type tag, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
}

impl AccountType {
    /// Persisted tag
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
        }
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CHECKING" => Ok(AccountType::Checking),
            "SAVINGS" => Ok(AccountType::Savings),
            other => Err(Error::Reconstruction(format!("Unknown account type: {}", other))),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific part of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    /// May be overdrawn; subject to maintenance fees
    Checking,
    /// Never negative; deposits are scaled up by `bonus_rate` percent
    Savings {
        has_passbook: bool,
        bonus_rate: Rate,
    },
}

impl AccountKind {
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountKind::Checking => AccountType::Checking,
            AccountKind::Savings { .. } => AccountType::Savings,
        }
    }
}

/// An account that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub owner_id: ClientId,
    pub kind: AccountKind,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

impl NewAccount {
    /// Empty checking account
    pub fn checking(owner_id: ClientId) -> Self {
        Self {
            owner_id,
            kind: AccountKind::Checking,
            balance: Amount::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Empty savings account
    pub fn savings(owner_id: ClientId, has_passbook: bool, bonus_rate: Rate) -> Self {
        Self {
            owner_id,
            kind: AccountKind::Savings { has_passbook, bonus_rate },
            balance: Amount::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Opening balance
    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    /// Attach the id assigned by storage
    pub fn assign_id(self, id: AccountId) -> Account {
        Account {
            id,
            owner_id: self.owner_id,
            balance: self.balance,
            created_at: self.created_at,
            kind: self.kind,
            operations: Vec::new(),
        }
    }
}

/// A persisted account with its operation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Immutable identity
    pub id: AccountId,
    /// Owning client (back-reference by id)
    pub owner_id: ClientId,
    /// Current balance; negative only for overdrawn checking accounts
    pub balance: Amount,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Variant and its payload
    pub kind: AccountKind,
    /// Append-only, in chronological order
    pub operations: Vec<Operation>,
}

/// Outcome of an account mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Snapshot after the mutation
    pub account: Account,
    /// Operation produced, `None` for a no-op
    pub operation: Option<Operation>,
}

impl Posting {
    fn unchanged(account: &Account) -> Self {
        Self {
            account: account.clone(),
            operation: None,
        }
    }

    /// Whether the mutation changed anything
    pub fn is_change(&self) -> bool {
        self.operation.is_some()
    }

    /// Record the id the operation log assigned to the produced operation
    pub fn mark_recorded(&mut self, id: OperationId) {
        if let Some(operation) = self.operation.as_mut() {
            operation.id = Some(id);
        }
        if let Some(last) = self.account.operations.last_mut() {
            last.id = Some(id);
        }
    }
}

impl Account {
    pub fn account_type(&self) -> AccountType {
        self.kind.account_type()
    }

    /// Whether this account has the given type
    pub fn is(&self, account_type: AccountType) -> bool {
        self.account_type() == account_type
    }

    /// Credit `amount`. Savings accounts credit (and record) the amount scaled
    /// by their bonus rate. Non-positive amounts are ignored. Fails with
    /// [`Error::DecimalError`] when the credit or the new balance overflows.
    pub fn deposit(&self, amount: Amount, description: &str) -> Result<Posting> {
        if amount <= Amount::ZERO {
            return Ok(Posting::unchanged(self));
        }

        let credited = match &self.kind {
            AccountKind::Checking => amount,
            AccountKind::Savings { bonus_rate, .. } => scale_by_rate(amount, *bonus_rate)?,
        };

        self.post(OperationKind::Deposit, credited, description)
    }

    /// Debit `amount`. Checking accounts may go negative; savings accounts
    /// reject any debit larger than the balance and stay untouched.
    pub fn debit(&self, amount: Amount, description: &str) -> Result<Posting> {
        if amount <= Amount::ZERO {
            return Err(Error::ValidationError(format!(
                "Debit amount must be positive, got {}", amount
            )));
        }

        if let AccountKind::Savings { .. } = self.kind {
            if amount > self.balance {
                return Err(Error::InsufficientFunds {
                    account_id: self.id,
                    amount,
                });
            }
        }

        self.post(OperationKind::Debit, amount, description)
    }

    /// Deposit `rate` percent of the balance as interest (savings only).
    /// The interest goes through [`Account::deposit`], bonus included.
    pub fn apply_interest(&self, rate: Rate) -> Result<Posting> {
        if !self.is(AccountType::Savings) {
            return Err(Error::ValidationError(format!(
                "Interest only applies to savings accounts, account {} is {}",
                self.id,
                self.account_type()
            )));
        }

        let interest = percentage(self.balance, rate)?;
        self.deposit(interest, INTEREST_DESCRIPTION)
    }

    /// Charge `fee` when the balance is below `min_balance` (checking only)
    pub fn apply_fee(&self, fee: Amount, min_balance: Amount) -> Result<Posting> {
        if !self.is(AccountType::Checking) {
            return Err(Error::ValidationError(format!(
                "Fees only apply to checking accounts, account {} is {}",
                self.id,
                self.account_type()
            )));
        }

        if self.balance < min_balance && fee > Amount::ZERO {
            self.debit(fee, FEE_DESCRIPTION)
        } else {
            Ok(Posting::unchanged(self))
        }
    }

    fn post(&self, kind: OperationKind, amount: Amount, description: &str) -> Result<Posting> {
        let operation = Operation::new(self.id, kind, amount, description);

        let mut account = self.clone();
        account.balance = checked_add(self.balance, operation.signed_amount())?;
        account.operations.push(operation.clone());

        Ok(Posting {
            account,
            operation: Some(operation),
        })
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Account ID: {}", self.id)?;
        writeln!(f, "Account type: {}", self.account_type())?;
        writeln!(f, "Client ID: {}", self.owner_id)?;
        writeln!(f, "Balance: {:.2}", precision::round_money(self.balance))?;
        writeln!(f, "Created: {}", self.created_at.format("%Y-%m-%d"))?;
        if let AccountKind::Savings { has_passbook, .. } = self.kind {
            writeln!(f, "Passbook: {}", if has_passbook { "Yes" } else { "No" })?;
        }
        for operation in &self.operations {
            writeln!(f, "  {}", operation)?;
        }
        Ok(())
    }
}
