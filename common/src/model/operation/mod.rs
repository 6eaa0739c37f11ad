//! Operation log entries

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{precision, Amount};
use crate::error::Error;
use super::{AccountId, OperationId};

/// Direction of a monetary movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Deposit,
    Debit,
}

impl OperationKind {
    /// Persisted tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "DEPOSIT",
            OperationKind::Debit => "DEBIT",
        }
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(OperationKind::Deposit),
            "DEBIT" => Ok(OperationKind::Debit),
            other => Err(Error::Reconstruction(format!("Unknown operation kind: {}", other))),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one deposit or debit against an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Assigned by the operation log; `None` until recorded
    pub id: Option<OperationId>,
    /// Account the movement belongs to
    pub account_id: AccountId,
    /// Deposit or debit
    pub kind: OperationKind,
    /// Always positive
    pub amount: Amount,
    /// Free-form description
    pub description: String,
    /// When the movement happened
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Create an unrecorded operation timestamped now
    pub fn new(account_id: AccountId, kind: OperationKind, amount: Amount, description: impl Into<String>) -> Self {
        Self {
            id: None,
            account_id,
            kind,
            amount,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Signed effect of this operation on the balance
    pub fn signed_amount(&self) -> Amount {
        match self.kind {
            OperationKind::Deposit => self.amount,
            OperationKind::Debit => -self.amount,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<7} {:>12} {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.kind.as_str(),
            format!("{:.2}", precision::round_money(self.amount)),
            self.description
        )
    }
}
