use crate::domain::account::{Account, AccountId, AccountKind, OwnerId};
use crate::domain::money::{Amount, Balance};
use crate::domain::transaction::{TransactionFilter, TransactionId, TransactionRecord};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Partial update applied to an account located by its natural key.
/// `expiry` is double-optional: `None` leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub balance: Option<Balance>,
    pub kind: Option<AccountKind>,
    pub currency: Option<String>,
    pub expiry: Option<Option<String>>,
}

/// Local persistence port for accounts.
///
/// `update_balance` is scoped by (id, owner) and reports the number of rows
/// it touched instead of failing when nothing matched: zero means the
/// surrogate id has drifted and the caller retries by canonical number.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn upsert(&self, account: Account) -> Result<()>;
    async fn get(&self, owner: OwnerId, id: AccountId) -> Result<Option<Account>>;
    async fn get_by_number(&self, owner: OwnerId, number: &str) -> Result<Option<Account>>;
    /// Non-deleted accounts, ordered by display order.
    async fn accounts(&self, owner: OwnerId) -> Result<Vec<Account>>;
    /// Every account including soft-deleted ones, for reconciliation.
    async fn all_accounts(&self, owner: OwnerId) -> Result<Vec<Account>>;
    async fn update_balance(
        &self,
        id: AccountId,
        owner: OwnerId,
        balance: Balance,
    ) -> Result<usize>;
    async fn update_by_number(
        &self,
        owner: OwnerId,
        number: &str,
        patch: AccountPatch,
    ) -> Result<usize>;
    async fn soft_delete(&self, id: AccountId, owner: OwnerId) -> Result<()>;
    /// Hard removal by natural key. Only the identity re-key path of
    /// reconciliation uses this; everything else soft-deletes.
    async fn remove_by_number(&self, owner: OwnerId, number: &str) -> Result<()>;
    /// Issues the next local placeholder id (negative, never an authority id).
    async fn next_placeholder_id(&self) -> Result<AccountId>;
}

/// Local persistence port for the append-only transaction history.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a record and returns the store-assigned id.
    async fn insert(&self, record: TransactionRecord) -> Result<TransactionId>;
    async fn get(&self, owner: OwnerId, id: TransactionId) -> Result<Option<TransactionRecord>>;
    async fn query(
        &self,
        owner: OwnerId,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRecord>>;
}

/// Where a transfer is going. Only `Internal` destinations are locally
/// owned; the rest leave the cache and produce a single outgoing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Internal { number: String },
    OtherBank { number: String },
    Phone { number: String },
    International { recipient: String, country: String },
}

impl Destination {
    pub fn is_internal(&self) -> bool {
        matches!(self, Destination::Internal { .. })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Internal { number } | Destination::OtherBank { number } => {
                let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
                let last4 = &digits[digits.len().saturating_sub(4)..];
                write!(f, "card •••• {last4}")
            }
            Destination::Phone { number } => write!(f, "phone {number}"),
            Destination::International { recipient, country } => {
                write!(f, "{recipient} ({country})")
            }
        }
    }
}

/// One row of the authoritative account list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub id: AccountId,
    pub number: String,
    pub kind: AccountKind,
    pub balance: Balance,
    pub currency: String,
    pub expiry: Option<String>,
}

/// Authority's answer to a transfer or deposit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTransferOutcome {
    pub success: bool,
    pub new_balance: Option<Balance>,
    pub transaction_id: Option<i64>,
    pub message: Option<String>,
}

/// The remote ledger authority. Business-rule enforcement (limits, fraud
/// checks) happens behind this port; the cache only consumes the outcome.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    async fn list_accounts(&self, owner: OwnerId) -> Result<Vec<RemoteAccount>>;
    async fn transfer(
        &self,
        source: AccountId,
        destination: &Destination,
        amount: Amount,
        description: Option<&str>,
    ) -> Result<RemoteTransferOutcome>;
    async fn deposit(&self, account: AccountId, amount: Amount) -> Result<RemoteTransferOutcome>;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type RemoteLedgerRef = Arc<dyn RemoteLedger>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        let dest = Destination::Internal {
            number: "4400 1100 0000 0002".to_string(),
        };
        assert_eq!(dest.to_string(), "card •••• 0002");

        let dest = Destination::Phone {
            number: "+77010000000".to_string(),
        };
        assert_eq!(dest.to_string(), "phone +77010000000");
    }

    #[test]
    fn test_destination_locality() {
        assert!(
            Destination::Internal {
                number: "1".to_string()
            }
            .is_internal()
        );
        assert!(
            !Destination::OtherBank {
                number: "1".to_string()
            }
            .is_internal()
        );
    }
}
