use crate::domain::account::{AccountId, OwnerId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TransactionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TransferOut,
    TransferIn,
    Deposit,
    Purchase,
}

impl TransactionKind {
    /// Sign invariant: outgoing movements are negative, incoming positive.
    pub fn sign_matches(&self, amount: Decimal) -> bool {
        match self {
            TransactionKind::TransferOut | TransactionKind::Purchase => amount < Decimal::ZERO,
            TransactionKind::TransferIn | TransactionKind::Deposit => amount > Decimal::ZERO,
        }
    }
}

/// An append-only ledger entry. Created once by the transfer coordinator or
/// the deposit flow, never mutated or individually deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub owner: OwnerId,
    pub account: AccountId,
    pub title: String,
    /// Signed amount; see `TransactionKind::sign_matches`.
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub timestamp: DateTime<Utc>,
    pub from_account: Option<AccountId>,
    pub to_account: Option<AccountId>,
    pub category: Option<String>,
}

/// Filter for transaction history queries. Unset fields match everything;
/// results come back newest first.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account: Option<AccountId>,
    pub kind: Option<TransactionKind>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(account) = self.account
            && record.account != account
        {
            return false;
        }
        if let Some(kind) = self.kind
            && record.kind != kind
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sign_invariant() {
        assert!(TransactionKind::TransferOut.sign_matches(dec!(-10.0)));
        assert!(!TransactionKind::TransferOut.sign_matches(dec!(10.0)));
        assert!(TransactionKind::TransferIn.sign_matches(dec!(10.0)));
        assert!(TransactionKind::Deposit.sign_matches(dec!(0.01)));
        assert!(!TransactionKind::Deposit.sign_matches(dec!(0.0)));
        assert!(TransactionKind::Purchase.sign_matches(dec!(-5.0)));
    }

    #[test]
    fn test_filter_matches() {
        let record = TransactionRecord {
            id: TransactionId(1),
            owner: OwnerId(1),
            account: AccountId(10),
            title: "test".to_string(),
            amount: dec!(-5.0),
            kind: TransactionKind::TransferOut,
            timestamp: Utc::now(),
            from_account: Some(AccountId(10)),
            to_account: Some(AccountId(11)),
            category: None,
        };

        assert!(TransactionFilter::default().matches(&record));
        assert!(
            TransactionFilter {
                account: Some(AccountId(10)),
                ..Default::default()
            }
            .matches(&record)
        );
        assert!(
            !TransactionFilter {
                account: Some(AccountId(99)),
                ..Default::default()
            }
            .matches(&record)
        );
        assert!(
            !TransactionFilter {
                kind: Some(TransactionKind::Deposit),
                ..Default::default()
            }
            .matches(&record)
        );
    }
}
