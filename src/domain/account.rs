use crate::domain::money::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate account identifier.
///
/// Positive ids are assigned by the remote authority. Local placeholder ids
/// (issued by the store before the authority has seen the account) are
/// negative, so the two spaces never collide. Reconciliation re-keys a
/// placeholder to the authority id once the account shows up in the
/// authoritative list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AccountId(pub i64);

impl AccountId {
    pub fn is_placeholder(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Debit,
    Credit,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Debit => write!(f, "debit"),
            AccountKind::Credit => write!(f, "credit"),
        }
    }
}

/// A cached account record.
///
/// The canonical `number` is the natural key: at most one non-soft-deleted
/// account per (owner, number). The surrogate `id` is authority-owned and
/// rebindable; `display_order`, `hidden`, `deleted` and `linked` are
/// local-only attributes that survive an id re-key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: OwnerId,
    pub number: String,
    pub kind: AccountKind,
    pub balance: Balance,
    pub currency: String,
    pub expiry: Option<String>,
    /// Externally linked account (another bank), exempt from
    /// remote-confirmed removal during reconciliation.
    pub linked: bool,
    pub display_order: u32,
    pub hidden: bool,
    /// Soft-delete flag. Deleted accounts stay on disk so historical
    /// transactions keep a valid reference.
    pub deleted: bool,
    pub blocked: bool,
}

impl Account {
    pub fn new(id: AccountId, owner: OwnerId, number: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id,
            owner,
            number: number.into(),
            kind,
            balance: Balance::ZERO,
            currency: "KZT".to_string(),
            expiry: None,
            linked: false,
            display_order: 0,
            hidden: false,
            deleted: false,
            blocked: false,
        }
    }

    /// Last four digits of the canonical number, for transaction titles.
    pub fn last4(&self) -> String {
        let digits: String = self.number.chars().filter(|c| c.is_ascii_digit()).collect();
        let len = digits.len();
        digits[len.saturating_sub(4)..].to_string()
    }
}

/// Normalizes a canonical number for comparison: spaces and dashes are
/// formatting, not identity.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '-').collect()
}
