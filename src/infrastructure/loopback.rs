use crate::domain::account::{AccountId, AccountKind, OwnerId, normalize_number};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{Destination, RemoteAccount, RemoteLedger, RemoteTransferOutcome};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct AuthorityAccount {
    owner: OwnerId,
    account: RemoteAccount,
}

#[derive(Default)]
struct AuthorityState {
    accounts: HashMap<AccountId, AuthorityAccount>,
    next_id: i64,
    next_tx: i64,
    offline: bool,
    reject_next: Option<String>,
}

/// In-process stand-in for the remote ledger authority.
///
/// Backs the CLI and the test suites: it executes transfers and deposits
/// against its own authoritative balances and serves the account list that
/// reconciliation merges. Fault injection covers the offline and rejection
/// paths.
#[derive(Clone, Default)]
pub struct LoopbackAuthority {
    state: Arc<RwLock<AuthorityState>>,
}

impl LoopbackAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions an account on the authority and returns its id.
    pub async fn open_account(
        &self,
        owner: OwnerId,
        number: &str,
        kind: AccountKind,
        opening: Balance,
        currency: &str,
    ) -> AccountId {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = AccountId(state.next_id);
        state.accounts.insert(
            id,
            AuthorityAccount {
                owner,
                account: RemoteAccount {
                    id,
                    number: number.to_string(),
                    kind,
                    balance: opening,
                    currency: currency.to_string(),
                    expiry: Some("12/30".to_string()),
                },
            },
        );
        id
    }

    /// Simulates losing or regaining connectivity.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Makes the next transfer or deposit fail with a business-rule
    /// rejection instead of executing.
    pub async fn reject_next(&self, reason: &str) {
        self.state.write().await.reject_next = Some(reason.to_string());
    }

    /// Overrides an authoritative balance, simulating activity the cache
    /// has not seen yet.
    pub async fn set_balance(&self, id: AccountId, balance: Balance) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.accounts.get_mut(&id) {
            entry.account.balance = balance;
        }
    }

    /// Closes an account on the authority side; the next reconciliation
    /// observes its absence.
    pub async fn close_account(&self, id: AccountId) {
        self.state.write().await.accounts.remove(&id);
    }

    /// Moves an account to a new surrogate id, keeping number and balance.
    /// Reproduces the identity drift the reconciler has to resolve.
    pub async fn reassign_id(&self, old: AccountId, new: AccountId) {
        let mut state = self.state.write().await;
        if let Some(mut entry) = state.accounts.remove(&old) {
            entry.account.id = new;
            state.accounts.insert(new, entry);
        }
    }

    pub async fn balance_of(&self, id: AccountId) -> Option<Balance> {
        let state = self.state.read().await;
        state.accounts.get(&id).map(|e| e.account.balance)
    }

    fn outcome(new_balance: Balance, tx_id: i64) -> RemoteTransferOutcome {
        RemoteTransferOutcome {
            success: true,
            new_balance: Some(new_balance),
            transaction_id: Some(tx_id),
            message: None,
        }
    }

    fn rejection(message: &str) -> RemoteTransferOutcome {
        RemoteTransferOutcome {
            success: false,
            new_balance: None,
            transaction_id: None,
            message: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl RemoteLedger for LoopbackAuthority {
    async fn list_accounts(&self, owner: OwnerId) -> Result<Vec<RemoteAccount>> {
        let state = self.state.read().await;
        if state.offline {
            return Err(LedgerError::NetworkUnavailable(
                "authority offline".to_string(),
            ));
        }
        let mut accounts: Vec<RemoteAccount> = state
            .accounts
            .values()
            .filter(|e| e.owner == owner)
            .map(|e| e.account.clone())
            .collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn transfer(
        &self,
        source: AccountId,
        destination: &Destination,
        amount: Amount,
        _description: Option<&str>,
    ) -> Result<RemoteTransferOutcome> {
        let mut state = self.state.write().await;
        if state.offline {
            return Err(LedgerError::NetworkUnavailable(
                "authority offline".to_string(),
            ));
        }
        if let Some(reason) = state.reject_next.take() {
            return Ok(Self::rejection(&reason));
        }

        let Some(entry) = state.accounts.get(&source) else {
            return Ok(Self::rejection("unknown source account"));
        };
        if !entry.account.balance.covers(amount) {
            return Ok(Self::rejection("insufficient funds"));
        }

        // Credit side first, so the immutable borrow of the source entry is
        // released before mutation.
        let credit_target = match destination {
            Destination::Internal { number } | Destination::OtherBank { number } => {
                let wanted = normalize_number(number);
                state
                    .accounts
                    .values()
                    .find(|e| normalize_number(&e.account.number) == wanted)
                    .map(|e| e.account.id)
            }
            Destination::Phone { .. } | Destination::International { .. } => None,
        };

        let debit = state
            .accounts
            .get_mut(&source)
            .expect("source checked above");
        debit.account.balance -= amount.into();
        let new_balance = debit.account.balance;

        if let Some(target) = credit_target
            && target != source
            && let Some(credit) = state.accounts.get_mut(&target)
        {
            credit.account.balance += amount.into();
        }

        state.next_tx += 1;
        Ok(Self::outcome(new_balance, state.next_tx))
    }

    async fn deposit(&self, account: AccountId, amount: Amount) -> Result<RemoteTransferOutcome> {
        let mut state = self.state.write().await;
        if state.offline {
            return Err(LedgerError::NetworkUnavailable(
                "authority offline".to_string(),
            ));
        }
        if let Some(reason) = state.reject_next.take() {
            return Ok(Self::rejection(&reason));
        }
        let Some(entry) = state.accounts.get_mut(&account) else {
            return Ok(Self::rejection("unknown account"));
        };
        entry.account.balance += amount.into();
        let new_balance = entry.account.balance;
        state.next_tx += 1;
        Ok(Self::outcome(new_balance, state.next_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_open_and_list() {
        let authority = LoopbackAuthority::new();
        let id = authority
            .open_account(
                OwnerId(1),
                "4400 1100 0000 0001",
                AccountKind::Debit,
                Balance::new(dec!(100.0)),
                "KZT",
            )
            .await;

        let accounts = authority.list_accounts(OwnerId(1)).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, id);
        assert_eq!(accounts[0].balance, Balance::new(dec!(100.0)));

        assert!(authority.list_accounts(OwnerId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_moves_authoritative_funds() {
        let authority = LoopbackAuthority::new();
        let src = authority
            .open_account(
                OwnerId(1),
                "1111",
                AccountKind::Debit,
                Balance::new(dec!(100.0)),
                "KZT",
            )
            .await;
        let dst = authority
            .open_account(
                OwnerId(1),
                "2222",
                AccountKind::Debit,
                Balance::new(dec!(10.0)),
                "KZT",
            )
            .await;

        let outcome = authority
            .transfer(
                src,
                &Destination::Internal {
                    number: "2222".to_string(),
                },
                Amount::new(dec!(40.0)).unwrap(),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.new_balance, Some(Balance::new(dec!(60.0))));
        assert_eq!(authority.balance_of(dst).await, Some(Balance::new(dec!(50.0))));
    }

    #[tokio::test]
    async fn test_offline_and_rejection() {
        let authority = LoopbackAuthority::new();
        let src = authority
            .open_account(
                OwnerId(1),
                "1111",
                AccountKind::Debit,
                Balance::new(dec!(100.0)),
                "KZT",
            )
            .await;

        authority.set_offline(true).await;
        let err = authority.list_accounts(OwnerId(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NetworkUnavailable(_)));
        authority.set_offline(false).await;

        authority.reject_next("daily limit exceeded").await;
        let outcome = authority
            .transfer(
                src,
                &Destination::Phone {
                    number: "+77010000000".to_string(),
                },
                Amount::new(dec!(1.0)).unwrap(),
                None,
            )
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("daily limit exceeded"));
        // Rejection is consumed; the balance is untouched.
        assert_eq!(
            authority.balance_of(src).await,
            Some(Balance::new(dec!(100.0)))
        );
    }
}
