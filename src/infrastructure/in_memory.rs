use crate::domain::account::{Account, AccountId, OwnerId, normalize_number};
use crate::domain::money::Balance;
use crate::domain::ports::{AccountPatch, AccountStore, TransactionStore};
use crate::domain::transaction::{TransactionFilter, TransactionId, TransactionRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// A thread-safe in-memory account store.
///
/// Uses `Arc<RwLock<HashMap>>` for shared concurrent access. The default
/// backend for tests and for running without a database path.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<(OwnerId, AccountId), Account>>>,
    next_placeholder: Arc<AtomicI64>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn upsert(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert((account.owner, account.id), account);
        Ok(())
    }

    async fn get(&self, owner: OwnerId, id: AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&(owner, id)).cloned())
    }

    async fn get_by_number(&self, owner: OwnerId, number: &str) -> Result<Option<Account>> {
        let wanted = normalize_number(number);
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.owner == owner && !a.deleted && normalize_number(&a.number) == wanted)
            .cloned())
    }

    async fn accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut result: Vec<Account> = accounts
            .values()
            .filter(|a| a.owner == owner && !a.deleted)
            .cloned()
            .collect();
        result.sort_by_key(|a| (a.display_order, a.id));
        Ok(result)
    }

    async fn all_accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut result: Vec<Account> = accounts
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        result.sort_by_key(|a| (a.display_order, a.id));
        Ok(result)
    }

    async fn update_balance(
        &self,
        id: AccountId,
        owner: OwnerId,
        balance: Balance,
    ) -> Result<usize> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&(owner, id)) {
            Some(account) if !account.deleted => {
                account.balance = balance;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_by_number(
        &self,
        owner: OwnerId,
        number: &str,
        patch: AccountPatch,
    ) -> Result<usize> {
        let wanted = normalize_number(number);
        let mut accounts = self.accounts.write().await;
        let hit = accounts
            .values_mut()
            .find(|a| a.owner == owner && !a.deleted && normalize_number(&a.number) == wanted);
        match hit {
            Some(account) => {
                if let Some(balance) = patch.balance {
                    account.balance = balance;
                }
                if let Some(kind) = patch.kind {
                    account.kind = kind;
                }
                if let Some(currency) = patch.currency {
                    account.currency = currency;
                }
                if let Some(expiry) = patch.expiry {
                    account.expiry = expiry;
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn soft_delete(&self, id: AccountId, owner: OwnerId) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(&(owner, id)) {
            account.deleted = true;
        }
        Ok(())
    }

    async fn remove_by_number(&self, owner: OwnerId, number: &str) -> Result<()> {
        let wanted = normalize_number(number);
        let mut accounts = self.accounts.write().await;
        accounts
            .retain(|_, a| !(a.owner == owner && normalize_number(&a.number) == wanted));
        Ok(())
    }

    async fn next_placeholder_id(&self) -> Result<AccountId> {
        // Placeholder ids count down from -1 so they never collide with
        // authority-assigned ids.
        Ok(AccountId(self.next_placeholder.fetch_sub(1, Ordering::SeqCst) - 1))
    }
}

/// A thread-safe in-memory transaction store. Append-only; ids are assigned
/// sequentially on insert.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<Vec<TransactionRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, mut record: TransactionRecord) -> Result<TransactionId> {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        record.id = id;
        let mut records = self.records.write().await;
        records.push(record);
        Ok(id)
    }

    async fn get(&self, owner: OwnerId, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.owner == owner && r.id == id)
            .cloned())
    }

    async fn query(
        &self,
        owner: OwnerId,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().await;
        let mut result: Vec<TransactionRecord> = records
            .iter()
            .filter(|r| r.owner == owner && filter.matches(r))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}
