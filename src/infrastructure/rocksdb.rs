use crate::domain::account::{Account, AccountId, OwnerId, normalize_number};
use crate::domain::money::Balance;
use crate::domain::ports::{AccountPatch, AccountStore, TransactionStore};
use crate::domain::transaction::{TransactionFilter, TransactionId, TransactionRecord};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Column family for cached account records.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column family for the append-only transaction history.
pub const CF_TRANSACTIONS: &str = "transactions";

/// Persistent local cache backed by RocksDB.
///
/// Accounts are keyed by owner id + surrogate id (big-endian, so iteration
/// groups an owner's rows); transactions by their assigned id. Values are
/// serde_json, matching the in-memory entities. `Clone` shares the
/// underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    next_tx_id: Arc<AtomicI64>,
    next_placeholder: Arc<AtomicI64>,
}

impl RocksDbStore {
    /// Opens or creates the database, ensuring both column families exist
    /// and recovering the id counters from what is already on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_transactions])?;

        let store = Self {
            db: Arc::new(db),
            next_tx_id: Arc::new(AtomicI64::new(0)),
            next_placeholder: Arc::new(AtomicI64::new(0)),
        };
        store.recover_counters()?;
        Ok(store)
    }

    fn recover_counters(&self) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut max_tx = 0i64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let record: TransactionRecord = serde_json::from_slice(&value)?;
            max_tx = max_tx.max(record.id.0);
        }
        self.next_tx_id.store(max_tx, Ordering::SeqCst);

        let cf = self.cf(CF_ACCOUNTS)?;
        let mut min_placeholder = 0i64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let account: Account = serde_json::from_slice(&value)?;
            min_placeholder = min_placeholder.min(account.id.0);
        }
        self.next_placeholder.store(min_placeholder, Ordering::SeqCst);
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family {name} not found")))
    }

    fn account_key(owner: OwnerId, id: AccountId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&owner.0.to_be_bytes());
        key[8..].copy_from_slice(&id.0.to_be_bytes());
        key
    }

    fn scan_accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let account: Account = serde_json::from_slice(&value)?;
            if account.owner == owner {
                accounts.push(account);
            }
        }
        accounts.sort_by_key(|a| (a.display_order, a.id));
        Ok(accounts)
    }

    fn find_by_number(&self, owner: OwnerId, number: &str) -> Result<Option<Account>> {
        let wanted = normalize_number(number);
        Ok(self
            .scan_accounts(owner)?
            .into_iter()
            .find(|a| !a.deleted && normalize_number(&a.number) == wanted))
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let key = Self::account_key(account.owner, account.id);
        self.db.put_cf(&cf, key, serde_json::to_vec(account)?)?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for RocksDbStore {
    async fn upsert(&self, account: Account) -> Result<()> {
        self.put_account(&account)
    }

    async fn get(&self, owner: OwnerId, id: AccountId) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let key = Self::account_key(owner, id);
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_by_number(&self, owner: OwnerId, number: &str) -> Result<Option<Account>> {
        self.find_by_number(owner, number)
    }

    async fn accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        Ok(self
            .scan_accounts(owner)?
            .into_iter()
            .filter(|a| !a.deleted)
            .collect())
    }

    async fn all_accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        self.scan_accounts(owner)
    }

    async fn update_balance(
        &self,
        id: AccountId,
        owner: OwnerId,
        balance: Balance,
    ) -> Result<usize> {
        match self.get(owner, id).await? {
            Some(mut account) if !account.deleted => {
                account.balance = balance;
                self.put_account(&account)?;
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
        match self.find_by_number(owner, number)? {
            Some(mut account) => {
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
                self.put_account(&account)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn soft_delete(&self, id: AccountId, owner: OwnerId) -> Result<()> {
        if let Some(mut account) = self.get(owner, id).await? {
            account.deleted = true;
            self.put_account(&account)?;
        }
        Ok(())
    }

    async fn remove_by_number(&self, owner: OwnerId, number: &str) -> Result<()> {
        let wanted = normalize_number(number);
        let cf = self.cf(CF_ACCOUNTS)?;
        let victims: Vec<[u8; 16]> = self
            .scan_accounts(owner)?
            .into_iter()
            .filter(|a| normalize_number(&a.number) == wanted)
            .map(|a| Self::account_key(owner, a.id))
            .collect();
        for key in victims {
            self.db.delete_cf(&cf, key)?;
        }
        Ok(())
    }

    async fn next_placeholder_id(&self) -> Result<AccountId> {
        Ok(AccountId(
            self.next_placeholder.fetch_sub(1, Ordering::SeqCst) - 1,
        ))
    }
}

#[async_trait]
impl TransactionStore for RocksDbStore {
    async fn insert(&self, mut record: TransactionRecord) -> Result<TransactionId> {
        let id = TransactionId(self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1);
        record.id = id;
        let cf = self.cf(CF_TRANSACTIONS)?;
        self.db
            .put_cf(&cf, id.0.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(id)
    }

    async fn get(&self, owner: OwnerId, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(&cf, id.0.to_be_bytes())? {
            Some(bytes) => {
                let record: TransactionRecord = serde_json::from_slice(&bytes)?;
                Ok((record.owner == owner).then_some(record))
            }
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        owner: OwnerId,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let record: TransactionRecord = serde_json::from_slice(&value)?;
            if record.owner == owner && filter.matches(&record) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountKind;
    use crate::domain::transaction::TransactionKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn account(owner: i64, id: i64, number: &str) -> Account {
        Account::new(AccountId(id), OwnerId(owner), number, AccountKind::Debit)
    }

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("failed to open RocksDB");
        assert!(store.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(store.db.cf_handle(CF_TRANSACTIONS).is_some());
    }

    #[tokio::test]
    async fn test_account_roundtrip_and_scoping() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut a = account(1, 10, "4400 1100 0000 0001");
        a.balance = Balance::new(dec!(100.0));
        store.upsert(a.clone()).await.unwrap();

        let got = store.get(OwnerId(1), AccountId(10)).await.unwrap().unwrap();
        assert_eq!(got, a);
        assert!(store.get(OwnerId(2), AccountId(10)).await.unwrap().is_none());

        let by_number = store
            .get_by_number(OwnerId(1), "4400110000000001")
            .await
            .unwrap();
        assert!(by_number.is_some());
    }

    #[tokio::test]
    async fn test_update_balance_rows_affected() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store.upsert(account(1, 10, "1111")).await.unwrap();

        let rows = store
            .update_balance(AccountId(10), OwnerId(1), Balance::new(dec!(5.0)))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let rows = store
            .update_balance(AccountId(99), OwnerId(1), Balance::new(dec!(5.0)))
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_counters_recover_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let record = TransactionRecord {
                id: TransactionId(0),
                owner: OwnerId(1),
                account: AccountId(10),
                title: "Deposit".to_string(),
                amount: dec!(1.0),
                kind: TransactionKind::Deposit,
                timestamp: Utc::now(),
                from_account: None,
                to_account: None,
                category: None,
            };
            let first = store.insert(record.clone()).await.unwrap();
            assert_eq!(first, TransactionId(1));
            let placeholder = store.next_placeholder_id().await.unwrap();
            let mut linked = account(1, placeholder.0, "2222");
            linked.linked = true;
            store.upsert(linked).await.unwrap();
        }

        let store = RocksDbStore::open(dir.path()).unwrap();
        let record = TransactionRecord {
            id: TransactionId(0),
            owner: OwnerId(1),
            account: AccountId(10),
            title: "Deposit".to_string(),
            amount: dec!(1.0),
            kind: TransactionKind::Deposit,
            timestamp: Utc::now(),
            from_account: None,
            to_account: None,
            category: None,
        };
        let next = store.insert(record).await.unwrap();
        assert_eq!(next, TransactionId(2));
        let placeholder = store.next_placeholder_id().await.unwrap();
        assert_eq!(placeholder, AccountId(-2));
    }

    #[tokio::test]
    async fn test_transaction_query_filters_by_kind() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let deposit = TransactionRecord {
            id: TransactionId(0),
            owner: OwnerId(1),
            account: AccountId(10),
            title: "Deposit".to_string(),
            amount: dec!(50.0),
            kind: TransactionKind::Deposit,
            timestamp: Utc::now(),
            from_account: None,
            to_account: None,
            category: None,
        };
        let mut outgoing = deposit.clone();
        outgoing.title = "Transfer to card •••• 0002".to_string();
        outgoing.amount = dec!(-25.0);
        outgoing.kind = TransactionKind::TransferOut;

        store.insert(deposit).await.unwrap();
        store.insert(outgoing).await.unwrap();

        let all = store
            .query(OwnerId(1), TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let outgoing_only = store
            .query(
                OwnerId(1),
                TransactionFilter {
                    kind: Some(TransactionKind::TransferOut),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outgoing_only.len(), 1);
        assert_eq!(outgoing_only[0].amount, dec!(-25.0));
    }

    #[tokio::test]
    async fn test_soft_delete_and_remove() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store.upsert(account(1, 10, "1111")).await.unwrap();

        store.soft_delete(AccountId(10), OwnerId(1)).await.unwrap();
        assert!(store.accounts(OwnerId(1)).await.unwrap().is_empty());
        assert_eq!(store.all_accounts(OwnerId(1)).await.unwrap().len(), 1);

        store.remove_by_number(OwnerId(1), "1111").await.unwrap();
        assert!(store.all_accounts(OwnerId(1)).await.unwrap().is_empty());
    }
}
