use ledgerlink::application::coordinator::TransferCoordinator;
use ledgerlink::application::recency::RecencyGuard;
use ledgerlink::application::reconcile::ReconciliationEngine;
use ledgerlink::domain::account::{AccountId, AccountKind, OwnerId};
use ledgerlink::domain::money::Balance;
use ledgerlink::domain::ports::RemoteLedgerRef;
use ledgerlink::infrastructure::in_memory::{InMemoryAccountStore, InMemoryTransactionStore};
use ledgerlink::infrastructure::loopback::LoopbackAuthority;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Full in-memory ledger wired against a loopback authority. History is
/// queried through `coordinator.transactions`, so the transaction store is
/// not exposed.
pub struct TestLedger {
    pub authority: LoopbackAuthority,
    pub accounts: Arc<InMemoryAccountStore>,
    pub coordinator: Arc<TransferCoordinator>,
    pub reconciler: Arc<ReconciliationEngine>,
}

impl TestLedger {
    pub fn new(grace: Duration) -> Self {
        let authority = LoopbackAuthority::new();
        let accounts = Arc::new(InMemoryAccountStore::new());
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let remote: RemoteLedgerRef = Arc::new(authority.clone());
        let recency = Arc::new(RecencyGuard::new(grace));
        let reconciler = Arc::new(ReconciliationEngine::new(
            accounts.clone(),
            remote.clone(),
            recency.clone(),
        ));
        let coordinator = Arc::new(TransferCoordinator::new(
            accounts.clone(),
            transactions,
            remote,
            recency,
            reconciler.clone(),
        ));
        Self {
            authority,
            accounts,
            coordinator,
            reconciler,
        }
    }

    /// Opens an account on the authority and reconciles it into the cache.
    pub async fn provision(&self, owner: i64, number: &str, balance: Decimal) -> AccountId {
        let id = self
            .authority
            .open_account(
                OwnerId(owner),
                number,
                AccountKind::Debit,
                Balance::new(balance),
                "KZT",
            )
            .await;
        self.reconciler
            .reconcile(OwnerId(owner))
            .await
            .expect("provisioning reconcile failed");
        id
    }

    pub async fn local_balance(&self, owner: i64, id: AccountId) -> Balance {
        use ledgerlink::domain::ports::AccountStore;
        self.accounts
            .get(OwnerId(owner), id)
            .await
            .unwrap()
            .expect("account not cached")
            .balance
    }
}
