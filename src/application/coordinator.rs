use crate::application::recency::RecencyGuard;
use crate::application::reconcile::ReconciliationEngine;
use crate::domain::account::{Account, AccountId, AccountKind, OwnerId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{
    AccountPatch, AccountStoreRef, Destination, RemoteLedgerRef, TransactionStoreRef,
};
use crate::domain::transaction::{
    TransactionFilter, TransactionId, TransactionKind, TransactionRecord,
};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Progress of a single transfer, for logging and failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferPhase {
    Validating,
    CallingRemote,
    ApplyingLocal,
}

/// Outcome of a committed transfer or deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub new_balance: Balance,
    pub transaction_id: TransactionId,
}

/// Orchestrates a single fund movement: validates locally, calls the
/// authority at most once, applies the local mutation atomically with its
/// paired transaction records, marks the recency guard and kicks off a
/// background reconciliation.
///
/// Transfers for one owner are serialized through a per-owner async mutex,
/// so two concurrent transfers cannot jointly overdraw a source account:
/// the second one re-reads the balance under the lock and fails the
/// sufficiency check. The lock also spans the whole local commit, making
/// debit + credit + record inserts atomic with respect to other transfers.
pub struct TransferCoordinator {
    accounts: AccountStoreRef,
    transactions: TransactionStoreRef,
    remote: RemoteLedgerRef,
    recency: Arc<RecencyGuard>,
    reconciler: Arc<ReconciliationEngine>,
    owner_locks: Mutex<HashMap<OwnerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TransferCoordinator {
    pub fn new(
        accounts: AccountStoreRef,
        transactions: TransactionStoreRef,
        remote: RemoteLedgerRef,
        recency: Arc<RecencyGuard>,
        reconciler: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            remote,
            recency,
            reconciler,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    fn owner_lock(&self, owner: OwnerId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.owner_locks.lock().expect("owner lock map poisoned");
        locks.entry(owner).or_default().clone()
    }

    /// Executes an account-to-account transfer.
    ///
    /// The remote call is issued at most once. `NetworkUnavailable` means no
    /// local effect was applied; `PersistenceInconsistency` means the
    /// authority committed but the cache did not, and the next
    /// reconciliation heals it.
    pub async fn transfer(
        &self,
        owner: OwnerId,
        source: AccountId,
        destination: Destination,
        amount: Amount,
        description: Option<&str>,
    ) -> Result<TransferReceipt> {
        let lock = self.owner_lock(owner);
        let _serialized = lock.lock().await;

        let mut phase = TransferPhase::Validating;
        tracing::trace!(owner = owner.0, ?phase, "transfer started");

        // Balance read under the lock is the freshest local knowledge; no
        // other transfer for this owner can commit between here and ours.
        let src = self
            .accounts
            .get(owner, source)
            .await?
            .filter(|a| !a.deleted)
            .ok_or(LedgerError::AccountNotFound)?;
        if src.blocked {
            return Err(LedgerError::Validation(
                "source account is blocked".to_string(),
            ));
        }
        if !src.balance.covers(amount) {
            return Err(LedgerError::InsufficientFunds);
        }
        let dest_account = match &destination {
            Destination::Internal { number } => {
                let dest = self
                    .accounts
                    .get_by_number(owner, number)
                    .await?
                    .ok_or(LedgerError::AccountNotFound)?;
                if dest.id == src.id {
                    return Err(LedgerError::Validation(
                        "source and destination are the same account".to_string(),
                    ));
                }
                Some(dest)
            }
            _ => None,
        };

        phase = TransferPhase::CallingRemote;
        tracing::trace!(owner = owner.0, ?phase, "calling authority");
        let outcome = self
            .remote
            .transfer(src.id, &destination, amount, description)
            .await?;
        if !outcome.success {
            return Err(LedgerError::RemoteRejected(
                outcome.message.unwrap_or_else(|| "rejected".to_string()),
            ));
        }

        phase = TransferPhase::ApplyingLocal;
        tracing::trace!(owner = owner.0, ?phase, "applying local commit");
        let new_balance = outcome.new_balance.unwrap_or(src.balance - amount);
        let result = self
            .apply_transfer(owner, &src, dest_account.as_ref(), &destination, amount, new_balance)
            .await;

        match result {
            Ok(transaction_id) => {
                self.recency.record_mutation(owner);
                self.spawn_reconcile(owner);
                tracing::debug!(owner = owner.0, source = src.id.0, "transfer committed");
                Ok(TransferReceipt {
                    new_balance,
                    transaction_id,
                })
            }
            Err(err) => {
                debug_assert_eq!(phase, TransferPhase::ApplyingLocal);
                tracing::error!(
                    owner = owner.0,
                    source = src.id.0,
                    %err,
                    "remote transfer committed but local apply failed"
                );
                Err(LedgerError::PersistenceInconsistency(err.to_string()))
            }
        }
    }

    /// Deposits funds via the authority and mirrors the result locally.
    pub async fn deposit(
        &self,
        owner: OwnerId,
        account: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let lock = self.owner_lock(owner);
        let _serialized = lock.lock().await;

        let target = self
            .accounts
            .get(owner, account)
            .await?
            .filter(|a| !a.deleted)
            .ok_or(LedgerError::AccountNotFound)?;
        if target.blocked {
            return Err(LedgerError::Validation(
                "account is blocked".to_string(),
            ));
        }

        let outcome = self.remote.deposit(target.id, amount).await?;
        if !outcome.success {
            return Err(LedgerError::RemoteRejected(
                outcome.message.unwrap_or_else(|| "rejected".to_string()),
            ));
        }

        let new_balance = outcome.new_balance.unwrap_or(target.balance + amount);
        let apply = async {
            self.set_balance_with_drift_retry(&target, new_balance).await?;
            self.transactions
                .insert(TransactionRecord {
                    id: TransactionId(0),
                    owner,
                    account: target.id,
                    title: format!("Deposit to card •••• {}", target.last4()),
                    amount: amount.value(),
                    kind: TransactionKind::Deposit,
                    timestamp: Utc::now(),
                    from_account: None,
                    to_account: Some(target.id),
                    category: None,
                })
                .await
        };

        match apply.await {
            Ok(transaction_id) => {
                self.recency.record_mutation(owner);
                self.spawn_reconcile(owner);
                Ok(TransferReceipt {
                    new_balance,
                    transaction_id,
                })
            }
            Err(err) => {
                tracing::error!(owner = owner.0, account = target.id.0, %err, "deposit applied remotely but not locally");
                Err(LedgerError::PersistenceInconsistency(err.to_string()))
            }
        }
    }

    /// Registers an account held at another institution. Local-only: the
    /// authority never lists it, and reconciliation never sweeps it.
    pub async fn link_external_account(
        &self,
        owner: OwnerId,
        number: &str,
        expiry: Option<&str>,
    ) -> Result<Account> {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 16 {
            return Err(LedgerError::Validation(
                "card number must have 16 digits".to_string(),
            ));
        }
        if self.accounts.get_by_number(owner, number).await?.is_some() {
            return Err(LedgerError::Validation(
                "an account with this number already exists".to_string(),
            ));
        }

        let id = self.accounts.next_placeholder_id().await?;
        let mut account = Account::new(id, owner, number, AccountKind::Debit);
        account.linked = true;
        account.expiry = expiry.map(str::to_string);
        account.display_order = self.accounts.accounts(owner).await?.len() as u32;
        self.accounts.upsert(account.clone()).await?;
        Ok(account)
    }

    /// Non-deleted accounts for the owner, in display order.
    pub async fn accounts(&self, owner: OwnerId) -> Result<Vec<Account>> {
        self.accounts.accounts(owner).await
    }

    /// Transaction history, newest first.
    pub async fn transactions(
        &self,
        owner: OwnerId,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRecord>> {
        self.transactions.query(owner, filter).await
    }

    async fn apply_transfer(
        &self,
        owner: OwnerId,
        src: &Account,
        dest: Option<&Account>,
        destination: &Destination,
        amount: Amount,
        new_src_balance: Balance,
    ) -> Result<TransactionId> {
        self.set_balance_with_drift_retry(src, new_src_balance).await?;

        let now = Utc::now();
        let out_id = self
            .transactions
            .insert(TransactionRecord {
                id: TransactionId(0),
                owner,
                account: src.id,
                title: format!("Transfer to {destination}"),
                amount: -amount.value(),
                kind: TransactionKind::TransferOut,
                timestamp: now,
                from_account: Some(src.id),
                to_account: dest.map(|d| d.id),
                category: None,
            })
            .await?;

        if let Some(dest) = dest {
            self.set_balance_with_drift_retry(dest, dest.balance + amount)
                .await?;
            self.transactions
                .insert(TransactionRecord {
                    id: TransactionId(0),
                    owner,
                    account: dest.id,
                    title: format!("Transfer from card •••• {}", src.last4()),
                    amount: amount.value(),
                    kind: TransactionKind::TransferIn,
                    timestamp: now,
                    from_account: Some(src.id),
                    to_account: Some(dest.id),
                    category: None,
                })
                .await?;
        }

        Ok(out_id)
    }

    /// Writes a balance scoped by (id, owner); zero rows affected means the
    /// surrogate id drifted under us, so retry by the natural key.
    async fn set_balance_with_drift_retry(
        &self,
        account: &Account,
        balance: Balance,
    ) -> Result<()> {
        let rows = self
            .accounts
            .update_balance(account.id, account.owner, balance)
            .await?;
        if rows > 0 {
            return Ok(());
        }
        tracing::debug!(
            owner = account.owner.0,
            id = account.id.0,
            "balance update missed by id, retrying by number"
        );
        let rows = self
            .accounts
            .update_by_number(
                account.owner,
                &account.number,
                AccountPatch {
                    balance: Some(balance),
                    ..Default::default()
                },
            )
            .await?;
        if rows == 0 {
            return Err(LedgerError::Storage(format!(
                "account {} vanished during balance update",
                account.last4()
            )));
        }
        Ok(())
    }

    fn spawn_reconcile(&self, owner: OwnerId) {
        let reconciler = self.reconciler.clone();
        tokio::spawn(async move {
            if let Err(err) = reconciler.reconcile(owner).await {
                tracing::warn!(owner = owner.0, %err, "background reconciliation failed");
            }
        });
    }
}
