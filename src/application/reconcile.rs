use crate::application::recency::RecencyGuard;
use crate::domain::account::{Account, OwnerId, normalize_number};
use crate::domain::ports::{AccountPatch, AccountStoreRef, RemoteAccount, RemoteLedgerRef};
use crate::error::{LedgerError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Merges the authoritative account list into the local cache.
///
/// Accounts are matched by canonical number, never by surrogate id: the id
/// is an authority-owned attribute that gets rebound when it drifts, while
/// local-only attributes (display order, hidden, soft-delete, linked)
/// survive the rebind. Balances written locally within the recency window
/// are left alone; everything else is refreshed from the authority.
///
/// The merge is per-account-atomic but not page-atomic: a failure aborts
/// the remaining merge and leaves already-applied updates in place. Running
/// it again converges.
pub struct ReconciliationEngine {
    accounts: AccountStoreRef,
    remote: RemoteLedgerRef,
    recency: Arc<RecencyGuard>,
}

impl ReconciliationEngine {
    pub fn new(
        accounts: AccountStoreRef,
        remote: RemoteLedgerRef,
        recency: Arc<RecencyGuard>,
    ) -> Self {
        Self {
            accounts,
            remote,
            recency,
        }
    }

    pub async fn reconcile(&self, owner: OwnerId) -> Result<()> {
        self.merge(owner).await.map_err(|err| match err {
            LedgerError::ReconciliationFailed(_) => err,
            other => LedgerError::ReconciliationFailed(other.to_string()),
        })
    }

    async fn merge(&self, owner: OwnerId) -> Result<()> {
        let authoritative = self.remote.list_accounts(owner).await?;
        let local = self.accounts.all_accounts(owner).await?;
        let guarded = self.recency.is_recently_mutated(owner);
        if guarded {
            tracing::debug!(owner = owner.0, "recency guard active, keeping local balances");
        }

        let mut next_order = local.iter().filter(|a| !a.deleted).count() as u32;

        for remote in &authoritative {
            let wanted = normalize_number(&remote.number);
            let existing = local
                .iter()
                .find(|a| normalize_number(&a.number) == wanted);

            match existing {
                // Local deletion intent wins; do not resurrect.
                Some(account) if account.deleted => {
                    tracing::debug!(owner = owner.0, number = %account.last4(), "skipping soft-deleted account");
                }
                Some(account) if account.id != remote.id => {
                    tracing::debug!(
                        owner = owner.0,
                        local_id = account.id.0,
                        authority_id = remote.id.0,
                        "re-keying drifted account"
                    );
                    self.rekey(owner, account, remote, guarded).await?;
                }
                Some(account) => {
                    let patch = AccountPatch {
                        balance: (!guarded).then_some(remote.balance),
                        kind: Some(remote.kind),
                        currency: Some(remote.currency.clone()),
                        expiry: Some(remote.expiry.clone()),
                    };
                    self.accounts
                        .update_by_number(owner, &account.number, patch)
                        .await?;
                }
                None => {
                    let mut account =
                        Account::new(remote.id, owner, remote.number.clone(), remote.kind);
                    account.balance = remote.balance;
                    account.currency = remote.currency.clone();
                    account.expiry = remote.expiry.clone();
                    account.display_order = next_order;
                    next_order += 1;
                    self.accounts.upsert(account).await?;
                }
            }
        }

        // Remote-confirmed removal: anything we cached that the authority no
        // longer reports is soft-deleted, unless it was linked independently.
        let known: HashSet<String> = authoritative
            .iter()
            .map(|a| normalize_number(&a.number))
            .collect();
        for account in &local {
            if !account.deleted
                && !account.linked
                && !known.contains(&normalize_number(&account.number))
            {
                tracing::debug!(owner = owner.0, number = %account.last4(), "soft-deleting removed account");
                self.accounts.soft_delete(account.id, owner).await?;
            }
        }

        Ok(())
    }

    /// Rebinds a local record to the authority's surrogate id, carrying the
    /// local-only attributes across.
    async fn rekey(
        &self,
        owner: OwnerId,
        local: &Account,
        remote: &RemoteAccount,
        guarded: bool,
    ) -> Result<()> {
        let balance = if guarded { local.balance } else { remote.balance };
        self.accounts.remove_by_number(owner, &local.number).await?;
        self.accounts
            .upsert(Account {
                id: remote.id,
                owner,
                number: remote.number.clone(),
                kind: remote.kind,
                balance,
                currency: remote.currency.clone(),
                expiry: remote.expiry.clone(),
                linked: local.linked,
                display_order: local.display_order,
                hidden: local.hidden,
                deleted: local.deleted,
                blocked: local.blocked,
            })
            .await
    }
}
