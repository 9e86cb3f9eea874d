use clap::Parser;
use ledgerlink::application::coordinator::TransferCoordinator;
use ledgerlink::application::recency::RecencyGuard;
use ledgerlink::application::reconcile::ReconciliationEngine;
use ledgerlink::domain::account::OwnerId;
use ledgerlink::domain::ports::{AccountStoreRef, Destination, TransactionStoreRef};
use ledgerlink::error::LedgerError;
use ledgerlink::infrastructure::in_memory::{InMemoryAccountStore, InMemoryTransactionStore};
use ledgerlink::infrastructure::loopback::LoopbackAuthority;
use ledgerlink::interfaces::csv::account_writer::AccountWriter;
use ledgerlink::interfaces::csv::command_reader::{Command, CommandReader, TransferTarget};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Seconds a locally written balance is protected from reconciliation
    #[arg(long, default_value_t = 300)]
    grace_secs: u64,
}

struct App {
    authority: LoopbackAuthority,
    coordinator: TransferCoordinator,
    reconciler: Arc<ReconciliationEngine>,
    accounts: AccountStoreRef,
}

impl App {
    fn new(accounts: AccountStoreRef, transactions: TransactionStoreRef, grace: Duration) -> Self {
        let authority = LoopbackAuthority::new();
        let recency = Arc::new(RecencyGuard::new(grace));
        let reconciler = Arc::new(ReconciliationEngine::new(
            accounts.clone(),
            Arc::new(authority.clone()),
            recency.clone(),
        ));
        let coordinator = TransferCoordinator::new(
            accounts.clone(),
            transactions,
            Arc::new(authority.clone()),
            recency,
            reconciler.clone(),
        );
        Self {
            authority,
            coordinator,
            reconciler,
            accounts,
        }
    }

    async fn execute(&self, command: Command) -> ledgerlink::error::Result<()> {
        match command {
            Command::Provision {
                owner,
                number,
                kind,
                opening,
                currency,
            } => {
                self.authority
                    .open_account(owner, &number, kind, opening, &currency)
                    .await;
                self.reconciler.reconcile(owner).await
            }
            Command::Link { owner, number } => {
                self.coordinator
                    .link_external_account(owner, &number, None)
                    .await?;
                Ok(())
            }
            Command::Deposit {
                owner,
                number,
                amount,
            } => {
                let account = self.resolve(owner, &number).await?;
                self.coordinator.deposit(owner, account, amount).await?;
                Ok(())
            }
            Command::Transfer {
                owner,
                number,
                amount,
                target,
            } => {
                let source = self.resolve(owner, &number).await?;
                let destination = match target {
                    TransferTarget::Card(number) => {
                        // A card we hold locally is an internal move; anything
                        // else goes out to another bank.
                        if self.accounts.get_by_number(owner, &number).await?.is_some() {
                            Destination::Internal { number }
                        } else {
                            Destination::OtherBank { number }
                        }
                    }
                    TransferTarget::Phone(number) => Destination::Phone { number },
                    TransferTarget::International { recipient, country } => {
                        Destination::International { recipient, country }
                    }
                };
                self.coordinator
                    .transfer(owner, source, destination, amount, None)
                    .await?;
                Ok(())
            }
            Command::Reconcile { owner } => self.reconciler.reconcile(owner).await,
        }
    }

    async fn resolve(
        &self,
        owner: OwnerId,
        number: &str,
    ) -> ledgerlink::error::Result<ledgerlink::domain::account::AccountId> {
        self.accounts
            .get_by_number(owner, number)
            .await?
            .map(|a| a.id)
            .ok_or(LedgerError::AccountNotFound)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let grace = Duration::from_secs(cli.grace_secs);

    #[cfg(feature = "storage-rocksdb")]
    let app = if let Some(db_path) = &cli.db_path {
        let store = ledgerlink::infrastructure::rocksdb::RocksDbStore::open(db_path)
            .into_diagnostic()?;
        App::new(Arc::new(store.clone()), Arc::new(store), grace)
    } else {
        App::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
            grace,
        )
    };
    #[cfg(not(feature = "storage-rocksdb"))]
    let app = App::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryTransactionStore::new()),
        grace,
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let mut owners: BTreeSet<i64> = BTreeSet::new();
    for result in reader.commands() {
        match result {
            Ok(command) => {
                owners.insert(command.owner().0);
                if let Err(e) = app.execute(command).await {
                    eprintln!("Error executing command: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {e}");
            }
        }
    }

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    for owner in owners {
        let accounts = app
            .coordinator
            .accounts(OwnerId(owner))
            .await
            .into_diagnostic()?;
        writer.write_accounts(&accounts).into_diagnostic()?;
    }

    Ok(())
}
