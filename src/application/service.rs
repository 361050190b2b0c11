use std::collections::BTreeSet;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AccountRecord, Address, Amount, Balance, IntegrityReport, Ledger, LedgerError, LedgerEvent,
    Operation, Submission, DEFAULT_TOTAL_SUPPLY,
};
use crate::storage::{Commit, EventFilter, LedgerMeta, Repository, StoredEvent, WriteTx};

use super::AppError;

/// Parameters for creating a ledger.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    /// Receives the whole supply and is the only identity allowed to administer.
    pub owner: Address,
    pub total_supply: Amount,
}

impl GenesisConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            total_supply: DEFAULT_TOTAL_SUPPLY,
        }
    }

    pub fn with_total_supply(mut self, total_supply: Amount) -> Self {
        self.total_supply = total_supply;
        self
    }
}

/// Result of a committed operation
#[derive(Debug, Clone)]
pub struct Receipt {
    pub operation_id: Uuid,
    /// Notifications in emission order, as appended to the log.
    pub events: Vec<StoredEvent>,
}

impl Receipt {
    pub fn notifications(&self) -> Vec<LedgerEvent> {
        self.events.iter().map(|e| e.event.clone()).collect()
    }
}

/// One account as presented to clients
#[derive(Debug, Clone)]
pub struct AccountView {
    pub address: Address,
    pub record: AccountRecord,
    pub spendable: Balance,
}

impl AccountView {
    fn new(address: Address, record: &AccountRecord) -> Self {
        Self {
            address,
            spendable: record.spendable(),
            record: record.clone(),
        }
    }
}

/// The in-memory ledger and the last logged sequence it reflects.
struct Cached {
    ledger: Ledger,
    last_sequence: i64,
}

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, batch files, tests).
///
/// Operations are serialized twice: by a lock inside the handle and by the
/// database write lock across handles and processes. A handle that finds the
/// log moved on since it last looked reloads before applying anything.
/// Queries read the handle's cache as of its last write or [`refresh`].
///
/// [`refresh`]: LedgerService::refresh
pub struct LedgerService {
    repo: Repository,
    state: Mutex<Cached>,
}

impl LedgerService {
    /// Create a new database at the given path and run genesis.
    pub async fn init(database_path: &str, genesis: &GenesisConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;

        if let Some(meta) = repo.get_meta().await? {
            return Err(AppError::AlreadyInitialized(meta.owner.to_string()));
        }

        let ledger = Ledger::genesis(genesis.owner, genesis.total_supply)?;
        let records: Vec<(Address, AccountRecord)> = ledger
            .accounts()
            .map(|(address, record)| (*address, record.clone()))
            .collect();

        let meta = LedgerMeta {
            owner: genesis.owner,
            total_supply: genesis.total_supply,
            created_at: Utc::now(),
        };
        repo.save_genesis(&meta, &records).await?;

        info!(
            owner = %genesis.owner,
            total_supply = genesis.total_supply,
            database = database_path,
            "ledger created"
        );

        Ok(Self {
            repo,
            state: Mutex::new(Cached {
                ledger,
                last_sequence: 0,
            }),
        })
    }

    /// Connect to an existing database and load the ledger into memory.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        // Idempotent; an empty file then reads as uninitialized.
        repo.migrate().await?;

        let meta = repo.get_meta().await?.ok_or(AppError::NotInitialized)?;
        let (accounts, last_sequence) = repo.load_state().await?;
        debug!(accounts = accounts.len(), last_sequence, "loaded account records");

        let ledger = rebuild(meta.owner, meta.total_supply, accounts)?;

        Ok(Self {
            repo,
            state: Mutex::new(Cached {
                ledger,
                last_sequence,
            }),
        })
    }

    /// Reload from the database if another handle has written since this one
    /// last looked. Returns whether a reload happened.
    pub async fn refresh(&self) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if self.repo.last_sequence().await? == state.last_sequence {
            return Ok(false);
        }

        let (accounts, last_sequence) = self.repo.load_state().await?;
        let (owner, total_supply) = (state.ledger.owner(), state.ledger.total_supply());
        state.ledger = rebuild(owner, total_supply, accounts)?;
        state.last_sequence = last_sequence;
        debug!(last_sequence, "reloaded ledger written by another handle");
        Ok(true)
    }

    // ========================
    // Queries
    // ========================

    pub async fn owner(&self) -> Address {
        self.state.lock().await.ledger.owner()
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.lock().await.ledger.total_supply()
    }

    pub async fn spendable_balance(&self, account: &Address) -> Balance {
        self.state.lock().await.ledger.spendable_balance(account)
    }

    pub async fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.state.lock().await.ledger.allowance(owner, spender)
    }

    /// Full view of one account; default values if it was never touched.
    pub async fn get_account(&self, account: &Address) -> AccountView {
        let state = self.state.lock().await;
        AccountView::new(*account, state.ledger.account(account))
    }

    /// Every account that differs from the default, ordered by address.
    pub async fn list_accounts(&self) -> Vec<AccountView> {
        let state = self.state.lock().await;
        state
            .ledger
            .accounts()
            .map(|(address, record)| AccountView::new(*address, record))
            .collect()
    }

    /// Audit the in-memory ledger against its invariants.
    pub async fn check_integrity(&self) -> IntegrityReport {
        self.state.lock().await.ledger.audit()
    }

    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, AppError> {
        Ok(self.repo.list_events(filter).await?)
    }

    pub async fn count_events(&self) -> Result<i64, AppError> {
        Ok(self.repo.count_events().await?)
    }

    // ========================
    // Operations
    // ========================

    /// Apply one operation for `caller` and persist it.
    ///
    /// The operation runs against a staged copy while the database write
    /// lock is held; the copy replaces the cache only after its records and
    /// notifications are committed.
    pub async fn submit(&self, caller: Address, operation: Operation) -> Result<Receipt, AppError> {
        let mut state = self.state.lock().await;
        let mut tx = self.repo.begin_write().await?;

        match self.stage(&mut tx, &state, caller, &operation).await {
            Ok((staged, receipt)) => {
                tx.commit().await?;
                *state = staged;

                info!(
                    operation = operation.name(),
                    caller = %caller,
                    operation_id = %receipt.operation_id,
                    events = receipt.events.len(),
                    "operation committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    async fn stage(
        &self,
        tx: &mut WriteTx,
        cached: &Cached,
        caller: Address,
        operation: &Operation,
    ) -> Result<(Cached, Receipt), AppError> {
        let last_sequence = tx.last_sequence().await?;
        let mut staged = if last_sequence == cached.last_sequence {
            cached.ledger.clone()
        } else {
            debug!(
                cached = cached.last_sequence,
                stored = last_sequence,
                "log moved on, reloading before applying"
            );
            let accounts = tx.load_accounts().await?;
            rebuild(cached.ledger.owner(), cached.ledger.total_supply(), accounts)?
        };

        let events = match staged.apply(caller, operation) {
            Ok(events) => events,
            Err(err) => {
                warn!(
                    operation = operation.name(),
                    administrative = operation.is_administrative(),
                    caller = %caller,
                    kind = ?err.kind(),
                    "operation rejected: {}",
                    err
                );
                return Err(err.into());
            }
        };

        let touched: BTreeSet<Address> = events
            .iter()
            .flat_map(LedgerEvent::touched_accounts)
            .collect();
        let records: Vec<(Address, AccountRecord)> = touched
            .into_iter()
            .map(|address| (address, staged.account(&address).clone()))
            .collect();

        let operation_id = Uuid::new_v4();
        let stored = tx
            .write(Commit {
                operation_id,
                operation: operation.name(),
                caller,
                records: &records,
                events: &events,
                recorded_at: Utc::now(),
            })
            .await?;

        let last_sequence = stored.last().map_or(last_sequence, |e| e.sequence);
        Ok((
            Cached {
                ledger: staged,
                last_sequence,
            },
            Receipt {
                operation_id,
                events: stored,
            },
        ))
    }

    /// Run submissions in order against a scratch copy. Nothing is persisted
    /// and the cache is untouched. Unless `keep_going`, the run ends with the
    /// first rejection.
    pub async fn preview(
        &self,
        submissions: &[Submission],
        keep_going: bool,
    ) -> Vec<Result<Vec<LedgerEvent>, LedgerError>> {
        let mut scratch = self.state.lock().await.ledger.clone();
        let mut outcomes = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let outcome = scratch.apply(submission.caller, &submission.operation);
            let rejected = outcome.is_err();
            outcomes.push(outcome);
            if rejected && !keep_going {
                break;
            }
        }
        outcomes
    }

    pub async fn transfer(
        &self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::Transfer { to, amount }).await
    }

    pub async fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::TransferFrom { from, to, amount })
            .await
    }

    pub async fn approve(
        &self,
        caller: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::Approve { spender, amount })
            .await
    }

    pub async fn increase_approval(
        &self,
        caller: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::IncreaseApproval { spender, delta })
            .await
    }

    pub async fn decrease_approval(
        &self,
        caller: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::DecreaseApproval { spender, delta })
            .await
    }

    pub async fn edit_overdraft(
        &self,
        caller: Address,
        account: Address,
        new_limit: Amount,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::EditOverdraft { account, new_limit })
            .await
    }

    pub async fn pause_transfer(&self, caller: Address, account: Address) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::PauseTransfer { account }).await
    }

    pub async fn unpause_transfer(
        &self,
        caller: Address,
        account: Address,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::UnpauseTransfer { account })
            .await
    }

    pub async fn pause_receive(&self, caller: Address, account: Address) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::PauseReceive { account }).await
    }

    pub async fn unpause_receive(
        &self,
        caller: Address,
        account: Address,
    ) -> Result<Receipt, AppError> {
        self.submit(caller, Operation::UnpauseReceive { account })
            .await
    }
}

/// Rebuild a ledger from stored records, refusing state that breaks an invariant.
fn rebuild(
    owner: Address,
    total_supply: Amount,
    accounts: Vec<(Address, AccountRecord)>,
) -> Result<Ledger, AppError> {
    Ledger::from_parts(owner, total_supply, accounts).map_err(|issues| {
        AppError::CorruptState(
            issues
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}
