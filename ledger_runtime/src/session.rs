//! Ledger session: a store, its change journal and the engine config.
//!
//! Submission order for every change:
//!   1. write or remove the transaction document
//!   2. append the notification to the journal (fsynced)
//!   3. fire the change handlers, which log and swallow their failures
//!
//! A create for an ID that is already stored must repeat the stored body.
//! If the append fails the document is put back as it was, so nothing
//! unjournaled stays visible.
//!
//! Opening a session replays any existing journal into its store.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use ledger_kernel::domain::Transaction;
use ledger_kernel::events::{ChangeKind, ChangeNotification};

use crate::config::EngineConfig;
use crate::documents;
use crate::error::ServiceError;
use crate::handlers::{on_transaction_created, on_transaction_deleted};
use crate::journal::Journal;
use crate::replay::{check_resubmission, replay_into, state_fingerprint};
use crate::service::LedgerService;
use crate::store::{load, remove, save, DocKey, DocumentStore, MemoryStore};

pub struct LedgerSession<S: DocumentStore = MemoryStore> {
    store: Arc<S>,
    journal: Journal,
    config: EngineConfig,
}

impl<S: DocumentStore> LedgerSession<S> {
    /// Open the journal at `journal_path` and replay it into `store`.
    pub fn open(store: Arc<S>, config: EngineConfig, journal_path: &Path) -> Result<Self, ServiceError> {
        let journal = Journal::open(journal_path)?;
        let existing = journal.load_all()?;
        if !existing.is_empty() {
            replay_into(store.as_ref(), &existing, &config)?;
            info!(
                journal = %journal_path.display(),
                replayed = existing.len(),
                last_sequence = journal.last_sequence(),
                "Journal replayed"
            );
        }
        Ok(Self { store, journal, config })
    }

    /// Record a new transaction and run the create handlers.
    pub fn submit_created(&mut self, tx: Transaction) -> Result<u64, ServiceError> {
        let notification = ChangeNotification::created(self.journal.next_sequence(), tx);
        self.submit(&notification)
    }

    /// Delete a stored transaction and run the delete handlers with its
    /// last snapshot.
    pub fn submit_deleted(&mut self, organization_id: &str, transaction_id: &str) -> Result<u64, ServiceError> {
        let tx: Transaction = load(self.store.as_ref(), &documents::transaction(organization_id, transaction_id))?
            .ok_or_else(|| ServiceError::NotFound(format!("transaction {transaction_id}")))?;
        let notification = ChangeNotification::deleted(self.journal.next_sequence(), tx);
        self.submit(&notification)
    }

    fn submit(&mut self, notification: &ChangeNotification) -> Result<u64, ServiceError> {
        let tx = &notification.transaction;
        let key = documents::transaction(&tx.organization_id, &tx.id);
        let previous: Option<Transaction> = load(self.store.as_ref(), &key)?;
        match notification.kind {
            ChangeKind::Created => {
                check_resubmission(previous.as_ref(), tx)?;
                save(self.store.as_ref(), key.clone(), tx)?;
            }
            ChangeKind::Deleted => remove(self.store.as_ref(), key.clone())?,
        }
        if let Err(e) = self.journal.append(notification) {
            self.restore(key, previous.as_ref());
            return Err(e.into());
        }
        run_handlers(self.store.as_ref(), &self.config, notification);
        Ok(notification.sequence)
    }

    fn restore(&self, key: DocKey, previous: Option<&Transaction>) {
        let restored = match previous {
            Some(tx) => save(self.store.as_ref(), key.clone(), tx),
            None => remove(self.store.as_ref(), key.clone()),
        };
        if let Err(e) = restored {
            error!(document = %key, error = %e, "Transaction document not restored after journal failure");
        }
    }

    pub fn service(&self) -> LedgerService<S> {
        LedgerService::new(Arc::clone(&self.store), self.config.clone())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn last_sequence(&self) -> u64 {
        self.journal.last_sequence()
    }

    pub fn notifications(&self) -> Result<Vec<ChangeNotification>, ServiceError> {
        Ok(self.journal.load_all()?)
    }
}

impl LedgerSession<MemoryStore> {
    pub fn fingerprint(&self) -> Result<String, ServiceError> {
        state_fingerprint(&self.store)
    }
}

fn run_handlers<S: DocumentStore + ?Sized>(store: &S, config: &EngineConfig, notification: &ChangeNotification) {
    let tx = &notification.transaction;
    match notification.kind {
        ChangeKind::Created => on_transaction_created(store, config, tx),
        ChangeKind::Deleted => on_transaction_deleted(store, config, tx),
    }
}

/// Thread-safe session handle. Submissions are serialized so journal
/// sequence numbers stay gapless.
pub struct SharedSession<S: DocumentStore = MemoryStore> {
    inner: Mutex<LedgerSession<S>>,
}

impl<S: DocumentStore> SharedSession<S> {
    pub fn new(session: LedgerSession<S>) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    pub fn submit_created(&self, tx: Transaction) -> Result<u64, ServiceError> {
        self.inner.lock().submit_created(tx)
    }

    pub fn submit_deleted(&self, organization_id: &str, transaction_id: &str) -> Result<u64, ServiceError> {
        self.inner.lock().submit_deleted(organization_id, transaction_id)
    }

    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().last_sequence()
    }

    pub fn service(&self) -> LedgerService<S> {
        self.inner.lock().service()
    }
}
