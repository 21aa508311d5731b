//! Replay orchestrator: rebuild derived state from the change journal.
//!
//! Replay re-drives the same handlers the live path uses, so the result
//! depends only on the notification sequence and the documents already
//! in the target store (entities and materials are not journaled).

use ledger_kernel::domain::{LedgerAggregate, LedgerType, Material, Transaction};
use ledger_kernel::events::{ChangeKind, ChangeNotification};
use ledger_kernel::hashing::state_hash;

use crate::config::EngineConfig;
use crate::documents;
use crate::error::ServiceError;
use crate::handlers::{on_transaction_created, on_transaction_deleted};
use crate::store::{load, load_all, remove, save, Collection, DocumentStore, MemoryStore};

/// Write or remove the transaction document, then run the handlers.
pub fn apply_notification<S>(store: &S, config: &EngineConfig, notification: &ChangeNotification) -> Result<(), ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let tx = &notification.transaction;
    let key = documents::transaction(&tx.organization_id, &tx.id);
    match notification.kind {
        ChangeKind::Created => {
            let existing: Option<Transaction> = load(store, &key)?;
            check_resubmission(existing.as_ref(), tx)?;
            save(store, key, tx)?;
            on_transaction_created(store, config, tx);
        }
        ChangeKind::Deleted => {
            remove(store, key)?;
            on_transaction_deleted(store, config, tx);
        }
    }
    Ok(())
}

/// Transactions are immutable: a create for a stored ID is accepted only
/// as an identical redelivery.
pub fn check_resubmission(existing: Option<&Transaction>, tx: &Transaction) -> Result<(), ServiceError> {
    match existing {
        Some(existing) if existing != tx => Err(ServiceError::Validation(format!(
            "transaction {} is already recorded with a different body",
            tx.id
        ))),
        _ => Ok(()),
    }
}

/// Replay onto an existing store, typically one seeded with entities and
/// materials.
pub fn replay_into<S>(store: &S, notifications: &[ChangeNotification], config: &EngineConfig) -> Result<(), ServiceError>
where
    S: DocumentStore + ?Sized,
{
    for notification in notifications {
        apply_notification(store, config, notification)?;
    }
    Ok(())
}

/// Replay into a fresh, empty store.
pub fn rebuild_store(notifications: &[ChangeNotification], config: &EngineConfig) -> Result<MemoryStore, ServiceError> {
    let store = MemoryStore::new();
    replay_into(&store, notifications, config)?;
    Ok(store)
}

/// Every ledger aggregate in one organization, across all ledger types.
pub fn ledger_aggregates<S>(store: &S, organization_id: &str) -> Result<Vec<LedgerAggregate>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let mut aggregates = Vec::new();
    for ledger_type in LedgerType::ALL {
        aggregates.extend(load_all::<_, LedgerAggregate>(
            store,
            Collection::ledgers(ledger_type),
            organization_id,
        )?);
    }
    Ok(aggregates)
}

/// Order-independent fingerprint of every ledger aggregate and stock
/// level in the store.
pub fn state_fingerprint(store: &MemoryStore) -> Result<String, ServiceError> {
    let mut aggregates = Vec::new();
    let mut materials: Vec<Material> = Vec::new();
    for organization_id in store.organizations() {
        aggregates.extend(ledger_aggregates(store, &organization_id)?);
        materials.extend(load_all::<_, Material>(store, Collection::Materials, &organization_id)?);
    }
    Ok(state_hash(aggregates.iter(), materials.iter()))
}
