//! Incremental ledger mutator.
//!
//! One atomic transaction per change: read the aggregate, the previous
//! period's aggregate (for seeding) and the entity, then write the new
//! aggregate and the entity's balance moved by the same signed delta.

use ledger_kernel::arithmetic::Amount;
use ledger_kernel::domain::{EntityBalance, LedgerAggregate, Transaction};
use ledger_kernel::engine::LedgerEngine;
use ledger_kernel::error::KernelError;
use ledger_kernel::events::ChangeKind;
use ledger_kernel::fixes::empty_aggregate;
use ledger_kernel::rebuild::LedgerKey;
use ledger_kernel::state::carried_opening_balance;
use ledger_kernel::transitions::TransitionResult;

use crate::config::EngineConfig;
use crate::documents;
use crate::error::ServiceError;
use crate::store::{run_transaction, DocumentStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub ledger_id: String,
    pub result: TransitionResult,
    /// The aggregate did not exist and was seeded by this change.
    pub seeded_opening: Option<Amount>,
    /// `false` when the entity document was missing and only the
    /// aggregate was written.
    pub entity_found: bool,
}

pub fn apply_ledger_change<S>(
    store: &S,
    config: &EngineConfig,
    kind: ChangeKind,
    tx: &Transaction,
) -> Result<LedgerOutcome, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let key = LedgerKey::of(tx);
    let ledger_doc = documents::ledger(&key);
    let entity_doc = documents::entity(tx.ledger_type, &tx.organization_id, &tx.entity_id);

    run_transaction(store, config.store.max_transaction_attempts, |txn| {
        let existing: Option<LedgerAggregate> = txn.get(&ledger_doc)?;
        let mut seeded_opening = None;
        let seed = match existing {
            Some(agg) => agg,
            None if kind == ChangeKind::Deleted => {
                return Ok(LedgerOutcome {
                    ledger_id: key.ledger_id(),
                    result: TransitionResult::skipped(tx, kind, "ledger does not exist"),
                    seeded_opening: None,
                    entity_found: txn.exists(&entity_doc)?,
                });
            }
            None => {
                let previous: Option<LedgerAggregate> = txn.get(&documents::previous_ledger(&key))?;
                let opening = carried_opening_balance(previous.as_ref());
                seeded_opening = Some(opening);
                empty_aggregate(&key, opening)
            }
        };
        let mut entity: Option<EntityBalance> = txn.get(&entity_doc)?;

        let mut engine = LedgerEngine::new(seed)?;
        let result = engine.apply(kind, tx)?;
        let outcome = LedgerOutcome {
            ledger_id: key.ledger_id(),
            result: result.clone(),
            seeded_opening,
            entity_found: entity.is_some(),
        };
        if !result.applied {
            return Ok(outcome);
        }

        txn.put(ledger_doc.clone(), engine.aggregate())?;
        if let Some(entity) = entity.as_mut() {
            entity.current_balance = entity
                .current_balance
                .checked_add(result.balance_delta)
                .map_err(KernelError::from)?;
            txn.put(entity_doc.clone(), entity)?;
        }
        Ok(outcome)
    })
}
