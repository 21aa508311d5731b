//! Change-event entry points.
//!
//! Fire-and-forget: a failure here must never fail the write that
//! triggered it, so every error is logged and swallowed. Recovery is a
//! manual rebuild or repair.

use tracing::{debug, error, info, warn};

use ledger_kernel::domain::Transaction;
use ledger_kernel::events::ChangeKind;

use crate::config::EngineConfig;
use crate::ledger_mutator::apply_ledger_change;
use crate::stock_mutator::{apply_stock_change, log_plans};
use crate::store::DocumentStore;

pub fn on_transaction_created<S>(store: &S, config: &EngineConfig, tx: &Transaction)
where
    S: DocumentStore + ?Sized,
{
    handle(store, config, ChangeKind::Created, tx);
}

pub fn on_transaction_deleted<S>(store: &S, config: &EngineConfig, tx: &Transaction)
where
    S: DocumentStore + ?Sized,
{
    handle(store, config, ChangeKind::Deleted, tx);
}

fn handle<S>(store: &S, config: &EngineConfig, kind: ChangeKind, tx: &Transaction)
where
    S: DocumentStore + ?Sized,
{
    match apply_ledger_change(store, config, kind, tx) {
        Ok(outcome) => {
            if let Some(opening) = outcome.seeded_opening {
                debug!(ledger_id = %outcome.ledger_id, opening_balance = %opening, "Ledger seeded");
            }
            if outcome.result.applied {
                info!(
                    transaction_id = %tx.id,
                    ledger_id = %outcome.ledger_id,
                    balance_delta = %outcome.result.balance_delta,
                    ?kind,
                    "Ledger updated"
                );
            } else {
                debug!(
                    transaction_id = %tx.id,
                    ledger_id = %outcome.ledger_id,
                    reason = %outcome.result.reason,
                    "Ledger unchanged"
                );
            }
            if !outcome.entity_found {
                warn!(
                    transaction_id = %tx.id,
                    entity_id = %tx.entity_id,
                    ledger_type = %tx.ledger_type,
                    "Entity not found, balance not updated"
                );
            }
        }
        Err(e) => error!(transaction_id = %tx.id, ?kind, error = %e, "Ledger update failed"),
    }

    if !tx.is_purchase() {
        return;
    }
    match apply_stock_change(store, config, kind, tx) {
        Ok(plans) => log_plans(kind, tx, &plans),
        Err(e) => error!(transaction_id = %tx.id, ?kind, error = %e, "Stock update failed"),
    }
}
