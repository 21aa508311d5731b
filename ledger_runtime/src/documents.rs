//! Where each kind of document lives.

use ledger_kernel::domain::{
    ledger_id, stock_history_id, stock_reversal_id, LedgerType, Transaction,
};
use ledger_kernel::rebuild::LedgerKey;

use crate::store::{Collection, DocKey};

pub fn entity(ledger_type: LedgerType, organization_id: &str, entity_id: &str) -> DocKey {
    DocKey::new(Collection::entities(ledger_type), organization_id, entity_id)
}

pub fn ledger(key: &LedgerKey) -> DocKey {
    DocKey::new(Collection::ledgers(key.ledger_type), &key.organization_id, &key.ledger_id())
}

/// The same entity's ledger one fiscal period earlier.
pub fn previous_ledger(key: &LedgerKey) -> DocKey {
    let previous = key.fiscal_period.previous();
    DocKey::new(
        Collection::ledgers(key.ledger_type),
        &key.organization_id,
        &ledger_id(&key.entity_id, &previous),
    )
}

pub fn material(organization_id: &str, material_id: &str) -> DocKey {
    DocKey::new(Collection::Materials, organization_id, material_id)
}

pub fn receipt_entry(tx: &Transaction, material_id: &str) -> DocKey {
    DocKey::new(
        Collection::StockHistory,
        &tx.organization_id,
        &stock_history_id(&tx.id, material_id),
    )
}

pub fn reversal_entry(tx: &Transaction, material_id: &str) -> DocKey {
    DocKey::new(
        Collection::StockHistory,
        &tx.organization_id,
        &stock_reversal_id(&tx.id, material_id),
    )
}

pub fn history_entry(organization_id: &str, entry_id: &str) -> DocKey {
    DocKey::new(Collection::StockHistory, organization_id, entry_id)
}

pub fn transaction(organization_id: &str, transaction_id: &str) -> DocKey {
    DocKey::new(Collection::Transactions, organization_id, transaction_id)
}

pub fn order(organization_id: &str, order_id: &str) -> DocKey {
    DocKey::new(Collection::Orders, organization_id, order_id)
}

pub fn trip(organization_id: &str, trip_id: &str) -> DocKey {
    DocKey::new(Collection::Trips, organization_id, trip_id)
}
