/// Ledger Kernel — Rebuild
///
/// Recomputes a ledger aggregate from scratch out of transaction log
/// content. Only `openingBalance` is carried over; every derived field is
/// replaced. Deterministic: input order does not matter.

use std::collections::BTreeMap;

use crate::arithmetic::Amount;
use crate::domain::{FiscalPeriod, LedgerAggregate, LedgerType, Transaction};
use crate::engine::LedgerEngine;
use crate::error::KernelError;
use crate::state::create_initial_aggregate;

/// Identity of one ledger aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerKey {
    pub ledger_type: LedgerType,
    pub organization_id: String,
    pub entity_id: String,
    pub fiscal_period: FiscalPeriod,
}

impl LedgerKey {
    pub fn of(tx: &Transaction) -> Self {
        Self {
            ledger_type: tx.ledger_type,
            organization_id: tx.organization_id.clone(),
            entity_id: tx.entity_id.clone(),
            fiscal_period: tx.fiscal_period(),
        }
    }

    pub fn ledger_id(&self) -> String {
        crate::domain::ledger_id(&self.entity_id, &self.fiscal_period)
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.ledger_type == self.ledger_type
            && tx.organization_id == self.organization_id
            && tx.entity_id == self.entity_id
            && tx.fiscal_period() == self.fiscal_period
    }
}

/// Transactions belonging to `key`, deduplicated by ID and ordered by ID.
pub fn select_transactions<'a>(key: &LedgerKey, transactions: &'a [Transaction]) -> Vec<&'a Transaction> {
    let mut by_id: BTreeMap<&str, &Transaction> = BTreeMap::new();
    for tx in transactions.iter().filter(|tx| key.matches(tx)) {
        by_id.entry(tx.id.as_str()).or_insert(tx);
    }
    by_id.into_values().collect()
}

/// Fold every matching transaction into a fresh aggregate seeded with
/// `opening_balance`.
pub fn rebuild_aggregate(
    key: &LedgerKey,
    opening_balance: Amount,
    transactions: &[Transaction],
) -> Result<LedgerAggregate, KernelError> {
    let seed = create_initial_aggregate(
        key.ledger_type,
        &key.organization_id,
        &key.entity_id,
        &key.fiscal_period,
        opening_balance,
    );
    let mut engine = LedgerEngine::new(seed)?;
    engine.apply_all(select_transactions(key, transactions))?;
    Ok(engine.into_aggregate())
}

/// Group transactions by ledger, for organization-wide rebuilds.
pub fn ledger_keys(transactions: &[Transaction]) -> Vec<LedgerKey> {
    let mut keys: Vec<LedgerKey> = transactions.iter().map(LedgerKey::of).collect();
    keys.sort();
    keys.dedup();
    keys
}
