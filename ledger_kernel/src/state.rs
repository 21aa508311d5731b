/// Ledger Kernel — Aggregate Construction
///
/// All balances: int64 fixed-point (real * SCALE).

use crate::arithmetic::Amount;
use crate::domain::{FiscalPeriod, LedgerAggregate, LedgerType};

/// Create a fresh aggregate: zero totals, zero counters, given opening balance.
pub fn create_initial_aggregate(
    ledger_type: LedgerType,
    organization_id: &str,
    entity_id: &str,
    fiscal_period: &FiscalPeriod,
    opening_balance: Amount,
) -> LedgerAggregate {
    LedgerAggregate {
        ledger_type,
        entity_id: entity_id.to_string(),
        organization_id: organization_id.to_string(),
        fiscal_period: fiscal_period.clone(),
        opening_balance,
        current_balance: opening_balance,
        total_credits: Amount::ZERO,
        total_debits: Amount::ZERO,
        transaction_count: 0,
        credit_count: 0,
        debit_count: 0,
        transaction_ids: Vec::new(),
    }
}

/// Opening balance for a new period: the previous period's closing
/// balance when one exists, otherwise zero.
pub fn carried_opening_balance(previous: Option<&LedgerAggregate>) -> Amount {
    previous.map_or(Amount::ZERO, |agg| agg.current_balance)
}
