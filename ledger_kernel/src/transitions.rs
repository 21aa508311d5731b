/// Ledger Kernel — Ledger Transition Logic
///
/// All ledger-mutation logic lives here.
/// All math is checked integer. No float.
/// The input aggregate is never mutated; a clone is returned.

use serde::{Deserialize, Serialize};

use crate::arithmetic::Amount;
use crate::domain::{LedgerAggregate, Transaction, TransactionType};
use crate::error::KernelError;
use crate::events::ChangeKind;

/// Structured outcome of one ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub transaction_id: String,
    pub kind: ChangeKind,
    /// False when the transition was a no-op (already applied / not present).
    pub applied: bool,
    pub reason: String,
    /// Signed change to `currentBalance`.
    pub balance_delta: Amount,
}

impl TransitionResult {
    pub fn skipped(tx: &Transaction, kind: ChangeKind, reason: &str) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            kind,
            applied: false,
            reason: reason.to_string(),
            balance_delta: Amount::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

pub fn apply_change(
    agg: &LedgerAggregate,
    kind: ChangeKind,
    tx: &Transaction,
) -> Result<(LedgerAggregate, TransitionResult), KernelError> {
    match kind {
        ChangeKind::Created => apply_transaction(agg, tx),
        ChangeKind::Deleted => revert_transaction(agg, tx),
    }
}

/// Add `tx` to the aggregate. Idempotent: a transaction whose ID is
/// already in `transactionIds` is a no-op.
pub fn apply_transaction(
    agg: &LedgerAggregate,
    tx: &Transaction,
) -> Result<(LedgerAggregate, TransitionResult), KernelError> {
    check_belongs(agg, tx)?;

    if agg.contains(&tx.id) {
        return Ok((
            agg.clone(),
            TransitionResult::skipped(tx, ChangeKind::Created, "already applied"),
        ));
    }

    let mut next = agg.clone();
    match tx.tx_type {
        TransactionType::Credit => {
            next.total_credits = next.total_credits.checked_add(tx.amount)?;
            next.credit_count += 1;
        }
        TransactionType::Debit => {
            next.total_debits = next.total_debits.checked_add(tx.amount)?;
            next.debit_count += 1;
        }
    }
    let delta = agg.ledger_type.balance_effect(tx.tx_type, tx.amount);
    next.current_balance = next.current_balance.checked_add(delta)?;
    next.transaction_count += 1;
    next.transaction_ids.push(tx.id.clone());

    Ok((
        next,
        TransitionResult {
            transaction_id: tx.id.clone(),
            kind: ChangeKind::Created,
            applied: true,
            reason: String::new(),
            balance_delta: delta,
        },
    ))
}

/// Remove `tx` from the aggregate. A transaction that was never applied
/// is a no-op.
pub fn revert_transaction(
    agg: &LedgerAggregate,
    tx: &Transaction,
) -> Result<(LedgerAggregate, TransitionResult), KernelError> {
    check_belongs(agg, tx)?;

    if !agg.contains(&tx.id) {
        return Ok((
            agg.clone(),
            TransitionResult::skipped(tx, ChangeKind::Deleted, "not applied"),
        ));
    }

    let mut next = agg.clone();
    match tx.tx_type {
        TransactionType::Credit => {
            next.total_credits = next.total_credits.checked_sub(tx.amount)?;
            next.credit_count = next.credit_count.saturating_sub(1);
        }
        TransactionType::Debit => {
            next.total_debits = next.total_debits.checked_sub(tx.amount)?;
            next.debit_count = next.debit_count.saturating_sub(1);
        }
    }
    let effect = agg.ledger_type.balance_effect(tx.tx_type, tx.amount);
    let delta = Amount(-effect.0);
    next.current_balance = next.current_balance.checked_add(delta)?;
    next.transaction_count = next.transaction_count.saturating_sub(1);
    next.transaction_ids.retain(|id| id != &tx.id);

    Ok((
        next,
        TransitionResult {
            transaction_id: tx.id.clone(),
            kind: ChangeKind::Deleted,
            applied: true,
            reason: String::new(),
            balance_delta: delta,
        },
    ))
}

// ---------------------------------------------------------------------------
// Guards (private)
// ---------------------------------------------------------------------------

fn check_belongs(agg: &LedgerAggregate, tx: &Transaction) -> Result<(), KernelError> {
    let tx_ledger = tx.ledger_id();
    let agg_ledger = agg.ledger_id();
    if tx.ledger_type != agg.ledger_type
        || tx.organization_id != agg.organization_id
        || tx_ledger != agg_ledger
    {
        return Err(KernelError::LedgerMismatch {
            transaction_id: tx.id.clone(),
            transaction_ledger: format!("{}/{}", tx.ledger_type, tx_ledger),
            aggregate_ledger: format!("{}/{}", agg.ledger_type, agg_ledger),
        });
    }
    if tx.amount.is_negative() {
        return Err(KernelError::NegativeAmount {
            transaction_id: tx.id.clone(),
            amount: tx.amount.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{FiscalPeriod, LedgerType, TransactionMetadata};
    use crate::invariants::validate_aggregate;
    use crate::state::create_initial_aggregate;

    fn units(n: i64) -> Amount {
        Amount::from_units(n).unwrap()
    }

    fn tx(id: &str, tx_type: TransactionType, amount: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            organization_id: "org".to_string(),
            entity_id: "V1".to_string(),
            ledger_type: LedgerType::Vendor,
            tx_type,
            category: "purchase".to_string(),
            amount: units(amount),
            transaction_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            financial_year: None,
            metadata: TransactionMetadata::default(),
        }
    }

    fn ledger() -> LedgerAggregate {
        let period: FiscalPeriod = "2024-25".parse().unwrap();
        create_initial_aggregate(LedgerType::Vendor, "org", "V1", &period, units(1000))
    }

    #[test]
    fn credit_increases_payable_balance() {
        let (agg, result) = apply_transaction(&ledger(), &tx("T1", TransactionType::Credit, 300)).unwrap();
        assert!(result.applied);
        assert_eq!(result.balance_delta, units(300));
        assert_eq!(agg.current_balance, units(1300));
        assert_eq!(agg.credit_count, 1);
        assert_eq!(agg.transaction_ids, vec!["T1".to_string()]);
        validate_aggregate(&agg).unwrap();
    }

    #[test]
    fn reapplying_is_a_noop() {
        let t1 = tx("T1", TransactionType::Credit, 300);
        let (once, _) = apply_transaction(&ledger(), &t1).unwrap();
        let (twice, result) = apply_transaction(&once, &t1).unwrap();
        assert!(!result.applied);
        assert_eq!(result.reason, "already applied");
        assert_eq!(once, twice);
    }

    #[test]
    fn revert_restores_previous_state() {
        let base = ledger();
        let t1 = tx("T1", TransactionType::Debit, 250);
        let (applied, _) = apply_transaction(&base, &t1).unwrap();
        assert_eq!(applied.current_balance, units(750));
        let (reverted, result) = revert_transaction(&applied, &t1).unwrap();
        assert!(result.applied);
        assert_eq!(reverted, base);
    }

    #[test]
    fn reverting_unknown_transaction_is_a_noop() {
        let base = ledger();
        let (same, result) = revert_transaction(&base, &tx("T9", TransactionType::Credit, 1)).unwrap();
        assert!(!result.applied);
        assert_eq!(same, base);
    }

    #[test]
    fn rejects_transaction_for_another_ledger() {
        let mut other = tx("T1", TransactionType::Credit, 1);
        other.entity_id = "V2".to_string();
        assert!(matches!(
            apply_transaction(&ledger(), &other),
            Err(KernelError::LedgerMismatch { .. })
        ));
    }

    #[test]
    fn rejects_negative_amount() {
        let mut bad = tx("T1", TransactionType::Credit, 1);
        bad.amount = Amount(-1);
        assert!(matches!(
            apply_transaction(&ledger(), &bad),
            Err(KernelError::NegativeAmount { .. })
        ));
    }
}
